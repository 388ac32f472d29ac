//! Correlation-based multi-object tracking: greedy IoU identity binding over
//! a bounded lookback window, template-matching propagation between detector
//! cycles, and MOTA/MOTP evaluation against MOT-format ground truth.

pub mod correlation;
pub mod error;
pub mod metrics;
pub mod model;
pub mod tracker;

pub use crate::correlation::CorrelationTracker;
pub use crate::error::{Result, TrackError};
pub use crate::metrics::{motp_mota, read_mot_records, sequence_from_records, MotRecord, MotSummary};
pub use crate::model::{BBox, Detection, Detector, Frame};
pub use crate::tracker::{Tracker, TrackerConfig};

use thiserror::Error;

/// Result type alias for tracking and evaluation operations.
pub type Result<T> = std::result::Result<T, TrackError>;

/// Structural input violations surfaced to the caller.
///
/// Per-frame anomalies (degenerate boxes, empty association sets, frames
/// without matches) are absorbed by defined fallbacks and never appear here.
#[derive(Error, Debug)]
pub enum TrackError {
    #[error("sequence length mismatch: {gt} ground-truth frames vs {hyp} hypothesis frames")]
    LengthMismatch { gt: usize, hyp: usize },

    #[error("malformed record at line {line}: {reason}")]
    MalformedRecord { line: usize, reason: String },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
}

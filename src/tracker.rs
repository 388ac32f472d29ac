use std::cmp::Reverse;
use std::collections::{HashMap, HashSet};

use fixedbitset::FixedBitSet;
use log::debug;
use ordered_float::OrderedFloat;

use crate::model::{BBox, Detection, Detector, Frame};

/// Knobs for identity binding.
#[derive(Debug, Clone)]
pub struct TrackerConfig {
    /// Number of recent frames scanned for rebinding candidates.
    pub lookback: usize,
    /// Minimum IoU for a current box to inherit a previous identity.
    pub iou_threshold: f64,
    /// Confidence floor handed to the detector.
    pub min_confidence: f64,
    /// Optional label filter handed to the detector on non-initial frames.
    pub labels: Option<Vec<String>>,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            lookback: 80,
            iou_threshold: 0.3,
            min_confidence: 0.5,
            labels: None,
        }
    }
}

/// Assigns persistent integer identities to detected boxes across frames.
///
/// Each instance exclusively owns its detection history, identity allocator
/// and last-seen map; processing is strictly sequential, one frame at a time.
pub struct Tracker<D> {
    detector: D,
    config: TrackerConfig,
    frame_index: usize,
    next_id: i64,
    history: Vec<Vec<Detection>>,
    last_seen: HashMap<i64, usize>,
}

impl<D: Detector> Tracker<D> {
    pub fn new(detector: D, config: TrackerConfig) -> Self {
        Self {
            detector,
            config,
            frame_index: 0,
            next_id: 0,
            history: Vec::new(),
            last_seen: HashMap::new(),
        }
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    /// Index of the next frame to be processed.
    pub fn frame_index(&self) -> usize {
        self.frame_index
    }

    /// Per-frame detection sets, one entry per processed frame. Append-only.
    pub fn history(&self) -> &[Vec<Detection>] {
        &self.history
    }

    /// Most recent frame index at which `id` was saved.
    pub fn last_seen(&self, id: i64) -> Option<usize> {
        self.last_seen.get(&id).copied()
    }

    /// Identities are never reused or decremented.
    fn alloc_id(&mut self) -> i64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    /// Latest known detection per identity over the lookback window.
    ///
    /// Scans the last `min(lookback, frame_index)` frames of history; when an
    /// identity occurs more than once, the later frame wins. Output order is
    /// first appearance within the scan.
    pub fn prev_detections(&self) -> Vec<Detection> {
        let start = self.frame_index.saturating_sub(self.config.lookback);
        let mut out: Vec<Detection> = Vec::new();
        let mut slot: HashMap<i64, usize> = HashMap::new();

        for frame in &self.history[start..] {
            for det in frame {
                match slot.get(&det.id) {
                    Some(&i) => out[i] = *det,
                    None => {
                        slot.insert(det.id, out.len());
                        out.push(*det);
                    }
                }
            }
        }

        out
    }

    /// Binds identity-less boxes to previously tracked identities.
    ///
    /// All (current, previous) pairs are scored by IoU, stable-sorted in
    /// descending order and accepted greedily, skipping pairs whose current
    /// index or previous identity is already consumed and stopping once the
    /// overlap falls below the acceptance threshold. Unmatched boxes receive
    /// fresh identities.
    pub fn bind(&mut self, boxes: &[BBox]) -> Vec<Detection> {
        let prev = self.prev_detections();

        let mut candidates = Vec::with_capacity(boxes.len() * prev.len());
        for (curr_idx, b) in boxes.iter().enumerate() {
            for p in &prev {
                candidates.push((b.iou(&p.bbox), curr_idx, p.id));
            }
        }
        // stable sort: on equal overlap the earlier (current, previous) pair wins
        candidates.sort_by_key(|&(iou, _, _)| Reverse(OrderedFloat(iou)));

        let mut assigned: Vec<Option<i64>> = vec![None; boxes.len()];
        let mut used_curr = FixedBitSet::with_capacity(boxes.len());
        let mut used_prev: HashSet<i64> = HashSet::new();

        for (iou, curr_idx, prev_id) in candidates {
            if used_curr.contains(curr_idx) || used_prev.contains(&prev_id) {
                continue;
            }
            if iou < self.config.iou_threshold {
                break;
            }
            assigned[curr_idx] = Some(prev_id);
            used_curr.insert(curr_idx);
            used_prev.insert(prev_id);
        }

        let bound = assigned.iter().filter(|a| a.is_some()).count();
        debug!(
            "frame {}: bound {} of {} detections, {} new identities",
            self.frame_index,
            bound,
            boxes.len(),
            boxes.len() - bound
        );

        boxes
            .iter()
            .zip(assigned)
            .map(|(&bbox, id)| {
                let id = match id {
                    Some(id) => id,
                    None => self.alloc_id(),
                };
                Detection::new(id, bbox)
            })
            .collect()
    }

    /// Updates the last-seen map for every identity present.
    pub fn save(&mut self, detections: &[Detection]) {
        for det in detections {
            self.last_seen.insert(det.id, self.frame_index);
        }
    }

    /// Processes one frame: frame 0 detects with no label filter and assigns
    /// fresh identities; later frames detect with the configured filter and
    /// bind. Always saves, appends to history and advances the frame counter.
    pub fn step(&mut self, frame: &Frame) -> Vec<Detection> {
        let detections = if self.frame_index == 0 {
            self.initial_detections(frame)
        } else {
            let boxes = self.detect_boxes(frame, true);
            self.bind(&boxes)
        };

        self.commit(detections)
    }

    /// Frame-0 path: the detector runs without a label filter and every box
    /// gets a freshly allocated identity.
    pub(crate) fn initial_detections(&mut self, frame: &Frame) -> Vec<Detection> {
        let boxes = self.detect_boxes(frame, false);
        boxes
            .into_iter()
            .map(|b| {
                let id = self.alloc_id();
                Detection::new(id, b)
            })
            .collect()
    }

    pub(crate) fn detect_boxes(&mut self, frame: &Frame, filtered: bool) -> Vec<BBox> {
        let labels = if filtered {
            self.config.labels.as_deref()
        } else {
            None
        };
        self.detector
            .detect(frame, self.config.min_confidence, labels)
            .into_iter()
            .map(|(_, b)| b)
            .collect()
    }

    pub(crate) fn commit(&mut self, detections: Vec<Detection>) -> Vec<Detection> {
        self.save(&detections);
        self.history.push(detections.clone());
        self.frame_index += 1;
        detections
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn null_detector() -> impl Detector {
        |_: &Frame, _: f64, _: Option<&[String]>| Vec::<(String, BBox)>::new()
    }

    fn seeded(frames: Vec<Vec<Detection>>) -> Tracker<impl Detector> {
        let mut tracker = Tracker::new(null_detector(), TrackerConfig::default());
        for frame in frames {
            tracker.next_id = tracker
                .next_id
                .max(frame.iter().map(|d| d.id + 1).max().unwrap_or(0));
            tracker.commit(frame);
        }
        tracker
    }

    #[test]
    fn test_prev_detections_recency_wins() {
        let early = Detection::new(0, BBox::new(0.0, 0.0, 10.0, 10.0));
        let late = Detection::new(0, BBox::new(5.0, 5.0, 15.0, 15.0));
        let tracker = seeded(vec![vec![early], vec![late]]);

        assert_eq!(tracker.prev_detections(), vec![late]);
    }

    #[test]
    fn test_prev_detections_ordered_by_first_appearance() {
        let a0 = Detection::new(0, BBox::new(0.0, 0.0, 1.0, 1.0));
        let b = Detection::new(1, BBox::new(2.0, 2.0, 3.0, 3.0));
        let a1 = Detection::new(0, BBox::new(0.5, 0.5, 1.5, 1.5));
        let tracker = seeded(vec![vec![a0], vec![b, a1]]);

        assert_eq!(tracker.prev_detections(), vec![a1, b]);
    }

    #[test]
    fn test_prev_detections_bounded_by_lookback() {
        let old = Detection::new(0, BBox::new(0.0, 0.0, 1.0, 1.0));
        let config = TrackerConfig {
            lookback: 2,
            ..Default::default()
        };
        let mut tracker = Tracker::new(null_detector(), config);
        tracker.next_id = 1;
        tracker.commit(vec![old]);
        tracker.commit(vec![]);
        tracker.commit(vec![]);

        assert!(tracker.prev_detections().is_empty());
    }

    #[test]
    fn test_bind_inherits_identity_above_threshold() {
        let prev = Detection::new(0, BBox::new(0.0, 0.0, 10.0, 10.0));
        let mut tracker = seeded(vec![vec![prev]]);

        let bound = tracker.bind(&[BBox::new(1.0, 0.0, 11.0, 10.0)]);

        assert_eq!(bound.len(), 1);
        assert_eq!(bound[0].id, 0);
    }

    #[test]
    fn test_bind_allocates_below_threshold() {
        let prev = Detection::new(0, BBox::new(0.0, 0.0, 10.0, 10.0));
        let mut tracker = seeded(vec![vec![prev]]);

        let bound = tracker.bind(&[BBox::new(8.0, 8.0, 18.0, 18.0)]);

        assert_eq!(bound[0].id, 1);
    }

    #[test]
    fn test_bind_never_duplicates_identities() {
        let prev = vec![
            Detection::new(0, BBox::new(0.0, 0.0, 10.0, 10.0)),
            Detection::new(1, BBox::new(20.0, 0.0, 30.0, 10.0)),
        ];
        let mut tracker = seeded(vec![prev]);

        // both current boxes overlap identity 0 best; only one may take it
        let bound = tracker.bind(&[
            BBox::new(0.0, 0.0, 10.0, 10.0),
            BBox::new(1.0, 0.0, 11.0, 10.0),
        ]);

        let mut ids: Vec<i64> = bound.iter().map(|d| d.id).collect();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), bound.len());
        assert_eq!(bound[0].id, 0);
    }

    #[test]
    fn test_bind_with_empty_history_allocates_fresh() {
        let mut tracker = Tracker::new(null_detector(), TrackerConfig::default());
        tracker.commit(vec![]);

        let bound = tracker.bind(&[
            BBox::new(0.0, 0.0, 1.0, 1.0),
            BBox::new(2.0, 2.0, 3.0, 3.0),
        ]);

        assert_eq!(bound[0].id, 0);
        assert_eq!(bound[1].id, 1);
    }

    #[test]
    fn test_bind_empty_current_set() {
        let prev = Detection::new(0, BBox::new(0.0, 0.0, 10.0, 10.0));
        let mut tracker = seeded(vec![vec![prev]]);

        assert!(tracker.bind(&[]).is_empty());
    }

    #[test]
    fn test_save_updates_last_seen() {
        let mut tracker = Tracker::new(null_detector(), TrackerConfig::default());
        tracker.next_id = 8;
        tracker.commit(vec![Detection::new(7, BBox::default())]);
        tracker.commit(vec![Detection::new(7, BBox::default())]);

        assert_eq!(tracker.last_seen(7), Some(1));
        assert_eq!(tracker.last_seen(3), None);
    }

    #[test]
    fn test_step_assigns_fresh_ids_on_frame_zero() {
        let detector = |_: &Frame, _: f64, _: Option<&[String]>| {
            vec![
                ("person".to_string(), BBox::new(0.0, 0.0, 5.0, 5.0)),
                ("car".to_string(), BBox::new(10.0, 0.0, 15.0, 5.0)),
            ]
        };
        let mut tracker = Tracker::new(detector, TrackerConfig::default());
        let frame = Frame::Gray(ndarray::Array2::zeros((20, 20)));

        let detections = tracker.step(&frame);

        assert_eq!(detections[0].id, 0);
        assert_eq!(detections[1].id, 1);
        assert_eq!(tracker.history().len(), 1);
        assert_eq!(tracker.frame_index(), 1);
    }
}

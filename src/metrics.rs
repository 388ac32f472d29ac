use std::cmp::Reverse;
use std::io;

use fixedbitset::FixedBitSet;
use log::debug;
use ordered_float::OrderedFloat;

use crate::error::{Result, TrackError};
use crate::model::{BBox, Detection};

/// One row of a MOT-format annotation file: `frame, id, left, top, width,
/// height, ...`. Frames are 1-based.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MotRecord {
    pub frame: usize,
    pub id: i64,
    pub left: f64,
    pub top: f64,
    pub width: f64,
    pub height: f64,
}

impl MotRecord {
    /// Corner-form detection for this record.
    pub fn detection(&self) -> Detection {
        Detection::new(
            self.id,
            BBox::new(
                self.left,
                self.top,
                self.left + self.width,
                self.top + self.height,
            ),
        )
    }
}

/// Reads headerless comma-separated MOT records. Columns past the sixth
/// (confidence, world coordinates) are ignored; malformed rows are explicit
/// errors carrying the offending line number.
pub fn read_mot_records<R: io::Read>(reader: R) -> Result<Vec<MotRecord>> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let mut records = Vec::new();
    for (idx, row) in rdr.records().enumerate() {
        let line = idx + 1;
        let row = row?;

        if row.len() < 6 {
            return Err(TrackError::MalformedRecord {
                line,
                reason: format!("expected at least 6 fields, got {}", row.len()),
            });
        }

        let frame: i64 = parse_field(&row, 0, line)?;
        if frame < 1 {
            return Err(TrackError::MalformedRecord {
                line,
                reason: format!("frame index {} out of range", frame),
            });
        }

        records.push(MotRecord {
            frame: frame as usize,
            id: parse_field(&row, 1, line)?,
            left: parse_field(&row, 2, line)?,
            top: parse_field(&row, 3, line)?,
            width: parse_field(&row, 4, line)?,
            height: parse_field(&row, 5, line)?,
        });
    }

    Ok(records)
}

fn parse_field<T: std::str::FromStr>(
    row: &csv::StringRecord,
    idx: usize,
    line: usize,
) -> Result<T> {
    let field = row.get(idx).ok_or_else(|| TrackError::MalformedRecord {
        line,
        reason: format!("missing field {}", idx + 1),
    })?;
    field.parse().map_err(|_| TrackError::MalformedRecord {
        line,
        reason: format!("field {} is not numeric: {:?}", idx + 1, field),
    })
}

/// Normalizes records into a per-frame sequence running from frame 1 to the
/// maximum observed index; frames without records become empty sets.
pub fn sequence_from_records(records: &[MotRecord]) -> Vec<Vec<Detection>> {
    let frames = records.iter().map(|r| r.frame).max().unwrap_or(0);
    let mut sequence = vec![Vec::new(); frames];

    for record in records {
        sequence[record.frame - 1].push(record.detection());
    }

    sequence
}

/// Totals accumulated by [`motp_mota`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MotSummary {
    pub matches: usize,
    pub misses: usize,
    pub false_positives: usize,
    pub mismatches: usize,
    pub gt_instances: usize,
    pub iou_sum: f64,
}

impl MotSummary {
    /// Mean IoU over accepted matches; 0.0 when nothing matched.
    pub fn motp(&self) -> f64 {
        if self.matches == 0 {
            0.0
        } else {
            self.iou_sum / self.matches as f64
        }
    }

    /// Tracking accuracy; `None` when the ground truth contains no instances
    /// at all (the metric is undefined, not zero).
    pub fn mota(&self) -> Option<f64> {
        if self.gt_instances == 0 {
            return None;
        }
        let errors = (self.misses + self.false_positives + self.mismatches) as f64;
        Some(1.0 - errors / self.gt_instances as f64)
    }
}

/// Scores a hypothesis track sequence against ground truth.
///
/// Both sequences hold one detection set per frame and must have equal
/// length; on mismatch the caller gets an explicit error and decides how to
/// truncate. Matching prefers identity continuity: correspondences from the
/// previous frame are kept while their IoU stays above `threshold`, then the
/// remaining pairs are associated greedily in descending IoU order. A frame
/// that produces no matches at all leaves the carried correspondences
/// untouched, so brief full occlusions do not reset identities.
pub fn motp_mota(
    ground_truth: &[Vec<Detection>],
    hypotheses: &[Vec<Detection>],
    threshold: f64,
) -> Result<MotSummary> {
    if ground_truth.len() != hypotheses.len() {
        return Err(TrackError::LengthMismatch {
            gt: ground_truth.len(),
            hyp: hypotheses.len(),
        });
    }

    let mut summary = MotSummary::default();
    let mut carried: Vec<(i64, i64)> = Vec::new();

    for (frame_idx, (gt_frame, hyp_frame)) in ground_truth.iter().zip(hypotheses).enumerate() {
        summary.gt_instances += gt_frame.len();

        let mut gt_used = FixedBitSet::with_capacity(gt_frame.len());
        let mut hyp_used = FixedBitSet::with_capacity(hyp_frame.len());
        let mut frame_matches: Vec<(i64, i64)> = Vec::new();

        // keep correspondences from the previous frame while they still hold
        for &(gt_id, hyp_id) in &carried {
            let gi = gt_frame.iter().position(|d| d.id == gt_id);
            let hi = hyp_frame.iter().position(|d| d.id == hyp_id);
            if let (Some(gi), Some(hi)) = (gi, hi) {
                if gt_used.contains(gi) || hyp_used.contains(hi) {
                    continue;
                }
                let iou = gt_frame[gi].bbox.iou(&hyp_frame[hi].bbox);
                if iou > threshold {
                    summary.matches += 1;
                    summary.iou_sum += iou;
                    gt_used.insert(gi);
                    hyp_used.insert(hi);
                    frame_matches.push((gt_id, hyp_id));
                }
            }
        }

        // greedy association of whatever is left, best overlap first
        let mut candidates = Vec::new();
        for (gi, g) in gt_frame.iter().enumerate() {
            if gt_used.contains(gi) {
                continue;
            }
            for (hi, h) in hyp_frame.iter().enumerate() {
                if hyp_used.contains(hi) {
                    continue;
                }
                let iou = g.bbox.iou(&h.bbox);
                if iou > threshold {
                    candidates.push((iou, gi, hi));
                }
            }
        }
        candidates.sort_by_key(|&(iou, _, _)| Reverse(OrderedFloat(iou)));

        for (iou, gi, hi) in candidates {
            if gt_used.contains(gi) || hyp_used.contains(hi) {
                continue;
            }
            gt_used.insert(gi);
            hyp_used.insert(hi);
            summary.matches += 1;
            summary.iou_sum += iou;

            let gt_id = gt_frame[gi].id;
            let hyp_id = hyp_frame[hi].id;
            if carried.iter().any(|&(g, h)| g == gt_id && h != hyp_id) {
                summary.mismatches += 1;
            }
            frame_matches.push((gt_id, hyp_id));
        }

        summary.misses += gt_frame.len() - frame_matches.len();
        summary.false_positives += hyp_frame.len() - frame_matches.len();

        debug!(
            "frame {}: {} matched, {} missed, {} false positives",
            frame_idx,
            frame_matches.len(),
            gt_frame.len() - frame_matches.len(),
            hyp_frame.len() - frame_matches.len()
        );

        // an empty match set leaves the carried correspondences untouched
        if !frame_matches.is_empty() {
            carried = frame_matches;
        }
    }

    Ok(summary)
}

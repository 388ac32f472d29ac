use log::trace;
use ndarray as nd;

use crate::model::{BBox, Detection, Detector, Frame};
use crate::tracker::{Tracker, TrackerConfig};

/// Identity tracker that invokes the detector only every `detection_rate`-th
/// frame and carries tracked boxes across the gap by template matching
/// against the previous frame.
///
/// Composition over the plain [`Tracker`]: the identity-binding state is
/// shared, the propagation strategy sits on top.
pub struct CorrelationTracker<D> {
    tracker: Tracker<D>,
    detection_rate: usize,
    prev_gray: Option<nd::Array2<f64>>,
}

impl<D: Detector> CorrelationTracker<D> {
    pub fn new(detector: D, detection_rate: usize, config: TrackerConfig) -> Self {
        Self {
            tracker: Tracker::new(detector, config),
            detection_rate: detection_rate.max(1),
            prev_gray: None,
        }
    }

    pub fn tracker(&self) -> &Tracker<D> {
        &self.tracker
    }

    pub fn detection_rate(&self) -> usize {
        self.detection_rate
    }

    /// Processes one frame.
    ///
    /// Frame 0 initializes identities from an unfiltered detector pass; every
    /// `detection_rate`-th frame re-detects and re-binds; all other frames
    /// propagate the previous boxes by correlation. The frame is always
    /// saved, appended to history and stored as the next call's "previous".
    pub fn step(&mut self, frame: &Frame) -> Vec<Detection> {
        let gray = frame.to_gray();

        let detections = if self.tracker.frame_index() == 0 {
            self.tracker.initial_detections(frame)
        } else if self.tracker.frame_index() % self.detection_rate == 0 {
            let boxes = self.tracker.detect_boxes(frame, true);
            self.tracker.bind(&boxes)
        } else {
            self.propagate(&gray)
        };

        let out = self.tracker.commit(detections);
        self.prev_gray = Some(gray);
        out
    }

    /// Estimates new positions for the previous frame's detections.
    ///
    /// Each box is cropped from the previous grayscale frame as a template; a
    /// degenerate crop carries the box forward unchanged. Otherwise the
    /// normalized cross-correlation response over the current frame, weighted
    /// by a Gaussian prior around the box's last center, picks the new center
    /// while width and height stay fixed.
    fn propagate(&self, gray: &nd::Array2<f64>) -> Vec<Detection> {
        let (prev_gray, prev_dets) = match (self.prev_gray.as_ref(), self.tracker.history().last())
        {
            (Some(g), Some(d)) => (g, d),
            _ => return Vec::new(),
        };

        let mut out = Vec::with_capacity(prev_dets.len());
        for det in prev_dets {
            let template = match crop(prev_gray, &det.bbox) {
                Some(t) => t,
                None => {
                    trace!("identity {}: degenerate template, box carried forward", det.id);
                    out.push(*det);
                    continue;
                }
            };

            let response = match_template(gray, &template);
            let (cx, cy) = det.bbox.center();
            let weights = gaussian_weights(
                response.dim(),
                cx,
                cy,
                det.bbox.width() / 2.0,
                det.bbox.height() / 2.0,
            );
            let weighted = &response * &weights;
            let (best_y, best_x) = argmax(&weighted);

            let w = det.bbox.width();
            let h = det.bbox.height();
            let xmin = best_x as f64 - w / 2.0;
            let ymin = best_y as f64 - h / 2.0;
            out.push(Detection::new(det.id, BBox::new(xmin, ymin, xmin + w, ymin + h)));
        }

        out
    }
}

/// Clamped integer crop of `bbox` from `gray`; `None` when the clamped region
/// has zero width or height.
fn crop(gray: &nd::Array2<f64>, bbox: &BBox) -> Option<nd::Array2<f64>> {
    let (rows, cols) = gray.dim();
    let x0 = bbox.xmin.round().clamp(0.0, cols as f64) as usize;
    let x1 = bbox.xmax.round().clamp(0.0, cols as f64) as usize;
    let y0 = bbox.ymin.round().clamp(0.0, rows as f64) as usize;
    let y1 = bbox.ymax.round().clamp(0.0, rows as f64) as usize;

    if x1 <= x0 || y1 <= y0 {
        return None;
    }

    Some(gray.slice(nd::s![y0..y1, x0..x1]).to_owned())
}

/// Zero-mean normalized cross-correlation of `template` against `image`.
///
/// The image is zero-padded so the response has the image's shape;
/// `response[[y, x]]` scores the window whose reference point (the template's
/// floor midpoint) sits at `(x, y)`. Windows with zero variance score 0.
pub fn match_template(image: &nd::Array2<f64>, template: &nd::Array2<f64>) -> nd::Array2<f64> {
    let (rows, cols) = image.dim();
    let (t_rows, t_cols) = template.dim();

    if t_rows == 0 || t_cols == 0 {
        return nd::Array2::zeros((rows, cols));
    }

    let n = (t_rows * t_cols) as f64;
    let t_mean = template.sum() / n;
    let t_zero = template.mapv(|v| v - t_mean);
    let t_ss: f64 = t_zero.iter().map(|v| v * v).sum();

    let cy = t_rows / 2;
    let cx = t_cols / 2;

    let mut padded = nd::Array2::zeros((rows + t_rows - 1, cols + t_cols - 1));
    padded
        .slice_mut(nd::s![cy..cy + rows, cx..cx + cols])
        .assign(image);

    let mut response = nd::Array2::zeros((rows, cols));
    for ((y, x), out) in response.indexed_iter_mut() {
        let window = padded.slice(nd::s![y..y + t_rows, x..x + t_cols]);

        let mut sum = 0.0;
        let mut sum_sq = 0.0;
        let mut cross = 0.0;
        for (&w, &t0) in window.iter().zip(t_zero.iter()) {
            sum += w;
            sum_sq += w * w;
            cross += w * t0;
        }

        // cross already equals the zero-mean numerator since the template sums to 0
        let var = sum_sq - sum * sum / n;
        let denom = (var * t_ss).sqrt();
        *out = if denom > f64::EPSILON { cross / denom } else { 0.0 };
    }

    response
}

/// Isotropic Gaussian surface centered at `(cx, cy)` with axis falloffs
/// `dx`, `dy` (half the box extents when used as a motion prior).
pub fn gaussian_weights(
    (rows, cols): (usize, usize),
    cx: f64,
    cy: f64,
    dx: f64,
    dy: f64,
) -> nd::Array2<f64> {
    nd::Array2::from_shape_fn((rows, cols), |(y, x)| {
        let gx = (x as f64 - cx).powi(2) / (dx * dx);
        let gy = (y as f64 - cy).powi(2) / (dy * dy);
        (-gx - gy).exp()
    })
}

/// Row-major-first argmax; ties resolve to the earliest scan position.
fn argmax(arr: &nd::Array2<f64>) -> (usize, usize) {
    let mut best = f64::NEG_INFINITY;
    let mut pos = (0, 0);
    for ((y, x), &v) in arr.indexed_iter() {
        if v > best {
            best = v;
            pos = (y, x);
        }
    }
    pos
}

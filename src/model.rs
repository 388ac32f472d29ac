use ndarray as nd;

/// Axis-aligned bounding box, `(xmin, ymin, xmax, ymax)` in pixel coordinates.
///
/// Zero-area boxes are representable and tolerated throughout; nothing in the
/// crate rejects them.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct BBox {
    pub xmin: f64,
    pub ymin: f64,
    pub xmax: f64,
    pub ymax: f64,
}

impl BBox {
    pub fn new(xmin: f64, ymin: f64, xmax: f64, ymax: f64) -> Self {
        Self {
            xmin,
            ymin,
            xmax,
            ymax,
        }
    }

    pub fn width(&self) -> f64 {
        self.xmax - self.xmin
    }

    pub fn height(&self) -> f64 {
        self.ymax - self.ymin
    }

    pub fn area(&self) -> f64 {
        (self.width() * self.height()).max(0.0)
    }

    pub fn center(&self) -> (f64, f64) {
        (
            (self.xmin + self.xmax) / 2.0,
            (self.ymin + self.ymax) / 2.0,
        )
    }

    /// Intersection over union with `other`.
    ///
    /// Negative overlap extents clamp to zero; a zero union area (two
    /// zero-area boxes) yields 0.0 rather than a division fault.
    pub fn iou(&self, other: &Self) -> f64 {
        let iwidth = (self.xmax.min(other.xmax) - self.xmin.max(other.xmin)).max(0.0);
        let iheight = (self.ymax.min(other.ymax) - self.ymin.max(other.ymin)).max(0.0);
        let intersection = iwidth * iheight;

        let union = self.area() + other.area() - intersection;

        if union == 0.0 {
            return 0.0;
        }

        intersection / union
    }
}

/// A box carrying its identity label, either tracked or ground truth.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Detection {
    pub id: i64,
    pub bbox: BBox,
}

impl Detection {
    pub fn new(id: i64, bbox: BBox) -> Self {
        Self { id, bbox }
    }
}

/// One video frame. Dimensions are fixed per sequence.
#[derive(Debug, Clone)]
pub enum Frame {
    /// Grayscale intensities, `[0, 1]`, indexed `[row, col]`.
    Gray(nd::Array2<f64>),
    /// Packed RGB bytes, indexed `[row, col, channel]`.
    Rgb(nd::Array3<u8>),
}

impl Frame {
    pub fn height(&self) -> usize {
        match self {
            Frame::Gray(g) => g.nrows(),
            Frame::Rgb(rgb) => rgb.shape()[0],
        }
    }

    pub fn width(&self) -> usize {
        match self {
            Frame::Gray(g) => g.ncols(),
            Frame::Rgb(rgb) => rgb.shape()[1],
        }
    }

    /// Grayscale view of the frame, luma-weighted for RGB input.
    pub fn to_gray(&self) -> nd::Array2<f64> {
        match self {
            Frame::Gray(g) => g.clone(),
            Frame::Rgb(rgb) => {
                let (rows, cols) = (rgb.shape()[0], rgb.shape()[1]);
                nd::Array2::from_shape_fn((rows, cols), |(y, x)| {
                    let r = rgb[[y, x, 0]] as f64;
                    let g = rgb[[y, x, 1]] as f64;
                    let b = rgb[[y, x, 2]] as f64;
                    (0.2125 * r + 0.7154 * g + 0.0721 * b) / 255.0
                })
            }
        }
    }
}

/// External object detector collaborator.
///
/// Implementations discard detections scoring below `min_confidence` and, when
/// `labels` is given, keep only detections whose label matches one of the
/// entries case-insensitively. The tracking core consumes the boxes only; the
/// labels never reach identity assignment.
pub trait Detector {
    fn detect(
        &mut self,
        frame: &Frame,
        min_confidence: f64,
        labels: Option<&[String]>,
    ) -> Vec<(String, BBox)>;
}

impl<F> Detector for F
where
    F: FnMut(&Frame, f64, Option<&[String]>) -> Vec<(String, BBox)>,
{
    fn detect(
        &mut self,
        frame: &Frame,
        min_confidence: f64,
        labels: Option<&[String]>,
    ) -> Vec<(String, BBox)> {
        self(frame, min_confidence, labels)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    use approx::assert_relative_eq;

    #[test]
    fn test_iou_symmetric() {
        let a = BBox::new(0.0, 0.0, 10.0, 10.0);
        let b = BBox::new(5.0, 5.0, 15.0, 15.0);

        assert_relative_eq!(a.iou(&b), b.iou(&a));
        assert_relative_eq!(a.iou(&b), 25.0 / 175.0);
    }

    #[test]
    fn test_iou_self_is_one() {
        let a = BBox::new(2.0, 3.0, 8.0, 9.0);

        assert_relative_eq!(a.iou(&a), 1.0);
    }

    #[test]
    fn test_iou_disjoint_is_zero() {
        let a = BBox::new(0.0, 0.0, 1.0, 2.0);
        let b = BBox::new(1.0, 2.0, 3.0, 3.0);

        assert_relative_eq!(a.iou(&b), 0.0);
    }

    #[test]
    fn test_iou_zero_area_boxes() {
        let a = BBox::new(5.0, 5.0, 5.0, 5.0);

        assert_relative_eq!(a.iou(&a), 0.0);
    }

    #[test]
    fn test_iou_in_unit_range() {
        let boxes = [
            BBox::new(0.0, 0.0, 4.0, 4.0),
            BBox::new(1.0, 1.0, 3.0, 5.0),
            BBox::new(-2.0, -2.0, 2.0, 2.0),
            BBox::new(3.0, 3.0, 3.0, 3.0),
        ];

        for a in &boxes {
            for b in &boxes {
                let iou = a.iou(b);
                assert!((0.0..=1.0).contains(&iou), "iou {} out of range", iou);
            }
        }
    }

    #[test]
    fn test_to_gray_luma_weights() {
        let mut rgb = nd::Array3::zeros((1, 3, 3));
        rgb[[0, 0, 0]] = 255;
        rgb[[0, 1, 1]] = 255;
        rgb[[0, 2, 2]] = 255;
        let gray = Frame::Rgb(rgb).to_gray();

        assert_relative_eq!(gray[[0, 0]], 0.2125);
        assert_relative_eq!(gray[[0, 1]], 0.7154);
        assert_relative_eq!(gray[[0, 2]], 0.0721);
    }

    #[test]
    fn test_gray_frame_dims() {
        let frame = Frame::Gray(nd::Array2::zeros((4, 6)));

        assert_eq!(frame.height(), 4);
        assert_eq!(frame.width(), 6);
    }
}

//! Per-frame measures for video object segmentation.
//!
//! Region similarity `J` is the Jaccard index of the two masks. Boundary
//! similarity `F` is the F-measure between the mask contours, where a contour
//! pixel counts as matched when the other contour passes within a disk of
//! `ceil(bound_th * diagonal)` pixels. Both follow the DAVIS 2016 benchmark
//! code so that results are comparable with published numbers.

use std::fmt;
use std::str::FromStr;

use crate::error::Error;
use crate::mask::Mask;

/// Default boundary tolerance, as a fraction of the image diagonal.
pub const DEFAULT_BOUND_TH: f64 = 0.008;

/// A similarity score for one (annotation, segmentation) frame pair.
///
/// Implementations must be pure; the sequence evaluator calls them from
/// several threads.
pub trait FrameMetric: Sync {
    fn score(&self, annotation: &Mask, segmentation: &Mask) -> f64;

    /// Whether recall and decay statistics mean anything for this metric.
    fn has_decay(&self) -> bool {
        true
    }
}

/// Region similarity `J`.
#[derive(Debug, Clone, Copy, Default)]
pub struct RegionSimilarity;

impl FrameMetric for RegionSimilarity {
    fn score(&self, annotation: &Mask, segmentation: &Mask) -> f64 {
        db_eval_iou(annotation, segmentation)
    }
}

/// Boundary similarity `F`.
#[derive(Debug, Clone, Copy)]
pub struct BoundarySimilarity {
    pub bound_th: f64,
}

impl Default for BoundarySimilarity {
    fn default() -> Self {
        BoundarySimilarity {
            bound_th: DEFAULT_BOUND_TH,
        }
    }
}

impl FrameMetric for BoundarySimilarity {
    fn score(&self, annotation: &Mask, segmentation: &Mask) -> f64 {
        db_eval_boundary(annotation, segmentation, self.bound_th)
    }
}

/// Temporal stability `T`. Reserved: every frame is undefined and so are the
/// statistics.
#[derive(Debug, Clone, Copy, Default)]
pub struct TemporalStability;

impl FrameMetric for TemporalStability {
    fn score(&self, _annotation: &Mask, _segmentation: &Mask) -> f64 {
        f64::NAN
    }

    fn has_decay(&self) -> bool {
        false
    }
}

/// The measures a DAVIS evaluation can be configured with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Measure {
    J,
    F,
    T,
}

impl Measure {
    /// Frame metric backing this measure.
    pub fn metric(self, bound_th: f64) -> Box<dyn FrameMetric> {
        match self {
            Measure::J => Box::new(RegionSimilarity),
            Measure::F => Box::new(BoundarySimilarity { bound_th }),
            Measure::T => Box::new(TemporalStability),
        }
    }

    /// Whether the measure produces numbers at all.
    pub fn is_implemented(self) -> bool {
        !matches!(self, Measure::T)
    }
}

impl FromStr for Measure {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "J" => Ok(Measure::J),
            "F" => Ok(Measure::F),
            "T" => Ok(Measure::T),
            other => Err(Error::UnknownMetric(other.to_string())),
        }
    }
}

impl fmt::Display for Measure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Measure::J => "J",
            Measure::F => "F",
            Measure::T => "T",
        };
        f.write_str(s)
    }
}

/// Jaccard index of two masks of the same shape. Two empty masks score 1.
pub fn db_eval_iou(annotation: &Mask, segmentation: &Mask) -> f64 {
    let union = annotation.union_count(segmentation);
    if union == 0 {
        return 1.0;
    }
    annotation.intersection_count(segmentation) as f64 / union as f64
}

/// Contour F-measure of two masks of the same shape.
///
/// `bound_th >= 1` is an absolute tolerance in pixels; below 1 it is a
/// fraction of the image diagonal.
pub fn db_eval_boundary(foreground: &Mask, ground_truth: &Mask, bound_th: f64) -> f64 {
    let (h, w) = foreground.shape();
    let bound_pix = if bound_th >= 1.0 {
        bound_th
    } else {
        (bound_th * (h as f64).hypot(w as f64)).ceil()
    };
    let radius = bound_pix as usize;

    let fg_boundary = seg2bmap(foreground);
    let gt_boundary = seg2bmap(ground_truth);
    let fg_dil = dilate(&fg_boundary, radius);
    let gt_dil = dilate(&gt_boundary, radius);

    let n_fg = fg_boundary.count();
    let n_gt = gt_boundary.count();

    let (precision, recall) = match (n_fg, n_gt) {
        (0, 0) => (1.0, 1.0),
        (0, _) => (1.0, 0.0),
        (_, 0) => (0.0, 1.0),
        _ => (
            fg_boundary.intersection_count(&gt_dil) as f64 / n_fg as f64,
            gt_boundary.intersection_count(&fg_dil) as f64 / n_gt as f64,
        ),
    };

    if precision + recall == 0.0 {
        0.0
    } else {
        2.0 * precision * recall / (precision + recall)
    }
}

/// One-pixel-wide boundary map of a binary segmentation.
///
/// A pixel is on the boundary when it differs from its east, south or
/// south-east neighbour. The last row only compares east, the last column
/// only south, and the bottom-right corner is never a boundary.
pub fn seg2bmap(seg: &Mask) -> Mask {
    let (h, w) = (seg.height() as usize, seg.width() as usize);
    Mask::from_fn(seg.height(), seg.width(), |y, x| {
        let v = seg.get(y, x);
        let last_row = y + 1 == h;
        let last_col = x + 1 == w;
        match (last_row, last_col) {
            (true, true) => false,
            (true, false) => v != seg.get(y, x + 1),
            (false, true) => v != seg.get(y + 1, x),
            (false, false) => {
                v != seg.get(y, x + 1) || v != seg.get(y + 1, x) || v != seg.get(y + 1, x + 1)
            }
        }
    })
}

/// Offsets `(dy, dx)` of a disk structuring element: all points with
/// `dy² + dx² <= radius²`.
pub fn disk(radius: usize) -> Vec<(isize, isize)> {
    let r = radius as isize;
    let mut offsets = Vec::new();
    for dy in -r..=r {
        for dx in -r..=r {
            if dy * dy + dx * dx <= r * r {
                offsets.push((dy, dx));
            }
        }
    }
    offsets
}

/// Binary dilation by a disk of the given radius.
pub fn dilate(mask: &Mask, radius: usize) -> Mask {
    let (h, w) = (mask.height() as isize, mask.width() as isize);
    let footprint = disk(radius);
    let mut out = Mask::zeros(mask.height(), mask.width());
    for (i, _) in mask.as_slice().iter().enumerate().filter(|(_, &v)| v) {
        let (y, x) = ((i as isize) / w, (i as isize) % w);
        for &(dy, dx) in &footprint {
            let (ny, nx) = (y + dy, x + dx);
            if (0..h).contains(&ny) && (0..w).contains(&nx) {
                out.set(ny as usize, nx as usize, true);
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn square(size: u32, y0: usize, x0: usize, side: usize) -> Mask {
        Mask::from_fn(size, size, |y, x| {
            (y0..y0 + side).contains(&y) && (x0..x0 + side).contains(&x)
        })
    }

    #[test]
    fn test_iou_identical_and_disjoint() {
        let a = square(10, 2, 2, 4);
        let b = square(10, 6, 6, 3);
        assert_relative_eq!(db_eval_iou(&a, &a), 1.0);
        assert_relative_eq!(db_eval_iou(&a, &b), 0.0);
    }

    #[test]
    fn test_iou_both_empty_is_one() {
        let empty = Mask::zeros(5, 5);
        assert_relative_eq!(db_eval_iou(&empty, &empty), 1.0);
    }

    #[test]
    fn test_iou_partial_overlap() {
        // 4x4 vs the same square shifted one column: 12 shared, 20 in union
        let a = square(10, 2, 2, 4);
        let b = square(10, 2, 3, 4);
        assert_relative_eq!(db_eval_iou(&a, &b), 12.0 / 20.0);
    }

    #[test]
    fn test_seg2bmap_square() {
        let seg = square(6, 1, 1, 3);
        let b = seg2bmap(&seg);
        // inside pixel with all three neighbours set is not a boundary
        assert!(!b.get(1, 1));
        // pixels whose east/south side leaves the object are
        assert!(b.get(1, 3));
        assert!(b.get(3, 1));
        // background pixels just before the object are boundary too
        assert!(b.get(0, 0));
        assert!(b.get(0, 1));
        assert!(!b.get(5, 5));
    }

    #[test]
    fn test_seg2bmap_last_row_and_column() {
        let seg = Mask::from_fn(3, 3, |y, x| y == 2 && x == 1);
        let b = seg2bmap(&seg);
        assert!(b.get(2, 0));
        assert!(b.get(2, 1));
        assert!(!b.get(2, 2));
    }

    #[test]
    fn test_disk_radius_one_is_a_cross() {
        let mut d = disk(1);
        d.sort_unstable();
        assert_eq!(d, vec![(-1, 0), (0, -1), (0, 0), (0, 1), (1, 0)]);
        assert_eq!(disk(0), vec![(0, 0)]);
    }

    #[test]
    fn test_dilate_clips_at_border() {
        let m = Mask::from_fn(3, 3, |y, x| y == 0 && x == 0);
        let d = dilate(&m, 1);
        assert_eq!(d.count(), 3);
    }

    #[test]
    fn test_boundary_identical_masks() {
        let a = square(20, 4, 4, 8);
        assert_relative_eq!(db_eval_boundary(&a, &a, DEFAULT_BOUND_TH), 1.0);
    }

    #[test]
    fn test_boundary_empty_prediction() {
        let gt = square(20, 4, 4, 8);
        let empty = Mask::zeros(20, 20);
        assert_relative_eq!(db_eval_boundary(&gt, &empty, DEFAULT_BOUND_TH), 0.0);
        assert_relative_eq!(db_eval_boundary(&empty, &gt, DEFAULT_BOUND_TH), 0.0);
        assert_relative_eq!(db_eval_boundary(&empty, &empty, DEFAULT_BOUND_TH), 1.0);
    }

    #[test]
    fn test_boundary_tolerance_absorbs_small_shift() {
        let a = square(100, 20, 20, 40);
        let b = square(100, 20, 21, 40);
        // diagonal ~141 px, tolerance ceil(1.13) = 2 px
        assert_relative_eq!(db_eval_boundary(&a, &b, DEFAULT_BOUND_TH), 1.0);
        let far = square(100, 20, 30, 40);
        assert!(db_eval_boundary(&a, &far, DEFAULT_BOUND_TH) < 1.0);
    }

    #[test]
    fn test_measure_parse() {
        assert_eq!("J".parse::<Measure>().unwrap(), Measure::J);
        assert_eq!("T".parse::<Measure>().unwrap(), Measure::T);
        assert!(matches!(
            "Q".parse::<Measure>(),
            Err(Error::UnknownMetric(name)) if name == "Q"
        ));
    }

    #[test]
    fn test_temporal_is_undefined() {
        let metric = Measure::T.metric(DEFAULT_BOUND_TH);
        let m = Mask::zeros(2, 2);
        assert!(metric.score(&m, &m).is_nan());
        assert!(!metric.has_decay());
        assert!(Measure::J.metric(DEFAULT_BOUND_TH).has_decay());
    }
}

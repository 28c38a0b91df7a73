//! Frame records and per-sequence evaluation.
//!
//! A sequence is the ordered list of ground-truth frames of one evaluation
//! run paired index-by-index with the predicted frames. Predictions are
//! gap-filled first so that every frame has exactly one partner.

use std::ops::Range;

use log::warn;
use rayon::prelude::*;

use crate::davis::AnnotationSource;
use crate::error::{Error, Result};
use crate::mask::Mask;
use crate::measures::FrameMetric;
use crate::statistics::{db_statistics, Statistics};
use crate::types::Annotation;

/// A ground-truth frame with its decoded mask.
#[derive(Debug, Clone)]
pub struct FrameAnnotation {
    pub id: u64,
    pub image_id: u64,
    pub category_id: u64,
    pub mask: Mask,
    /// Crowd regions are flagged but still evaluated.
    pub ignore: bool,
}

impl FrameAnnotation {
    pub fn new(ann: &Annotation, mask: Mask) -> Self {
        FrameAnnotation {
            id: ann.id,
            image_id: ann.image_id,
            category_id: ann.category_id,
            mask,
            ignore: ann.iscrowd,
        }
    }
}

impl AsRef<Mask> for FrameAnnotation {
    fn as_ref(&self) -> &Mask {
        &self.mask
    }
}

/// A predicted frame with its decoded mask.
#[derive(Debug, Clone)]
pub struct FrameDetection {
    /// `None` for synthesised frames.
    pub id: Option<u64>,
    pub image_id: u64,
    pub category_id: Option<u64>,
    pub score: f64,
    pub mask: Mask,
    /// `[x, y, w, h]`.
    pub bbox: [f64; 4],
    pub ignore: bool,
    /// True when the frame was missing from the results and filled in empty.
    pub synthetic: bool,
}

impl FrameDetection {
    pub fn new(ann: &Annotation, mask: Mask) -> Self {
        let bbox = ann.bbox.unwrap_or_else(|| mask.bbox());
        FrameDetection {
            id: Some(ann.id),
            image_id: ann.image_id,
            category_id: Some(ann.category_id),
            score: ann.score.unwrap_or(0.0),
            mask,
            bbox,
            ignore: ann.iscrowd,
            synthetic: false,
        }
    }

    /// An empty stand-in for a frame the results skipped.
    pub fn placeholder(image_id: u64, height: u32, width: u32) -> Self {
        FrameDetection {
            id: None,
            image_id,
            category_id: None,
            score: 0.0,
            mask: Mask::zeros(height, width),
            bbox: [0.0; 4],
            ignore: false,
            synthetic: true,
        }
    }
}

impl AsRef<Mask> for FrameDetection {
    fn as_ref(&self) -> &Mask {
        &self.mask
    }
}

/// Pair every record with its decoded mask.
pub fn decode_masks<'a, S>(
    records: Vec<&'a Annotation>,
    source: &S,
) -> Result<Vec<(&'a Annotation, Mask)>>
where
    S: AnnotationSource + ?Sized,
{
    records
        .into_iter()
        .map(|ann| {
            source
                .ann_to_mask(ann)
                .map(|m| (ann, m))
                .ok_or(Error::MissingMask { ann_id: ann.id })
        })
        .collect()
}

/// Make the detection list cover consecutive frame ids.
///
/// Detections must be sorted by `image_id`. A detection repeating the id of
/// the last kept one is dropped. When the next kept id jumps past
/// `last + 1`, an empty placeholder shaped like that detection is inserted
/// for each skipped id. The first detection is taken as-is, so frames before
/// it are not filled.
pub fn fill_gaps(detections: Vec<FrameDetection>) -> Vec<FrameDetection> {
    let mut filled = Vec::with_capacity(detections.len());
    let mut last_img_id: Option<u64> = None;
    for dt in detections {
        if let Some(last) = last_img_id {
            if dt.image_id == last {
                continue;
            }
            for missing in last + 1..dt.image_id {
                warn!("Image {} is missing. An empty result is appended.", missing);
                let (h, w) = dt.mask.shape();
                filled.push(FrameDetection::placeholder(missing, h, w));
            }
        }
        last_img_id = Some(dt.image_id);
        filled.push(dt);
    }
    filled
}

/// Per-frame scores and summary statistics of one measure over one sequence.
#[derive(Debug, Clone)]
pub struct SequenceEval {
    /// One value per frame, padded with an undefined value at both ends.
    pub per_frame: Vec<f64>,
    pub stats: Statistics,
}

impl SequenceEval {
    /// Per-frame scores without the padding.
    pub fn frames(&self) -> &[f64] {
        crate::statistics::interior(&self.per_frame)
    }
}

/// Score every (annotation, segmentation) frame pair and summarise.
///
/// Fails with [`Error::ShapeMismatch`] when the sequences differ in length
/// and [`Error::MaskShapeMismatch`] when a frame pair differs in size.
/// Metrics without decay get undefined recall and decay.
pub fn eval_sequence<A, S, M>(
    annotations: &[A],
    segmentations: &[S],
    metric: &M,
) -> Result<SequenceEval>
where
    A: AsRef<Mask> + Sync,
    S: AsRef<Mask> + Sync,
    M: FrameMetric + ?Sized,
{
    if annotations.len() != segmentations.len() {
        return Err(Error::ShapeMismatch {
            annotations: annotations.len(),
            segmentations: segmentations.len(),
        });
    }
    for (frame, (an, sg)) in annotations.iter().zip(segmentations).enumerate() {
        let (an, sg) = (an.as_ref(), sg.as_ref());
        if an.shape() != sg.shape() {
            return Err(Error::MaskShapeMismatch {
                frame,
                annotation: an.shape(),
                segmentation: sg.shape(),
            });
        }
    }

    let scores: Vec<f64> = annotations
        .par_iter()
        .zip(segmentations.par_iter())
        .map(|(an, sg)| metric.score(an.as_ref(), sg.as_ref()))
        .collect();

    let mut per_frame = Vec::with_capacity(scores.len() + 2);
    per_frame.push(f64::NAN);
    per_frame.extend(scores);
    per_frame.push(f64::NAN);

    let mut stats = db_statistics(&per_frame);
    if !metric.has_decay() {
        stats.recall = f64::NAN;
        stats.decay = f64::NAN;
    }
    Ok(SequenceEval { per_frame, stats })
}

/// A run of consecutive frames sharing one ground-truth category.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SequenceRange {
    pub category_id: u64,
    /// Index range into the frame lists.
    pub frames: Range<usize>,
}

/// Split frames into videos at every change of category id.
pub fn split_sequences(annotations: &[FrameAnnotation]) -> Vec<SequenceRange> {
    let mut ranges: Vec<SequenceRange> = Vec::new();
    for (i, ann) in annotations.iter().enumerate() {
        match ranges.last_mut() {
            Some(r) if r.category_id == ann.category_id => r.frames.end = i + 1,
            _ => ranges.push(SequenceRange {
                category_id: ann.category_id,
                frames: i..i + 1,
            }),
        }
    }
    ranges
}

/// Average pixel error: mean number of ground-truth pixels per frame that the
/// prediction misses. `NaN` for an empty sequence.
pub fn average_pixel_error<A, S>(annotations: &[A], segmentations: &[S]) -> f64
where
    A: AsRef<Mask>,
    S: AsRef<Mask>,
{
    if annotations.is_empty() {
        return f64::NAN;
    }
    let missed: u64 = annotations
        .iter()
        .zip(segmentations)
        .map(|(an, sg)| {
            let (an, sg) = (an.as_ref(), sg.as_ref());
            an.count() - an.intersection_count(sg)
        })
        .sum();
    missed as f64 / annotations.len() as f64
}

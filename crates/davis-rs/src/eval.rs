//! DAVIS evaluation engine.
//!
//! Builds the ground-truth and predicted frame lists from two annotation
//! sources, scores every configured measure over the whole run, and reports
//! mean, recall and decay per measure.

use std::fmt::Write as _;
use std::ops::Range;
use std::time::{Duration, Instant};

use log::{debug, info};

use crate::davis::{AnnotationSource, DAVIS};
use crate::error::{Error, Result};
use crate::measures::Measure;
use crate::params::Params;
use crate::sequence::{
    average_pixel_error, decode_masks, eval_sequence, fill_gaps, split_sequences, FrameAnnotation,
    FrameDetection, SequenceEval,
};
use crate::statistics::Statistics;

/// Where an evaluation run currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvalStage {
    Idle,
    /// Frame lists are built and gap-filled.
    Prepared,
    /// The given measure was the last one scored.
    Measured(Measure),
    Reported,
}

/// Scores of one measure.
#[derive(Debug, Clone)]
pub struct MeasureResult {
    pub measure: Measure,
    pub eval: SequenceEval,
}

impl MeasureResult {
    pub fn stats(&self) -> Statistics {
        self.eval.stats
    }
}

/// Scores of one video (a run of frames sharing a category).
#[derive(Debug, Clone)]
pub struct SequenceResult {
    pub category_id: u64,
    /// Index range into the evaluated frame lists.
    pub frames: Range<usize>,
    pub measures: Vec<MeasureResult>,
    /// Average pixel error.
    pub ape: f64,
}

/// The DAVIS evaluation object.
pub struct DAVISeval<S: AnnotationSource = DAVIS> {
    pub davis_gt: S,
    pub davis_dt: S,
    pub params: Params,
    gts: Vec<FrameAnnotation>,
    dts: Vec<FrameDetection>,
    stage: EvalStage,
    /// Whole-run results, one per configured measure.
    pub results: Vec<MeasureResult>,
    /// Per-video results from [`DAVISeval::evaluate_per_sequence`].
    pub sequences: Vec<SequenceResult>,
    elapsed: Option<Duration>,
}

impl<S: AnnotationSource> DAVISeval<S> {
    /// Create an evaluator over every frame and category of the ground truth.
    pub fn new(davis_gt: S, davis_dt: S) -> Self {
        let mut params = Params::new();
        params.img_ids = davis_gt.get_img_ids();
        params.img_ids.sort_unstable();
        params.cat_ids = davis_gt.get_cat_ids();
        params.cat_ids.sort_unstable();
        DAVISeval {
            davis_gt,
            davis_dt,
            params,
            gts: Vec::new(),
            dts: Vec::new(),
            stage: EvalStage::Idle,
            results: Vec::new(),
            sequences: Vec::new(),
            elapsed: None,
        }
    }

    pub fn stage(&self) -> EvalStage {
        self.stage
    }

    /// Ground-truth frames of the last preparation.
    pub fn gts(&self) -> &[FrameAnnotation] {
        &self.gts
    }

    /// Gap-filled predicted frames of the last preparation.
    pub fn dts(&self) -> &[FrameDetection] {
        &self.dts
    }

    /// Wall-clock time of the last evaluation.
    pub fn elapsed(&self) -> Option<Duration> {
        self.elapsed
    }

    fn reset(&mut self) {
        self.gts.clear();
        self.dts.clear();
        self.results.clear();
        self.sequences.clear();
        self.elapsed = None;
        self.stage = EvalStage::Idle;
    }

    /// Decode both frame lists and fill gaps in the predictions.
    fn prepare(&mut self) -> Result<()> {
        let p = &self.params;

        let gt_ids = self.davis_gt.get_ann_ids(&p.img_ids, &p.cat_ids);
        let gt_anns = self.davis_gt.load_anns(&gt_ids);
        self.gts = decode_masks(gt_anns, &self.davis_gt)?
            .into_iter()
            .map(|(ann, mask)| FrameAnnotation::new(ann, mask))
            .collect();
        // frames pair up by position, so both lists go in frame order
        self.gts.sort_by_key(|g| g.image_id);

        let dt_ids = self.davis_dt.get_ann_ids(&p.img_ids, &p.cat_ids);
        let dt_anns = self.davis_dt.load_anns(&dt_ids);
        let mut dts: Vec<FrameDetection> = decode_masks(dt_anns, &self.davis_dt)?
            .into_iter()
            .map(|(ann, mask)| FrameDetection::new(ann, mask))
            .collect();
        dts.sort_by_key(|d| d.image_id);
        self.dts = fill_gaps(dts);

        debug!(
            "prepared {} ground-truth and {} predicted frames",
            self.gts.len(),
            self.dts.len()
        );
        self.stage = EvalStage::Prepared;
        Ok(())
    }

    /// Run the evaluation over every configured measure.
    ///
    /// Buffers from a previous call are discarded first. An unknown measure
    /// name fails before any frame is decoded.
    pub fn evaluate(&mut self) -> Result<()> {
        let tic = Instant::now();
        self.reset();
        let measures = self.params.parse_measures()?;

        self.prepare()?;
        for measure in measures {
            info!("Evaluating {}...", measure);
            let metric = measure.metric(self.params.bound_th);
            let eval = eval_sequence(&self.gts, &self.dts, &*metric)?;
            self.results.push(MeasureResult { measure, eval });
            self.stage = EvalStage::Measured(measure);
        }

        self.elapsed = Some(tic.elapsed());
        Ok(())
    }

    /// Run the evaluation separately on every video.
    ///
    /// Frames are split into videos wherever the ground-truth category
    /// changes; each video also gets its average pixel error.
    pub fn evaluate_per_sequence(&mut self) -> Result<()> {
        let tic = Instant::now();
        self.reset();
        let measures = self.params.parse_measures()?;

        self.prepare()?;
        if self.gts.len() != self.dts.len() {
            return Err(Error::ShapeMismatch {
                annotations: self.gts.len(),
                segmentations: self.dts.len(),
            });
        }

        for range in split_sequences(&self.gts) {
            let gts = &self.gts[range.frames.clone()];
            let dts = &self.dts[range.frames.clone()];
            let mut results = Vec::with_capacity(measures.len());
            for &measure in &measures {
                let metric = measure.metric(self.params.bound_th);
                let eval = eval_sequence(gts, dts, &*metric)?;
                results.push(MeasureResult { measure, eval });
                self.stage = EvalStage::Measured(measure);
            }
            self.sequences.push(SequenceResult {
                category_id: range.category_id,
                frames: range.frames,
                measures: results,
                ape: average_pixel_error(gts, dts),
            });
        }

        self.elapsed = Some(tic.elapsed());
        Ok(())
    }

    /// Flattened `[M, O, D]` of every measure, in configuration order.
    pub fn stats(&self) -> Option<Vec<f64>> {
        if self.results.is_empty() {
            return None;
        }
        Some(
            self.results
                .iter()
                .flat_map(|r| {
                    let s = r.stats();
                    [s.mean, s.recall, s.decay]
                })
                .collect(),
        )
    }

    /// The whole-run report as printed by [`DAVISeval::summarize`].
    pub fn report(&self) -> String {
        let mut out = String::new();
        if let Some(t) = self.elapsed {
            let _ = writeln!(out, "DONE (t={:0.2}s).", t.as_secs_f64());
        }
        for r in &self.results {
            write_measure_line(&mut out, r);
        }
        out
    }

    /// Print the per-measure summary.
    pub fn summarize(&mut self) {
        if self.results.is_empty() {
            eprintln!("Please run evaluate() first.");
            return;
        }
        print!("{}", self.report());
        self.stage = EvalStage::Reported;
    }

    /// The per-video report as printed by [`DAVISeval::summarize_per_sequence`].
    pub fn report_per_sequence(&self) -> String {
        let mut out = String::new();
        for seq in &self.sequences {
            let _ = writeln!(
                out,
                "category {} (frames {}..{}):",
                seq.category_id, seq.frames.start, seq.frames.end
            );
            for r in &seq.measures {
                write_measure_line(&mut out, r);
            }
            let _ = writeln!(out, "APE: {}", fmt_value(seq.ape));
        }
        if let Some(t) = self.elapsed {
            let _ = writeln!(out, "DONE (t={:0.2}s).", t.as_secs_f64());
        }
        out
    }

    /// Print one block per video.
    pub fn summarize_per_sequence(&mut self) {
        if self.sequences.is_empty() {
            eprintln!("Please run evaluate_per_sequence() first.");
            return;
        }
        print!("{}", self.report_per_sequence());
        self.stage = EvalStage::Reported;
    }
}

fn write_measure_line(out: &mut String, r: &MeasureResult) {
    let m = r.measure;
    if m.is_implemented() {
        let s = r.stats();
        let _ = writeln!(
            out,
            "{m}(M): {}, {m}(O): {}, {m}(D): {}",
            fmt_value(s.mean),
            fmt_value(s.recall),
            fmt_value(s.decay)
        );
    } else {
        let _ = writeln!(out, "{m}(M): unfinished");
    }
}

// Undefined values print as `nan`, like numpy.
fn fmt_value(v: f64) -> String {
    if v.is_nan() {
        "nan".to_string()
    } else {
        v.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Annotation, Category, Dataset, Image, Segmentation};
    use approx::assert_relative_eq;

    const H: u32 = 2;
    const W: u32 = 2;

    fn frame(id: u64) -> Image {
        Image {
            id,
            file_name: format!("{:05}.jpg", id - 1),
            height: H,
            width: W,
        }
    }

    /// Column-major counts over a 2x2 frame.
    fn ann(id: u64, image_id: u64, category_id: u64, counts: Vec<u32>) -> Annotation {
        Annotation {
            id,
            image_id,
            category_id,
            bbox: None,
            area: None,
            segmentation: Some(Segmentation::UncompressedRle {
                size: [H, W],
                counts,
            }),
            iscrowd: false,
            score: Some(1.0),
        }
    }

    fn dataset(annotations: Vec<Annotation>) -> Dataset {
        Dataset {
            images: (1..=4).map(frame).collect(),
            annotations,
            categories: vec![
                Category {
                    id: 1,
                    name: "bear".into(),
                    supercategory: None,
                },
                Category {
                    id: 2,
                    name: "swan".into(),
                    supercategory: None,
                },
            ],
        }
    }

    // left column foreground
    fn left() -> Vec<u32> {
        vec![0, 2, 2]
    }

    // right column foreground
    fn right() -> Vec<u32> {
        vec![2, 2]
    }

    fn make_eval(dt_frames: &[(u64, Vec<u32>)]) -> DAVISeval {
        let gt = DAVIS::from_dataset(dataset(
            (1..=4).map(|i| ann(i, i, if i <= 2 { 1 } else { 2 }, left())).collect(),
        ));
        let dt = DAVIS::from_dataset(dataset(
            dt_frames
                .iter()
                .enumerate()
                .map(|(k, (img, counts))| ann(k as u64 + 1, *img, 1, counts.clone()))
                .collect(),
        ));
        DAVISeval::new(gt, dt)
    }

    #[test]
    fn test_new_sets_ids_from_ground_truth() {
        let e = make_eval(&[]);
        assert_eq!(e.params.img_ids, vec![1, 2, 3, 4]);
        assert_eq!(e.params.cat_ids, vec![1, 2]);
        assert_eq!(e.stage(), EvalStage::Idle);
    }

    #[test]
    fn test_evaluate_j_and_f() {
        let mut e = make_eval(&[(1, left()), (2, right()), (3, left()), (4, left())]);
        e.evaluate().unwrap();
        assert_eq!(e.stage(), EvalStage::Measured(Measure::F));
        let j = e.results[0].stats();
        assert_eq!(e.results[0].measure, Measure::J);
        assert_eq!(e.results[0].eval.frames(), &[1.0, 0.0, 1.0, 1.0]);
        assert_relative_eq!(j.mean, 0.75);
        assert_relative_eq!(j.recall, 0.75);
        assert_eq!(e.stats().unwrap().len(), 6);
    }

    #[test]
    fn test_missing_frame_is_filled_empty() {
        let mut e = make_eval(&[(1, left()), (3, left()), (4, left())]);
        e.params.measures = vec!["J".into()];
        e.evaluate().unwrap();
        assert_eq!(e.dts().len(), 4);
        assert!(e.dts()[1].synthetic);
        assert_eq!(e.results[0].eval.frames(), &[1.0, 0.0, 1.0, 1.0]);
    }

    #[test]
    fn test_frames_pair_by_image_not_annotation_id() {
        // annotation 1 sits on frame 2 and annotation 2 on frame 1
        let gt = DAVIS::from_dataset(dataset(vec![ann(1, 2, 1, right()), ann(2, 1, 1, left())]));
        let dt = DAVIS::from_dataset(dataset(vec![ann(1, 1, 1, left()), ann(2, 2, 1, right())]));
        let mut e = DAVISeval::new(gt, dt);
        e.params.measures = vec!["J".into()];
        e.evaluate().unwrap();
        let frames: Vec<u64> = e.gts().iter().map(|g| g.image_id).collect();
        assert_eq!(frames, vec![1, 2]);
        assert_eq!(e.results[0].eval.frames(), &[1.0, 1.0]);
    }

    #[test]
    fn test_malformed_rle_is_an_error() {
        let mut bad = ann(7, 1, 1, left());
        bad.segmentation = Some(Segmentation::CompressedRle {
            size: [H, W],
            counts: "oooooooooooooooo".into(),
        });
        let gt = DAVIS::from_dataset(dataset(vec![ann(1, 1, 1, left())]));
        let dt = DAVIS::from_dataset(dataset(vec![bad]));
        let mut e = DAVISeval::new(gt, dt);
        assert!(matches!(e.evaluate(), Err(Error::MissingMask { ann_id: 7 })));
    }

    #[test]
    fn test_undefined_statistics_print_as_nan() {
        let mut e = make_eval(&[(1, left())]);
        e.params.measures = vec!["J".into()];
        e.params.img_ids = vec![99];
        e.evaluate().unwrap();
        assert!(e.gts().is_empty());
        let report = e.report();
        assert_eq!(report.lines().nth(1), Some("J(M): nan, J(O): nan, J(D): nan"));
    }

    #[test]
    fn test_unknown_measure_aborts_before_reporting() {
        let mut e = make_eval(&[(1, left()), (2, left()), (3, left()), (4, left())]);
        e.params.measures = vec!["J".into(), "Q".into()];
        let err = e.evaluate().unwrap_err();
        assert!(matches!(err, Error::UnknownMetric(ref m) if m == "Q"));
        assert!(e.results.is_empty());
        assert!(e.stats().is_none());
        assert_eq!(e.report(), "");
        assert_eq!(e.stage(), EvalStage::Idle);
    }

    #[test]
    fn test_length_mismatch_is_fatal() {
        // frame 4 prediction missing: trailing gaps are not filled
        let mut e = make_eval(&[(1, left()), (2, left()), (3, left())]);
        assert!(matches!(
            e.evaluate(),
            Err(Error::ShapeMismatch {
                annotations: 4,
                segmentations: 3
            })
        ));
    }

    #[test]
    fn test_repeated_evaluate_does_not_accumulate() {
        let mut e = make_eval(&[(1, left()), (2, left()), (3, left()), (4, left())]);
        e.evaluate().unwrap();
        e.evaluate().unwrap();
        assert_eq!(e.gts().len(), 4);
        assert_eq!(e.dts().len(), 4);
        assert_eq!(e.results.len(), 2);
    }

    #[test]
    fn test_report_lines() {
        let mut e = make_eval(&[(1, left()), (2, right()), (3, left()), (4, left())]);
        e.params.measures = vec!["J".into(), "T".into()];
        e.evaluate().unwrap();
        let report = e.report();
        let lines: Vec<&str> = report.lines().collect();
        assert!(lines[0].starts_with("DONE (t="));
        assert_eq!(lines[1], "J(M): 0.75, J(O): 0.75, J(D): -0.5");
        assert_eq!(lines[2], "T(M): unfinished");
        e.summarize();
        assert_eq!(e.stage(), EvalStage::Reported);
    }

    #[test]
    fn test_per_sequence() {
        let mut e = make_eval(&[(1, left()), (2, right()), (3, left()), (4, right())]);
        e.params.measures = vec!["J".into()];
        e.evaluate_per_sequence().unwrap();
        assert_eq!(e.sequences.len(), 2);
        let first = &e.sequences[0];
        assert_eq!(first.category_id, 1);
        assert_eq!(first.frames, 0..2);
        assert_relative_eq!(first.measures[0].stats().mean, 0.5);
        // one frame of two misses both foreground pixels
        assert_relative_eq!(first.ape, 1.0);
        assert_eq!(e.sequences[1].category_id, 2);
        assert!(e.report_per_sequence().contains("APE: 1"));
    }
}

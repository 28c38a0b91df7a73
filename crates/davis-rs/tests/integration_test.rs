use std::path::PathBuf;

use approx::assert_relative_eq;
use davis_core::{DAVISeval, EvalStage, Error, Measure, DAVIS};

fn fixtures_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures")
}

fn load_eval() -> DAVISeval {
    let gt_path = fixtures_dir().join("gt.json");
    let dt_path = fixtures_dir().join("dt.json");
    let davis_gt = DAVIS::new(&gt_path).expect("Failed to load GT");
    let davis_dt = davis_gt.load_res(&dt_path).expect("Failed to load DT");
    DAVISeval::new(davis_gt, davis_dt)
}

#[test]
fn test_load_gt() {
    let davis = DAVIS::new(&fixtures_dir().join("gt.json")).expect("Failed to load GT");
    assert_eq!(davis.dataset.images.len(), 5);
    assert_eq!(davis.dataset.annotations.len(), 5);
    assert_eq!(davis.dataset.categories.len(), 2);
    assert_eq!(davis.get_cat_ids(&["bmx-trees"], &[]), vec![2]);
}

#[test]
fn test_load_res() {
    let gt_path = fixtures_dir().join("gt.json");
    let davis_gt = DAVIS::new(&gt_path).expect("Failed to load GT");
    let davis_dt = davis_gt
        .load_res(&fixtures_dir().join("dt.json"))
        .expect("Failed to load DT");
    assert_eq!(davis_dt.dataset.annotations.len(), 4);
    for ann in &davis_dt.dataset.annotations {
        assert!(ann.score.is_some());
        assert_eq!(ann.area, Some(4.0));
    }
}

#[test]
fn test_region_similarity_with_missing_frame() {
    let mut davis_eval = load_eval();
    davis_eval.params.measures = vec!["J".into()];
    davis_eval.evaluate().expect("evaluation failed");

    // frame 2 has no result and is scored against an empty mask
    assert_eq!(davis_eval.dts().len(), 5);
    assert!(davis_eval.dts()[1].synthetic);

    let j = &davis_eval.results[0];
    assert_eq!(j.measure, Measure::J);
    assert_eq!(j.eval.per_frame.len(), 7);
    assert!(j.eval.per_frame[0].is_nan());
    assert!(j.eval.per_frame[6].is_nan());
    assert_eq!(j.eval.frames(), &[1.0, 0.0, 1.0, 0.0, 1.0]);

    let s = j.stats();
    assert_relative_eq!(s.mean, 0.6);
    assert_relative_eq!(s.recall, 0.6);
    // bins [1, 0] and [0, 1]
    assert_relative_eq!(s.decay, 0.0);
}

#[test]
fn test_boundary_similarity() {
    let mut davis_eval = load_eval();
    davis_eval.evaluate().expect("evaluation failed");
    assert_eq!(davis_eval.stage(), EvalStage::Measured(Measure::F));

    let f = davis_eval.results[1].eval.frames().to_vec();
    assert_relative_eq!(f[0], 1.0);
    assert_relative_eq!(f[1], 0.0);
    assert!(f[3] < 1.0);
    assert_relative_eq!(f[4], 1.0);

    let stats = davis_eval.stats().expect("stats missing");
    assert_eq!(stats.len(), 6);
}

#[test]
fn test_unknown_measure() {
    let mut davis_eval = load_eval();
    davis_eval.params.measures = vec!["J".into(), "Q".into()];
    let err = davis_eval.evaluate().unwrap_err();
    assert!(matches!(err, Error::UnknownMetric(ref m) if m == "Q"));
    assert!(davis_eval.stats().is_none());
}

#[test]
fn test_per_sequence_evaluation() {
    let mut davis_eval = load_eval();
    davis_eval.params.measures = vec!["J".into()];
    davis_eval
        .evaluate_per_sequence()
        .expect("evaluation failed");

    let seqs = &davis_eval.sequences;
    assert_eq!(seqs.len(), 2);
    assert_eq!(seqs[0].category_id, 1);
    assert_eq!(seqs[0].frames, 0..3);
    assert_relative_eq!(seqs[0].measures[0].stats().mean, 2.0 / 3.0);
    assert_relative_eq!(seqs[0].ape, 4.0 / 3.0);
    assert_eq!(seqs[1].category_id, 2);
    assert_relative_eq!(seqs[1].measures[0].stats().mean, 0.5);
    assert_relative_eq!(seqs[1].ape, 2.0);
}

#[test]
fn test_summarize_prints() {
    let mut davis_eval = load_eval();
    davis_eval.params.measures = vec!["J".into(), "F".into(), "T".into()];
    davis_eval.evaluate().expect("evaluation failed");
    let report = davis_eval.report();
    assert!(report.contains("J(M): 0.6"));
    assert!(report.contains("T(M): unfinished"));
    davis_eval.summarize();
    assert_eq!(davis_eval.stage(), EvalStage::Reported);
}

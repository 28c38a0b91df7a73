use crate::error::Result;
use crate::measures::{Measure, DEFAULT_BOUND_TH};

/// Evaluation parameters.
///
/// Defaults match the DAVIS benchmark: J and F over every frame and category,
/// with a boundary tolerance of 0.8% of the image diagonal.
#[derive(Debug, Clone)]
pub struct Params {
    /// Image (frame) ids to evaluate (empty = all frames).
    pub img_ids: Vec<u64>,
    /// Category ids to evaluate (empty = all categories).
    pub cat_ids: Vec<u64>,
    /// Measure names, evaluated in order. Valid names are `J`, `F` and `T`.
    pub measures: Vec<String>,
    /// Boundary tolerance for F: fraction of the diagonal below 1, pixels otherwise.
    pub bound_th: f64,
}

impl Params {
    pub fn new() -> Self {
        Params {
            img_ids: Vec::new(),
            cat_ids: Vec::new(),
            measures: vec!["J".into(), "F".into()],
            bound_th: DEFAULT_BOUND_TH,
        }
    }

    /// Resolve the configured measure names, failing on the first unknown one.
    pub fn parse_measures(&self) -> Result<Vec<Measure>> {
        self.measures.iter().map(|m| m.parse()).collect()
    }
}

impl Default for Params {
    fn default() -> Self {
        Params::new()
    }
}

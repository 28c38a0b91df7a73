//! Mean, recall and decay of a per-frame measure.
//!
//! Per-frame vectors carry one undefined (`NaN`) sentinel before the first
//! frame and one after the last. Every reduction here skips undefined values
//! and yields `NaN` instead of failing when nothing is left to reduce.

/// Threshold a frame must exceed to count towards recall.
pub const RECALL_THRESHOLD: f64 = 0.5;

/// Number of temporal bins used for decay.
pub const DECAY_BINS: usize = 4;

// Bias applied before rounding the bin boundaries. Matches the MATLAB
// benchmark code; changing it shifts published decay numbers.
const DECAY_ROUNDING_BIAS: f64 = 1e-10;

/// Summary of one measure over one sequence. Undefined fields are `NaN`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Statistics {
    /// Mean (M).
    pub mean: f64,
    /// Recall (O): fraction of frames above [`RECALL_THRESHOLD`].
    pub recall: f64,
    /// Decay (D): first-quarter mean minus last-quarter mean.
    pub decay: f64,
}

impl Statistics {
    pub fn undefined() -> Self {
        Statistics {
            mean: f64::NAN,
            recall: f64::NAN,
            decay: f64::NAN,
        }
    }
}

/// Mean of the defined values, `NaN` when there are none.
pub fn nan_mean<'a>(values: impl IntoIterator<Item = &'a f64>) -> f64 {
    let (sum, n) = values
        .into_iter()
        .filter(|v| !v.is_nan())
        .fold((0.0, 0usize), |(sum, n), v| (sum + v, n + 1));
    if n == 0 {
        f64::NAN
    } else {
        sum / n as f64
    }
}

/// Compute M, O and D from a sentinel-padded per-frame vector.
pub fn db_statistics(per_frame_values: &[f64]) -> Statistics {
    let mean = nan_mean(per_frame_values);
    let interior = interior(per_frame_values);

    let defined: Vec<f64> = interior.iter().copied().filter(|v| !v.is_nan()).collect();
    let recall = if defined.is_empty() {
        f64::NAN
    } else {
        defined.iter().filter(|&&v| v > RECALL_THRESHOLD).count() as f64 / defined.len() as f64
    };

    let bins = decay_bins(interior);
    let decay = nan_mean(bins[0]) - nan_mean(bins[DECAY_BINS - 1]);

    Statistics {
        mean,
        recall,
        decay,
    }
}

/// The per-frame values without the leading and trailing sentinel.
pub fn interior(per_frame_values: &[f64]) -> &[f64] {
    match per_frame_values.len() {
        0..=2 => &[],
        n => &per_frame_values[1..n - 1],
    }
}

/// Inclusive bin boundaries for `n` frames:
/// `round(linspace(1, n, 5)[k] + 1e-10) - 1`, rounding half to even.
pub fn decay_bin_bounds(n: usize) -> [i64; DECAY_BINS + 1] {
    let start = 1.0;
    let stop = n as f64;
    let step = (stop - start) / DECAY_BINS as f64;
    let mut ids = [0i64; DECAY_BINS + 1];
    for (k, id) in ids.iter_mut().enumerate() {
        let point = if k == DECAY_BINS {
            stop
        } else {
            start + k as f64 * step
        };
        *id = (point + DECAY_ROUNDING_BIAS).round_ties_even() as i64 - 1;
    }
    ids
}

/// Split frames into [`DECAY_BINS`] contiguous bins. Bin `k` spans
/// `bounds[k]..=bounds[k + 1]`, so neighbouring bins share a frame.
pub fn decay_bins(frames: &[f64]) -> [&[f64]; DECAY_BINS] {
    let ids = decay_bin_bounds(frames.len());
    let len = frames.len() as i64;
    let clamp = |i: i64| i.clamp(0, len) as usize;
    std::array::from_fn(|k| {
        let (lo, hi) = (clamp(ids[k]), clamp(ids[k + 1] + 1));
        if lo < hi {
            &frames[lo..hi]
        } else {
            &[]
        }
    })
}

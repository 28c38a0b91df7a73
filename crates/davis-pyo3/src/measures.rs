use davis_core::measures::{self as dm, DEFAULT_BOUND_TH};
use davis_core::statistics;
use numpy::{PyArray2, PyReadonlyArray2};
use pyo3::exceptions::PyValueError;
use pyo3::prelude::*;

use crate::convert::{mask_to_py, py_to_mask};

fn check_shapes(a: &davis_core::Mask, b: &davis_core::Mask) -> PyResult<()> {
    if a.shape() != b.shape() {
        return Err(PyValueError::new_err(format!(
            "mask shapes differ: {:?} vs {:?}",
            a.shape(),
            b.shape()
        )));
    }
    Ok(())
}

#[pyfunction]
pub fn db_eval_iou(
    annotation: PyReadonlyArray2<u8>,
    segmentation: PyReadonlyArray2<u8>,
) -> PyResult<f64> {
    let (an, sg) = (py_to_mask(&annotation), py_to_mask(&segmentation));
    check_shapes(&an, &sg)?;
    Ok(dm::db_eval_iou(&an, &sg))
}

#[pyfunction]
#[pyo3(signature = (foreground_mask, gt_mask, bound_th = DEFAULT_BOUND_TH))]
pub fn db_eval_boundary(
    foreground_mask: PyReadonlyArray2<u8>,
    gt_mask: PyReadonlyArray2<u8>,
    bound_th: f64,
) -> PyResult<f64> {
    let (fg, gt) = (py_to_mask(&foreground_mask), py_to_mask(&gt_mask));
    check_shapes(&fg, &gt)?;
    Ok(dm::db_eval_boundary(&fg, &gt, bound_th))
}

#[pyfunction]
pub fn seg2bmap<'py>(py: Python<'py>, seg: PyReadonlyArray2<'py, u8>) -> Bound<'py, PyArray2<u8>> {
    mask_to_py(py, &dm::seg2bmap(&py_to_mask(&seg)))
}

/// `(M, O, D)` of a per-frame vector padded with one undefined value at each end.
#[pyfunction]
pub fn db_statistics(per_frame_values: Vec<f64>) -> (f64, f64, f64) {
    let s = statistics::db_statistics(&per_frame_values);
    (s.mean, s.recall, s.decay)
}

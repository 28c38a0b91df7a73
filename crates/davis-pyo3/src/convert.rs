use davis_core::{Annotation, Category, Image, Mask, Rle, Segmentation};
use numpy::ndarray::Array2;
use numpy::{IntoPyArray, PyArray2, PyReadonlyArray2};
use pyo3::exceptions::{PyIOError, PyKeyError, PyValueError};
use pyo3::prelude::*;
use pyo3::types::{PyDict, PyList};

pub fn to_py_err(err: davis_core::Error) -> PyErr {
    match err {
        davis_core::Error::Io(_) | davis_core::Error::Json(_) => PyIOError::new_err(err.to_string()),
        other => PyValueError::new_err(other.to_string()),
    }
}

pub fn annotation_to_py(py: Python<'_>, ann: &Annotation) -> PyResult<PyObject> {
    let dict = PyDict::new(py);
    dict.set_item("id", ann.id)?;
    dict.set_item("image_id", ann.image_id)?;
    dict.set_item("category_id", ann.category_id)?;
    if let Some(ref bbox) = ann.bbox {
        dict.set_item("bbox", bbox.to_vec())?;
    }
    if let Some(area) = ann.area {
        dict.set_item("area", area)?;
    }
    if let Some(ref seg) = ann.segmentation {
        dict.set_item("segmentation", segmentation_to_py(py, seg)?)?;
    }
    dict.set_item("iscrowd", ann.iscrowd as u8)?;
    if let Some(score) = ann.score {
        dict.set_item("score", score)?;
    }
    Ok(dict.into_any().unbind())
}

pub fn segmentation_to_py(py: Python<'_>, seg: &Segmentation) -> PyResult<PyObject> {
    match seg {
        Segmentation::Polygon(polys) => {
            let rings = polys
                .iter()
                .map(|p| PyList::new(py, p.iter()))
                .collect::<PyResult<Vec<_>>>()?;
            Ok(PyList::new(py, rings)?.into_any().unbind())
        }
        Segmentation::CompressedRle { size, counts } => {
            let dict = PyDict::new(py);
            dict.set_item("size", vec![size[0], size[1]])?;
            dict.set_item("counts", counts)?;
            Ok(dict.into_any().unbind())
        }
        Segmentation::UncompressedRle { size, counts } => {
            let dict = PyDict::new(py);
            dict.set_item("size", vec![size[0], size[1]])?;
            dict.set_item("counts", counts.clone())?;
            Ok(dict.into_any().unbind())
        }
    }
}

fn required<'py>(dict: &Bound<'py, PyDict>, key: &str) -> PyResult<Bound<'py, PyAny>> {
    dict.get_item(key)?
        .ok_or_else(|| PyKeyError::new_err(key.to_string()))
}

pub fn py_to_annotation(dict: &Bound<'_, PyDict>) -> PyResult<Annotation> {
    let id: u64 = dict
        .get_item("id")?
        .map(|v| v.extract())
        .transpose()?
        .unwrap_or(0);
    let image_id: u64 = required(dict, "image_id")?.extract()?;
    let category_id: u64 = dict
        .get_item("category_id")?
        .map(|v| v.extract())
        .transpose()?
        .unwrap_or(0);
    let bbox: Option<[f64; 4]> = dict.get_item("bbox")?.map(|v| v.extract()).transpose()?;
    let area: Option<f64> = dict.get_item("area")?.map(|v| v.extract()).transpose()?;
    let segmentation: Option<Segmentation> = dict
        .get_item("segmentation")?
        .map(|v| py_to_segmentation(&v))
        .transpose()?;
    let iscrowd: bool = dict
        .get_item("iscrowd")?
        .map(|v| {
            v.extract::<bool>()
                .or_else(|_| v.extract::<u8>().map(|i| i != 0))
        })
        .transpose()?
        .unwrap_or(false);
    let score: Option<f64> = dict.get_item("score")?.map(|v| v.extract()).transpose()?;

    Ok(Annotation {
        id,
        image_id,
        category_id,
        bbox,
        area,
        segmentation,
        iscrowd,
        score,
    })
}

fn py_to_segmentation(obj: &Bound<'_, PyAny>) -> PyResult<Segmentation> {
    if let Ok(dict) = obj.downcast::<PyDict>() {
        let size: [u32; 2] = required(dict, "size")?.extract()?;
        let counts_obj = required(dict, "counts")?;
        if let Ok(s) = counts_obj.extract::<String>() {
            return Ok(Segmentation::CompressedRle { size, counts: s });
        }
        let counts: Vec<u32> = counts_obj.extract()?;
        return Ok(Segmentation::UncompressedRle { size, counts });
    }
    let polys: Vec<Vec<f64>> = obj.extract()?;
    Ok(Segmentation::Polygon(polys))
}

pub fn image_to_py(py: Python<'_>, img: &Image) -> PyResult<PyObject> {
    let dict = PyDict::new(py);
    dict.set_item("id", img.id)?;
    dict.set_item("file_name", &img.file_name)?;
    dict.set_item("height", img.height)?;
    dict.set_item("width", img.width)?;
    Ok(dict.into_any().unbind())
}

pub fn category_to_py(py: Python<'_>, cat: &Category) -> PyResult<PyObject> {
    let dict = PyDict::new(py);
    dict.set_item("id", cat.id)?;
    dict.set_item("name", &cat.name)?;
    if let Some(ref sc) = cat.supercategory {
        dict.set_item("supercategory", sc)?;
    }
    Ok(dict.into_any().unbind())
}

pub fn rle_to_py(py: Python<'_>, rle: &Rle) -> PyResult<PyObject> {
    let dict = PyDict::new(py);
    dict.set_item("size", vec![rle.h, rle.w])?;
    dict.set_item("counts", davis_core::mask::rle_to_string(rle))?;
    Ok(dict.into_any().unbind())
}

/// Row-major `uint8` array, nonzero pixels are foreground.
pub fn py_to_mask(arr: &PyReadonlyArray2<'_, u8>) -> Mask {
    let view = arr.as_array();
    let (h, w) = view.dim();
    Mask::from_fn(h as u32, w as u32, |y, x| view[[y, x]] != 0)
}

pub fn mask_to_py<'py>(py: Python<'py>, mask: &Mask) -> Bound<'py, PyArray2<u8>> {
    let (h, w) = mask.shape();
    Array2::from_shape_fn((h as usize, w as usize), |(y, x)| mask.get(y, x) as u8).into_pyarray(py)
}

use std::path::Path;

use numpy::PyArray2;
use pyo3::prelude::*;
use pyo3::types::{PyDict, PyList};

mod convert;
mod measures;

use convert::{
    annotation_to_py, category_to_py, image_to_py, mask_to_py, py_to_annotation, rle_to_py,
    to_py_err,
};

// ---------------------------------------------------------------------------
// DAVIS
// ---------------------------------------------------------------------------

#[pyclass(name = "DAVIS")]
struct PyDAVIS {
    inner: davis_core::DAVIS,
}

impl Clone for PyDAVIS {
    fn clone(&self) -> Self {
        PyDAVIS {
            inner: davis_core::DAVIS::from_dataset(self.inner.dataset.clone()),
        }
    }
}

#[pymethods]
impl PyDAVIS {
    #[new]
    #[pyo3(signature = (annotation_file=None))]
    fn new(annotation_file: Option<&str>) -> PyResult<Self> {
        let inner = match annotation_file {
            Some(path) => davis_core::DAVIS::new(Path::new(path)).map_err(to_py_err)?,
            None => davis_core::DAVIS::from_dataset(davis_core::Dataset::default()),
        };
        Ok(PyDAVIS { inner })
    }

    #[pyo3(signature = (img_ids=vec![], cat_ids=vec![]))]
    fn get_ann_ids(&self, img_ids: Vec<u64>, cat_ids: Vec<u64>) -> Vec<u64> {
        self.inner.get_ann_ids(&img_ids, &cat_ids)
    }

    #[pyo3(signature = (cat_nms=vec![], cat_ids=vec![]))]
    fn get_cat_ids(&self, cat_nms: Vec<String>, cat_ids: Vec<u64>) -> Vec<u64> {
        let cat_nms_ref: Vec<&str> = cat_nms.iter().map(|s| s.as_str()).collect();
        self.inner.get_cat_ids(&cat_nms_ref, &cat_ids)
    }

    #[pyo3(signature = (img_ids=vec![], cat_ids=vec![]))]
    fn get_img_ids(&self, img_ids: Vec<u64>, cat_ids: Vec<u64>) -> Vec<u64> {
        self.inner.get_img_ids(&img_ids, &cat_ids)
    }

    fn load_anns(&self, py: Python<'_>, ids: Vec<u64>) -> PyResult<PyObject> {
        let anns = self.inner.load_anns(&ids);
        let list = PyList::new(
            py,
            anns.iter()
                .map(|a| annotation_to_py(py, a))
                .collect::<PyResult<Vec<_>>>()?,
        )?;
        Ok(list.into_any().unbind())
    }

    fn load_cats(&self, py: Python<'_>, ids: Vec<u64>) -> PyResult<PyObject> {
        let cats = self.inner.load_cats(&ids);
        let list = PyList::new(
            py,
            cats.iter()
                .map(|c| category_to_py(py, c))
                .collect::<PyResult<Vec<_>>>()?,
        )?;
        Ok(list.into_any().unbind())
    }

    fn load_imgs(&self, py: Python<'_>, ids: Vec<u64>) -> PyResult<PyObject> {
        let imgs = self.inner.load_imgs(&ids);
        let list = PyList::new(
            py,
            imgs.iter()
                .map(|i| image_to_py(py, i))
                .collect::<PyResult<Vec<_>>>()?,
        )?;
        Ok(list.into_any().unbind())
    }

    fn load_res(&self, res_file: &str) -> PyResult<PyDAVIS> {
        let inner = self
            .inner
            .load_res(Path::new(res_file))
            .map_err(to_py_err)?;
        Ok(PyDAVIS { inner })
    }

    fn ann_to_rle(&self, py: Python<'_>, ann: &Bound<'_, PyDict>) -> PyResult<PyObject> {
        let annotation = py_to_annotation(ann)?;
        match self.inner.ann_to_rle(&annotation) {
            Some(rle) => rle_to_py(py, &rle),
            None => Err(pyo3::exceptions::PyValueError::new_err(
                "Could not convert annotation to RLE (image not found?)",
            )),
        }
    }

    fn ann_to_mask<'py>(
        &self,
        py: Python<'py>,
        ann: &Bound<'py, PyDict>,
    ) -> PyResult<Bound<'py, PyArray2<u8>>> {
        let annotation = py_to_annotation(ann)?;
        let mask = self.inner.ann_to_mask(&annotation).ok_or_else(|| {
            pyo3::exceptions::PyValueError::new_err(
                "Could not convert annotation to a mask (image not found?)",
            )
        })?;
        Ok(mask_to_py(py, &mask))
    }

    // camelCase aliases for pycocotools compatibility
    #[pyo3(name = "getAnnIds")]
    #[pyo3(signature = (img_ids=vec![], cat_ids=vec![]))]
    fn get_ann_ids_camel(&self, img_ids: Vec<u64>, cat_ids: Vec<u64>) -> Vec<u64> {
        self.get_ann_ids(img_ids, cat_ids)
    }

    #[pyo3(name = "getCatIds")]
    #[pyo3(signature = (cat_nms=vec![], cat_ids=vec![]))]
    fn get_cat_ids_camel(&self, cat_nms: Vec<String>, cat_ids: Vec<u64>) -> Vec<u64> {
        self.get_cat_ids(cat_nms, cat_ids)
    }

    #[pyo3(name = "getImgIds")]
    #[pyo3(signature = (img_ids=vec![], cat_ids=vec![]))]
    fn get_img_ids_camel(&self, img_ids: Vec<u64>, cat_ids: Vec<u64>) -> Vec<u64> {
        self.get_img_ids(img_ids, cat_ids)
    }

    #[pyo3(name = "loadAnns")]
    fn load_anns_camel(&self, py: Python<'_>, ids: Vec<u64>) -> PyResult<PyObject> {
        self.load_anns(py, ids)
    }

    #[pyo3(name = "loadCats")]
    fn load_cats_camel(&self, py: Python<'_>, ids: Vec<u64>) -> PyResult<PyObject> {
        self.load_cats(py, ids)
    }

    #[pyo3(name = "loadImgs")]
    fn load_imgs_camel(&self, py: Python<'_>, ids: Vec<u64>) -> PyResult<PyObject> {
        self.load_imgs(py, ids)
    }

    #[pyo3(name = "loadRes")]
    fn load_res_camel(&self, res_file: &str) -> PyResult<PyDAVIS> {
        self.load_res(res_file)
    }

    #[pyo3(name = "annToRLE")]
    fn ann_to_rle_camel(&self, py: Python<'_>, ann: &Bound<'_, PyDict>) -> PyResult<PyObject> {
        self.ann_to_rle(py, ann)
    }

    #[pyo3(name = "annToMask")]
    fn ann_to_mask_camel<'py>(
        &self,
        py: Python<'py>,
        ann: &Bound<'py, PyDict>,
    ) -> PyResult<Bound<'py, PyArray2<u8>>> {
        self.ann_to_mask(py, ann)
    }

    #[getter]
    fn dataset(&self, py: Python<'_>) -> PyResult<PyObject> {
        let ds = &self.inner.dataset;
        let dict = PyDict::new(py);

        let images = PyList::new(
            py,
            ds.images
                .iter()
                .map(|i| image_to_py(py, i))
                .collect::<PyResult<Vec<_>>>()?,
        )?;
        let annotations = PyList::new(
            py,
            ds.annotations
                .iter()
                .map(|a| annotation_to_py(py, a))
                .collect::<PyResult<Vec<_>>>()?,
        )?;
        let categories = PyList::new(
            py,
            ds.categories
                .iter()
                .map(|c| category_to_py(py, c))
                .collect::<PyResult<Vec<_>>>()?,
        )?;

        dict.set_item("images", images)?;
        dict.set_item("annotations", annotations)?;
        dict.set_item("categories", categories)?;

        Ok(dict.into_any().unbind())
    }
}

// ---------------------------------------------------------------------------
// Params
// ---------------------------------------------------------------------------

#[pyclass(name = "Params")]
#[derive(Clone)]
struct PyParams {
    inner: davis_core::Params,
}

#[pymethods]
impl PyParams {
    #[new]
    fn new() -> Self {
        PyParams {
            inner: davis_core::Params::new(),
        }
    }

    #[getter]
    fn img_ids(&self) -> Vec<u64> {
        self.inner.img_ids.clone()
    }

    #[setter]
    fn set_img_ids(&mut self, val: Vec<u64>) {
        self.inner.img_ids = val;
    }

    #[getter]
    fn cat_ids(&self) -> Vec<u64> {
        self.inner.cat_ids.clone()
    }

    #[setter]
    fn set_cat_ids(&mut self, val: Vec<u64>) {
        self.inner.cat_ids = val;
    }

    #[getter]
    fn measures(&self) -> Vec<String> {
        self.inner.measures.clone()
    }

    #[setter]
    fn set_measures(&mut self, val: Vec<String>) {
        self.inner.measures = val;
    }

    #[getter]
    fn bound_th(&self) -> f64 {
        self.inner.bound_th
    }

    #[setter]
    fn set_bound_th(&mut self, val: f64) {
        self.inner.bound_th = val;
    }

    // camelCase aliases
    #[getter(imgIds)]
    fn img_ids_camel(&self) -> Vec<u64> {
        self.img_ids()
    }

    #[setter(imgIds)]
    fn set_img_ids_camel(&mut self, val: Vec<u64>) {
        self.set_img_ids(val);
    }

    #[getter(catIds)]
    fn cat_ids_camel(&self) -> Vec<u64> {
        self.cat_ids()
    }

    #[setter(catIds)]
    fn set_cat_ids_camel(&mut self, val: Vec<u64>) {
        self.set_cat_ids(val);
    }
}

// ---------------------------------------------------------------------------
// DAVISeval
// ---------------------------------------------------------------------------

#[pyclass(name = "DAVISeval")]
struct PyDAVISeval {
    inner: davis_core::DAVISeval,
}

#[pymethods]
impl PyDAVISeval {
    #[new]
    fn new(davis_gt: &PyDAVIS, davis_dt: &PyDAVIS) -> Self {
        let inner = davis_core::DAVISeval::new(davis_gt.clone().inner, davis_dt.clone().inner);
        PyDAVISeval { inner }
    }

    fn evaluate(&mut self) -> PyResult<()> {
        self.inner.evaluate().map_err(to_py_err)
    }

    fn evaluate_per_sequence(&mut self) -> PyResult<()> {
        self.inner.evaluate_per_sequence().map_err(to_py_err)
    }

    fn summarize(&mut self) {
        self.inner.summarize();
    }

    fn summarize_per_sequence(&mut self) {
        self.inner.summarize_per_sequence();
    }

    #[getter]
    fn params(&self) -> PyParams {
        PyParams {
            inner: self.inner.params.clone(),
        }
    }

    #[setter]
    fn set_params(&mut self, params: &PyParams) {
        self.inner.params = params.inner.clone();
    }

    #[getter]
    fn stats(&self) -> Option<Vec<f64>> {
        self.inner.stats()
    }

    #[getter]
    fn stage(&self) -> String {
        format!("{:?}", self.inner.stage())
    }

    /// `{measure: {"per_frame": [...], "M": .., "O": .., "D": ..}}`
    #[getter]
    fn results(&self, py: Python<'_>) -> PyResult<PyObject> {
        let dict = PyDict::new(py);
        for r in &self.inner.results {
            let entry = PyDict::new(py);
            let s = r.stats();
            entry.set_item("per_frame", r.eval.per_frame.clone())?;
            entry.set_item("M", s.mean)?;
            entry.set_item("O", s.recall)?;
            entry.set_item("D", s.decay)?;
            dict.set_item(r.measure.to_string(), entry)?;
        }
        Ok(dict.into_any().unbind())
    }
}

// ---------------------------------------------------------------------------
// Module
// ---------------------------------------------------------------------------

#[pymodule]
fn davis_rs(py: Python<'_>, m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_class::<PyDAVIS>()?;
    m.add_class::<PyDAVISeval>()?;
    m.add_class::<PyParams>()?;

    // measures submodule
    let measures_mod = PyModule::new(py, "measures")?;
    measures_mod.add_function(wrap_pyfunction!(measures::db_eval_iou, &measures_mod)?)?;
    measures_mod.add_function(wrap_pyfunction!(measures::db_eval_boundary, &measures_mod)?)?;
    measures_mod.add_function(wrap_pyfunction!(measures::seg2bmap, &measures_mod)?)?;
    measures_mod.add_function(wrap_pyfunction!(measures::db_statistics, &measures_mod)?)?;
    m.add_submodule(&measures_mod)?;

    Ok(())
}

//! 管道拆包

use pyo3::{
    pyclass, pymethods,
    types::{PyDict, PyDictMethods, PyTuple, PyType},
    Bound, Py, PyAny, PyResult, Python,
};

use crate::{
    core::category::CATEGORY_PIPE,
    pipe::full_pipe::{FullPipe, PIPE_FIELDS},
    wrapper::comfyui::types::{
        NODE_CLIP, NODE_CONDITIONING, NODE_FULL_PIPE, NODE_IMAGE, NODE_INT, NODE_MODEL,
        NODE_STRING, NODE_VAE,
    },
};

/// 输出管道本身及全部字段, 未设置的字段为 None
#[pyclass(subclass)]
pub struct FullPipeOut {}

#[pymethods]
impl FullPipeOut {
    #[new]
    fn new() -> Self {
        Self {}
    }

    #[classattr]
    #[pyo3(name = "RETURN_TYPES")]
    #[allow(clippy::type_complexity)]
    fn return_types() -> (
        &'static str,
        &'static str,
        &'static str,
        &'static str,
        &'static str,
        &'static str,
        &'static str,
        &'static str,
        &'static str,
        &'static str,
        &'static str,
    ) {
        (
            NODE_FULL_PIPE,
            NODE_MODEL,
            NODE_CLIP,
            NODE_VAE,
            NODE_CONDITIONING,
            NODE_CONDITIONING,
            NODE_STRING,
            NODE_STRING,
            NODE_STRING,
            NODE_INT,
            NODE_IMAGE,
        )
    }

    #[classattr]
    #[pyo3(name = "RETURN_NAMES")]
    fn return_names(py: Python<'_>) -> PyResult<Bound<'_, PyTuple>> {
        let names = std::iter::once("full_pipe").chain(PIPE_FIELDS.iter().map(|(name, _)| *name));
        PyTuple::new(py, names.collect::<Vec<_>>())
    }

    #[classattr]
    #[pyo3(name = "CATEGORY")]
    const CATEGORY: &'static str = CATEGORY_PIPE;

    #[classattr]
    #[pyo3(name = "DESCRIPTION")]
    fn description() -> &'static str {
        "Unpack a full pipe into its values."
    }

    #[classattr]
    #[pyo3(name = "FUNCTION")]
    const FUNCTION: &'static str = "execute";

    #[classmethod]
    #[pyo3(name = "INPUT_TYPES")]
    fn input_types(_cls: &Bound<'_, PyType>) -> PyResult<Py<PyDict>> {
        Python::with_gil(|py| {
            let dict = PyDict::new(py);
            dict.set_item("required", {
                let required = PyDict::new(py);
                required.set_item("full_pipe", (NODE_FULL_PIPE,))?;
                required
            })?;
            Ok(dict.into())
        })
    }

    #[pyo3(name = "execute")]
    fn execute<'py>(
        &self,
        py: Python<'py>,
        full_pipe: Bound<'py, FullPipe>,
    ) -> PyResult<Bound<'py, PyTuple>> {
        let pipe = full_pipe.get();
        let mut outputs: Vec<Bound<'py, PyAny>> = vec![full_pipe.clone().into_any()];
        for (name, _) in PIPE_FIELDS {
            outputs.push(match pipe.field(py, name)? {
                Some(value) => value,
                None => py.None().into_bound(py),
            });
        }
        PyTuple::new(py, outputs)
    }
}

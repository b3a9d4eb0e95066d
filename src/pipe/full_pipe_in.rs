//! 管道修改

use pyo3::{
    pyclass, pymethods,
    types::{PyDict, PyDictMethods, PyType},
    Bound, Py, PyAny, PyRef, PyResult, Python,
};

use crate::{
    core::category::CATEGORY_PIPE,
    pipe::full_pipe::{add_field_input, FullPipe, Pipe, PyHandle, PIPE_FIELDS},
    wrapper::comfyui::types::NODE_FULL_PIPE,
};

/// 仅覆盖已连接的字段, 空字符串忽略
#[pyclass(subclass)]
pub struct FullPipeIn {}

#[pymethods]
impl FullPipeIn {
    #[new]
    fn new() -> Self {
        Self {}
    }

    #[classattr]
    #[pyo3(name = "RETURN_TYPES")]
    fn return_types() -> (&'static str,) {
        (NODE_FULL_PIPE,)
    }

    #[classattr]
    #[pyo3(name = "RETURN_NAMES")]
    fn return_names() -> (&'static str,) {
        ("full_pipe",)
    }

    #[classattr]
    #[pyo3(name = "CATEGORY")]
    const CATEGORY: &'static str = CATEGORY_PIPE;

    #[classattr]
    #[pyo3(name = "DESCRIPTION")]
    fn description() -> &'static str {
        "Update selected values of a full pipe without unpacking it."
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
            dict.set_item("optional", {
                let optional = PyDict::new(py);
                for (name, node_type) in PIPE_FIELDS {
                    add_field_input(py, &optional, name, node_type)?;
                }
                optional
            })?;
            Ok(dict.into())
        })
    }

    #[pyo3(
        name = "execute",
        signature = (
            full_pipe,
            model=None, clip=None, vae=None,
            positive=None, negative=None,
            positive_text=None, negative_text=None, ckpt_name=None,
            seed=None, image=None,
        )
    )]
    #[allow(clippy::too_many_arguments)]
    fn execute<'py>(
        &self,
        full_pipe: PyRef<'py, FullPipe>,
        model: Option<Bound<'py, PyAny>>,
        clip: Option<Bound<'py, PyAny>>,
        vae: Option<Bound<'py, PyAny>>,
        positive: Option<Bound<'py, PyAny>>,
        negative: Option<Bound<'py, PyAny>>,
        positive_text: Option<String>,
        negative_text: Option<String>,
        ckpt_name: Option<String>,
        seed: Option<u64>,
        image: Option<Bound<'py, PyAny>>,
    ) -> PyResult<(FullPipe,)> {
        let patch = Pipe {
            model: model.as_ref().map(PyHandle::new),
            clip: clip.as_ref().map(PyHandle::new),
            vae: vae.as_ref().map(PyHandle::new),
            positive: positive.as_ref().map(PyHandle::new),
            negative: negative.as_ref().map(PyHandle::new),
            positive_text,
            negative_text,
            ckpt_name,
            seed,
            image: image.as_ref().map(PyHandle::new),
        };
        Ok((FullPipe::new(full_pipe.inner.merge(patch)),))
    }
}

//! 管道打包

use pyo3::{
    pyclass, pymethods,
    types::{PyDict, PyDictMethods, PyType},
    Bound, Py, PyAny, PyResult, Python,
};

use crate::{
    core::category::CATEGORY_PIPE,
    pipe::full_pipe::{add_field_input, FullPipe, Pipe, PyHandle, PIPE_FIELDS},
    wrapper::comfyui::types::NODE_FULL_PIPE,
};

/// 将模型等输入打包为管道
#[pyclass(subclass)]
pub struct FullPipeLoader {}

#[pymethods]
impl FullPipeLoader {
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
        "Pack model, clip, vae and optional values into a full pipe."
    }

    #[classattr]
    #[pyo3(name = "FUNCTION")]
    const FUNCTION: &'static str = "execute";

    #[classmethod]
    #[pyo3(name = "INPUT_TYPES")]
    fn input_types(_cls: &Bound<'_, PyType>) -> PyResult<Py<PyDict>> {
        Python::with_gil(|py| {
            let required = PyDict::new(py);
            let optional = PyDict::new(py);
            for (index, (name, node_type)) in PIPE_FIELDS.iter().enumerate() {
                // model, clip, vae 必填
                let target = if index < 3 { &required } else { &optional };
                add_field_input(py, target, name, node_type)?;
            }

            let dict = PyDict::new(py);
            dict.set_item("required", required)?;
            dict.set_item("optional", optional)?;
            Ok(dict.into())
        })
    }

    #[pyo3(
        name = "execute",
        signature = (
            model, clip, vae,
            positive=None, negative=None,
            positive_text=None, negative_text=None, ckpt_name=None,
            seed=None, image=None,
        )
    )]
    #[allow(clippy::too_many_arguments)]
    fn execute<'py>(
        &self,
        model: Bound<'py, PyAny>,
        clip: Bound<'py, PyAny>,
        vae: Bound<'py, PyAny>,
        positive: Option<Bound<'py, PyAny>>,
        negative: Option<Bound<'py, PyAny>>,
        positive_text: Option<String>,
        negative_text: Option<String>,
        ckpt_name: Option<String>,
        seed: Option<u64>,
        image: Option<Bound<'py, PyAny>>,
    ) -> PyResult<(FullPipe,)> {
        let pipe = Pipe {
            model: Some(PyHandle::new(&model)),
            clip: Some(PyHandle::new(&clip)),
            vae: Some(PyHandle::new(&vae)),
            positive: positive.as_ref().map(PyHandle::new),
            negative: negative.as_ref().map(PyHandle::new),
            positive_text,
            negative_text,
            ckpt_name,
            seed,
            image: image.as_ref().map(PyHandle::new),
        };
        Ok((FullPipe::new(pipe),))
    }
}

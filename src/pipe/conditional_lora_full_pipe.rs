//! 条件 LoRA (管道)

use log::debug;
use pyo3::{
    pyclass, pymethods,
    types::{PyDict, PyDictMethods, PyType},
    Bound, Py, PyRef, PyResult, Python,
};

use crate::{
    core::category::CATEGORY_PIPE,
    error::Error,
    pipe::{
        full_pipe::{FullPipe, PyHandle},
        lora::{apply_lora_or_keep, prompt_contains, LoraEntry},
    },
    wrapper::{
        comfy::folder_paths::get_filename_list,
        comfyui::{
            types::{NODE_FLOAT, NODE_FULL_PIPE, NODE_STRING},
            PromptServer,
        },
    },
};

/// 正向提示词包含子串 (忽略大小写) 时应用 LoRA
#[pyclass(subclass)]
pub struct ConditionalLoraFullPipe {}

impl PromptServer for ConditionalLoraFullPipe {}

#[pymethods]
impl ConditionalLoraFullPipe {
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
        "Add lora if substring is in positive_text."
    }

    #[classattr]
    #[pyo3(name = "FUNCTION")]
    const FUNCTION: &'static str = "execute";

    #[classmethod]
    #[pyo3(name = "INPUT_TYPES")]
    fn input_types(_cls: &Bound<'_, PyType>) -> PyResult<Py<PyDict>> {
        Python::with_gil(|py| {
            let strength = |default: f64| -> PyResult<Bound<'_, PyDict>> {
                let strength = PyDict::new(py);
                strength.set_item("default", default)?;
                strength.set_item("min", -20.0)?;
                strength.set_item("max", 20.0)?;
                strength.set_item("step", 0.01)?;
                Ok(strength)
            };

            let dict = PyDict::new(py);
            dict.set_item("required", {
                let required = PyDict::new(py);
                required.set_item("full_pipe", (NODE_FULL_PIPE,))?;
                required.set_item("lora_name", (get_filename_list(py, "loras")?,))?;
                required.set_item("strength_model", (NODE_FLOAT, strength(1.0)?))?;
                required.set_item("strength_clip", (NODE_FLOAT, strength(1.0)?))?;
                required.set_item(
                    "substring",
                    (NODE_STRING, {
                        let substring = PyDict::new(py);
                        substring.set_item("default", "")?;
                        substring
                    }),
                )?;
                required
            })?;
            Ok(dict.into())
        })
    }

    #[pyo3(
        name = "execute",
        signature = (full_pipe, lora_name, strength_model, strength_clip, substring)
    )]
    fn execute<'py>(
        &self,
        py: Python<'py>,
        full_pipe: PyRef<'py, FullPipe>,
        lora_name: String,
        strength_model: f64,
        strength_clip: f64,
        substring: String,
    ) -> PyResult<(FullPipe,)> {
        let entry = LoraEntry::new(&lora_name, strength_model, strength_clip);
        let results = self.apply(py, &full_pipe, &entry, &substring);
        results
            .map(|pipe| (pipe,))
            .map_err(|e| self.raise_error(py, "ConditionalLoraFullPipe", e))
    }
}

impl ConditionalLoraFullPipe {
    fn apply(
        &self,
        py: Python<'_>,
        full_pipe: &FullPipe,
        entry: &LoraEntry,
        substring: &str,
    ) -> Result<FullPipe, Error> {
        let pipe = &full_pipe.inner;
        let positive_text = pipe.positive_text.as_deref().unwrap_or_default();
        if !prompt_contains(positive_text, substring) {
            debug!("substring '{substring}' not in positive_text, lora skipped");
            return Ok(full_pipe.clone());
        }

        let model = pipe.require_model()?.bind(py).clone();
        let clip = pipe.require_clip()?.bind(py).clone();
        let (model, clip) = apply_lora_or_keep(py, model, clip, entry);

        Ok(FullPipe::new(pipe.with_model_and_clip(
            PyHandle::new(&model),
            PyHandle::new(&clip),
        )))
    }
}

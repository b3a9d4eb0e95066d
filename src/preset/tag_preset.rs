//! 标签预设

use pyo3::{
    pyclass, pymethods,
    types::{PyDict, PyDictMethods, PyTuple, PyType},
    Bound, Py, PyResult, Python,
};

use crate::{
    core::category::CATEGORY_PRESET,
    preset::{
        prompt::tag_prompt,
        store::PresetStore,
        types::{PresetKind, PromptPair},
    },
    wrapper::comfyui::types::NODE_STRING,
};

/// 输入中出现触发标签时追加对应的提示词
#[pyclass(subclass)]
pub struct TagPresetNode {
    store: PresetStore,
}

#[pymethods]
impl TagPresetNode {
    #[new]
    fn new() -> Self {
        Self {
            store: PresetStore::default(),
        }
    }

    #[classattr]
    #[pyo3(name = "RETURN_TYPES")]
    fn return_types() -> (&'static str, &'static str) {
        (NODE_STRING, NODE_STRING)
    }

    #[classattr]
    #[pyo3(name = "RETURN_NAMES")]
    fn return_names() -> (&'static str, &'static str) {
        ("positive", "negative")
    }

    #[classattr]
    #[pyo3(name = "CATEGORY")]
    const CATEGORY: &'static str = CATEGORY_PRESET;

    #[classattr]
    #[pyo3(name = "DESCRIPTION")]
    fn description() -> &'static str {
        "Add positive and negative tags when trigger tags from tags.jsonc are present."
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
                required.set_item(
                    "text",
                    (NODE_STRING, {
                        let text = PyDict::new(py);
                        text.set_item("multiline", true)?;
                        text.set_item("default", "")?;
                        text
                    }),
                )?;
                required
            })?;
            dict.set_item("hidden", {
                let hidden = PyDict::new(py);
                hidden.set_item("unique_id", "UNIQUE_ID")?;
                hidden
            })?;
            Ok(dict.into())
        })
    }

    #[classmethod]
    #[pyo3(name = "IS_CHANGED", signature = (*_args, **_kwargs))]
    fn is_changed(
        _cls: &Bound<'_, PyType>,
        _args: &Bound<'_, PyTuple>,
        _kwargs: Option<&Bound<'_, PyDict>>,
    ) -> f64 {
        PresetStore::default().modified(PresetKind::Tags)
    }

    #[pyo3(name = "execute", signature = (text, **_kwargs))]
    fn execute(
        &self,
        text: &str,
        _kwargs: Option<&Bound<'_, PyDict>>,
    ) -> PyResult<(String, String)> {
        if text.trim().is_empty() {
            return Ok(Default::default());
        }

        let tags = self.store.presets::<PromptPair>(PresetKind::Tags);
        let prompt = tag_prompt(text, &tags);
        Ok((prompt.positive, prompt.negative))
    }
}

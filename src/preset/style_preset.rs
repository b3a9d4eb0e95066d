//! 风格预设

use pyo3::{
    pyclass, pymethods,
    types::{PyDict, PyDictMethods, PyTuple, PyType},
    Bound, Py, PyResult, Python,
};

use crate::{
    core::category::CATEGORY_PRESET,
    preset::{
        prompt::{style_prompt, NONE_PRESET},
        store::PresetStore,
        types::{PresetKind, PromptPair},
    },
    wrapper::comfyui::types::NODE_STRING,
};

#[pyclass(subclass)]
pub struct StylePresetNode {
    store: PresetStore,
}

#[pymethods]
impl StylePresetNode {
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
    #[pyo3(name = "FUNCTION")]
    const FUNCTION: &'static str = "execute";

    #[classmethod]
    #[pyo3(name = "INPUT_TYPES")]
    fn input_types(_cls: &Bound<'_, PyType>) -> PyResult<Py<PyDict>> {
        Python::with_gil(|py| {
            let styles = PresetStore::default().presets::<PromptPair>(PresetKind::Styles);
            let mut options = vec![NONE_PRESET.to_string()];
            options.extend(styles.sorted_names());

            let dict = PyDict::new(py);
            dict.set_item("required", {
                let required = PyDict::new(py);
                required.set_item(
                    "style",
                    (options, {
                        let style = PyDict::new(py);
                        style.set_item("default", NONE_PRESET)?;
                        style
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
        PresetStore::default().modified(PresetKind::Styles)
    }

    #[pyo3(name = "execute", signature = (style, **_kwargs))]
    fn execute(
        &self,
        style: &str,
        _kwargs: Option<&Bound<'_, PyDict>>,
    ) -> PyResult<(String, String)> {
        let styles = self.store.presets::<PromptPair>(PresetKind::Styles);
        let prompt = style_prompt(style, &styles);
        Ok((prompt.positive, prompt.negative))
    }
}

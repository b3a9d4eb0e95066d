//! 模型预设

use pyo3::{
    pyclass, pymethods,
    types::{PyDict, PyDictMethods, PyTuple, PyType},
    Bound, Py, PyResult, Python,
};

use crate::{
    core::category::CATEGORY_PRESET,
    preset::{
        prompt::model_prompt,
        store::PresetStore,
        types::{ModelPreset, PresetKind},
    },
    wrapper::comfyui::types::{NODE_BOOLEAN, NODE_STRING},
};

/// 按检查点输出质量标签与嵌入
#[pyclass(subclass)]
pub struct ModelPresetNode {
    store: PresetStore,
}

#[pymethods]
impl ModelPresetNode {
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
        "Quality tags and embeddings for a checkpoint, looked up by file name and then by family folder."
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
                    "ckpt_name",
                    (NODE_STRING, {
                        let ckpt_name = PyDict::new(py);
                        ckpt_name.set_item("default", "")?;
                        ckpt_name
                    }),
                )?;
                required.set_item(
                    "quality_tags",
                    (NODE_BOOLEAN, {
                        let quality_tags = PyDict::new(py);
                        quality_tags.set_item("default", true)?;
                        quality_tags
                    }),
                )?;
                required.set_item(
                    "embeddings",
                    (NODE_BOOLEAN, {
                        let embeddings = PyDict::new(py);
                        embeddings.set_item("default", true)?;
                        embeddings
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
        PresetStore::default().modified(PresetKind::Models)
    }

    #[pyo3(name = "execute", signature = (ckpt_name, quality_tags, embeddings, **_kwargs))]
    fn execute(
        &self,
        ckpt_name: &str,
        quality_tags: bool,
        embeddings: bool,
        _kwargs: Option<&Bound<'_, PyDict>>,
    ) -> PyResult<(String, String)> {
        let models = self.store.presets::<ModelPreset>(PresetKind::Models);
        let prompt = model_prompt(ckpt_name, &models, quality_tags, embeddings);
        Ok((prompt.positive, prompt.negative))
    }
}

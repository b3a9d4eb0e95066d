//! 标签替换

use pyo3::{
    pyclass, pymethods,
    types::{PyDict, PyDictMethods, PyTuple, PyType},
    Bound, Py, PyResult, Python,
};

use crate::{
    core::category::CATEGORY_PRESET,
    preset::{
        prompt::replace_tags,
        store::PresetStore,
        types::{CharacterEntry, PresetKind},
    },
    wrapper::comfyui::types::NODE_STRING,
};

/// 名称为角色的标签替换为角色预设, 其余标签输出到 prompt
#[pyclass(subclass)]
pub struct TagReplacementNode {
    store: PresetStore,
}

#[pymethods]
impl TagReplacementNode {
    #[new]
    fn new() -> Self {
        Self {
            store: PresetStore::default(),
        }
    }

    #[classattr]
    #[pyo3(name = "RETURN_TYPES")]
    fn return_types() -> (&'static str, &'static str, &'static str, &'static str) {
        (NODE_STRING, NODE_STRING, NODE_STRING, NODE_STRING)
    }

    #[classattr]
    #[pyo3(name = "RETURN_NAMES")]
    fn return_names() -> (&'static str, &'static str, &'static str, &'static str) {
        ("prompt", "character_pos", "character_neg", "match")
    }

    #[classattr]
    #[pyo3(name = "CATEGORY")]
    const CATEGORY: &'static str = CATEGORY_PRESET;

    #[classattr]
    #[pyo3(name = "DESCRIPTION")]
    fn description() -> &'static str {
        "Replace character names in a comma separated tag list. 'top' and 'bottom' tags add the outfit."
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
                    "input_tags",
                    (NODE_STRING, {
                        let input_tags = PyDict::new(py);
                        input_tags.set_item("multiline", true)?;
                        input_tags.set_item("default", "")?;
                        input_tags
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
        PresetStore::default().modified(PresetKind::Characters)
    }

    #[pyo3(name = "execute", signature = (input_tags, **_kwargs))]
    fn execute(
        &self,
        input_tags: &str,
        _kwargs: Option<&Bound<'_, PyDict>>,
    ) -> PyResult<(String, String, String, String)> {
        if input_tags.trim().is_empty() {
            return Ok(Default::default());
        }

        let characters = self.store.presets::<CharacterEntry>(PresetKind::Characters);
        let result = replace_tags(input_tags, &characters);
        Ok((
            result.prompt,
            result.character_pos,
            result.character_neg,
            result.matched.unwrap_or_default(),
        ))
    }
}

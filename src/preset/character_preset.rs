//! 角色预设

use pyo3::{
    pyclass, pymethods,
    types::{PyDict, PyDictMethods, PyTuple, PyType},
    Bound, Py, PyResult, Python,
};

use crate::{
    core::category::CATEGORY_PRESET,
    preset::{
        prompt::{character_prompt, NONE_PRESET},
        store::PresetStore,
        types::{CharacterEntry, PresetKind},
    },
    wrapper::comfyui::types::{NODE_BOOLEAN, NODE_STRING},
};

/// 选择角色, 可附带默认服装
#[pyclass(subclass)]
pub struct CharacterPresetNode {
    store: PresetStore,
}

#[pymethods]
impl CharacterPresetNode {
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
        "Select a character from characters.jsonc, optionally with its default outfit."
    }

    #[classattr]
    #[pyo3(name = "FUNCTION")]
    const FUNCTION: &'static str = "execute";

    #[classmethod]
    #[pyo3(name = "INPUT_TYPES")]
    fn input_types(_cls: &Bound<'_, PyType>) -> PyResult<Py<PyDict>> {
        Python::with_gil(|py| {
            let characters = PresetStore::default().presets::<CharacterEntry>(PresetKind::Characters);
            let mut options = vec![NONE_PRESET.to_string()];
            options.extend(characters.sorted_names());

            let dict = PyDict::new(py);
            dict.set_item("required", {
                let required = PyDict::new(py);
                required.set_item(
                    "character",
                    (options, {
                        let character = PyDict::new(py);
                        character.set_item("default", NONE_PRESET)?;
                        character
                    }),
                )?;
                required.set_item(
                    "use_default_outfit",
                    (NODE_BOOLEAN, {
                        let use_default_outfit = PyDict::new(py);
                        use_default_outfit.set_item("default", true)?;
                        use_default_outfit
                    }),
                )?;
                required.set_item(
                    "use_bottom",
                    (NODE_BOOLEAN, {
                        let use_bottom = PyDict::new(py);
                        use_bottom.set_item("default", true)?;
                        use_bottom.set_item("tooltip", "Only applies with the default outfit.")?;
                        use_bottom
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

    /// 预设文件修改后重新执行
    #[classmethod]
    #[pyo3(name = "IS_CHANGED", signature = (*_args, **_kwargs))]
    fn is_changed(
        _cls: &Bound<'_, PyType>,
        _args: &Bound<'_, PyTuple>,
        _kwargs: Option<&Bound<'_, PyDict>>,
    ) -> f64 {
        PresetStore::default().modified(PresetKind::Characters)
    }

    #[pyo3(
        name = "execute",
        signature = (character, use_default_outfit, use_bottom, **_kwargs)
    )]
    fn execute(
        &self,
        character: &str,
        use_default_outfit: bool,
        use_bottom: bool,
        _kwargs: Option<&Bound<'_, PyDict>>,
    ) -> PyResult<(String, String)> {
        if character == NONE_PRESET {
            return Ok((String::new(), String::new()));
        }

        let characters = self.store.presets::<CharacterEntry>(PresetKind::Characters);
        let prompt = character_prompt(characters.get(character), use_default_outfit, use_bottom);
        Ok((prompt.positive, prompt.negative))
    }
}

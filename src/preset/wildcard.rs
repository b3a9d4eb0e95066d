//! 通配符

use pyo3::{
    pyclass, pymethods,
    types::{PyDict, PyDictMethods, PyType},
    Bound, Py, PyResult, Python,
};

use crate::{
    core::category::CATEGORY_PRESET,
    preset::{
        prompt::replace_wildcards,
        store::PresetStore,
        types::PresetKind,
    },
    wrapper::comfyui::types::NODE_STRING,
};

/// 通配符键替换为随机选项
#[pyclass(subclass)]
pub struct WildcardNode {
    store: PresetStore,
}

#[pymethods]
impl WildcardNode {
    #[new]
    fn new() -> Self {
        Self {
            store: PresetStore::default(),
        }
    }

    #[classattr]
    #[pyo3(name = "RETURN_TYPES")]
    fn return_types() -> (&'static str,) {
        (NODE_STRING,)
    }

    #[classattr]
    #[pyo3(name = "RETURN_NAMES")]
    fn return_names() -> (&'static str,) {
        ("output",)
    }

    #[classattr]
    #[pyo3(name = "CATEGORY")]
    const CATEGORY: &'static str = CATEGORY_PRESET;

    #[classattr]
    #[pyo3(name = "DESCRIPTION")]
    fn description() -> &'static str {
        "Replace wildcard keys from wildcards.jsonc with a random '|' separated option."
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
            dict.set_item("optional", {
                let optional = PyDict::new(py);
                optional.set_item(
                    "opt_string",
                    (NODE_STRING, {
                        let opt_string = PyDict::new(py);
                        opt_string.set_item("default", "")?;
                        opt_string.set_item("forceInput", true)?;
                        opt_string
                    }),
                )?;
                optional
            })?;
            dict.set_item("hidden", {
                let hidden = PyDict::new(py);
                hidden.set_item("unique_id", "UNIQUE_ID")?;
                hidden
            })?;
            Ok(dict.into())
        })
    }

    /// 有文本时每次都重新抽取
    #[classmethod]
    #[pyo3(name = "IS_CHANGED", signature = (text, **_kwargs))]
    fn is_changed(
        _cls: &Bound<'_, PyType>,
        text: &str,
        _kwargs: Option<&Bound<'_, PyDict>>,
    ) -> f64 {
        if !text.is_empty() {
            return rand::random::<f64>();
        }
        PresetStore::default().modified(PresetKind::Wildcards)
    }

    #[pyo3(name = "execute", signature = (text, opt_string=None, **_kwargs))]
    fn execute(
        &self,
        text: &str,
        opt_string: Option<String>,
        _kwargs: Option<&Bound<'_, PyDict>>,
    ) -> PyResult<(String,)> {
        let opt_string = opt_string.unwrap_or_default();
        if text.is_empty() {
            return Ok((opt_string,));
        }

        let wildcards = self.store.presets::<String>(PresetKind::Wildcards);
        let mut rng = rand::rng();
        Ok((replace_wildcards(text, &opt_string, &wildcards, &mut rng),))
    }
}

//! 种子 (可覆盖)

use pyo3::{
    pyclass, pymethods,
    types::{PyDict, PyDictMethods, PyType},
    Bound, Py, PyResult, Python,
};

use crate::{
    core::category::CATEGORY_SAMPLING,
    wrapper::comfyui::types::{NODE_INT, NODE_SEED_MAX},
};

/// 种子, 连接 override_seed 时优先使用
#[pyclass(subclass)]
pub struct SeedWithOverride {}

#[pymethods]
impl SeedWithOverride {
    #[new]
    fn new() -> Self {
        Self {}
    }

    #[classattr]
    #[pyo3(name = "RETURN_TYPES")]
    fn return_types() -> (&'static str,) {
        (NODE_INT,)
    }

    #[classattr]
    #[pyo3(name = "RETURN_NAMES")]
    fn return_names() -> (&'static str,) {
        ("seed",)
    }

    #[classattr]
    #[pyo3(name = "CATEGORY")]
    const CATEGORY: &'static str = CATEGORY_SAMPLING;

    #[classattr]
    #[pyo3(name = "DESCRIPTION")]
    fn description() -> &'static str {
        "A seed widget that yields to an optional override input."
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
                    "seed",
                    (NODE_INT, {
                        let seed = PyDict::new(py);
                        seed.set_item("default", 0)?;
                        seed.set_item("min", 0)?;
                        seed.set_item("max", NODE_SEED_MAX)?;
                        seed
                    }),
                )?;
                required
            })?;
            dict.set_item("optional", {
                let optional = PyDict::new(py);
                optional.set_item(
                    "override_seed",
                    (NODE_INT, {
                        let override_seed = PyDict::new(py);
                        override_seed.set_item("forceInput", true)?;
                        override_seed
                    }),
                )?;
                optional
            })?;
            Ok(dict.into())
        })
    }

    #[pyo3(name = "execute", signature = (seed, override_seed=None))]
    fn execute(&self, seed: u64, override_seed: Option<u64>) -> PyResult<(u64,)> {
        Ok((override_seed.unwrap_or(seed),))
    }
}

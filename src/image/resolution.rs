//! 分辨率选择

use pyo3::{
    pyclass, pymethods,
    types::{PyDict, PyDictMethods, PyType},
    Bound, Py, PyResult, Python,
};

use crate::{
    core::category::CATEGORY_IMAGE,
    error::Error,
    wrapper::comfyui::{
        types::{NODE_BOOLEAN, NODE_INT},
        PromptServer,
    },
};

/// SDXL 分辨率预设, 均为竖版或正方形
pub const RESOLUTIONS: [(&str, usize, usize); 7] = [
    ("1024x1024 (1:1)", 1024, 1024),
    ("960x1088 (8:9)", 960, 1088),
    ("896x1152 (7:9)", 896, 1152),
    ("832x1216 (2:3)", 832, 1216),
    ("768x1344 (4:7)", 768, 1344),
    ("704x1408 (1:2)", 704, 1408),
    ("640x1536 (5:12)", 640, 1536),
];

pub fn resolution_names() -> Vec<&'static str> {
    RESOLUTIONS.iter().map(|(name, _, _)| *name).collect()
}

/// 预设对应的 (宽, 高), 横版时交换
pub fn select_resolution(name: &str, portrait: bool) -> Result<(usize, usize), Error> {
    let (_, width, height) = RESOLUTIONS
        .iter()
        .find(|(preset, _, _)| *preset == name)
        .ok_or_else(|| Error::InvalidParameter(format!("unknown resolution '{name}'")))?;

    if portrait {
        Ok((*width, *height))
    } else {
        Ok((*height, *width))
    }
}

#[pyclass(subclass)]
pub struct ResolutionSelector {}

impl PromptServer for ResolutionSelector {}

#[pymethods]
impl ResolutionSelector {
    #[new]
    fn new() -> Self {
        Self {}
    }

    #[classattr]
    #[pyo3(name = "RETURN_TYPES")]
    fn return_types() -> (&'static str, &'static str) {
        (NODE_INT, NODE_INT)
    }

    #[classattr]
    #[pyo3(name = "RETURN_NAMES")]
    fn return_names() -> (&'static str, &'static str) {
        ("width", "height")
    }

    #[classattr]
    #[pyo3(name = "CATEGORY")]
    const CATEGORY: &'static str = CATEGORY_IMAGE;

    #[classattr]
    #[pyo3(name = "DESCRIPTION")]
    fn description() -> &'static str {
        "Preset resolutions optimized for SDXL models with a portrait/landscape toggle."
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
                required.set_item("resolution", (resolution_names(),))?;
                required.set_item(
                    "portrait",
                    (NODE_BOOLEAN, {
                        let portrait = PyDict::new(py);
                        portrait.set_item("default", true)?;
                        portrait
                    }),
                )?;
                required
            })?;
            Ok(dict.into())
        })
    }

    #[pyo3(name = "execute")]
    fn execute(&self, py: Python<'_>, resolution: &str, portrait: bool) -> PyResult<(usize, usize)> {
        select_resolution(resolution, portrait)
            .map_err(|e| self.raise_error(py, "ResolutionSelector", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_select_resolution() -> anyhow::Result<()> {
        assert_eq!(select_resolution("832x1216 (2:3)", true)?, (832, 1216));
        assert_eq!(select_resolution("832x1216 (2:3)", false)?, (1216, 832));
        assert_eq!(select_resolution("1024x1024 (1:1)", false)?, (1024, 1024));
        assert!(select_resolution("512x512", true).is_err());
        assert_eq!(resolution_names().len(), 7);
        Ok(())
    }
}

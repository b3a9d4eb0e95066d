//! 图片

use pyo3::{
    types::{PyModule, PyModuleMethods},
    Bound, PyResult, Python,
};

use crate::core::node::NodeRegister;

pub mod resolution;
pub mod upscale;

mod auto_level;
pub use auto_level::AutoLevelNode;

mod combined_upscale;
pub use combined_upscale::CombinedUpscaleNode;

pub use resolution::ResolutionSelector;

/// 图片模块
pub fn submodule(py: Python<'_>) -> PyResult<Bound<'_, PyModule>> {
    let submodule = PyModule::new(py, "image")?;
    submodule.add_class::<AutoLevelNode>()?;
    submodule.add_class::<CombinedUpscaleNode>()?;
    submodule.add_class::<ResolutionSelector>()?;
    Ok(submodule)
}

/// Image node register
pub fn node_register(py: Python<'_>) -> PyResult<Vec<NodeRegister<'_>>> {
    let nodes: Vec<NodeRegister> = vec![
        NodeRegister("AutoLevelNode", py.get_type::<AutoLevelNode>(), "Auto Level"),
        NodeRegister(
            "CombinedUpscaleNode",
            py.get_type::<CombinedUpscaleNode>(),
            "Combined Upscale (Model + Scale)",
        ),
        NodeRegister(
            "ResolutionSelector",
            py.get_type::<ResolutionSelector>(),
            "Resolution Selector",
        ),
    ];
    Ok(nodes)
}

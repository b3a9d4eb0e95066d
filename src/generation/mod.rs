//! 生成

use pyo3::{
    types::{PyModule, PyModuleMethods},
    Bound, PyResult, Python,
};

use crate::core::node::NodeRegister;

mod inputs;

mod base_node;
pub use base_node::BaseNode;

mod upscale_node;
pub use upscale_node::UpscaleNode;

/// 生成模块
pub fn submodule(py: Python<'_>) -> PyResult<Bound<'_, PyModule>> {
    let submodule = PyModule::new(py, "generation")?;
    submodule.add_class::<BaseNode>()?;
    submodule.add_class::<UpscaleNode>()?;
    Ok(submodule)
}

/// Generation node register
pub fn node_register(py: Python<'_>) -> PyResult<Vec<NodeRegister<'_>>> {
    let nodes: Vec<NodeRegister> = vec![
        NodeRegister("BaseNode", py.get_type::<BaseNode>(), "Base Generation (full-pipe)"),
        NodeRegister("UpscaleNode", py.get_type::<UpscaleNode>(), "Upscale (full-pipe)"),
    ];
    Ok(nodes)
}

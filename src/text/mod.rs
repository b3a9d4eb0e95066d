//! 提示词与文本条件

use pyo3::{
    types::{PyModule, PyModuleMethods},
    Bound, PyResult, Python,
};

use crate::core::node::NodeRegister;

pub mod prompt_text;

mod multi_string_conditioning;
pub use multi_string_conditioning::{encode_segments, MultiStringConditioning};

mod prompt_conditioning;
pub use prompt_conditioning::PromptConditioningNode;

/// 文本模块
pub fn submodule(py: Python<'_>) -> PyResult<Bound<'_, PyModule>> {
    let submodule = PyModule::new(py, "text")?;
    submodule.add_class::<MultiStringConditioning>()?;
    submodule.add_class::<PromptConditioningNode>()?;
    Ok(submodule)
}

/// Text node register
pub fn node_register(py: Python<'_>) -> PyResult<Vec<NodeRegister<'_>>> {
    let nodes: Vec<NodeRegister> = vec![
        NodeRegister(
            "MultiStringConditioning",
            py.get_type::<MultiStringConditioning>(),
            "Multi-String Conditioning",
        ),
        NodeRegister(
            "PromptConditioningNode",
            py.get_type::<PromptConditioningNode>(),
            "Prompt Conditioning",
        ),
    ];
    Ok(nodes)
}

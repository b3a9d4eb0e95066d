//! 预设
//!
//! 角色, 风格, 模型, 标签与通配符预设, 均存放在配置目录的 jsonc 文件中

use pyo3::{
    types::{PyModule, PyModuleMethods},
    Bound, PyResult, Python,
};

use crate::core::node::NodeRegister;

pub mod character_editor;
pub mod jsonc;
pub mod prompt;
pub mod store;
pub mod types;

mod model_preset;
pub use model_preset::ModelPresetNode;

mod style_preset;
pub use style_preset::StylePresetNode;

mod character_preset;
pub use character_preset::CharacterPresetNode;

mod tag_replacement;
pub use tag_replacement::TagReplacementNode;

mod wildcard;
pub use wildcard::WildcardNode;

mod tag_preset;
pub use tag_preset::TagPresetNode;

/// 预设模块
pub fn submodule(py: Python<'_>) -> PyResult<Bound<'_, PyModule>> {
    let submodule = PyModule::new(py, "preset")?;
    submodule.add_class::<ModelPresetNode>()?;
    submodule.add_class::<StylePresetNode>()?;
    submodule.add_class::<CharacterPresetNode>()?;
    submodule.add_class::<TagReplacementNode>()?;
    submodule.add_class::<WildcardNode>()?;
    submodule.add_class::<TagPresetNode>()?;
    submodule.add_submodule(&character_editor::submodule(py)?)?;
    Ok(submodule)
}

/// Preset node register
pub fn node_register(py: Python<'_>) -> PyResult<Vec<NodeRegister<'_>>> {
    let nodes: Vec<NodeRegister> = vec![
        NodeRegister(
            "ModelPresetNode",
            py.get_type::<ModelPresetNode>(),
            "Model Preset",
        ),
        NodeRegister(
            "StylePresetNode",
            py.get_type::<StylePresetNode>(),
            "Style Preset",
        ),
        NodeRegister(
            "CharacterPresetNode",
            py.get_type::<CharacterPresetNode>(),
            "Character Preset",
        ),
        NodeRegister(
            "TagReplacementNode",
            py.get_type::<TagReplacementNode>(),
            "Tag Replace",
        ),
        NodeRegister(
            "WildcardNode",
            py.get_type::<WildcardNode>(),
            "Wildcard passthrough",
        ),
        NodeRegister("TagPresetNode", py.get_type::<TagPresetNode>(), "Tag Preset"),
    ];
    Ok(nodes)
}

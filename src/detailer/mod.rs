//! 区域细化
//!
//! 检测 -> 裁剪 -> 重绘 -> 回贴

use pyo3::{
    types::{PyModule, PyModuleMethods},
    Bound, PyResult, Python,
};

use crate::core::node::NodeRegister;

pub mod backend;
pub mod bbox;
pub mod compositor;
pub mod orchestrator;
pub mod segment;

mod comfy_backend;
mod inputs;

mod detailer_node;
pub use detailer_node::{DetailerNode, DetailerPipeNode};

mod mask_detailer_node;
pub use mask_detailer_node::{MaskDetailerNode, MaskDetailerPipeNode};

mod bbox_inset_and_crop;
pub use bbox_inset_and_crop::BBoxInsetAndCrop;

/// 细化参数
#[derive(Debug, Clone, PartialEq)]
pub struct DetailerOptions {
    /// 检测置信度阈值
    pub threshold: f32,
    /// 裁剪图重绘时的总像素 (百万)
    pub megapixels: f64,
    /// 回贴羽化比例, 0..=1
    pub feather: f32,
    /// 回贴前收缩的边缘像素
    pub edge_erosion: usize,
    /// 保留为上下文, 不参与重绘的边缘像素 (源图坐标)
    pub context_padding: usize,
}

impl Default for DetailerOptions {
    fn default() -> Self {
        Self {
            threshold: 0.5,
            megapixels: 1.0,
            feather: 0.25,
            edge_erosion: 10,
            context_padding: 0,
        }
    }
}

/// 细化模块
pub fn submodule(py: Python<'_>) -> PyResult<Bound<'_, PyModule>> {
    let submodule = PyModule::new(py, "detailer")?;
    submodule.add_class::<DetailerNode>()?;
    submodule.add_class::<DetailerPipeNode>()?;
    submodule.add_class::<MaskDetailerNode>()?;
    submodule.add_class::<MaskDetailerPipeNode>()?;
    submodule.add_class::<BBoxInsetAndCrop>()?;
    Ok(submodule)
}

/// Detailer node register
pub fn node_register(py: Python<'_>) -> PyResult<Vec<NodeRegister<'_>>> {
    let nodes: Vec<NodeRegister> = vec![
        NodeRegister(
            "DetailerNode",
            py.get_type::<DetailerNode>(),
            "Detailer (All-in-One)",
        ),
        NodeRegister(
            "DetailerPipeNode",
            py.get_type::<DetailerPipeNode>(),
            "Detailer (Pipe)",
        ),
        NodeRegister(
            "MaskDetailerNode",
            py.get_type::<MaskDetailerNode>(),
            "Mask Detailer",
        ),
        NodeRegister(
            "MaskDetailerPipeNode",
            py.get_type::<MaskDetailerPipeNode>(),
            "Mask Detailer (Pipe)",
        ),
        NodeRegister(
            "BBoxInsetAndCrop",
            py.get_type::<BBoxInsetAndCrop>(),
            "BBox Inset and Crop",
        ),
    ];
    Ok(nodes)
}

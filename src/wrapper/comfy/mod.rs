//! ComfyUI python 模块包装

pub mod folder_paths;
pub mod node_class;
pub mod samplers;
pub mod utils;

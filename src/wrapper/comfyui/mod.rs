//! ComfyUI 前端/类型相关

mod prompt_server;
pub use prompt_server::PromptServer;

pub mod types;

//! 类型定义
//! 相关节点定义: ComfyUI/comfy/comfy_types/node_typing.py

pub const NODE_INT: &str = "INT";
pub const NODE_FLOAT: &str = "FLOAT";
pub const NODE_STRING: &str = "STRING";
pub const NODE_BOOLEAN: &str = "BOOLEAN";
pub const NODE_IMAGE: &str = "IMAGE";
pub const NODE_MASK: &str = "MASK";
pub const NODE_MODEL: &str = "MODEL";
pub const NODE_CLIP: &str = "CLIP";
pub const NODE_CONDITIONING: &str = "CONDITIONING";
pub const NODE_VAE: &str = "VAE";
pub const NODE_LATENT: &str = "LATENT";
pub const NODE_UPSCALE_MODEL: &str = "UPSCALE_MODEL";

/// 扩展自定义类型
pub const NODE_BBOX: &str = "BBOX";
pub const NODE_FULL_PIPE: &str = "FULL_PIPE";
pub const NODE_LORA_STACK: &str = "LORA_STACK";

pub const NODE_SEED_MAX: u64 = 0xffffffffffffffffu64;

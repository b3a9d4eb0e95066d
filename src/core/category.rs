//! 节点分类

/// 细化
pub const CATEGORY_DETAILER: &str = "Mudknight/Detailer";
/// 管道
pub const CATEGORY_PIPE: &str = "Mudknight/Pipe";
/// 预设
pub const CATEGORY_PRESET: &str = "Mudknight/Preset";
/// 条件
pub const CATEGORY_CONDITIONING: &str = "Mudknight/Conditioning";
/// 图片
pub const CATEGORY_IMAGE: &str = "Mudknight/Image";
/// 采样
pub const CATEGORY_SAMPLING: &str = "Mudknight/Sampling";
/// 生成
pub const CATEGORY_GENERATION: &str = "Mudknight/Generation";

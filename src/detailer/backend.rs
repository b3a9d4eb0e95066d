//! 细化流程依赖的外部能力
//!
//! 检测与生成由宿主完成, 编排逻辑只依赖这两个 trait

use candle_core::Tensor;

use crate::error::Error;

/// 区域检测
pub trait SegmentDetector {
    type Segment;

    /// 返回按检测顺序排列的区域
    fn detect(&self, image: &Tensor, threshold: f32) -> Result<Vec<Self::Segment>, Error>;
}

/// 区域重绘
pub trait RegionRefiner {
    type Segment;
    type Latent;

    /// 区域遮罩, 尺寸与源图一致
    fn segment_mask(&self, image: &Tensor, segment: &Self::Segment) -> Result<Tensor, Error>;

    /// 超分模型放大, 未配置模型时返回 None
    fn upscale_with_model(&self, crop: &Tensor) -> Result<Option<Tensor>, Error>;

    fn resize(&self, image: &Tensor, width: usize, height: usize) -> Result<Tensor, Error>;

    fn encode(&self, image: &Tensor) -> Result<Self::Latent, Error>;

    /// 像素空间噪声遮罩 [1, H, W]
    fn set_noise_mask(&self, latent: Self::Latent, mask: &Tensor) -> Result<Self::Latent, Error>;

    fn sample(&self, latent: &Self::Latent) -> Result<Self::Latent, Error>;

    fn decode(&self, latent: &Self::Latent) -> Result<Tensor, Error>;
}

//! 单区域处理
//!
//! 遮罩 -> 裁剪 -> (超分) -> 按总像素缩放 -> 编码 -> 采样 -> 解码 -> 还原尺寸 -> 边缘腐蚀

use candle_core::{Device, Tensor};
use log::{debug, warn};

use crate::{
    detailer::{backend::RegionRefiner, bbox::BoundingBox, DetailerOptions},
    error::Error,
    image::upscale::total_pixel_dims,
};

/// 处理后的区域
#[derive(Debug, Clone)]
pub struct ProcessedCrop {
    /// 还原到源图分辨率的完整裁剪图
    pub image: Tensor,
    /// 边缘腐蚀后的裁剪图
    pub eroded: Tensor,
    /// 腐蚀后的边界框 (源图坐标)
    pub bbox: BoundingBox,
}

/// 处理单个区域, 遮罩为空时跳过
pub fn process_segment<R: RegionRefiner>(
    refiner: &R,
    image: &Tensor,
    segment: &R::Segment,
    options: &DetailerOptions,
) -> Result<Option<ProcessedCrop>, Error> {
    let (_, height, width, _) = image.dims4()?;

    let mask = refiner.segment_mask(image, segment)?;
    let bbox = match BoundingBox::from_mask(&mask)?.and_then(|b| b.clamp_to(width, height)) {
        Some(bbox) => bbox,
        None => {
            warn!("segment mask is empty, skipping");
            return Ok(None);
        }
    };
    debug!("segment bbox: {bbox:?}");

    let crop = bbox.crop(image)?;
    let crop = match refiner.upscale_with_model(&crop)? {
        Some(upscaled) => upscaled,
        None => crop,
    };

    let (_, crop_h, crop_w, _) = crop.dims4()?;
    let (scaled_w, scaled_h) = total_pixel_dims(crop_w, crop_h, options.megapixels);
    let scaled = refiner.resize(&crop, scaled_w, scaled_h)?;

    let mut latent = refiner.encode(&scaled)?;
    if let Some(noise_mask) = context_noise_mask(
        (bbox.width, bbox.height),
        (scaled_w, scaled_h),
        options.context_padding,
        image.device(),
    )? {
        latent = refiner.set_noise_mask(latent, &noise_mask)?;
    }

    let sampled = refiner.sample(&latent)?;
    let decoded = refiner.decode(&sampled)?;
    let restored = refiner.resize(&decoded, bbox.width, bbox.height)?;

    let (eroded, eroded_bbox) = bbox.inset_and_crop(&restored, options.edge_erosion)?;

    Ok(Some(ProcessedCrop {
        image: restored,
        eroded,
        bbox: eroded_bbox,
    }))
}

/// 上下文填充的噪声遮罩 [1, H, W]
///
/// 填充宽度以源图像素给出, 按缩放比例换算到缩放后的裁剪图; 边框为 0, 内部为 1.
/// padding 为 0 时不设置遮罩.
pub fn context_noise_mask(
    source: (usize, usize),
    scaled: (usize, usize),
    padding: usize,
    device: &Device,
) -> Result<Option<Tensor>, Error> {
    if padding == 0 {
        return Ok(None);
    }

    let (src_w, src_h) = source;
    let (width, height) = scaled;
    let pad_x = (padding as f64 * width as f64 / src_w.max(1) as f64).round() as usize;
    let pad_y = (padding as f64 * height as f64 / src_h.max(1) as f64).round() as usize;
    let inner = BoundingBox::new(0, 0, width, height).inset_xy(pad_x, pad_y);

    let mut data = vec![0f32; width * height];
    for y in inner.y..inner.y + inner.height {
        let row = y * width;
        data[row + inner.x..row + inner.x + inner.width].fill(1.0);
    }

    Ok(Some(Tensor::from_vec(data, (1, height, width), device)?))
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use candle_core::DType;

    use super::*;

    /// 超分固定放大 2 倍, 记录缩放目标与噪声遮罩尺寸
    #[derive(Default)]
    struct UpscalingRefiner {
        resizes: RefCell<Vec<((usize, usize), (usize, usize))>>,
        noise_masks: RefCell<Vec<Vec<usize>>>,
    }

    impl RegionRefiner for UpscalingRefiner {
        type Segment = BoundingBox;
        type Latent = Tensor;

        fn segment_mask(&self, image: &Tensor, segment: &BoundingBox) -> Result<Tensor, Error> {
            let (_, h, w, _) = image.dims4()?;
            let mut data = vec![0f32; h * w];
            for row in segment.y..segment.y + segment.height {
                data[row * w + segment.x..row * w + segment.x + segment.width].fill(1.0);
            }
            Ok(Tensor::from_vec(data, (1, h, w), image.device())?)
        }

        fn upscale_with_model(&self, crop: &Tensor) -> Result<Option<Tensor>, Error> {
            let (b, h, w, c) = crop.dims4()?;
            Ok(Some(Tensor::zeros((b, h * 2, w * 2, c), DType::F32, crop.device())?))
        }

        fn resize(&self, image: &Tensor, width: usize, height: usize) -> Result<Tensor, Error> {
            let (b, h, w, c) = image.dims4()?;
            self.resizes.borrow_mut().push(((w, h), (width, height)));
            Ok(Tensor::zeros((b, height, width, c), DType::F32, image.device())?)
        }

        fn encode(&self, image: &Tensor) -> Result<Tensor, Error> {
            Ok(image.clone())
        }

        fn set_noise_mask(&self, latent: Tensor, mask: &Tensor) -> Result<Tensor, Error> {
            let total = mask.sum_all()?.to_scalar::<f32>()? as usize;
            let mut dims = mask.dims().to_vec();
            dims.push(total);
            self.noise_masks.borrow_mut().push(dims);
            Ok(latent)
        }

        fn sample(&self, latent: &Tensor) -> Result<Tensor, Error> {
            Ok(latent.clone())
        }

        fn decode(&self, latent: &Tensor) -> Result<Tensor, Error> {
            Ok(latent.clone())
        }
    }

    #[test]
    fn test_process_segment_with_upscale_model() -> anyhow::Result<()> {
        let image = Tensor::zeros((1, 32, 32, 3), DType::F32, &Device::Cpu)?;
        let segment = BoundingBox::new(4, 4, 8, 6);
        let options = DetailerOptions {
            // 超分后 16x12, 按总像素再放大 2 倍
            megapixels: 768.0 / (1024.0 * 1024.0),
            edge_erosion: 1,
            context_padding: 2,
            ..Default::default()
        };
        let refiner = UpscalingRefiner::default();

        let crop = process_segment(&refiner, &image, &segment, &options)?
            .ok_or_else(|| anyhow::anyhow!("segment skipped"))?;

        assert_eq!(
            *refiner.resizes.borrow(),
            vec![((16, 12), (32, 24)), ((32, 24), (8, 6))]
        );
        // 填充 2 像素按 4 倍换算为 8, 内部 16x8
        assert_eq!(*refiner.noise_masks.borrow(), vec![vec![1, 24, 32, 128]]);

        assert_eq!(crop.image.dims(), &[1, 6, 8, 3]);
        assert_eq!(crop.bbox, BoundingBox::new(5, 5, 6, 4));
        assert_eq!(crop.eroded.dims(), &[1, crop.bbox.height, crop.bbox.width, 3]);
        Ok(())
    }

    #[test]
    fn test_context_noise_mask() -> anyhow::Result<()> {
        assert!(context_noise_mask((10, 10), (20, 20), 0, &Device::Cpu)?.is_none());

        let mask = context_noise_mask((10, 5), (20, 10), 1, &Device::Cpu)?
            .ok_or_else(|| anyhow::anyhow!("mask"))?;
        assert_eq!(mask.dims(), &[1, 10, 20]);
        let rows = mask.squeeze(0)?.to_vec2::<f32>()?;
        assert_eq!(rows[0][5], 0.0);
        assert_eq!(rows[1][1], 0.0);
        assert_eq!(rows[2][2], 1.0);
        assert_eq!(rows[7][17], 1.0);
        assert_eq!(rows[8][17], 0.0);
        assert_eq!(rows[5][18], 0.0);
        Ok(())
    }

    #[test]
    fn test_context_noise_mask_keeps_one_pixel() -> anyhow::Result<()> {
        let mask = context_noise_mask((4, 4), (4, 4), 100, &Device::Cpu)?
            .ok_or_else(|| anyhow::anyhow!("mask"))?;
        let total = mask.sum_all()?.to_scalar::<f32>()?;
        assert_eq!(total, 1.0);
        Ok(())
    }
}

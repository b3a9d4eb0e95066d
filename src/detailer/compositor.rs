//! 批次拼接与回贴

use candle_core::Tensor;
use log::debug;

use crate::{
    detailer::{bbox::BoundingBox, segment::ProcessedCrop},
    error::Error,
};

/// 回贴的混合形状
#[derive(Debug, Clone)]
pub enum BlendShape {
    /// 仅按边缘羽化
    Square,
    /// 羽化权重再乘以遮罩 [H, W], 尺寸与裁剪图一致
    Mask(Tensor),
}

/// 右侧与底部补零到批次内最大尺寸后在批次维拼接
///
/// 仅用于预览
pub fn pad_batch(crops: &[Tensor]) -> Result<Tensor, Error> {
    if crops.is_empty() {
        return Err(Error::ListEmpty);
    }

    let mut max_h = 0;
    let mut max_w = 0;
    for crop in crops {
        let (_, h, w, _) = crop.dims4()?;
        max_h = max_h.max(h);
        max_w = max_w.max(w);
    }

    let padded = crops
        .iter()
        .map(|crop| {
            let (_, h, w, _) = crop.dims4()?;
            crop.pad_with_zeros(1, 0, max_h - h)?
                .pad_with_zeros(2, 0, max_w - w)
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Tensor::cat(&padded, 0)?)
}

/// 羽化权重, 行优先 [H, W]
///
/// 水平/垂直方向各有一段线性过渡, 宽度为 round(feather * 尺寸 / 2), 取两者最小值
pub fn feather_weights(width: usize, height: usize, feather: f32) -> Vec<f32> {
    let feather = feather.clamp(0.0, 1.0);
    let ramp = |len: usize| -> Vec<f32> {
        let border = (feather * len as f32 / 2.0).round() as usize;
        (0..len)
            .map(|i| {
                if border == 0 {
                    return 1.0;
                }
                let d = i.min(len - 1 - i);
                ((d + 1) as f32 / (border + 1) as f32).min(1.0)
            })
            .collect()
    };

    let ramp_x = ramp(width);
    let ramp_y = ramp(height);
    let mut weights = Vec::with_capacity(width * height);
    for wy in &ramp_y {
        for wx in &ramp_x {
            weights.push(wx.min(*wy));
        }
    }
    weights
}

/// 将裁剪图按边界框混合回原图
///
/// 边界框超出原图的部分被裁掉
pub fn uncrop(
    base: &Tensor,
    crop: &Tensor,
    bbox: &BoundingBox,
    feather: f32,
    shape: &BlendShape,
) -> Result<Tensor, Error> {
    let (b, h, w, c) = base.dims4()?;
    let (crop_b, crop_h, crop_w, crop_c) = crop.dims4()?;
    if crop_c != c || (crop_b != b && crop_b != 1) {
        return Err(Error::InvalidTensorShape(format!(
            "cannot paste crop {:?} into image {:?}",
            crop.dims(),
            base.dims()
        )));
    }
    if (crop_w, crop_h) != (bbox.width, bbox.height) {
        return Err(Error::InvalidTensorShape(format!(
            "crop {crop_w}x{crop_h} does not match bbox {bbox:?}"
        )));
    }

    let Some(target) = bbox.clamp_to(w, h) else {
        debug!("bbox {bbox:?} is outside of the image, skipping");
        return Ok(base.clone());
    };

    let crop = crop
        .narrow(1, 0, target.height)?
        .narrow(2, 0, target.width)?
        .to_dtype(base.dtype())?;
    let crop = if crop_b == b {
        crop
    } else {
        crop.broadcast_as((b, target.height, target.width, c))?
    };

    let weights = feather_weights(bbox.width, bbox.height, feather);
    let mut weight = Tensor::from_vec(weights, (bbox.height, bbox.width), base.device())?;
    if let BlendShape::Mask(mask) = shape {
        let mask = mask.to_dtype(weight.dtype())?.to_device(base.device())?;
        weight = weight.mul(&mask)?;
    }
    let weight = weight
        .narrow(0, 0, target.height)?
        .narrow(1, 0, target.width)?
        .to_dtype(base.dtype())?
        .reshape((1, target.height, target.width, 1))?;

    let region = target.crop(base)?;
    let blended = (region.broadcast_mul(&weight.affine(-1.0, 1.0)?)?
        + crop.broadcast_mul(&weight)?)?;

    let out = base.slice_assign(
        &[
            0..b,
            target.y..target.y + target.height,
            target.x..target.x + target.width,
            0..c,
        ],
        &blended.contiguous()?,
    )?;
    Ok(out)
}

/// 按检测顺序依次回贴腐蚀后的区域, 后者覆盖前者
pub fn composite(base: &Tensor, crops: &[ProcessedCrop], feather: f32) -> Result<Tensor, Error> {
    crops.iter().try_fold(base.clone(), |image, crop| {
        uncrop(&image, &crop.eroded, &crop.bbox, feather, &BlendShape::Square)
    })
}

#[cfg(test)]
mod tests {
    use candle_core::{DType, Device};

    use super::*;

    #[test]
    fn test_pad_batch() -> anyhow::Result<()> {
        let a = Tensor::ones((1, 40, 50, 3), DType::F32, &Device::Cpu)?;
        let b = Tensor::full(2f32, (1, 64, 40, 3), &Device::Cpu)?;

        let batch = pad_batch(&[a, b])?;
        assert_eq!(batch.dims(), &[2, 64, 50, 3]);

        let first = batch.get(0)?;
        assert_eq!(first.narrow(0, 0, 40)?.sum_all()?.to_scalar::<f32>()?, 40.0 * 50.0 * 3.0);
        assert_eq!(first.narrow(0, 40, 24)?.sum_all()?.to_scalar::<f32>()?, 0.0);

        let second = batch.get(1)?;
        assert_eq!(
            second.narrow(1, 0, 40)?.sum_all()?.to_scalar::<f32>()?,
            2.0 * 64.0 * 40.0 * 3.0
        );
        assert_eq!(second.narrow(1, 40, 10)?.sum_all()?.to_scalar::<f32>()?, 0.0);
        Ok(())
    }

    #[test]
    fn test_pad_batch_empty() -> anyhow::Result<()> {
        assert!(matches!(pad_batch(&[]), Err(Error::ListEmpty)));
        Ok(())
    }

    #[test]
    fn test_feather_weights() -> anyhow::Result<()> {
        assert!(feather_weights(8, 6, 0.0).iter().all(|w| *w == 1.0));

        // border = round(0.5 * 8 / 2) = 2
        let weights = feather_weights(8, 1, 0.5);
        let row: Vec<f32> = weights.iter().map(|w| (w * 3.0).round()).collect();
        assert_eq!(row, vec![1., 2., 3., 3., 3., 3., 2., 1.]);
        Ok(())
    }

    #[test]
    fn test_uncrop_hard_paste() -> anyhow::Result<()> {
        let base = Tensor::zeros((1, 10, 10, 3), DType::F32, &Device::Cpu)?;
        let crop = Tensor::ones((1, 4, 3, 3), DType::F32, &Device::Cpu)?;
        let bbox = BoundingBox::new(2, 5, 3, 4);

        let out = uncrop(&base, &crop, &bbox, 0.0, &BlendShape::Square)?;
        assert_eq!(out.sum_all()?.to_scalar::<f32>()?, 4.0 * 3.0 * 3.0);
        assert_eq!(bbox.crop(&out)?.min_all()?.to_scalar::<f32>()?, 1.0);
        Ok(())
    }

    #[test]
    fn test_uncrop_clips_to_image() -> anyhow::Result<()> {
        let base = Tensor::zeros((2, 10, 10, 1), DType::F32, &Device::Cpu)?;
        let crop = Tensor::ones((1, 4, 4, 1), DType::F32, &Device::Cpu)?;
        let out = uncrop(&base, &crop, &BoundingBox::new(8, 8, 4, 4), 0.0, &BlendShape::Square)?;
        assert_eq!(out.dims(), &[2, 10, 10, 1]);
        assert_eq!(out.sum_all()?.to_scalar::<f32>()?, 2.0 * 4.0);
        Ok(())
    }

    #[test]
    fn test_uncrop_mask_shape() -> anyhow::Result<()> {
        let base = Tensor::zeros((1, 4, 4, 1), DType::F32, &Device::Cpu)?;
        let crop = Tensor::ones((1, 2, 2, 1), DType::F32, &Device::Cpu)?;
        let mask = Tensor::new(&[[1f32, 0.], [0., 1.]], &Device::Cpu)?;
        let out = uncrop(
            &base,
            &crop,
            &BoundingBox::new(1, 1, 2, 2),
            0.0,
            &BlendShape::Mask(mask),
        )?;
        assert_eq!(out.sum_all()?.to_scalar::<f32>()?, 2.0);
        Ok(())
    }

    #[test]
    fn test_composite_later_wins() -> anyhow::Result<()> {
        let base = Tensor::zeros((1, 6, 6, 1), DType::F32, &Device::Cpu)?;
        let first = ProcessedCrop {
            image: Tensor::ones((1, 4, 4, 1), DType::F32, &Device::Cpu)?,
            eroded: Tensor::ones((1, 4, 4, 1), DType::F32, &Device::Cpu)?,
            bbox: BoundingBox::new(0, 0, 4, 4),
        };
        let second = ProcessedCrop {
            image: Tensor::full(3f32, (1, 4, 4, 1), &Device::Cpu)?,
            eroded: Tensor::full(3f32, (1, 4, 4, 1), &Device::Cpu)?,
            bbox: BoundingBox::new(2, 2, 4, 4),
        };

        let out = composite(&base, &[first, second], 0.0)?;
        let rows = out.squeeze(3)?.squeeze(0)?.to_vec2::<f32>()?;
        assert_eq!(rows[0][0], 1.0);
        assert_eq!(rows[3][3], 3.0);
        assert_eq!(rows[5][5], 3.0);
        assert_eq!(rows[0][5], 0.0);
        Ok(())
    }
}

//! 边界框几何
//!
//! 坐标单位为源图像素, 图片布局为 [B, H, W, C]

use candle_core::{DType, Tensor};

use crate::error::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BoundingBox {
    pub x: usize,
    pub y: usize,
    pub width: usize,
    pub height: usize,
}

impl BoundingBox {
    pub fn new(x: usize, y: usize, width: usize, height: usize) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// 四边各收缩 inset 像素
    ///
    /// 每个轴的收缩量不超过该轴尺寸的一半, 宽高至少为 1
    pub fn inset(&self, inset: usize) -> Self {
        self.inset_xy(inset, inset)
    }

    pub fn inset_xy(&self, inset_x: usize, inset_y: usize) -> Self {
        let dx = inset_x.min(self.width / 2);
        let dy = inset_y.min(self.height / 2);
        Self {
            x: self.x + dx,
            y: self.y + dy,
            width: self.width.saturating_sub(2 * dx).max(1),
            height: self.height.saturating_sub(2 * dy).max(1),
        }
    }

    /// 与 [0, width) x [0, height) 求交, 无交集时返回 None
    pub fn clamp_to(&self, width: usize, height: usize) -> Option<Self> {
        if self.x >= width || self.y >= height || self.width == 0 || self.height == 0 {
            return None;
        }
        Some(Self {
            x: self.x,
            y: self.y,
            width: self.width.min(width - self.x),
            height: self.height.min(height - self.y),
        })
    }

    /// 裁剪图片 [B, H, W, C]
    pub fn crop(&self, image: &Tensor) -> Result<Tensor, Error> {
        let (_, h, w, _) = image.dims4()?;
        if self.width == 0
            || self.height == 0
            || self.x + self.width > w
            || self.y + self.height > h
        {
            return Err(Error::InvalidParameter(format!(
                "bbox {self:?} is outside of the {w}x{h} image"
            )));
        }

        let crop = image
            .narrow(1, self.y, self.height)?
            .narrow(2, self.x, self.width)?;
        Ok(crop)
    }

    /// 收缩边界框, 并以相同偏移裁剪该边界框对应的图片
    ///
    /// image 为以本边界框左上角为原点的裁剪图, 返回裁剪结果与源图坐标下的新边界框
    pub fn inset_and_crop(&self, image: &Tensor, inset: usize) -> Result<(Tensor, Self), Error> {
        let inner = self.inset(inset);
        if inset == 0 {
            return Ok((image.clone(), inner));
        }

        let (_, h, w, _) = image.dims4()?;
        let local = BoundingBox::new(
            inner.x - self.x,
            inner.y - self.y,
            inner.width,
            inner.height,
        )
        .clamp_to(w, h)
        .ok_or_else(|| {
            Error::InvalidParameter(format!(
                "inset region {inner:?} is outside of the {w}x{h} crop"
            ))
        })?;

        Ok((local.crop(image)?, inner))
    }

    /// 遮罩中大于 0 的像素的最小外接框
    ///
    /// 支持 [H, W], [B, H, W] (按批次取最大值); 空遮罩返回 None
    pub fn from_mask(mask: &Tensor) -> Result<Option<Self>, Error> {
        let mask = match mask.rank() {
            2 => mask.clone(),
            3 => mask.max(0)?,
            _ => {
                return Err(Error::InvalidTensorShape(format!(
                    "expected mask of rank 2 or 3, got {:?}",
                    mask.dims()
                )))
            }
        };

        let rows = mask.to_dtype(DType::F32)?.to_vec2::<f32>()?;
        let mut bounds: Option<(usize, usize, usize, usize)> = None;
        for (y, row) in rows.iter().enumerate() {
            for (x, value) in row.iter().enumerate() {
                if *value <= 0.0 {
                    continue;
                }
                bounds = Some(match bounds {
                    None => (x, y, x, y),
                    Some((x0, y0, x1, y1)) => (x0.min(x), y0.min(y), x1.max(x), y1.max(y)),
                });
            }
        }

        Ok(bounds.map(|(x0, y0, x1, y1)| BoundingBox::new(x0, y0, x1 - x0 + 1, y1 - y0 + 1)))
    }
}

#[cfg(test)]
mod tests {
    use candle_core::Device;

    use super::*;

    #[test]
    fn test_inset_never_collapses() -> anyhow::Result<()> {
        for (w, h) in [(1, 1), (2, 3), (5, 9), (64, 40), (513, 2)] {
            let bbox = BoundingBox::new(10, 20, w, h);
            for inset in [0, 1, 2, 7, 100, 1000] {
                let inner = bbox.inset(inset);
                assert!(inner.width >= 1 && inner.height >= 1, "{bbox:?} {inset}");
            }
        }
        Ok(())
    }

    #[test]
    fn test_inset_zero_is_identity() -> anyhow::Result<()> {
        let bbox = BoundingBox::new(3, 4, 50, 60);
        assert_eq!(bbox.inset(0), bbox);

        let image = Tensor::arange(0f32, 3000f32, &Device::Cpu)?.reshape((1, 60, 50, 1))?;
        let (crop, inner) = bbox.inset_and_crop(&image, 0)?;
        assert_eq!(inner, bbox);
        assert_eq!(
            crop.flatten_all()?.to_vec1::<f32>()?,
            image.flatten_all()?.to_vec1::<f32>()?
        );
        Ok(())
    }

    #[test]
    fn test_inset_edges_move_toward_center() -> anyhow::Result<()> {
        let bbox = BoundingBox::new(100, 50, 80, 30);
        let (cx2, cy2) = (2 * bbox.x + bbox.width, 2 * bbox.y + bbox.height);
        for inset in 0..=15 {
            let inner = bbox.inset(inset);
            assert!(inner.x >= bbox.x && 2 * inner.x <= cx2);
            assert!(inner.y >= bbox.y && 2 * inner.y <= cy2);
            assert!(inner.x + inner.width <= bbox.x + bbox.width);
            assert!(2 * (inner.x + inner.width) >= cx2);
            assert!(inner.y + inner.height <= bbox.y + bbox.height);
            assert!(2 * (inner.y + inner.height) >= cy2);
        }
        Ok(())
    }

    #[test]
    fn test_inset_and_crop() -> anyhow::Result<()> {
        let bbox = BoundingBox::new(10, 10, 6, 4);
        let image = Tensor::arange(0f32, 24f32, &Device::Cpu)?.reshape((1, 4, 6, 1))?;

        let (crop, inner) = bbox.inset_and_crop(&image, 1)?;
        assert_eq!(inner, BoundingBox::new(11, 11, 4, 2));
        assert_eq!(crop.dims(), &[1, 2, 4, 1]);
        assert_eq!(
            crop.flatten_all()?.to_vec1::<f32>()?,
            vec![7., 8., 9., 10., 13., 14., 15., 16.]
        );

        // 收缩量超过一半时按一半处理
        let (crop, inner) = bbox.inset_and_crop(&image, 10)?;
        assert_eq!(inner, BoundingBox::new(13, 12, 1, 1));
        assert_eq!(crop.flatten_all()?.to_vec1::<f32>()?, vec![15.]);
        Ok(())
    }

    #[test]
    fn test_from_mask() -> anyhow::Result<()> {
        let mut data = vec![0f32; 8 * 10];
        data[2 * 10 + 3] = 1.0;
        data[5 * 10 + 7] = 0.5;
        let mask = Tensor::from_vec(data, (1, 8, 10), &Device::Cpu)?;
        assert_eq!(
            BoundingBox::from_mask(&mask)?,
            Some(BoundingBox::new(3, 2, 5, 4))
        );

        let empty = Tensor::zeros((8, 10), DType::F32, &Device::Cpu)?;
        assert_eq!(BoundingBox::from_mask(&empty)?, None);
        Ok(())
    }

    #[test]
    fn test_crop_out_of_bounds() -> anyhow::Result<()> {
        let image = Tensor::zeros((1, 10, 10, 3), DType::F32, &Device::Cpu)?;
        assert!(BoundingBox::new(8, 0, 5, 5).crop(&image).is_err());
        assert_eq!(
            BoundingBox::new(8, 0, 5, 5).clamp_to(10, 10),
            Some(BoundingBox::new(8, 0, 2, 5))
        );
        assert_eq!(BoundingBox::new(10, 0, 5, 5).clamp_to(10, 10), None);
        Ok(())
    }
}

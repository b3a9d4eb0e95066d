//! 检测编排
//!
//! 主检测器 -> (主检测为空且配置了后备时) 后备检测器 -> 逐个区域处理 | 透传

use candle_core::{DType, Device, Tensor};
use log::{info, warn};

use crate::{
    detailer::{
        backend::{RegionRefiner, SegmentDetector},
        compositor::{composite, pad_batch},
        segment::process_segment,
        DetailerOptions,
    },
    error::Error,
};

/// 细化结果
#[derive(Debug)]
pub enum DetailerOutcome {
    /// 未检测到区域, 原图不变
    Passthrough,
    Refined {
        image: Tensor,
        /// 补零拼接的预览批次
        crops: Tensor,
    },
}

/// 透传时的占位预览 (1, 1, 1, 3)
pub fn placeholder(device: &Device) -> Result<Tensor, Error> {
    Ok(Tensor::zeros((1, 1, 1, 3), DType::F32, device)?)
}

pub struct Detailer<'a, D, R> {
    primary: &'a D,
    fallback: Option<&'a D>,
    refiner: &'a R,
    options: DetailerOptions,
}

impl<'a, D, R> Detailer<'a, D, R>
where
    D: SegmentDetector,
    R: RegionRefiner<Segment = D::Segment>,
{
    pub fn new(
        primary: &'a D,
        fallback: Option<&'a D>,
        refiner: &'a R,
        options: DetailerOptions,
    ) -> Self {
        Self {
            primary,
            fallback,
            refiner,
            options,
        }
    }

    /// 检测区域, 后备检测器至多尝试一次
    pub fn detect(&self, image: &Tensor) -> Result<Vec<D::Segment>, Error> {
        let segments = self.primary.detect(image, self.options.threshold)?;
        if !segments.is_empty() {
            return Ok(segments);
        }

        match self.fallback {
            Some(fallback) => {
                info!("primary detector found nothing, trying fallback");
                fallback.detect(image, self.options.threshold)
            }
            None => Ok(segments),
        }
    }

    pub fn run(&self, image: &Tensor) -> Result<DetailerOutcome, Error> {
        let segments = self.detect(image)?;
        if segments.is_empty() {
            info!("no segments detected, passing image through");
            return Ok(DetailerOutcome::Passthrough);
        }
        info!("processing {} segment(s)", segments.len());

        let mut processed = Vec::with_capacity(segments.len());
        for segment in &segments {
            if let Some(crop) = process_segment(self.refiner, image, segment, &self.options)? {
                processed.push(crop);
            }
        }

        if processed.is_empty() {
            warn!("all segments were skipped, passing image through");
            return Ok(DetailerOutcome::Passthrough);
        }

        let previews = processed.iter().map(|c| c.image.clone()).collect::<Vec<_>>();
        let crops = pad_batch(&previews)?;
        let image = composite(image, &processed, self.options.feather)?;

        Ok(DetailerOutcome::Refined { image, crops })
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use super::*;

    /// 以 (x, y, w, h) 作为区域
    type MockSegment = (usize, usize, usize, usize);

    struct MockDetector {
        segments: Vec<MockSegment>,
        calls: RefCell<usize>,
    }

    impl MockDetector {
        fn new(segments: Vec<MockSegment>) -> Self {
            Self {
                segments,
                calls: RefCell::new(0),
            }
        }
    }

    impl SegmentDetector for MockDetector {
        type Segment = MockSegment;

        fn detect(&self, _image: &Tensor, _threshold: f32) -> Result<Vec<MockSegment>, Error> {
            *self.calls.borrow_mut() += 1;
            Ok(self.segments.clone())
        }
    }

    /// 采样结果为区域均值加 0.5, 缩放为均值填充
    #[derive(Default)]
    struct MockRefiner {
        processed: RefCell<Vec<MockSegment>>,
        noise_masks: RefCell<usize>,
    }

    impl RegionRefiner for MockRefiner {
        type Segment = MockSegment;
        type Latent = Tensor;

        fn segment_mask(&self, image: &Tensor, segment: &MockSegment) -> Result<Tensor, Error> {
            self.processed.borrow_mut().push(*segment);
            let (_, h, w, _) = image.dims4()?;
            let (x, y, sw, sh) = *segment;
            let mut data = vec![0f32; h * w];
            for row in y..(y + sh).min(h) {
                for col in x..(x + sw).min(w) {
                    data[row * w + col] = 1.0;
                }
            }
            Ok(Tensor::from_vec(data, (1, h, w), image.device())?)
        }

        fn upscale_with_model(&self, _crop: &Tensor) -> Result<Option<Tensor>, Error> {
            Ok(None)
        }

        fn resize(&self, image: &Tensor, width: usize, height: usize) -> Result<Tensor, Error> {
            let (b, _, _, c) = image.dims4()?;
            let mean = image.mean_all()?.to_scalar::<f32>()?;
            Ok(Tensor::full(mean, (b, height, width, c), image.device())?)
        }

        fn encode(&self, image: &Tensor) -> Result<Tensor, Error> {
            Ok(image.clone())
        }

        fn set_noise_mask(&self, latent: Tensor, _mask: &Tensor) -> Result<Tensor, Error> {
            *self.noise_masks.borrow_mut() += 1;
            Ok(latent)
        }

        fn sample(&self, latent: &Tensor) -> Result<Tensor, Error> {
            Ok((latent + 0.5)?)
        }

        fn decode(&self, latent: &Tensor) -> Result<Tensor, Error> {
            Ok(latent.clone())
        }
    }

    fn options() -> DetailerOptions {
        DetailerOptions {
            threshold: 0.5,
            megapixels: 0.001,
            feather: 0.0,
            edge_erosion: 0,
            context_padding: 0,
        }
    }

    fn image() -> anyhow::Result<Tensor> {
        Ok(Tensor::zeros((1, 32, 32, 3), DType::F32, &Device::Cpu)?)
    }

    #[test]
    fn test_passthrough_without_detections() -> anyhow::Result<()> {
        let primary = MockDetector::new(vec![]);
        let fallback = MockDetector::new(vec![]);
        let refiner = MockRefiner::default();

        let detailer = Detailer::new(&primary, Some(&fallback), &refiner, options());
        let outcome = detailer.run(&image()?)?;

        assert!(matches!(outcome, DetailerOutcome::Passthrough));
        assert!(refiner.processed.borrow().is_empty());
        assert_eq!(*fallback.calls.borrow(), 1);
        assert_eq!(placeholder(&Device::Cpu)?.dims(), &[1, 1, 1, 3]);
        Ok(())
    }

    #[test]
    fn test_fallback_used_once() -> anyhow::Result<()> {
        let primary = MockDetector::new(vec![]);
        let fallback = MockDetector::new(vec![(4, 4, 8, 8)]);
        let refiner = MockRefiner::default();

        let detailer = Detailer::new(&primary, Some(&fallback), &refiner, options());
        let outcome = detailer.run(&image()?)?;

        assert_eq!(*primary.calls.borrow(), 1);
        assert_eq!(*fallback.calls.borrow(), 1);
        assert_eq!(*refiner.processed.borrow(), vec![(4, 4, 8, 8)]);
        assert!(matches!(outcome, DetailerOutcome::Refined { .. }));
        Ok(())
    }

    #[test]
    fn test_fallback_skipped_when_primary_finds() -> anyhow::Result<()> {
        let primary = MockDetector::new(vec![(0, 0, 4, 4)]);
        let fallback = MockDetector::new(vec![(8, 8, 4, 4)]);
        let refiner = MockRefiner::default();

        Detailer::new(&primary, Some(&fallback), &refiner, options()).run(&image()?)?;
        assert_eq!(*fallback.calls.borrow(), 0);
        assert_eq!(*refiner.processed.borrow(), vec![(0, 0, 4, 4)]);
        Ok(())
    }

    #[test]
    fn test_refined_composite() -> anyhow::Result<()> {
        let primary = MockDetector::new(vec![(2, 2, 10, 6), (20, 16, 8, 12)]);
        let refiner = MockRefiner::default();
        let mut options = options();
        options.edge_erosion = 1;
        options.context_padding = 2;

        let outcome = Detailer::new(&primary, None, &refiner, options).run(&image()?)?;
        let DetailerOutcome::Refined { image, crops } = outcome else {
            anyhow::bail!("expected refined outcome");
        };

        assert_eq!(*refiner.noise_masks.borrow(), 2);
        assert_eq!(crops.dims(), &[2, 12, 10, 3]);
        assert_eq!(image.dims(), &[1, 32, 32, 3]);

        let pixels = image.squeeze(0)?.narrow(2, 0, 1)?.squeeze(2)?.to_vec2::<f32>()?;
        // 腐蚀后的区域被替换, 腐蚀掉的边缘保持原值
        assert_eq!(pixels[3][3], 0.5);
        assert_eq!(pixels[2][2], 0.0);
        assert_eq!(pixels[20][24], 0.5);
        assert_eq!(pixels[0][0], 0.0);
        assert_eq!(pixels[31][31], 0.0);
        Ok(())
    }

    #[test]
    fn test_empty_masks_pass_through() -> anyhow::Result<()> {
        let primary = MockDetector::new(vec![(40, 40, 4, 4)]);
        let refiner = MockRefiner::default();

        let outcome = Detailer::new(&primary, None, &refiner, options()).run(&image()?)?;
        assert!(matches!(outcome, DetailerOutcome::Passthrough));
        assert_eq!(refiner.processed.borrow().len(), 1);
        Ok(())
    }
}

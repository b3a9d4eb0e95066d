//! 基于宿主节点的检测与重绘
//!
//! 依赖 ComfyUI-Impact-Pack: UltralyticsDetectorProvider, BboxDetectorSEGS,
//! MaskToSEGS, SegsToCombinedMask

use candle_core::{Device, Tensor};
use log::info;
use pyo3::{
    types::{PyAnyMethods, PyList},
    Bound, IntoPyObject, PyAny, Python,
};

use crate::{
    detailer::{
        backend::{RegionRefiner, SegmentDetector},
        orchestrator::{placeholder, Detailer, DetailerOutcome},
        DetailerOptions,
    },
    error::Error,
    image::upscale::{resize, ModelUpscaler, UpscaleMethod},
    pipe::{Pipe, PyHandle},
    sampling::{ComfySampler, SamplingParams, SchedulerChoice},
    wrapper::{
        comfy::{folder_paths::NONE_OPTION, node_class::NodeClass},
        torch::tensor::TensorWrapper,
    },
};

/// SEGS 中的单个区域, 附带其所属 SEGS 的头部 (图片尺寸)
pub struct ImpactSegment<'py> {
    header: Bound<'py, PyAny>,
    segment: Bound<'py, PyAny>,
}

/// SEGS = (shape, [SEG, ...])
fn split_segs<'py>(segs: &Bound<'py, PyAny>) -> Result<Vec<ImpactSegment<'py>>, Error> {
    let header = segs.get_item(0)?;
    let mut segments = Vec::new();
    for segment in segs.get_item(1)?.try_iter()? {
        segments.push(ImpactSegment {
            header: header.clone(),
            segment: segment?,
        });
    }
    Ok(segments)
}

fn to_py_image<'py>(py: Python<'py>, image: &Tensor) -> Result<Bound<'py, PyAny>, Error> {
    Ok(TensorWrapper::<f32>::from_tensor(image.clone()).to_py_tensor(py)?)
}

/// Ultralytics bbox 检测器
pub struct BboxDetector<'py> {
    py: Python<'py>,
    detector: Bound<'py, PyAny>,
    detect: NodeClass<'py>,
}

impl<'py> BboxDetector<'py> {
    pub fn load(py: Python<'py>, model_name: &str) -> Result<Self, Error> {
        let provider = NodeClass::resolve(py, "UltralyticsDetectorProvider")?;
        let detect = NodeClass::resolve(py, "BboxDetectorSEGS")?;

        info!("loading bbox detector: {model_name}");
        let detector = provider.call_first((model_name,).into_pyobject(py)?)?;

        Ok(Self {
            py,
            detector,
            detect,
        })
    }

    /// "none" 表示未配置
    pub fn load_optional(py: Python<'py>, model_name: &str) -> Result<Option<Self>, Error> {
        if model_name.is_empty() || model_name == NONE_OPTION {
            return Ok(None);
        }
        Self::load(py, model_name).map(Some)
    }
}

impl<'py> SegmentDetector for BboxDetector<'py> {
    type Segment = ImpactSegment<'py>;

    fn detect(&self, image: &Tensor, threshold: f32) -> Result<Vec<Self::Segment>, Error> {
        let image = to_py_image(self.py, image)?;
        // dilation 10, crop_factor 3.0, drop_size 10
        let args = (&self.detector, image, threshold, 10, 3.0, 10, "all").into_pyobject(self.py)?;
        let segs = self.detect.call_first(args)?;
        split_segs(&segs)
    }
}

/// 由遮罩生成区域, 忽略阈值
pub struct MaskSegments<'py> {
    py: Python<'py>,
    mask: Bound<'py, PyAny>,
    mask_to_segs: NodeClass<'py>,
}

impl<'py> MaskSegments<'py> {
    pub fn new(py: Python<'py>, mask: Bound<'py, PyAny>) -> Result<Self, Error> {
        Ok(Self {
            py,
            mask,
            mask_to_segs: NodeClass::resolve(py, "MaskToSEGS")?,
        })
    }
}

impl<'py> SegmentDetector for MaskSegments<'py> {
    type Segment = ImpactSegment<'py>;

    fn detect(&self, _image: &Tensor, _threshold: f32) -> Result<Vec<Self::Segment>, Error> {
        // combined false, crop_factor 3.0, bbox_fill false, drop_size 10, contour_fill false
        let args = (&self.mask, false, 3.0, false, 10, false).into_pyobject(self.py)?;
        let segs = self.mask_to_segs.call_first(args)?;
        if segs.is_none() {
            return Ok(Vec::new());
        }
        split_segs(&segs)
    }
}

/// 宿主采样重绘
pub struct ComfyRefiner<'py> {
    sampler: ComfySampler<'py>,
    params: SamplingParams,
    method: UpscaleMethod,
    segs_to_mask: NodeClass<'py>,
    upscale: Option<(ModelUpscaler<'py>, Bound<'py, PyAny>)>,
    device: Device,
}

impl<'py> ComfyRefiner<'py> {
    pub fn new(
        sampler: ComfySampler<'py>,
        params: SamplingParams,
        method: UpscaleMethod,
        upscale_model: &str,
    ) -> Result<Self, Error> {
        let py = sampler.py();
        let segs_to_mask = NodeClass::resolve(py, "SegsToCombinedMask")?;

        let upscale = if upscale_model.is_empty() || upscale_model == NONE_OPTION {
            None
        } else {
            let upscaler = ModelUpscaler::new(py)?;
            let model = upscaler.load(upscale_model)?;
            Some((upscaler, model))
        };

        Ok(Self {
            sampler,
            params,
            method,
            segs_to_mask,
            upscale,
            device: Device::Cpu,
        })
    }
}

impl<'py> RegionRefiner for ComfyRefiner<'py> {
    type Segment = ImpactSegment<'py>;
    type Latent = Bound<'py, PyAny>;

    fn segment_mask(&self, _image: &Tensor, segment: &Self::Segment) -> Result<Tensor, Error> {
        let py = self.sampler.py();
        let segs = (
            &segment.header,
            PyList::new(py, [&segment.segment])?,
        );
        let mask = self.segs_to_mask.call_first((segs,).into_pyobject(py)?)?;
        Ok(TensorWrapper::<f32>::new(&mask, &self.device)?.into_tensor())
    }

    fn upscale_with_model(&self, crop: &Tensor) -> Result<Option<Tensor>, Error> {
        match &self.upscale {
            Some((upscaler, model)) => Ok(Some(upscaler.upscale(model, crop)?)),
            None => Ok(None),
        }
    }

    fn resize(&self, image: &Tensor, width: usize, height: usize) -> Result<Tensor, Error> {
        resize(self.sampler.py(), image, width, height, self.method)
    }

    fn encode(&self, image: &Tensor) -> Result<Self::Latent, Error> {
        self.sampler.encode(image)
    }

    fn set_noise_mask(&self, latent: Self::Latent, mask: &Tensor) -> Result<Self::Latent, Error> {
        self.sampler.set_noise_mask(&latent, mask)
    }

    fn sample(&self, latent: &Self::Latent) -> Result<Self::Latent, Error> {
        self.sampler.sample(latent, &self.params)
    }

    fn decode(&self, latent: &Self::Latent) -> Result<Tensor, Error> {
        self.sampler.decode(latent)
    }
}

/// 细化请求中与检测方式无关的部分
pub struct DetailerSettings {
    pub sampling: SamplingParams,
    pub upscale_method: UpscaleMethod,
    pub upscale_model: String,
    pub options: DetailerOptions,
}

impl DetailerSettings {
    /// 由节点输入构建, 裁剪图按 1MP 重绘
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        seed: u64,
        steps: u32,
        cfg: f64,
        sampler: &str,
        scheduler: &str,
        denoise: f64,
        upscale_method: &str,
        upscale_model: &str,
        threshold: f32,
        feather: f32,
        edge_erosion: usize,
        context_padding: usize,
    ) -> Result<Self, Error> {
        Ok(Self {
            sampling: SamplingParams {
                seed,
                steps,
                cfg,
                sampler_name: sampler.to_string(),
                scheduler: SchedulerChoice::from(scheduler),
                denoise,
            },
            upscale_method: UpscaleMethod::parse(upscale_method)?,
            upscale_model: upscale_model.to_string(),
            options: DetailerOptions {
                threshold,
                feather,
                edge_erosion,
                context_padding,
                ..Default::default()
            },
        })
    }
}

/// 宿主对象形式的细化输入
pub struct DetailerInputs<'py> {
    pub image: Bound<'py, PyAny>,
    pub model: Bound<'py, PyAny>,
    pub vae: Bound<'py, PyAny>,
    pub positive: Bound<'py, PyAny>,
    pub negative: Bound<'py, PyAny>,
}

impl<'py> DetailerInputs<'py> {
    /// 校验并读取管道中的字段, image 覆盖管道中的图片
    pub fn from_pipe(
        py: Python<'py>,
        pipe: &Pipe<PyHandle>,
        image: Option<Bound<'py, PyAny>>,
    ) -> Result<Self, Error> {
        let image = match image {
            Some(image) => image,
            None => pipe.require_image()?.bind(py).clone(),
        };
        Ok(Self {
            image,
            model: pipe.require_model()?.bind(py).clone(),
            vae: pipe.require_vae()?.bind(py).clone(),
            positive: pipe.require_positive()?.bind(py).clone(),
            negative: pipe.require_negative()?.bind(py).clone(),
        })
    }
}

/// 检测来源
pub enum DetectionSource<'a, 'py> {
    Bbox { model: &'a str, fallback: &'a str },
    Mask(Bound<'py, PyAny>),
}

/// 执行细化, 返回 (图片, 裁剪预览)
///
/// 透传时返回原始图片对象与占位预览
pub fn run_detailer<'py>(
    py: Python<'py>,
    inputs: DetailerInputs<'py>,
    source: DetectionSource<'_, 'py>,
    settings: DetailerSettings,
) -> Result<(Bound<'py, PyAny>, Bound<'py, PyAny>), Error> {
    let device = Device::Cpu;
    let image = TensorWrapper::<f32>::new(&inputs.image, &device)?.into_tensor();

    // 先解析重绘依赖的全部节点, 再加载检测模型
    let sampler = ComfySampler::new(
        py,
        inputs.model,
        inputs.vae,
        inputs.positive,
        inputs.negative,
    )?;
    let refiner = ComfyRefiner::new(
        sampler,
        settings.sampling,
        settings.upscale_method,
        &settings.upscale_model,
    )?;

    let outcome = match source {
        DetectionSource::Bbox { model, fallback } => {
            let primary = BboxDetector::load(py, model)?;
            let fallback = BboxDetector::load_optional(py, fallback)?;
            Detailer::new(&primary, fallback.as_ref(), &refiner, settings.options).run(&image)?
        }
        DetectionSource::Mask(mask) => {
            let segments = MaskSegments::new(py, mask)?;
            Detailer::new(&segments, None, &refiner, settings.options).run(&image)?
        }
    };

    match outcome {
        DetailerOutcome::Passthrough => Ok((inputs.image, to_py_image(py, &placeholder(&device)?)?)),
        DetailerOutcome::Refined { image, crops } => {
            Ok((to_py_image(py, &image)?, to_py_image(py, &crops)?))
        }
    }
}

//! 宿主采样能力
//!
//! 依赖的宿主节点在构建时解析:
//! KSamplerSelect, BasicScheduler, AlignYourStepsScheduler, SamplerCustom,
//! VAEEncode, VAEDecode, SetLatentNoiseMask, EmptyLatentImage

use candle_core::{Device, Tensor};
use log::debug;
use pyo3::{Bound, IntoPyObject, PyAny, Python};

use crate::{
    error::Error,
    sampling::{ModelFamily, SamplingParams, SigmaSchedule},
    wrapper::{comfy::node_class::NodeClass, torch::tensor::TensorWrapper},
};

pub struct ComfySampler<'py> {
    py: Python<'py>,
    model: Bound<'py, PyAny>,
    vae: Bound<'py, PyAny>,
    positive: Bound<'py, PyAny>,
    negative: Bound<'py, PyAny>,
    sampler_select: NodeClass<'py>,
    basic_scheduler: NodeClass<'py>,
    ays_scheduler: NodeClass<'py>,
    sampler_custom: NodeClass<'py>,
    vae_encode: NodeClass<'py>,
    vae_decode: NodeClass<'py>,
    noise_mask: NodeClass<'py>,
    empty_latent: NodeClass<'py>,
    device: Device,
}

impl<'py> ComfySampler<'py> {
    pub fn new(
        py: Python<'py>,
        model: Bound<'py, PyAny>,
        vae: Bound<'py, PyAny>,
        positive: Bound<'py, PyAny>,
        negative: Bound<'py, PyAny>,
    ) -> Result<Self, Error> {
        Ok(Self {
            py,
            model,
            vae,
            positive,
            negative,
            sampler_select: NodeClass::resolve(py, "KSamplerSelect")?,
            basic_scheduler: NodeClass::resolve(py, "BasicScheduler")?,
            ays_scheduler: NodeClass::resolve(py, "AlignYourStepsScheduler")?,
            sampler_custom: NodeClass::resolve(py, "SamplerCustom")?,
            vae_encode: NodeClass::resolve(py, "VAEEncode")?,
            vae_decode: NodeClass::resolve(py, "VAEDecode")?,
            noise_mask: NodeClass::resolve(py, "SetLatentNoiseMask")?,
            empty_latent: NodeClass::resolve(py, "EmptyLatentImage")?,
            device: Device::Cpu,
        })
    }

    pub fn py(&self) -> Python<'py> {
        self.py
    }

    pub fn model_family(&self) -> ModelFamily {
        ModelFamily::probe(&self.model)
    }

    /// 图片 [B, H, W, C] 编码为 LATENT
    pub fn encode(&self, image: &Tensor) -> Result<Bound<'py, PyAny>, Error> {
        let pixels = TensorWrapper::<f32>::from_tensor(image.clone()).to_py_tensor(self.py)?;
        self.vae_encode
            .call_first((&self.vae, pixels).into_pyobject(self.py)?)
    }

    /// LATENT 解码为图片 [B, H, W, C]
    pub fn decode(&self, latent: &Bound<'py, PyAny>) -> Result<Tensor, Error> {
        let image = self
            .vae_decode
            .call_first((&self.vae, latent).into_pyobject(self.py)?)?;
        Ok(TensorWrapper::<f32>::new(&image, &self.device)?.into_tensor())
    }

    /// 像素空间遮罩 [1, H, W], 宿主内部缩放到潜空间
    pub fn set_noise_mask(
        &self,
        latent: &Bound<'py, PyAny>,
        mask: &Tensor,
    ) -> Result<Bound<'py, PyAny>, Error> {
        let mask = TensorWrapper::<f32>::from_tensor(mask.clone()).to_py_tensor(self.py)?;
        self.noise_mask
            .call_first((latent, mask).into_pyobject(self.py)?)
    }

    pub fn empty_latent(
        &self,
        width: usize,
        height: usize,
        batch_size: usize,
    ) -> Result<Bound<'py, PyAny>, Error> {
        self.empty_latent
            .call_first((width, height, batch_size).into_pyobject(self.py)?)
    }

    fn sigmas(&self, params: &SamplingParams) -> Result<Bound<'py, PyAny>, Error> {
        let schedule = params.scheduler.resolve(|| self.model_family());
        debug!("sigma schedule: {schedule:?}");

        match schedule {
            SigmaSchedule::AlignYourSteps(family) => self.ays_scheduler.call_first(
                (family.to_string(), params.steps, params.denoise).into_pyobject(self.py)?,
            ),
            SigmaSchedule::Basic(name) => self.basic_scheduler.call_first(
                (&self.model, name, params.steps, params.denoise).into_pyobject(self.py)?,
            ),
        }
    }

    /// SamplerCustom 单次采样
    pub fn sample(
        &self,
        latent: &Bound<'py, PyAny>,
        params: &SamplingParams,
    ) -> Result<Bound<'py, PyAny>, Error> {
        let sampler = self
            .sampler_select
            .call_first((params.sampler_name.as_str(),).into_pyobject(self.py)?)?;
        let sigmas = self.sigmas(params)?;

        let args = (
            &self.model,
            true,
            params.seed,
            params.cfg,
            &self.positive,
            &self.negative,
            sampler,
            sigmas,
            latent,
        )
            .into_pyobject(self.py)?;
        self.sampler_custom.call_first(args)
    }
}

//! 缩放与模型放大

use candle_core::{Device, Tensor};
use pyo3::{Bound, IntoPyObject, PyAny, Python};
use strum_macros::{Display, EnumIter, EnumString};

use crate::{
    error::Error,
    wrapper::{
        comfy::{node_class::NodeClass, utils::common_upscale},
        torch::tensor::TensorWrapper,
    },
};

/// 缩放插值方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, EnumIter)]
pub enum UpscaleMethod {
    #[strum(to_string = "lanczos")]
    Lanczos,
    #[strum(to_string = "bilinear")]
    Bilinear,
    #[strum(to_string = "bicubic")]
    Bicubic,
    #[strum(to_string = "area")]
    Area,
    #[strum(to_string = "nearest-exact")]
    NearestExact,
}

impl UpscaleMethod {
    pub fn options() -> Vec<String> {
        use strum::IntoEnumIterator;
        Self::iter().map(|m| m.to_string()).collect()
    }

    pub fn parse(name: &str) -> Result<Self, Error> {
        name.parse::<UpscaleMethod>()
            .map_err(|e| Error::ParseEnumString(format!("{name}, {e}")))
    }
}

/// 缩放图片 [B, H, W, C] 到指定尺寸
pub fn resize(
    py: Python<'_>,
    image: &Tensor,
    width: usize,
    height: usize,
    method: UpscaleMethod,
) -> Result<Tensor, Error> {
    let (_, h, w, _) = image.dims4()?;
    if (w, h) == (width, height) {
        return Ok(image.clone());
    }
    common_upscale(py, image, width, height, &method.to_string(), "disabled")
}

/// 按总像素数缩放后的尺寸
///
/// scale = sqrt(megapixels * 1024² / (w * h)), 四舍六入五成双
pub fn total_pixel_dims(width: usize, height: usize, megapixels: f64) -> (usize, usize) {
    let total = (megapixels * 1024.0 * 1024.0).floor();
    let scale = (total / (width * height).max(1) as f64).sqrt();
    let w = (width as f64 * scale).round_ties_even() as usize;
    let h = (height as f64 * scale).round_ties_even() as usize;
    (w.max(1), h.max(1))
}

/// 按倍数缩放后的尺寸, 向零取整
pub fn scale_dims(width: usize, height: usize, factor: f64) -> (usize, usize) {
    let w = (width as f64 * factor) as usize;
    let h = (height as f64 * factor) as usize;
    (w.max(1), h.max(1))
}

/// 超分模型放大
///
/// 宿主节点: UpscaleModelLoader, ImageUpscaleWithModel
pub struct ModelUpscaler<'py> {
    py: Python<'py>,
    loader: NodeClass<'py>,
    upscaler: NodeClass<'py>,
    device: Device,
}

impl<'py> ModelUpscaler<'py> {
    pub fn new(py: Python<'py>) -> Result<Self, Error> {
        Ok(Self {
            py,
            loader: NodeClass::resolve(py, "UpscaleModelLoader")?,
            upscaler: NodeClass::resolve(py, "ImageUpscaleWithModel")?,
            device: Device::Cpu,
        })
    }

    pub fn load(&self, model_name: &str) -> Result<Bound<'py, PyAny>, Error> {
        self.loader
            .call_first((model_name,).into_pyobject(self.py)?)
    }

    pub fn upscale(&self, model: &Bound<'py, PyAny>, image: &Tensor) -> Result<Tensor, Error> {
        let image = TensorWrapper::<f32>::from_tensor(image.clone()).to_py_tensor(self.py)?;
        let upscaled = self
            .upscaler
            .call_first((model, image).into_pyobject(self.py)?)?;
        Ok(TensorWrapper::<f32>::new(&upscaled, &self.device)?.into_tensor())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_total_pixel_dims() -> anyhow::Result<()> {
        assert_eq!(total_pixel_dims(512, 512, 1.0), (1024, 1024));
        assert_eq!(total_pixel_dims(2048, 1024, 1.0), (1448, 724));
        let (w, h) = total_pixel_dims(100, 300, 1.0);
        assert_eq!((w, h), (591, 1774));
        Ok(())
    }

    #[test]
    fn test_scale_dims() -> anyhow::Result<()> {
        assert_eq!(scale_dims(1000, 750, 1.5), (1500, 1125));
        assert_eq!(scale_dims(333, 333, 0.5), (166, 166));
        assert_eq!(scale_dims(1, 1, 0.1), (1, 1));
        Ok(())
    }

    #[test]
    fn test_upscale_method() -> anyhow::Result<()> {
        assert_eq!(UpscaleMethod::parse("nearest-exact")?, UpscaleMethod::NearestExact);
        assert!(UpscaleMethod::parse("bislerp").is_err());
        assert_eq!(UpscaleMethod::options()[0], "lanczos");
        Ok(())
    }
}

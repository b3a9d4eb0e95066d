//! comfy.utils / comfy.model_management

use candle_core::Tensor;
use pyo3::{types::PyAnyMethods, Python};

use crate::{error::Error, wrapper::torch::tensor::TensorWrapper};

/// comfy.utils.common_upscale
///
/// samples: [B, H, W, C], 内部转换为 [B, C, H, W] 调用后再转回
pub fn common_upscale<'py>(
    py: Python<'py>,
    samples: &Tensor,
    width: usize,
    height: usize,
    upscale_method: &str, // bislerp | lanczos | nearest-exact | bilinear | area | bicubic
    crop: &str,           // disabled | center
) -> Result<Tensor, Error> {
    let device = samples.device();

    let samples = samples.permute((0, 3, 1, 2))?.contiguous()?;
    let samples = TensorWrapper::<f32>::from_tensor(samples).to_py_tensor(py)?;

    let utils = py.import("comfy")?.getattr("utils")?;
    let args = (samples, width, height, upscale_method, crop);
    let py_any = utils.call_method1("common_upscale", args)?;

    let result = TensorWrapper::<f32>::new(&py_any, device)?.into_tensor();
    Ok(result.permute((0, 2, 3, 1))?.contiguous()?)
}

/// 释放显存与 python 对象
pub fn free_memory(py: Python<'_>) -> Result<(), Error> {
    py.import("gc")?.call_method0("collect")?;
    py.import("comfy.model_management")?
        .call_method0("soft_empty_cache")?;
    Ok(())
}

//! 基础生成 (管道)
//!
//! 无输入图片时从空潜空间生成 (denoise 固定为 1),
//! 有输入图片时缩放到约一百万像素后编码再采样

use candle_core::Device;
use log::info;
use pyo3::{
    pyclass, pymethods,
    types::{PyDict, PyDictMethods, PyType},
    Bound, Py, PyAny, PyResult, Python,
};

use crate::{
    core::category::CATEGORY_GENERATION,
    error::Error,
    generation::inputs::{add_sampling_inputs, pipe_sampler, sampling_params, SamplingDefaults},
    image::{
        resolution::{resolution_names, select_resolution},
        upscale::{resize, total_pixel_dims, UpscaleMethod},
    },
    pipe::{FullPipe, PyHandle},
    wrapper::{
        comfyui::{
            types::{NODE_BOOLEAN, NODE_FULL_PIPE, NODE_IMAGE},
            PromptServer,
        },
        torch::tensor::TensorWrapper,
    },
};

/// 默认分辨率
const DEFAULT_RESOLUTION: &str = "832x1216 (2:3)";

/// 潜空间来源
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LatentPlan {
    /// 指定尺寸的空潜空间
    Empty { width: usize, height: usize },
    /// 输入图片缩放到该尺寸后编码
    Image { width: usize, height: usize },
}

/// 根据是否有输入图片决定潜空间来源与实际 denoise
pub fn plan_latent(
    image_size: Option<(usize, usize)>,
    resolution: (usize, usize),
    denoise: f64,
) -> (LatentPlan, f64) {
    match image_size {
        Some((width, height)) => {
            let (width, height) = total_pixel_dims(width, height, 1.0);
            (LatentPlan::Image { width, height }, denoise)
        }
        None => {
            let (width, height) = resolution;
            (LatentPlan::Empty { width, height }, 1.0)
        }
    }
}

#[pyclass(subclass)]
pub struct BaseNode {}

impl PromptServer for BaseNode {}

#[pymethods]
impl BaseNode {
    #[new]
    fn new() -> Self {
        Self {}
    }

    #[classattr]
    #[pyo3(name = "RETURN_TYPES")]
    fn return_types() -> (&'static str, &'static str) {
        (NODE_FULL_PIPE, NODE_IMAGE)
    }

    #[classattr]
    #[pyo3(name = "RETURN_NAMES")]
    fn return_names() -> (&'static str, &'static str) {
        ("full_pipe", "image")
    }

    #[classattr]
    #[pyo3(name = "CATEGORY")]
    const CATEGORY: &'static str = CATEGORY_GENERATION;

    #[classattr]
    #[pyo3(name = "DESCRIPTION")]
    fn description() -> &'static str {
        "Generate an image from an empty latent, or from the optional input image, and store it in the pipe."
    }

    #[classattr]
    #[pyo3(name = "FUNCTION")]
    const FUNCTION: &'static str = "execute";

    #[classmethod]
    #[pyo3(name = "INPUT_TYPES")]
    fn input_types(_cls: &Bound<'_, PyType>) -> PyResult<Py<PyDict>> {
        Python::with_gil(|py| {
            let dict = PyDict::new(py);
            dict.set_item("required", {
                let required = PyDict::new(py);
                required.set_item("full_pipe", (NODE_FULL_PIPE,))?;
                add_sampling_inputs(
                    py,
                    &required,
                    &SamplingDefaults {
                        scheduler: "karras",
                        ays_first: false,
                        steps: 20,
                        denoise: 1.0,
                    },
                )?;
                required.set_item(
                    "resolution",
                    (resolution_names(), {
                        let resolution = PyDict::new(py);
                        resolution.set_item("default", DEFAULT_RESOLUTION)?;
                        resolution
                    }),
                )?;
                required.set_item(
                    "portrait",
                    (NODE_BOOLEAN, {
                        let portrait = PyDict::new(py);
                        portrait.set_item("default", true)?;
                        portrait
                    }),
                )?;
                required
            })?;
            dict.set_item("optional", {
                let optional = PyDict::new(py);
                optional.set_item("image", (NODE_IMAGE,))?;
                optional
            })?;
            Ok(dict.into())
        })
    }

    #[pyo3(
        name = "execute",
        signature = (
            full_pipe,
            sampler_name,
            scheduler,
            steps,
            cfg,
            denoise,
            resolution,
            portrait,
            image=None
        )
    )]
    #[allow(clippy::too_many_arguments)]
    fn execute<'py>(
        &self,
        py: Python<'py>,
        full_pipe: Bound<'py, FullPipe>,
        sampler_name: &str,
        scheduler: &str,
        steps: u32,
        cfg: f64,
        denoise: f64,
        resolution: &str,
        portrait: bool,
        image: Option<Bound<'py, PyAny>>,
    ) -> PyResult<(FullPipe, Bound<'py, PyAny>)> {
        let results = self.generate(
            py,
            full_pipe.get(),
            sampler_name,
            scheduler,
            steps,
            cfg,
            denoise,
            resolution,
            portrait,
            image,
        );
        results.map_err(|e| self.raise_error(py, "BaseNode", e))
    }
}

impl BaseNode {
    #[allow(clippy::too_many_arguments)]
    fn generate<'py>(
        &self,
        py: Python<'py>,
        full_pipe: &FullPipe,
        sampler_name: &str,
        scheduler: &str,
        steps: u32,
        cfg: f64,
        denoise: f64,
        resolution: &str,
        portrait: bool,
        image: Option<Bound<'py, PyAny>>,
    ) -> Result<(FullPipe, Bound<'py, PyAny>), Error> {
        let pipe = &full_pipe.inner;
        let sampler = pipe_sampler(py, pipe)?;
        let resolution = select_resolution(resolution, portrait)?;

        let image = image
            .map(|image| TensorWrapper::<f32>::new(&image, &Device::Cpu).map(TensorWrapper::<f32>::into_tensor))
            .transpose()?;
        let image_size = image
            .as_ref()
            .map(|image| image.dims4())
            .transpose()?
            .map(|(_, height, width, _)| (width, height));

        let (plan, denoise) = plan_latent(image_size, resolution, denoise);
        info!("base generation: {plan:?}, denoise {denoise}");
        let latent = match (plan, &image) {
            (LatentPlan::Image { width, height }, Some(image)) => {
                let scaled = resize(py, image, width, height, UpscaleMethod::Lanczos)?;
                sampler.encode(&scaled)?
            }
            (LatentPlan::Empty { width, height }, _) | (LatentPlan::Image { width, height }, None) => {
                sampler.empty_latent(width, height, 1)?
            }
        };

        let params = sampling_params(pipe, sampler_name, scheduler, steps, cfg, denoise);
        let sampled = sampler.sample(&latent, &params)?;
        let decoded = sampler.decode(&sampled)?;

        let decoded = TensorWrapper::<f32>::from_tensor(decoded).to_py_tensor(py)?;
        let full_pipe = FullPipe::new(pipe.with_image(PyHandle::new(&decoded)));
        Ok((full_pipe, decoded))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plan_latent() -> anyhow::Result<()> {
        let (plan, denoise) = plan_latent(None, (832, 1216), 0.5);
        assert_eq!(plan, LatentPlan::Empty { width: 832, height: 1216 });
        assert_eq!(denoise, 1.0);

        let (plan, denoise) = plan_latent(Some((512, 512)), (832, 1216), 0.5);
        assert_eq!(plan, LatentPlan::Image { width: 1024, height: 1024 });
        assert_eq!(denoise, 0.5);
        Ok(())
    }
}

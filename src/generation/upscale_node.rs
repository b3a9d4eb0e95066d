//! 放大重绘 (管道)

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
    generation::inputs::{
        add_sampling_inputs, pipe_sampler, sampling_params, upscale_target, SamplingDefaults,
    },
    image::upscale::{resize, ModelUpscaler, UpscaleMethod},
    pipe::{FullPipe, PyHandle},
    wrapper::{
        comfy::folder_paths::{get_upscale_model_list, NONE_OPTION},
        comfyui::{
            types::{NODE_FLOAT, NODE_FULL_PIPE, NODE_IMAGE},
            PromptServer,
        },
        torch::tensor::TensorWrapper,
    },
};

/// 放大图片 (输入图片优先, 否则取管道中的图片) 后重新采样
#[pyclass(subclass)]
pub struct UpscaleNode {
    device: Device,
}

impl PromptServer for UpscaleNode {}

#[pymethods]
impl UpscaleNode {
    #[new]
    fn new() -> Self {
        Self {
            device: Device::Cpu,
        }
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
        "Upscale the pipe image (or the given image) by model and factor, then re-sample it."
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
                        scheduler: "align_your_steps",
                        ays_first: true,
                        steps: 10,
                        denoise: 0.3,
                    },
                )?;
                required.set_item("upscale_model", (get_upscale_model_list(py)?,))?;
                required.set_item(
                    "scale_by",
                    (NODE_FLOAT, {
                        let scale_by = PyDict::new(py);
                        scale_by.set_item("default", 2.0)?;
                        scale_by.set_item("min", 0.01)?;
                        scale_by.set_item("max", 8.0)?;
                        scale_by.set_item("step", 0.01)?;
                        scale_by
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
            upscale_model,
            scale_by,
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
        upscale_model: &str,
        scale_by: f64,
        image: Option<Bound<'py, PyAny>>,
    ) -> PyResult<(FullPipe, Bound<'py, PyAny>)> {
        let results = self.upscale(
            py,
            full_pipe.get(),
            sampler_name,
            scheduler,
            steps,
            cfg,
            denoise,
            upscale_model,
            scale_by,
            image,
        );
        results.map_err(|e| self.raise_error(py, "UpscaleNode", e))
    }
}

impl UpscaleNode {
    #[allow(clippy::too_many_arguments)]
    fn upscale<'py>(
        &self,
        py: Python<'py>,
        full_pipe: &FullPipe,
        sampler_name: &str,
        scheduler: &str,
        steps: u32,
        cfg: f64,
        denoise: f64,
        upscale_model: &str,
        scale_by: f64,
        image: Option<Bound<'py, PyAny>>,
    ) -> Result<(FullPipe, Bound<'py, PyAny>), Error> {
        let pipe = &full_pipe.inner;
        let sampler = pipe_sampler(py, pipe)?;
        let image = match image {
            Some(image) => image,
            None => pipe.require_image()?.bind(py).clone(),
        };
        let image = TensorWrapper::<f32>::new(&image, &self.device)?.into_tensor();
        let (_, height, width, _) = image.dims4()?;

        let with_model = !upscale_model.is_empty() && upscale_model != NONE_OPTION;
        let (target_width, target_height) = upscale_target(width, height, scale_by, with_model);
        let scaled = if with_model {
            let upscaler = ModelUpscaler::new(py)?;
            let model = upscaler.load(upscale_model)?;
            let upscaled = upscaler.upscale(&model, &image)?;
            resize(py, &upscaled, target_width, target_height, UpscaleMethod::Lanczos)?
        } else {
            resize(py, &image, target_width, target_height, UpscaleMethod::Lanczos)?
        };
        info!("upscale: {width}x{height} -> {target_width}x{target_height}, model '{upscale_model}'");

        let latent = sampler.encode(&scaled)?;
        let params = sampling_params(pipe, sampler_name, scheduler, steps, cfg, denoise);
        let sampled = sampler.sample(&latent, &params)?;
        let decoded = sampler.decode(&sampled)?;

        let decoded = TensorWrapper::<f32>::from_tensor(decoded).to_py_tensor(py)?;
        let full_pipe = FullPipe::new(pipe.with_image(PyHandle::new(&decoded)));
        Ok((full_pipe, decoded))
    }
}

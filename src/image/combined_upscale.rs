//! 模型放大 + 倍数缩放

use candle_core::Device;
use log::info;
use pyo3::{
    pyclass, pymethods,
    types::{PyDict, PyDictMethods, PyType},
    Bound, Py, PyAny, PyResult, Python,
};

use crate::{
    core::category::CATEGORY_IMAGE,
    error::Error,
    image::upscale::{resize, scale_dims, ModelUpscaler, UpscaleMethod},
    wrapper::{
        comfy::folder_paths::get_filename_list,
        comfyui::{
            types::{NODE_FLOAT, NODE_IMAGE},
            PromptServer,
        },
        torch::tensor::TensorWrapper,
    },
};

/// 先用超分模型放大, 再缩放到原尺寸 * scale_factor
#[pyclass(subclass)]
pub struct CombinedUpscaleNode {
    device: Device,
}

impl PromptServer for CombinedUpscaleNode {}

#[pymethods]
impl CombinedUpscaleNode {
    #[new]
    fn new() -> Self {
        Self {
            device: Device::Cpu,
        }
    }

    #[classattr]
    #[pyo3(name = "RETURN_TYPES")]
    fn return_types() -> (&'static str,) {
        (NODE_IMAGE,)
    }

    #[classattr]
    #[pyo3(name = "CATEGORY")]
    const CATEGORY: &'static str = CATEGORY_IMAGE;

    #[classattr]
    #[pyo3(name = "DESCRIPTION")]
    fn description() -> &'static str {
        "Upscale with a model, then resize to the input size times scale_factor."
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
                required.set_item("image", (NODE_IMAGE,))?;
                required.set_item(
                    "upscale_model_name",
                    (get_filename_list(py, "upscale_models")?,),
                )?;
                required.set_item(
                    "scale_factor",
                    (NODE_FLOAT, {
                        let scale_factor = PyDict::new(py);
                        scale_factor.set_item("default", 1.0)?;
                        scale_factor.set_item("min", 0.1)?;
                        scale_factor.set_item("max", 16.0)?;
                        scale_factor.set_item("step", 0.1)?;
                        scale_factor
                    }),
                )?;
                required.set_item("upscale_method", (UpscaleMethod::options(),))?;
                required
            })?;
            Ok(dict.into())
        })
    }

    #[pyo3(name = "execute")]
    fn execute<'py>(
        &self,
        py: Python<'py>,
        image: Bound<'py, PyAny>,
        upscale_model_name: &str,
        scale_factor: f64,
        upscale_method: &str,
    ) -> PyResult<(Bound<'py, PyAny>,)> {
        let results = self.upscale(py, &image, upscale_model_name, scale_factor, upscale_method);
        match results {
            Ok(v) => Ok((v,)),
            Err(e) => Err(self.raise_error(py, "CombinedUpscaleNode", e)),
        }
    }
}

impl CombinedUpscaleNode {
    fn upscale<'py>(
        &self,
        py: Python<'py>,
        image: &Bound<'py, PyAny>,
        upscale_model_name: &str,
        scale_factor: f64,
        upscale_method: &str,
    ) -> Result<Bound<'py, PyAny>, Error> {
        let method = UpscaleMethod::parse(upscale_method)?;
        let upscaler = ModelUpscaler::new(py)?;

        let image = TensorWrapper::<f32>::new(image, &self.device)?.into_tensor();
        let (_, height, width, _) = image.dims4()?;
        let (target_width, target_height) = scale_dims(width, height, scale_factor);

        let model = upscaler.load(upscale_model_name)?;
        let upscaled = upscaler.upscale(&model, &image)?;
        let resized = resize(py, &upscaled, target_width, target_height, method)?;
        info!("upscaled {width}x{height} -> {target_width}x{target_height} with {upscale_model_name}");

        Ok(TensorWrapper::<f32>::from_tensor(resized).to_py_tensor(py)?)
    }
}

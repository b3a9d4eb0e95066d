//! 遮罩细化节点
//!
//! 区域来自遮罩 (MaskToSEGS) 而不是检测模型, threshold 仅为兼容保留

use pyo3::{
    pyclass, pymethods,
    types::{PyDict, PyDictMethods, PyType},
    Bound, Py, PyAny, PyRef, PyResult, Python,
};

use crate::{
    core::category::CATEGORY_DETAILER,
    detailer::{
        comfy_backend::{run_detailer, DetailerInputs, DetailerSettings, DetectionSource},
        inputs::{add_sampling_inputs, add_seed_input},
    },
    pipe::{FullPipe, PyHandle},
    wrapper::comfyui::{
        types::{NODE_CONDITIONING, NODE_FULL_PIPE, NODE_IMAGE, NODE_MASK, NODE_MODEL, NODE_VAE},
        PromptServer,
    },
};

const DESCRIPTION: &str = "Crops, upscales, samples, downscales, and uncrops the masked regions.";

#[pyclass(subclass)]
pub struct MaskDetailerNode {}

impl PromptServer for MaskDetailerNode {}

#[pymethods]
impl MaskDetailerNode {
    #[new]
    fn new() -> Self {
        Self {}
    }

    #[classattr]
    #[pyo3(name = "RETURN_TYPES")]
    fn return_types() -> (&'static str, &'static str) {
        (NODE_IMAGE, NODE_IMAGE)
    }

    #[classattr]
    #[pyo3(name = "RETURN_NAMES")]
    fn return_names() -> (&'static str, &'static str) {
        ("image", "cropped_image")
    }

    #[classattr]
    #[pyo3(name = "CATEGORY")]
    const CATEGORY: &'static str = CATEGORY_DETAILER;

    #[classattr]
    #[pyo3(name = "DESCRIPTION")]
    fn description() -> &'static str {
        DESCRIPTION
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
                required.set_item("mask", (NODE_MASK,))?;
                required.set_item("model", (NODE_MODEL,))?;
                required.set_item("vae", (NODE_VAE,))?;
                required.set_item("positive", (NODE_CONDITIONING,))?;
                required.set_item("negative", (NODE_CONDITIONING,))?;
                add_seed_input(py, &required)?;
                add_sampling_inputs(py, &required)?;
                required
            })?;
            Ok(dict.into())
        })
    }

    #[pyo3(
        name = "execute",
        signature = (
            image, mask, model, vae, positive, negative,
            seed, steps, cfg, sampler, scheduler, denoise,
            upscale_method, upscale_model, threshold, feather, edge_erosion,
            context_padding=0,
        )
    )]
    #[allow(clippy::too_many_arguments)]
    fn execute<'py>(
        &self,
        py: Python<'py>,
        image: Bound<'py, PyAny>,
        mask: Bound<'py, PyAny>,
        model: Bound<'py, PyAny>,
        vae: Bound<'py, PyAny>,
        positive: Bound<'py, PyAny>,
        negative: Bound<'py, PyAny>,
        seed: u64,
        steps: u32,
        cfg: f64,
        sampler: String,
        scheduler: String,
        denoise: f64,
        upscale_method: String,
        upscale_model: String,
        threshold: f32,
        feather: f32,
        edge_erosion: usize,
        context_padding: usize,
    ) -> PyResult<(Bound<'py, PyAny>, Bound<'py, PyAny>)> {
        let results = DetailerSettings::new(
            seed,
            steps,
            cfg,
            &sampler,
            &scheduler,
            denoise,
            &upscale_method,
            &upscale_model,
            threshold,
            feather,
            edge_erosion,
            context_padding,
        )
        .and_then(|settings| {
            run_detailer(
                py,
                DetailerInputs {
                    image,
                    model,
                    vae,
                    positive,
                    negative,
                },
                DetectionSource::Mask(mask),
                settings,
            )
        });

        results.map_err(|e| self.raise_error(py, "MaskDetailerNode", e))
    }
}

/// 管道版本, 可选 image 覆盖管道中的图片
#[pyclass(subclass)]
pub struct MaskDetailerPipeNode {}

impl PromptServer for MaskDetailerPipeNode {}

#[pymethods]
impl MaskDetailerPipeNode {
    #[new]
    fn new() -> Self {
        Self {}
    }

    #[classattr]
    #[pyo3(name = "RETURN_TYPES")]
    fn return_types() -> (&'static str, &'static str, &'static str) {
        (NODE_FULL_PIPE, NODE_IMAGE, NODE_IMAGE)
    }

    #[classattr]
    #[pyo3(name = "RETURN_NAMES")]
    fn return_names() -> (&'static str, &'static str, &'static str) {
        ("full_pipe", "image", "cropped_image")
    }

    #[classattr]
    #[pyo3(name = "CATEGORY")]
    const CATEGORY: &'static str = CATEGORY_DETAILER;

    #[classattr]
    #[pyo3(name = "DESCRIPTION")]
    fn description() -> &'static str {
        DESCRIPTION
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
                required.set_item("mask", (NODE_MASK,))?;
                add_sampling_inputs(py, &required)?;
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
            full_pipe, mask,
            steps, cfg, sampler, scheduler, denoise,
            upscale_method, upscale_model, threshold, feather, edge_erosion,
            context_padding=0, image=None,
        )
    )]
    #[allow(clippy::too_many_arguments)]
    fn execute<'py>(
        &self,
        py: Python<'py>,
        full_pipe: PyRef<'py, FullPipe>,
        mask: Bound<'py, PyAny>,
        steps: u32,
        cfg: f64,
        sampler: String,
        scheduler: String,
        denoise: f64,
        upscale_method: String,
        upscale_model: String,
        threshold: f32,
        feather: f32,
        edge_erosion: usize,
        context_padding: usize,
        image: Option<Bound<'py, PyAny>>,
    ) -> PyResult<(FullPipe, Bound<'py, PyAny>, Bound<'py, PyAny>)> {
        let pipe = &full_pipe.inner;
        let results = DetailerInputs::from_pipe(py, pipe, image)
            .and_then(|inputs| {
                let settings = DetailerSettings::new(
                    pipe.seed_or_default(),
                    steps,
                    cfg,
                    &sampler,
                    &scheduler,
                    denoise,
                    &upscale_method,
                    &upscale_model,
                    threshold,
                    feather,
                    edge_erosion,
                    context_padding,
                )?;
                run_detailer(py, inputs, DetectionSource::Mask(mask), settings)
            })
            .map(|(image, crops)| {
                let pipe = FullPipe::new(pipe.with_image(PyHandle::new(&image)));
                (pipe, image, crops)
            });

        results.map_err(|e| self.raise_error(py, "MaskDetailerPipeNode", e))
    }
}

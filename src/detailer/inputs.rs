//! 细化节点的公共输入

use log::warn;
use pyo3::{
    types::{PyAnyMethods, PyDict, PyDictMethods},
    Bound, PyResult, Python,
};

use crate::{
    error::Error,
    image::upscale::UpscaleMethod,
    wrapper::{
        comfy::{
            folder_paths::{get_upscale_model_list, NONE_OPTION},
            samplers::{sampler_names, scheduler_names, ALIGN_YOUR_STEPS},
        },
        comfyui::types::{NODE_FLOAT, NODE_INT, NODE_SEED_MAX},
    },
};

/// Impact Pack 未安装时的默认检测模型
const DEFAULT_BBOX_MODEL: &str = "bbox/face_yolov8m.pt";

/// 从 UltralyticsDetectorProvider 的输入定义读取模型列表
pub fn ultralytics_model_list(py: Python<'_>) -> Vec<String> {
    let list = || -> Result<Vec<String>, Error> {
        let class = py
            .import("nodes")?
            .getattr("NODE_CLASS_MAPPINGS")?
            .call_method1("get", ("UltralyticsDetectorProvider",))?;
        if class.is_none() {
            return Err(Error::MissingNode("UltralyticsDetectorProvider".to_string()));
        }
        let models = class
            .call_method0("INPUT_TYPES")?
            .get_item("required")?
            .get_item("model_name")?
            .get_item(0)?
            .extract::<Vec<String>>()?;
        Ok(models)
    };

    match list() {
        Ok(models) if !models.is_empty() => models,
        Ok(_) => vec![DEFAULT_BBOX_MODEL.to_string()],
        Err(e) => {
            warn!("unable to list ultralytics models, {e}");
            vec![DEFAULT_BBOX_MODEL.to_string()]
        }
    }
}

/// 检测模型与后备模型选项
pub fn add_detector_inputs(py: Python<'_>, required: &Bound<'_, PyDict>) -> PyResult<()> {
    let models = ultralytics_model_list(py);
    let mut fallback = vec![NONE_OPTION.to_string()];
    fallback.extend(models.iter().cloned());

    required.set_item("bbox_model", (models,))?;
    required.set_item(
        "fallback_model",
        (fallback, {
            let fallback_model = PyDict::new(py);
            fallback_model.set_item(
                "tooltip",
                "Used once when the bbox model finds nothing. 'none' disables the fallback.",
            )?;
            fallback_model
        }),
    )?;
    Ok(())
}

/// 种子
pub fn add_seed_input(py: Python<'_>, required: &Bound<'_, PyDict>) -> PyResult<()> {
    required.set_item(
        "seed",
        (NODE_INT, {
            let seed = PyDict::new(py);
            seed.set_item("default", 0)?;
            seed.set_item("min", 0)?;
            seed.set_item("max", NODE_SEED_MAX)?;
            seed
        }),
    )
}

/// 采样, 缩放, 阈值与回贴参数
pub fn add_sampling_inputs(py: Python<'_>, required: &Bound<'_, PyDict>) -> PyResult<()> {
    let samplers = sampler_names(py)?;
    let schedulers = scheduler_names(py)?;
    let upscale_models = get_upscale_model_list(py)?;

    required.set_item(
        "steps",
        (NODE_INT, {
            let steps = PyDict::new(py);
            steps.set_item("default", 20)?;
            steps.set_item("min", 1)?;
            steps.set_item("max", 10000)?;
            steps
        }),
    )?;
    required.set_item(
        "cfg",
        (NODE_FLOAT, {
            let cfg = PyDict::new(py);
            cfg.set_item("default", 1.5)?;
            cfg.set_item("min", 0.0)?;
            cfg.set_item("max", 100.0)?;
            cfg.set_item("step", 0.1)?;
            cfg
        }),
    )?;
    required.set_item(
        "sampler",
        (samplers, {
            let sampler = PyDict::new(py);
            sampler.set_item("default", "euler_ancestral_cfg_pp")?;
            sampler
        }),
    )?;
    required.set_item(
        "scheduler",
        (schedulers, {
            let scheduler = PyDict::new(py);
            scheduler.set_item("default", ALIGN_YOUR_STEPS)?;
            scheduler
        }),
    )?;
    required.set_item(
        "denoise",
        (NODE_FLOAT, {
            let denoise = PyDict::new(py);
            denoise.set_item("default", 0.4)?;
            denoise.set_item("min", 0.0)?;
            denoise.set_item("max", 1.0)?;
            denoise.set_item("step", 0.01)?;
            denoise
        }),
    )?;
    required.set_item("upscale_method", (UpscaleMethod::options(),))?;
    required.set_item("upscale_model", (upscale_models,))?;
    required.set_item(
        "threshold",
        (NODE_FLOAT, {
            let threshold = PyDict::new(py);
            threshold.set_item("default", 0.5)?;
            threshold.set_item("min", 0.0)?;
            threshold.set_item("max", 1.0)?;
            threshold.set_item("step", 0.01)?;
            threshold
        }),
    )?;
    required.set_item(
        "feather",
        (NODE_FLOAT, {
            let feather = PyDict::new(py);
            feather.set_item("default", 0.25)?;
            feather.set_item("min", 0.0)?;
            feather.set_item("max", 1.0)?;
            feather.set_item("step", 0.01)?;
            feather
        }),
    )?;
    required.set_item(
        "edge_erosion",
        (NODE_INT, {
            let edge_erosion = PyDict::new(py);
            edge_erosion.set_item("default", 10)?;
            edge_erosion.set_item("min", 0)?;
            edge_erosion.set_item("max", 100)?;
            edge_erosion
        }),
    )?;
    required.set_item(
        "context_padding",
        (NODE_INT, {
            let context_padding = PyDict::new(py);
            context_padding.set_item("default", 0)?;
            context_padding.set_item("min", 0)?;
            context_padding.set_item("max", 256)?;
            context_padding.set_item(
                "tooltip",
                "Border in source pixels kept as context and excluded from the noise mask. 0 regenerates the whole crop.",
            )?;
            context_padding
        }),
    )?;
    Ok(())
}

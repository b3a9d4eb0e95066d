//! 生成节点的公共输入与尺寸计算

use pyo3::{
    types::{PyDict, PyDictMethods},
    Bound, PyResult, Python,
};

use crate::{
    error::Error,
    pipe::{Pipe, PyHandle},
    sampling::{ComfySampler, SamplingParams, SchedulerChoice},
    wrapper::{
        comfy::samplers::{sampler_names, scheduler_names, ALIGN_YOUR_STEPS},
        comfyui::types::{NODE_FLOAT, NODE_INT},
    },
};

/// 采样输入的默认值
pub struct SamplingDefaults {
    pub scheduler: &'static str,
    /// align_your_steps 排在列表首位
    pub ays_first: bool,
    pub steps: u32,
    pub denoise: f64,
}

/// sampler_name, scheduler, steps, cfg, denoise
pub fn add_sampling_inputs(
    py: Python<'_>,
    required: &Bound<'_, PyDict>,
    defaults: &SamplingDefaults,
) -> PyResult<()> {
    let mut schedulers = scheduler_names(py)?;
    if defaults.ays_first {
        schedulers.retain(|name| name != ALIGN_YOUR_STEPS);
        schedulers.insert(0, ALIGN_YOUR_STEPS.to_string());
    }

    required.set_item(
        "sampler_name",
        (sampler_names(py)?, {
            let sampler_name = PyDict::new(py);
            sampler_name.set_item("default", "euler_ancestral_cfg_pp")?;
            sampler_name
        }),
    )?;
    required.set_item(
        "scheduler",
        (schedulers, {
            let scheduler = PyDict::new(py);
            scheduler.set_item("default", defaults.scheduler)?;
            scheduler
        }),
    )?;
    required.set_item(
        "steps",
        (NODE_INT, {
            let steps = PyDict::new(py);
            steps.set_item("default", defaults.steps)?;
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
            cfg.set_item("round", 0.01)?;
            cfg
        }),
    )?;
    required.set_item(
        "denoise",
        (NODE_FLOAT, {
            let denoise = PyDict::new(py);
            denoise.set_item("default", defaults.denoise)?;
            denoise.set_item("min", 0.0)?;
            denoise.set_item("max", 1.0)?;
            denoise.set_item("step", 0.01)?;
            denoise
        }),
    )?;
    Ok(())
}

/// 由管道构建采样器, 需要 model, vae, positive, negative
pub fn pipe_sampler<'py>(
    py: Python<'py>,
    pipe: &Pipe<PyHandle>,
) -> Result<ComfySampler<'py>, Error> {
    ComfySampler::new(
        py,
        pipe.require_model()?.bind(py).clone(),
        pipe.require_vae()?.bind(py).clone(),
        pipe.require_positive()?.bind(py).clone(),
        pipe.require_negative()?.bind(py).clone(),
    )
}

pub fn sampling_params(
    pipe: &Pipe<PyHandle>,
    sampler_name: &str,
    scheduler: &str,
    steps: u32,
    cfg: f64,
    denoise: f64,
) -> SamplingParams {
    SamplingParams {
        seed: pipe.seed_or_default(),
        steps,
        cfg,
        sampler_name: sampler_name.to_string(),
        scheduler: SchedulerChoice::from(scheduler),
        denoise,
    }
}

/// 放大后的尺寸
///
/// 使用超分模型时向零取整, 否则与 ImageScaleBy 一致四舍六入五成双
pub fn upscale_target(width: usize, height: usize, scale_by: f64, with_model: bool) -> (usize, usize) {
    let scale = |value: usize| -> usize {
        let scaled = value as f64 * scale_by;
        let scaled = if with_model {
            scaled.trunc()
        } else {
            scaled.round_ties_even()
        };
        (scaled as usize).max(1)
    };
    (scale(width), scale(height))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upscale_target() -> anyhow::Result<()> {
        assert_eq!(upscale_target(832, 1216, 1.5, true), (1248, 1824));
        // 333 * 0.5 = 166.5
        assert_eq!(upscale_target(333, 335, 0.5, true), (166, 167));
        assert_eq!(upscale_target(333, 335, 0.5, false), (166, 168));
        assert_eq!(upscale_target(10, 10, 0.01, false), (1, 1));
        Ok(())
    }
}

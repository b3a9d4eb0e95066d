//! comfy.samplers

use pyo3::{types::PyAnyMethods, Python};

use crate::error::Error;

/// 额外的调度器, 通过 AlignYourStepsScheduler 节点计算 sigmas
pub const ALIGN_YOUR_STEPS: &str = "align_your_steps";

/// comfy.samplers.KSampler.SAMPLERS
pub fn sampler_names(py: Python<'_>) -> Result<Vec<String>, Error> {
    let names = py
        .import("comfy.samplers")?
        .getattr("KSampler")?
        .getattr("SAMPLERS")?
        .extract::<Vec<String>>()?;
    Ok(names)
}

/// comfy.samplers.KSampler.SCHEDULERS, 追加 align_your_steps
pub fn scheduler_names(py: Python<'_>) -> Result<Vec<String>, Error> {
    let mut names = py
        .import("comfy.samplers")?
        .getattr("KSampler")?
        .getattr("SCHEDULERS")?
        .extract::<Vec<String>>()?;
    if !names.iter().any(|n| n == ALIGN_YOUR_STEPS) {
        names.push(ALIGN_YOUR_STEPS.to_string());
    }
    Ok(names)
}

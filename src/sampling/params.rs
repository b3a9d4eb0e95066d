//! 采样参数

use crate::{sampling::ModelFamily, wrapper::comfy::samplers::ALIGN_YOUR_STEPS};

/// 调度器选择
#[derive(Debug, Clone, PartialEq)]
pub enum SchedulerChoice {
    AlignYourSteps,
    Named(String),
}

impl From<&str> for SchedulerChoice {
    fn from(name: &str) -> Self {
        if name == ALIGN_YOUR_STEPS {
            SchedulerChoice::AlignYourSteps
        } else {
            SchedulerChoice::Named(name.to_string())
        }
    }
}

/// sigmas 计算方式
#[derive(Debug, Clone, PartialEq)]
pub enum SigmaSchedule {
    /// AlignYourStepsScheduler(model_type, steps, denoise)
    AlignYourSteps(ModelFamily),
    /// BasicScheduler(model, scheduler, steps, denoise)
    Basic(String),
}

impl SchedulerChoice {
    /// 仅 align_your_steps 需要探测模型系列
    pub fn resolve<F>(&self, probe_family: F) -> SigmaSchedule
    where
        F: FnOnce() -> ModelFamily,
    {
        match self {
            SchedulerChoice::AlignYourSteps => SigmaSchedule::AlignYourSteps(probe_family()),
            SchedulerChoice::Named(name) => SigmaSchedule::Basic(name.clone()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SamplingParams {
    pub seed: u64,
    pub steps: u32,
    pub cfg: f64,
    pub sampler_name: String,
    pub scheduler: SchedulerChoice,
    pub denoise: f64,
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;

    #[test]
    fn test_resolve_probes_only_for_ays() -> anyhow::Result<()> {
        let probed = Cell::new(0);
        let probe = || {
            probed.set(probed.get() + 1);
            ModelFamily::Sd1
        };

        let basic = SchedulerChoice::from("karras").resolve(probe);
        assert_eq!(basic, SigmaSchedule::Basic("karras".to_string()));
        assert_eq!(probed.get(), 0);

        let ays = SchedulerChoice::from(ALIGN_YOUR_STEPS).resolve(probe);
        assert_eq!(ays, SigmaSchedule::AlignYourSteps(ModelFamily::Sd1));
        assert_eq!(probed.get(), 1);
        Ok(())
    }
}

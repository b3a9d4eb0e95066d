//! 采样

use pyo3::{
    types::{PyModule, PyModuleMethods},
    Bound, PyResult, Python,
};

use crate::core::node::NodeRegister;

mod model_family;
pub use model_family::ModelFamily;

mod params;
pub use params::{SamplingParams, SchedulerChoice, SigmaSchedule};

mod comfy_sampler;
pub use comfy_sampler::ComfySampler;

mod seed_with_override;
pub use seed_with_override::SeedWithOverride;

/// 采样模块
pub fn submodule(py: Python<'_>) -> PyResult<Bound<'_, PyModule>> {
    let submodule = PyModule::new(py, "sampling")?;
    submodule.add_class::<SeedWithOverride>()?;
    Ok(submodule)
}

/// Sampling node register
pub fn node_register(py: Python<'_>) -> PyResult<Vec<NodeRegister<'_>>> {
    let nodes: Vec<NodeRegister> = vec![NodeRegister(
        "SeedWithOverride",
        py.get_type::<SeedWithOverride>(),
        "Seed (with Override)",
    )];
    Ok(nodes)
}

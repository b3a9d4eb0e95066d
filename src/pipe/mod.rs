//! 管道

use pyo3::{
    types::{PyModule, PyModuleMethods},
    Bound, PyResult, Python,
};

use crate::core::node::NodeRegister;

pub mod checkpoint_cache;
pub mod lora;

mod full_pipe;
pub use full_pipe::{add_field_input, FullPipe, Pipe, PyHandle, PIPE_FIELDS};

mod full_pipe_loader;
pub use full_pipe_loader::FullPipeLoader;

mod full_pipe_out;
pub use full_pipe_out::FullPipeOut;

mod full_pipe_in;
pub use full_pipe_in::FullPipeIn;

mod loader_full_pipe;
pub use loader_full_pipe::LoaderFullPipe;

mod conditional_lora_full_pipe;
pub use conditional_lora_full_pipe::ConditionalLoraFullPipe;

mod save_full_pipe;
pub use save_full_pipe::{SaveFullPipe, SaveMetadata};

/// 管道模块
pub fn submodule(py: Python<'_>) -> PyResult<Bound<'_, PyModule>> {
    let submodule = PyModule::new(py, "pipe")?;
    submodule.add_class::<FullPipe>()?;
    submodule.add_class::<FullPipeLoader>()?;
    submodule.add_class::<FullPipeOut>()?;
    submodule.add_class::<FullPipeIn>()?;
    submodule.add_class::<LoaderFullPipe>()?;
    submodule.add_class::<ConditionalLoraFullPipe>()?;
    submodule.add_class::<SaveFullPipe>()?;
    Ok(submodule)
}

/// Pipe node register
pub fn node_register(py: Python<'_>) -> PyResult<Vec<NodeRegister<'_>>> {
    let nodes: Vec<NodeRegister> = vec![
        NodeRegister(
            "FullPipeLoader",
            py.get_type::<FullPipeLoader>(),
            "Full Pipe Loader",
        ),
        NodeRegister("FullPipeOut", py.get_type::<FullPipeOut>(), "Full Pipe Out"),
        NodeRegister("FullPipeIn", py.get_type::<FullPipeIn>(), "Full Pipe In"),
        NodeRegister(
            "LoaderFullPipe",
            py.get_type::<LoaderFullPipe>(),
            "Loader (full-pipe)",
        ),
        NodeRegister(
            "ConditionalLoraFullPipe",
            py.get_type::<ConditionalLoraFullPipe>(),
            "Conditional Lora (full-pipe)",
        ),
        NodeRegister("SaveFullPipe", py.get_type::<SaveFullPipe>(), "Save (full-pipe)"),
    ];
    Ok(nodes)
}

//! 检查点加载 (管道)

use log::{error, info};
use pyo3::{
    pyclass, pymethods,
    types::{PyAnyMethods, PyDict, PyDictMethods, PyType},
    Bound, Py, PyAny, PyResult, Python,
};

use crate::{
    core::category::CATEGORY_PIPE,
    error::Error,
    pipe::{
        checkpoint_cache::{CacheKey, CheckpointCache},
        full_pipe::{FullPipe, Pipe, PyHandle},
        lora::{apply_lora_stack, parse_lora_stack},
    },
    wrapper::{
        comfy::{
            folder_paths::{get_filename_list, get_folder_paths, get_full_path},
            utils::free_memory,
        },
        comfyui::{
            types::{NODE_FULL_PIPE, NODE_INT, NODE_LORA_STACK, NODE_SEED_MAX},
            PromptServer,
        },
    },
};

/// 列表中存在时排在首位
const DEFAULT_CHECKPOINT: &str = "Illustrious/prefectIllustriousXL_v3.safetensors";

/// 缓存的模型句柄
#[derive(Debug, Clone)]
pub struct LoadedCheckpoint {
    model: PyHandle,
    clip: PyHandle,
    vae: PyHandle,
}

/// 默认检查点移到列表首位
fn move_default_first(mut names: Vec<String>, default: &str) -> Vec<String> {
    if let Some(index) = names.iter().position(|name| name == default) {
        let name = names.remove(index);
        names.insert(0, name);
    }
    names
}

#[pyclass(subclass)]
pub struct LoaderFullPipe {
    cache: CheckpointCache<LoadedCheckpoint>,
}

impl PromptServer for LoaderFullPipe {}

#[pymethods]
impl LoaderFullPipe {
    #[new]
    fn new() -> Self {
        Self {
            cache: CheckpointCache::new(),
        }
    }

    #[classattr]
    #[pyo3(name = "RETURN_TYPES")]
    fn return_types() -> (&'static str,) {
        (NODE_FULL_PIPE,)
    }

    #[classattr]
    #[pyo3(name = "RETURN_NAMES")]
    fn return_names() -> (&'static str,) {
        ("full_pipe",)
    }

    #[classattr]
    #[pyo3(name = "CATEGORY")]
    const CATEGORY: &'static str = CATEGORY_PIPE;

    #[classattr]
    #[pyo3(name = "DESCRIPTION")]
    fn description() -> &'static str {
        "Load checkpoint, seed, and loras into full pipe."
    }

    #[classattr]
    #[pyo3(name = "FUNCTION")]
    const FUNCTION: &'static str = "execute";

    #[classmethod]
    #[pyo3(name = "INPUT_TYPES")]
    fn input_types(_cls: &Bound<'_, PyType>) -> PyResult<Py<PyDict>> {
        Python::with_gil(|py| {
            let ckpt_names = move_default_first(
                get_filename_list(py, "checkpoints")?,
                DEFAULT_CHECKPOINT,
            );

            let dict = PyDict::new(py);
            dict.set_item("required", {
                let required = PyDict::new(py);
                required.set_item("ckpt_name", (ckpt_names,))?;
                required.set_item(
                    "stop_at_clip_layer",
                    (NODE_INT, {
                        let stop_at_clip_layer = PyDict::new(py);
                        stop_at_clip_layer.set_item("default", -2)?;
                        stop_at_clip_layer.set_item("min", -24)?;
                        stop_at_clip_layer.set_item("max", -1)?;
                        stop_at_clip_layer.set_item("step", 1)?;
                        stop_at_clip_layer.set_item("tooltip", "CLIP skip")?;
                        stop_at_clip_layer
                    }),
                )?;
                required.set_item(
                    "seed",
                    (NODE_INT, {
                        let seed = PyDict::new(py);
                        seed.set_item("default", 0)?;
                        seed.set_item("min", 0)?;
                        seed.set_item("max", NODE_SEED_MAX)?;
                        seed
                    }),
                )?;
                required
            })?;
            dict.set_item("optional", {
                let optional = PyDict::new(py);
                optional.set_item("lora_stack", (NODE_LORA_STACK,))?;
                optional
            })?;
            Ok(dict.into())
        })
    }

    #[pyo3(
        name = "execute",
        signature = (ckpt_name, stop_at_clip_layer, seed, lora_stack=None)
    )]
    fn execute<'py>(
        &mut self,
        py: Python<'py>,
        ckpt_name: String,
        stop_at_clip_layer: i32,
        seed: u64,
        lora_stack: Option<Bound<'py, PyAny>>,
    ) -> PyResult<(FullPipe,)> {
        let loaded = self
            .load(py, &ckpt_name, stop_at_clip_layer, lora_stack)
            .map_err(|e| self.raise_error(py, "LoaderFullPipe", e))?;

        let pipe = Pipe {
            model: Some(loaded.model),
            clip: Some(loaded.clip),
            vae: Some(loaded.vae),
            ckpt_name: Some(ckpt_name),
            seed: Some(seed),
            ..Default::default()
        };
        Ok((FullPipe::new(pipe),))
    }
}

impl LoaderFullPipe {
    fn load<'py>(
        &mut self,
        py: Python<'py>,
        ckpt_name: &str,
        clip_skip: i32,
        lora_stack: Option<Bound<'py, PyAny>>,
    ) -> Result<LoadedCheckpoint, Error> {
        let loras = match &lora_stack {
            Some(stack) => Some(parse_lora_stack(stack)?),
            None => None,
        };
        let key = CacheKey {
            ckpt_name: ckpt_name.to_string(),
            clip_skip,
            loras,
        };

        self.cache.get_or_load(
            key,
            |key| load_checkpoint(py, key),
            || {
                if let Err(e) = free_memory(py) {
                    error!("free memory failed, {e}");
                }
            },
        )
    }
}

/// comfy.sd.load_checkpoint_guess_config, 随后设置 CLIP skip 并应用 LoRA 栈
fn load_checkpoint(py: Python<'_>, key: &CacheKey) -> Result<LoadedCheckpoint, Error> {
    info!("loading checkpoint {}", key.ckpt_name);
    let ckpt_path = get_full_path(py, "checkpoints", &key.ckpt_name)?;
    let embeddings = get_folder_paths(py, "embeddings")?
        .iter()
        .map(|p| p.to_string_lossy().to_string())
        .collect::<Vec<_>>();

    let kwargs = PyDict::new(py);
    kwargs.set_item("output_vae", true)?;
    kwargs.set_item("output_clip", true)?;
    kwargs.set_item("embedding_directory", embeddings)?;
    let out = py.import("comfy.sd")?.getattr("load_checkpoint_guess_config")?.call(
        (ckpt_path.to_string_lossy().to_string(),),
        Some(&kwargs),
    )?;

    let model = out.get_item(0)?;
    let vae = out.get_item(2)?;
    let clip = out.get_item(1)?.call_method0("clone")?;
    clip.call_method1("clip_layer", (key.clip_skip,))?;

    let (model, clip) = match &key.loras {
        Some(stack) => apply_lora_stack(py, model, clip, stack)?,
        None => (model, clip),
    };

    Ok(LoadedCheckpoint {
        model: PyHandle::new(&model),
        clip: PyHandle::new(&clip),
        vae: PyHandle::new(&vae),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_move_default_first() -> anyhow::Result<()> {
        let names = vec![
            "a.safetensors".to_string(),
            DEFAULT_CHECKPOINT.to_string(),
            "b.safetensors".to_string(),
        ];
        let names = move_default_first(names, DEFAULT_CHECKPOINT);
        assert_eq!(names[0], DEFAULT_CHECKPOINT);
        assert_eq!(names[1..], ["a.safetensors", "b.safetensors"]);

        let names = move_default_first(vec!["x".to_string()], DEFAULT_CHECKPOINT);
        assert_eq!(names, ["x"]);
        Ok(())
    }
}

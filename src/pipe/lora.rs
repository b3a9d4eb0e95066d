//! LoRA 加载

use log::{debug, warn};
use pyo3::{
    types::{PyAnyMethods, PyDict, PyDictMethods},
    Bound, PyAny, Python,
};

use crate::{error::Error, wrapper::comfy::folder_paths::get_full_path};

/// LORA_STACK 条目 (name, strength_model, strength_clip)
#[derive(Debug, Clone, PartialEq)]
pub struct LoraEntry {
    pub name: String,
    pub strength_model: f64,
    pub strength_clip: f64,
}

impl LoraEntry {
    pub fn new(name: &str, strength_model: f64, strength_clip: f64) -> Self {
        Self {
            name: name.to_string(),
            strength_model,
            strength_clip,
        }
    }

    /// 名称为 "None" 的条目不加载
    pub fn is_enabled(&self) -> bool {
        !self.name.is_empty() && self.name != "None"
    }
}

/// 解析 LORA_STACK, 长度不为 3 的条目被忽略
pub fn parse_lora_stack(stack: &Bound<'_, PyAny>) -> Result<Vec<LoraEntry>, Error> {
    let mut entries = Vec::new();
    for item in stack.try_iter()? {
        let item = item?;
        if item.len()? != 3 {
            debug!("skip lora stack entry: {item}");
            continue;
        }

        let name = item.get_item(0)?;
        let name = if name.is_none() {
            "None".to_string()
        } else {
            name.extract::<String>()?
        };
        entries.push(LoraEntry {
            name,
            strength_model: item.get_item(1)?.extract::<f64>()?,
            strength_clip: item.get_item(2)?.extract::<f64>()?,
        });
    }
    Ok(entries)
}

/// 子串 (忽略大小写) 出现在正向提示词中时应用 LoRA
pub fn prompt_contains(positive_text: &str, substring: &str) -> bool {
    positive_text
        .to_lowercase()
        .contains(&substring.to_lowercase())
}

/// comfy.sd.load_lora_for_models
pub fn apply_lora<'py>(
    py: Python<'py>,
    model: &Bound<'py, PyAny>,
    clip: &Bound<'py, PyAny>,
    entry: &LoraEntry,
) -> Result<(Bound<'py, PyAny>, Bound<'py, PyAny>), Error> {
    let path = get_full_path(py, "loras", &entry.name)?;

    let kwargs = PyDict::new(py);
    kwargs.set_item("safe_load", true)?;
    let lora = py.import("comfy.utils")?.getattr("load_torch_file")?.call(
        (path.to_string_lossy().to_string(),),
        Some(&kwargs),
    )?;

    let result = py.import("comfy.sd")?.call_method1(
        "load_lora_for_models",
        (model, clip, lora, entry.strength_model, entry.strength_clip),
    )?;
    Ok((result.get_item(0)?, result.get_item(1)?))
}

/// 依次应用 LoRA 栈, 跳过未启用的条目
pub fn apply_lora_stack<'py>(
    py: Python<'py>,
    model: Bound<'py, PyAny>,
    clip: Bound<'py, PyAny>,
    stack: &[LoraEntry],
) -> Result<(Bound<'py, PyAny>, Bound<'py, PyAny>), Error> {
    stack
        .iter()
        .filter(|entry| entry.is_enabled())
        .try_fold((model, clip), |(model, clip), entry| {
            debug!("apply lora: {entry:?}");
            apply_lora(py, &model, &clip, entry)
        })
}

/// 加载失败时保留原模型
pub fn apply_lora_or_keep<'py>(
    py: Python<'py>,
    model: Bound<'py, PyAny>,
    clip: Bound<'py, PyAny>,
    entry: &LoraEntry,
) -> (Bound<'py, PyAny>, Bound<'py, PyAny>) {
    match apply_lora(py, &model, &clip, entry) {
        Ok(result) => result,
        Err(e) => {
            warn!("failed to apply lora {}, {e}", entry.name);
            (model, clip)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompt_contains() -> anyhow::Result<()> {
        assert!(prompt_contains("1girl, Red Dress, smile", "red dress"));
        assert!(!prompt_contains("1girl, smile", "dress"));
        assert!(prompt_contains("anything", ""));
        Ok(())
    }

    #[test]
    fn test_is_enabled() -> anyhow::Result<()> {
        assert!(LoraEntry::new("style.safetensors", 1.0, 1.0).is_enabled());
        assert!(!LoraEntry::new("None", 1.0, 1.0).is_enabled());
        Ok(())
    }
}

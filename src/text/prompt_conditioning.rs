//! 提示词条件 (管道)
//!
//! 模型预设 + 风格预设 + 角色标签替换 + 多段文本条件, 最后通过
//! LoraManager 的文本加载节点应用提示词中的 lora 语法

use log::info;
use pyo3::{
    pyclass, pymethods,
    types::{PyDict, PyDictMethods, PyTupleMethods, PyType},
    Bound, Py, PyResult, Python,
};

use crate::{
    core::category::CATEGORY_CONDITIONING,
    error::Error,
    pipe::{FullPipe, Pipe, PyHandle},
    preset::{
        prompt::{model_prompt, replace_tags, style_prompt, NONE_PRESET},
        store::PresetStore,
        types::{CharacterEntry, ModelPreset, PresetKind, PromptPair},
    },
    text::{
        multi_string_conditioning::encode_segments,
        prompt_text::{strip_comment_lines, PromptSegments},
    },
    wrapper::{
        comfy::node_class::NodeClass,
        comfyui::{
            types::{NODE_BOOLEAN, NODE_FULL_PIPE, NODE_STRING},
            PromptServer,
        },
    },
};

/// 外部 lora 文本加载节点
pub const LORA_TEXT_LOADER: &str = "LoRA Text Loader (LoraManager)";

/// 正反向各自待编码的文本
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ConditioningPrompts {
    pub positive: PromptSegments,
    pub negative: PromptSegments,
    /// 匹配到的角色标签
    pub character: String,
}

/// 组合预设与用户输入
///
/// 正向顺序: 质量, 风格, 触发词, 角色, 提示词; 反向不含触发词
#[allow(clippy::too_many_arguments)]
pub fn build_prompts(
    store: &PresetStore,
    ckpt_name: &str,
    trigger_words: &str,
    style: &str,
    quality_tags: bool,
    embeddings: bool,
    positive: &str,
    negative: &str,
) -> ConditioningPrompts {
    let positive = strip_comment_lines(positive);
    let negative = strip_comment_lines(negative);

    let models = store.presets::<ModelPreset>(PresetKind::Models);
    let quality = model_prompt(ckpt_name, &models, quality_tags, embeddings);

    let styles = store.presets::<PromptPair>(PresetKind::Styles);
    let style = style_prompt(style, &styles);

    let characters = store.presets::<CharacterEntry>(PresetKind::Characters);
    let replaced = replace_tags(&positive, &characters);

    ConditioningPrompts {
        positive: PromptSegments::parse([
            quality.positive.as_str(),
            style.positive.as_str(),
            trigger_words,
            replaced.character_pos.as_str(),
            replaced.prompt.as_str(),
        ]),
        negative: PromptSegments::parse([
            quality.negative.as_str(),
            style.negative.as_str(),
            "",
            replaced.character_neg.as_str(),
            negative.as_str(),
        ]),
        character: replaced.character_pos,
    }
}

/// 提示词条件
#[pyclass(subclass)]
pub struct PromptConditioningNode {
    store: PresetStore,
}

impl PromptServer for PromptConditioningNode {}

#[pymethods]
impl PromptConditioningNode {
    #[new]
    fn new() -> Self {
        Self {
            store: PresetStore::default(),
        }
    }

    #[classattr]
    #[pyo3(name = "RETURN_TYPES")]
    fn return_types() -> (&'static str, &'static str) {
        (NODE_FULL_PIPE, NODE_STRING)
    }

    #[classattr]
    #[pyo3(name = "RETURN_NAMES")]
    fn return_names() -> (&'static str, &'static str) {
        ("full_pipe", "match")
    }

    #[classattr]
    #[pyo3(name = "CATEGORY")]
    const CATEGORY: &'static str = CATEGORY_CONDITIONING;

    #[classattr]
    #[pyo3(name = "DESCRIPTION")]
    fn description() -> &'static str {
        "Add multi-string conditioning prompt to full pipe"
    }

    #[classattr]
    #[pyo3(name = "FUNCTION")]
    const FUNCTION: &'static str = "execute";

    #[classmethod]
    #[pyo3(name = "INPUT_TYPES")]
    fn input_types(_cls: &Bound<'_, PyType>) -> PyResult<Py<PyDict>> {
        Python::with_gil(|py| {
            let styles = PresetStore::default().presets::<PromptPair>(PresetKind::Styles);
            let mut style_list = vec![NONE_PRESET.to_string()];
            style_list.extend(styles.sorted_names());

            let toggle = |tooltip: &str| -> PyResult<Bound<'_, PyDict>> {
                let options = PyDict::new(py);
                options.set_item("default", true)?;
                options.set_item("tooltip", tooltip)?;
                Ok(options)
            };
            let text = |tooltip: &str| -> PyResult<Bound<'_, PyDict>> {
                let options = PyDict::new(py);
                options.set_item("multiline", true)?;
                options.set_item("default", "")?;
                options.set_item("tooltip", tooltip)?;
                Ok(options)
            };

            let dict = PyDict::new(py);
            dict.set_item("required", {
                let required = PyDict::new(py);
                required.set_item("full_pipe", (NODE_FULL_PIPE,))?;
                required
            })?;
            dict.set_item("optional", {
                let optional = PyDict::new(py);
                optional.set_item(
                    "trigger_words",
                    (NODE_STRING, {
                        let trigger_words = PyDict::new(py);
                        trigger_words.set_item("forceInput", true)?;
                        trigger_words
                    }),
                )?;
                optional.set_item(
                    "style",
                    (style_list, {
                        let style = PyDict::new(py);
                        style.set_item("default", NONE_PRESET)?;
                        style.set_item("tooltip", "Select style preset from config/styles.jsonc")?;
                        style
                    }),
                )?;
                optional.set_item(
                    "quality_tags",
                    (
                        NODE_BOOLEAN,
                        toggle("Enable quality tags defined in config/models.jsonc")?,
                    ),
                )?;
                optional.set_item(
                    "embeddings",
                    (
                        NODE_BOOLEAN,
                        toggle("Enable embeddings defined in config/models.jsonc")?,
                    ),
                )?;
                optional.set_item("positive", (NODE_STRING, text("Positive prompt")?))?;
                optional.set_item("negative", (NODE_STRING, text("Negative prompt")?))?;
                optional
            })?;
            Ok(dict.into())
        })
    }

    #[pyo3(
        name = "execute",
        signature = (
            full_pipe,
            trigger_words=String::new(),
            style=NONE_PRESET.to_string(),
            quality_tags=true,
            embeddings=true,
            positive=String::new(),
            negative=String::new()
        )
    )]
    #[allow(clippy::too_many_arguments)]
    fn execute<'py>(
        &self,
        py: Python<'py>,
        full_pipe: Bound<'py, FullPipe>,
        trigger_words: String,
        style: String,
        quality_tags: bool,
        embeddings: bool,
        positive: String,
        negative: String,
    ) -> PyResult<(FullPipe, String)> {
        let pipe = &full_pipe.get().inner;
        let prompts = build_prompts(
            &self.store,
            pipe.ckpt_name.as_deref().unwrap_or_default(),
            &trigger_words,
            &style,
            quality_tags,
            embeddings,
            &positive,
            &negative,
        );

        let results = self.condition(py, pipe, &prompts);
        match results {
            Ok(pipe) => Ok((pipe, prompts.character)),
            Err(e) => Err(self.raise_error(py, "PromptConditioningNode", e)),
        }
    }
}

impl PromptConditioningNode {
    fn condition(
        &self,
        py: Python<'_>,
        pipe: &Pipe<PyHandle>,
        prompts: &ConditioningPrompts,
    ) -> Result<FullPipe, Error> {
        let lora_loader = NodeClass::resolve(py, LORA_TEXT_LOADER)?;
        let model = pipe.require_model()?.bind(py);
        let clip = pipe.require_clip()?.bind(py);

        let positive = encode_segments(clip, &prompts.positive.segments)?;
        let negative = encode_segments(clip, &prompts.negative.segments)?;

        let kwargs = PyDict::new(py);
        kwargs.set_item("model", model)?;
        kwargs.set_item("lora_syntax", &prompts.positive.lora_syntax)?;
        kwargs.set_item("clip", clip)?;
        let output = lora_loader.call_kwargs(&kwargs)?;
        let model = output.get_item(0)?;
        let clip = output.get_item(1)?;
        info!(
            "prompt conditioning done, lora syntax: '{}'",
            prompts.positive.lora_syntax
        );

        Ok(FullPipe::new(conditioned_pipe(
            pipe,
            Pipe {
                model: Some(PyHandle::new(&model)),
                clip: Some(PyHandle::new(&clip)),
                positive: Some(PyHandle::new(&positive)),
                negative: Some(PyHandle::new(&negative)),
                ..Default::default()
            },
            prompts,
        )))
    }
}

/// 合并模型与条件, 提示词文本按本次结果覆盖
fn conditioned_pipe<H: Clone>(
    pipe: &Pipe<H>,
    patch: Pipe<H>,
    prompts: &ConditioningPrompts,
) -> Pipe<H> {
    pipe.merge(patch).with_prompt_texts(
        prompts.positive.combined_text(),
        prompts.negative.combined_text(),
    )
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    #[test]
    fn test_build_prompts() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let store = PresetStore::new(dir.path());
        fs::write(
            store.path(PresetKind::Characters),
            r#"{"alice": {"character": "1girl, blonde hair", "top": "red coat", "neg": "short hair"}}"#,
        )?;
        fs::write(
            store.path(PresetKind::Styles),
            r#"{"ink": {"positive": "ink wash", "negative": "photo"}}"#,
        )?;
        fs::write(
            store.path(PresetKind::Models),
            r#"{"Pony": {"quality": {"positive": "score_9", "negative": "score_4"}}}"#,
        )?;

        let prompts = build_prompts(
            &store,
            "Pony/pony.safetensors",
            "trigger <lora:t:1>",
            "ink",
            true,
            true,
            "# comment\nalice, top, smile <lora:detail:0.5>",
            "lowres",
        );

        assert_eq!(
            prompts.positive.combined_text(),
            "score_9, ink wash, trigger, 1girl, blonde hair, red coat, smile"
        );
        assert_eq!(prompts.positive.lora_syntax, "<lora:t:1> <lora:detail:0.5>");
        assert_eq!(
            prompts.negative.combined_text(),
            "score_4, photo, short hair, lowres"
        );
        assert_eq!(prompts.character, "1girl, blonde hair, red coat");
        Ok(())
    }

    #[test]
    fn test_build_prompts_without_presets() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let store = PresetStore::new(dir.path());

        let prompts = build_prompts(&store, "", "", NONE_PRESET, false, false, "", "");
        assert!(prompts.positive.segments.is_empty());
        assert!(prompts.negative.segments.is_empty());
        assert_eq!(prompts.character, "");
        Ok(())
    }

    #[test]
    fn test_empty_prompt_replaces_previous_text() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let store = PresetStore::new(dir.path());
        let prompts = build_prompts(&store, "", "", NONE_PRESET, false, false, "", "");

        let previous = Pipe {
            model: Some("model-a"),
            positive_text: Some("foo".to_string()),
            negative_text: Some("bar".to_string()),
            ..Default::default()
        };
        let updated = conditioned_pipe(
            &previous,
            Pipe {
                model: Some("model-b"),
                positive: Some("cond"),
                ..Default::default()
            },
            &prompts,
        );

        assert_eq!(updated.positive_text.as_deref(), Some(""));
        assert_eq!(updated.negative_text.as_deref(), Some(""));
        assert_eq!(updated.model, Some("model-b"));
        assert_eq!(updated.positive, Some("cond"));
        Ok(())
    }
}

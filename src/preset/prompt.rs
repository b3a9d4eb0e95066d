//! 预设提示词组合

use rand::{seq::IndexedRandom, Rng};

use crate::preset::types::{CharacterEntry, ModelPreset, Presets, PromptPair};

/// 选项中的 "none"
pub const NONE_PRESET: &str = "none";

/// 以 ", " 连接非空片段
pub fn join_tags<'a>(parts: impl IntoIterator<Item = &'a str>) -> String {
    parts
        .into_iter()
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(", ")
}

/// 逗号分隔的标签, 去除首尾空白与空标签
pub fn split_tags(text: &str) -> Vec<&str> {
    text.split(',')
        .map(str::trim)
        .filter(|tag| !tag.is_empty())
        .collect()
}

/// 角色标签 + 上装 + 下装 (仅在启用默认服装时)
pub fn character_prompt(
    entry: Option<&CharacterEntry>,
    use_default_outfit: bool,
    use_bottom: bool,
) -> PromptPair {
    let Some(preset) = entry.map(CharacterEntry::preset) else {
        return PromptPair::default();
    };

    let top = if use_default_outfit { preset.top.as_str() } else { "" };
    let bottom = if use_default_outfit && use_bottom {
        preset.bottom.as_str()
    } else {
        ""
    };

    PromptPair {
        positive: join_tags([preset.character.as_str(), top, bottom]),
        negative: preset.neg,
    }
}

/// 标签替换结果
#[derive(Debug, Default, Clone, PartialEq)]
pub struct TagReplacement {
    /// 未匹配的标签
    pub prompt: String,
    pub character_pos: String,
    pub character_neg: String,
    /// 最后一个匹配的角色名
    pub matched: Option<String>,
}

/// 将名称为角色的标签替换为角色预设
///
/// "top" / "bottom" 标签启用对应服装, 自身不进入输出
pub fn replace_tags(input: &str, characters: &Presets<CharacterEntry>) -> TagReplacement {
    let tags = split_tags(input);
    let include_top = tags.contains(&"top");
    let include_bottom = tags.contains(&"bottom");

    let mut result = TagReplacement::default();
    let mut prompt = Vec::new();
    let mut positive: Vec<String> = Vec::new();
    let mut negative: Vec<String> = Vec::new();

    for tag in tags {
        if let Some(entry) = characters.get(tag) {
            result.matched = Some(tag.to_string());
            match entry {
                CharacterEntry::Preset(preset) => {
                    positive.push(preset.character.clone());
                    negative.push(preset.neg.clone());
                    if include_top {
                        positive.push(preset.top.clone());
                    }
                    if include_bottom {
                        positive.push(preset.bottom.clone());
                    }
                }
                CharacterEntry::Tags(tags) => positive.push(tags.clone()),
            }
        } else if tag != "top" && tag != "bottom" {
            prompt.push(tag);
        }
    }

    result.prompt = join_tags(prompt);
    result.character_pos = join_tags(positive.iter().map(String::as_str));
    result.character_neg = join_tags(negative.iter().map(String::as_str));
    result
}

/// 按检查点文件名, 其次按系列 (首个路径段) 查找模型预设
pub fn model_prompt(
    ckpt_name: &str,
    models: &Presets<ModelPreset>,
    quality_tags: bool,
    embeddings: bool,
) -> PromptPair {
    if ckpt_name.is_empty() {
        return PromptPair::default();
    }

    let mut segments = ckpt_name.split(['/', '\\']);
    let family = segments.next().unwrap_or_default();
    let model = ckpt_name.rsplit(['/', '\\']).next().unwrap_or_default();

    let Some(preset) = models.get(model).or_else(|| models.get(family)) else {
        return PromptPair::default();
    };

    let pick = |pair: &PromptPair, enabled: bool| -> (String, String) {
        if enabled {
            (pair.positive.clone(), pair.negative.clone())
        } else {
            Default::default()
        }
    };
    let (quality_pos, quality_neg) = pick(&preset.quality, quality_tags);
    let (embedding_pos, embedding_neg) = pick(&preset.embeddings, embeddings);

    PromptPair {
        positive: join_tags([quality_pos.as_str(), embedding_pos.as_str()]),
        negative: join_tags([quality_neg.as_str(), embedding_neg.as_str()]),
    }
}

pub fn style_prompt(style: &str, styles: &Presets<PromptPair>) -> PromptPair {
    if style == NONE_PRESET {
        return PromptPair::default();
    }
    styles.get(style).cloned().unwrap_or_default()
}

/// 触发标签 (忽略大小写) 出现在输入中时追加对应提示词
pub fn tag_prompt(text: &str, tags: &Presets<PromptPair>) -> PromptPair {
    let lower = text.to_lowercase();
    let input = split_tags(&lower);
    if input.is_empty() {
        return PromptPair::default();
    }

    let matched = tags
        .iter()
        .filter(|(trigger, _)| input.contains(&trigger.to_lowercase().as_str()))
        .map(|(_, preset)| preset)
        .collect::<Vec<_>>();

    PromptPair {
        positive: join_tags(matched.iter().map(|p| p.positive.as_str())),
        negative: join_tags(matched.iter().map(|p| p.negative.as_str())),
    }
}

/// 文本中出现的每个通配符键替换为其 `|` 分隔选项中的随机一项
///
/// 同一个键的所有出现使用同一个选项; opt_string 以 ", " 追加
pub fn replace_wildcards<R: Rng + ?Sized>(
    text: &str,
    opt_string: &str,
    wildcards: &Presets<String>,
    rng: &mut R,
) -> String {
    if text.is_empty() {
        return opt_string.to_string();
    }

    let mut result = text.to_string();
    for (key, options) in wildcards.iter() {
        if key.is_empty() || !result.contains(key) {
            continue;
        }
        let options = options.split('|').map(str::trim).collect::<Vec<_>>();
        if let Some(choice) = options.choose(rng) {
            result = result.replace(key, choice);
        }
    }

    if opt_string.is_empty() {
        result
    } else {
        format!("{result}, {opt_string}")
    }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    use super::*;
    use crate::preset::types::CharacterPreset;

    fn characters() -> Presets<CharacterEntry> {
        [
            (
                "alice".to_string(),
                CharacterEntry::Preset(CharacterPreset {
                    character: "1girl, blonde hair".to_string(),
                    top: "white shirt".to_string(),
                    bottom: "black skirt".to_string(),
                    neg: "short hair".to_string(),
                }),
            ),
            (
                "bob".to_string(),
                CharacterEntry::Tags("1boy, beard".to_string()),
            ),
        ]
        .into_iter()
        .collect()
    }

    #[test]
    fn test_character_prompt() -> anyhow::Result<()> {
        let characters = characters();
        let alice = characters.get("alice");

        let full = character_prompt(alice, true, true);
        assert_eq!(full.positive, "1girl, blonde hair, white shirt, black skirt");
        assert_eq!(full.negative, "short hair");

        assert_eq!(
            character_prompt(alice, true, false).positive,
            "1girl, blonde hair, white shirt"
        );
        // 未启用默认服装时忽略下装
        assert_eq!(character_prompt(alice, false, true).positive, "1girl, blonde hair");
        assert_eq!(character_prompt(None, true, true), PromptPair::default());
        Ok(())
    }

    #[test]
    fn test_replace_tags() -> anyhow::Result<()> {
        let characters = characters();

        let result = replace_tags("smile, alice,\n top, bob, outdoors", &characters);
        assert_eq!(result.prompt, "smile, outdoors");
        assert_eq!(
            result.character_pos,
            "1girl, blonde hair, white shirt, 1boy, beard"
        );
        assert_eq!(result.character_neg, "short hair");
        assert_eq!(result.matched.as_deref(), Some("bob"));

        let empty = replace_tags("  ", &characters);
        assert_eq!(empty, TagReplacement::default());
        Ok(())
    }

    #[test]
    fn test_model_prompt_lookup() -> anyhow::Result<()> {
        let pair = |p: &str, n: &str| PromptPair {
            positive: p.to_string(),
            negative: n.to_string(),
        };
        let models: Presets<ModelPreset> = [
            (
                "Pony".to_string(),
                ModelPreset {
                    quality: pair("score_9", "score_4"),
                    embeddings: pair("", "negativeXL_D"),
                },
            ),
            (
                "special.safetensors".to_string(),
                ModelPreset {
                    quality: pair("special", ""),
                    embeddings: PromptPair::default(),
                },
            ),
        ]
        .into_iter()
        .collect();

        let family = model_prompt("Pony/ponyV6.safetensors", &models, true, true);
        assert_eq!(family, pair("score_9", "score_4, negativeXL_D"));

        let quality_only = model_prompt("Pony\\ponyV6.safetensors", &models, true, false);
        assert_eq!(quality_only, pair("score_9", "score_4"));

        // 文件名优先于系列
        let exact = model_prompt("Pony/special.safetensors", &models, true, true);
        assert_eq!(exact, pair("special", ""));

        assert_eq!(model_prompt("SD15/x.ckpt", &models, true, true), PromptPair::default());
        assert_eq!(model_prompt("", &models, true, true), PromptPair::default());
        Ok(())
    }

    #[test]
    fn test_tag_prompt_case_insensitive() -> anyhow::Result<()> {
        let tags: Presets<PromptPair> = [
            (
                "T-Shirt".to_string(),
                PromptPair {
                    positive: String::new(),
                    negative: "print shirt".to_string(),
                },
            ),
            (
                "hat".to_string(),
                PromptPair {
                    positive: "detailed hat".to_string(),
                    negative: String::new(),
                },
            ),
        ]
        .into_iter()
        .collect();

        let result = tag_prompt("1girl, t-shirt, Hat", &tags);
        assert_eq!(result.positive, "detailed hat");
        assert_eq!(result.negative, "print shirt");

        // 只匹配完整标签
        assert_eq!(tag_prompt("hats", &tags), PromptPair::default());
        Ok(())
    }

    #[test]
    fn test_replace_wildcards() -> anyhow::Result<()> {
        let wildcards: Presets<String> = [
            ("__color__".to_string(), "red | green | blue".to_string()),
            ("__unused__".to_string(), "x".to_string()),
        ]
        .into_iter()
        .collect();
        let mut rng = ChaCha8Rng::seed_from_u64(42);

        let result = replace_wildcards("__color__ hair, __color__ eyes", "", &wildcards, &mut rng);
        let color = result
            .strip_suffix(" eyes")
            .and_then(|r| r.split(" hair, ").nth(1))
            .unwrap_or_default()
            .to_string();
        assert!(["red", "green", "blue"].contains(&color.as_str()));
        assert_eq!(result, format!("{color} hair, {color} eyes"));

        assert_eq!(
            replace_wildcards("smile", "extra", &wildcards, &mut rng),
            "smile, extra"
        );
        assert_eq!(replace_wildcards("", "extra", &wildcards, &mut rng), "extra");
        assert_eq!(replace_wildcards("", "", &wildcards, &mut rng), "");
        Ok(())
    }
}

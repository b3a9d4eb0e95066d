//! 预设文件结构与默认内容

use log::warn;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{json, Map, Value};
use strum_macros::{Display, EnumIter};

/// 预设文件
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter)]
pub enum PresetKind {
    #[strum(to_string = "characters.jsonc")]
    Characters,
    #[strum(to_string = "styles.jsonc")]
    Styles,
    #[strum(to_string = "models.jsonc")]
    Models,
    #[strum(to_string = "tags.jsonc")]
    Tags,
    #[strum(to_string = "wildcards.jsonc")]
    Wildcards,
}

impl PresetKind {
    pub fn file_name(&self) -> String {
        self.to_string()
    }

    /// 文件不存在时写入的默认内容
    pub fn defaults(&self) -> Map<String, Value> {
        let value = match self {
            PresetKind::Characters => json!({
                "example_character": {
                    "character": "1girl, blonde hair, blue eyes",
                    "top": "white shirt, red tie",
                    "bottom": "black skirt, white socks",
                    "neg": ""
                }
            }),
            PresetKind::Styles => json!({
                "anime": {
                    "positive": "anime style, cel shaded, vibrant colors",
                    "negative": "realistic, photorealistic"
                },
                "realistic": {
                    "positive": "photorealistic, highly detailed, 8k uhd",
                    "negative": "anime, cartoon, illustration"
                }
            }),
            PresetKind::Models => json!({
                "Pony": {
                    "quality": {
                        "positive": "score_9, score_8_up, score_7_up",
                        "negative": "score_6, score_5, score_4"
                    },
                    "embeddings": {
                        "positive": "",
                        "negative": "negativeXL_D"
                    }
                },
                "Illustrious": {
                    "quality": {
                        "positive": "masterpiece, best quality, very aesthetic",
                        "negative": "worst quality, low quality, displeasing"
                    },
                    "embeddings": {
                        "positive": "",
                        "negative": ""
                    }
                },
                "waiIllustriousSDXL_v160.safetensors": {
                    "quality": {"positive": "", "negative": ""},
                    "embeddings": {"positive": "", "negative": ""}
                }
            }),
            PresetKind::Tags => json!({
                "t-shirt": {
                    "positive": "",
                    "negative": "print shirt"
                }
            }),
            PresetKind::Wildcards => json!({
                "example": "option1 | option2 | option3"
            }),
        };

        match value {
            Value::Object(map) => map,
            _ => Map::new(),
        }
    }
}

/// 正向与反向提示词
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PromptPair {
    pub positive: String,
    pub negative: String,
}

/// 角色预设
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CharacterPreset {
    pub character: String,
    pub top: String,
    pub bottom: String,
    pub neg: String,
}

/// characters.jsonc 的条目, 字符串条目等同于仅含角色标签
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CharacterEntry {
    Preset(CharacterPreset),
    Tags(String),
}

impl CharacterEntry {
    pub fn preset(&self) -> CharacterPreset {
        match self {
            CharacterEntry::Preset(preset) => preset.clone(),
            CharacterEntry::Tags(tags) => CharacterPreset {
                character: tags.clone(),
                ..Default::default()
            },
        }
    }
}

/// 模型预设: 质量标签与嵌入
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelPreset {
    pub quality: PromptPair,
    pub embeddings: PromptPair,
}

/// 保持文件顺序的预设表
#[derive(Debug, Clone, PartialEq)]
pub struct Presets<T> {
    entries: Vec<(String, T)>,
}

impl<T> Default for Presets<T> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
        }
    }
}

impl<T: DeserializeOwned> Presets<T> {
    /// 无法解析的条目被跳过
    pub fn from_map(map: &Map<String, Value>) -> Self {
        let entries = map
            .iter()
            .filter_map(|(name, value)| match T::deserialize(value) {
                Ok(entry) => Some((name.clone(), entry)),
                Err(e) => {
                    warn!("skip preset entry {name}, {e}");
                    None
                }
            })
            .collect();
        Self { entries }
    }
}

impl<T> Presets<T> {
    pub fn get(&self, name: &str) -> Option<&T> {
        self.entries
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &T)> {
        self.entries.iter().map(|(key, value)| (key.as_str(), value))
    }

    /// 排序后的名称
    pub fn sorted_names(&self) -> Vec<String> {
        let mut names = self
            .entries
            .iter()
            .map(|(key, _)| key.clone())
            .collect::<Vec<_>>();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<T> FromIterator<(String, T)> for Presets<T> {
    fn from_iter<I: IntoIterator<Item = (String, T)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use strum::IntoEnumIterator;

    use super::*;

    #[test]
    fn test_defaults_parse() -> anyhow::Result<()> {
        for kind in PresetKind::iter() {
            assert!(!kind.defaults().is_empty(), "{kind}");
        }

        let models = Presets::<ModelPreset>::from_map(&PresetKind::Models.defaults());
        let names = models.iter().map(|(name, _)| name).collect::<Vec<_>>();
        assert_eq!(
            names,
            ["Pony", "Illustrious", "waiIllustriousSDXL_v160.safetensors"]
        );
        assert_eq!(
            models.get("Pony").map(|m| m.embeddings.negative.as_str()),
            Some("negativeXL_D")
        );
        Ok(())
    }

    #[test]
    fn test_character_entries() -> anyhow::Result<()> {
        let map = json!({
            "zed": "1boy, black hair",
            "amy": {"character": "1girl", "top": "hoodie"},
            "broken": 3
        });
        let Value::Object(map) = map else {
            anyhow::bail!("expected object");
        };

        let characters = Presets::<CharacterEntry>::from_map(&map);
        assert_eq!(characters.len(), 2);
        assert_eq!(characters.sorted_names(), ["amy", "zed"]);

        let zed = characters.get("zed").map(CharacterEntry::preset);
        assert_eq!(zed.map(|p| p.character), Some("1boy, black hair".to_string()));

        let amy = characters.get("amy").map(CharacterEntry::preset);
        assert_eq!(amy.as_ref().map(|p| p.top.as_str()), Some("hoodie"));
        assert_eq!(amy.map(|p| p.bottom), Some(String::new()));
        Ok(())
    }
}

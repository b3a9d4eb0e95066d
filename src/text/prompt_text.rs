//! 提示词文本处理

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    // <lora:name:strength> 或 <lora:name:model:clip>
    static ref LORA_TAG: Regex = Regex::new(r"(?i)<lora:[^>]+>").expect("valid lora tag pattern");
    static ref WHITESPACE: Regex = Regex::new(r"\s+").expect("valid whitespace pattern");
}

/// 删除以 `#` 开头的行, 以 `\#` 开头的行保留并去掉一次转义
pub fn strip_comment_lines(text: &str) -> String {
    text.split('\n')
        .filter_map(|line| {
            let stripped = line.trim_start();
            if stripped.starts_with("\\#") {
                Some(line.replacen("\\#", "#", 1))
            } else if stripped.starts_with('#') {
                None
            } else {
                Some(line.to_string())
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// 分离 lora 标签, 返回 (清理后的文本, 以空格连接的标签)
///
/// 清理后的文本中连续空白合并为一个空格
pub fn extract_lora_tags(text: &str) -> (String, String) {
    let tags = LORA_TAG
        .find_iter(text)
        .map(|m| m.as_str())
        .collect::<Vec<_>>()
        .join(" ");
    let cleaned = LORA_TAG.replace_all(text, "");
    let cleaned = WHITESPACE.replace_all(&cleaned, " ").trim().to_string();
    (cleaned, tags)
}

/// 多段提示词的组合结果
#[derive(Debug, Default, Clone, PartialEq)]
pub struct PromptSegments {
    /// 需要编码的非空文本, 按输入顺序
    pub segments: Vec<String>,
    /// lora 语法
    pub lora_syntax: String,
}

impl PromptSegments {
    /// 逐段去除注释与 lora 标签, 空白段跳过
    pub fn parse<'a>(inputs: impl IntoIterator<Item = &'a str>) -> Self {
        let mut segments = Vec::new();
        let mut lora_tags = Vec::new();

        for text in inputs {
            if text.trim().is_empty() {
                continue;
            }
            let (cleaned, tags) = extract_lora_tags(&strip_comment_lines(text));
            if !tags.is_empty() {
                lora_tags.push(tags);
            }
            if !cleaned.is_empty() {
                segments.push(cleaned);
            }
        }

        Self {
            segments,
            lora_syntax: lora_tags.join(" "),
        }
    }

    pub fn combined_text(&self) -> String {
        self.segments.join(", ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_comment_lines() -> anyhow::Result<()> {
        let text = "1girl\n# a comment\n   # indented comment\n  \\#hashtag \\#two\nsmile";
        assert_eq!(
            strip_comment_lines(text),
            "1girl\n  #hashtag \\#two\nsmile"
        );
        assert_eq!(strip_comment_lines(""), "");
        Ok(())
    }

    #[test]
    fn test_extract_lora_tags() -> anyhow::Result<()> {
        let (text, tags) =
            extract_lora_tags("1girl,  <lora:detail:0.8>\n smile <LORA:style:1:0.5> outdoors");
        assert_eq!(text, "1girl, smile outdoors");
        assert_eq!(tags, "<lora:detail:0.8> <LORA:style:1:0.5>");

        let (text, tags) = extract_lora_tags("<lora:only:1>");
        assert_eq!(text, "");
        assert_eq!(tags, "<lora:only:1>");
        Ok(())
    }

    #[test]
    fn test_prompt_segments() -> anyhow::Result<()> {
        let parsed = PromptSegments::parse([
            "masterpiece",
            "   ",
            "<lora:add_detail:0.5>",
            "# hidden\nred hair, <lora:hair:1>",
            "",
        ]);
        assert_eq!(parsed.segments, ["masterpiece", "red hair,"]);
        assert_eq!(parsed.combined_text(), "masterpiece, red hair,");
        assert_eq!(parsed.lora_syntax, "<lora:add_detail:0.5> <lora:hair:1>");

        assert_eq!(PromptSegments::parse([""; 5]), PromptSegments::default());
        Ok(())
    }
}

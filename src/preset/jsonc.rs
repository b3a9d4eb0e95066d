//! JSONC 注释处理
//!
//! 去除 `//` 行注释与 `/* */` 块注释, 字符串内的内容保持不变

/// 去除注释, 行注释保留换行, 便于定位解析错误
pub fn strip_comments(text: &str) -> String {
    let mut output = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    let mut in_string = false;

    while let Some(c) = chars.next() {
        if in_string {
            output.push(c);
            match c {
                '\\' => {
                    if let Some(escaped) = chars.next() {
                        output.push(escaped);
                    }
                }
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }

        match (c, chars.peek()) {
            ('"', _) => {
                in_string = true;
                output.push(c);
            }
            ('/', Some('/')) => {
                for next in chars.by_ref() {
                    if next == '\n' {
                        output.push('\n');
                        break;
                    }
                }
            }
            ('/', Some('*')) => {
                chars.next();
                let mut previous = '\0';
                for next in chars.by_ref() {
                    if previous == '*' && next == '/' {
                        break;
                    }
                    previous = next;
                }
            }
            _ => output.push(c),
        }
    }

    output
}

/// 解析 JSONC 文本
pub fn parse<T: serde::de::DeserializeOwned>(text: &str) -> Result<T, serde_json::Error> {
    serde_json::from_str(&strip_comments(text))
}

#[cfg(test)]
mod tests {
    use serde_json::{json, Value};

    use super::*;

    #[test]
    fn test_strip_line_and_block_comments() -> anyhow::Result<()> {
        let text = r#"{
            // a character
            "alice": "1girl", /* inline */ "bob": "1boy"
            /* multi
               line */
        }"#;
        let value: Value = parse(text)?;
        assert_eq!(value, json!({"alice": "1girl", "bob": "1boy"}));
        Ok(())
    }

    #[test]
    fn test_comment_markers_in_strings() -> anyhow::Result<()> {
        let text = r#"{"url": "http://example.com/*x*/", "quote": "say \"//hi\""} // tail"#;
        let value: Value = parse(text)?;
        assert_eq!(value["url"], "http://example.com/*x*/");
        assert_eq!(value["quote"], "say \"//hi\"");
        Ok(())
    }

    #[test]
    fn test_unterminated_block_comment() -> anyhow::Result<()> {
        assert_eq!(strip_comments("{} /* open"), "{} ");
        assert_eq!(strip_comments("a // b\nc"), "a \nc");
        Ok(())
    }
}

use serde_yaml::{Mapping, Value};

use crate::error::{KbError, Result};

const DELIMITER: &str = "---";

/// A markdown document: an optional YAML metadata block followed by the body.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Document {
    pub metadata: Mapping,
    pub content: String,
}

impl Document {
    pub fn new(content: impl Into<String>, metadata: Mapping) -> Self {
        Self {
            metadata,
            content: content.into(),
        }
    }

    /// Parses raw file text. `path` is only used for error messages.
    pub fn parse(text: &str, path: &str) -> Result<Self> {
        let Some((block, body)) = split_block(text) else {
            return Ok(Self::new(text, Mapping::new()));
        };
        if block.trim().is_empty() {
            return Ok(Self::new(body, Mapping::new()));
        }

        let value: Value = serde_yaml::from_str(block).map_err(|source| KbError::Frontmatter {
            path: path.to_string(),
            source,
        })?;

        let metadata = match value {
            Value::Null => Mapping::new(),
            Value::Mapping(m) => m,
            _ => return Err(KbError::FrontmatterNotMapping(path.to_string())),
        };

        Ok(Self::new(body, metadata))
    }

    pub fn render(&self) -> Result<String> {
        if self.metadata.is_empty() {
            // A body that itself looks like a metadata block needs an empty one in front.
            if split_block(&self.content).is_some() {
                return Ok(format!("{DELIMITER}\n{DELIMITER}\n\n{}", self.content));
            }
            return Ok(self.content.clone());
        }

        let yaml = serde_yaml::to_string(&self.metadata).map_err(|source| KbError::Frontmatter {
            path: String::new(),
            source,
        })?;
        Ok(format!("{DELIMITER}\n{yaml}{DELIMITER}\n\n{}", self.content))
    }

    /// Shallow merge: each incoming key overwrites the existing value.
    pub fn merge_metadata(&mut self, incoming: Mapping) {
        for (key, value) in incoming {
            self.metadata.insert(key, value);
        }
    }
}

/// Splits `text` into (yaml block, body) if it opens with a delimiter line
/// that is later closed.
fn split_block(text: &str) -> Option<(&str, &str)> {
    let rest = text
        .strip_prefix("---\n")
        .or_else(|| text.strip_prefix("---\r\n"))?;

    let mut offset = 0;
    for line in rest.split_inclusive('\n') {
        if line.trim_end_matches('\n').trim_end_matches('\r') == DELIMITER {
            let block = &rest[..offset];
            let body = &rest[offset + line.len()..];
            let body = body
                .strip_prefix("\r\n")
                .or_else(|| body.strip_prefix('\n'))
                .unwrap_or(body);
            return Some((block, body));
        }
        offset += line.len();
    }
    None
}

/// Converts a JSON object (as received from tool arguments) into a YAML mapping.
pub fn mapping_from_json(
    map: serde_json::Map<String, serde_json::Value>,
) -> std::result::Result<Mapping, serde_yaml::Error> {
    match serde_yaml::to_value(serde_json::Value::Object(map))? {
        Value::Mapping(m) => Ok(m),
        _ => Ok(Mapping::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(pairs: &[(&str, &str)]) -> Mapping {
        pairs
            .iter()
            .map(|(k, v)| (Value::from(*k), Value::from(*v)))
            .collect()
    }

    #[test]
    fn test_parse_without_block() -> Result<()> {
        let doc = Document::parse("Hello world", "a.md")?;
        assert!(doc.metadata.is_empty());
        assert_eq!(doc.content, "Hello world");
        Ok(())
    }

    #[test]
    fn test_render_then_parse() -> Result<()> {
        let doc = Document::new("Hello world", meta(&[("type", "note")]));
        let text = doc.render()?;
        assert!(text.starts_with("---\ntype: note\n---\n\n"));
        assert_eq!(Document::parse(&text, "a.md")?, doc);
        Ok(())
    }

    #[test]
    fn test_body_that_looks_like_frontmatter() -> Result<()> {
        let doc = Document::new("---\ntitle: fake\n---\nbody", Mapping::new());
        let text = doc.render()?;
        let parsed = Document::parse(&text, "a.md")?;
        assert!(parsed.metadata.is_empty());
        assert_eq!(parsed.content, doc.content);
        Ok(())
    }

    #[test]
    fn test_crlf_and_nested_metadata() -> Result<()> {
        let text = "---\r\ntags:\r\n  - a\r\n  - b\r\nauthor:\r\n  name: x\r\n---\r\n\r\nbody\r\n";
        let doc = Document::parse(text, "a.md")?;
        assert_eq!(doc.content, "body\r\n");
        assert!(doc.metadata.get("tags").is_some_and(Value::is_sequence));
        assert!(doc.metadata.get("author").is_some_and(Value::is_mapping));
        Ok(())
    }

    #[test]
    fn test_unclosed_block_is_body() -> Result<()> {
        let doc = Document::parse("---\nnot closed", "a.md")?;
        assert!(doc.metadata.is_empty());
        assert_eq!(doc.content, "---\nnot closed");
        Ok(())
    }

    #[test]
    fn test_empty_block_and_bad_blocks() {
        let doc = Document::parse("---\n---\nbody", "a.md").unwrap();
        assert!(doc.metadata.is_empty());
        assert_eq!(doc.content, "body");

        assert!(matches!(
            Document::parse("---\n- 1\n- 2\n---\nbody", "a.md"),
            Err(KbError::FrontmatterNotMapping(_))
        ));
        assert!(matches!(
            Document::parse("---\nkey: [unclosed\n---\nbody", "a.md"),
            Err(KbError::Frontmatter { .. })
        ));
    }

    #[test]
    fn test_merge_is_shallow() {
        let mut doc = Document::parse("---\na: 1\nnested:\n  x: 1\n  y: 2\n---\n", "a.md").unwrap();
        let incoming: Mapping = serde_yaml::from_str("nested:\n  x: 3\nb: 2").unwrap();
        doc.merge_metadata(incoming);

        assert_eq!(doc.metadata.get("a"), Some(&Value::from(1)));
        assert_eq!(doc.metadata.get("b"), Some(&Value::from(2)));
        let nested = doc.metadata.get("nested").and_then(Value::as_mapping).unwrap();
        assert_eq!(nested.len(), 1);
    }

    #[test]
    fn test_mapping_from_json() {
        let json = serde_json::json!({"type": "note", "tags": ["a"], "n": 3});
        let serde_json::Value::Object(map) = json else { unreachable!() };
        let mapping = mapping_from_json(map).unwrap();
        assert_eq!(mapping.get("type"), Some(&Value::from("note")));
        assert_eq!(mapping.get("n"), Some(&Value::from(3)));
    }
}

//! YAML frontmatter extraction.
//!
//! A note may open with a block delimited by `---` lines. Anything that does not
//! parse as a YAML mapping is treated as ordinary body text starting at offset 0.

use serde_yaml::Value;
use tracing::debug;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Frontmatter {
    pub title: Option<String>,
    pub note_type: Option<String>,
    pub tags: Vec<String>,
    pub created: Option<String>,
    pub modified: Option<String>,
}

/// A note split into its frontmatter and body.
#[derive(Debug, Clone)]
pub struct ParsedNote<'a> {
    pub frontmatter: Option<Frontmatter>,
    pub body: &'a str,
    /// Byte offset of `body` inside the original text.
    pub body_offset: usize,
}

pub fn parse_note(text: &str) -> ParsedNote<'_> {
    match split_block(text) {
        Some((yaml, body_offset)) => match parse_yaml(yaml) {
            Some(frontmatter) => ParsedNote {
                frontmatter: Some(frontmatter),
                body: &text[body_offset..],
                body_offset,
            },
            None => {
                debug!("frontmatter did not parse, treating note as body");
                ParsedNote { frontmatter: None, body: text, body_offset: 0 }
            }
        },
        None => ParsedNote { frontmatter: None, body: text, body_offset: 0 },
    }
}

/// Locate the YAML block. Returns the YAML text and the byte offset where the body begins.
fn split_block(text: &str) -> Option<(&str, usize)> {
    let start = if text.starts_with('\u{feff}') { '\u{feff}'.len_utf8() } else { 0 };
    let rest = &text[start..];
    let first_line_end = rest.find('\n')?;
    if rest[..first_line_end].trim_end() != "---" {
        return None;
    }
    let yaml_start = start + first_line_end + 1;
    let mut pos = yaml_start;
    while pos <= text.len() {
        let line_end = text[pos..].find('\n').map_or(text.len(), |i| pos + i);
        let line = text[pos..line_end].trim_end();
        if line == "---" || line == "..." {
            let body_offset = if line_end < text.len() { line_end + 1 } else { line_end };
            return Some((&text[yaml_start..pos], body_offset));
        }
        if line_end >= text.len() {
            break;
        }
        pos = line_end + 1;
    }
    None
}

fn parse_yaml(yaml: &str) -> Option<Frontmatter> {
    if yaml.trim().is_empty() {
        return Some(Frontmatter::default());
    }
    let value: Value = serde_yaml::from_str(yaml).ok()?;
    let mapping = value.as_mapping()?;
    let field = |key: &str| mapping.get(Value::String(key.to_string())).and_then(scalar_string);
    let tags = mapping
        .get(Value::String("tags".to_string()))
        .map(tag_list)
        .unwrap_or_default();
    Some(Frontmatter {
        title: field("title"),
        note_type: field("type"),
        tags,
        created: field("created"),
        modified: field("modified"),
    })
}

fn scalar_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.trim().to_string()).filter(|s| !s.is_empty()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Tags may be a YAML list or a comma/space separated string; a leading `#` is dropped.
fn tag_list(value: &Value) -> Vec<String> {
    let raw: Vec<String> = match value {
        Value::Sequence(items) => items.iter().filter_map(scalar_string).collect(),
        Value::String(s) => s
            .split(|c: char| c == ',' || c.is_whitespace())
            .map(str::to_string)
            .collect(),
        _ => Vec::new(),
    };
    raw.into_iter()
        .map(|t| t.trim().trim_start_matches('#').to_string())
        .filter(|t| !t.is_empty())
        .collect()
}

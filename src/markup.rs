//! Scraping structured fields out of LLM answers
//!
//! Prompts ask the model to wrap each field in an XML-like tag
//! (`<python>…</python>`, `<Conclusion>…</Conclusion>`, …) or to answer with a
//! bare JSON object. Models do not reliably produce well-formed XML: code
//! fields contain `<` characters, wrappers are sometimes missing, and
//! reasoning models prepend a `<think>` block. The scanner here is lenient and
//! never fails; absent fields simply do not appear in the result.

use once_cell::sync::Lazy;
use regex::Regex;
use std::borrow::Cow;
use std::collections::BTreeMap;

static OPEN_TAG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<[A-Za-z_][A-Za-z0-9_]*>").expect("valid open tag regex"));

static THINK_BLOCK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)<think>.*?</think>").expect("valid think regex"));

static PYTHON_FENCE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)```(?:python|py)[ \t]*\r?\n(.*?)```").expect("valid fence regex")
});

/// Tag name -> trimmed text content
pub type TagMap = BTreeMap<String, String>;

/// A closed element found in a piece of text
#[derive(Debug, Clone, Copy)]
struct Element<'a> {
    name: &'a str,
    inner: &'a str,
    start: usize,
    end: usize,
}

/// Remove `<think>…</think>` reasoning blocks
pub fn strip_think(text: &str) -> Cow<'_, str> {
    THINK_BLOCK.replace_all(text, "")
}

/// Flatten an XML-like answer into a tag map.
///
/// Elements whose content consists only of other elements (such as a `<root>`
/// wrapper) are descended into; every other element is a leaf whose trimmed
/// content is recorded verbatim. When a tag appears twice the first one wins.
pub fn extract_tags(text: &str) -> TagMap {
    let cleaned = strip_think(text);
    let mut tags = TagMap::new();
    collect_tags(&cleaned, &mut tags);
    tags
}

fn collect_tags(text: &str, tags: &mut TagMap) {
    for element in scan_elements(text) {
        let children = scan_elements(element.inner);
        if is_container(element.inner, &children) {
            collect_tags(element.inner, tags);
        } else {
            tags.entry(element.name.to_string())
                .or_insert_with(|| element.inner.trim().to_string());
        }
    }
}

fn scan_elements(text: &str) -> Vec<Element<'_>> {
    let mut elements = Vec::new();
    let mut pos = 0;

    while let Some(open) = OPEN_TAG.find_at(text, pos) {
        let tag = open.as_str();
        let name = &tag[1..tag.len() - 1];
        let close = format!("</{name}>");
        let content_start = open.end();

        match text[content_start..].find(&close) {
            Some(offset) => {
                let content_end = content_start + offset;
                let end = content_end + close.len();
                elements.push(Element {
                    name,
                    inner: &text[content_start..content_end],
                    start: open.start(),
                    end,
                });
                pos = end;
            }
            // Unclosed tag: skip it and keep scanning after it
            None => pos = content_start,
        }
    }

    elements
}

fn is_container(inner: &str, children: &[Element<'_>]) -> bool {
    if children.is_empty() {
        return false;
    }

    let mut cursor = 0;
    for child in children {
        if !inner[cursor..child.start].trim().is_empty() {
            return false;
        }
        cursor = child.end;
    }
    inner[cursor..].trim().is_empty()
}

/// `true` when a field is empty or the literal placeholder `NULL`
pub fn is_null(value: &str) -> bool {
    let trimmed = value.trim();
    trimmed.is_empty() || trimmed.eq_ignore_ascii_case("null")
}

/// Look up a tag, treating `NULL` placeholders as absent
pub fn field<'a>(tags: &'a TagMap, name: &str) -> Option<&'a str> {
    tags.get(name).map(String::as_str).filter(|v| !is_null(v))
}

/// Look up a tag under any of several spellings (models vary capitalisation)
pub fn field_any<'a>(tags: &'a TagMap, names: &[&str]) -> Option<&'a str> {
    names.iter().find_map(|name| field(tags, name))
}

/// Pull a Python program out of an answer: `<python>` tag first, then a
/// fenced ```` ```python ```` block.
pub fn extract_python(text: &str) -> Option<String> {
    let tags = extract_tags(text);
    if let Some(code) = field(&tags, "python") {
        return Some(strip_fence(code).to_string());
    }

    let cleaned = strip_think(text);
    PYTHON_FENCE
        .captures(&cleaned)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|code| !code.is_empty())
}

/// Models occasionally fence the code inside the `<python>` tag as well
fn strip_fence(code: &str) -> &str {
    let trimmed = code.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let body = match rest.find('\n') {
        Some(newline) => &rest[newline + 1..],
        None => return trimmed,
    };
    body.strip_suffix("```").unwrap_or(body).trim()
}

/// Parse the first top-level JSON object in an answer (from the first `{` to
/// the last `}`), ignoring think blocks and code fences around it.
pub fn extract_json_object(text: &str) -> Option<serde_json::Value> {
    let cleaned = strip_think(text);
    let start = cleaned.find('{')?;
    let end = cleaned.rfind('}')?;
    if end <= start {
        return None;
    }

    serde_json::from_str::<serde_json::Value>(&cleaned[start..=end])
        .ok()
        .filter(serde_json::Value::is_object)
}

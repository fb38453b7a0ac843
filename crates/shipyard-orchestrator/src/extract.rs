//! Pulling task lists out of free-form engine output.
//!
//! Engine answers are asked to wrap each task in `<task>...</task>` and the
//! project summary in `<context>...</context>`. How well the engine follows
//! that is outside our control; an empty list is a legitimate "no new work".

use regex::Regex;
use std::collections::HashMap;
use std::sync::{LazyLock, Mutex};

/// Descriptions this short are noise ("-", "TBD", ...).
const MIN_TASK_LEN: usize = 6;

/// Turns engine output into an ordered list of task descriptions.
pub trait TaskExtractor: Send + Sync {
    /// Task descriptions in the order they appear. Empty means no new work.
    fn extract_tasks(&self, text: &str) -> Vec<String>;

    /// The project summary, if the output carries one.
    fn extract_context(&self, _text: &str) -> Option<String> {
        None
    }
}

/// Reads `<task>` and `<context>` tags.
#[derive(Debug, Clone, Default)]
pub struct TagExtractor;

impl TaskExtractor for TagExtractor {
    fn extract_tasks(&self, text: &str) -> Vec<String> {
        extract_all(text, "task")
            .into_iter()
            .filter(|d| d.len() >= MIN_TASK_LEN)
            .collect()
    }

    fn extract_context(&self, text: &str) -> Option<String> {
        extract_tag(text, "context").filter(|c| !c.is_empty())
    }
}

/// Compiled `<tag>...</tag>` patterns, keyed by tag name.
static TAG_PATTERNS: LazyLock<Mutex<HashMap<String, Regex>>> =
    LazyLock::new(|| Mutex::new(HashMap::new()));

static LIST_ITEM: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"^\s*(?:[-*+]|\d+[.)])\s+(?:\[[ xX]\]\s+)?(.+?)\s*$").ok()
});

fn tag_regex(tag: &str) -> Option<Regex> {
    let mut patterns = TAG_PATTERNS.lock().unwrap_or_else(|e| e.into_inner());
    if let Some(re) = patterns.get(tag) {
        return Some(re.clone());
    }
    let escaped = regex::escape(tag);
    let re = Regex::new(&format!(r"(?s)<{escaped}>(.*?)</{escaped}>")).ok()?;
    patterns.insert(tag.to_string(), re.clone());
    Some(re)
}

/// Trimmed contents of the first `<tag>...</tag>`.
pub fn extract_tag(text: &str, tag: &str) -> Option<String> {
    let re = tag_regex(tag)?;
    re.captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
}

/// Trimmed, non-empty contents of every `<tag>...</tag>`.
pub fn extract_all(text: &str, tag: &str) -> Vec<String> {
    let Some(re) = tag_regex(tag) else {
        return Vec::new();
    };
    re.captures_iter(text)
        .filter_map(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Markdown list items (`- `, `* `, `+ `, `1. `, `1) `), checkboxes stripped.
pub fn extract_list_items(text: &str) -> Vec<String> {
    let Some(re) = LIST_ITEM.as_ref() else {
        return Vec::new();
    };
    text.lines()
        .filter_map(|line| re.captures(line))
        .filter_map(|c| c.get(1))
        .map(|m| m.as_str().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

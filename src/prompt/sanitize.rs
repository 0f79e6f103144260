use once_cell::sync::Lazy;
use regex::Regex;

use crate::utils::text::collapse_whitespace;

static LEADING_LABEL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^prompts?\b\s*[:=-]*\s*").expect("valid label regex"));

/// Trims, drops any leading `prompt:` style labels and collapses whitespace.
pub fn sanitize_prompt(text: &str) -> String {
    let mut current = text.trim();
    while let Some(found) = LEADING_LABEL.find(current) {
        current = current[found.end()..].trim_start();
    }
    collapse_whitespace(current)
}

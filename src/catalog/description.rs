//! Rule description cleanup.

use once_cell::sync::Lazy;
use regex::Regex;

/// Longest description kept before truncation, in characters.
pub const MAX_DESCRIPTION_LENGTH: usize = 500;

/// How far back from the cut point to look for a word boundary.
const WORD_BOUNDARY_WINDOW: usize = 40;

static RULE_TAG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"\{%\s*rule\s+"?([^"%]+?)"?\s*%\}"#).expect("valid rule tag regex"));

static MARKDOWN_LINK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[([^\]]*)\]\([^)]*\)").expect("valid link regex"));

static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid whitespace regex"));

/// Normalize a rule description: documentation links and rule tags become
/// plain text, whitespace is collapsed, and long text is truncated with a
/// pointer to the external documentation.
pub fn normalize(description: &str, external_info_url: Option<&str>) -> String {
    let text = RULE_TAG.replace_all(description, "$1");
    let text = MARKDOWN_LINK.replace_all(&text, "$1");
    let text = WHITESPACE.replace_all(&text, " ");
    let text = text.trim();

    if text.chars().count() <= MAX_DESCRIPTION_LENGTH {
        return text.to_string();
    }

    let mut truncated = truncate_at_word(text, MAX_DESCRIPTION_LENGTH).to_string();
    match external_info_url {
        Some(url) if !url.is_empty() => {
            truncated.push_str("... Read more: ");
            truncated.push_str(url);
        }
        _ => truncated.push_str("..."),
    }
    truncated
}

/// Cut `text` to at most `max` characters, backing up to the last space
/// within the final few characters when there is one.
fn truncate_at_word(text: &str, max: usize) -> &str {
    let cut = text
        .char_indices()
        .nth(max)
        .map(|(i, _)| i)
        .unwrap_or(text.len());
    let head = &text[..cut];

    let window_start = head
        .char_indices()
        .nth(max.saturating_sub(WORD_BOUNDARY_WINDOW))
        .map(|(i, _)| i)
        .unwrap_or(0);
    match head[window_start..].rfind(' ') {
        Some(space) => head[..window_start + space].trim_end(),
        None => head,
    }
}

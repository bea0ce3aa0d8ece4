use once_cell::sync::Lazy;
use regex::Regex;

static HTML_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]*>").expect("valid tag regex"));

static STRUCTURAL_TAG: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)^<(?:/?(?:table|thead|tbody|tr|td|th|h[1-6]|ul|ol|li|div|p|section|blockquote|pre|figure|hr)\b|!--)",
    )
    .expect("valid structural-tag regex")
});

pub fn normalize_line_endings(text: &str) -> String {
    text.replace("\r\n", "\n").replace('\r', "\n")
}

/// True when `text` opens with a block-level HTML tag, i.e. it is already converted.
pub fn starts_with_structural_tag(text: &str) -> bool {
    STRUCTURAL_TAG.is_match(text.trim_start())
}

pub fn strip_html_tags(text: &str) -> String {
    HTML_TAG.replace_all(text, "").into_owned()
}

/// Character count, not bytes, so CJK text is measured fairly.
pub fn char_count(text: &str) -> usize {
    text.chars().count()
}

pub fn count_case_insensitive(haystack: &str, needle: &str) -> usize {
    if needle.is_empty() {
        return 0;
    }
    haystack
        .to_lowercase()
        .matches(&needle.to_lowercase())
        .count()
}

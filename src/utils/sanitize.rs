use regex::Regex;
use std::sync::LazyLock;

static TAG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]*>").expect("valid tag regex"));

/// Sanitize HTML chapter content with ammonia
pub fn sanitize_html(text: &str) -> String {
    ammonia::clean(text)
}

/// Remove all markup, leaving the text
pub fn strip_tags(text: &str) -> String {
    TAG_RE.replace_all(text, " ").into_owned()
}

/// Count whitespace-separated words with markup removed
pub fn word_count(text: &str) -> i64 {
    strip_tags(text).split_whitespace().count() as i64
}

/// Truncate text to at most `max_chars` characters
pub fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        let cut: String = text.chars().take(max_chars.saturating_sub(3)).collect();
        format!("{cut}...")
    }
}

// Validation utilities
use crate::error::{Error, Result};
use regex::Regex;
use std::sync::LazyLock;
use tracing::warn;
use url::Url;

static USERNAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_-]{3,32}$").expect("valid username regex"));

pub const MAX_TITLE_LEN: usize = 200;
pub const MAX_DESCRIPTION_LEN: usize = 5000;
pub const MAX_CHAPTER_CONTENT_LEN: usize = 500_000;
pub const MAX_AUTHOR_NOTE_LEN: usize = 2000;
pub const MAX_COMMENT_LEN: usize = 2000;
pub const MAX_REVIEW_LEN: usize = 5000;
pub const MAX_TAGS: usize = 10;
pub const MAX_TAG_LEN: usize = 32;
pub const MAX_BIO_LEN: usize = 2000;
const MAX_URL_LEN: usize = 2048;

/// Require `value` to have between `min` and `max` characters
pub fn validate_length(field: &str, value: &str, min: usize, max: usize) -> Result<()> {
    let len = value.chars().count();
    if len < min {
        return Err(if min == 1 {
            Error::Validation(format!("{field} must not be empty"))
        } else {
            Error::Validation(format!("{field} must be at least {min} characters"))
        });
    }
    if len > max {
        return Err(Error::Validation(format!(
            "{field} must be at most {max} characters"
        )));
    }
    Ok(())
}

/// Trimmed, non-empty text no longer than `max` characters
pub fn required_text(field: &str, value: &str, max: usize) -> Result<String> {
    let trimmed = value.trim();
    validate_length(field, trimmed, 1, max)?;
    Ok(trimmed.to_string())
}

/// Optional text; blank becomes `None`
pub fn optional_text(field: &str, value: Option<&str>, max: usize) -> Result<Option<String>> {
    match value.map(str::trim).filter(|v| !v.is_empty()) {
        Some(v) => {
            validate_length(field, v, 0, max)?;
            Ok(Some(v.to_string()))
        }
        None => Ok(None),
    }
}

pub fn validate_username(username: &str) -> Result<()> {
    if !USERNAME_RE.is_match(username) {
        return Err(Error::Validation(
            "Username must be 3-32 characters of letters, digits, '_' or '-'".to_string(),
        ));
    }
    Ok(())
}

pub fn validate_email(email: &str) -> Result<()> {
    let email = email.trim();
    let valid = email.len() <= 254
        && email
            .split_once('@')
            .map(|(local, domain)| !local.is_empty() && domain.contains('.'))
            .unwrap_or(false);
    if !valid {
        return Err(Error::Validation("Invalid email address".to_string()));
    }
    Ok(())
}

/// Normalize story tags: trimmed, lowercased, deduplicated
pub fn normalize_tags(tags: &[String]) -> Result<Vec<String>> {
    let mut normalized: Vec<String> = Vec::new();
    for tag in tags {
        let tag = tag.trim().to_lowercase();
        if tag.is_empty() {
            continue;
        }
        validate_length("Tag", &tag, 1, MAX_TAG_LEN)?;
        if !normalized.contains(&tag) {
            normalized.push(tag);
        }
    }
    if normalized.len() > MAX_TAGS {
        return Err(Error::Validation(format!(
            "A story can have at most {MAX_TAGS} tags"
        )));
    }
    Ok(normalized)
}

/// Validate an image URL is http(s) with a host
pub fn validate_image_url(url_str: &str) -> Result<Url> {
    if url_str.len() > MAX_URL_LEN {
        return Err(Error::Validation("URL is too long".to_string()));
    }

    let url = Url::parse(url_str)?;

    match url.scheme() {
        "http" | "https" => {}
        other => {
            warn!("Rejected image URL with scheme {}", other);
            return Err(Error::Validation(format!(
                "URL must use http or https scheme: {url_str}"
            )));
        }
    }

    if url.host_str().is_none() {
        return Err(Error::Validation("URL must have a valid host".to_string()));
    }

    Ok(url)
}

/// Review rating must be 1..=5
pub fn validate_rating(rating: i64) -> Result<()> {
    if !(1..=5).contains(&rating) {
        return Err(Error::Validation(
            "Rating must be between 1 and 5".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_username() {
        assert!(validate_username("reader_01").is_ok());
        assert!(validate_username("a-b").is_ok());
        assert!(validate_username("ab").is_err());
        assert!(validate_username("has space").is_err());
        assert!(validate_username(&"x".repeat(33)).is_err());
    }

    #[test]
    fn test_required_text() {
        assert_eq!(required_text("Title", "  Dawn  ", 200).unwrap(), "Dawn");
        assert!(required_text("Title", "   ", 200).is_err());
        assert!(required_text("Title", &"a".repeat(201), 200).is_err());
        assert_eq!(optional_text("Note", Some("  "), 10).unwrap(), None);
    }

    #[test]
    fn test_normalize_tags() {
        let tags = vec!["Fantasy".to_string(), "fantasy ".to_string(), "".to_string()];
        assert_eq!(normalize_tags(&tags).unwrap(), vec!["fantasy".to_string()]);

        let many: Vec<String> = (0..11).map(|i| format!("tag{i}")).collect();
        assert!(normalize_tags(&many).is_err());
        assert!(normalize_tags(&["x".repeat(33)]).is_err());
    }

    #[test]
    fn test_validate_image_url() {
        assert!(validate_image_url("https://example.com/cover.png").is_ok());
        assert!(validate_image_url("javascript:alert(1)").is_err());
        assert!(validate_image_url("not-a-url").is_err());
    }

    #[test]
    fn test_validate_email_and_rating() {
        assert!(validate_email("reader@example.com").is_ok());
        assert!(validate_email("nope").is_err());
        assert!(validate_rating(5).is_ok());
        assert!(validate_rating(0).is_err());
        assert!(validate_rating(6).is_err());
    }
}

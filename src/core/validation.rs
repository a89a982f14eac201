//! URL validation for incoming messages
//!
//! Any plain-text message is treated as a candidate media link. Extraction
//! finds the first http(s) URL in the text; validation then checks scheme,
//! host and length before a session is created.

use once_cell::sync::Lazy;
use regex::Regex;
use url::Url;

use crate::core::error::{AppError, AppResult};

/// Longest URL accepted from a message.
pub const MAX_URL_LENGTH: usize = 2048;

static URL_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"https?://[^\s]+").expect("Failed to compile URL regex"));

/// Extracts the first http(s) URL from a message text, if any.
///
/// # Examples
/// ```
/// use tugboat::core::validation::extract_url;
///
/// assert_eq!(
///     extract_url("check this https://youtu.be/abc out"),
///     Some("https://youtu.be/abc")
/// );
/// assert_eq!(extract_url("hello there"), None);
/// ```
pub fn extract_url(text: &str) -> Option<&str> {
    URL_REGEX.find(text).map(|m| m.as_str())
}

/// Validates a candidate URL.
///
/// Accepts only parseable http(s) URLs with a host, capped at
/// [`MAX_URL_LENGTH`] characters.
pub fn validate_url(raw: &str) -> AppResult<Url> {
    if raw.len() > MAX_URL_LENGTH {
        return Err(AppError::Validation(format!(
            "URL is longer than {} characters",
            MAX_URL_LENGTH
        )));
    }

    let url = Url::parse(raw)?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(AppError::Validation(format!(
            "unsupported URL scheme: {}",
            url.scheme()
        )));
    }

    if url.host_str().is_none() {
        return Err(AppError::Validation("URL has no host".to_string()));
    }

    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    // ==================== extract_url Tests ====================

    #[test]
    fn test_extract_url_from_surrounding_text() {
        let cases = vec![
            ("https://example.com/v", Some("https://example.com/v")),
            ("look: https://example.com/v please", Some("https://example.com/v")),
            ("http://plain.org/x", Some("http://plain.org/x")),
            ("two https://a.com/1 https://b.com/2", Some("https://a.com/1")),
        ];

        for (input, expected) in cases {
            assert_eq!(extract_url(input), expected, "Failed for: {}", input);
        }
    }

    #[test]
    fn test_extract_url_rejects_plain_text() {
        let cases = vec!["hello", "ftp://files.example.com", "www.example.com", ""];

        for input in cases {
            assert_eq!(extract_url(input), None, "Should find nothing in: {}", input);
        }
    }

    // ==================== validate_url Tests ====================

    #[test]
    fn test_validate_url_valid() {
        let valid = vec![
            "https://youtube.com/watch?v=dQw4w9WgXcQ",
            "https://soundcloud.com/artist/track",
            "http://example.com/media",
        ];

        for url in valid {
            assert!(validate_url(url).is_ok(), "Failed for: {}", url);
        }
    }

    #[test]
    fn test_validate_url_rejects_bad_scheme() {
        let invalid = vec!["ftp://youtube.com/v", "file:///etc/passwd", "javascript:alert(1)"];

        for url in invalid {
            assert!(validate_url(url).is_err(), "Should fail for: {}", url);
        }
    }

    #[test]
    fn test_validate_url_rejects_malformed() {
        assert!(validate_url("not a url").is_err());
        assert!(validate_url("").is_err());
    }

    #[test]
    fn test_validate_url_enforces_length_cap() {
        let long = format!("https://example.com/{}", "a".repeat(MAX_URL_LENGTH));
        let err = validate_url(&long).unwrap_err();
        assert!(err.to_string().contains("longer than"));
    }
}

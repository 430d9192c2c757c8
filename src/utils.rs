//! Utility functions for slug generation, text metrics and log hygiene.
//!
//! This module provides helper functions used throughout the pipeline:
//! - Slug derivation for article URLs
//! - Word counting and read-time estimation
//! - String truncation for logging
//! - JSON error detection for handling truncated model responses

/// Maximum length of a generated slug.
const SLUG_MAX_LEN: usize = 60;

/// Words per minute assumed when estimating read times.
const WORDS_PER_MINUTE: usize = 200;

/// Convert a title to a URL-safe slug.
///
/// Lowercases the input, maps every run of non-alphanumeric characters to a
/// single hyphen, trims leading/trailing hyphens and caps the result at 60
/// characters (re-trimming if the cut lands on a hyphen). The output is
/// stable across calls and matches `[a-z0-9-]*`.
///
/// # Examples
///
/// ```ignore
/// assert_eq!(slugify("Hello, World! 2024"), "hello-world-2024");
/// assert_eq!(slugify("  ¡Atención!  "), "atenci-n");
/// ```
pub fn slugify(title: &str) -> String {
    let mut slug = String::with_capacity(title.len());
    let mut pending_hyphen = false;
    for c in title.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_hyphen && !slug.is_empty() {
                slug.push('-');
            }
            pending_hyphen = false;
            slug.push(c.to_ascii_lowercase());
        } else {
            pending_hyphen = true;
        }
    }
    if slug.len() > SLUG_MAX_LEN {
        slug.truncate(SLUG_MAX_LEN);
    }
    while slug.ends_with('-') {
        slug.pop();
    }
    slug
}

/// Count whitespace-separated words in a text.
pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

/// Estimated read time in whole minutes at 200 words per minute, rounded up.
///
/// Zero words read in zero minutes; anything else takes at least one.
pub fn read_time_minutes(words: usize) -> usize {
    words.div_ceil(WORDS_PER_MINUTE)
}

/// Truncate a string for logging purposes.
///
/// Long strings are cut at a character boundary at or below `max` bytes,
/// with an ellipsis and byte count indicator appended.
pub fn truncate_for_log(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_string();
    }
    let mut cut = max;
    while !s.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}…(+{} bytes)", &s[..cut], s.len() - cut)
}

/// Detect if a serde_json error indicates truncated/incomplete JSON.
///
/// When a model response is cut off mid-generation, the resulting JSON fails
/// to parse with an EOF error. This identifies such cases for the one-shot
/// re-ask.
pub fn looks_truncated(e: &serde_json::Error) -> bool {
    use serde_json::error::Category;
    matches!(e.classify(), Category::Eof)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slugify_basic() {
        assert_eq!(slugify("Hello, World! 2024"), "hello-world-2024");
        assert_eq!(slugify("Hello World"), "hello-world");
        assert_eq!(slugify("Multiple   Spaces"), "multiple-spaces");
    }

    #[test]
    fn test_slugify_is_stable() {
        let title = "Trump-Xi 'situationship' takes a turn";
        assert_eq!(slugify(title), slugify(title));
        assert_eq!(slugify(title), "trump-xi-situationship-takes-a-turn");
    }

    #[test]
    fn test_slugify_charset() {
        let slug = slugify("¿Qué pasa? — El Niño & La Niña (2024)");
        assert!(slug.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-'));
        assert!(!slug.starts_with('-'));
        assert!(!slug.ends_with('-'));
    }

    #[test]
    fn test_slugify_length_cap() {
        let title = "word ".repeat(40);
        let slug = slugify(&title);
        assert!(slug.len() <= 60);
        assert!(!slug.ends_with('-'));
    }

    #[test]
    fn test_slugify_empty_and_symbols() {
        assert_eq!(slugify(""), "");
        assert_eq!(slugify("!!!"), "");
        assert_eq!(slugify("---a---"), "a");
    }

    #[test]
    fn test_word_count() {
        assert_eq!(word_count(""), 0);
        assert_eq!(word_count("one"), 1);
        assert_eq!(word_count("  spaced   out  words "), 3);
    }

    #[test]
    fn test_read_time_minutes() {
        assert_eq!(read_time_minutes(0), 0);
        assert_eq!(read_time_minutes(1), 1);
        assert_eq!(read_time_minutes(200), 1);
        assert_eq!(read_time_minutes(201), 2);
        assert_eq!(read_time_minutes(1000), 5);
    }

    #[test]
    fn test_truncate_for_log_short_string() {
        assert_eq!(truncate_for_log("Hello, world!", 100), "Hello, world!");
    }

    #[test]
    fn test_truncate_for_log_long_string() {
        let s = "a".repeat(500);
        let result = truncate_for_log(&s, 100);
        assert!(result.starts_with(&"a".repeat(100)));
        assert!(result.contains("…(+400 bytes)"));
    }

    #[test]
    fn test_truncate_for_log_multibyte_boundary() {
        let s = "ééééé";
        let result = truncate_for_log(s, 3);
        assert!(result.starts_with('é'));
    }

    #[test]
    fn test_looks_truncated() {
        let json_eof = r#"{"field": "value"#;
        let result: Result<serde_json::Value, _> = serde_json::from_str(json_eof);
        if let Err(e) = result {
            assert!(looks_truncated(&e));
        }
        let json_bad = r#"{"field": nope}"#;
        let result: Result<serde_json::Value, _> = serde_json::from_str(json_bad);
        if let Err(e) = result {
            assert!(!looks_truncated(&e));
        }
    }
}

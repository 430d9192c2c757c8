//! Full-text extraction from source article pages.
//!
//! Given a source URL, downloads the page and pulls out the main readable
//! text, filtering layout and navigation noise. Extraction is best-effort:
//! a page that yields no usable text reports `None` rather than an error,
//! and the caller records the item as skipped.

use std::time::Duration;

use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Client;
use scraper::{Html, Selector};
use tracing::{debug, instrument};

use crate::error::{PipelineError, Result};

/// Containers tried in priority order when hunting for body text.
const CONTAINER_SELECTORS: &[&str] = &["article", "main", "[role=\"main\"]", "body"];

/// Paragraphs shorter than this are treated as furniture (bylines, captions,
/// section labels) and dropped.
const MIN_PARAGRAPH_CHARS: usize = 25;

/// Boilerplate is only filtered below this length so a legitimate paragraph
/// that merely mentions cookies or subscriptions is kept.
const BOILERPLATE_MAX_CHARS: usize = 200;

static BOILERPLATE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)(cookie|subscribe|newsletter|sign up|sign in|advertis|all rights reserved|privacy policy|terms of (use|service)|follow us|share this|related articles)",
    )
    .unwrap()
});

const EXTRACT_USER_AGENT: &str = concat!("lingua_news/", env!("CARGO_PKG_VERSION"));

/// Contract for the extraction step. `Ok(None)` signals an unrecoverable
/// extraction failure for that page (no usable text); transport errors
/// surface as `Err`.
pub trait ExtractArticle {
    async fn full_text(&self, url: &str) -> Result<Option<String>>;
}

/// Readability-style extractor over `reqwest` + `scraper`.
pub struct ReadabilityExtractor {
    client: Client,
    min_chars: usize,
}

impl ReadabilityExtractor {
    pub fn new(min_chars: usize) -> Result<Self> {
        let client = Client::builder()
            .user_agent(EXTRACT_USER_AGENT)
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self { client, min_chars })
    }
}

impl ExtractArticle for ReadabilityExtractor {
    #[instrument(level = "info", skip_all, fields(%url))]
    async fn full_text(&self, url: &str) -> Result<Option<String>> {
        let body = self
            .client
            .get(url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| PipelineError::Extraction(format!("{url}: {e}")))?
            .text()
            .await
            .map_err(|e| PipelineError::Extraction(format!("{url}: {e}")))?;
        let text = readable_text(&body, self.min_chars);
        debug!(
            bytes = text.as_deref().map(str::len).unwrap_or(0),
            usable = text.is_some(),
            "Extracted article text"
        );
        Ok(text)
    }
}

/// Pull the main readable text out of an HTML document.
///
/// Tries each container selector in order and returns the first whose
/// paragraph text clears `min_chars`. Returns `None` when no container
/// yields enough text.
pub fn readable_text(html: &str, min_chars: usize) -> Option<String> {
    let document = Html::parse_document(html);
    let paragraph = Selector::parse("p").unwrap();

    for container_selector in CONTAINER_SELECTORS {
        let selector = Selector::parse(container_selector).unwrap();
        let Some(container) = document.select(&selector).next() else {
            continue;
        };

        let mut paragraphs = Vec::new();
        for p in container.select(&paragraph) {
            let text = p.text().collect::<Vec<_>>().join(" ");
            let text = text.split_whitespace().collect::<Vec<_>>().join(" ");
            if text.len() < MIN_PARAGRAPH_CHARS {
                continue;
            }
            if text.len() < BOILERPLATE_MAX_CHARS && BOILERPLATE_RE.is_match(&text) {
                continue;
            }
            paragraphs.push(text);
        }

        let joined = paragraphs.join("\n\n");
        if joined.len() >= min_chars {
            return Some(joined);
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    const ARTICLE_HTML: &str = r#"<html><body>
        <nav><p>Home | World | Sign in to your account here</p></nav>
        <article>
            <p>Short.</p>
            <p>The first substantial paragraph of the story, carrying enough
               text to clear the furniture threshold comfortably.</p>
            <p>Subscribe to our newsletter for more!</p>
            <p>A second substantial paragraph continuing the report with
               further detail about the events described above.</p>
        </article>
        <footer><p>All rights reserved. Privacy policy applies to this site.</p></footer>
    </body></html>"#;

    #[test]
    fn test_extracts_article_paragraphs_only() {
        let text = readable_text(ARTICLE_HTML, 50).unwrap();
        assert!(text.contains("first substantial paragraph"));
        assert!(text.contains("second substantial paragraph"));
        assert!(!text.contains("Subscribe to our newsletter"));
        assert!(!text.contains("Short."));
        assert!(!text.contains("Sign in"));
        assert!(!text.contains("rights reserved"));
    }

    #[test]
    fn test_paragraphs_joined_with_blank_lines() {
        let text = readable_text(ARTICLE_HTML, 50).unwrap();
        assert_eq!(text.matches("\n\n").count(), 1);
    }

    #[test]
    fn test_below_minimum_returns_none() {
        assert_eq!(readable_text(ARTICLE_HTML, 100_000), None);
    }

    #[test]
    fn test_falls_back_to_body_without_article_tag() {
        let html = r#"<html><body>
            <p>Plain page paragraph number one, long enough to count as text.</p>
            <p>Plain page paragraph number two, also long enough to be kept.</p>
        </body></html>"#;
        let text = readable_text(html, 50).unwrap();
        assert!(text.contains("number one"));
        assert!(text.contains("number two"));
    }

    #[test]
    fn test_empty_document_returns_none() {
        assert_eq!(readable_text("<html><body></body></html>", 1), None);
        assert_eq!(readable_text("", 1), None);
    }

    #[test]
    fn test_long_paragraph_mentioning_cookies_is_kept() {
        let filler = "a long report about supermarket pricing disputes ".repeat(5);
        let html = format!(
            "<html><body><article><p>The cookie aisle was at the center: {filler}</p></article></body></html>"
        );
        let text = readable_text(&html, 50).unwrap();
        assert!(text.contains("cookie aisle"));
    }
}

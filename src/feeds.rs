//! Source feed reading and normalization.
//!
//! Fetches every configured RSS/Atom feed, parses the entries and normalizes
//! them into [`NewsItem`] records tagged with the feed's coarse category.
//!
//! # Ordering
//!
//! Feeds are fetched concurrently but concatenated in configuration order,
//! and each feed's entries keep their document order, so a candidate list is
//! reproducible for a given set of feed snapshots.
//!
//! # Failure semantics
//!
//! A single unreachable or malformed feed fails the whole aggregation: the
//! candidate list would be silently incomplete otherwise, and the pipeline
//! treats an incomplete aggregation as a fatal invocation error rather than
//! guessing.

use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use once_cell::sync::Lazy;
use quick_xml::Reader;
use quick_xml::events::Event;
use regex::Regex;
use reqwest::Client;
use tracing::{debug, info, instrument};
use url::Url;

use crate::config::FeedConfig;
use crate::error::{PipelineError, Result};
use crate::models::NewsItem;

static TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]*>").unwrap());

const FEED_USER_AGENT: &str = concat!("lingua_news/", env!("CARGO_PKG_VERSION"));

/// Contract for the candidate discovery step: one call returns the complete
/// merged candidate list.
pub trait FetchNews {
    async fn fetch_all_news(&self) -> Result<Vec<NewsItem>>;
}

/// Production feed reader over the configured RSS/Atom feeds.
pub struct FeedReader {
    client: Client,
    feeds: Vec<FeedConfig>,
}

impl FeedReader {
    pub fn new(feeds: Vec<FeedConfig>) -> Result<Self> {
        let client = Client::builder()
            .user_agent(FEED_USER_AGENT)
            .timeout(Duration::from_secs(20))
            .build()?;
        Ok(Self { client, feeds })
    }

    #[instrument(level = "info", skip_all, fields(feed = %feed.name))]
    async fn fetch_feed(&self, feed: &FeedConfig) -> Result<Vec<NewsItem>> {
        let body = self
            .client
            .get(&feed.url)
            .send()
            .await
            .map_err(|e| PipelineError::Feed(format!("{}: {e}", feed.name)))?
            .error_for_status()
            .map_err(|e| PipelineError::Feed(format!("{}: {e}", feed.name)))?
            .text()
            .await
            .map_err(|e| PipelineError::Feed(format!("{}: {e}", feed.name)))?;

        let items = parse_feed(&body, feed)?;
        info!(count = items.len(), "Indexed feed");
        debug!(urls = ?items.iter().map(|i| &i.source_url).collect::<Vec<_>>(), "Feed URLs");
        Ok(items)
    }
}

impl FetchNews for FeedReader {
    async fn fetch_all_news(&self) -> Result<Vec<NewsItem>> {
        let fetches = self.feeds.iter().map(|feed| self.fetch_feed(feed));
        let per_feed = join_all(fetches).await;

        let mut merged = Vec::new();
        for result in per_feed {
            merged.extend(result?);
        }
        info!(total = merged.len(), feeds = self.feeds.len(), "Merged feed candidates");
        Ok(merged)
    }
}

/// Which child element of the current entry a text event belongs to.
#[derive(Clone, Copy, PartialEq)]
enum Field {
    None,
    Title,
    Link,
    Description,
    Published,
}

/// Parse an RSS 2.0 or Atom document into normalized items.
///
/// Only the fields the pipeline needs are read: title, link, description
/// (or Atom summary) and publication date. Entries without a resolvable
/// link are dropped.
pub fn parse_feed(xml: &str, feed: &FeedConfig) -> Result<Vec<NewsItem>> {
    let mut reader = Reader::from_str(xml);
    let mut items = Vec::new();

    let mut in_entry = false;
    let mut field = Field::None;
    let mut title = String::new();
    let mut link = String::new();
    let mut description = String::new();
    let mut published = String::new();

    loop {
        match reader.read_event() {
            Err(e) => {
                return Err(PipelineError::Feed(format!(
                    "malformed feed {}: {e}",
                    feed.name
                )));
            }
            Ok(Event::Eof) => break,
            Ok(Event::Start(tag)) => match tag.name().as_ref() {
                b"item" | b"entry" => {
                    in_entry = true;
                    field = Field::None;
                    title.clear();
                    link.clear();
                    description.clear();
                    published.clear();
                }
                b"title" if in_entry => field = Field::Title,
                b"link" if in_entry => {
                    field = Field::Link;
                    // Atom carries the target in an href attribute.
                    if let Some(href) = href_attribute(&tag) {
                        link = href;
                    }
                }
                b"description" | b"summary" if in_entry => field = Field::Description,
                b"pubDate" | b"published" | b"updated" if in_entry => field = Field::Published,
                _ => field = Field::None,
            },
            Ok(Event::Empty(tag)) => {
                if in_entry && tag.name().as_ref() == b"link" {
                    if let Some(href) = href_attribute(&tag) {
                        link = href;
                    }
                }
            }
            Ok(Event::Text(text)) if in_entry => {
                let chunk = match text.decode() {
                    Ok(decoded) => match quick_xml::escape::unescape(&decoded) {
                        Ok(cow) => cow.into_owned(),
                        Err(_) => decoded.into_owned(),
                    },
                    Err(_) => String::from_utf8_lossy(text.as_ref()).into_owned(),
                };
                append_field(field, &chunk, &mut title, &mut link, &mut description, &mut published);
            }
            Ok(Event::GeneralRef(reference)) if in_entry => {
                // quick-xml emits entity/character references (e.g. `&amp;`) as
                // their own events; resolve them back into text for the field.
                if let Ok(name) = reference.decode() {
                    let escaped = format!("&{name};");
                    if let Ok(resolved) = quick_xml::escape::unescape(&escaped) {
                        append_field(field, &resolved, &mut title, &mut link, &mut description, &mut published);
                    }
                }
            }
            Ok(Event::CData(cdata)) if in_entry => {
                let chunk = String::from_utf8_lossy(&cdata.into_inner()).into_owned();
                append_field(field, &chunk, &mut title, &mut link, &mut description, &mut published);
            }
            Ok(Event::End(tag)) => match tag.name().as_ref() {
                b"item" | b"entry" => {
                    in_entry = false;
                    if let Some(item) = normalize_entry(feed, &title, &link, &description, &published) {
                        items.push(item);
                    }
                }
                _ => field = Field::None,
            },
            Ok(_) => {}
        }
    }

    Ok(items)
}

fn href_attribute(tag: &quick_xml::events::BytesStart<'_>) -> Option<String> {
    for attr in tag.attributes().flatten() {
        if attr.key.as_ref() == b"href" {
            if let Ok(value) = attr.unescape_value() {
                return Some(value.into_owned());
            }
        }
    }
    None
}

fn append_field(
    field: Field,
    chunk: &str,
    title: &mut String,
    link: &mut String,
    description: &mut String,
    published: &mut String,
) {
    let target = match field {
        Field::Title => title,
        Field::Link => link,
        Field::Description => description,
        Field::Published => published,
        Field::None => return,
    };
    target.push_str(chunk);
}

/// Turn a parsed entry into a [`NewsItem`], or `None` if it lacks a valid
/// absolute link.
fn normalize_entry(
    feed: &FeedConfig,
    title: &str,
    link: &str,
    description: &str,
    published: &str,
) -> Option<NewsItem> {
    let link = link.trim();
    let url = Url::parse(link).ok()?;
    if !matches!(url.scheme(), "http" | "https") {
        return None;
    }
    let title = title.trim();
    if title.is_empty() {
        return None;
    }
    Some(NewsItem {
        title: title.to_string(),
        description: strip_html(description),
        source_name: feed.name.clone(),
        source_url: url.to_string(),
        category: feed.category,
        published_at: parse_date(published.trim()),
    })
}

/// Strip markup from a feed description: drop tags, decode the handful of
/// entities feeds actually emit, collapse whitespace.
fn strip_html(text: &str) -> String {
    let without_tags = TAG_RE.replace_all(text, " ");
    let decoded = without_tags
        .replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&nbsp;", " ");
    decoded.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Feeds disagree on date formats; try RFC 2822 (RSS) then RFC 3339 (Atom).
fn parse_date(s: &str) -> Option<DateTime<Utc>> {
    if s.is_empty() {
        return None;
    }
    DateTime::parse_from_rfc2822(s)
        .or_else(|_| DateTime::parse_from_rfc3339(s))
        .ok()
        .map(|d| d.with_timezone(&Utc))
}

//! Data models for articles and their leveled representations.
//!
//! This module defines the core data structures used throughout the pipeline:
//! - [`NewsItem`]: a feed entry, ephemeral within a single pipeline run
//! - [`Article`]: the persisted unit of work, created Raw and mutated in
//!   place to Leveled
//! - [`Level`] / [`Category`]: the CEFR bands and coarse topic categories
//! - Derived artifacts: [`ExerciseSet`], [`VocabularyItem`], [`LevelHeadlines`]
//! - [`PipelineReport`] / [`ItemOutcome`]: the structured summary every
//!   trigger returns
//!
//! Persisted structures serialize with camelCase field names to match the
//! JSON schema consumed by the reading frontend, hence the
//! `#[serde(rename_all = "camelCase")]` attributes.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::utils::{read_time_minutes, slugify, word_count};

/// Map key under which the unleveled source text's metrics are stored.
pub const RAW_KEY: &str = "raw";

/// A CEFR proficiency band, ordered from easiest to hardest.
///
/// Levels double as JSON map keys (`"A1"`, `"A2"`, ...) in both storage and
/// the generation API contract.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum Level {
    A1,
    A2,
    B1,
    B2,
    C1,
}

impl Level {
    /// All levels in ascending order of difficulty.
    pub const ALL: [Level; 5] = [Level::A1, Level::A2, Level::B1, Level::B2, Level::C1];

    /// The two-character level code used as a content key.
    pub fn code(&self) -> &'static str {
        match self {
            Level::A1 => "A1",
            Level::A2 => "A2",
            Level::B1 => "B1",
            Level::B2 => "B2",
            Level::C1 => "C1",
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Coarse topic category assigned by the feed configuration.
///
/// String conversion is tolerant: unknown category names map to
/// [`Category::General`] so that a config typo or a new upstream category
/// degrades to the default image pool instead of failing the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Category {
    World,
    Politics,
    Business,
    Science,
    Technology,
    Culture,
    Sports,
    #[default]
    General,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::World => "world",
            Category::Politics => "politics",
            Category::Business => "business",
            Category::Science => "science",
            Category::Technology => "technology",
            Category::Culture => "culture",
            Category::Sports => "sports",
            Category::General => "general",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for Category {
    fn from(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "world" => Category::World,
            "politics" => Category::Politics,
            "business" => Category::Business,
            "science" => Category::Science,
            "technology" | "tech" => Category::Technology,
            "culture" => Category::Culture,
            "sports" | "sport" => Category::Sports,
            _ => Category::General,
        }
    }
}

impl From<String> for Category {
    fn from(s: String) -> Self {
        Category::from(s.as_str())
    }
}

impl From<Category> for String {
    fn from(c: Category) -> Self {
        c.as_str().to_string()
    }
}

/// A candidate article produced by the feed reader.
///
/// Exists only within a pipeline run; never persisted on its own. The
/// `source_url` is the dedup key against previously ingested articles.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewsItem {
    pub title: String,
    pub description: String,
    pub source_name: String,
    pub source_url: String,
    pub category: Category,
    #[serde(default)]
    pub published_at: Option<DateTime<Utc>>,
}

/// Explicit ingestion state of an article's content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArticleStatus {
    /// Extracted source text only; phase 1 complete.
    Raw,
    /// All five level rewrites present; phase 2 complete.
    Leveled,
}

/// The text payload of an article: the extracted source text plus, once
/// phase 2 has run, the five per-level rewrites.
///
/// `status` is the authoritative state marker. Rows written before the
/// marker existed lack the field; [`ArticleContent::status`] falls back to
/// detecting the state from key presence so legacy rows keep reading
/// correctly.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ArticleContent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub levels: BTreeMap<Level, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    status: Option<ArticleStatus>,
}

impl ArticleContent {
    /// Content for a freshly extracted article.
    pub fn from_raw(text: String) -> Self {
        Self {
            raw: Some(text),
            levels: BTreeMap::new(),
            status: Some(ArticleStatus::Raw),
        }
    }

    /// The article's state, derived from field presence when the explicit
    /// marker is missing (legacy rows).
    pub fn status(&self) -> ArticleStatus {
        self.status.unwrap_or_else(|| {
            if Level::ALL.iter().all(|l| self.levels.contains_key(l)) {
                ArticleStatus::Leveled
            } else {
                ArticleStatus::Raw
            }
        })
    }

    pub fn is_raw(&self) -> bool {
        self.status() == ArticleStatus::Raw
    }

    pub fn is_leveled(&self) -> bool {
        self.status() == ArticleStatus::Leveled
    }

    /// Install the five level rewrites and flip the state marker.
    pub fn set_levels(&mut self, levels: BTreeMap<Level, String>) {
        self.levels = levels;
        self.status = Some(ArticleStatus::Leveled);
    }
}

/// A single comprehension exercise attached to a level rewrite.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Exercise {
    pub prompt: String,
    pub options: Vec<String>,
    pub answer_index: usize,
}

/// The exercise set generated for one proficiency level.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExerciseSet {
    pub questions: Vec<Exercise>,
}

impl ExerciseSet {
    pub fn is_empty(&self) -> bool {
        self.questions.is_empty()
    }
}

/// A glossary entry extracted from the leveled texts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VocabularyItem {
    pub term: String,
    pub definition: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub example: Option<String>,
}

/// Per-level headline overrides produced by the headline backfill.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LevelHeadlines {
    #[serde(default)]
    pub titles: BTreeMap<Level, String>,
    #[serde(default)]
    pub subtitles: BTreeMap<Level, String>,
}

/// The persisted unit of work.
///
/// Created in Raw state by the fetch phase, mutated in place to Leveled by
/// the level phase. Identity (`id`, `source_url`) never changes across the
/// transition. `source_url` is globally unique and doubles as the dedup key.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Article {
    pub id: String,
    /// URL-safe slug derived from the title: lowercase `[a-z0-9-]`,
    /// at most 60 characters, no leading or trailing hyphen.
    pub slug: String,
    pub source_url: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subtitle: Option<String>,
    pub content: ArticleContent,
    /// Word counts keyed by content key (`"raw"` or a level code). Always
    /// recomputed from the corresponding text, never supplied independently.
    #[serde(default)]
    pub word_counts: BTreeMap<String, usize>,
    /// Estimated read times in minutes, same keys as `word_counts`,
    /// at 200 words per minute rounded up.
    #[serde(default)]
    pub read_times: BTreeMap<String, usize>,
    #[serde(default)]
    pub exercises: BTreeMap<Level, ExerciseSet>,
    #[serde(default)]
    pub vocabulary: Vec<VocabularyItem>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub level_titles: BTreeMap<Level, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub level_subtitles: BTreeMap<Level, String>,
    pub category: Category,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hero_image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hero_alt: Option<String>,
    pub published_at: DateTime<Utc>,
}

impl Article {
    /// Build a new Raw article from a feed candidate and its extracted text.
    pub fn new_raw(
        item: &NewsItem,
        text: String,
        hero_image: Option<String>,
        hero_alt: Option<String>,
    ) -> Self {
        let mut article = Self {
            id: uuid::Uuid::new_v4().to_string(),
            slug: slugify(&item.title),
            source_url: item.source_url.clone(),
            title: item.title.clone(),
            subtitle: if item.description.is_empty() {
                None
            } else {
                Some(item.description.clone())
            },
            content: ArticleContent::from_raw(text),
            word_counts: BTreeMap::new(),
            read_times: BTreeMap::new(),
            exercises: BTreeMap::new(),
            vocabulary: Vec::new(),
            level_titles: BTreeMap::new(),
            level_subtitles: BTreeMap::new(),
            category: item.category,
            hero_image,
            hero_alt,
            published_at: item.published_at.unwrap_or_else(Utc::now),
        };
        article.recompute_metrics();
        article
    }

    /// Install level rewrites and recompute every derived metric.
    pub fn apply_levels(&mut self, levels: BTreeMap<Level, String>) {
        self.content.set_levels(levels);
        self.recompute_metrics();
    }

    /// Rebuild `word_counts` and `read_times` from the content texts.
    ///
    /// The maps are derived wholesale so they can never drift from the text
    /// they describe.
    pub fn recompute_metrics(&mut self) {
        self.word_counts.clear();
        self.read_times.clear();
        if let Some(raw) = &self.content.raw {
            let words = word_count(raw);
            self.word_counts.insert(RAW_KEY.to_string(), words);
            self.read_times
                .insert(RAW_KEY.to_string(), read_time_minutes(words));
        }
        for (level, text) in &self.content.levels {
            let words = word_count(text);
            self.word_counts.insert(level.code().to_string(), words);
            self.read_times
                .insert(level.code().to_string(), read_time_minutes(words));
        }
    }
}

/// Machine-readable outcome for one item within an invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemOutcome {
    pub source_url: String,
    pub status: OutcomeStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl ItemOutcome {
    pub fn success(source_url: impl Into<String>) -> Self {
        Self {
            source_url: source_url.into(),
            status: OutcomeStatus::Success,
            detail: None,
        }
    }

    pub fn skipped(source_url: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            source_url: source_url.into(),
            status: OutcomeStatus::Skipped,
            detail: Some(detail.into()),
        }
    }

    pub fn error(source_url: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            source_url: source_url.into(),
            status: OutcomeStatus::Error,
            detail: Some(detail.into()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutcomeStatus {
    Success,
    Skipped,
    Error,
}

/// Structured summary returned by every pipeline trigger, regardless of
/// partial failures, so an operator can distinguish "nothing new" from
/// "everything failed" from "partial success".
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineReport {
    pub considered: usize,
    pub succeeded: usize,
    pub skipped: usize,
    pub failed: usize,
    /// Items still pending after this invocation, where the phase knows it
    /// (the level phase reports how many Raw articles it did not take).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remaining: Option<usize>,
    pub outcomes: Vec<ItemOutcome>,
}

impl PipelineReport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold an item outcome into the tallies.
    pub fn record(&mut self, outcome: ItemOutcome) {
        self.considered += 1;
        match outcome.status {
            OutcomeStatus::Success => self.succeeded += 1,
            OutcomeStatus::Skipped => self.skipped += 1,
            OutcomeStatus::Error => self.failed += 1,
        }
        self.outcomes.push(outcome);
    }
}

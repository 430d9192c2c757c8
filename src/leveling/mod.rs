//! The leveling engine: turns raw article text into five proficiency-level
//! rewrites plus derived artifacts.
//!
//! The engine speaks to the model through the [`ChatAsync`] transport
//! (see [`api`]) and owns everything above the wire: prompt construction,
//! response shaping, and validation of the returned JSON into typed maps.
//!
//! # Contract
//!
//! [`LevelingModel`] is the seam the orchestrator depends on:
//! - `generate_all_levels`: raw text → one rewrite per CEFR level
//! - `generate_all_exercises`: leveled texts → one exercise set per level
//! - `generate_vocabulary`: leveled texts → a deduplicated glossary
//! - `generate_level_headlines`: title/subtitle → per-level overrides
//!
//! # Truncation handling
//!
//! A response that fails to parse with a JSON EOF error was almost certainly
//! cut off mid-generation; the engine re-asks exactly once before giving up
//! on the item. Any other malformed response fails immediately.

pub mod api;

use std::collections::BTreeMap;
use std::time::Duration;

use itertools::Itertools;
use serde::de::DeserializeOwned;
use serde_json::json;
use tracing::{instrument, warn};

use crate::config::LevelingConfig;
use crate::error::{PipelineError, Result};
use crate::models::{ExerciseSet, Level, LevelHeadlines, VocabularyItem};
use crate::utils::{looks_truncated, truncate_for_log};

pub use api::{ChatAsync, ChatClient, RetryChat};

const LEVELS_SYSTEM_PROMPT: &str = "You rewrite news articles for language learners. \
Given an article, produce five rewrites at CEFR levels A1, A2, B1, B2 and C1. \
A1 uses very short sentences and the most common words only; each level up adds \
vocabulary range and sentence complexity; C1 reads like the original register. \
Keep every rewrite faithful to the facts. Respond with only a JSON object whose \
keys are exactly A1, A2, B1, B2, C1 and whose values are the rewritten texts.";

const EXERCISES_SYSTEM_PROMPT: &str = "You write comprehension exercises for language \
learners. Given one news text per CEFR level (A1, A2, B1, B2, C1), produce three \
multiple-choice questions per level, in the language and difficulty of that level. \
Respond with only a JSON object keyed A1..C1, each value of the form \
{\"questions\": [{\"prompt\": str, \"options\": [str, ...], \"answerIndex\": int}]}. \
Each question needs at least three options and answerIndex must point into options.";

const VOCABULARY_SYSTEM_PROMPT: &str = "You build glossaries for language learners. \
Given news texts at CEFR levels A1..C1, pick the 8-15 most useful terms across \
them. Respond with only a JSON array of objects {\"term\": str, \"definition\": str, \
\"example\": str} where the definition is a short learner-friendly gloss and the \
example is a sentence using the term.";

const HEADLINES_SYSTEM_PROMPT: &str = "You adapt news headlines for language \
learners. Given an article title, optional subtitle and the five leveled texts, \
write a headline per CEFR level matching that level's vocabulary, plus a one-line \
subtitle per level. Respond with only a JSON object of the form \
{\"titles\": {\"A1\": str, ..., \"C1\": str}, \"subtitles\": {\"A1\": str, ..., \"C1\": str}}.";

/// Contract consumed by the pipeline orchestrator and the backfill
/// operations.
pub trait LevelingModel {
    async fn generate_all_levels(&self, raw: &str) -> Result<BTreeMap<Level, String>>;

    async fn generate_all_exercises(
        &self,
        levels: &BTreeMap<Level, String>,
    ) -> Result<BTreeMap<Level, ExerciseSet>>;

    async fn generate_vocabulary(
        &self,
        levels: &BTreeMap<Level, String>,
    ) -> Result<Vec<VocabularyItem>>;

    async fn generate_level_headlines(
        &self,
        title: &str,
        subtitle: Option<&str>,
        levels: &BTreeMap<Level, String>,
    ) -> Result<LevelHeadlines>;
}

/// Production engine over any [`ChatAsync`] transport.
pub struct LevelingEngine<C> {
    chat: C,
}

impl LevelingEngine<RetryChat<ChatClient>> {
    /// Build the production engine: HTTP client wrapped in the backoff
    /// decorator. Fails with `Unauthorized` when no API key is configured.
    pub fn from_config(config: &LevelingConfig) -> Result<Self> {
        let client = ChatClient::new(config)?;
        Ok(Self {
            chat: RetryChat::new(client, 5, Duration::from_secs(1)),
        })
    }
}

impl<C: ChatAsync> LevelingEngine<C> {
    pub fn new(chat: C) -> Self {
        Self { chat }
    }

    /// Ask the model and parse its reply as JSON, re-asking once when the
    /// reply looks truncated.
    async fn ask_json<T: DeserializeOwned>(&self, system: &str, user: &str) -> Result<T> {
        let first = self.chat.ask(system, user).await?;
        let cleaned = strip_code_fences(&first);
        match serde_json::from_str::<T>(cleaned) {
            Ok(value) => Ok(value),
            Err(e) if looks_truncated(&e) => {
                warn!(error = %e, "Model reply looks truncated; re-asking once");
                let second = self.chat.ask(system, user).await?;
                let cleaned = strip_code_fences(&second);
                serde_json::from_str::<T>(cleaned).map_err(|e2| {
                    PipelineError::Generation(format!(
                        "non-conforming JSON after re-ask: {e2}; reply: {}",
                        truncate_for_log(cleaned, 200)
                    ))
                })
            }
            Err(e) => Err(PipelineError::Generation(format!(
                "non-conforming JSON: {e}; reply: {}",
                truncate_for_log(cleaned, 200)
            ))),
        }
    }
}

impl<C: ChatAsync> LevelingModel for LevelingEngine<C> {
    #[instrument(level = "info", skip_all, fields(chars = raw.len()))]
    async fn generate_all_levels(&self, raw: &str) -> Result<BTreeMap<Level, String>> {
        let levels: BTreeMap<Level, String> =
            self.ask_json(LEVELS_SYSTEM_PROMPT, raw).await?;
        validate_levels(&levels)?;
        Ok(levels)
    }

    #[instrument(level = "info", skip_all)]
    async fn generate_all_exercises(
        &self,
        levels: &BTreeMap<Level, String>,
    ) -> Result<BTreeMap<Level, ExerciseSet>> {
        let user = serde_json::to_string(levels)?;
        let exercises: BTreeMap<Level, ExerciseSet> =
            self.ask_json(EXERCISES_SYSTEM_PROMPT, &user).await?;
        validate_exercises(&exercises)?;
        Ok(exercises)
    }

    #[instrument(level = "info", skip_all)]
    async fn generate_vocabulary(
        &self,
        levels: &BTreeMap<Level, String>,
    ) -> Result<Vec<VocabularyItem>> {
        let user = serde_json::to_string(levels)?;
        let items: Vec<VocabularyItem> =
            self.ask_json(VOCABULARY_SYSTEM_PROMPT, &user).await?;
        Ok(dedupe_vocabulary(items))
    }

    #[instrument(level = "info", skip_all)]
    async fn generate_level_headlines(
        &self,
        title: &str,
        subtitle: Option<&str>,
        levels: &BTreeMap<Level, String>,
    ) -> Result<LevelHeadlines> {
        let user = serde_json::to_string(&json!({
            "title": title,
            "subtitle": subtitle,
            "levels": levels,
        }))?;
        let headlines: LevelHeadlines =
            self.ask_json(HEADLINES_SYSTEM_PROMPT, &user).await?;
        validate_headlines(&headlines)?;
        Ok(headlines)
    }
}

/// Strip a Markdown code fence the model may have wrapped its JSON in.
fn strip_code_fences(s: &str) -> &str {
    let trimmed = s.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the info string ("json") up to the end of the fence line.
    let rest = rest.split_once('\n').map_or(rest, |(_, r)| r);
    let rest = rest.trim_end();
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

/// A level map is usable only when every level is present with real text.
fn validate_levels(levels: &BTreeMap<Level, String>) -> Result<()> {
    let missing: Vec<&str> = Level::ALL
        .iter()
        .filter(|l| levels.get(*l).is_none_or(|t| t.trim().is_empty()))
        .map(|l| l.code())
        .collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(PipelineError::Generation(format!(
            "level map missing or empty for: {}",
            missing.join(", ")
        )))
    }
}

fn validate_exercises(exercises: &BTreeMap<Level, ExerciseSet>) -> Result<()> {
    for level in Level::ALL {
        let Some(set) = exercises.get(&level) else {
            return Err(PipelineError::Generation(format!(
                "exercise sets missing level {level}"
            )));
        };
        if set.is_empty() {
            return Err(PipelineError::Generation(format!(
                "exercise set for {level} is empty"
            )));
        }
        for question in &set.questions {
            if question.options.len() < 2 || question.answer_index >= question.options.len() {
                return Err(PipelineError::Generation(format!(
                    "malformed question at level {level}: \"{}\"",
                    truncate_for_log(&question.prompt, 80)
                )));
            }
        }
    }
    Ok(())
}

fn validate_headlines(headlines: &LevelHeadlines) -> Result<()> {
    let missing: Vec<&str> = Level::ALL
        .iter()
        .filter(|l| headlines.titles.get(*l).is_none_or(|t| t.trim().is_empty()))
        .map(|l| l.code())
        .collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(PipelineError::Generation(format!(
            "headline titles missing for: {}",
            missing.join(", ")
        )))
    }
}

/// Drop glossary entries with blank terms or definitions, then dedupe by
/// case-insensitive term, keeping the first occurrence.
fn dedupe_vocabulary(items: Vec<VocabularyItem>) -> Vec<VocabularyItem> {
    items
        .into_iter()
        .filter(|v| !v.term.trim().is_empty() && !v.definition.trim().is_empty())
        .unique_by(|v| v.term.trim().to_lowercase())
        .collect()
}

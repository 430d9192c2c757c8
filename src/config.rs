//! Runtime configuration loaded from a YAML file.
//!
//! Every knob has a built-in default so the pipeline runs without any config
//! file at all. A file given explicitly via `--config` must exist; the
//! default path (`lingua_news.yaml`) is optional.
//!
//! # Example
//!
//! ```yaml
//! data_dir: ./data/articles
//! feeds:
//!   - name: BBC World
//!     url: https://feeds.bbci.co.uk/news/world/rss.xml
//!     category: world
//! batch:
//!   n_fetch: 6
//!   n_level: 3
//! leveling:
//!   base_url: https://api.openai.com/v1
//!   model: gpt-4o-mini
//! ```
//!
//! The leveling API key is taken from the `LEVELING_API_KEY` environment
//! variable (or `--api-key`) in preference to the file, so the file can be
//! committed without credentials.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{PipelineError, Result};
use crate::models::Category;

/// One configured news feed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedConfig {
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub category: Category,
}

/// Batch bounds and pacing for the pipeline phases.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Candidates accepted per fetch invocation.
    pub n_fetch: usize,
    /// Raw articles leveled per level invocation. Smaller than `n_fetch`
    /// because leveling is far slower per item.
    pub n_level: usize,
    /// Upper bound on simultaneously in-flight items within a batch.
    pub sub_batch: usize,
    /// Successes the refresh variant aims for before stopping.
    pub refresh_target: usize,
    /// Total candidates the refresh variant may attempt.
    pub refresh_max_candidates: usize,
    /// Minimum extracted text length for an article to be accepted.
    pub min_extract_chars: usize,
    /// Fixed delay between model calls in backfill loops, milliseconds.
    pub backfill_delay_ms: u64,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            n_fetch: 6,
            n_level: 3,
            sub_batch: 3,
            refresh_target: 3,
            refresh_max_candidates: 15,
            min_extract_chars: 300,
            backfill_delay_ms: 1500,
        }
    }
}

/// Connection settings for the leveling model API (OpenAI-compatible).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LevelingConfig {
    pub base_url: String,
    pub model: String,
    /// Usually left out of the file; see module docs.
    pub api_key: Option<String>,
}

impl Default for LevelingConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o-mini".to_string(),
            api_key: None,
        }
    }
}

/// Optional live image search endpoint. When absent, hero images come from
/// the deterministic per-category pools.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageSearchConfig {
    pub endpoint: String,
    #[serde(default)]
    pub api_key: Option<String>,
}

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub data_dir: String,
    pub feeds: Vec<FeedConfig>,
    pub batch: BatchConfig,
    pub leveling: LevelingConfig,
    pub image_search: Option<ImageSearchConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: "./data/articles".to_string(),
            feeds: default_feeds(),
            batch: BatchConfig::default(),
            leveling: LevelingConfig::default(),
            image_search: None,
        }
    }
}

impl Config {
    /// Load configuration from `path`, or from `lingua_news.yaml` when no
    /// path is given, falling back to built-in defaults if the default file
    /// is absent. An explicitly named file that cannot be read is an error.
    pub async fn load(path: Option<&str>) -> Result<Self> {
        let (candidate, explicit) = match path {
            Some(p) => (p.to_string(), true),
            None => ("lingua_news.yaml".to_string(), false),
        };

        let text = match tokio::fs::read_to_string(&candidate).await {
            Ok(text) => text,
            Err(e) if !explicit && e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %candidate, "No config file; using built-in defaults");
                return Ok(Self::default());
            }
            Err(e) => {
                return Err(PipelineError::Config(format!(
                    "cannot read {candidate}: {e}"
                )));
            }
        };

        let config: Config = serde_yaml::from_str(&text)?;
        if config.feeds.is_empty() {
            return Err(PipelineError::Config(
                "config declares an empty feed list".to_string(),
            ));
        }
        info!(path = %candidate, feeds = config.feeds.len(), "Loaded configuration");
        Ok(config)
    }
}

/// The default feed set: text-friendly wire and world desks, one coarse
/// category each.
fn default_feeds() -> Vec<FeedConfig> {
    let feeds = [
        ("BBC World", "https://feeds.bbci.co.uk/news/world/rss.xml", "world"),
        ("NPR News", "https://feeds.npr.org/1001/rss.xml", "general"),
        ("Guardian World", "https://www.theguardian.com/world/rss", "world"),
        ("NPR Politics", "https://feeds.npr.org/1014/rss.xml", "politics"),
        ("BBC Business", "https://feeds.bbci.co.uk/news/business/rss.xml", "business"),
        ("BBC Science", "https://feeds.bbci.co.uk/news/science_and_environment/rss.xml", "science"),
        ("BBC Technology", "https://feeds.bbci.co.uk/news/technology/rss.xml", "technology"),
    ];
    feeds
        .into_iter()
        .map(|(name, url, category)| FeedConfig {
            name: name.to_string(),
            url: url.to_string(),
            category: Category::from(category),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert!(!config.feeds.is_empty());
        assert_eq!(config.batch.n_fetch, 6);
        assert_eq!(config.batch.n_level, 3);
        assert_eq!(config.batch.sub_batch, 3);
        assert_eq!(config.batch.min_extract_chars, 300);
        assert!(config.leveling.api_key.is_none());
        assert!(config.image_search.is_none());
    }

    #[test]
    fn test_parse_partial_yaml() {
        let yaml = r#"
data_dir: /var/lib/lingua
feeds:
  - name: Test Feed
    url: https://example.com/rss.xml
    category: sports
batch:
  n_fetch: 10
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.data_dir, "/var/lib/lingua");
        assert_eq!(config.feeds.len(), 1);
        assert_eq!(config.feeds[0].category, Category::Sports);
        assert_eq!(config.batch.n_fetch, 10);
        // Unspecified knobs keep their defaults.
        assert_eq!(config.batch.n_level, 3);
        assert_eq!(config.leveling.model, "gpt-4o-mini");
    }

    #[test]
    fn test_unknown_feed_category_degrades_to_general() {
        let yaml = r#"
feeds:
  - name: Odd Feed
    url: https://example.com/rss.xml
    category: horoscopes
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.feeds[0].category, Category::General);
    }

    #[tokio::test]
    async fn test_load_missing_explicit_path_errors() {
        let result = Config::load(Some("/nonexistent/lingua.yaml")).await;
        assert!(matches!(result, Err(PipelineError::Config(_))));
    }

    #[tokio::test]
    async fn test_load_missing_default_path_uses_defaults() {
        // Run from a directory without a lingua_news.yaml.
        let config = Config::load(None).await.unwrap();
        assert_eq!(config.batch.n_fetch, 6);
    }
}

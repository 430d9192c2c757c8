//! Command-line interface definitions for Lingua News.
//!
//! Each subcommand is one pipeline trigger. All triggers are idempotent-safe
//! to re-invoke: completed work is skipped via the dedup ledger and the
//! skip-on-exists checks, so a cron schedule can fire them blindly.

use clap::{Parser, Subcommand, ValueEnum};

/// Command-line arguments for the Lingua News pipeline.
///
/// # Examples
///
/// ```sh
/// # Phase 1: pull feeds and ingest raw articles
/// lingua_news fetch
///
/// # Phase 2: level pending articles (needs LEVELING_API_KEY)
/// LEVELING_API_KEY=sk-... lingua_news level
///
/// # Maintenance
/// lingua_news backfill-headlines --force
/// lingua_news repair-images
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Path to the YAML configuration file
    #[arg(short, long)]
    pub config: Option<String>,

    /// Article storage backend
    #[arg(long, value_enum, default_value = "fs")]
    pub store: StoreKind,

    /// Override the configured article data directory
    #[arg(short, long)]
    pub data_dir: Option<String>,

    /// Leveling API key (overrides the config file)
    #[arg(long, env = "LEVELING_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum StoreKind {
    /// One JSON document per article under the data directory
    Fs,
    /// In-process only; useful for dry runs
    Memory,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Phase 1: read feeds, dedup, extract and persist raw articles
    Fetch,
    /// Phase 2: rewrite pending raw articles at all five levels
    Level,
    /// Retry-until-target variant of fetch
    Refresh,
    /// Generate per-level headlines for leveled articles missing them
    BackfillHeadlines {
        /// Recompute even where headlines already exist
        #[arg(long)]
        force: bool,
    },
    /// Generate vocabulary for leveled articles missing it
    BackfillVocabulary {
        /// Recompute even where vocabulary already exists
        #[arg(long)]
        force: bool,
    },
    /// Reassign hero images from the deterministic per-category pools
    RepairImages {
        /// Reassign even where an image already exists
        #[arg(long)]
        force: bool,
    },
    /// Delete every stored article
    Purge,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_fetch() {
        let cli = Cli::parse_from(["lingua_news", "fetch"]);
        assert!(matches!(cli.command, Command::Fetch));
        assert_eq!(cli.store, StoreKind::Fs);
        assert!(cli.config.is_none());
    }

    #[test]
    fn test_cli_parses_store_and_data_dir() {
        let cli = Cli::parse_from([
            "lingua_news",
            "--store",
            "memory",
            "--data-dir",
            "/tmp/articles",
            "level",
        ]);
        assert_eq!(cli.store, StoreKind::Memory);
        assert_eq!(cli.data_dir.as_deref(), Some("/tmp/articles"));
        assert!(matches!(cli.command, Command::Level));
    }

    #[test]
    fn test_cli_parses_force_flag() {
        let cli = Cli::parse_from(["lingua_news", "backfill-headlines", "--force"]);
        assert!(matches!(
            cli.command,
            Command::BackfillHeadlines { force: true }
        ));

        let cli = Cli::parse_from(["lingua_news", "repair-images"]);
        assert!(matches!(cli.command, Command::RepairImages { force: false }));
    }
}

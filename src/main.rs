//! # Lingua News
//!
//! Content ingestion pipeline for a graded-reader news site: discovers
//! source articles from RSS feeds, deduplicates them against prior runs,
//! extracts the readable text, and drives each article through a two-phase
//! transformation that rewrites it at five CEFR proficiency levels with
//! exercises, vocabulary and hero images.
//!
//! ## Architecture
//!
//! The pipeline splits into two independently-triggered phases sharing one
//! store:
//! 1. **Fetch** (cheap, high fan-out): feeds → dedup → extraction → Raw
//!    articles
//! 2. **Level** (expensive, low fan-out): Raw articles → five rewrites +
//!    exercises + vocabulary → Leveled articles
//!
//! Plus maintenance triggers: a retry-until-target refresh, headline and
//! vocabulary backfills, bulk image repair and a purge.
//!
//! Every trigger prints a machine-readable JSON report (counts plus
//! per-item outcomes) on stdout regardless of partial failures.
//!
//! ## Usage
//!
//! ```sh
//! lingua_news fetch
//! LEVELING_API_KEY=sk-... lingua_news level
//! ```

use clap::Parser;
use tracing::{debug, error, info};
use tracing_subscriber::{EnvFilter, fmt as tfmt};

mod cli;
mod config;
mod error;
mod extract;
mod feeds;
mod images;
mod leveling;
mod models;
mod pipeline;
mod store;
mod utils;

use cli::{Cli, Command, StoreKind};
use config::Config;
use error::Result;
use extract::ReadabilityExtractor;
use feeds::FeedReader;
use images::{HttpImageSearch, ImageResolver};
use leveling::LevelingEngine;
use models::PipelineReport;
use store::{ArticleStore, FsStore, MemoryStore};

#[tokio::main]
async fn main() -> Result<()> {
    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .with_writer(std::io::stderr)
        .init();

    let start_time = std::time::Instant::now();
    let args = Cli::parse();
    debug!(?args.config, ?args.store, "Parsed CLI arguments");

    let mut config = Config::load(args.config.as_deref()).await?;
    if let Some(data_dir) = &args.data_dir {
        config.data_dir = data_dir.clone();
    }
    if args.api_key.is_some() {
        config.leveling.api_key = args.api_key.clone();
    }

    let result = match args.store {
        StoreKind::Fs => {
            info!(data_dir = %config.data_dir, "Using filesystem store");
            dispatch(&args, &config, FsStore::new(&config.data_dir)).await
        }
        StoreKind::Memory => {
            info!("Using in-memory store");
            dispatch(&args, &config, MemoryStore::new()).await
        }
    };

    let elapsed = start_time.elapsed();
    match &result {
        Ok(()) => info!(?elapsed, "Invocation complete"),
        Err(e) => error!(?elapsed, error = %e, "Invocation failed"),
    }
    result
}

/// Run one trigger against the chosen store and print its report.
async fn dispatch<S: ArticleStore>(args: &Cli, config: &Config, store: S) -> Result<()> {
    match &args.command {
        Command::Fetch => {
            let feeds = FeedReader::new(config.feeds.clone())?;
            let extractor = ReadabilityExtractor::new(config.batch.min_extract_chars)?;
            let images = image_resolver(config)?;
            let report =
                pipeline::run_fetch(&feeds, &extractor, &images, &store, &config.batch).await?;
            print_report(&report)
        }
        Command::Level => {
            let engine = LevelingEngine::from_config(&config.leveling)?;
            let report = pipeline::run_level(&engine, &store, &config.batch).await?;
            print_report(&report)
        }
        Command::Refresh => {
            let feeds = FeedReader::new(config.feeds.clone())?;
            let extractor = ReadabilityExtractor::new(config.batch.min_extract_chars)?;
            let images = image_resolver(config)?;
            let report =
                pipeline::run_refresh(&feeds, &extractor, &images, &store, &config.batch).await?;
            print_report(&report)
        }
        Command::BackfillHeadlines { force } => {
            let engine = LevelingEngine::from_config(&config.leveling)?;
            let report =
                pipeline::backfill_headlines(&engine, &store, &config.batch, *force).await?;
            print_report(&report)
        }
        Command::BackfillVocabulary { force } => {
            let engine = LevelingEngine::from_config(&config.leveling)?;
            let report =
                pipeline::backfill_vocabulary(&engine, &store, &config.batch, *force).await?;
            print_report(&report)
        }
        Command::RepairImages { force } => {
            let report = pipeline::repair_images(&store, *force).await?;
            print_report(&report)
        }
        Command::Purge => {
            let removed = pipeline::purge(&store).await?;
            println!("{}", serde_json::json!({ "deleted": removed }));
            Ok(())
        }
    }
}

fn image_resolver(config: &Config) -> Result<ImageResolver<HttpImageSearch>> {
    let search = match &config.image_search {
        Some(search_config) => Some(HttpImageSearch::new(search_config)?),
        None => None,
    };
    Ok(ImageResolver::new(search))
}

fn print_report(report: &PipelineReport) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(report)?);
    Ok(())
}

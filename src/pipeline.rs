//! The pipeline orchestrator: candidate filtering, the two ingestion
//! phases, the refresh variant and the maintenance operations.
//!
//! # Two phases
//!
//! A single invocation runs under a hard wall-clock ceiling, and leveling an
//! article (five rewrites plus exercises and vocabulary) is far too slow to
//! do inline with feed fetching for more than a couple of items. Work is
//! therefore split into two independently-triggerable phases sharing the
//! same storage and dedup contract:
//!
//! 1. **Fetch** (cheap, high fan-out): read all feeds, drop candidates
//!    already in the store, extract up to `n_fetch` of the rest and persist
//!    them as Raw articles.
//! 2. **Level** (expensive, low fan-out): pick up to `n_level` Raw articles
//!    and drive each through the leveling engine, mutating the row in place
//!    to Leveled.
//!
//! The only defense against the invocation deadline is keeping batch sizes
//! small; there is no mid-batch checkpointing. An item lost mid-flight is
//! simply reconsidered by the next invocation.
//!
//! # Isolation
//!
//! Items within a batch are processed concurrently (bounded by
//! `sub_batch`) and settle independently: one failure never cancels or
//! aborts siblings. Every item resolves to an [`ItemOutcome`] and the
//! invocation always returns a full [`PipelineReport`]. Only a failure of
//! the feed aggregation itself (upstream of any per-item work) aborts the
//! whole invocation.

use std::collections::HashSet;
use std::time::Duration;

use futures::future::join;
use futures::stream::{self, StreamExt};
use tokio::time::sleep;
use tracing::{error, info, instrument, warn};

use crate::config::BatchConfig;
use crate::error::{PipelineError, Result};
use crate::extract::ExtractArticle;
use crate::feeds::FetchNews;
use crate::images::{ImageResolver, SearchImage, fallback_alt, resolve_fallback_image};
use crate::leveling::LevelingModel;
use crate::models::{Article, ItemOutcome, NewsItem, PipelineReport};
use crate::store::ArticleStore;

/// Order-preserving set difference: keep candidates whose source URL is not
/// yet in the ledger. Pure; the race against a concurrent invocation
/// accepting the same candidate is resolved later by the storage layer's
/// unique constraint.
pub fn filter_new(candidates: Vec<NewsItem>, existing: &HashSet<String>) -> Vec<NewsItem> {
    candidates
        .into_iter()
        .filter(|c| !existing.contains(&c.source_url))
        .collect()
}

/// Phase 1, fetch: discover candidates, dedup, extract and persist Raw
/// articles.
#[instrument(level = "info", skip_all)]
pub async fn run_fetch<F, X, I, S>(
    feeds: &F,
    extractor: &X,
    images: &ImageResolver<I>,
    store: &S,
    batch: &BatchConfig,
) -> Result<PipelineReport>
where
    F: FetchNews,
    X: ExtractArticle,
    I: SearchImage,
    S: ArticleStore,
{
    let candidates = feeds.fetch_all_news().await?;
    let existing = store.source_urls().await?;
    let fresh = filter_new(candidates, &existing);
    info!(fresh = fresh.len(), known = existing.len(), "Filtered candidates");

    let accepted: Vec<NewsItem> = fresh.into_iter().take(batch.n_fetch).collect();
    let outcomes: Vec<ItemOutcome> = stream::iter(accepted)
        .map(|item| ingest_one(extractor, images, store, item))
        .buffer_unordered(batch.sub_batch.max(1))
        .collect()
        .await;

    let mut report = PipelineReport::new();
    for outcome in outcomes {
        report.record(outcome);
    }
    info!(
        considered = report.considered,
        succeeded = report.succeeded,
        skipped = report.skipped,
        failed = report.failed,
        "Fetch phase complete"
    );
    Ok(report)
}

/// Extract, resolve an image for, and persist one candidate. Never
/// propagates: every failure mode becomes an outcome.
async fn ingest_one<X, I, S>(
    extractor: &X,
    images: &ImageResolver<I>,
    store: &S,
    item: NewsItem,
) -> ItemOutcome
where
    X: ExtractArticle,
    I: SearchImage,
    S: ArticleStore,
{
    let url = item.source_url.clone();

    let text = match extractor.full_text(&url).await {
        Ok(Some(text)) => text,
        Ok(None) => {
            warn!(%url, "Extraction produced no usable text; skipping");
            return ItemOutcome::skipped(url, "extraction produced no usable text");
        }
        Err(e) => {
            error!(%url, error = %e, "Extraction failed");
            return ItemOutcome::error(url, e.to_string());
        }
    };

    let (hero_image, hero_alt) = images.resolve(&item.title, item.category, &url).await;
    let article = Article::new_raw(&item, text, Some(hero_image), Some(hero_alt));

    match store.insert(&article).await {
        Ok(()) => {
            info!(%url, slug = %article.slug, "Ingested raw article");
            ItemOutcome::success(url)
        }
        Err(PipelineError::DuplicateSource(_)) => {
            // Lost a race with a concurrent invocation; the work is done.
            ItemOutcome::skipped(url, "already ingested")
        }
        Err(e) => {
            error!(%url, error = %e, "Failed to store article");
            ItemOutcome::error(url, e.to_string())
        }
    }
}

/// Phase 2, level: drive pending Raw articles through the leveling engine.
#[instrument(level = "info", skip_all)]
pub async fn run_level<L, S>(
    leveler: &L,
    store: &S,
    batch: &BatchConfig,
) -> Result<PipelineReport>
where
    L: LevelingModel,
    S: ArticleStore,
{
    let pending: Vec<Article> = store
        .list()
        .await?
        .into_iter()
        .filter(|a| a.content.is_raw())
        .collect();
    let pending_total = pending.len();

    let accepted: Vec<Article> = pending.into_iter().take(batch.n_level).collect();
    let taken = accepted.len();
    info!(pending = pending_total, taking = taken, "Level phase starting");

    let outcomes: Vec<ItemOutcome> = stream::iter(accepted)
        .map(|article| level_one(leveler, store, article))
        .buffer_unordered(batch.sub_batch.max(1))
        .collect()
        .await;

    let mut report = PipelineReport::new();
    for outcome in outcomes {
        report.record(outcome);
    }
    report.remaining = Some(pending_total - taken);
    info!(
        succeeded = report.succeeded,
        failed = report.failed,
        remaining = pending_total - taken,
        "Level phase complete"
    );
    Ok(report)
}

/// Level one article: five rewrites, then exercises and vocabulary in
/// parallel, then a single in-place update. On any generation failure the
/// article keeps its Raw state and nothing is written, so a later
/// invocation retries it from scratch.
async fn level_one<L, S>(leveler: &L, store: &S, mut article: Article) -> ItemOutcome
where
    L: LevelingModel,
    S: ArticleStore,
{
    let url = article.source_url.clone();

    let Some(raw) = article.content.raw.clone() else {
        return ItemOutcome::skipped(url, "no raw text to level");
    };

    let levels = match leveler.generate_all_levels(&raw).await {
        Ok(levels) => levels,
        Err(e) => {
            error!(%url, error = %e, "Leveling failed; article stays raw");
            return ItemOutcome::error(url, e.to_string());
        }
    };

    let (exercises, vocabulary) = join(
        leveler.generate_all_exercises(&levels),
        leveler.generate_vocabulary(&levels),
    )
    .await;

    let exercises = match exercises {
        Ok(exercises) => exercises,
        Err(e) => {
            error!(%url, error = %e, "Exercise generation failed; article stays raw");
            return ItemOutcome::error(url, e.to_string());
        }
    };
    let vocabulary = match vocabulary {
        Ok(vocabulary) => vocabulary,
        Err(e) => {
            error!(%url, error = %e, "Vocabulary generation failed; article stays raw");
            return ItemOutcome::error(url, e.to_string());
        }
    };

    article.apply_levels(levels);
    article.exercises = exercises;
    article.vocabulary = vocabulary;

    match store.update(&article).await {
        Ok(()) => {
            info!(%url, slug = %article.slug, "Article leveled");
            ItemOutcome::success(url)
        }
        Err(e) => {
            error!(%url, error = %e, "Failed to persist leveled article");
            ItemOutcome::error(url, e.to_string())
        }
    }
}

/// Refresh: the admission-controlled variant of phase 1. Keeps attempting
/// candidates, in concurrent sub-batches, until `refresh_target` successes
/// or the `refresh_max_candidates` ceiling is exhausted. The ceiling is what
/// keeps a pathological day (every extraction failing) from running away.
#[instrument(level = "info", skip_all)]
pub async fn run_refresh<F, X, I, S>(
    feeds: &F,
    extractor: &X,
    images: &ImageResolver<I>,
    store: &S,
    batch: &BatchConfig,
) -> Result<PipelineReport>
where
    F: FetchNews,
    X: ExtractArticle,
    I: SearchImage,
    S: ArticleStore,
{
    let candidates = feeds.fetch_all_news().await?;
    let existing = store.source_urls().await?;
    let fresh = filter_new(candidates, &existing);
    let pool: Vec<NewsItem> = fresh
        .into_iter()
        .take(batch.refresh_max_candidates)
        .collect();
    info!(
        pool = pool.len(),
        target = batch.refresh_target,
        "Refresh starting"
    );

    let mut report = PipelineReport::new();
    let mut successes = 0usize;

    for sub_batch in pool.chunks(batch.sub_batch.max(1)) {
        if successes >= batch.refresh_target {
            break;
        }
        let outcomes: Vec<ItemOutcome> = stream::iter(sub_batch.to_vec())
            .map(|item| ingest_one(extractor, images, store, item))
            .buffer_unordered(batch.sub_batch.max(1))
            .collect()
            .await;
        for outcome in outcomes {
            if outcome.status == crate::models::OutcomeStatus::Success {
                successes += 1;
            }
            report.record(outcome);
        }
    }

    info!(
        succeeded = report.succeeded,
        attempted = report.considered,
        target = batch.refresh_target,
        "Refresh complete"
    );
    Ok(report)
}

/// Backfill per-level headlines for Leveled articles.
///
/// Default mode processes only the gap (articles with no headline
/// overrides); forced mode recomputes everything. Failures are isolated per
/// item, and a fixed delay separates model calls for downstream rate-limit
/// courtesy. The operation is not transactional across the set; safe only
/// because re-running it skips completed work.
#[instrument(level = "info", skip_all, fields(force = force))]
pub async fn backfill_headlines<L, S>(
    leveler: &L,
    store: &S,
    batch: &BatchConfig,
    force: bool,
) -> Result<PipelineReport>
where
    L: LevelingModel,
    S: ArticleStore,
{
    let articles = store.list().await?;
    let mut report = PipelineReport::new();
    let mut called_model = false;

    for mut article in articles {
        let url = article.source_url.clone();

        if !article.content.is_leveled() {
            report.record(ItemOutcome::skipped(url, "not leveled yet"));
            continue;
        }
        if !force && !article.level_titles.is_empty() {
            report.record(ItemOutcome::skipped(url, "headlines already present"));
            continue;
        }

        if called_model {
            sleep(Duration::from_millis(batch.backfill_delay_ms)).await;
        }
        called_model = true;

        let headlines = leveler
            .generate_level_headlines(
                &article.title,
                article.subtitle.as_deref(),
                &article.content.levels,
            )
            .await;
        let outcome = match headlines {
            Ok(headlines) => {
                article.level_titles = headlines.titles;
                article.level_subtitles = headlines.subtitles;
                match store.update(&article).await {
                    Ok(()) => ItemOutcome::success(url),
                    Err(e) => ItemOutcome::error(url, e.to_string()),
                }
            }
            Err(e) => {
                warn!(source_url = %article.source_url, error = %e, "Headline backfill failed for article");
                ItemOutcome::error(url, e.to_string())
            }
        };
        report.record(outcome);
    }

    info!(
        succeeded = report.succeeded,
        skipped = report.skipped,
        failed = report.failed,
        "Headline backfill complete"
    );
    Ok(report)
}

/// Backfill the vocabulary list for Leveled articles. Same skip/force and
/// pacing policy as [`backfill_headlines`].
#[instrument(level = "info", skip_all, fields(force = force))]
pub async fn backfill_vocabulary<L, S>(
    leveler: &L,
    store: &S,
    batch: &BatchConfig,
    force: bool,
) -> Result<PipelineReport>
where
    L: LevelingModel,
    S: ArticleStore,
{
    let articles = store.list().await?;
    let mut report = PipelineReport::new();
    let mut called_model = false;

    for mut article in articles {
        let url = article.source_url.clone();

        if !article.content.is_leveled() {
            report.record(ItemOutcome::skipped(url, "not leveled yet"));
            continue;
        }
        if !force && !article.vocabulary.is_empty() {
            report.record(ItemOutcome::skipped(url, "vocabulary already present"));
            continue;
        }

        if called_model {
            sleep(Duration::from_millis(batch.backfill_delay_ms)).await;
        }
        called_model = true;

        let outcome = match leveler.generate_vocabulary(&article.content.levels).await {
            Ok(vocabulary) => {
                article.vocabulary = vocabulary;
                match store.update(&article).await {
                    Ok(()) => ItemOutcome::success(url),
                    Err(e) => ItemOutcome::error(url, e.to_string()),
                }
            }
            Err(e) => {
                warn!(source_url = %article.source_url, error = %e, "Vocabulary backfill failed for article");
                ItemOutcome::error(url, e.to_string())
            }
        };
        report.record(outcome);
    }

    info!(
        succeeded = report.succeeded,
        skipped = report.skipped,
        failed = report.failed,
        "Vocabulary backfill complete"
    );
    Ok(report)
}

/// Bulk hero-image repair from the deterministic pools.
///
/// Purely computational (no search, no model), so no pacing delay is
/// needed. Default mode fills only missing images; forced mode reassigns
/// every article to its pool image.
#[instrument(level = "info", skip_all, fields(force = force))]
pub async fn repair_images<S>(store: &S, force: bool) -> Result<PipelineReport>
where
    S: ArticleStore,
{
    let articles = store.list().await?;
    let mut report = PipelineReport::new();

    for mut article in articles {
        let url = article.source_url.clone();

        let has_image = article
            .hero_image
            .as_deref()
            .is_some_and(|s| !s.is_empty());
        if !force && has_image {
            report.record(ItemOutcome::skipped(url, "hero image already present"));
            continue;
        }

        article.hero_image =
            Some(resolve_fallback_image(article.category, &article.source_url).to_string());
        article.hero_alt = Some(fallback_alt(article.category));

        let outcome = match store.update(&article).await {
            Ok(()) => ItemOutcome::success(url),
            Err(e) => ItemOutcome::error(url, e.to_string()),
        };
        report.record(outcome);
    }

    info!(
        succeeded = report.succeeded,
        skipped = report.skipped,
        "Image repair complete"
    );
    Ok(report)
}

/// Administrative bulk delete of every stored article.
#[instrument(level = "info", skip_all)]
pub async fn purge<S: ArticleStore>(store: &S) -> Result<usize> {
    let removed = store.delete_all().await?;
    info!(removed, "Purged article store");
    Ok(removed)
}

//! Article persistence.
//!
//! The pipeline's only shared mutable resource. Two backends:
//! - [`FsStore`]: one JSON document per article under a data directory; the
//!   production backend
//! - [`MemoryStore`]: in-process map; used for dry runs and tests
//!
//! # Contract notes
//!
//! - `insert` enforces source-URL uniqueness and signals a violation with
//!   [`PipelineError::DuplicateSource`](crate::error::PipelineError), a
//!   catchable condition, not a crash. This is the only concurrency guard
//!   between overlapping invocations racing on the same candidate.
//! - The dedup ledger is not a separate structure: `source_urls` derives it
//!   from the store on every call, so it stays correct across process
//!   restarts and concurrent invocations.
//! - `list` returns articles ordered by publication time (oldest first,
//!   slug as tie-break) so that "take the first N" batches are stable
//!   across backends.

pub mod fs;
pub mod memory;

use std::collections::HashSet;

use crate::error::Result;
use crate::models::Article;

pub use fs::FsStore;
pub use memory::MemoryStore;

pub trait ArticleStore {
    /// Persist a new article. Fails with `DuplicateSource` when the source
    /// URL is already present.
    async fn insert(&self, article: &Article) -> Result<()>;

    /// Overwrite an existing article (same id). Fails with `Storage` when
    /// the id is unknown: updates never create rows.
    async fn update(&self, article: &Article) -> Result<()>;

    async fn get(&self, id: &str) -> Result<Option<Article>>;

    async fn find_by_source_url(&self, url: &str) -> Result<Option<Article>>;

    /// Every stored article, publication order (oldest first).
    async fn list(&self) -> Result<Vec<Article>>;

    /// The dedup ledger: the set of source URLs already ingested.
    async fn source_urls(&self) -> Result<HashSet<String>>;

    /// Administrative bulk delete. Returns how many articles were removed.
    async fn delete_all(&self) -> Result<usize>;
}

/// Stable ordering shared by the backends.
pub(crate) fn sort_articles(articles: &mut [Article]) {
    articles.sort_by(|a, b| {
        a.published_at
            .cmp(&b.published_at)
            .then_with(|| a.slug.cmp(&b.slug))
    });
}

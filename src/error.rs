//! Error taxonomy for the ingestion pipeline.
//!
//! Errors fall into two tiers with different propagation rules:
//!
//! - **Invocation-level** errors abort the whole run before or during
//!   candidate aggregation: [`PipelineError::Feed`] (the upstream feed
//!   aggregation itself failed, so no per-item work was possible) and
//!   [`PipelineError::Unauthorized`] (a trigger invoked without the
//!   credentials it needs, rejected before any work begins).
//! - **Item-level** errors are caught at the item boundary, tallied into the
//!   invocation report and never abort siblings: [`PipelineError::Extraction`],
//!   [`PipelineError::Generation`] and [`PipelineError::DuplicateSource`].
//!
//! `DuplicateSource` deserves a note: it is how the storage layer signals a
//! unique-key violation on the source URL. Two overlapping invocations racing
//! on the same candidate resolve through it: the loser observes the error
//! and records the item as skipped rather than failed.

use thiserror::Error;

/// All failure modes surfaced by the pipeline and its collaborators.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The upstream feed aggregation failed wholesale. Fatal for the
    /// invocation: no candidate list exists, so no batch work is attempted.
    #[error("feed aggregation failed: {0}")]
    Feed(String),

    /// Extracting readable text from a source page failed. Item-level.
    #[error("article extraction failed: {0}")]
    Extraction(String),

    /// A leveling, exercise, vocabulary or headline generation call failed
    /// or returned malformed data. Item-level; the article keeps its prior
    /// state and is retried on a later invocation.
    #[error("content generation failed: {0}")]
    Generation(String),

    /// An insert hit the unique constraint on the source URL. Item-level,
    /// reported as "skipped".
    #[error("article already ingested: {0}")]
    DuplicateSource(String),

    /// A trigger was invoked without the credentials it requires.
    #[error("missing credentials: {0}")]
    Unauthorized(String),

    /// Configuration could not be loaded or is inconsistent.
    #[error("configuration error: {0}")]
    Config(String),

    /// A storage operation failed for a reason other than a duplicate key.
    #[error("storage error: {0}")]
    Storage(String),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("config parse error: {0}")]
    ConfigParse(#[from] serde_yaml::Error),
}

pub type Result<T> = std::result::Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicate_source_display() {
        let e = PipelineError::DuplicateSource("https://example.com/a".to_string());
        assert_eq!(
            e.to_string(),
            "article already ingested: https://example.com/a"
        );
    }

    #[test]
    fn test_io_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let e: PipelineError = io.into();
        assert!(matches!(e, PipelineError::Io(_)));
    }
}

//! Filesystem-backed article store.
//!
//! One JSON document per article, `{data_dir}/{id}.json`. The directory is
//! created lazily on first write. Documents that fail to parse are logged
//! and skipped on read rather than failing the whole listing, so one
//! corrupt file cannot take the pipeline down.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use tokio::fs;
use tracing::{debug, warn};

use crate::error::{PipelineError, Result};
use crate::models::Article;

use super::{ArticleStore, sort_articles};

pub struct FsStore {
    dir: PathBuf,
}

impl FsStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{id}.json"))
    }

    async fn ensure_dir(&self) -> Result<()> {
        fs::create_dir_all(&self.dir).await?;
        Ok(())
    }

    async fn write_article(&self, article: &Article) -> Result<()> {
        self.ensure_dir().await?;
        let json = serde_json::to_string_pretty(article)?;
        fs::write(self.path_for(&article.id), json).await?;
        Ok(())
    }

    async fn read_article(&self, path: &Path) -> Option<Article> {
        let text = match fs::read_to_string(path).await {
            Ok(text) => text,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Unreadable article file; skipping");
                return None;
            }
        };
        match serde_json::from_str(&text) {
            Ok(article) => Some(article),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Corrupt article file; skipping");
                None
            }
        }
    }
}

impl ArticleStore for FsStore {
    async fn insert(&self, article: &Article) -> Result<()> {
        // Derive the ledger from disk on every insert; never cached.
        if self.source_urls().await?.contains(&article.source_url) {
            return Err(PipelineError::DuplicateSource(article.source_url.clone()));
        }
        self.write_article(article).await?;
        debug!(id = %article.id, slug = %article.slug, "Stored article");
        Ok(())
    }

    async fn update(&self, article: &Article) -> Result<()> {
        let path = self.path_for(&article.id);
        if !fs::try_exists(&path).await? {
            return Err(PipelineError::Storage(format!(
                "unknown article id: {}",
                article.id
            )));
        }
        self.write_article(article).await
    }

    async fn get(&self, id: &str) -> Result<Option<Article>> {
        let path = self.path_for(id);
        if !fs::try_exists(&path).await? {
            return Ok(None);
        }
        Ok(self.read_article(&path).await)
    }

    async fn find_by_source_url(&self, url: &str) -> Result<Option<Article>> {
        Ok(self
            .list()
            .await?
            .into_iter()
            .find(|a| a.source_url == url))
    }

    async fn list(&self) -> Result<Vec<Article>> {
        let mut entries = match fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut articles = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            if let Some(article) = self.read_article(&path).await {
                articles.push(article);
            }
        }
        sort_articles(&mut articles);
        Ok(articles)
    }

    async fn source_urls(&self) -> Result<HashSet<String>> {
        Ok(self
            .list()
            .await?
            .into_iter()
            .map(|a| a.source_url)
            .collect())
    }

    async fn delete_all(&self) -> Result<usize> {
        let mut entries = match fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };

        let mut removed = 0;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) == Some("json") {
                fs::remove_file(&path).await?;
                removed += 1;
            }
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ArticleStatus, Category, NewsItem};

    fn temp_store(tag: &str) -> FsStore {
        let dir = std::env::temp_dir()
            .join("lingua-news-tests")
            .join(format!("{tag}-{}", uuid::Uuid::new_v4()));
        FsStore::new(dir)
    }

    fn article(url: &str) -> Article {
        let item = NewsItem {
            title: format!("Article at {url}"),
            description: String::new(),
            source_name: "test".to_string(),
            source_url: url.to_string(),
            category: Category::General,
            published_at: None,
        };
        Article::new_raw(&item, "body text".to_string(), None, None)
    }

    #[tokio::test]
    async fn test_roundtrip() {
        let store = temp_store("roundtrip");
        let a = article("https://example.com/1");
        store.insert(&a).await.unwrap();

        let loaded = store.get(&a.id).await.unwrap().unwrap();
        assert_eq!(loaded.source_url, a.source_url);
        assert_eq!(loaded.slug, a.slug);
        assert_eq!(loaded.content.status(), ArticleStatus::Raw);
    }

    #[tokio::test]
    async fn test_duplicate_source_url_rejected() {
        let store = temp_store("dup");
        store.insert(&article("https://example.com/1")).await.unwrap();
        let result = store.insert(&article("https://example.com/1")).await;
        assert!(matches!(result, Err(PipelineError::DuplicateSource(_))));
    }

    #[tokio::test]
    async fn test_list_on_missing_dir_is_empty() {
        let store = temp_store("missing");
        assert!(store.list().await.unwrap().is_empty());
        assert!(store.source_urls().await.unwrap().is_empty());
        assert_eq!(store.delete_all().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_update_requires_existing_file() {
        let store = temp_store("update");
        let a = article("https://example.com/1");
        assert!(matches!(
            store.update(&a).await,
            Err(PipelineError::Storage(_))
        ));

        store.insert(&a).await.unwrap();
        let mut changed = a.clone();
        changed.hero_image = Some("https://img.example.com/x.jpg".to_string());
        store.update(&changed).await.unwrap();
        let loaded = store.get(&a.id).await.unwrap().unwrap();
        assert_eq!(
            loaded.hero_image.as_deref(),
            Some("https://img.example.com/x.jpg")
        );
    }

    #[tokio::test]
    async fn test_corrupt_file_is_skipped_not_fatal() {
        let store = temp_store("corrupt");
        store.insert(&article("https://example.com/1")).await.unwrap();
        fs::write(store.dir.join("broken.json"), "{not json").await.unwrap();

        let listed = store.list().await.unwrap();
        assert_eq!(listed.len(), 1);
    }

    #[tokio::test]
    async fn test_legacy_document_without_status_field() {
        let store = temp_store("legacy");
        // A document written before the explicit status marker existed.
        let legacy = serde_json::json!({
            "id": "legacy-1",
            "slug": "legacy-article",
            "sourceUrl": "https://example.com/legacy",
            "title": "Legacy article",
            "content": {"raw": "legacy raw text"},
            "category": "world",
            "publishedAt": "2026-08-01T00:00:00Z"
        });
        store.ensure_dir().await.unwrap();
        fs::write(
            store.dir.join("legacy-1.json"),
            serde_json::to_string(&legacy).unwrap(),
        )
        .await
        .unwrap();

        let loaded = store.get("legacy-1").await.unwrap().unwrap();
        assert_eq!(loaded.content.status(), ArticleStatus::Raw);
        assert!(loaded.word_counts.is_empty());
        assert!(store
            .source_urls()
            .await
            .unwrap()
            .contains("https://example.com/legacy"));
    }

    #[tokio::test]
    async fn test_delete_all_counts() {
        let store = temp_store("purge");
        store.insert(&article("https://example.com/1")).await.unwrap();
        store.insert(&article("https://example.com/2")).await.unwrap();
        assert_eq!(store.delete_all().await.unwrap(), 2);
        assert!(store.list().await.unwrap().is_empty());
    }
}

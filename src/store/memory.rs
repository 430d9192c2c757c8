//! In-memory article store for dry runs and tests.

use std::collections::{HashMap, HashSet};

use tokio::sync::RwLock;

use crate::error::{PipelineError, Result};
use crate::models::Article;

use super::{ArticleStore, sort_articles};

#[derive(Default)]
pub struct MemoryStore {
    articles: RwLock<HashMap<String, Article>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ArticleStore for MemoryStore {
    async fn insert(&self, article: &Article) -> Result<()> {
        let mut articles = self.articles.write().await;
        if articles
            .values()
            .any(|a| a.source_url == article.source_url)
        {
            return Err(PipelineError::DuplicateSource(article.source_url.clone()));
        }
        articles.insert(article.id.clone(), article.clone());
        Ok(())
    }

    async fn update(&self, article: &Article) -> Result<()> {
        let mut articles = self.articles.write().await;
        if !articles.contains_key(&article.id) {
            return Err(PipelineError::Storage(format!(
                "unknown article id: {}",
                article.id
            )));
        }
        articles.insert(article.id.clone(), article.clone());
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<Article>> {
        Ok(self.articles.read().await.get(id).cloned())
    }

    async fn find_by_source_url(&self, url: &str) -> Result<Option<Article>> {
        Ok(self
            .articles
            .read()
            .await
            .values()
            .find(|a| a.source_url == url)
            .cloned())
    }

    async fn list(&self) -> Result<Vec<Article>> {
        let mut all: Vec<Article> = self.articles.read().await.values().cloned().collect();
        sort_articles(&mut all);
        Ok(all)
    }

    async fn source_urls(&self) -> Result<HashSet<String>> {
        Ok(self
            .articles
            .read()
            .await
            .values()
            .map(|a| a.source_url.clone())
            .collect())
    }

    async fn delete_all(&self) -> Result<usize> {
        let mut articles = self.articles.write().await;
        let count = articles.len();
        articles.clear();
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Category, NewsItem};

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
    async fn test_insert_and_lookup() {
        let store = MemoryStore::new();
        let a = article("https://example.com/1");
        store.insert(&a).await.unwrap();

        assert!(store.get(&a.id).await.unwrap().is_some());
        assert!(
            store
                .find_by_source_url("https://example.com/1")
                .await
                .unwrap()
                .is_some()
        );
        assert!(store.get("no-such-id").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_source_url_rejected() {
        let store = MemoryStore::new();
        store.insert(&article("https://example.com/1")).await.unwrap();

        let result = store.insert(&article("https://example.com/1")).await;
        assert!(matches!(result, Err(PipelineError::DuplicateSource(_))));
        assert_eq!(store.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_update_requires_existing_id() {
        let store = MemoryStore::new();
        let a = article("https://example.com/1");
        let result = store.update(&a).await;
        assert!(matches!(result, Err(PipelineError::Storage(_))));

        store.insert(&a).await.unwrap();
        let mut changed = a.clone();
        changed.title = "New title".to_string();
        store.update(&changed).await.unwrap();
        assert_eq!(store.get(&a.id).await.unwrap().unwrap().title, "New title");
    }

    #[tokio::test]
    async fn test_source_urls_is_the_ledger() {
        let store = MemoryStore::new();
        store.insert(&article("https://example.com/1")).await.unwrap();
        store.insert(&article("https://example.com/2")).await.unwrap();

        let ledger = store.source_urls().await.unwrap();
        assert_eq!(ledger.len(), 2);
        assert!(ledger.contains("https://example.com/1"));
    }

    #[tokio::test]
    async fn test_delete_all() {
        let store = MemoryStore::new();
        store.insert(&article("https://example.com/1")).await.unwrap();
        store.insert(&article("https://example.com/2")).await.unwrap();

        assert_eq!(store.delete_all().await.unwrap(), 2);
        assert!(store.list().await.unwrap().is_empty());
        assert!(store.source_urls().await.unwrap().is_empty());
    }
}

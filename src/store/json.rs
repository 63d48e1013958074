//! JSON-file store.
//!
//! Each collection gets two documents inside the store folder:
//!
//! ```text
//! store_folder/
//! ├── headlines.archive.json   # Vec<ArchivedItem>
//! └── headlines.feed.json      # Vec<ExportedItem>
//! ```
//!
//! Writes go to a temporary file that is renamed over the old one, so a crash
//! mid-write never leaves a truncated document behind. A process-local mutex
//! serializes read-modify-write cycles.

use super::{ArchiveStore, FeedStore, cutoff, sort_exports};
use crate::error::StoreError;
use crate::models::{ArchivedItem, ContentHash, ExportedItem, RunId};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{debug, instrument};

/// Store persisting each table as a JSON array.
#[derive(Debug)]
pub struct JsonFileStore {
    folder: PathBuf,
    lock: Mutex<()>,
}

impl JsonFileStore {
    pub fn new(folder: impl Into<PathBuf>) -> Self {
        Self {
            folder: folder.into(),
            lock: Mutex::new(()),
        }
    }

    fn table_path(&self, collection: &str, table: &str) -> PathBuf {
        let safe: String = collection
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        self.folder.join(format!("{safe}.{table}.json"))
    }

    fn archive_path(&self, collection: &str) -> PathBuf {
        self.table_path(collection, "archive")
    }

    fn feed_path(&self, collection: &str) -> PathBuf {
        self.table_path(collection, "feed")
    }
}

async fn load<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>, StoreError> {
    match fs::read(path).await {
        Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
        Err(e) => Err(e.into()),
    }
}

#[instrument(level = "debug", skip(rows), fields(path = %path.display(), rows = rows.len()))]
async fn save<T: Serialize>(path: &Path, rows: &[T]) -> Result<(), StoreError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await?;
    }
    let json = serde_json::to_vec_pretty(rows)?;
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, json).await?;
    fs::rename(&tmp, path).await?;
    debug!("Saved table");
    Ok(())
}

#[async_trait]
impl ArchiveStore for JsonFileStore {
    async fn exists(&self, collection: &str, hash: &ContentHash) -> Result<bool, StoreError> {
        Ok(self.get(collection, hash).await?.is_some())
    }

    async fn create(&self, item: &ArchivedItem) -> Result<(), StoreError> {
        let _guard = self.lock.lock().await;
        let path = self.archive_path(&item.collection);
        let mut rows: Vec<ArchivedItem> = load(&path).await?;
        if rows.iter().any(|r| r.hash == item.hash) {
            return Err(StoreError::Duplicate {
                collection: item.collection.clone(),
                hash: item.hash.to_string(),
            });
        }
        rows.push(item.clone());
        save(&path, &rows).await
    }

    async fn get(
        &self,
        collection: &str,
        hash: &ContentHash,
    ) -> Result<Option<ArchivedItem>, StoreError> {
        let _guard = self.lock.lock().await;
        let rows: Vec<ArchivedItem> = load(&self.archive_path(collection)).await?;
        Ok(rows.into_iter().find(|r| &r.hash == hash))
    }

    async fn query_by_run(
        &self,
        collection: &str,
        run_id: &RunId,
    ) -> Result<Vec<ArchivedItem>, StoreError> {
        let _guard = self.lock.lock().await;
        let mut rows: Vec<ArchivedItem> = load(&self.archive_path(collection)).await?;
        rows.retain(|r| &r.run_id == run_id);
        rows.sort_by_key(|r| r.link.order);
        Ok(rows)
    }

    async fn query_stale(
        &self,
        collection: &str,
        as_of: DateTime<Utc>,
    ) -> Result<Vec<ArchivedItem>, StoreError> {
        let _guard = self.lock.lock().await;
        let mut rows: Vec<ArchivedItem> = load(&self.archive_path(collection)).await?;
        rows.retain(|r| r.retain_until <= as_of);
        Ok(rows)
    }

    async fn tombstone(&self, collection: &str, hash: &ContentHash) -> Result<bool, StoreError> {
        let _guard = self.lock.lock().await;
        let path = self.archive_path(collection);
        let mut rows: Vec<ArchivedItem> = load(&path).await?;
        let Some(row) = rows.iter_mut().find(|r| &r.hash == hash) else {
            return Ok(false);
        };
        row.tombstone();
        save(&path, &rows).await?;
        Ok(true)
    }

    async fn delete(&self, collection: &str, hash: &ContentHash) -> Result<bool, StoreError> {
        let _guard = self.lock.lock().await;
        let path = self.archive_path(collection);
        let mut rows: Vec<ArchivedItem> = load(&path).await?;
        let before = rows.len();
        rows.retain(|r| &r.hash != hash);
        if rows.len() == before {
            return Ok(false);
        }
        save(&path, &rows).await?;
        Ok(true)
    }
}

#[async_trait]
impl FeedStore for JsonFileStore {
    async fn upsert(&self, item: &ExportedItem) -> Result<(), StoreError> {
        let _guard = self.lock.lock().await;
        let path = self.feed_path(&item.collection);
        let mut rows: Vec<ExportedItem> = load(&path).await?;
        match rows.iter_mut().find(|r| r.hash == item.hash) {
            Some(row) => *row = item.clone(),
            None => rows.push(item.clone()),
        }
        save(&path, &rows).await
    }

    async fn list(&self, collection: &str) -> Result<Vec<ExportedItem>, StoreError> {
        let _guard = self.lock.lock().await;
        let mut rows: Vec<ExportedItem> = load(&self.feed_path(collection)).await?;
        sort_exports(&mut rows);
        Ok(rows)
    }

    async fn delete_older_than(
        &self,
        collection: &str,
        max_age_days: u32,
    ) -> Result<usize, StoreError> {
        let before = cutoff(max_age_days);
        let _guard = self.lock.lock().await;
        let path = self.feed_path(collection);
        let mut rows: Vec<ExportedItem> = load(&path).await?;
        let len = rows.len();
        rows.retain(|r| r.exported_at >= before);
        let removed = len - rows.len();
        if removed > 0 {
            save(&path, &rows).await?;
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CandidateLink, CrawlTarget, ItemStatus};
    use chrono::{Duration, Utc};

    fn item(url: &str, run: &RunId) -> ArchivedItem {
        let target = CrawlTarget::new("https://agg.example.com/", "top news");
        let link = CandidateLink {
            title: "Story".into(),
            url: url.into(),
            location: "main headlines, article 1".into(),
            order: 0,
        };
        ArchivedItem::minimal(&target, link, run, ItemStatus::Archived, "test")
    }

    #[tokio::test]
    async fn test_records_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let run = RunId::new("top news", Utc::now());
        let a = item("https://example.com/a", &run);

        {
            let store = JsonFileStore::new(dir.path());
            store.create(&a).await.unwrap();
        }

        let store = JsonFileStore::new(dir.path());
        assert!(store.exists("top news", &a.hash).await.unwrap());
        assert!(matches!(
            store.create(&a).await,
            Err(StoreError::Duplicate { .. })
        ));
        assert!(dir.path().join("top_news.archive.json").exists());
        assert_eq!(store.query_by_run("top news", &run).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_missing_table_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("not-yet"));
        let hash = ContentHash::of("https://example.com/a");
        assert!(!store.exists("news", &hash).await.unwrap());
        assert!(store.list("news").await.unwrap().is_empty());
        assert!(!store.delete("news", &hash).await.unwrap());
    }

    #[tokio::test]
    async fn test_tombstone_persists() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path());
        let run = RunId::new("top news", Utc::now());
        let mut a = item("https://example.com/a", &run);
        a.created_at = Utc::now() - Duration::days(40);
        a.retain_until = Utc::now() - Duration::days(10);
        a.article.attributes.insert("description".into(), "d".into());
        store.create(&a).await.unwrap();

        let stale = store.query_stale("top news", Utc::now()).await.unwrap();
        assert_eq!(stale.len(), 1);
        assert!(store.tombstone("top news", &a.hash).await.unwrap());

        let reopened = JsonFileStore::new(dir.path());
        let row = reopened.get("top news", &a.hash).await.unwrap().unwrap();
        assert!(row.tombstoned);
        assert!(row.article.attributes.is_empty());
        assert_eq!(row.link.url, "https://example.com/a");
    }
}

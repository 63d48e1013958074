//! In-process store backed by hash maps.

use super::{ArchiveStore, FeedStore, cutoff, sort_exports};
use crate::error::StoreError;
use crate::models::{ArchivedItem, ContentHash, ExportedItem, RunId};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;

type Key = (String, ContentHash);

fn key(collection: &str, hash: &ContentHash) -> Key {
    (collection.to_string(), hash.clone())
}

/// Archive and export table kept in memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    archive: RwLock<HashMap<Key, ArchivedItem>>,
    exports: RwLock<HashMap<Key, ExportedItem>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of archived records across all collections.
    pub async fn len(&self) -> usize {
        self.archive.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.archive.read().await.is_empty()
    }

    /// Replace a record wholesale. Lets tests age items.
    pub async fn put(&self, item: ArchivedItem) {
        self.archive
            .write()
            .await
            .insert(key(&item.collection, &item.hash), item);
    }
}

#[async_trait]
impl ArchiveStore for MemoryStore {
    async fn exists(&self, collection: &str, hash: &ContentHash) -> Result<bool, StoreError> {
        Ok(self.archive.read().await.contains_key(&key(collection, hash)))
    }

    async fn create(&self, item: &ArchivedItem) -> Result<(), StoreError> {
        let mut archive = self.archive.write().await;
        let k = key(&item.collection, &item.hash);
        if archive.contains_key(&k) {
            return Err(StoreError::Duplicate {
                collection: item.collection.clone(),
                hash: item.hash.to_string(),
            });
        }
        archive.insert(k, item.clone());
        Ok(())
    }

    async fn get(
        &self,
        collection: &str,
        hash: &ContentHash,
    ) -> Result<Option<ArchivedItem>, StoreError> {
        Ok(self.archive.read().await.get(&key(collection, hash)).cloned())
    }

    async fn query_by_run(
        &self,
        collection: &str,
        run_id: &RunId,
    ) -> Result<Vec<ArchivedItem>, StoreError> {
        let mut items: Vec<ArchivedItem> = self
            .archive
            .read()
            .await
            .values()
            .filter(|i| i.collection == collection && &i.run_id == run_id)
            .cloned()
            .collect();
        items.sort_by_key(|i| i.link.order);
        Ok(items)
    }

    async fn query_stale(
        &self,
        collection: &str,
        as_of: DateTime<Utc>,
    ) -> Result<Vec<ArchivedItem>, StoreError> {
        Ok(self
            .archive
            .read()
            .await
            .values()
            .filter(|i| i.collection == collection && i.retain_until <= as_of)
            .cloned()
            .collect())
    }

    async fn tombstone(&self, collection: &str, hash: &ContentHash) -> Result<bool, StoreError> {
        match self.archive.write().await.get_mut(&key(collection, hash)) {
            Some(item) => {
                item.tombstone();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete(&self, collection: &str, hash: &ContentHash) -> Result<bool, StoreError> {
        Ok(self
            .archive
            .write()
            .await
            .remove(&key(collection, hash))
            .is_some())
    }
}

#[async_trait]
impl FeedStore for MemoryStore {
    async fn upsert(&self, item: &ExportedItem) -> Result<(), StoreError> {
        self.exports
            .write()
            .await
            .insert(key(&item.collection, &item.hash), item.clone());
        Ok(())
    }

    async fn list(&self, collection: &str) -> Result<Vec<ExportedItem>, StoreError> {
        let mut rows: Vec<ExportedItem> = self
            .exports
            .read()
            .await
            .values()
            .filter(|e| e.collection == collection)
            .cloned()
            .collect();
        sort_exports(&mut rows);
        Ok(rows)
    }

    async fn delete_older_than(
        &self,
        collection: &str,
        max_age_days: u32,
    ) -> Result<usize, StoreError> {
        let before = cutoff(max_age_days);
        let mut exports = self.exports.write().await;
        let len = exports.len();
        exports.retain(|_, e| e.collection != collection || e.exported_at >= before);
        Ok(len - exports.len())
    }
}

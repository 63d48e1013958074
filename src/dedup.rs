//! Hash-keyed existence gate in front of every article fetch.
//!
//! The archive store is the only authority: nothing is cached in-process, so
//! the gate holds across restarts and across concurrent processes.

use crate::error::StoreError;
use crate::models::{ContentHash, CrawlTarget};
use crate::store::ArchiveStore;
use std::sync::Arc;
use tracing::debug;

/// Outcome of the dedup check for one candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gate {
    /// Never seen; go ahead and fetch.
    New,
    /// On the feed's explicit denylist.
    Filtered,
    /// Already archived in this collection.
    AlreadyArchived,
}

/// Gatekeeper consulting the feed denylist, then the archive.
#[derive(Clone)]
pub struct Deduplicator {
    store: Arc<dyn ArchiveStore>,
}

impl Deduplicator {
    pub fn new(store: Arc<dyn ArchiveStore>) -> Self {
        Self { store }
    }

    pub async fn exists(&self, collection: &str, hash: &ContentHash) -> Result<bool, StoreError> {
        self.store.exists(collection, hash).await
    }

    /// Decide whether `hash` should be fetched for `target`.
    ///
    /// The denylist is checked first so known-bad hashes never touch the store.
    pub async fn gate(&self, target: &CrawlTarget, hash: &ContentHash) -> Result<Gate, StoreError> {
        if target.is_filtered(hash) {
            debug!(%hash, "Hash is on the feed denylist");
            return Ok(Gate::Filtered);
        }
        if self.exists(&target.collection, hash).await? {
            debug!(%hash, "Hash already archived");
            return Ok(Gate::AlreadyArchived);
        }
        Ok(Gate::New)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ArchivedItem, CandidateLink, ItemStatus, RunId};
    use crate::store::memory::MemoryStore;
    use chrono::Utc;

    #[tokio::test]
    async fn test_gate_outcomes() {
        let store = Arc::new(MemoryStore::new());
        let dedup = Deduplicator::new(store.clone());
        let mut target = CrawlTarget::new("https://agg.example.com/", "news");

        let fresh = ContentHash::of("https://example.com/fresh");
        assert_eq!(dedup.gate(&target, &fresh).await.unwrap(), Gate::New);

        let link = CandidateLink {
            title: "Seen".into(),
            url: "https://example.com/seen".into(),
            location: "main headlines, article 1".into(),
            order: 0,
        };
        let run = RunId::new("news", Utc::now());
        let seen = ArchivedItem::minimal(&target, link, &run, ItemStatus::Archived, "x");
        store.create(&seen).await.unwrap();
        assert_eq!(
            dedup.gate(&target, &seen.hash).await.unwrap(),
            Gate::AlreadyArchived
        );

        target.filters.insert(fresh.to_string());
        assert_eq!(dedup.gate(&target, &fresh).await.unwrap(), Gate::Filtered);
    }

    #[tokio::test]
    async fn test_gate_is_per_collection() {
        let store = Arc::new(MemoryStore::new());
        let dedup = Deduplicator::new(store.clone());
        let news = CrawlTarget::new("https://agg.example.com/", "news");
        let sport = CrawlTarget::new("https://agg.example.com/sport", "sport");

        let link = CandidateLink {
            title: "Shared".into(),
            url: "https://example.com/shared".into(),
            location: "main headlines, article 1".into(),
            order: 0,
        };
        let run = RunId::new("news", Utc::now());
        let item = ArchivedItem::minimal(&news, link, &run, ItemStatus::Archived, "x");
        store.create(&item).await.unwrap();

        assert_eq!(dedup.gate(&news, &item.hash).await.unwrap(), Gate::AlreadyArchived);
        assert_eq!(dedup.gate(&sport, &item.hash).await.unwrap(), Gate::New);
    }
}

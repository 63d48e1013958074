//! Archive and export-table storage boundary.
//!
//! The pipeline only talks to the two traits defined here:
//!
//! | Trait | Role |
//! |-------|------|
//! | [`ArchiveStore`] | One record per (collection, hash); dedup authority |
//! | [`FeedStore`] | Presentation-facing export rows |
//!
//! Two implementations ship with the crate:
//! - [`memory::MemoryStore`]: process-local, used by tests and dry runs
//! - [`json::JsonFileStore`]: one JSON document per collection and table
//!
//! Both enforce uniqueness on (collection, hash) in [`ArchiveStore::create`],
//! so concurrent writers can race into redundant fetches but never into
//! duplicate records.

pub mod json;
pub mod memory;

use crate::error::StoreError;
use crate::models::{ArchivedItem, ContentHash, ExportedItem, RunId};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

/// The archive of fetched items.
#[async_trait]
pub trait ArchiveStore: Send + Sync {
    async fn exists(&self, collection: &str, hash: &ContentHash) -> Result<bool, StoreError>;

    /// Insert a new record; fails with [`StoreError::Duplicate`] if one exists.
    async fn create(&self, item: &ArchivedItem) -> Result<(), StoreError>;

    async fn get(
        &self,
        collection: &str,
        hash: &ContentHash,
    ) -> Result<Option<ArchivedItem>, StoreError>;

    /// Items archived by `run_id`, in discovery order.
    async fn query_by_run(
        &self,
        collection: &str,
        run_id: &RunId,
    ) -> Result<Vec<ArchivedItem>, StoreError>;

    /// Items whose `retain_until` is at or before `as_of`.
    async fn query_stale(
        &self,
        collection: &str,
        as_of: DateTime<Utc>,
    ) -> Result<Vec<ArchivedItem>, StoreError>;

    /// Strip heavy fields from a record. Returns `false` if it does not exist.
    async fn tombstone(&self, collection: &str, hash: &ContentHash) -> Result<bool, StoreError>;

    async fn delete(&self, collection: &str, hash: &ContentHash) -> Result<bool, StoreError>;
}

/// The export table read by the presentation layer.
#[async_trait]
pub trait FeedStore: Send + Sync {
    /// Insert or replace the row for (collection, hash).
    async fn upsert(&self, item: &ExportedItem) -> Result<(), StoreError>;

    /// Rows for a collection, newest export first, then discovery order.
    async fn list(&self, collection: &str) -> Result<Vec<ExportedItem>, StoreError>;

    /// Delete rows exported more than `max_age_days` ago; returns how many.
    async fn delete_older_than(&self, collection: &str, max_age_days: u32)
    -> Result<usize, StoreError>;
}

/// The instant before which something counts as older than `days`.
pub fn cutoff(days: u32) -> DateTime<Utc> {
    Utc::now() - Duration::days(days.into())
}

/// Canonical ordering for [`FeedStore::list`].
pub(crate) fn sort_exports(rows: &mut [ExportedItem]) {
    rows.sort_by(|a, b| {
        b.exported_at
            .cmp(&a.exported_at)
            .then(a.order.cmp(&b.order))
    });
}

//! The per-feed crawl state machine.
//!
//! ```text
//! FetchIndex → GenerateCandidates → { DedupCheck → [skip | FetchContent → Extract → PostProcess → Persist] }* → Export → Purge
//! ```
//!
//! Only a failed index fetch (or a cancellation before it) aborts a feed.
//! Everything after that is isolated per item: a fetch, extraction or store
//! failure is logged with the item's hash and URL and the rest of the batch
//! carries on. Items run on a bounded pool of `workers` futures and check the
//! cancellation token before starting, so a cancelled run stops between items
//! and every record it did write is complete.

use crate::config::{Config, SiteDefinitionProvider};
use crate::dedup::{Deduplicator, Gate};
use crate::discovery::{HeadlineDiscovery, LinkDiscovery, SelectorDiscovery};
use crate::error::{CrawlError, FetchError, StoreError};
use crate::extract::{StrategyRegistry, extract_article};
use crate::fetcher::{Fetcher, read_artifact};
use crate::models::{
    ArchivedItem, CandidateLink, ContentHash, CrawlTarget, ExtractedArticle, ItemStatus, RunId,
};
use crate::normalizer::{host_is_excluded, host_of, looks_like_home_page, site_key};
use crate::outputs::{render, rss};
use crate::postprocess;
use crate::store::{ArchiveStore, FeedStore};
use chrono::{Duration as ChronoDuration, Utc};
use futures::stream::{self, StreamExt};
use itertools::Itertools;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::fs;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};
use url::Url;

/// Which of the trailing stages a run performs.
#[derive(Debug, Clone, Copy)]
pub struct RunOptions {
    pub export: bool,
    pub purge: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            export: true,
            purge: true,
        }
    }
}

/// What the purge stage removed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PurgeReport {
    pub files_deleted: usize,
    pub records_tombstoned: usize,
    pub exports_deleted: usize,
}

impl PurgeReport {
    pub fn total(&self) -> usize {
        self.files_deleted + self.records_tombstoned + self.exports_deleted
    }
}

/// Per-run counters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub run_id: RunId,
    pub candidates: usize,
    pub archived: usize,
    /// Recorded without fetching.
    pub skipped: usize,
    pub failed: usize,
    pub filtered: usize,
    pub duplicates: usize,
    /// Lost to store errors; picked up again next run.
    pub dropped: usize,
    pub cancelled: usize,
    pub exported: usize,
    pub purge: Option<PurgeReport>,
}

impl RunSummary {
    fn new(run_id: RunId) -> Self {
        Self {
            run_id,
            candidates: 0,
            archived: 0,
            skipped: 0,
            failed: 0,
            filtered: 0,
            duplicates: 0,
            dropped: 0,
            cancelled: 0,
            exported: 0,
            purge: None,
        }
    }

    fn record(&mut self, outcome: ItemOutcome) {
        match outcome {
            ItemOutcome::Archived => self.archived += 1,
            ItemOutcome::Skipped => self.skipped += 1,
            ItemOutcome::Failed => self.failed += 1,
            ItemOutcome::Filtered => self.filtered += 1,
            ItemOutcome::Duplicate => self.duplicates += 1,
            ItemOutcome::Dropped => self.dropped += 1,
            ItemOutcome::Cancelled => self.cancelled += 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ItemOutcome {
    Archived,
    Skipped,
    Failed,
    Filtered,
    Duplicate,
    Dropped,
    Cancelled,
}

/// Drives feeds through fetch, extraction, persistence, export and purge.
pub struct Crawler {
    fetcher: Fetcher,
    archive: Arc<dyn ArchiveStore>,
    feeds: Arc<dyn FeedStore>,
    dedup: Deduplicator,
    sites: Box<dyn SiteDefinitionProvider>,
    registry: StrategyRegistry,
    excluded_hosts: Vec<String>,
    crawl_limits: HashMap<String, usize>,
    workers: usize,
    feed_output_dir: PathBuf,
}

impl Crawler {
    pub fn new(
        config: &Config,
        fetcher: Fetcher,
        archive: Arc<dyn ArchiveStore>,
        feeds: Arc<dyn FeedStore>,
    ) -> Self {
        Self {
            fetcher,
            dedup: Deduplicator::new(archive.clone()),
            archive,
            feeds,
            sites: Box::new(config.sites.clone()),
            registry: StrategyRegistry::with_defaults(),
            excluded_hosts: config.excluded_hosts.clone(),
            crawl_limits: config.flags.crawl_limits.clone(),
            workers: config.workers.max(1),
            feed_output_dir: config.feed_output_dir.clone(),
        }
    }

    /// Run one feed end to end.
    ///
    /// # Arguments
    ///
    /// * `target` - The feed to crawl
    /// * `options` - Whether to export and purge after archiving
    /// * `cancel` - Stops new items from starting; items in flight finish
    ///
    /// # Returns
    ///
    /// Per-outcome counters for the run. After a cancellation the summary is
    /// still returned but export and purge are skipped.
    ///
    /// # Errors
    ///
    /// - [`CrawlError::Cancelled`] when `cancel` fired before the index fetch
    /// - [`CrawlError::IndexFetch`] when the index page cannot be fetched or read
    #[instrument(level = "info", skip_all, fields(collection = %target.collection, feed = %target.feed_url))]
    pub async fn run(
        &self,
        target: &CrawlTarget,
        options: RunOptions,
        cancel: &CancellationToken,
    ) -> Result<RunSummary, CrawlError> {
        if cancel.is_cancelled() {
            return Err(CrawlError::Cancelled);
        }
        let run_id = RunId::new(&target.collection, Utc::now());
        let mut summary = RunSummary::new(run_id.clone());

        let index = self.fetcher.fetch(&target.feed_url).await?;
        if target.capture_thumbnail {
            let hash = ContentHash::of(&target.feed_url);
            self.fetcher.capture_thumbnail(&target.feed_url, &hash).await;
        }
        let index_html = read_artifact(&index).await.map_err(FetchError::Io)?;

        let candidates = self.generate_candidate_links(target, &index_html);
        summary.candidates = candidates.len();

        let outcomes: Vec<ItemOutcome> = stream::iter(candidates)
            .map(|candidate| self.process(candidate, target, &run_id, cancel))
            .buffer_unordered(self.workers)
            .collect()
            .await;
        for outcome in outcomes {
            summary.record(outcome);
        }

        if cancel.is_cancelled() {
            warn!(
                cancelled = summary.cancelled,
                "Run cancelled; skipping export and purge"
            );
            return Ok(summary);
        }

        if options.export {
            match self.export_run(&run_id, target).await {
                Ok(n) => summary.exported = n,
                Err(e) => error!(error = %e, %run_id, "Export failed"),
            }
        }
        if options.purge {
            match self.purge(target).await {
                Ok(report) => summary.purge = Some(report),
                Err(e) => error!(error = %e, "Purge failed"),
            }
        }

        info!(
            %run_id,
            candidates = summary.candidates,
            archived = summary.archived,
            skipped = summary.skipped,
            failed = summary.failed,
            duplicates = summary.duplicates,
            filtered = summary.filtered,
            dropped = summary.dropped,
            exported = summary.exported,
            "Feed run finished"
        );
        Ok(summary)
    }

    /// Discover, de-duplicate, cap and number the candidate links of an index page.
    ///
    /// # Returns
    ///
    /// Links in discovery order, unique by case-insensitive URL, truncated to
    /// the collection's crawl limit, with `order` renumbered from zero. An
    /// unparsable feed URL or a bad link selector yields no links.
    #[instrument(level = "info", skip_all, fields(collection = %target.collection))]
    pub fn generate_candidate_links(
        &self,
        target: &CrawlTarget,
        index_html: &str,
    ) -> Vec<CandidateLink> {
        let base = match Url::parse(&target.feed_url) {
            Ok(base) => base,
            Err(e) => {
                error!(error = %e, "Feed URL does not parse");
                return Vec::new();
            }
        };
        let selector = site_key(&target.feed_url)
            .and_then(|site| self.sites.definition(&site))
            .and_then(|d| d.links.clone());
        let discovery: Box<dyn LinkDiscovery> = match selector {
            Some(selector) => Box::new(SelectorDiscovery::new(selector)),
            None => Box::new(HeadlineDiscovery),
        };

        let discovered = match discovery.discover(index_html, &base) {
            Ok(links) => links,
            Err(e) => {
                error!(error = %e, "Link discovery failed");
                return Vec::new();
            }
        };
        let found = discovered.len();
        let mut links: Vec<CandidateLink> = discovered
            .into_iter()
            .unique_by(|l| l.url.to_lowercase())
            .collect();
        if let Some(&limit) = self.crawl_limits.get(&target.collection) {
            links.truncate(limit);
        }
        for (order, link) in links.iter_mut().enumerate() {
            link.order = order;
        }

        info!(found, kept = links.len(), "Generated candidate links");
        links
    }

    /// Gate, fetch, extract and persist one candidate.
    #[instrument(level = "info", skip_all, fields(url = %candidate.url))]
    async fn process(
        &self,
        candidate: CandidateLink,
        target: &CrawlTarget,
        run_id: &RunId,
        cancel: &CancellationToken,
    ) -> ItemOutcome {
        if cancel.is_cancelled() {
            return ItemOutcome::Cancelled;
        }
        let hash = ContentHash::of(&candidate.url);
        match self.dedup.gate(target, &hash).await {
            Ok(Gate::New) => {}
            Ok(Gate::Filtered) => return ItemOutcome::Filtered,
            Ok(Gate::AlreadyArchived) => return ItemOutcome::Duplicate,
            Err(e) => {
                error!(%hash, stage = "dedup", error = %e, "Store lookup failed; dropping item");
                return ItemOutcome::Dropped;
            }
        }

        let url = candidate.url.clone();
        let item = self.fetch_and_extract(candidate, target, run_id).await;
        let outcome = match item.status {
            ItemStatus::Archived => ItemOutcome::Archived,
            ItemStatus::Skipped => ItemOutcome::Skipped,
            ItemStatus::Failed => ItemOutcome::Failed,
        };

        match self.archive.create(&item).await {
            Ok(()) => outcome,
            Err(StoreError::Duplicate { .. }) => {
                warn!(%hash, "Another writer archived this item first");
                ItemOutcome::Duplicate
            }
            Err(e) => {
                error!(%hash, %url, stage = "persist", error = %e, "Failed to persist item");
                ItemOutcome::Dropped
            }
        }
    }

    /// Produce the archive record for a candidate. Never fails: anything that
    /// cannot be fetched becomes a minimal `Skipped` or `Failed` record.
    #[instrument(level = "info", skip_all, fields(url = %candidate.url))]
    pub async fn fetch_and_extract(
        &self,
        candidate: CandidateLink,
        target: &CrawlTarget,
        run_id: &RunId,
    ) -> ArchivedItem {
        let Some(host) = host_of(&candidate.url) else {
            warn!("Candidate URL has no host");
            return ArchivedItem::minimal(target, candidate, run_id, ItemStatus::Failed, "invalid URL");
        };
        if host_is_excluded(&host, &self.excluded_hosts)
            || host_is_excluded(&host, &target.excluded_hosts)
        {
            debug!(%host, "Host is excluded");
            return ArchivedItem::minimal(target, candidate, run_id, ItemStatus::Skipped, "excluded host");
        }
        if looks_like_home_page(&candidate.url) {
            debug!("Link points at a home page");
            return ArchivedItem::minimal(target, candidate, run_id, ItemStatus::Skipped, "home page");
        }

        let fetched = match self.fetcher.fetch(&candidate.url).await {
            Ok(fetched) => fetched,
            Err(e) => {
                warn!(error = %e, "Fetch failed on every tier");
                return ArchivedItem::minimal(target, candidate, run_id, ItemStatus::Failed, e.to_string());
            }
        };

        let mut article = ExtractedArticle::default();
        if !fetched.kind.is_binary() {
            match read_artifact(&fetched).await {
                Ok(html) => {
                    let site = site_key(&fetched.true_url).unwrap_or(host);
                    article = extract_article(&html, self.sites.definition(&site), &self.registry);
                    postprocess::apply(&mut article, &fetched.true_url);
                }
                Err(e) => error!(path = %fetched.path.display(), error = %e, "Cannot read artifact"),
            }
        }

        let created_at = Utc::now();
        ArchivedItem {
            collection: target.collection.clone(),
            hash: ContentHash::of(&candidate.url),
            link: candidate,
            fetch: Some(fetched),
            article,
            run_id: run_id.clone(),
            status: ItemStatus::Archived,
            note: None,
            created_at,
            retain_until: created_at + ChronoDuration::days(target.record_retention_days.into()),
            tombstoned: false,
        }
    }

    /// Render this run's items into the export table and rewrite the RSS file.
    ///
    /// # Returns
    ///
    /// How many items were rendered; `0` for feeds that are not exportable.
    ///
    /// # Errors
    ///
    /// Store failures, or [`CrawlError::Output`] when the feed file cannot be written.
    #[instrument(level = "info", skip_all, fields(collection = %target.collection, %run_id))]
    pub async fn export_run(&self, run_id: &RunId, target: &CrawlTarget) -> Result<usize, CrawlError> {
        if !target.exportable {
            debug!("Feed is not exportable");
            return Ok(0);
        }
        let items = self.archive.query_by_run(&target.collection, run_id).await?;
        let exported_at = Utc::now();
        for item in &items {
            let row = render::render(item, exported_at);
            debug!(hash = %row.hash, template = ?row.template, "Exporting item");
            self.feeds.upsert(&row).await?;
        }

        let rows = self.feeds.list(&target.collection).await?;
        rss::write_feed(&self.feed_output_dir, target, &rows)
            .await
            .map_err(|e| CrawlError::Output(e.to_string()))?;

        info!(count = items.len(), "Exported run");
        Ok(items.len())
    }

    /// Apply the feed's retention policy.
    ///
    /// # Behavior
    ///
    /// - working-folder files at least `file_retention_days` old are deleted
    ///   (a window of 0 deletes every file)
    /// - archive records whose `retain_until` has passed are tombstoned; the
    ///   deadline was fixed from `record_retention_days` when the item was
    ///   archived, so changing the window later only affects new items
    /// - export rows older than `export_retention_days` are deleted
    ///
    /// # Errors
    ///
    /// Store failures abort the purge; file deletion errors are only logged.
    #[instrument(level = "info", skip_all, fields(collection = %target.collection))]
    pub async fn purge(&self, target: &CrawlTarget) -> Result<PurgeReport, CrawlError> {
        let mut report = PurgeReport {
            files_deleted: self.purge_files(target.file_retention_days).await,
            ..PurgeReport::default()
        };

        let stale = self
            .archive
            .query_stale(&target.collection, Utc::now())
            .await?;
        for item in stale.iter().filter(|i| !i.tombstoned) {
            if self.archive.tombstone(&target.collection, &item.hash).await? {
                report.records_tombstoned += 1;
            }
        }

        report.exports_deleted = self
            .feeds
            .delete_older_than(&target.collection, target.export_retention_days)
            .await?;

        info!(
            files = report.files_deleted,
            tombstoned = report.records_tombstoned,
            exports = report.exports_deleted,
            "Purged expired data"
        );
        Ok(report)
    }

    /// Delete working-folder files at least `days` old. Errors are logged per file.
    async fn purge_files(&self, days: u32) -> usize {
        let folder = self.fetcher.working_folder();
        let window = Duration::from_secs(u64::from(days) * 24 * 60 * 60);
        let mut entries = match fs::read_dir(folder).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return 0,
            Err(e) => {
                error!(folder = %folder.display(), error = %e, "Cannot list working folder");
                return 0;
            }
        };

        let now = SystemTime::now();
        let mut deleted = 0;
        loop {
            let entry = match entries.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(e) => {
                    error!(error = %e, "Failed to read working folder entry");
                    break;
                }
            };
            let path = entry.path();
            let modified = match entry.metadata().await.and_then(|m| {
                if m.is_file() {
                    m.modified().map(Some)
                } else {
                    Ok(None)
                }
            }) {
                Ok(Some(modified)) => modified,
                Ok(None) => continue,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Cannot stat file");
                    continue;
                }
            };
            let age = now.duration_since(modified).unwrap_or_default();
            if age < window {
                continue;
            }
            match fs::remove_file(&path).await {
                Ok(()) => {
                    debug!(path = %path.display(), "Deleted expired artifact");
                    deleted += 1;
                }
                Err(e) => warn!(path = %path.display(), error = %e, "Failed to delete artifact"),
            }
        }
        deleted
    }
}

//! Data models shared by every stage of the crawl pipeline.
//!
//! - [`CrawlTarget`]: one aggregator feed and its retention policy
//! - [`CandidateLink`]: a link discovered on the index page, not yet fetched
//! - [`ContentHash`]: the identity key of every archived URL
//! - [`FetchResult`]: what the fetcher wrote to disk and how it got it
//! - [`ExtractedArticle`]: metadata maps plus the cleaned article fragment
//! - [`ArchivedItem`]: the persisted record combining all of the above
//! - [`ExportedItem`]: the presentation-facing row rendered from an item

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::path::PathBuf;

fn default_file_retention_days() -> u32 {
    7
}

fn default_record_retention_days() -> u32 {
    30
}

fn default_export_retention_days() -> u32 {
    30
}

fn default_true() -> bool {
    true
}

/// An aggregator feed to crawl. Immutable for the duration of a run.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CrawlTarget {
    /// The aggregator index page.
    pub feed_url: String,
    /// Collection the archived items belong to.
    pub collection: String,
    /// Human-readable feed title used for the RSS channel.
    #[serde(default)]
    pub title: Option<String>,
    /// Hashes that must never be fetched for this feed.
    #[serde(default)]
    pub filters: HashSet<String>,
    /// Age in days after which on-disk artifacts are deleted.
    #[serde(default = "default_file_retention_days")]
    pub file_retention_days: u32,
    /// Age in days after which archived records are tombstoned.
    #[serde(default = "default_record_retention_days")]
    pub record_retention_days: u32,
    /// Age in days after which exported rows are deleted.
    #[serde(default = "default_export_retention_days")]
    pub export_retention_days: u32,
    /// Take a screenshot of the index page on each run.
    #[serde(default)]
    pub capture_thumbnail: bool,
    /// Render this feed's items into the export table.
    #[serde(default = "default_true")]
    pub exportable: bool,
    /// Hosts whose articles are recorded but never fetched for this feed.
    #[serde(default)]
    pub excluded_hosts: Vec<String>,
}

impl CrawlTarget {
    /// A target with default retention and flags.
    pub fn new(feed_url: impl Into<String>, collection: impl Into<String>) -> Self {
        Self {
            feed_url: feed_url.into(),
            collection: collection.into(),
            title: None,
            filters: HashSet::new(),
            file_retention_days: default_file_retention_days(),
            record_retention_days: default_record_retention_days(),
            export_retention_days: default_export_retention_days(),
            capture_thumbnail: false,
            exportable: true,
            excluded_hosts: Vec::new(),
        }
    }

    /// Whether the hash is on this feed's denylist.
    pub fn is_filtered(&self, hash: &ContentHash) -> bool {
        self.filters.contains(hash.as_str())
    }
}

/// MD5 digest of the lowercased URL, as lowercase hex.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize, Serialize)]
#[serde(transparent)]
pub struct ContentHash(String);

impl ContentHash {
    /// Hash a URL. Case differences in the URL never change the identity.
    pub fn of(url: &str) -> Self {
        Self(format!("{:x}", md5::compute(url.to_lowercase().as_bytes())))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier shared by every item archived in one feed run.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(transparent)]
pub struct RunId(String);

impl RunId {
    pub fn new(collection: &str, at: DateTime<Utc>) -> Self {
        Self(format!("{}-{}", collection, at.format("%Y%m%d%H%M%S")))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A title + URL pair found on an index page.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct CandidateLink {
    pub title: String,
    pub url: String,
    /// Where on the index page the link sat, e.g. `"main headlines, article 3"`.
    pub location: String,
    /// Zero-based position in discovery order.
    pub order: usize,
}

/// Content kind sniffed from the URL before fetching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentKind {
    Html,
    Png,
    Jpg,
    Gif,
    Pdf,
}

impl ContentKind {
    /// File extension including the leading dot.
    pub fn extension(self) -> &'static str {
        match self {
            ContentKind::Html => ".html",
            ContentKind::Png => ".png",
            ContentKind::Jpg => ".jpg",
            ContentKind::Gif => ".gif",
            ContentKind::Pdf => ".pdf",
        }
    }

    pub fn mime(self) -> &'static str {
        match self {
            ContentKind::Html => "text/html",
            ContentKind::Png => "image/png",
            ContentKind::Jpg => "image/jpeg",
            ContentKind::Gif => "image/gif",
            ContentKind::Pdf => "application/pdf",
        }
    }

    /// Anything but HTML is downloaded as raw bytes.
    pub fn is_binary(self) -> bool {
        !matches!(self, ContentKind::Html)
    }

    pub fn is_graphic(self) -> bool {
        matches!(self, ContentKind::Png | ContentKind::Jpg | ContentKind::Gif)
    }
}

/// Which fetch tier produced the artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FetchMethod {
    Primary,
    Fallback,
}

/// The outcome of a successful fetch. Immutable once written.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct FetchResult {
    pub status: u16,
    pub path: PathBuf,
    pub kind: ContentKind,
    /// `Content-Type` reported by the server, if any.
    pub mime: Option<String>,
    /// URL after redirects.
    pub true_url: String,
    pub method: FetchMethod,
    pub fetched_at: DateTime<Utc>,
}

/// Metadata and article body extracted from a fetched page.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct ExtractedArticle {
    /// `og:*` properties, keyed by the full property name.
    pub open_graph: BTreeMap<String, String>,
    /// Other page attributes: `<meta name>` values, `title`, `canonical`.
    pub attributes: BTreeMap<String, String>,
    /// Cleaned article HTML fragment.
    pub html: String,
    /// Name of the strategy that produced `html`.
    pub strategy: String,
}

impl ExtractedArticle {
    pub fn is_empty(&self) -> bool {
        self.html.trim().is_empty()
    }

    pub fn title(&self) -> Option<&str> {
        self.open_graph
            .get("og:title")
            .or_else(|| self.attributes.get("title"))
            .map(String::as_str)
    }

    pub fn description(&self) -> Option<&str> {
        self.open_graph
            .get("og:description")
            .or_else(|| self.attributes.get("description"))
            .map(String::as_str)
            .filter(|d| !d.trim().is_empty())
    }

    /// The URL the page claims for itself.
    pub fn canonical_url(&self) -> Option<&str> {
        self.open_graph
            .get("og:url")
            .or_else(|| self.attributes.get("canonical"))
            .map(String::as_str)
    }

    pub fn cover_image(&self) -> Option<&str> {
        self.open_graph.get("og:image").map(String::as_str)
    }

    pub fn video_url(&self) -> Option<&str> {
        self.open_graph.get("og:video:url").map(String::as_str)
    }
}

/// Lifecycle outcome of a candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemStatus {
    /// Fetched and extracted.
    Archived,
    /// Recorded without fetching (excluded host, home page).
    Skipped,
    /// Every fetch path failed; only the link survives.
    Failed,
}

/// The persisted record for one candidate in one collection.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ArchivedItem {
    pub collection: String,
    pub hash: ContentHash,
    pub link: CandidateLink,
    pub fetch: Option<FetchResult>,
    pub article: ExtractedArticle,
    pub run_id: RunId,
    pub status: ItemStatus,
    /// Why the item was skipped or failed.
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
    pub retain_until: DateTime<Utc>,
    /// Heavy fields were stripped by the retention policy.
    #[serde(default)]
    pub tombstoned: bool,
}

impl ArchivedItem {
    /// A record with no fetch result and no article, used for skips and failures.
    pub fn minimal(
        target: &CrawlTarget,
        link: CandidateLink,
        run_id: &RunId,
        status: ItemStatus,
        note: impl Into<String>,
    ) -> Self {
        let created_at = Utc::now();
        Self {
            collection: target.collection.clone(),
            hash: ContentHash::of(&link.url),
            link,
            fetch: None,
            article: ExtractedArticle::default(),
            run_id: run_id.clone(),
            status,
            note: Some(note.into()),
            created_at,
            retain_until: created_at + Duration::days(target.record_retention_days.into()),
            tombstoned: false,
        }
    }

    /// Strip the heavy attribute maps and body, keeping identity fields.
    pub fn tombstone(&mut self) {
        self.article.open_graph.clear();
        self.article.attributes.clear();
        self.article.html.clear();
        self.tombstoned = true;
    }

    /// Best title available: the link text, then the page's own title, then the URL.
    pub fn display_title(&self) -> &str {
        if !self.link.title.trim().is_empty() {
            &self.link.title
        } else {
            self.article.title().unwrap_or(&self.link.url)
        }
    }
}

/// Rendering template chosen at export time, in priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RenderTemplate {
    Graphic,
    Video,
    Text,
    Minimal,
}

/// A row in the presentation-facing export table.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ExportedItem {
    pub collection: String,
    pub hash: ContentHash,
    pub run_id: RunId,
    pub title: String,
    pub url: String,
    pub location: String,
    /// Discovery order on the index page.
    pub order: usize,
    pub template: RenderTemplate,
    pub body_html: String,
    pub image: Option<String>,
    pub exported_at: DateTime<Utc>,
}

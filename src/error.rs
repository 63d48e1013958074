//! Typed errors for every stage of the crawl pipeline.
//!
//! Each component owns an error enum so callers can tell a transient network
//! hiccup from a fatal content mismatch, and a legitimately empty extraction
//! from one that crashed. The orchestrator catches all of them at the item
//! boundary; only [`CrawlError`] escapes a feed run.

use thiserror::Error;

/// HTTP status codes worth another attempt.
const RETRIABLE_STATUSES: [u16; 7] = [408, 425, 429, 500, 502, 503, 504];

/// Errors raised while fetching a URL (primary or fallback tier).
#[derive(Debug, Error)]
pub enum FetchError {
    /// Connection, DNS or protocol failure.
    #[error("network error fetching {url}: {source}")]
    Network {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// The request did not complete in time.
    #[error("timeout fetching {url}")]
    Timeout { url: String },

    /// The server answered with a non-success status.
    #[error("HTTP {status} fetching {url}")]
    Status { url: String, status: u16 },

    /// The body looks like a bot-challenge interstitial instead of content.
    #[error("anti-bot block at {url} (marker: {marker})")]
    AntiBotBlock { url: String, marker: String },

    /// A binary download came back as something else.
    #[error("content type mismatch for {url}: expected {expected}, got {found}")]
    ContentTypeMismatch {
        url: String,
        expected: String,
        found: String,
    },

    /// The URL could not be parsed.
    #[error("invalid URL: {url}")]
    InvalidUrl { url: String },

    /// The headless browser failed or is not available.
    #[error("browser error: {0}")]
    Browser(String),

    /// Writing the artifact failed.
    #[error("artifact I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl FetchError {
    /// Classify a `reqwest` failure.
    pub fn from_reqwest(url: &str, source: reqwest::Error) -> Self {
        if source.is_timeout() {
            FetchError::Timeout {
                url: url.to_string(),
            }
        } else {
            FetchError::Network {
                url: url.to_string(),
                source,
            }
        }
    }

    /// Whether another attempt with the same method could succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            FetchError::Network { .. } | FetchError::Timeout { .. } => true,
            FetchError::Status { status, .. } => RETRIABLE_STATUSES.contains(status),
            _ => false,
        }
    }

    /// Whether the headless-browser tier should be tried after this failure.
    pub fn should_escalate(&self) -> bool {
        matches!(
            self,
            FetchError::Network { .. }
                | FetchError::Timeout { .. }
                | FetchError::Status { .. }
                | FetchError::AntiBotBlock { .. }
        )
    }
}

/// Errors raised by extraction strategies.
///
/// An empty article is *not* an error; strategies return an empty
/// [`crate::extract::Extraction`] for that.
#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("invalid selector `{selector}`: {reason}")]
    InvalidSelector { selector: String, reason: String },

    #[error("site definition is missing `{field}` for strategy {strategy}")]
    MissingField {
        strategy: &'static str,
        field: &'static str,
    },

    #[error("no inline script contains marker `{marker}`")]
    MarkerNotFound { marker: String },

    #[error("unbalanced JSON object after marker `{marker}`")]
    UnbalancedJson { marker: String },

    #[error("embedded JSON could not be parsed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("path `{path}` not found in embedded JSON")]
    NotFound { path: String },

    #[error("document traversal failed: {0}")]
    Traversal(String),
}

/// Errors raised by archive and feed stores.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Uniqueness on (collection, hash) was violated.
    #[error("item {hash} already archived in {collection}")]
    Duplicate { collection: String, hash: String },

    #[error("store I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("store serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Errors loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot parse config: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Feed-level failures. Anything item-scoped is logged and swallowed instead.
#[derive(Debug, Error)]
pub enum CrawlError {
    #[error("index fetch failed: {0}")]
    IndexFetch(#[from] FetchError),

    #[error("store failure: {0}")]
    Store(#[from] StoreError),

    #[error("feed output failed: {0}")]
    Output(String),

    #[error("run cancelled")]
    Cancelled,
}

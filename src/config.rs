//! YAML configuration: folders, fetch policy, feature flags, site definitions
//! and the feeds to crawl.
//!
//! ```yaml
//! working_folder: ./artifacts
//! store_folder: ./store
//! feed_output_dir: ./feeds
//! workers: 4
//! excluded_hosts: [twitter.com, facebook.com]
//! fetch:
//!   timeout_secs: 20
//!   max_retries: 3
//!   browser_fallback: true
//! flags:
//!   log_level: info
//!   crawl_limits: { headlines: 40 }
//! sites:
//!   example.com:
//!     strategy: selector
//!     body: div.article-body
//!     paragraph: p, h2, ul, blockquote
//! feeds:
//!   - feed_url: https://aggregator.example.com/
//!     collection: headlines
//!     capture_thumbnail: true
//! ```

use crate::error::ConfigError;
use crate::models::CrawlTarget;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, instrument};

/// Browser-like user agent presented by the primary HTTP tier.
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/126.0.0.0 Safari/537.36";

fn default_working_folder() -> PathBuf {
    PathBuf::from("./artifacts")
}

fn default_store_folder() -> PathBuf {
    PathBuf::from("./store")
}

fn default_feed_output_dir() -> PathBuf {
    PathBuf::from("./feeds")
}

fn default_workers() -> usize {
    4
}

fn default_user_agent() -> String {
    DEFAULT_USER_AGENT.to_string()
}

/// Top-level configuration file.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    /// Where fetched artifacts are written.
    #[serde(default = "default_working_folder")]
    pub working_folder: PathBuf,
    /// Where the JSON archive and export tables live.
    #[serde(default = "default_store_folder")]
    pub store_folder: PathBuf,
    /// Where RSS files are written.
    #[serde(default = "default_feed_output_dir")]
    pub feed_output_dir: PathBuf,
    /// Size of the per-item worker pool.
    #[serde(default = "default_workers")]
    pub workers: usize,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default)]
    pub fetch: FetchSettings,
    /// Hosts whose links are recorded but never fetched, for every feed.
    #[serde(default)]
    pub excluded_hosts: Vec<String>,
    #[serde(default)]
    pub flags: Flags,
    /// Site definitions keyed by host (without `www.`).
    #[serde(default)]
    pub sites: HashMap<String, SiteDefinition>,
    #[serde(default)]
    pub feeds: Vec<CrawlTarget>,
}

impl Config {
    /// Read and validate a YAML config file.
    #[instrument(level = "info")]
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let config = Self::from_yaml(&raw)?;
        debug!(
            feeds = config.feeds.len(),
            sites = config.sites.len(),
            "Loaded configuration"
        );
        Ok(config)
    }

    pub fn from_yaml(raw: &str) -> Result<Self, ConfigError> {
        let config: Config = serde_yaml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.workers == 0 {
            return Err(ConfigError::Invalid("workers must be at least 1".into()));
        }
        for feed in &self.feeds {
            if url::Url::parse(&feed.feed_url).is_err() {
                return Err(ConfigError::Invalid(format!(
                    "feed {} has an invalid feed_url: {}",
                    feed.collection, feed.feed_url
                )));
            }
        }
        Ok(())
    }
}

fn default_timeout_secs() -> u64 {
    20
}

fn default_max_retries() -> usize {
    3
}

fn default_base_delay_ms() -> u64 {
    500
}

fn default_max_delay_ms() -> u64 {
    30_000
}

fn default_jitter_ms() -> u64 {
    250
}

fn default_browser_timeout_secs() -> u64 {
    45
}

/// Fetch policy for both tiers.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FetchSettings {
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Retries after the first attempt for transient failures.
    #[serde(default = "default_max_retries")]
    pub max_retries: usize,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    #[serde(default = "default_jitter_ms")]
    pub jitter_ms: u64,
    /// Escalate to a headless browser when the primary tier fails.
    #[serde(default = "default_true")]
    pub browser_fallback: bool,
    #[serde(default = "default_browser_timeout_secs")]
    pub browser_timeout_secs: u64,
    /// Chromium binary; searched on `PATH` when unset.
    #[serde(default)]
    pub chromium_path: Option<PathBuf>,
}

fn default_true() -> bool {
    true
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            jitter_ms: default_jitter_ms(),
            browser_fallback: true,
            browser_timeout_secs: default_browser_timeout_secs(),
            chromium_path: None,
        }
    }
}

impl FetchSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn browser_timeout(&self) -> Duration {
        Duration::from_secs(self.browser_timeout_secs)
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Pass-through feature flags.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Flags {
    /// Default tracing filter when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Maximum candidates crawled per run, keyed by collection.
    #[serde(default)]
    pub crawl_limits: HashMap<String, usize>,
}

impl Default for Flags {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            crawl_limits: HashMap::new(),
        }
    }
}

/// How to extract articles (and optionally discover links) for one site.
///
/// Every field is optional; strategies report the fields they need as
/// [`crate::error::ExtractionError::MissingField`].
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct SiteDefinition {
    /// Registered strategy name; the density strategy is used when unset.
    #[serde(default)]
    pub strategy: Option<String>,
    /// Container selector (`selector`, `linebreak` strategies).
    #[serde(default)]
    pub body: Option<String>,
    /// Paragraph-like selector inside the container.
    #[serde(default)]
    pub paragraph: Option<String>,
    /// Marker string identifying the inline script (`script` strategy).
    #[serde(default)]
    pub marker: Option<String>,
    /// Dotted path to the body inside the embedded JSON (`script` strategy).
    #[serde(default)]
    pub field: Option<String>,
    /// Anchor selector used to discover links on this site's index page.
    #[serde(default)]
    pub links: Option<String>,
}

/// Looks up the extraction definition for a site.
pub trait SiteDefinitionProvider: Send + Sync {
    fn definition(&self, site: &str) -> Option<&SiteDefinition>;
}

impl SiteDefinitionProvider for HashMap<String, SiteDefinition> {
    fn definition(&self, site: &str) -> Option<&SiteDefinition> {
        self.get(site)
            .or_else(|| self.get(site.trim_start_matches("www.")))
    }
}

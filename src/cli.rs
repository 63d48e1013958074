//! Command-line interface for the archiver.
//!
//! Everything that describes *what* to crawl lives in the YAML config; the
//! flags here only pick the config file and narrow or shape a single run.

use clap::Parser;
use std::path::PathBuf;

/// Crawl aggregator feeds, archive the linked articles and export them.
///
/// # Examples
///
/// ```sh
/// # Crawl every feed in ./config.yaml
/// feed_archiver
///
/// # One feed, no retention pass
/// feed_archiver --config /etc/feed_archiver.yaml --feed headlines --skip-purge
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Path to the YAML configuration file
    #[arg(short, long, env = "FEED_ARCHIVER_CONFIG", default_value = "config.yaml")]
    pub config: PathBuf,

    /// Only crawl the feed with this collection name (repeatable)
    #[arg(short, long = "feed")]
    pub feeds: Vec<String>,

    /// Archive items but do not render the export table or RSS files
    #[arg(long)]
    pub skip_export: bool,

    /// Do not apply retention windows after the run
    #[arg(long)]
    pub skip_purge: bool,

    /// Override the configured per-item concurrency
    #[arg(short, long, env = "FEED_ARCHIVER_WORKERS")]
    pub workers: Option<usize>,
}

impl Cli {
    /// Whether the feed with `collection` was selected on the command line.
    pub fn selects(&self, collection: &str) -> bool {
        self.feeds.is_empty() || self.feeds.iter().any(|f| f == collection)
    }
}

//! # Feed Archiver
//!
//! Crawls news-aggregator index pages, archives every article they link to,
//! extracts a clean article body from each page and redistributes the result
//! as an export table and an RSS feed per collection.
//!
//! ## Usage
//!
//! ```sh
//! feed_archiver --config config.yaml
//! ```
//!
//! ## Architecture
//!
//! Feeds run one after another; the items of a feed run concurrently:
//! 1. **Index**: fetch the aggregator page and discover candidate links
//! 2. **Archive**: de-duplicate, fetch (HTTP, then headless browser), extract, persist
//! 3. **Export**: render this run's items and rewrite the collection's RSS file
//! 4. **Purge**: apply the feed's file, record and export retention windows
//!
//! Ctrl-C cancels between items; records already written stay complete.

use clap::Parser;
use feed_archiver::config::Config;
use feed_archiver::crawler::{Crawler, RunOptions};
use feed_archiver::error::CrawlError;
use feed_archiver::fetcher::Fetcher;
use feed_archiver::fetcher::browser::{Renderer, renderer_from_settings};
use feed_archiver::fetcher::http::build_client;
use feed_archiver::store::json::JsonFileStore;
use feed_archiver::utils::ensure_writable_dir;
use std::error::Error;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{EnvFilter, fmt as tfmt};

mod cli;

use cli::Cli;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let args = Cli::parse();
    let mut config = Config::load(&args.config)?;
    if let Some(workers) = args.workers {
        config.workers = workers.max(1);
    }

    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.flags.log_level));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    let start_time = std::time::Instant::now();
    info!(config = %args.config.display(), "feed_archiver starting up");
    debug!(?args, "Parsed CLI arguments");

    for dir in [
        &config.working_folder,
        &config.store_folder,
        &config.feed_output_dir,
    ] {
        if let Err(e) = ensure_writable_dir(dir).await {
            error!(
                path = %dir.display(),
                error = %e,
                "Directory is not writable (fix perms or choose a different path)"
            );
            return Err(e);
        }
    }

    // ---- Composition root ----
    let client = build_client(&config.user_agent, config.fetch.timeout())?;
    let renderer: Option<Arc<dyn Renderer>> =
        renderer_from_settings(&config.fetch).map(|r| Arc::new(r) as _);
    let fetcher = Fetcher::new(
        client,
        &config.fetch,
        config.working_folder.clone(),
        renderer,
    );
    let store = Arc::new(JsonFileStore::new(config.store_folder.clone()));
    let crawler = Crawler::new(&config, fetcher, store.clone(), store);

    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received; stopping after in-flight items");
            interrupt.cancel();
        }
    });

    let options = RunOptions {
        export: !args.skip_export,
        purge: !args.skip_purge,
    };
    let feeds: Vec<_> = config
        .feeds
        .iter()
        .filter(|f| args.selects(&f.collection))
        .collect();
    if feeds.is_empty() {
        warn!(requested = ?args.feeds, "No feeds selected; nothing to do");
    }

    let (mut succeeded, mut failed, mut archived) = (0usize, 0usize, 0usize);
    for feed in feeds {
        match crawler.run(feed, options, &cancel).await {
            Ok(summary) => {
                succeeded += 1;
                archived += summary.archived;
            }
            Err(CrawlError::Cancelled) => {
                info!(collection = %feed.collection, "Skipping remaining feeds after interrupt");
                break;
            }
            Err(e) => {
                failed += 1;
                error!(collection = %feed.collection, error = %e, "Feed run failed");
            }
        }
        if cancel.is_cancelled() {
            break;
        }
    }

    let elapsed = start_time.elapsed();
    info!(
        ?elapsed,
        secs = elapsed.as_secs(),
        millis = elapsed.subsec_millis(),
        feeds_ok = succeeded,
        feeds_failed = failed,
        archived,
        "Execution complete"
    );

    Ok(())
}

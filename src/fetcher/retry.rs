//! Exponential backoff retry decorator for page sources.
//!
//! The design mirrors a classic decorator:
//! - [`PageSource`]: anything that can turn a URL into a [`RawPage`]
//! - [`Retrying`]: wraps a `PageSource` and retries transient failures
//!
//! # Retry Strategy
//!
//! Only errors for which [`FetchError::is_transient`] holds are retried
//! (timeouts, network errors, 408/425/429/5xx gateway statuses). Everything
//! else is returned immediately so the caller can escalate or give up.
//!
//! ```text
//! delay = min(base_delay * 2^(attempt-1), max_delay) + random_jitter(0..=jitter)
//! ```

use crate::config::FetchSettings;
use crate::error::FetchError;
use crate::models::ContentKind;
use rand::{Rng, rng};
use std::fmt;
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::{error, instrument, warn};

/// A fetched response body with the details the archive records.
#[derive(Debug, Clone)]
pub struct RawPage {
    pub status: u16,
    /// URL after redirects.
    pub true_url: String,
    pub mime: Option<String>,
    pub body: Vec<u8>,
}

/// Something that can fetch a URL.
pub trait PageSource {
    /// Fetch `url`, expecting content of `kind`.
    async fn get(&self, url: &str, kind: ContentKind) -> Result<RawPage, FetchError>;
}

/// Backoff parameters.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: usize,
    /// Delay before the first retry; doubles each attempt.
    pub base_delay: Duration,
    /// Cap on the exponential part of the delay.
    pub max_delay: Duration,
    /// Upper bound of the random jitter added to each delay, in milliseconds.
    pub jitter_ms: u64,
}

impl RetryPolicy {
    pub fn from_settings(settings: &FetchSettings) -> Self {
        Self {
            max_retries: settings.max_retries,
            base_delay: Duration::from_millis(settings.base_delay_ms),
            max_delay: Duration::from_millis(settings.max_delay_ms),
            jitter_ms: settings.jitter_ms,
        }
    }

    /// Delay before retry number `attempt` (1-based), without jitter.
    pub fn backoff(&self, attempt: usize) -> Duration {
        let shift = attempt.saturating_sub(1).min(31) as u32;
        self.base_delay
            .saturating_mul(1u32 << shift)
            .min(self.max_delay)
    }
}

/// Wrapper that adds exponential backoff retry logic to any [`PageSource`].
pub struct Retrying<S> {
    inner: S,
    policy: RetryPolicy,
}

impl<S> Retrying<S>
where
    S: PageSource,
{
    pub fn new(inner: S, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }
}

impl<S> fmt::Debug for Retrying<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Retrying")
            .field("policy", &self.policy)
            .finish()
    }
}

impl<S> PageSource for Retrying<S>
where
    S: PageSource,
{
    #[instrument(level = "debug", skip(self, kind))]
    async fn get(&self, url: &str, kind: ContentKind) -> Result<RawPage, FetchError> {
        let total_t0 = Instant::now();
        let mut attempt = 0usize;

        loop {
            let attempt_t0 = Instant::now();
            match self.inner.get(url, kind).await {
                Ok(page) => return Ok(page),
                Err(e) if !e.is_transient() => return Err(e),
                Err(e) => {
                    attempt += 1;
                    let attempt_dt = attempt_t0.elapsed();
                    let total_dt = total_t0.elapsed();

                    if attempt > self.policy.max_retries {
                        error!(
                            attempt,
                            max = self.policy.max_retries,
                            elapsed_ms_attempt = attempt_dt.as_millis() as u64,
                            elapsed_ms_total = total_dt.as_millis() as u64,
                            error = %e,
                            "fetch exhausted retries"
                        );
                        return Err(e);
                    }

                    let jitter_ms: u64 = rng().random_range(0..=self.policy.jitter_ms);
                    let delay = self.policy.backoff(attempt) + Duration::from_millis(jitter_ms);

                    warn!(
                        attempt,
                        max = self.policy.max_retries,
                        elapsed_ms_attempt = attempt_dt.as_millis() as u64,
                        ?delay,
                        error = %e,
                        "fetch attempt failed; backing off"
                    );
                    sleep(delay).await;
                }
            }
        }
    }
}

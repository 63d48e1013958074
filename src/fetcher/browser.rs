//! Fallback fetch tier: a headless Chromium driven through `chromiumoxide`.
//!
//! A browser is launched for a single operation and always closed afterwards,
//! whether the operation succeeded, failed or timed out.

use crate::config::FetchSettings;
use crate::error::FetchError;
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::page::CaptureScreenshotFormat;
use chromiumoxide::page::{Page, ScreenshotParams};
use futures::StreamExt;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, info, instrument, warn};

/// Markup captured from a rendered page.
#[derive(Debug, Clone)]
pub struct RenderedPage {
    pub final_url: String,
    pub html: String,
}

/// A JavaScript-capable page renderer.
#[async_trait]
pub trait Renderer: Send + Sync {
    /// Load `url`, run its scripts and return the resulting markup.
    async fn render(&self, url: &str) -> Result<RenderedPage, FetchError>;

    /// Load `url` and write a PNG screenshot of the viewport to `output`.
    async fn screenshot(&self, url: &str, output: &Path) -> Result<(), FetchError>;
}

/// Find the Chromium binary: explicit path, then `CHROMIUM_PATH`.
///
/// Returning `None` lets `chromiumoxide` run its own detection.
pub fn find_chromium(configured: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = configured.filter(|p| p.exists()) {
        return Some(path.to_path_buf());
    }
    std::env::var("CHROMIUM_PATH")
        .ok()
        .map(PathBuf::from)
        .filter(|p| p.exists())
}

/// The browser tier described by `settings`.
///
/// # Returns
///
/// `None` only when `browser_fallback` is off. Without a configured or
/// `CHROMIUM_PATH` binary the renderer is still built and `chromiumoxide`
/// looks for Chromium itself at launch; a missing browser then surfaces as a
/// per-operation [`FetchError::Browser`].
pub fn renderer_from_settings(settings: &FetchSettings) -> Option<ChromiumRenderer> {
    if !settings.browser_fallback {
        info!("Headless browser fallback disabled");
        return None;
    }
    let executable = find_chromium(settings.chromium_path.as_deref());
    match &executable {
        Some(path) => info!(chromium = %path.display(), "Headless browser fallback enabled"),
        None => info!("Headless browser fallback enabled; Chromium will be auto-detected"),
    }
    Some(ChromiumRenderer::new(executable, settings.browser_timeout()))
}

/// Headless Chromium renderer.
#[derive(Debug, Clone)]
pub struct ChromiumRenderer {
    executable: Option<PathBuf>,
    timeout: Duration,
}

impl ChromiumRenderer {
    pub fn new(executable: Option<PathBuf>, timeout: Duration) -> Self {
        Self {
            executable,
            timeout,
        }
    }

    /// Launch a browser, open `url`, hand the page to `op`, then tear down.
    async fn with_page<T, F, Fut>(&self, url: &str, op: F) -> Result<T, FetchError>
    where
        F: FnOnce(Page) -> Fut + Send,
        Fut: Future<Output = Result<T, FetchError>> + Send,
        T: Send,
    {
        let mut builder = BrowserConfig::builder()
            .arg("--headless=new")
            .arg("--disable-gpu")
            .arg("--no-sandbox")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-extensions")
            .window_size(1280, 900);
        if let Some(path) = &self.executable {
            builder = builder.chrome_executable(path);
        }
        let config = builder
            .build()
            .map_err(|e| FetchError::Browser(format!("failed to build browser config: {e}")))?;

        let (mut browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| FetchError::Browser(format!("failed to launch Chromium: {e}")))?;

        let events = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
        });

        let work = async {
            let page = browser
                .new_page(url)
                .await
                .map_err(|e| FetchError::Browser(format!("navigation failed: {e}")))?;
            op(page).await
        };
        let outcome = match tokio::time::timeout(self.timeout, work).await {
            Ok(result) => result,
            Err(_) => Err(FetchError::Browser(format!(
                "timed out after {}s",
                self.timeout.as_secs()
            ))),
        };

        if let Err(e) = browser.close().await {
            warn!(error = %e, "Browser close failed");
        }
        let _ = browser.wait().await;
        events.abort();

        outcome
    }
}

#[async_trait]
impl Renderer for ChromiumRenderer {
    #[instrument(level = "info", skip(self))]
    async fn render(&self, url: &str) -> Result<RenderedPage, FetchError> {
        let t0 = Instant::now();
        let fallback_url = url.to_string();
        let rendered = self
            .with_page(url, |page| async move {
                let _ = page.wait_for_navigation().await;
                let html = page
                    .content()
                    .await
                    .map_err(|e| FetchError::Browser(format!("failed to read markup: {e}")))?;
                let final_url = page
                    .url()
                    .await
                    .ok()
                    .flatten()
                    .unwrap_or(fallback_url);
                Ok(RenderedPage { final_url, html })
            })
            .await?;
        debug!(
            elapsed_ms = t0.elapsed().as_millis() as u64,
            bytes = rendered.html.len(),
            "Rendered page"
        );
        Ok(rendered)
    }

    #[instrument(level = "info", skip(self), fields(output = %output.display()))]
    async fn screenshot(&self, url: &str, output: &Path) -> Result<(), FetchError> {
        let png = self
            .with_page(url, |page| async move {
                let _ = page.wait_for_navigation().await;
                page.screenshot(
                    ScreenshotParams::builder()
                        .format(CaptureScreenshotFormat::Png)
                        .build(),
                )
                .await
                .map_err(|e| FetchError::Browser(format!("screenshot failed: {e}")))
            })
            .await?;
        tokio::fs::write(output, png).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_chromium_ignores_missing_path() {
        let missing = Path::new("/definitely/not/a/chromium");
        // Only the configured path is checked here; the env fallback may or may not be set.
        let found = find_chromium(Some(missing));
        assert_ne!(found.as_deref(), Some(missing));
    }

    #[test]
    fn test_renderer_built_without_known_binary() {
        let settings = FetchSettings {
            chromium_path: Some(PathBuf::from("/definitely/not/a/chromium")),
            ..FetchSettings::default()
        };
        let renderer = renderer_from_settings(&settings).unwrap();
        assert_ne!(
            renderer.executable.as_deref(),
            Some(Path::new("/definitely/not/a/chromium"))
        );
        assert_eq!(renderer.timeout, settings.browser_timeout());

        let off = FetchSettings {
            browser_fallback: false,
            ..FetchSettings::default()
        };
        assert!(renderer_from_settings(&off).is_none());
    }

    #[tokio::test]
    #[ignore] // Requires Chromium to be installed
    async fn test_render_data_url() {
        let renderer = ChromiumRenderer::new(find_chromium(None), Duration::from_secs(30));
        let page = renderer
            .render("data:text/html,<h1>Hello</h1><p>World</p>")
            .await
            .expect("render failed");
        assert!(page.html.contains("<h1>Hello</h1>"));
    }
}

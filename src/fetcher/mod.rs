//! Two-tier content fetcher with artifact persistence.
//!
//! 1. **Primary**: [`http::HttpSource`] wrapped in [`retry::Retrying`]
//! 2. **Fallback**: a [`browser::Renderer`] (headless Chromium) used when the
//!    primary tier times out, gets a non-success status or hits an anti-bot
//!    interstitial
//!
//! Every successful fetch is written to
//! `{working_folder}/{hash}_{host_with_underscores}{ext}` where `ext` is
//! sniffed from the URL. Binary downloads never escalate: a browser cannot
//! produce the original bytes.

pub mod browser;
pub mod http;
pub mod retry;

use crate::config::FetchSettings;
use crate::error::FetchError;
use crate::models::{ContentHash, ContentKind, FetchMethod, FetchResult};
use browser::Renderer;
use chrono::Utc;
use http::HttpSource;
use retry::{PageSource, RawPage, RetryPolicy, Retrying};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tracing::{info, instrument, warn};
use url::Url;

/// Sniff the content kind from the URL path, then the query string.
pub fn sniff_kind(url: &Url) -> ContentKind {
    fn from_text(text: &str) -> Option<ContentKind> {
        let text = text.to_ascii_lowercase();
        if text.contains(".png") {
            Some(ContentKind::Png)
        } else if text.contains(".jpg") || text.contains(".jpeg") {
            Some(ContentKind::Jpg)
        } else if text.contains(".gif") {
            Some(ContentKind::Gif)
        } else if text.contains(".pdf") {
            Some(ContentKind::Pdf)
        } else {
            None
        }
    }

    let last_segment = url.path().rsplit('/').next().unwrap_or_default();
    from_text(last_segment)
        .or_else(|| url.query().and_then(from_text))
        .unwrap_or(ContentKind::Html)
}

/// Host with dots replaced by underscores, as used in artifact names.
pub fn host_with_underscores(url: &Url) -> String {
    url.host_str()
        .map(|h| h.to_ascii_lowercase().replace('.', "_"))
        .unwrap_or_else(|| "unknown".to_string())
}

/// Deterministic artifact path for a URL.
pub fn artifact_path(working_folder: &Path, hash: &ContentHash, url: &Url, kind: ContentKind) -> PathBuf {
    working_folder.join(format!(
        "{}_{}{}",
        hash,
        host_with_underscores(url),
        kind.extension()
    ))
}

/// Fetches URLs and persists what it gets.
pub struct Fetcher {
    primary: Retrying<HttpSource>,
    renderer: Option<Arc<dyn Renderer>>,
    working_folder: PathBuf,
}

impl Fetcher {
    /// Build a fetcher around an injected client.
    pub fn new(
        client: reqwest::Client,
        settings: &FetchSettings,
        working_folder: impl Into<PathBuf>,
        renderer: Option<Arc<dyn Renderer>>,
    ) -> Self {
        Self {
            primary: Retrying::new(HttpSource::new(client), RetryPolicy::from_settings(settings)),
            renderer,
            working_folder: working_folder.into(),
        }
    }

    pub fn working_folder(&self) -> &Path {
        &self.working_folder
    }

    /// Fetch `url`, escalating to the renderer when allowed, and write the artifact.
    ///
    /// # Arguments
    ///
    /// * `url` - Absolute URL of the page or binary to download
    ///
    /// # Returns
    ///
    /// The artifact's location in the working folder together with the status,
    /// MIME type, final URL and the tier that produced it. Binary kinds (images,
    /// PDFs) never escalate.
    ///
    /// # Errors
    ///
    /// - [`FetchError::InvalidUrl`] when `url` does not parse
    /// - the primary tier's error when it is not escalatable, or when the
    ///   browser tier is missing or fails as well
    /// - [`FetchError::Io`] when the artifact cannot be written
    #[instrument(level = "info", skip(self))]
    pub async fn fetch(&self, url: &str) -> Result<FetchResult, FetchError> {
        let parsed = Url::parse(url).map_err(|_| FetchError::InvalidUrl {
            url: url.to_string(),
        })?;
        let hash = ContentHash::of(url);
        let kind = sniff_kind(&parsed);
        let path = artifact_path(&self.working_folder, &hash, &parsed, kind);

        let (page, method) = match self.primary.get(url, kind).await {
            Ok(page) => (page, FetchMethod::Primary),
            Err(e) if e.should_escalate() && !kind.is_binary() => {
                (self.escalate(url, e).await?, FetchMethod::Fallback)
            }
            Err(e) => return Err(e),
        };

        fs::create_dir_all(&self.working_folder).await?;
        fs::write(&path, &page.body).await?;
        info!(
            path = %path.display(),
            ?method,
            bytes = page.body.len(),
            "Persisted artifact"
        );

        Ok(FetchResult {
            status: page.status,
            path,
            kind,
            mime: page.mime,
            true_url: page.true_url,
            method,
            fetched_at: Utc::now(),
        })
    }

    /// Try the browser tier. On failure the primary error is returned.
    async fn escalate(&self, url: &str, primary: FetchError) -> Result<RawPage, FetchError> {
        let Some(renderer) = &self.renderer else {
            return Err(primary);
        };
        warn!(error = %primary, "Primary fetch failed; escalating to headless browser");
        match renderer.render(url).await {
            Ok(rendered) => Ok(RawPage {
                status: 200,
                true_url: rendered.final_url,
                mime: Some("text/html".to_string()),
                body: rendered.html.into_bytes(),
            }),
            Err(e) => {
                warn!(error = %e, "Headless browser fetch failed");
                Err(primary)
            }
        }
    }

    /// Best-effort screenshot of `url`. Failures are logged and yield `None`.
    ///
    /// # Returns
    ///
    /// The path of `<hash>_<host>_thumb.png`, or `None` without a renderer.
    #[instrument(level = "info", skip(self))]
    pub async fn capture_thumbnail(&self, url: &str, hash: &ContentHash) -> Option<PathBuf> {
        let renderer = self.renderer.as_ref()?;
        let parsed = Url::parse(url).ok()?;
        let path = self.working_folder.join(format!(
            "{}_{}_thumb.png",
            hash,
            host_with_underscores(&parsed)
        ));
        if let Err(e) = fs::create_dir_all(&self.working_folder).await {
            warn!(error = %e, "Cannot create working folder for thumbnail");
            return None;
        }
        match renderer.screenshot(url, &path).await {
            Ok(()) => {
                info!(path = %path.display(), "Captured thumbnail");
                Some(path)
            }
            Err(e) => {
                warn!(error = %e, "Thumbnail capture failed");
                None
            }
        }
    }
}

/// Read an HTML artifact back for extraction. The file itself is never modified.
pub async fn read_artifact(result: &FetchResult) -> std::io::Result<String> {
    let bytes = fs::read(&result.path).await?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}


#[cfg(test)]
mod tests {
    use super::testing::StubRenderer;
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn settings() -> FetchSettings {
        FetchSettings {
            max_retries: 2,
            base_delay_ms: 1,
            max_delay_ms: 5,
            jitter_ms: 0,
            ..FetchSettings::default()
        }
    }

    fn fetcher(dir: &Path, renderer: Option<Arc<dyn Renderer>>) -> Fetcher {
        let client = http::build_client("test-agent", std::time::Duration::from_secs(5)).unwrap();
        Fetcher::new(client, &settings(), dir, renderer)
    }

    #[test]
    fn test_sniff_kind_from_path_and_query() {
        let kind = |u: &str| sniff_kind(&Url::parse(u).unwrap());
        assert_eq!(kind("https://a.com/photo.PNG"), ContentKind::Png);
        assert_eq!(kind("https://a.com/photo.jpeg"), ContentKind::Jpg);
        assert_eq!(kind("https://a.com/doc.pdf"), ContentKind::Pdf);
        assert_eq!(kind("https://a.com/img?src=cat.gif"), ContentKind::Gif);
        assert_eq!(kind("https://a.com/2025/story"), ContentKind::Html);
        assert_eq!(kind("https://a.com/story.html"), ContentKind::Html);
        assert_eq!(kind("https://a.com/png-news/story"), ContentKind::Html);
    }

    #[test]
    fn test_artifact_path_naming() {
        let url = Url::parse("https://www.example.com/a/b.jpg").unwrap();
        let hash = ContentHash::of(url.as_str());
        let path = artifact_path(Path::new("/work"), &hash, &url, ContentKind::Jpg);
        assert_eq!(
            path,
            PathBuf::from(format!("/work/{}_www_example_com.jpg", hash))
        );
    }

    #[tokio::test]
    async fn test_fetch_persists_artifact() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/news/story"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<p>story</p>"))
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let url = format!("{}/news/story", server.uri());
        let result = fetcher(dir.path(), None).fetch(&url).await.unwrap();

        assert_eq!(result.method, FetchMethod::Primary);
        assert_eq!(result.kind, ContentKind::Html);
        assert_eq!(result.status, 200);
        assert_eq!(result.true_url, url);
        let name = result.path.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with(ContentHash::of(&url).as_str()));
        assert!(name.ends_with("_127_0_0_1.html"));
        assert_eq!(read_artifact(&result).await.unwrap(), "<p>story</p>");
    }

    #[tokio::test]
    async fn test_fetch_retries_transient_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/flaky"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/flaky"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<p>ok</p>"))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let result = fetcher(dir.path(), None)
            .fetch(&format!("{}/flaky", server.uri()))
            .await
            .unwrap();
        assert_eq!(result.method, FetchMethod::Primary);
    }

    #[tokio::test]
    async fn test_anti_bot_escalates_to_renderer() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string("<title>Just a moment...</title>"),
            )
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let stub = Arc::new(StubRenderer::new("<p>rendered</p>"));
        let result = fetcher(dir.path(), Some(stub.clone()))
            .fetch(&format!("{}/guarded", server.uri()))
            .await
            .unwrap();

        assert_eq!(result.method, FetchMethod::Fallback);
        assert_eq!(stub.calls(), 1);
        assert_eq!(read_artifact(&result).await.unwrap(), "<p>rendered</p>");
    }

    #[tokio::test]
    async fn test_failed_escalation_returns_primary_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let stub = Arc::new(StubRenderer::failing());
        let err = fetcher(dir.path(), Some(stub.clone()))
            .fetch(&format!("{}/forbidden", server.uri()))
            .await
            .unwrap_err();

        assert!(matches!(err, FetchError::Status { status: 403, .. }));
        assert_eq!(stub.calls(), 1);
    }

    #[tokio::test]
    async fn test_binary_mismatch_never_escalates() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("Content-Type", "text/html")
                    .set_body_string("<html></html>"),
            )
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let stub = Arc::new(StubRenderer::new("<p>x</p>"));
        let err = fetcher(dir.path(), Some(stub.clone()))
            .fetch(&format!("{}/chart.png", server.uri()))
            .await
            .unwrap_err();

        assert!(matches!(err, FetchError::ContentTypeMismatch { .. }));
        assert_eq!(stub.calls(), 0);
    }

    #[tokio::test]
    async fn test_thumbnail_failure_is_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let hash = ContentHash::of("https://example.com/");

        let failing = fetcher(dir.path(), Some(Arc::new(StubRenderer::failing())));
        assert!(failing.capture_thumbnail("https://example.com/", &hash).await.is_none());

        let working = fetcher(dir.path(), Some(Arc::new(StubRenderer::new(""))));
        let path = working
            .capture_thumbnail("https://example.com/", &hash)
            .await
            .unwrap();
        assert!(path.exists());
        assert!(path.to_string_lossy().ends_with("_example_com_thumb.png"));
    }
}

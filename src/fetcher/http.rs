//! Primary fetch tier: a pooled, cookie-keeping, compression-aware HTTP client.

use super::retry::{PageSource, RawPage};
use crate::error::FetchError;
use crate::models::ContentKind;
use reqwest::header::CONTENT_TYPE;
use std::time::Duration;
use tracing::{debug, instrument};

/// Markers of bot-challenge interstitials, matched against the lowercased
/// head of an HTML body.
const ANTI_BOT_MARKERS: [&str; 9] = [
    "cf-browser-verification",
    "cf-challenge",
    "/cdn-cgi/challenge-platform/",
    "<title>just a moment...</title>",
    "attention required! | cloudflare",
    "px-captcha",
    "please enable js and disable any ad blocker",
    "please enable javascript and cookies to continue",
    "are you a robot",
];

/// How much of the body is scanned for anti-bot markers.
const ANTI_BOT_SCAN_BYTES: usize = 64 * 1024;

/// Build the process-wide HTTP client.
///
/// One client is created in the composition root and shared by every fetch so
/// connections and cookies are pooled.
pub fn build_client(user_agent: &str, timeout: Duration) -> Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder()
        .user_agent(user_agent)
        .timeout(timeout)
        .cookie_store(true)
        .gzip(true)
        .brotli(true)
        .deflate(true)
        .redirect(reqwest::redirect::Policy::limited(10))
        .build()
}

/// Return the first anti-bot marker found in `body`, if any.
pub fn detect_anti_bot(body: &[u8]) -> Option<&'static str> {
    let head = &body[..body.len().min(ANTI_BOT_SCAN_BYTES)];
    let text = String::from_utf8_lossy(head).to_ascii_lowercase();
    ANTI_BOT_MARKERS.into_iter().find(|m| text.contains(m))
}

/// Whether a server-reported MIME type is acceptable for a binary download.
fn accepts_mime(kind: ContentKind, mime: &str) -> bool {
    let mime = mime.to_ascii_lowercase();
    if mime.starts_with("application/octet-stream") || mime.starts_with("binary/octet-stream") {
        return true;
    }
    match kind {
        ContentKind::Html => true,
        ContentKind::Pdf => mime.starts_with("application/pdf") || mime.starts_with("application/x-pdf"),
        ContentKind::Png | ContentKind::Jpg | ContentKind::Gif => mime.starts_with("image/"),
    }
}

/// Plain HTTP GET against an injected client.
#[derive(Debug, Clone)]
pub struct HttpSource {
    client: reqwest::Client,
}

impl HttpSource {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

impl PageSource for HttpSource {
    #[instrument(level = "debug", skip(self))]
    async fn get(&self, url: &str, kind: ContentKind) -> Result<RawPage, FetchError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| FetchError::from_reqwest(url, e))?;

        let status = response.status();
        let true_url = response.url().to_string();
        let mime = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        if kind.is_binary() {
            if let Some(found) = mime.as_deref().filter(|m| !accepts_mime(kind, m)) {
                return Err(FetchError::ContentTypeMismatch {
                    url: url.to_string(),
                    expected: kind.mime().to_string(),
                    found: found.to_string(),
                });
            }
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| FetchError::from_reqwest(url, e))?
            .to_vec();

        if !kind.is_binary() {
            if let Some(marker) = detect_anti_bot(&body) {
                return Err(FetchError::AntiBotBlock {
                    url: url.to_string(),
                    marker: marker.to_string(),
                });
            }
        }

        debug!(
            status = status.as_u16(),
            %true_url,
            bytes = body.len(),
            "Primary fetch succeeded"
        );
        Ok(RawPage {
            status: status.as_u16(),
            true_url,
            mime,
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn source() -> HttpSource {
        HttpSource::new(build_client("test-agent", Duration::from_secs(5)).unwrap())
    }

    #[test]
    fn test_detect_anti_bot() {
        assert_eq!(
            detect_anti_bot(b"<html><head><title>Just a moment...</title>"),
            Some("<title>just a moment...</title>")
        );
        assert_eq!(detect_anti_bot(b"<html><p>Real article</p></html>"), None);
    }

    #[test]
    fn test_accepts_mime() {
        assert!(accepts_mime(ContentKind::Png, "image/png"));
        assert!(accepts_mime(ContentKind::Jpg, "image/jpeg; charset=binary"));
        assert!(accepts_mime(ContentKind::Pdf, "application/pdf"));
        assert!(accepts_mime(ContentKind::Gif, "application/octet-stream"));
        assert!(!accepts_mime(ContentKind::Png, "text/html; charset=utf-8"));
    }

    #[tokio::test]
    async fn test_get_follows_redirects() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/old"))
            .respond_with(
                ResponseTemplate::new(301)
                    .insert_header("Location", format!("{}/new", server.uri()).as_str()),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/new"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<p>moved</p>"))
            .mount(&server)
            .await;

        let page = source()
            .get(&format!("{}/old", server.uri()), ContentKind::Html)
            .await
            .unwrap();
        assert_eq!(page.status, 200);
        assert!(page.true_url.ends_with("/new"));
        assert_eq!(page.body, b"<p>moved</p>");
    }

    #[tokio::test]
    async fn test_get_reports_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let err = source()
            .get(&format!("{}/missing", server.uri()), ContentKind::Html)
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Status { status: 404, .. }));
    }

    #[tokio::test]
    async fn test_binary_download_rejects_html() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/photo.png"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("Content-Type", "text/html")
                    .set_body_string("<html>login</html>"),
            )
            .mount(&server)
            .await;

        let err = source()
            .get(&format!("{}/photo.png", server.uri()), ContentKind::Png)
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::ContentTypeMismatch { .. }));
    }

    #[tokio::test]
    async fn test_anti_bot_page_is_flagged() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                "<html><div class=\"cf-browser-verification\">checking</div></html>",
            ))
            .mount(&server)
            .await;

        let err = source()
            .get(&format!("{}/story", server.uri()), ContentKind::Html)
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::AntiBotBlock { .. }));
    }
}

//! Pure URL repair and resolution helpers.
//!
//! Aggregator pages and article bodies are full of scheme-less, garbled or
//! relative links. [`repair`] applies two fixed rules; [`resolve`] builds on it
//! to produce absolute URLs against a base. Nothing here does I/O.

use url::Url;

/// References that are left untouched by [`resolve`].
const PASSTHROUGH_PREFIXES: [&str; 5] = ["data:", "mailto:", "javascript:", "tel:", "#"];

/// Repair a raw link.
///
/// Rules, in order:
/// 1. If `raw` contains `"//"`, keep everything after the first occurrence and
///    prefix `"https://"`. This fixes missing or mangled schemes such as
///    `"//host/x"` or `"ttps://host/x"`.
/// 2. Otherwise, if `raw` does not start with `"/"`, prepend one.
///
/// # Examples
///
/// ```
/// use feed_archiver::normalizer::repair;
///
/// assert_eq!(repair("//example.com/x"), "https://example.com/x");
/// assert_eq!(repair("story.html"), "/story.html");
/// assert_eq!(repair(""), "/");
/// ```
pub fn repair(raw: &str) -> String {
    if let Some(idx) = raw.find("//") {
        format!("https://{}", &raw[idx + 2..])
    } else if raw.starts_with('/') {
        raw.to_string()
    } else {
        format!("/{raw}")
    }
}

/// Resolve `raw` to an absolute URL against `base`.
///
/// Absolute `http(s)` URLs come back unchanged, so resolving is idempotent.
pub fn resolve(raw: &str, base: &Url) -> String {
    let trimmed = raw.trim();
    let lower = trimmed.to_ascii_lowercase();

    if lower.starts_with("http://") || lower.starts_with("https://") {
        return trimmed.to_string();
    }
    if PASSTHROUGH_PREFIXES.iter().any(|p| lower.starts_with(p)) {
        return trimmed.to_string();
    }

    let repaired = repair(trimmed);
    if repaired.starts_with("https://") {
        return repaired;
    }
    base.join(&repaired)
        .map(|u| u.to_string())
        .unwrap_or(repaired)
}

/// Lowercased host of an absolute URL.
pub fn host_of(url: &str) -> Option<String> {
    Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(|h| h.to_ascii_lowercase()))
}

/// Host with a leading `www.` removed, used to key site definitions.
pub fn site_key(url: &str) -> Option<String> {
    host_of(url).map(|h| h.strip_prefix("www.").map(str::to_string).unwrap_or(h))
}

/// Whether `url` is a site's front page (root path, no query) rather than an article.
pub fn looks_like_home_page(url: &str) -> bool {
    match Url::parse(url) {
        Ok(u) => {
            let path = u.path();
            (path.is_empty() || path == "/") && u.query().is_none_or(str::is_empty)
        }
        Err(_) => false,
    }
}

/// Whether `host` equals, or is a subdomain of, any entry in `excluded`.
pub fn host_is_excluded(host: &str, excluded: &[String]) -> bool {
    let host = host.trim_start_matches("www.");
    excluded.iter().any(|e| {
        let e = e.trim_start_matches("www.");
        host == e || host.ends_with(&format!(".{e}"))
    })
}

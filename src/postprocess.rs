//! Cleanup applied to an extracted article fragment.
//!
//! Three steps, each idempotent and each working on the owned fragment only:
//!
//! 1. **Link rewriting**: every `<a href>` and `<img src>` is resolved to an
//!    absolute URL against the article's canonical URL. Tags carrying only a
//!    lazy-load attribute get the primary attribute filled in from it.
//! 2. **Video lifting**: the first `<iframe>` pointing at a known video host
//!    is moved into the Open Graph map as `og:video:*` and cut from the body.
//! 3. **Cover-image stripping**: tags referencing `og:image` are cut from the
//!    body so the cover is not rendered twice.
//!
//! Removal works on the markup string rather than a DOM: from the needle it
//! walks back to the nearest `<`, then forward to the matching closing tag or
//! the next `>`. A directly wrapping `<a>` goes with it. This survives the
//! malformed markup that re-parsing would "repair" into something else.

use crate::models::ExtractedArticle;
use crate::normalizer::resolve;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use tracing::debug;
use url::Url;

/// Lazy-load attributes consulted, in order, when `src`/`href` is missing.
pub const LAZY_ATTRIBUTES: [&str; 4] = ["data-src", "data-lazy-src", "data-original", "data-url"];

/// Embed URL fragments of known video hosts, in priority order.
pub const VIDEO_EMBEDS: [&str; 6] = [
    "youtube.com/embed",
    "youtube-nocookie.com/embed",
    "player.vimeo.com/video",
    "rumble.com/embed",
    "bitchute.com/embed",
    "dailymotion.com/embed",
];

static LINK_TAGS: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)<(a|img)\b[^>]*>").unwrap());
static IFRAMES: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)<iframe\b[^>]*>").unwrap());
static ATTRIBUTE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?is)\s([a-z_:][-a-z0-9_:.]*)\s*=\s*(?:"([^"]*)"|'([^']*)')"#).unwrap()
});

/// Run every step against `article`, using `true_url` when the page declares
/// no canonical URL.
pub fn apply(article: &mut ExtractedArticle, true_url: &str) {
    if article.is_empty() {
        return;
    }
    let base = article
        .canonical_url()
        .and_then(|u| Url::parse(u).ok())
        .or_else(|| Url::parse(true_url).ok());
    if let Some(base) = base {
        article.html = rewrite_links(&article.html, &base);
    }
    lift_video(article);
    strip_cover_image(article);
}

/// Attribute name/value pairs of a single tag, in source order.
fn attributes(tag: &str) -> Vec<(String, String)> {
    ATTRIBUTE
        .captures_iter(tag)
        .map(|c| {
            let value = c.get(2).or_else(|| c.get(3)).map_or("", |m| m.as_str());
            (c[1].to_ascii_lowercase(), value.to_string())
        })
        .collect()
}

fn attribute<'a>(attrs: &'a [(String, String)], name: &str) -> Option<&'a str> {
    attrs
        .iter()
        .find(|(n, _)| n == name)
        .map(|(_, v)| v.as_str())
        .filter(|v| !v.trim().is_empty())
}

/// Resolve `href`/`src` (or a lazy-load stand-in) on every anchor and image.
///
/// # Arguments
///
/// * `html` - Article body fragment
/// * `base` - Canonical URL of the article
///
/// # Returns
///
/// The fragment with each link attribute resolved through
/// [`crate::normalizer::resolve`]. `data:`, `mailto:` and fragment links pass
/// through untouched; a tag with neither attribute is left as is.
pub fn rewrite_links(html: &str, base: &Url) -> String {
    LINK_TAGS
        .replace_all(html, |caps: &Captures| {
            let tag = &caps[0];
            let primary = if caps[1].eq_ignore_ascii_case("a") {
                "href"
            } else {
                "src"
            };
            let attrs = attributes(tag);
            let Some(raw) = attribute(&attrs, primary).or_else(|| {
                LAZY_ATTRIBUTES
                    .iter()
                    .find_map(|name| attribute(&attrs, name))
            }) else {
                return tag.to_string();
            };
            let resolved = format!(" {primary}=\"{}\"", resolve(raw, base));

            if attrs.iter().any(|(n, _)| n == primary) {
                ATTRIBUTE
                    .replace_all(tag, |a: &Captures| {
                        if a[1].eq_ignore_ascii_case(primary) {
                            resolved.clone()
                        } else {
                            a[0].to_string()
                        }
                    })
                    .into_owned()
            } else {
                let close = if tag.ends_with("/>") { 2 } else { 1 };
                let (head, tail) = tag.split_at(tag.len() - close);
                format!("{}{resolved}{tail}", head.trim_end())
            }
        })
        .into_owned()
}

/// Move the first known video embed into `og:video:*` and cut it from the body.
///
/// Embeds are matched in [`VIDEO_EMBEDS`] priority order against each
/// iframe's `src` (or lazy `data-src`).
///
/// # Arguments
///
/// * `article` - the extracted article; its `html` and `open_graph` are updated in place
///
/// # Behavior
///
/// `og:video:*` keys the page already declares are kept; only missing ones
/// are filled from the iframe. The matching iframe is removed either way, so
/// the Video template never renders the player twice. Running it again finds
/// no embed and changes nothing.
pub fn lift_video(article: &mut ExtractedArticle) {
    let iframes: Vec<Vec<(String, String)>> = IFRAMES
        .find_iter(&article.html)
        .map(|m| attributes(m.as_str()))
        .collect();

    for embed in VIDEO_EMBEDS {
        let hit = iframes.iter().find_map(|attrs| {
            attribute(attrs, "src")
                .or_else(|| attribute(attrs, "data-src"))
                .filter(|src| src.contains(embed))
                .map(|src| (src.to_string(), attrs))
        });
        let Some((src, attrs)) = hit else {
            continue;
        };

        debug!(embed, src = %src, "Lifting embedded video");
        let url = if src.starts_with("//") {
            format!("https:{src}")
        } else {
            src.clone()
        };
        let og = &mut article.open_graph;
        og.entry("og:video:url".into()).or_insert(url);
        og.entry("og:video:type".into())
            .or_insert_with(|| attribute(attrs, "type").unwrap_or("text/html").to_string());
        for dim in ["width", "height"] {
            if let Some(v) = attribute(attrs, dim) {
                og.entry(format!("og:video:{dim}"))
                    .or_insert_with(|| v.to_string());
            }
        }
        if let Some(html) = remove_tag_containing(&article.html, &src) {
            article.html = html;
        }
        return;
    }
}

/// Cut every tag that references the cover image out of the body.
pub fn strip_cover_image(article: &mut ExtractedArticle) {
    let Some(image) = article.cover_image().map(str::to_string) else {
        return;
    };
    if image.trim().is_empty() {
        return;
    }
    while let Some(html) = remove_tag_containing(&article.html, &image) {
        debug!(image = %image, "Stripped cover image from body");
        article.html = html;
    }
}

/// Remove the first tag whose markup contains `needle`.
///
/// # Arguments
///
/// * `html` - Markup to cut from
/// * `needle` - Text to look for inside tag markup, e.g. an image URL
///
/// # Returns
///
/// The markup without the tag, or `None` when there is nothing to remove.
/// Occurrences in text content (not inside a tag) are ignored.
pub fn remove_tag_containing(html: &str, needle: &str) -> Option<String> {
    if needle.is_empty() {
        return None;
    }
    let lower = html.to_ascii_lowercase();
    for (pos, _) in html.match_indices(needle) {
        let Some(start) = html[..pos].rfind('<') else {
            continue;
        };
        if html[start..pos].contains('>') {
            continue;
        }
        let name: String = html[start + 1..]
            .chars()
            .take_while(|c| c.is_ascii_alphanumeric())
            .collect::<String>()
            .to_ascii_lowercase();
        if name.is_empty() {
            continue;
        }

        let closing = format!("</{name}>");
        let mut end = match lower[pos..].find(&closing) {
            Some(i) if name != "img" => pos + i + closing.len(),
            _ => pos + html[pos..].find('>')? + 1,
        };
        let mut start = start;

        // A directly wrapping anchor goes too.
        let before = html[..start].trim_end();
        if before.ends_with('>') && name != "a" {
            if let Some(open) = before.rfind('<') {
                let opener = &lower[open..before.len()];
                let after = &lower[end..];
                let is_anchor = opener.starts_with("<a ") || opener == "<a>";
                let trailing = after.trim_start();
                if is_anchor && trailing.starts_with("</a>") {
                    start = open;
                    end += (after.len() - trailing.len()) + "</a>".len();
                }
            }
        }

        let mut out = String::with_capacity(html.len());
        out.push_str(&html[..start]);
        out.push_str(&html[end..]);
        return Some(out);
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn article(html: &str) -> ExtractedArticle {
        ExtractedArticle {
            html: html.to_string(),
            strategy: "density".into(),
            ..ExtractedArticle::default()
        }
    }

    fn base() -> Url {
        Url::parse("https://news.example.com/world/story.html").unwrap()
    }

    #[test]
    fn test_rewrite_links_resolves_relative_and_lazy() {
        let html = r#"<p><a href="/about">About</a> <a href='next.html'>next</a>
            <img data-src="//cdn.example.com/a.jpg" alt="x"/>
            <img src="" data-lazy-src="img/b.png">
            <a href="mailto:desk@example.com">mail</a>
            <img alt="none"></p>"#;
        let out = rewrite_links(html, &base());
        assert!(out.contains(r#"<a href="https://news.example.com/about">"#));
        assert!(out.contains(r#"href="https://news.example.com/next.html""#));
        assert!(out.contains(r#"src="https://cdn.example.com/a.jpg"/>"#));
        assert!(out.contains(r#"<img src="https://news.example.com/img/b.png" data-lazy-src"#));
        assert!(out.contains(r#"href="mailto:desk@example.com""#));
        assert!(out.contains(r#"<img alt="none">"#));
    }

    #[test]
    fn test_rewrite_links_is_idempotent() {
        let html = r#"<a href="/x">x</a><img data-original="y.png">"#;
        let once = rewrite_links(html, &base());
        assert_eq!(rewrite_links(&once, &base()), once);
    }

    #[test]
    fn test_youtube_embed_lifted_once() {
        let mut a = article(
            r#"<p>Intro</p><iframe width="560" height="315" src="https://www.youtube.com/embed/abc123" frameborder="0"></iframe><p>Outro</p>"#,
        );
        lift_video(&mut a);
        assert_eq!(a.html, "<p>Intro</p><p>Outro</p>");
        assert_eq!(
            a.video_url(),
            Some("https://www.youtube.com/embed/abc123")
        );
        assert_eq!(a.open_graph["og:video:type"], "text/html");
        assert_eq!(a.open_graph["og:video:width"], "560");
        assert_eq!(a.open_graph["og:video:height"], "315");

        let snapshot = a.clone();
        lift_video(&mut a);
        assert_eq!(a, snapshot);
    }

    #[test]
    fn test_video_priority_and_wrapping_anchor() {
        let mut a = article(
            r#"<iframe src="https://player.vimeo.com/video/9"></iframe><a href="https://x.com"><iframe src="//www.youtube-nocookie.com/embed/z"></iframe></a><p>after</p>"#,
        );
        lift_video(&mut a);
        assert_eq!(
            a.video_url(),
            Some("https://www.youtube-nocookie.com/embed/z")
        );
        assert_eq!(
            a.html,
            r#"<iframe src="https://player.vimeo.com/video/9"></iframe><p>after</p>"#
        );
    }

    #[test]
    fn test_declared_video_keeps_metadata_and_drops_iframe() {
        let mut a = article(
            r#"<p>a</p><iframe width="560" height="315" src="https://www.youtube.com/embed/abc"></iframe><p>b</p>"#,
        );
        a.open_graph
            .insert("og:video:url".into(), "https://v.example.com/1".into());
        lift_video(&mut a);
        assert_eq!(a.html, "<p>a</p><p>b</p>");
        assert_eq!(a.video_url(), Some("https://v.example.com/1"));
        assert_eq!(a.open_graph["og:video:width"], "560");

        let lifted = a.clone();
        lift_video(&mut a);
        assert_eq!(a, lifted);
    }

    #[test]
    fn test_unclosed_tag_removed_to_next_bracket() {
        let html = r#"<p>a</p><iframe src="https://rumble.com/embed/v1"><p>b</p>"#;
        assert_eq!(
            remove_tag_containing(html, "rumble.com/embed/v1").unwrap(),
            "<p>a</p><p>b</p>"
        );
    }

    #[test]
    fn test_needle_in_text_is_ignored() {
        let html = "<p>see https://cdn.example.com/cover.jpg</p>";
        assert_eq!(remove_tag_containing(html, "https://cdn.example.com/cover.jpg"), None);
    }

    #[test]
    fn test_cover_image_stripped() {
        let mut a = article(
            r#"<img src="https://cdn.example.com/cover.jpg"><p>Body</p><img src="https://cdn.example.com/cover.jpg" />"#,
        );
        a.open_graph
            .insert("og:image".into(), "https://cdn.example.com/cover.jpg".into());
        strip_cover_image(&mut a);
        assert_eq!(a.html, "<p>Body</p>");
    }

    #[test]
    fn test_apply_is_idempotent() {
        let mut a = article(
            r#"<p><a href="/more">more</a></p><iframe src="https://www.dailymotion.com/embed/video/q"></iframe><img src="/cover.jpg">"#,
        );
        a.open_graph
            .insert("og:image".into(), "https://news.example.com/cover.jpg".into());
        a.attributes
            .insert("canonical".into(), "https://news.example.com/world/story".into());

        apply(&mut a, "https://redirected.example.net/x");
        assert_eq!(
            a.html,
            r#"<p><a href="https://news.example.com/more">more</a></p>"#
        );
        assert_eq!(
            a.video_url(),
            Some("https://www.dailymotion.com/embed/video/q")
        );

        let snapshot = a.clone();
        apply(&mut a, "https://redirected.example.net/x");
        assert_eq!(a, snapshot);
    }
}

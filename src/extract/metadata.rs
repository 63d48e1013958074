//! Page metadata: Open Graph properties, named meta tags, title, canonical URL.

use crate::utils::collapse_whitespace;
use once_cell::sync::Lazy;
use scraper::{Html, Selector};
use std::collections::BTreeMap;

static META: Lazy<Selector> = Lazy::new(|| Selector::parse("meta[content]").unwrap());
static TITLE: Lazy<Selector> = Lazy::new(|| Selector::parse("head title, title").unwrap());
static CANONICAL: Lazy<Selector> =
    Lazy::new(|| Selector::parse(r#"link[rel="canonical"][href]"#).unwrap());

/// Collect `(open_graph, attributes)` from a parsed page.
///
/// `og:*` properties land in the first map keyed by property. Named meta tags
/// (lowercased) and non-OG properties such as `article:published_time` land
/// in the second, along with `title` and `canonical`. The first occurrence of
/// a key wins.
pub fn collect(document: &Html) -> (BTreeMap<String, String>, BTreeMap<String, String>) {
    let mut open_graph = BTreeMap::new();
    let mut attributes = BTreeMap::new();

    for meta in document.select(&META) {
        let el = meta.value();
        let Some(content) = el.attr("content").map(str::trim) else {
            continue;
        };
        if let Some(property) = el.attr("property").map(str::trim) {
            let map = if property.starts_with("og:") {
                &mut open_graph
            } else {
                &mut attributes
            };
            map.entry(property.to_string())
                .or_insert_with(|| content.to_string());
        } else if let Some(name) = el.attr("name") {
            attributes
                .entry(name.trim().to_lowercase())
                .or_insert_with(|| content.to_string());
        }
    }

    if let Some(title) = document.select(&TITLE).next() {
        let text = collapse_whitespace(&title.text().collect::<String>());
        if !text.is_empty() {
            attributes.entry("title".to_string()).or_insert(text);
        }
    }
    if let Some(href) = document
        .select(&CANONICAL)
        .next()
        .and_then(|l| l.value().attr("href"))
    {
        attributes
            .entry("canonical".to_string())
            .or_insert_with(|| href.trim().to_string());
    }

    (open_graph, attributes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collects_all_sources() {
        let doc = Html::parse_document(
            r#"<html><head>
            <title>  Big
              News </title>
            <meta property="og:title" content="OG Big News">
            <meta property="og:title" content="ignored duplicate">
            <meta property="og:image" content="https://cdn.example.com/a.jpg">
            <meta property="article:section" content="World">
            <meta name="Description" content="Summary here">
            <meta charset="utf-8">
            <link rel="canonical" href="https://example.com/story">
            </head><body></body></html>"#,
        );
        let (og, attrs) = collect(&doc);
        assert_eq!(og.get("og:title").unwrap(), "OG Big News");
        assert_eq!(og.get("og:image").unwrap(), "https://cdn.example.com/a.jpg");
        assert_eq!(og.len(), 2);
        assert_eq!(attrs.get("title").unwrap(), "Big News");
        assert_eq!(attrs.get("description").unwrap(), "Summary here");
        assert_eq!(attrs.get("article:section").unwrap(), "World");
        assert_eq!(attrs.get("canonical").unwrap(), "https://example.com/story");
    }

    #[test]
    fn test_empty_page() {
        let (og, attrs) = collect(&Html::parse_document("<p>nothing</p>"));
        assert!(og.is_empty());
        assert!(attrs.is_empty());
    }
}

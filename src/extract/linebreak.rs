//! Extraction for markup that separates paragraphs with `<br>` instead of `<p>`.

use super::{Extraction, ExtractionStats, ExtractionStrategy, parse_selector};
use crate::config::SiteDefinition;
use crate::error::ExtractionError;
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::Html;

static BREAK: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)<br\s*/?>").unwrap());
static TAGS: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]*>").unwrap());

/// Splits the first `body` match (default `body`) on line breaks.
#[derive(Debug, Clone, Copy, Default)]
pub struct LinebreakStrategy;

impl ExtractionStrategy for LinebreakStrategy {
    fn name(&self) -> &'static str {
        "linebreak"
    }

    fn extract(
        &self,
        document: &Html,
        definition: &SiteDefinition,
    ) -> Result<Extraction, ExtractionError> {
        let selector = parse_selector(definition.body.as_deref().unwrap_or("body"))?;
        let Some(container) = document.select(&selector).next() else {
            return Ok(Extraction::default());
        };
        let html = split_on_breaks(&container.inner_html());
        let emitted = html.matches("<p>").count();
        Ok(Extraction {
            html,
            stats: ExtractionStats {
                candidates: emitted,
                containers: 1,
                winning_count: emitted,
                emitted,
                skipped: 0,
            },
        })
    }
}

/// Wrap each `<br>`-separated run of markup in a paragraph, dropping runs
/// that hold no visible text.
pub fn split_on_breaks(markup: &str) -> String {
    BREAK
        .split(markup)
        .map(str::trim)
        .filter(|piece| {
            let text = TAGS.replace_all(piece, "");
            !text.replace("&nbsp;", " ").trim().is_empty()
        })
        .map(|piece| format!("<p>{piece}</p>"))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_on_breaks() {
        assert_eq!(
            split_on_breaks("one<br>two <b>bold</b><BR />  <br/>&nbsp;<br>three"),
            "<p>one</p>\n<p>two <b>bold</b></p>\n<p>three</p>"
        );
        assert_eq!(split_on_breaks("<br><br>"), "");
    }

    #[test]
    fn test_uses_body_selector() {
        let doc = Html::parse_document(
            "<html><body><div class=\"nav\">menu</div>\
             <div class=\"post\">alpha<br>beta</div></body></html>",
        );
        let def = SiteDefinition {
            body: Some("div.post".into()),
            ..SiteDefinition::default()
        };
        let out = LinebreakStrategy.extract(&doc, &def).unwrap();
        assert_eq!(out.html, "<p>alpha</p>\n<p>beta</p>");
        assert_eq!(out.stats.emitted, 2);
    }

    #[test]
    fn test_missing_container_is_empty() {
        let doc = Html::parse_document("<html><body>x</body></html>");
        let def = SiteDefinition {
            body: Some("div.none".into()),
            ..SiteDefinition::default()
        };
        assert!(LinebreakStrategy.extract(&doc, &def).unwrap().is_empty());
    }
}

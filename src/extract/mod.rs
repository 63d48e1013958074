//! Article extraction.
//!
//! Each site may declare a strategy name in its [`SiteDefinition`]; the
//! [`StrategyRegistry`] maps that name to an [`ExtractionStrategy`]. Sites
//! without a definition (or with an unknown name) get the adaptive
//! [`density::DensityStrategy`].
//!
//! | Name | Module | Use |
//! |------|--------|-----|
//! | `selector` | [`selector`] | Known body and paragraph selectors |
//! | `density` | [`density`] | Heuristic: container with most paragraphs |
//! | `script` | [`script`] | Body embedded as JSON inside an inline script |
//! | `json_ld` | [`json_ld`] | Raw `application/ld+json` payload |
//! | `linebreak` | [`linebreak`] | Markup without `<p>`, split on `<br>` |
//!
//! Strategies never panic on bad markup: they return an empty
//! [`Extraction`] when there is legitimately nothing to take and an
//! [`ExtractionError`] when something went wrong. [`extract_article`] turns
//! both into the meta-description fallback.

pub mod density;
pub mod json_ld;
pub mod linebreak;
pub mod metadata;
pub mod script;
pub mod selector;

use crate::config::SiteDefinition;
use crate::error::ExtractionError;
use crate::models::ExtractedArticle;
use crate::utils::truncate_for_log;
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use std::collections::HashMap;
use tracing::{debug, info, warn};

/// Strategy name recorded when only the meta description could be used.
pub const META_DESCRIPTION: &str = "meta-description";

static EMPTY_PARAGRAPHS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)<p>(\s|&nbsp;|&#160;|<br\s*/?>)*</p>").unwrap());

/// Counters describing how an extraction went.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractionStats {
    /// Paragraph-like nodes considered.
    pub candidates: usize,
    /// Distinct parent containers counted.
    pub containers: usize,
    /// Count of the winning container.
    pub winning_count: usize,
    /// Elements written to the output.
    pub emitted: usize,
    /// Elements dropped (empty, boilerplate, nested).
    pub skipped: usize,
}

/// An article fragment plus diagnostics. An empty `html` is a legitimate result.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Extraction {
    pub html: String,
    pub stats: ExtractionStats,
}

impl Extraction {
    pub fn empty(stats: ExtractionStats) -> Self {
        Self {
            html: String::new(),
            stats,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.html.trim().is_empty()
    }
}

/// A way of pulling the article body out of a parsed page.
pub trait ExtractionStrategy: Send + Sync {
    /// Registry key.
    fn name(&self) -> &'static str;

    fn extract(
        &self,
        document: &Html,
        definition: &SiteDefinition,
    ) -> Result<Extraction, ExtractionError>;
}

/// Name-keyed set of strategies with the density strategy as fallback.
pub struct StrategyRegistry {
    strategies: HashMap<&'static str, Box<dyn ExtractionStrategy>>,
    fallback: density::DensityStrategy,
}

impl Default for StrategyRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl StrategyRegistry {
    /// A registry holding only the density fallback.
    pub fn empty() -> Self {
        Self {
            strategies: HashMap::new(),
            fallback: density::DensityStrategy::default(),
        }
    }

    /// A registry with every built-in strategy.
    pub fn with_defaults() -> Self {
        let mut registry = Self::empty();
        registry.register(Box::new(selector::SelectorStrategy));
        registry.register(Box::new(density::DensityStrategy::default()));
        registry.register(Box::new(script::ScriptStrategy));
        registry.register(Box::new(json_ld::JsonLdStrategy));
        registry.register(Box::new(linebreak::LinebreakStrategy));
        registry
    }

    pub fn register(&mut self, strategy: Box<dyn ExtractionStrategy>) {
        self.strategies.insert(strategy.name(), strategy);
    }

    /// Pick the strategy a definition asks for, or the density fallback.
    pub fn select(&self, definition: Option<&SiteDefinition>) -> &dyn ExtractionStrategy {
        let Some(name) = definition.and_then(|d| d.strategy.as_deref()) else {
            return &self.fallback;
        };
        match self.strategies.get(name) {
            Some(strategy) => strategy.as_ref(),
            None => {
                warn!(strategy = name, "Unknown extraction strategy; using density");
                &self.fallback
            }
        }
    }
}

/// Parse a CSS selector, reporting failures as [`ExtractionError::InvalidSelector`].
pub fn parse_selector(selector: &str) -> Result<Selector, ExtractionError> {
    Selector::parse(selector).map_err(|e| ExtractionError::InvalidSelector {
        selector: selector.to_string(),
        reason: e.to_string(),
    })
}

/// Decoded text of an element with whitespace trimmed.
pub(crate) fn element_text(el: &ElementRef) -> String {
    el.text().collect::<String>().trim().to_string()
}

pub(crate) fn is_heading(name: &str) -> bool {
    matches!(name, "h1" | "h2" | "h3" | "h4" | "h5" | "h6")
}

/// Whether `el` sits inside a block that is emitted (or dropped) as a whole,
/// looking no higher than `container`.
pub(crate) fn nested_in_block(el: &ElementRef, container: &ElementRef) -> bool {
    el.ancestors()
        .take_while(|a| a.id() != container.id())
        .filter_map(ElementRef::wrap)
        .any(|a| matches!(a.value().name(), "blockquote" | "li" | "ul" | "ol"))
}

/// Tag-aware transcription of one element into output HTML.
///
/// Headings become `<h4>`, lists are kept whole, blockquotes are wrapped with
/// a `quoted` class and everything else becomes a paragraph. Inner markup is
/// preserved so links and emphasis survive. Returns `None` for empty elements.
pub(crate) fn transcribe(el: &ElementRef) -> Option<String> {
    let name = el.value().name();
    let inner = el.inner_html();
    let inner = inner.trim();
    let has_media = inner.contains("<img") || inner.contains("<iframe");
    if inner.is_empty() || (element_text(el).is_empty() && !has_media) {
        return None;
    }
    Some(if is_heading(name) {
        format!("<h4>{inner}</h4>")
    } else if matches!(name, "ul" | "ol") {
        el.html()
    } else if name == "blockquote" {
        format!("<blockquote class=\"quoted\">{inner}</blockquote>")
    } else {
        format!("<p>{inner}</p>")
    })
}

/// Remove empty-paragraph artifacts left by transcription.
pub fn strip_empty_paragraphs(html: &str) -> String {
    EMPTY_PARAGRAPHS.replace_all(html, "").trim().to_string()
}

/// Extract metadata and the article body from a fetched HTML page.
///
/// # Arguments
///
/// * `html` - The page source
/// * `definition` - Site definition for the page's host, if one is configured
/// * `registry` - Strategies by name; the definition's strategy is looked up here
///
/// # Returns
///
/// Open-graph and page attributes plus the body chosen by the strategy. Never
/// fails: strategy errors and empty results fall back to the page's meta
/// description, and if that is missing the article body stays empty.
pub fn extract_article(
    html: &str,
    definition: Option<&SiteDefinition>,
    registry: &StrategyRegistry,
) -> ExtractedArticle {
    let document = Html::parse_document(html);
    let (open_graph, attributes) = metadata::collect(&document);
    let mut article = ExtractedArticle {
        open_graph,
        attributes,
        html: String::new(),
        strategy: String::new(),
    };

    let strategy = registry.select(definition);
    let default_definition = SiteDefinition::default();
    let definition = definition.unwrap_or(&default_definition);

    match strategy.extract(&document, definition) {
        Ok(extraction) if !extraction.is_empty() => {
            info!(
                strategy = strategy.name(),
                bytes = extraction.html.len(),
                stats = ?extraction.stats,
                "Extracted article body"
            );
            article.html = extraction.html;
            article.strategy = strategy.name().to_string();
            return article;
        }
        Ok(extraction) => {
            info!(
                strategy = strategy.name(),
                stats = ?extraction.stats,
                "Strategy found no article body"
            );
        }
        Err(e) => {
            warn!(strategy = strategy.name(), error = %e, "Extraction failed");
        }
    }

    if let Some(description) = article.description() {
        debug!(
            description = %truncate_for_log(description, 120),
            "Falling back to meta description"
        );
        article.html = format!("<p>{}</p>", quick_xml::escape::escape(description));
        article.strategy = META_DESCRIPTION.to_string();
    }
    article
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Broken;

    impl ExtractionStrategy for Broken {
        fn name(&self) -> &'static str {
            "broken"
        }

        fn extract(&self, _: &Html, _: &SiteDefinition) -> Result<Extraction, ExtractionError> {
            Err(ExtractionError::Traversal("boom".into()))
        }
    }

    fn definition(strategy: &str) -> SiteDefinition {
        SiteDefinition {
            strategy: Some(strategy.to_string()),
            ..SiteDefinition::default()
        }
    }

    #[test]
    fn test_registry_selects_by_name() {
        let registry = StrategyRegistry::with_defaults();
        for name in ["selector", "density", "script", "json_ld", "linebreak"] {
            assert_eq!(registry.select(Some(&definition(name))).name(), name);
        }
    }

    #[test]
    fn test_registry_falls_back_to_density() {
        let registry = StrategyRegistry::with_defaults();
        assert_eq!(registry.select(None).name(), "density");
        assert_eq!(registry.select(Some(&SiteDefinition::default())).name(), "density");
        assert_eq!(registry.select(Some(&definition("nope"))).name(), "density");
    }

    #[test]
    fn test_transcribe_wraps_by_tag() {
        let doc = Html::parse_fragment(
            "<h2>Title <b>bold</b></h2><ul><li>a</li></ul><blockquote>q</blockquote>\
             <p>text <a href=\"/x\">link</a></p><p>  </p>",
        );
        let all = Selector::parse("h2, ul, blockquote, p").unwrap();
        let out: Vec<Option<String>> = doc.select(&all).map(|e| transcribe(&e)).collect();
        assert_eq!(out[0].as_deref(), Some("<h4>Title <b>bold</b></h4>"));
        assert_eq!(out[1].as_deref(), Some("<ul><li>a</li></ul>"));
        assert_eq!(
            out[2].as_deref(),
            Some("<blockquote class=\"quoted\">q</blockquote>")
        );
        assert_eq!(out[3].as_deref(), Some("<p>text <a href=\"/x\">link</a></p>"));
        assert_eq!(out[4], None);
    }

    #[test]
    fn test_strip_empty_paragraphs() {
        assert_eq!(
            strip_empty_paragraphs("<p>a</p><p> </p><P><br/></P><p>&nbsp;</p>"),
            "<p>a</p>"
        );
    }

    #[test]
    fn test_extract_article_uses_meta_description_on_failure() {
        let mut registry = StrategyRegistry::with_defaults();
        registry.register(Box::new(Broken));
        let html = r#"<html><head>
            <meta property="og:description" content="Fish &amp; chips">
            </head><body><p>only one</p></body></html>"#;

        let article = extract_article(html, Some(&definition("broken")), &registry);
        assert_eq!(article.strategy, META_DESCRIPTION);
        assert_eq!(article.html, "<p>Fish &amp; chips</p>");
    }

    #[test]
    fn test_extract_article_empty_when_nothing_available() {
        let registry = StrategyRegistry::with_defaults();
        let article = extract_article("<html><body><p>x</p></body></html>", None, &registry);
        assert!(article.is_empty());
        assert!(article.strategy.is_empty());
    }

    #[test]
    fn test_extract_article_collects_metadata() {
        let registry = StrategyRegistry::with_defaults();
        let html = r#"<html><head><title>Page</title>
            <meta property="og:title" content="OG Title">
            <meta name="description" content="Desc">
            </head><body><div id="a"><p>one</p><p>two</p><p>three</p></div></body></html>"#;
        let article = extract_article(html, None, &registry);
        assert_eq!(article.strategy, "density");
        assert_eq!(article.title(), Some("OG Title"));
        assert_eq!(article.attributes.get("title").map(String::as_str), Some("Page"));
        assert!(article.html.contains("<p>two</p>"));
    }
}

//! Extraction driven by per-site CSS selectors.

use super::{
    Extraction, ExtractionStats, ExtractionStrategy, nested_in_block, parse_selector,
    strip_empty_paragraphs, transcribe,
};
use crate::config::SiteDefinition;
use crate::error::ExtractionError;
use scraper::Html;
use tracing::debug;

/// Paragraph-like nodes collected inside the body when none are configured.
pub const DEFAULT_BLOCKS: &str = "p, h1, h2, h3, h4, h5, h6, ul, ol, blockquote";

/// Collects paragraph-like nodes inside every `body` match, in document order.
#[derive(Debug, Clone, Copy, Default)]
pub struct SelectorStrategy;

impl ExtractionStrategy for SelectorStrategy {
    fn name(&self) -> &'static str {
        "selector"
    }

    fn extract(
        &self,
        document: &Html,
        definition: &SiteDefinition,
    ) -> Result<Extraction, ExtractionError> {
        let body = definition
            .body
            .as_deref()
            .ok_or(ExtractionError::MissingField {
                strategy: "selector",
                field: "body",
            })?;
        let body = parse_selector(body)?;
        let blocks = parse_selector(definition.paragraph.as_deref().unwrap_or(DEFAULT_BLOCKS))?;

        let mut stats = ExtractionStats::default();
        let mut parts = Vec::new();
        for container in document.select(&body) {
            stats.containers += 1;
            for el in container.select(&blocks) {
                stats.candidates += 1;
                if nested_in_block(&el, &container) {
                    continue;
                }
                match transcribe(&el) {
                    Some(html) => {
                        stats.emitted += 1;
                        parts.push(html);
                    }
                    None => stats.skipped += 1,
                }
            }
        }
        stats.winning_count = stats.emitted;
        debug!(?stats, "Selector extraction finished");

        Ok(Extraction {
            html: strip_empty_paragraphs(&parts.join("\n")),
            stats,
        })
    }
}

//! Raw `application/ld+json` payload as the article body.

use super::{Extraction, ExtractionStats, ExtractionStrategy};
use crate::config::SiteDefinition;
use crate::error::ExtractionError;
use once_cell::sync::Lazy;
use scraper::{Html, Selector};

static LD_JSON: Lazy<Selector> =
    Lazy::new(|| Selector::parse(r#"script[type="application/ld+json"]"#).unwrap());

/// Returns the text of the first linked-data script verbatim.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonLdStrategy;

impl ExtractionStrategy for JsonLdStrategy {
    fn name(&self) -> &'static str {
        "json_ld"
    }

    fn extract(&self, document: &Html, _: &SiteDefinition) -> Result<Extraction, ExtractionError> {
        let payload = document
            .select(&LD_JSON)
            .next()
            .map(|s| s.text().collect::<String>().trim().to_string())
            .unwrap_or_default();
        let found = usize::from(!payload.is_empty());
        Ok(Extraction {
            html: payload,
            stats: ExtractionStats {
                candidates: found,
                containers: found,
                winning_count: found,
                emitted: found,
                skipped: 0,
            },
        })
    }
}

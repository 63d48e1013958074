//! Extraction from JSON embedded in inline scripts.
//!
//! Some sites ship the article body as state for a client-side app, e.g.
//! `window.__STATE__ = {"article": {"body": "<p>..</p>"}};`. The site
//! definition names a `marker` that identifies the script and a dotted `field`
//! path into the decoded object (`article.body`, `items.0.html`).

use super::{Extraction, ExtractionStats, ExtractionStrategy};
use crate::config::SiteDefinition;
use crate::error::ExtractionError;
use once_cell::sync::Lazy;
use quick_xml::escape::escape;
use scraper::{Html, Selector};
use serde_json::Value;
use tracing::debug;

static SCRIPTS: Lazy<Selector> = Lazy::new(|| Selector::parse("script").unwrap());

/// Reads the body out of a JSON object assigned inside a `<script>`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScriptStrategy;

impl ExtractionStrategy for ScriptStrategy {
    fn name(&self) -> &'static str {
        "script"
    }

    fn extract(
        &self,
        document: &Html,
        definition: &SiteDefinition,
    ) -> Result<Extraction, ExtractionError> {
        let marker = definition
            .marker
            .as_deref()
            .ok_or(ExtractionError::MissingField {
                strategy: "script",
                field: "marker",
            })?;
        let field = definition
            .field
            .as_deref()
            .ok_or(ExtractionError::MissingField {
                strategy: "script",
                field: "field",
            })?;

        for script in document.select(&SCRIPTS) {
            let text: String = script.text().collect();
            let Some(at) = text.find(marker) else {
                continue;
            };
            let json = balanced_object(&text[at..]).ok_or_else(|| {
                ExtractionError::UnbalancedJson {
                    marker: marker.to_string(),
                }
            })?;
            debug!(marker, bytes = json.len(), "Found embedded JSON");
            let value: Value = serde_json::from_str(json)?;
            let html = render(lookup(&value, field)?)?;
            let emitted = html.matches("<p>").count().max(usize::from(!html.is_empty()));
            return Ok(Extraction {
                html,
                stats: ExtractionStats {
                    candidates: 1,
                    containers: 1,
                    winning_count: 1,
                    emitted,
                    skipped: 0,
                },
            });
        }
        Err(ExtractionError::MarkerNotFound {
            marker: marker.to_string(),
        })
    }
}

/// The first balanced `{...}` in `text`, aware of JSON strings and escapes.
pub fn balanced_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (i, c) in text[start..].char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..=start + i]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Follow a dotted path; numeric segments index into arrays.
pub fn lookup<'a>(value: &'a Value, path: &str) -> Result<&'a Value, ExtractionError> {
    path.split('.')
        .filter(|s| !s.is_empty())
        .try_fold(value, |current, segment| {
            let next = match current {
                Value::Object(map) => map.get(segment),
                Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
                _ => None,
            };
            next.ok_or_else(|| ExtractionError::NotFound {
                path: path.to_string(),
            })
        })
}

/// Turn the addressed JSON value into an HTML fragment.
///
/// Strings that already hold markup pass through; plain text is split on
/// blank lines into escaped paragraphs. Arrays are rendered element-wise.
fn render(value: &Value) -> Result<String, ExtractionError> {
    match value {
        Value::String(s) if s.contains('<') => Ok(s.trim().to_string()),
        Value::String(s) => Ok(s
            .split("\n\n")
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(|p| format!("<p>{}</p>", escape(p)))
            .collect::<Vec<_>>()
            .join("\n")),
        Value::Array(items) => {
            let parts = items.iter().map(render).collect::<Result<Vec<_>, _>>()?;
            Ok(parts
                .into_iter()
                .filter(|p| !p.is_empty())
                .collect::<Vec<_>>()
                .join("\n"))
        }
        Value::Null => Ok(String::new()),
        other => Err(ExtractionError::Traversal(format!(
            "expected text at field, found {}",
            json_type(other)
        ))),
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

//! Candidate-link discovery on aggregator index pages.
//!
//! Two layouts are understood out of the box:
//!
//! - [`HeadlineDiscovery`]: the classic aggregator page where headlines sit in
//!   `<center>` blocks, the lead story marked with a `MAIN HEADLINE` comment
//!   or caption, and everything else in long link columns.
//! - [`SelectorDiscovery`]: any page where a CSS selector picks the anchors.
//!
//! Each link carries a positional label such as `"top headlines, article 2"`
//! that survives into the export table.

use crate::error::ExtractionError;
use crate::extract::parse_selector;
use crate::models::CandidateLink;
use crate::normalizer::{host_of, resolve};
use crate::utils::collapse_whitespace;
use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};
use std::collections::HashMap;
use tracing::debug;
use url::Url;

static ANCHORS: Lazy<Selector> = Lazy::new(|| Selector::parse("a[href]").unwrap());
static IMAGES: Lazy<Selector> = Lazy::new(|| Selector::parse("img[alt]").unwrap());

const MAIN_HEADLINES: &str = "main headlines";
const TOP_HEADLINES: &str = "top headlines";
const LINKS: &str = "links";

/// Turns an index page into ordered candidate links.
pub trait LinkDiscovery: Send + Sync {
    fn discover(&self, index_html: &str, base: &Url) -> Result<Vec<CandidateLink>, ExtractionError>;
}

/// `<center>`-block headline layout. Only links leaving the index host count.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeadlineDiscovery;

/// Anchors matched by a configured selector.
#[derive(Debug, Clone)]
pub struct SelectorDiscovery {
    pub selector: String,
}

impl SelectorDiscovery {
    pub fn new(selector: impl Into<String>) -> Self {
        Self {
            selector: selector.into(),
        }
    }
}

/// Link text, or the alt text of an image inside the link.
fn anchor_title(anchor: &ElementRef) -> String {
    let text = collapse_whitespace(&anchor.text().collect::<String>());
    if !text.is_empty() {
        return text;
    }
    anchor
        .select(&IMAGES)
        .filter_map(|img| img.value().attr("alt"))
        .map(collapse_whitespace)
        .find(|alt| !alt.is_empty())
        .unwrap_or_default()
}

/// Resolved http(s) URL of an anchor, if it has one.
fn anchor_url(anchor: &ElementRef, base: &Url) -> Option<String> {
    let href = anchor.value().attr("href")?.trim();
    if href.is_empty() {
        return None;
    }
    let url = resolve(href, base);
    url.starts_with("http").then_some(url)
}

/// Numbers links per section as they are pushed.
#[derive(Default)]
struct Labeler {
    counts: HashMap<&'static str, usize>,
    links: Vec<CandidateLink>,
}

impl Labeler {
    fn push(&mut self, section: &'static str, title: String, url: String) {
        let n = self.counts.entry(section).or_default();
        *n += 1;
        let order = self.links.len();
        self.links.push(CandidateLink {
            title,
            url,
            location: format!("{section}, article {n}"),
            order,
        });
    }
}

fn section_of(anchor: &ElementRef) -> &'static str {
    let center = anchor
        .ancestors()
        .filter_map(ElementRef::wrap)
        .find(|e| e.value().name() == "center");
    match center {
        Some(block) if block.inner_html().to_uppercase().contains("MAIN HEADLINE") => {
            MAIN_HEADLINES
        }
        Some(_) => TOP_HEADLINES,
        None => LINKS,
    }
}

impl LinkDiscovery for HeadlineDiscovery {
    fn discover(&self, index_html: &str, base: &Url) -> Result<Vec<CandidateLink>, ExtractionError> {
        let document = Html::parse_document(index_html);
        let index_host = base.host_str().map(str::to_ascii_lowercase);
        let mut labeler = Labeler::default();

        for anchor in document.select(&ANCHORS) {
            let Some(url) = anchor_url(&anchor, base) else {
                continue;
            };
            if host_of(&url) == index_host {
                continue;
            }
            let title = anchor_title(&anchor);
            if title.is_empty() {
                continue;
            }
            labeler.push(section_of(&anchor), title, url);
        }

        debug!(count = labeler.links.len(), "Discovered headline links");
        Ok(labeler.links)
    }
}

impl LinkDiscovery for SelectorDiscovery {
    fn discover(&self, index_html: &str, base: &Url) -> Result<Vec<CandidateLink>, ExtractionError> {
        let selector = parse_selector(&self.selector)?;
        let document = Html::parse_document(index_html);
        let mut labeler = Labeler::default();

        for el in document.select(&selector) {
            let anchor = if el.value().name() == "a" {
                Some(el)
            } else {
                el.select(&ANCHORS).next()
            };
            let Some(anchor) = anchor else {
                continue;
            };
            let Some(url) = anchor_url(&anchor, base) else {
                continue;
            };
            labeler.push(LINKS, anchor_title(&anchor), url);
        }

        debug!(
            selector = %self.selector,
            count = labeler.links.len(),
            "Discovered links by selector"
        );
        Ok(labeler.links)
    }
}

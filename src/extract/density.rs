//! Adaptive "paragraph density" extraction.
//!
//! Without any site knowledge, the article body is usually the element that
//! directly holds the most paragraph-like children. The algorithm:
//!
//! 1. Select every paragraph-like node (`p, ul, ol, blockquote` by default).
//! 2. For each, take its parent, or the grandparent when the parent is a
//!    `<blockquote>` (one level only), and count it under a canonical path
//!    such as `html:nth-child(1) > body:nth-child(2) > div:nth-child(1)`.
//! 3. The container with the highest count wins. Ties keep the first-seen
//!    container. A best count of one or less yields nothing.
//! 4. Transcribe the winner's paragraph-like descendants and headings in
//!    document order, dropping empty nodes, share/bookmark/related-link
//!    lists, and anything nested inside an already transcribed block.
//!
//! Pages with no paragraph-like nodes at all are retried by counting `<br>`
//! parents instead and splitting the winner on line breaks.

use super::linebreak::split_on_breaks;
use super::{
    Extraction, ExtractionStats, ExtractionStrategy, element_text, is_heading, nested_in_block,
    parse_selector, strip_empty_paragraphs, transcribe,
};
use crate::config::SiteDefinition;
use crate::error::ExtractionError;
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use std::collections::HashMap;
use tracing::{debug, warn};

/// Paragraph-like nodes counted when the site definition names none.
pub const DEFAULT_PARAGRAPH_SELECTOR: &str = "p, ul, ol, blockquote";

const HEADINGS: &str = "h1, h2, h3, h4, h5, h6";

static LINE_BREAKS: Lazy<Selector> = Lazy::new(|| Selector::parse("br").unwrap());

static BOILERPLATE_ATTR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)(?:^|[\s_-])(share|social|bookmark|rotator|playlist|related|newsletter|subscribe|breadcrumb|sponsor|promo|carousel|tags)(?:$|[\s_-])",
    )
    .unwrap()
});

const BOILERPLATE_TEXT: &[&str] = &[
    "share this",
    "share on",
    "bookmark",
    "follow us",
    "sign up for",
    "subscribe to",
    "related articles",
    "related stories",
    "more from",
    "email this",
];

/// The density strategy. `skip_empty` (on by default) drops paragraph nodes
/// whose decoded text is empty before they are counted.
#[derive(Debug, Clone, Copy)]
pub struct DensityStrategy {
    pub skip_empty: bool,
}

impl Default for DensityStrategy {
    fn default() -> Self {
        Self { skip_empty: true }
    }
}

impl ExtractionStrategy for DensityStrategy {
    fn name(&self) -> &'static str {
        "density"
    }

    fn extract(
        &self,
        document: &Html,
        definition: &SiteDefinition,
    ) -> Result<Extraction, ExtractionError> {
        let paragraph = definition
            .paragraph
            .as_deref()
            .unwrap_or(DEFAULT_PARAGRAPH_SELECTOR);
        self.run(document, paragraph)
    }
}

/// Per-container counts in first-seen order.
#[derive(Default)]
struct Tally<'a> {
    counts: Vec<(String, usize, ElementRef<'a>)>,
    index: HashMap<String, usize>,
    candidates: usize,
}

impl<'a> Tally<'a> {
    fn add(&mut self, container: ElementRef<'a>) {
        self.candidates += 1;
        let path = canonical_path(&container);
        match self.index.get(&path) {
            Some(&i) => self.counts[i].1 += 1,
            None => {
                self.index.insert(path.clone(), self.counts.len());
                self.counts.push((path, 1, container));
            }
        }
    }

    /// Highest count wins; strict comparison keeps the first-seen on ties.
    fn winner(&self) -> Option<&(String, usize, ElementRef<'a>)> {
        let mut best: Option<&(String, usize, ElementRef<'a>)> = None;
        for entry in &self.counts {
            if best.is_none_or(|b| entry.1 > b.1) {
                best = Some(entry);
            }
        }
        best
    }

    fn stats(&self) -> ExtractionStats {
        ExtractionStats {
            candidates: self.candidates,
            containers: self.counts.len(),
            winning_count: self.winner().map(|w| w.1).unwrap_or(0),
            ..ExtractionStats::default()
        }
    }
}

impl DensityStrategy {
    /// Run the algorithm with an explicit paragraph selector.
    pub fn run(&self, document: &Html, paragraph: &str) -> Result<Extraction, ExtractionError> {
        let selector = parse_selector(paragraph)?;
        let nodes: Vec<ElementRef> = document
            .select(&selector)
            .filter(|el| !self.skip_empty || !element_text(el).is_empty())
            .collect();
        if nodes.is_empty() {
            debug!("No paragraph-like nodes; counting line breaks");
            return self.run_linebreaks(document);
        }

        let mut tally = Tally::default();
        for node in nodes {
            if let Some(container) = counted_container(node) {
                tally.add(container);
            }
        }

        let mut stats = tally.stats();
        let Some((path, count, container)) = tally.winner() else {
            return Ok(Extraction::empty(stats));
        };
        if *count <= 1 {
            debug!(best = *count, "No container holds more than one paragraph");
            return Ok(Extraction::empty(stats));
        }
        debug!(container = %path, count, "Selected densest container");

        let emit = parse_selector(&format!("{paragraph}, {HEADINGS}"))?;
        let mut parts = Vec::new();
        for el in container.select(&emit) {
            if nested_in_block(&el, container) {
                continue;
            }
            let name = el.value().name();
            let is_list = matches!(name, "ul" | "ol");
            if (is_list || name == "blockquote") && element_text(&el).is_empty() {
                warn!(tag = name, "Skipping empty block");
                stats.skipped += 1;
                continue;
            }
            if is_list && is_boilerplate(&el, *container) {
                debug!("Skipping boilerplate list");
                stats.skipped += 1;
                continue;
            }
            match transcribe(&el) {
                Some(html) => {
                    stats.emitted += 1;
                    parts.push(html);
                }
                None => {
                    if !is_heading(name) {
                        stats.skipped += 1;
                    }
                }
            }
        }

        Ok(Extraction {
            html: strip_empty_paragraphs(&parts.join("\n")),
            stats,
        })
    }

    fn run_linebreaks(&self, document: &Html) -> Result<Extraction, ExtractionError> {
        let mut tally = Tally::default();
        for br in document.select(&LINE_BREAKS) {
            if let Some(container) = counted_container(br) {
                tally.add(container);
            }
        }
        let mut stats = tally.stats();
        let Some((path, count, container)) = tally.winner() else {
            return Ok(Extraction::empty(stats));
        };
        if *count <= 1 {
            return Ok(Extraction::empty(stats));
        }
        debug!(container = %path, count, "Selected line-break container");

        let html = split_on_breaks(&container.inner_html());
        stats.emitted = html.matches("<p>").count();
        Ok(Extraction { html, stats })
    }
}

/// The element a paragraph counts toward: its parent, or the grandparent if
/// the parent is a blockquote.
fn counted_container(node: ElementRef) -> Option<ElementRef> {
    let parent = node.parent().and_then(ElementRef::wrap)?;
    if parent.value().name() == "blockquote" {
        return parent.parent().and_then(ElementRef::wrap).or(Some(parent));
    }
    Some(parent)
}

/// `tag:nth-child(n)` segments from the root down to `el`.
pub fn canonical_path(el: &ElementRef) -> String {
    let mut segments: Vec<String> = std::iter::once(*el)
        .chain(el.ancestors().filter_map(ElementRef::wrap))
        .map(|e| {
            let position = e.prev_siblings().filter(|n| n.value().is_element()).count() + 1;
            format!("{}:nth-child({})", e.value().name(), position)
        })
        .collect();
    segments.reverse();
    segments.join(" > ")
}

/// Share, bookmark, rotator and related-link lists.
///
/// Only the list itself and its wrappers inside `container` are checked by
/// class and id; the container's own attributes say nothing about one list.
fn is_boilerplate(list: &ElementRef, container: ElementRef) -> bool {
    let attrs_match = std::iter::once(*list)
        .chain(
            list.ancestors()
                .take_while(|n| n.id() != container.id())
                .take(2)
                .filter_map(ElementRef::wrap),
        )
        .any(|e| {
            let v = e.value();
            v.attr("class").is_some_and(|c| BOILERPLATE_ATTR.is_match(c))
                || v.attr("id").is_some_and(|i| BOILERPLATE_ATTR.is_match(i))
        });
    if attrs_match {
        return true;
    }
    let text = element_text(list).to_lowercase();
    BOILERPLATE_TEXT.iter().any(|m| text.starts_with(m))
        || (text.len() < 120 && text.contains("facebook") && text.contains("twitter"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(html: &str) -> Extraction {
        let doc = Html::parse_document(html);
        DensityStrategy::default()
            .extract(&doc, &SiteDefinition::default())
            .unwrap()
    }

    #[test]
    fn test_densest_container_wins() {
        let html = r#"<html><body>
            <div id="sidebar"><p>ad</p></div>
            <div id="story">
              <p>one</p><p>two</p><p>three</p><p>four</p><p>five</p>
            </div></body></html>"#;
        let out = run(html);
        assert_eq!(out.stats.winning_count, 5);
        assert!(out.html.contains("<p>one</p>"));
        assert!(out.html.contains("<p>five</p>"));
        assert!(!out.html.contains("ad"));
        assert_eq!(out.stats.emitted, 5);
    }

    #[test]
    fn test_single_paragraph_is_empty() {
        let out = run("<html><body><div><p>lonely</p></div><div><p>other</p></div></body></html>");
        assert!(out.is_empty());
        assert_eq!(out.stats.winning_count, 1);
    }

    #[test]
    fn test_tie_keeps_first_container() {
        let html = r#"<html><body>
            <div id="a"><p>a1</p><p>a2</p></div>
            <div id="b"><p>b1</p><p>b2</p></div>
            </body></html>"#;
        let out = run(html);
        assert!(out.html.contains("a1"));
        assert!(!out.html.contains("b1"));
    }

    #[test]
    fn test_blockquote_paragraphs_count_toward_outer_container() {
        let html = r#"<html><body>
            <div id="main">
              <p>intro</p>
              <blockquote><p>q1</p><p>q2</p><p>q3</p></blockquote>
            </div>
            <div id="other"><p>x</p><p>y</p><p>z</p></div>
            </body></html>"#;
        let out = run(html);
        assert!(out.html.contains("<p>intro</p>"));
        assert!(out.html.contains("<blockquote class=\"quoted\"><p>q1</p>"));
        assert_eq!(out.html.matches("q1").count(), 1);
        assert!(!out.html.contains(">x<"));
    }

    #[test]
    fn test_lists_and_headings_transcribed() {
        let html = r#"<html><body><article>
            <h2>Section</h2>
            <p>one</p>
            <ul><li>point</li></ul>
            <ul class="share-tools"><li>Facebook</li><li>Twitter</li></ul>
            <ul><li>  </li></ul>
            <p>two</p>
            </article></body></html>"#;
        let out = run(html);
        assert!(out.html.starts_with("<h4>Section</h4>"));
        assert!(out.html.contains("<ul><li>point</li></ul>"));
        assert!(!out.html.contains("Facebook"));
        assert!(out.stats.skipped >= 2);
    }

    #[test]
    fn test_container_attributes_do_not_mark_lists_as_boilerplate() {
        let html = r#"<html><body>
            <div class="article-body has-share-bar">
              <p>one</p><p>two</p>
              <ul><li>Key point of the article</li></ul>
              <div class="hashtags-note"><ul><li>Second point</li></ul></div>
              <div class="social-links"><ul><li>Follow</li></ul></div>
              <p>three</p>
            </div></body></html>"#;
        let out = run(html);
        assert!(out.html.contains("<ul><li>Key point of the article</li></ul>"));
        assert!(out.html.contains("Second point"));
        assert!(!out.html.contains("Follow"));
        assert!(out.html.ends_with("<p>three</p>"));
    }

    #[test]
    fn test_line_break_fallback() {
        let html = "<html><body><div>first line<br>second line<br/>third</div></body></html>";
        let out = run(html);
        assert_eq!(
            out.html,
            "<p>first line</p>\n<p>second line</p>\n<p>third</p>"
        );
    }

    #[test]
    fn test_skip_empty_ignores_blank_nodes() {
        let html = r#"<html><body>
            <div id="blank"><p></p><p> </p><p></p></div>
            <div id="text"><p>a</p><p>b</p></div>
            </body></html>"#;
        let doc = Html::parse_document(html);
        let strict = DensityStrategy { skip_empty: true }
            .run(&doc, DEFAULT_PARAGRAPH_SELECTOR)
            .unwrap();
        assert_eq!(strict.html, "<p>a</p>\n<p>b</p>");

        let loose = DensityStrategy { skip_empty: false }
            .run(&doc, DEFAULT_PARAGRAPH_SELECTOR)
            .unwrap();
        assert!(loose.is_empty());
    }

    #[test]
    fn test_canonical_path() {
        let doc = Html::parse_document("<html><body><div></div><div><p>x</p></div></body></html>");
        let p = doc.select(&Selector::parse("p").unwrap()).next().unwrap();
        assert_eq!(
            canonical_path(&p),
            "html:nth-child(1) > body:nth-child(2) > div:nth-child(2) > p:nth-child(1)"
        );
    }

    #[test]
    fn test_invalid_selector() {
        let doc = Html::parse_document("<p>x</p>");
        let err = DensityStrategy::default().run(&doc, "p[").unwrap_err();
        assert!(matches!(err, ExtractionError::InvalidSelector { .. }));
    }
}

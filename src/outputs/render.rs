//! Turns archived items into presentation-facing export rows.
//!
//! The template is picked by fixed priority:
//!
//! | Template | When |
//! |----------|------|
//! | `Graphic` | the artifact is an image |
//! | `Video` | a video was lifted from the page, or the link points at a video host |
//! | `Text` | an article body was extracted |
//! | `Minimal` | nothing usable: a "could not crawl" notice with the original link |

use crate::models::{ArchivedItem, ExportedItem, RenderTemplate};
use crate::normalizer::host_of;
use chrono::{DateTime, Utc};
use quick_xml::escape::escape;

/// Hosts whose links are rendered as video even without a lifted embed.
const VIDEO_HOSTS: [&str; 7] = [
    "youtube.com",
    "youtu.be",
    "youtube-nocookie.com",
    "vimeo.com",
    "rumble.com",
    "bitchute.com",
    "dailymotion.com",
];

fn is_video_host(url: &str) -> bool {
    host_of(url).is_some_and(|host| {
        VIDEO_HOSTS
            .iter()
            .any(|v| host == *v || host.ends_with(&format!(".{v}")))
    })
}

/// Pick the rendering template for an item.
pub fn choose_template(item: &ArchivedItem) -> RenderTemplate {
    if item.fetch.as_ref().is_some_and(|f| f.kind.is_graphic()) {
        RenderTemplate::Graphic
    } else if item.article.video_url().is_some() || is_video_host(&item.link.url) {
        RenderTemplate::Video
    } else if !item.article.is_empty() {
        RenderTemplate::Text
    } else {
        RenderTemplate::Minimal
    }
}

fn minimal_body(title: &str, url: &str) -> String {
    format!(
        "<p>Could not crawl this item. <a href=\"{}\">{}</a></p>",
        escape(url),
        escape(title)
    )
}

fn video_body(item: &ArchivedItem) -> String {
    let og = &item.article.open_graph;
    let src = item.article.video_url().unwrap_or(&item.link.url);
    let dims: String = ["width", "height"]
        .iter()
        .filter_map(|d| {
            og.get(&format!("og:video:{d}"))
                .map(|v| format!(" {d}=\"{}\"", escape(v.as_str())))
        })
        .collect();
    let mut body = format!(
        "<div class=\"video\"><iframe src=\"{}\"{dims} allowfullscreen></iframe></div>",
        escape(src)
    );
    if !item.article.is_empty() {
        body.push('\n');
        body.push_str(&item.article.html);
    }
    body
}

/// Render one archived item into an export row stamped with `exported_at`.
pub fn render(item: &ArchivedItem, exported_at: DateTime<Utc>) -> ExportedItem {
    let template = choose_template(item);
    let title = item.display_title().to_string();
    let url = item.link.url.clone();

    let (body_html, image) = match template {
        RenderTemplate::Graphic => {
            let src = item
                .fetch
                .as_ref()
                .map_or(url.as_str(), |f| f.true_url.as_str());
            (
                format!(
                    "<p><a href=\"{}\"><img src=\"{}\" alt=\"{}\"></a></p>",
                    escape(url.as_str()),
                    escape(src),
                    escape(title.as_str())
                ),
                Some(src.to_string()),
            )
        }
        RenderTemplate::Video => (
            video_body(item),
            item.article.cover_image().map(str::to_string),
        ),
        RenderTemplate::Text => (
            item.article.html.clone(),
            item.article.cover_image().map(str::to_string),
        ),
        RenderTemplate::Minimal => (minimal_body(&title, &url), None),
    };

    ExportedItem {
        collection: item.collection.clone(),
        hash: item.hash.clone(),
        run_id: item.run_id.clone(),
        title,
        url,
        location: item.link.location.clone(),
        order: item.link.order,
        template,
        body_html,
        image,
        exported_at,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        CandidateLink, ContentKind, CrawlTarget, FetchMethod, FetchResult, ItemStatus, RunId,
    };
    use std::path::PathBuf;

    fn item(url: &str) -> ArchivedItem {
        let target = CrawlTarget::new("https://agg.example.com/", "news");
        let link = CandidateLink {
            title: "Story & more".into(),
            url: url.into(),
            location: "top headlines, article 2".into(),
            order: 1,
        };
        let run = RunId::new("news", Utc::now());
        ArchivedItem::minimal(&target, link, &run, ItemStatus::Archived, "test")
    }

    fn fetched(kind: ContentKind, url: &str) -> FetchResult {
        FetchResult {
            status: 200,
            path: PathBuf::from("/tmp/x"),
            kind,
            mime: Some(kind.mime().to_string()),
            true_url: url.to_string(),
            method: FetchMethod::Primary,
            fetched_at: Utc::now(),
        }
    }

    #[test]
    fn test_template_priority() {
        let mut graphic = item("https://i.example.com/a.png");
        graphic.fetch = Some(fetched(ContentKind::Png, "https://i.example.com/a.png"));
        graphic.article.html = "<p>ignored</p>".into();
        graphic
            .article
            .open_graph
            .insert("og:video:url".into(), "https://youtube.com/embed/x".into());
        assert_eq!(choose_template(&graphic), RenderTemplate::Graphic);

        let mut video = item("https://news.example.com/a");
        video.article.html = "<p>text</p>".into();
        video
            .article
            .open_graph
            .insert("og:video:url".into(), "https://youtube.com/embed/x".into());
        assert_eq!(choose_template(&video), RenderTemplate::Video);

        assert_eq!(
            choose_template(&item("https://www.youtube.com/watch?v=1")),
            RenderTemplate::Video
        );

        let mut text = item("https://news.example.com/a");
        text.article.html = "<p>text</p>".into();
        assert_eq!(choose_template(&text), RenderTemplate::Text);

        assert_eq!(
            choose_template(&item("https://news.example.com/a")),
            RenderTemplate::Minimal
        );
    }

    #[test]
    fn test_minimal_render_links_original() {
        let now = Utc::now();
        let row = render(&item("https://news.example.com/a?x=1&y=2"), now);
        assert_eq!(row.template, RenderTemplate::Minimal);
        assert_eq!(
            row.body_html,
            "<p>Could not crawl this item. \
             <a href=\"https://news.example.com/a?x=1&amp;y=2\">Story &amp; more</a></p>"
        );
        assert_eq!(row.exported_at, now);
        assert_eq!(row.order, 1);
        assert_eq!(row.location, "top headlines, article 2");
        assert!(row.image.is_none());
    }

    #[test]
    fn test_video_render_uses_lifted_embed() {
        let mut v = item("https://news.example.com/a");
        let og = &mut v.article.open_graph;
        og.insert("og:video:url".into(), "https://www.youtube.com/embed/abc".into());
        og.insert("og:video:width".into(), "560".into());
        og.insert("og:image".into(), "https://cdn.example.com/c.jpg".into());
        v.article.html = "<p>caption</p>".into();

        let row = render(&v, Utc::now());
        assert_eq!(
            row.body_html,
            "<div class=\"video\"><iframe src=\"https://www.youtube.com/embed/abc\" \
             width=\"560\" allowfullscreen></iframe></div>\n<p>caption</p>"
        );
        assert_eq!(row.image.as_deref(), Some("https://cdn.example.com/c.jpg"));
    }

    #[test]
    fn test_graphic_render() {
        let mut g = item("https://i.example.com/a.png");
        g.fetch = Some(fetched(ContentKind::Png, "https://cdn.example.com/a.png"));
        let row = render(&g, Utc::now());
        assert_eq!(row.template, RenderTemplate::Graphic);
        assert_eq!(row.image.as_deref(), Some("https://cdn.example.com/a.png"));
        assert!(row.body_html.contains("<img src=\"https://cdn.example.com/a.png\""));
    }
}

//! RSS 2.0 redistribution of a collection's export table.
//!
//! One file per collection, rewritten after every export:
//!
//! ```text
//! feed_output_dir/
//! ├── headlines.xml
//! └── sport.xml
//! ```

use crate::fetcher::sniff_kind;
use crate::models::{ContentKind, CrawlTarget, ExportedItem};
use chrono::Utc;
use quick_xml::Writer;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use std::error::Error;
use std::io::Write;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{info, instrument};
use url::Url;

type BoxError = Box<dyn Error + Send + Sync>;

fn text_element<W: Write>(writer: &mut Writer<W>, name: &str, text: &str) -> Result<(), BoxError> {
    writer.write_event(Event::Start(BytesStart::new(name)))?;
    writer.write_event(Event::Text(BytesText::new(text)))?;
    writer.write_event(Event::End(BytesEnd::new(name)))?;
    Ok(())
}

/// File name for a collection's feed, with unsafe characters replaced.
pub fn feed_file_name(collection: &str) -> String {
    let safe: String = collection
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
        .collect();
    format!("{safe}.xml")
}

/// MIME type of a cover image, from its extension. Unknown extensions are
/// announced as JPEG.
fn enclosure_type(image: &str) -> &'static str {
    match Url::parse(image).map(|u| sniff_kind(&u)) {
        Ok(kind) if kind.is_graphic() => kind.mime(),
        _ => ContentKind::Jpg.mime(),
    }
}

/// Serialize export rows (already in display order) as an RSS document.
pub fn render_rss(target: &CrawlTarget, items: &[ExportedItem]) -> Result<String, BoxError> {
    let mut writer = Writer::new(Vec::new());
    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;

    let mut rss = BytesStart::new("rss");
    rss.push_attribute(("version", "2.0"));
    writer.write_event(Event::Start(rss))?;
    writer.write_event(Event::Start(BytesStart::new("channel")))?;

    let title = target.title.as_deref().unwrap_or(&target.collection);
    text_element(&mut writer, "title", title)?;
    text_element(&mut writer, "link", &target.feed_url)?;
    text_element(
        &mut writer,
        "description",
        &format!("Archived links from {}", target.feed_url),
    )?;
    text_element(&mut writer, "lastBuildDate", &Utc::now().to_rfc2822())?;

    for item in items {
        writer.write_event(Event::Start(BytesStart::new("item")))?;
        text_element(&mut writer, "title", &item.title)?;
        text_element(&mut writer, "link", &item.url)?;

        let mut guid = BytesStart::new("guid");
        guid.push_attribute(("isPermaLink", "false"));
        writer.write_event(Event::Start(guid))?;
        writer.write_event(Event::Text(BytesText::new(item.hash.as_str())))?;
        writer.write_event(Event::End(BytesEnd::new("guid")))?;

        text_element(&mut writer, "pubDate", &item.exported_at.to_rfc2822())?;
        text_element(&mut writer, "category", &item.location)?;
        text_element(&mut writer, "description", &item.body_html)?;
        if let Some(image) = &item.image {
            let mut enclosure = BytesStart::new("enclosure");
            enclosure.push_attribute(("url", image.as_str()));
            enclosure.push_attribute(("length", "0"));
            enclosure.push_attribute(("type", enclosure_type(image)));
            writer.write_event(Event::Empty(enclosure))?;
        }
        writer.write_event(Event::End(BytesEnd::new("item")))?;
    }

    writer.write_event(Event::End(BytesEnd::new("channel")))?;
    writer.write_event(Event::End(BytesEnd::new("rss")))?;
    Ok(String::from_utf8(writer.into_inner())?)
}

/// Write the feed for `target` into `output_dir` and return its path.
#[instrument(level = "info", skip_all, fields(collection = %target.collection, items = items.len()))]
pub async fn write_feed(
    output_dir: &Path,
    target: &CrawlTarget,
    items: &[ExportedItem],
) -> Result<PathBuf, BoxError> {
    let xml = render_rss(target, items)?;
    fs::create_dir_all(output_dir).await?;
    let path = output_dir.join(feed_file_name(&target.collection));
    fs::write(&path, xml).await?;
    info!(path = %path.display(), "Wrote RSS feed");
    Ok(path)
}

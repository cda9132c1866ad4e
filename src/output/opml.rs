//! OPML subscription-list output
//!
//! Serializes discovered feeds as an OPML 2.0 document, one `<outline>` per
//! feed. <http://opml.org/spec2.opml#subscriptionLists>

use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;

use crate::feed::FeedInfo;
use crate::FeedscoutError;

fn write(writer: &mut Writer<Vec<u8>>, event: Event<'_>) -> Result<(), FeedscoutError> {
    writer
        .write_event(event)
        .map_err(|e| FeedscoutError::Output(e.to_string()))
}

/// Renders feeds as an OPML 2.0 subscription list.
///
/// A pure function of its input: the same feed list always produces the
/// same bytes.
pub fn output_opml(feeds: &[FeedInfo]) -> Result<Vec<u8>, FeedscoutError> {
    let mut writer = Writer::new(Vec::new());

    write(
        &mut writer,
        Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)),
    )?;

    let mut opml = BytesStart::new("opml");
    opml.push_attribute(("version", "2.0"));
    write(&mut writer, Event::Start(opml))?;

    write(&mut writer, Event::Start(BytesStart::new("head")))?;
    write(&mut writer, Event::Start(BytesStart::new("title")))?;
    write(&mut writer, Event::Text(BytesText::new("Feeds")))?;
    write(&mut writer, Event::End(BytesEnd::new("title")))?;
    write(&mut writer, Event::End(BytesEnd::new("head")))?;

    write(&mut writer, Event::Start(BytesStart::new("body")))?;

    for feed in feeds {
        let mut outline = BytesStart::new("outline");
        outline.push_attribute(("type", "rss"));
        if !feed.title.is_empty() {
            outline.push_attribute(("text", feed.title.as_str()));
            outline.push_attribute(("title", feed.title.as_str()));
        }
        outline.push_attribute(("xmlUrl", feed.url.as_str()));
        if let Some(site_url) = &feed.site_url {
            outline.push_attribute(("htmlUrl", site_url.as_str()));
        }
        if !feed.description.is_empty() {
            outline.push_attribute(("description", feed.description.as_str()));
        }
        if !feed.version.is_empty() {
            outline.push_attribute(("version", feed.version.as_str()));
        }
        write(&mut writer, Event::Empty(outline))?;
    }

    write(&mut writer, Event::End(BytesEnd::new("body")))?;
    write(&mut writer, Event::End(BytesEnd::new("opml")))?;

    Ok(writer.into_inner())
}

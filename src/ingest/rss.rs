// src/ingest/rss.rs
//! Streaming RSS 2.0 / RSS 1.0 / Atom parser on top of `quick-xml` events.
//! Produces raw, un-normalized entries; `ingest` turns them into `NewsItem`s.

use anyhow::{bail, Result};
use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawEntry {
    pub title: String,
    pub link: String,
    pub description: String,
    pub pub_date: Option<String>,
    pub guid: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Title,
    Link,
    Description,
    Content,
    Published,
    Updated,
    Guid,
}

impl Field {
    fn from_local_name(name: &[u8]) -> Option<Self> {
        Some(match name {
            b"title" => Field::Title,
            b"link" => Field::Link,
            b"description" | b"summary" => Field::Description,
            b"content" | b"encoded" => Field::Content,
            b"pubDate" | b"published" | b"date" | b"issued" => Field::Published,
            b"updated" | b"modified" => Field::Updated,
            b"guid" | b"id" => Field::Guid,
            _ => return None,
        })
    }
}

#[derive(Default)]
struct EntryBuilder {
    raw: RawEntry,
    content: String,
    updated: Option<String>,
}

impl EntryBuilder {
    fn set(&mut self, field: Field, text: String) {
        let text = text.trim().to_string();
        if text.is_empty() {
            return;
        }
        match field {
            Field::Title if self.raw.title.is_empty() => self.raw.title = text,
            Field::Link if self.raw.link.is_empty() => self.raw.link = text,
            Field::Description if self.raw.description.is_empty() => self.raw.description = text,
            Field::Content if self.content.is_empty() => self.content = text,
            Field::Published if self.raw.pub_date.is_none() => self.raw.pub_date = Some(text),
            Field::Updated if self.updated.is_none() => self.updated = Some(text),
            Field::Guid if self.raw.guid.is_none() => self.raw.guid = Some(text),
            _ => {}
        }
    }

    fn finish(mut self) -> RawEntry {
        if self.raw.description.is_empty() {
            self.raw.description = self.content;
        }
        if self.raw.pub_date.is_none() {
            self.raw.pub_date = self.updated;
        }
        // RSS items sometimes carry the permalink only in <guid>.
        if self.raw.link.is_empty() {
            if let Some(g) = &self.raw.guid {
                if g.starts_with("http://") || g.starts_with("https://") {
                    self.raw.link = g.clone();
                }
            }
        }
        self.raw
    }
}

/// Field an element inside an item maps to. Media RSS elements (`media:title`,
/// `media:description`, `media:content`) describe attachments, not the story.
fn entry_field(e: &BytesStart<'_>) -> Option<Field> {
    if e.name().prefix().is_some_and(|p| p.as_ref() == b"media") {
        return None;
    }
    Field::from_local_name(e.local_name().as_ref())
}

/// Atom `<link href=".." rel="alternate"/>`; links with another `rel` are ignored.
fn atom_href(e: &BytesStart<'_>) -> Option<String> {
    let mut href = None;
    let mut rel_ok = true;
    for attr in e.attributes().flatten() {
        match attr.key.local_name().as_ref() {
            b"href" => href = attr.unescape_value().ok().map(|v| v.into_owned()),
            b"rel" => {
                rel_ok = attr
                    .unescape_value()
                    .map(|v| v == "alternate")
                    .unwrap_or(false)
            }
            _ => {}
        }
    }
    href.filter(|_| rel_ok)
}

/// Entities HTML feeds use that XML does not define.
fn scrub_html_entities_for_xml(s: &str) -> String {
    s.replace("&nbsp;", " ")
        .replace("&ndash;", "-")
        .replace("&mdash;", "-")
        .replace("&hellip;", "...")
        .replace("&ldquo;", "\"")
        .replace("&rdquo;", "\"")
        .replace("&lsquo;", "'")
        .replace("&rsquo;", "'")
}

/// Parse a feed document. Items without both title and link are dropped.
pub fn parse_feed(xml: &str) -> Result<Vec<RawEntry>> {
    let cleaned = scrub_html_entities_for_xml(xml);
    let mut reader = Reader::from_str(&cleaned);
    reader.config_mut().trim_text(true);

    let mut is_feed = false;
    let mut out = Vec::new();
    let mut entry: Option<EntryBuilder> = None;
    // (field, nested depth, text buffer)
    let mut capture: Option<(Field, usize, String)> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                let name = e.local_name();
                let name = name.as_ref();
                if let Some((_, depth, _)) = capture.as_mut() {
                    *depth += 1;
                    continue;
                }
                match name {
                    b"rss" | b"feed" | b"RDF" | b"channel" => is_feed = true,
                    b"item" | b"entry" => entry = Some(EntryBuilder::default()),
                    _ => {
                        if let Some(b) = entry.as_mut() {
                            if let Some(field) = entry_field(&e) {
                                if field == Field::Link {
                                    if let Some(href) = atom_href(&e) {
                                        b.set(Field::Link, href);
                                    }
                                }
                                capture = Some((field, 0, String::new()));
                            }
                        }
                    }
                }
            }
            Ok(Event::Empty(e)) => {
                if capture.is_some() {
                    continue;
                }
                if let Some(b) = entry.as_mut() {
                    if e.local_name().as_ref() == b"link" {
                        if let Some(href) = atom_href(&e) {
                            b.set(Field::Link, href);
                        }
                    }
                }
            }
            Ok(Event::Text(t)) => {
                if let Some((_, _, buf)) = capture.as_mut() {
                    let text = t
                        .unescape()
                        .map(|c| c.into_owned())
                        .unwrap_or_else(|_| String::from_utf8_lossy(&t).into_owned());
                    push_text(buf, &text);
                }
            }
            Ok(Event::CData(c)) => {
                if let Some((_, _, buf)) = capture.as_mut() {
                    push_text(buf, &String::from_utf8_lossy(&c));
                }
            }
            Ok(Event::End(e)) => {
                if let Some((field, depth, buf)) = capture.take() {
                    if depth > 0 {
                        capture = Some((field, depth - 1, buf));
                        continue;
                    }
                    if let Some(b) = entry.as_mut() {
                        b.set(field, buf);
                    }
                    continue;
                }
                if matches!(e.local_name().as_ref(), b"item" | b"entry") {
                    if let Some(b) = entry.take() {
                        let raw = b.finish();
                        if !raw.title.is_empty() && !raw.link.is_empty() {
                            out.push(raw);
                        }
                    }
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => bail!(
                "malformed feed xml at byte {}: {e}",
                reader.buffer_position()
            ),
            _ => {}
        }
    }

    if !is_feed {
        bail!("document is not an RSS or Atom feed");
    }
    Ok(out)
}

fn push_text(buf: &mut String, text: &str) {
    if !buf.is_empty() {
        buf.push(' ');
    }
    buf.push_str(text);
}

#[cfg(test)]
mod tests {
    use super::*;

    const RSS: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0" xmlns:content="http://purl.org/rss/1.0/modules/content/">
  <channel>
    <title>Example</title>
    <link>https://example.com</link>
    <item>
      <title>Battery maker doubles output</title>
      <link>https://example.com/battery</link>
      <description><![CDATA[<p>The plant&nbsp;expands <b>fast</b>.</p>]]></description>
      <pubDate>Tue, 14 Oct 2025 09:30:00 +0000</pubDate>
      <guid isPermaLink="false">abc-1</guid>
    </item>
    <item>
      <title>No link here</title>
      <description>dropped</description>
    </item>
    <item>
      <title>Guid as permalink</title>
      <guid>https://example.com/guid-link</guid>
      <content:encoded>Full text body</content:encoded>
    </item>
  </channel>
</rss>"#;

    const ATOM: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <title>Atom example</title>
  <entry>
    <title type="html">Phone launch &amp; pricing</title>
    <link rel="alternate" type="text/html" href="https://example.org/phone"/>
    <link rel="replies" href="https://example.org/phone#comments"/>
    <id>tag:example.org,2025:1</id>
    <published>2025-10-14T10:00:00Z</published>
    <summary type="html">&lt;p&gt;New phone&lt;/p&gt;</summary>
  </entry>
</feed>"#;

    #[test]
    fn parses_rss_items_and_drops_incomplete() {
        let items = parse_feed(RSS).unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].title, "Battery maker doubles output");
        assert_eq!(items[0].link, "https://example.com/battery");
        assert!(items[0].description.contains("<b>fast</b>"));
        assert_eq!(items[0].guid.as_deref(), Some("abc-1"));
        assert_eq!(
            items[0].pub_date.as_deref(),
            Some("Tue, 14 Oct 2025 09:30:00 +0000")
        );
        assert_eq!(items[1].link, "https://example.com/guid-link");
        assert_eq!(items[1].description, "Full text body");
    }

    #[test]
    fn parses_atom_entries() {
        let items = parse_feed(ATOM).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].title, "Phone launch & pricing");
        assert_eq!(items[0].link, "https://example.org/phone");
        assert_eq!(items[0].description, "<p>New phone</p>");
        assert_eq!(items[0].pub_date.as_deref(), Some("2025-10-14T10:00:00Z"));
    }

    #[test]
    fn rejects_non_feed_documents() {
        assert!(parse_feed("<html><body>nope</body></html>").is_err());
        assert!(parse_feed("<rss><channel><item><title>x</title></channel></rss>").is_err());
    }

    #[test]
    fn media_elements_do_not_shadow_item_fields() {
        let xml = r#"<?xml version="1.0"?>
<rss version="2.0" xmlns:media="http://search.yahoo.com/mrss/">
  <channel>
    <item>
      <media:title>Thumbnail caption</media:title>
      <media:description>Photo credit: agency</media:description>
      <title>Grid battery storage hits record</title>
      <link>https://example.com/grid</link>
      <media:content url="https://example.com/a.jpg" medium="image">
        <media:description>Inner caption</media:description>
      </media:content>
      <description>Utilities installed more storage than ever.</description>
    </item>
  </channel>
</rss>"#;
        let entries = parse_feed(xml).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].title, "Grid battery storage hits record");
        assert_eq!(entries[0].description, "Utilities installed more storage than ever.");
    }
}

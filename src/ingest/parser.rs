// src/ingest/parser.rs
//! Tolerant RSS/Atom parsing.
//!
//! Reads `<item>` (RSS 0.9x/1.0/2.0) and `<entry>` (Atom) elements with a
//! streaming reader. An XML error stops the read but keeps every entry
//! completed before it; the feed is then flagged malformed.

use std::borrow::Cow;
use std::time::Instant;

use encoding_rs::{Encoding, UTF_8};
use metrics::{counter, histogram};
use once_cell::sync::OnceCell;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use regex::bytes::Regex;
use tracing::warn;

use crate::ingest::dates;
use crate::ingest::types::RawEntry;

/// Parser output. `entries` may be non-empty even when `malformed` is set.
#[derive(Debug, Clone, Default)]
pub struct ParsedFeed {
    pub entries: Vec<RawEntry>,
    pub malformed: bool,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Title,
    Link,
    Guid { permalink: bool },
    Published,
    Updated,
    Summary,
    Description,
    Content,
}

fn field_for(name: &[u8]) -> Option<Field> {
    Some(match name {
        b"title" => Field::Title,
        b"link" => Field::Link,
        b"pubDate" | b"published" | b"issued" | b"date" => Field::Published,
        b"updated" | b"modified" => Field::Updated,
        b"summary" => Field::Summary,
        b"description" => Field::Description,
        b"content" | b"encoded" => Field::Content,
        _ => return None,
    })
}

fn attr(e: &BytesStart<'_>, key: &[u8]) -> Option<String> {
    e.attributes()
        .flatten()
        .find(|a| a.key.local_name().as_ref() == key)
        .map(|a| decode(&a.value))
}

/// Entity-decode raw bytes. HTML entities such as `&nbsp;` are common in
/// feeds and are not XML, so decoding goes through the HTML table.
fn decode(raw: &[u8]) -> String {
    let s = String::from_utf8_lossy(raw);
    html_escape::decode_html_entities(&s).into_owned()
}

/// Charset for the document: byte-order mark first, then the XML
/// declaration's `encoding`, then UTF-8.
fn document_encoding(bytes: &[u8]) -> &'static Encoding {
    static DECL: OnceCell<Regex> = OnceCell::new();
    if let Some((enc, _)) = Encoding::for_bom(bytes) {
        return enc;
    }
    let re = DECL.get_or_init(|| {
        Regex::new(r#"^\s*<\?xml[^>]*?encoding\s*=\s*["']([A-Za-z0-9._:-]+)["']"#)
            .expect("xml declaration regex")
    });
    let head = &bytes[..bytes.len().min(256)];
    re.captures(head)
        .and_then(|c| c.get(1))
        .and_then(|m| Encoding::for_label(m.as_bytes()))
        // A readable declaration means an ASCII-compatible document, so a
        // "UTF-16" label there is wrong; output_encoding maps it to UTF-8.
        .map(Encoding::output_encoding)
        .unwrap_or(UTF_8)
}

/// Decode the whole document to UTF-8 text.
fn decode_document(bytes: &[u8]) -> Cow<'_, str> {
    let declared = document_encoding(bytes);
    let (text, used, had_errors) = declared.decode(bytes);
    if had_errors {
        warn!(target: "ingest", encoding = used.name(), "feed bytes did not decode cleanly");
    }
    text
}

/// Open entry plus the child element whose text is being collected.
struct EntryState {
    entry: RawEntry,
    depth: usize,
    capture: Option<(Field, usize, String)>,
}

impl EntryState {
    fn new(depth: usize) -> Self {
        Self {
            entry: RawEntry::default(),
            depth,
            capture: None,
        }
    }

    /// Atom-style `<link href=".." rel=".."/>`.
    fn link_element(&mut self, e: &BytesStart<'_>) -> bool {
        let Some(href) = attr(e, b"href").map(|h| h.trim().to_string()) else {
            return false;
        };
        if href.is_empty() {
            return true;
        }
        let rel = attr(e, b"rel").unwrap_or_default();
        if (rel.is_empty() || rel == "alternate") && self.entry.link.is_none() {
            self.entry.link = Some(href);
        } else {
            self.entry.alternate_links.push(href);
        }
        true
    }

    fn finish_capture(&mut self, field: Field, text: String) {
        let text = text.trim().to_string();
        if text.is_empty() {
            return;
        }
        let e = &mut self.entry;
        match field {
            Field::Title => {
                e.title.get_or_insert(text);
            }
            Field::Link => {
                if e.link.is_none() {
                    e.link = Some(text);
                } else {
                    e.alternate_links.push(text);
                }
            }
            Field::Guid { permalink } => {
                if permalink && text.starts_with("http") {
                    e.alternate_links.push(text);
                }
            }
            Field::Published => {
                e.published.get_or_insert(text);
            }
            Field::Updated => {
                e.updated.get_or_insert(text);
            }
            Field::Summary => {
                e.summary.get_or_insert(text);
            }
            Field::Description => {
                e.description.get_or_insert(text);
            }
            Field::Content => e.content.push(text),
        }
    }

    fn into_entry(mut self) -> RawEntry {
        self.entry.published_parsed = self.entry.published.as_deref().and_then(dates::parse_datetime);
        self.entry.updated_parsed = self.entry.updated.as_deref().and_then(dates::parse_datetime);
        self.entry
    }
}

/// Parse feed bytes, keeping at most `max_entries` entries.
pub fn parse_feed(bytes: &[u8], max_entries: usize) -> ParsedFeed {
    let t0 = Instant::now();
    let text = decode_document(bytes);
    let text = text.trim_start_matches('\u{feff}');

    let mut reader = Reader::from_str(text);
    reader.config_mut().trim_text(false);

    let mut out = ParsedFeed::default();
    let mut depth = 0usize;
    let mut open: Option<EntryState> = None;

    loop {
        if out.entries.len() >= max_entries {
            break;
        }
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                depth += 1;
                let name = e.local_name();
                let name = name.as_ref();
                match open.as_mut() {
                    None => {
                        if name == b"item" || name == b"entry" {
                            open = Some(EntryState::new(depth));
                        }
                    }
                    Some(st) if st.capture.is_none() && depth == st.depth + 1 => {
                        if name == b"link" && st.link_element(&e) {
                            // <link href=".."></link>: nothing left to collect
                        } else if name == b"guid" || name == b"id" {
                            let permalink = name == b"guid"
                                && !attr(&e, b"isPermaLink")
                                    .is_some_and(|v| v.eq_ignore_ascii_case("false"));
                            st.capture = Some((Field::Guid { permalink }, depth, String::new()));
                        } else if let Some(field) = field_for(name) {
                            st.capture = Some((field, depth, String::new()));
                        }
                    }
                    _ => {}
                }
            }
            Ok(Event::Empty(e)) => {
                if let Some(st) = open.as_mut() {
                    if st.capture.is_none() && e.local_name().as_ref() == b"link" {
                        st.link_element(&e);
                    }
                }
            }
            Ok(Event::End(_)) => {
                if let Some(st) = open.as_mut() {
                    if let Some((field, cap_depth, _)) = &st.capture {
                        if *cap_depth == depth {
                            let field = *field;
                            if let Some((_, _, text)) = st.capture.take() {
                                st.finish_capture(field, text);
                            }
                        }
                    }
                    if st.depth == depth {
                        if let Some(done) = open.take() {
                            out.entries.push(done.into_entry());
                        }
                    }
                }
                depth = depth.saturating_sub(1);
            }
            Ok(Event::Text(t)) => {
                if let Some((_, _, buf)) = open.as_mut().and_then(|st| st.capture.as_mut()) {
                    buf.push_str(&decode(&t));
                }
            }
            Ok(Event::CData(c)) => {
                if let Some((_, _, buf)) = open.as_mut().and_then(|st| st.capture.as_mut()) {
                    buf.push_str(&String::from_utf8_lossy(&c));
                }
            }
            Ok(Event::Eof) => {
                if open.is_some() {
                    out.malformed = true;
                    out.error = Some("document ended inside an unterminated entry".to_string());
                }
                break;
            }
            Ok(_) => {}
            Err(e) => {
                out.malformed = true;
                out.error = Some(format!("{e} (at byte {})", reader.buffer_position()));
                break;
            }
        }
    }

    let ms = t0.elapsed().as_secs_f64() * 1_000.0;
    histogram!("ingest_parse_ms").record(ms);
    counter!("ingest_entries_total").increment(out.entries.len() as u64);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const RSS: &str = r#"<?xml version="1.0"?>
<rss version="2.0" xmlns:content="http://purl.org/rss/1.0/modules/content/">
  <channel>
    <title>Feed</title>
    <link>https://example.com/</link>
    <item>
      <title>First &amp; foremost</title>
      <link>https://example.com/a</link>
      <pubDate>Tue, 04 Jun 2024 10:00:00 GMT</pubDate>
      <description><![CDATA[<p>Solar <b>news</b></p>]]></description>
      <content:encoded>&lt;p&gt;Full body&lt;/p&gt;</content:encoded>
    </item>
    <item>
      <title>Second</title>
      <guid isPermaLink="true">https://example.com/b</guid>
    </item>
  </channel>
</rss>"#;

    #[test]
    fn rss_items_are_extracted() {
        let feed = parse_feed(RSS.as_bytes(), 300);
        assert!(!feed.malformed);
        assert_eq!(feed.entries.len(), 2);
        let a = &feed.entries[0];
        assert_eq!(a.title.as_deref(), Some("First & foremost"));
        assert_eq!(a.link.as_deref(), Some("https://example.com/a"));
        assert_eq!(a.description.as_deref(), Some("<p>Solar <b>news</b></p>"));
        assert_eq!(a.content, vec!["<p>Full body</p>".to_string()]);
        assert!(a.published_parsed.is_some());
        let b = &feed.entries[1];
        assert_eq!(b.link, None);
        assert_eq!(b.alternate_links, vec!["https://example.com/b".to_string()]);
    }

    #[test]
    fn atom_links_and_dates() {
        let atom = r#"<feed xmlns="http://www.w3.org/2005/Atom">
  <entry>
    <title type="html">Alert &lt;b&gt;hit&lt;/b&gt;</title>
    <link rel="self" href="https://example.com/self"/>
    <link href="https://www.google.com/url?q=https://example.org/x&amp;sa=D"/>
    <updated>2024-06-04T10:00:00Z</updated>
    <content type="html">Body</content>
  </entry>
</feed>"#;
        let feed = parse_feed(atom.as_bytes(), 300);
        assert_eq!(feed.entries.len(), 1);
        let e = &feed.entries[0];
        assert_eq!(
            e.link.as_deref(),
            Some("https://www.google.com/url?q=https://example.org/x&sa=D")
        );
        assert_eq!(e.alternate_links, vec!["https://example.com/self".to_string()]);
        assert_eq!(e.updated.as_deref(), Some("2024-06-04T10:00:00Z"));
        assert_eq!(e.published, None);
        assert_eq!(e.title.as_deref(), Some("Alert <b>hit</b>"));
    }

    #[test]
    fn broken_tail_keeps_completed_entries() {
        let xml = "<rss><channel><item><title>ok</title><link>https://e.com/1</link></item>\
                   <item><title>bad</b></item></channel></rss>";
        let feed = parse_feed(xml.as_bytes(), 300);
        assert!(feed.malformed);
        assert!(feed.error.is_some());
        assert_eq!(feed.entries.len(), 1);
        assert_eq!(feed.entries[0].title.as_deref(), Some("ok"));
    }

    #[test]
    fn max_entries_caps_output() {
        let mut xml = String::from("<rss><channel>");
        for i in 0..10 {
            xml.push_str(&format!("<item><title>t{i}</title></item>"));
        }
        xml.push_str("</channel></rss>");
        let feed = parse_feed(xml.as_bytes(), 3);
        assert_eq!(feed.entries.len(), 3);
    }

    #[test]
    fn declared_latin1_is_decoded() {
        let mut xml = b"<?xml version=\"1.0\" encoding=\"ISO-8859-1\"?>\n<rss><channel><item><title>".to_vec();
        xml.extend_from_slice(b"Caf\xe9 \xe9nergie");
        xml.extend_from_slice(b"</title><link>https://e.com/1</link></item></channel></rss>");
        let feed = parse_feed(&xml, 300);
        assert!(!feed.malformed);
        assert_eq!(feed.entries[0].title.as_deref(), Some("Caf\u{e9} \u{e9}nergie"));
    }

    #[test]
    fn undeclared_defaults_to_utf8() {
        assert_eq!(document_encoding(b"<rss/>"), UTF_8);
        assert_eq!(document_encoding("\u{feff}<rss/>".as_bytes()), UTF_8);
        assert_eq!(
            document_encoding(b"<?xml version='1.0' encoding='windows-1252'?><rss/>"),
            encoding_rs::WINDOWS_1252
        );
    }

    #[test]
    fn wrong_weekday_date_still_parses() {
        let xml = "<rss><channel><item><title>t</title>\
                   <pubDate>Mon, 04 Jun 2024 10:00:00 GMT</pubDate>\
                   <updated>Updated: soon</updated></item></channel></rss>";
        let feed = parse_feed(xml.as_bytes(), 300);
        let e = &feed.entries[0];
        assert_eq!(
            e.published_parsed.map(|dt| dt.date()),
            chrono::NaiveDate::from_ymd_opt(2024, 6, 4)
        );
        assert_eq!(e.updated_parsed, None);
    }

    #[test]
    fn html_page_has_no_entries() {
        let feed = parse_feed(b"<html><body><p>Not a feed</p></body></html>", 300);
        assert!(feed.entries.is_empty());
    }
}

//! RSS 2.0 / RSS 1.0 / Atom connector, streamed with `quick_xml::Reader`.
//! Only direct children of an `<item>` or `<entry>` are read, so a nested
//! `<source><title>` never replaces the item's own title.

use std::borrow::Cow;

use chrono::{DateTime, Utc};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use tracing::warn;

use super::dates;
use crate::cancel::Cancellation;
use crate::error::SourceError;
use crate::fetch::HttpFetch;
use crate::ingest::normalize::{domain_of, normalize_text};
use crate::models::IntermediateItem;

const FEED_MARKERS: &[&str] = &["<rss", "<feed", "<rdf:RDF", "<channel"];

/// Child elements read from an item block. Anything else is skipped.
const FIELDS: &[&str] = &[
    "title",
    "link",
    "description",
    "summary",
    "content:encoded",
    "content",
    "pubDate",
    "published",
    "updated",
    "dc:date",
];

const EXCERPT_FIELDS: &[&str] = &["description", "summary", "content:encoded", "content"];

pub async fn fetch(
    url: &str,
    category: &str,
    fetcher: &dyn HttpFetch,
    cancel: &Cancellation,
) -> Result<Vec<IntermediateItem>, SourceError> {
    let body = fetcher.get(url, cancel).await?;
    parse_feed(&String::from_utf8_lossy(&body), category, Utc::now())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BlockKind {
    Item,
    Entry,
}

/// Raw field text of one `<item>`/`<entry>` while it is being read.
#[derive(Debug, Default)]
struct Block {
    fields: Vec<(&'static str, String)>,
    alternate_href: Option<String>,
    other_href: Option<String>,
}

impl Block {
    /// First non-blank occurrence wins.
    fn field(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .filter(|(n, _)| *n == name)
            .map(|(_, v)| v.as_str())
            .find(|v| !v.trim().is_empty())
    }

    fn link_attrs(&mut self, e: &BytesStart<'_>) {
        let mut href = None;
        let mut rel = None;
        for attr in e.attributes().flatten() {
            let value = attr
                .unescape_value()
                .map(Cow::into_owned)
                .unwrap_or_else(|_| decode_lossy(&attr.value));
            match attr.key.as_ref() {
                b"href" => href = Some(value),
                b"rel" => rel = Some(value),
                _ => {}
            }
        }
        let Some(href) = href.map(|h| h.trim().to_string()).filter(|h| !h.is_empty()) else {
            return;
        };
        match rel.as_deref().map(str::trim) {
            None | Some("") | Some("alternate") => {
                self.alternate_href.get_or_insert(href);
            }
            Some(_) => {
                self.other_href.get_or_insert(href);
            }
        }
    }
}

/// Parse an RSS or Atom document. `<item>` blocks win; `<entry>` blocks are
/// the fallback. Items without a title or link are dropped.
///
/// Malformed markup ends the scan: blocks completed before the error are
/// kept, and a document with none is a format error.
pub fn parse_feed(
    body: &str,
    category: &str,
    now: DateTime<Utc>,
) -> Result<Vec<IntermediateItem>, SourceError> {
    if !FEED_MARKERS.iter().any(|m| body.contains(m)) {
        return Err(SourceError::format("rss/atom", "no feed root element"));
    }

    let mut reader = Reader::from_str(body);
    let mut items = Vec::new();
    let mut entries = Vec::new();

    let mut depth = 0usize;
    // (kind, depth of the block element, fields so far)
    let mut open: Option<(BlockKind, usize, Block)> = None;
    // (field name, buffered text)
    let mut field: Option<(&'static str, String)> = None;

    loop {
        let event = match reader.read_event() {
            Ok(ev) => ev,
            Err(e) => {
                let pos = reader.error_position();
                if items.is_empty() && entries.is_empty() {
                    return Err(SourceError::format(
                        "rss/atom",
                        format!("malformed xml at byte {pos}: {e}"),
                    ));
                }
                warn!(position = pos, error = %e, "feed truncated at malformed xml");
                break;
            }
        };

        match event {
            Event::Start(e) => {
                depth += 1;
                if open.is_none() {
                    if let Some(kind) = block_kind(e.name().as_ref()) {
                        open = Some((kind, depth, Block::default()));
                    }
                } else if let Some((_, block_depth, block)) = open.as_mut() {
                    if depth == *block_depth + 1 {
                        if let Some(name) = field_name(e.name().as_ref()) {
                            if name == "link" {
                                block.link_attrs(&e);
                            }
                            field = Some((name, String::new()));
                        }
                    }
                }
            }
            Event::Empty(e) => {
                if let Some((_, block_depth, block)) = open.as_mut() {
                    if depth == *block_depth && e.name().as_ref() == b"link" {
                        block.link_attrs(&e);
                    }
                }
            }
            Event::Text(t) => {
                if let Some((_, buf)) = field.as_mut() {
                    match t.unescape() {
                        Ok(s) => buf.push_str(&s),
                        Err(_) => buf.push_str(&decode_lossy(&t)),
                    }
                }
            }
            Event::CData(c) => {
                if let Some((_, buf)) = field.as_mut() {
                    buf.push_str(&String::from_utf8_lossy(&c));
                }
            }
            Event::End(_) => {
                let closes_block = matches!(&open, Some((_, block_depth, _)) if depth == *block_depth);
                if closes_block {
                    if let Some((kind, _, block)) = open.take() {
                        if let Some(item) = build_item(block, category, now) {
                            match kind {
                                BlockKind::Item => items.push(item),
                                BlockKind::Entry => entries.push(item),
                            }
                        }
                    }
                } else if let Some((_, block_depth, block)) = open.as_mut() {
                    if depth == *block_depth + 1 {
                        if let Some((name, text)) = field.take() {
                            block.fields.push((name, text));
                        }
                    }
                }
                depth = depth.saturating_sub(1);
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if items.is_empty() {
        Ok(entries)
    } else {
        Ok(items)
    }
}

fn block_kind(name: &[u8]) -> Option<BlockKind> {
    match name {
        b"item" => Some(BlockKind::Item),
        b"entry" => Some(BlockKind::Entry),
        _ => None,
    }
}

fn field_name(name: &[u8]) -> Option<&'static str> {
    FIELDS.iter().copied().find(|f| f.as_bytes() == name)
}

/// Text that is not well-formed XML escaping (`&nbsp;` and friends).
fn decode_lossy(raw: &[u8]) -> String {
    html_escape::decode_html_entities(&String::from_utf8_lossy(raw)).into_owned()
}

fn build_item(block: Block, category: &str, now: DateTime<Utc>) -> Option<IntermediateItem> {
    let title = block.field("title").map(normalize_text).unwrap_or_default();
    let url = block
        .field("link")
        .map(|l| l.trim().to_string())
        .or_else(|| block.alternate_href.clone())
        .or_else(|| block.other_href.clone())
        .unwrap_or_default();
    if title.is_empty() || url.is_empty() {
        return None;
    }

    let excerpt = EXCERPT_FIELDS
        .iter()
        .find_map(|f| block.field(f).map(normalize_text).filter(|s| !s.is_empty()));

    Some(IntermediateItem {
        domain: domain_of(&url),
        published_at: published(&block).unwrap_or(now),
        title,
        url,
        excerpt,
        category: category.to_string(),
        points: None,
        comments: None,
        rank: None,
        tags: Vec::new(),
    })
}

fn published(block: &Block) -> Option<DateTime<Utc>> {
    if let Some(raw) = block.field("pubDate") {
        let raw = raw.trim();
        if let Some(d) = dates::parse_rfc2822(raw).or_else(|| dates::parse_flexible(raw)) {
            return Some(d);
        }
    }
    ["published", "updated", "dc:date"].iter().find_map(|f| {
        let raw = block.field(f)?.trim();
        dates::parse_rfc3339(raw).or_else(|| dates::parse_flexible(raw))
    })
}

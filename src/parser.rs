//! Normalizes RSS, Atom and proxy JSON payloads into [`ArticleRecord`]s.

use feed_rs::model::{Entry, Link};
use feed_rs::parser::{self, ParseErrorKind, ParseFeedError};
use quick_xml::events::Event;
use quick_xml::Reader;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::activity::parse_timestamp;
use crate::error::ParseError;
use crate::model::{ArticleRecord, FeedPayload, FeedStatus, ParsedFeed};

const UTF8_BOM: &[u8] = &[0xEF, 0xBB, 0xBF];

/// Parses one payload, keeping document order and at most `limit` records.
///
/// Items are not re-sorted: feeds are expected to list newest first.
pub fn parse_payload(payload: &FeedPayload, limit: usize) -> Result<ParsedFeed, ParseError> {
    match payload {
        FeedPayload::Xml(bytes) => parse_xml(bytes, limit),
        FeedPayload::ProxyJson(value) => parse_proxy(value, limit),
    }
}

/// RSS 2.0 `<item>` and Atom `<entry>` documents.
///
/// Dates go through [`parse_timestamp`], the same as proxy dates.
pub fn parse_xml(bytes: &[u8], limit: usize) -> Result<ParsedFeed, ParseError> {
    check_well_formed(bytes)?;

    let feed = parser::Builder::new()
        .timestamp_parser(parse_timestamp)
        .build()
        .parse(bytes)
        .map_err(|e| match e {
            ParseFeedError::ParseError(ParseErrorKind::NoFeedRoot) => ParseError::NotAFeed,
            other => ParseError::Feed(other),
        })?;
    let total = feed.entries.len();
    debug!("Parsed XML feed with {} entries", total);

    let articles = feed
        .entries
        .into_iter()
        .take(limit)
        .map(article_from_entry)
        .collect();

    Ok(ParsedFeed {
        status: if total == 0 {
            FeedStatus::Empty
        } else {
            FeedStatus::Ok
        },
        title: feed.title.map(|t| t.content.trim().to_string()),
        total_items: total,
        articles,
    })
}

/// Strict pass over the document before handing it to feed-rs, which is
/// lenient about trailing content and undefined entities.
///
/// Requires a single root element, every element closed, and only the
/// predefined or numeric entities unless a DOCTYPE may declare others.
fn check_well_formed(bytes: &[u8]) -> Result<(), ParseError> {
    let bytes = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes);
    let mut reader = Reader::from_reader(bytes);
    let mut depth = 0usize;
    let mut roots = 0usize;
    let mut has_doctype = false;

    loop {
        let event = reader.read_event().map_err(|e| {
            ParseError::Xml(format!("{} at byte {}", e, reader.buffer_position()))
        })?;

        match event {
            Event::Start(ref start) | Event::Empty(ref start) => {
                if depth == 0 {
                    roots += 1;
                    if roots > 1 {
                        return Err(ParseError::Xml(
                            "element found after the root element".to_string(),
                        ));
                    }
                }
                for attr in start.attributes() {
                    let attr = attr.map_err(|e| ParseError::Xml(e.to_string()))?;
                    if !has_doctype {
                        attr.unescape_value()
                            .map_err(|e| ParseError::Xml(e.to_string()))?;
                    }
                }
                if matches!(event, Event::Start(_)) {
                    depth += 1;
                }
            }
            Event::End(_) => {
                depth = depth.checked_sub(1).ok_or_else(|| {
                    ParseError::Xml("closing tag without an opening tag".to_string())
                })?;
            }
            Event::Text(text) => {
                if depth == 0 {
                    if !text.iter().all(|b| b.is_ascii_whitespace()) {
                        return Err(ParseError::Xml(
                            "text outside the root element".to_string(),
                        ));
                    }
                } else if !has_doctype {
                    text.unescape().map_err(|e| ParseError::Xml(e.to_string()))?;
                }
            }
            Event::CData(_) if depth == 0 => {
                return Err(ParseError::Xml(
                    "CDATA outside the root element".to_string(),
                ));
            }
            Event::DocType(_) => has_doctype = true,
            Event::Eof => break,
            _ => {}
        }
    }

    if depth > 0 {
        return Err(ParseError::Xml(format!(
            "{} element(s) still open at end of document",
            depth
        )));
    }
    if roots == 0 {
        return Err(ParseError::Xml("no root element".to_string()));
    }
    Ok(())
}

fn article_from_entry(entry: Entry) -> ArticleRecord {
    let link = pick_link(&entry.links).map(|l| l.href.clone());
    let description = entry
        .summary
        .map(|s| s.content)
        .or_else(|| entry.content.and_then(|c| c.body));

    ArticleRecord::from_parts(
        entry.title.map(|t| t.content),
        link,
        entry.published.or(entry.updated),
        description,
    )
}

/// Prefers the alternate (article) link over comment or self links.
fn pick_link(links: &[Link]) -> Option<&Link> {
    links
        .iter()
        .find(|l| {
            l.rel
                .as_deref()
                .map(|rel| rel.eq_ignore_ascii_case("alternate"))
                .unwrap_or(true)
        })
        .or_else(|| links.first())
}

#[derive(Debug, Deserialize)]
struct ProxyResponse {
    status: Option<String>,
    message: Option<String>,
    feed: Option<Value>,
    /// Kept untyped so one odd item field does not sink the whole feed.
    items: Option<Vec<Value>>,
}

/// String value of `key`; numbers are stringified, anything else is absent.
fn text_field(item: &Value, key: &str) -> Option<String> {
    match item.get(key)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// JSON produced by the feed-to-JSON proxy: `{ "items": [...] }`.
///
/// A missing `items` array means the proxy failed upstream; that yields
/// [`FeedStatus::Unavailable`] rather than an error.
pub fn parse_proxy(value: &Value, limit: usize) -> Result<ParsedFeed, ParseError> {
    if !value.is_object() {
        return Err(ParseError::Proxy(serde::de::Error::custom(
            "expected a JSON object",
        )));
    }
    let response: ProxyResponse =
        serde_json::from_value(value.clone()).map_err(ParseError::Proxy)?;
    let title = response.feed.as_ref().and_then(|f| text_field(f, "title"));

    let Some(items) = response.items else {
        let reason = response
            .message
            .or(response.status.filter(|s| s != "ok"));
        return Ok(ParsedFeed {
            status: FeedStatus::Unavailable { reason },
            title,
            total_items: 0,
            articles: Vec::new(),
        });
    };

    let total = items.len();
    let articles = items
        .iter()
        .take(limit)
        .map(|item| {
            let published = text_field(item, "pubDate")
                .as_deref()
                .and_then(parse_timestamp);
            ArticleRecord::from_parts(
                text_field(item, "title"),
                text_field(item, "link"),
                published,
                text_field(item, "description"),
            )
        })
        .collect();

    Ok(ParsedFeed {
        status: if total == 0 {
            FeedStatus::Empty
        } else {
            FeedStatus::Ok
        },
        title,
        total_items: total,
        articles,
    })
}

// 🏗️ Feed Parsers - Raw items from saved feed files
//
// Fetching is somebody else's job; what arrives here is a saved feed:
// - JSON dump (array of entries, shapes vary per revision of the exporter)
// - Atom / RSS XML as produced by a feed bridge
//
// Every text field is optional and may have an unexpected shape.
// Nothing in this module panics on bad input.

use crate::deduplication::item_fingerprint;
use crate::error::ItemError;
use crate::normalize::normalize_fragments;
use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs;
use std::path::Path;
use std::sync::OnceLock;
use tracing::{debug, warn};

// ============================================================================
// CORE TYPES
// ============================================================================

/// RawItem - one notice as supplied by the feed, before any interpretation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawItem {
    // Text fields (any subset may be absent or oddly shaped)
    pub title: Value,
    pub summary: Value,
    pub description: Value,

    /// String, `{"value": ...}`, or a list of either
    pub content: Value,

    /// Publication date-time as published by the feed
    pub published: Value,

    /// Stream-assigned id (numeric, numeric string, or URL)
    pub id: Value,

    pub link: Value,
}

/// PreparedItem - normalized text + resolved ordering keys
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedItem {
    pub published: DateTime<Utc>,
    pub sequence: Option<u64>,
    pub text: String,
    pub fingerprint: String,
}

impl RawItem {
    /// Convenience constructor for plain text items
    pub fn from_text(text: &str, published: &str) -> Self {
        RawItem {
            title: Value::String(text.to_string()),
            published: Value::String(published.to_string()),
            ..RawItem::default()
        }
    }

    /// Builder pattern: add stream id
    pub fn with_id(mut self, id: u64) -> Self {
        self.id = Value::from(id);
        self
    }

    /// Builder pattern: add link
    pub fn with_link(mut self, link: &str) -> Self {
        self.link = Value::String(link.to_string());
        self
    }

    /// All text of the item, normalized. Never fails.
    pub fn full_text(&self) -> String {
        let mut parts: Vec<&str> = Vec::new();

        for field in [&self.title, &self.summary, &self.description] {
            if let Value::String(s) = field {
                parts.push(s);
            }
        }

        match &self.content {
            Value::Array(entries) => {
                for entry in entries {
                    if let Some(text) = content_value(entry) {
                        parts.push(text);
                    }
                }
            }
            other => {
                if let Some(text) = content_value(other) {
                    parts.push(text);
                }
            }
        }

        normalize_fragments(parts)
    }

    /// Raw publication string, if the field is a string at all
    pub fn published_str(&self) -> Option<&str> {
        self.published.as_str().map(str::trim).filter(|s| !s.is_empty())
    }

    /// Monotonic stream sequence number.
    ///
    /// Order of preference:
    /// 1. numeric `id` (or an id string made of digits)
    /// 2. trailing number of `link` (e.g. "https://t.me/channel/1234")
    /// 3. trailing number of a URL-shaped `id`
    pub fn sequence(&self) -> Option<u64> {
        match &self.id {
            Value::Number(n) => {
                if let Some(seq) = n.as_u64() {
                    return Some(seq);
                }
            }
            Value::String(s) => {
                if let Ok(seq) = s.trim().parse::<u64>() {
                    return Some(seq);
                }
            }
            _ => {}
        }

        self.link
            .as_str()
            .and_then(trailing_number)
            .or_else(|| self.id.as_str().and_then(trailing_number))
    }

    /// Normalize text and resolve ordering keys.
    ///
    /// Fails only on the publication timestamp: an item that cannot be placed
    /// in time must be skipped.
    pub fn prepare(&self, assume_utc_for_naive: bool) -> Result<PreparedItem, ItemError> {
        let published_raw = self.published_str().ok_or(ItemError::MissingTimestamp)?;
        let published = parse_published(published_raw, assume_utc_for_naive)?;
        let text = self.full_text();
        let fingerprint = item_fingerprint(published_raw, &text);

        Ok(PreparedItem {
            published,
            sequence: self.sequence(),
            text,
            fingerprint,
        })
    }
}

fn content_value(value: &Value) -> Option<&str> {
    match value {
        Value::String(s) => Some(s),
        Value::Object(map) => map.get("value").and_then(Value::as_str),
        _ => None,
    }
}

fn re_trailing_number() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(\d+)/?(?:[?#].*)?$").expect("trailing number regex"))
}

fn trailing_number(s: &str) -> Option<u64> {
    re_trailing_number()
        .captures(s.trim())
        .and_then(|caps| caps[1].parse().ok())
}

// ============================================================================
// TIMESTAMPS
// ============================================================================

/// Parse a feed publication timestamp into UTC.
///
/// Accepted, in order: RFC 3339, RFC 2822, a few offset-carrying variants,
/// then offset-less variants (UTC assumed only if `assume_utc_for_naive`).
pub fn parse_published(raw: &str, assume_utc_for_naive: bool) -> Result<DateTime<Utc>, ItemError> {
    let raw = raw.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(dt.with_timezone(&Utc));
    }

    if let Ok(dt) = DateTime::parse_from_rfc2822(raw) {
        return Ok(dt.with_timezone(&Utc));
    }

    const OFFSET_FORMATS: &[&str] = &[
        "%Y-%m-%d %H:%M:%S%:z",
        "%Y-%m-%d %H:%M:%S%z",
        "%Y-%m-%dT%H:%M:%S%z",
        "%Y-%m-%d %H:%M:%S %z",
    ];
    for format in OFFSET_FORMATS {
        if let Ok(dt) = DateTime::parse_from_str(raw, format) {
            return Ok(dt.with_timezone(&Utc));
        }
    }

    const NAIVE_FORMATS: &[&str] = &[
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%dT%H:%M",
        "%Y-%m-%d %H:%M",
    ];
    let naive = NAIVE_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        });

    match naive {
        Some(dt) if assume_utc_for_naive => Ok(dt.and_utc()),
        Some(_) => Err(ItemError::NaiveTimestamp(raw.to_string())),
        None => Err(ItemError::UnparseableTimestamp(raw.to_string())),
    }
}

// ============================================================================
// FEED PARSERS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedFormat {
    /// JSON dump of feed entries
    Json,

    /// Atom or RSS document
    Xml,
}

/// FeedParser - turns a saved feed into raw items
pub trait FeedParser {
    fn parse_str(&self, content: &str) -> Result<Vec<RawItem>>;

    fn format(&self) -> FeedFormat;
}

/// Detect feed format from file extension, falling back to the first
/// non-blank character of the content
pub fn detect_format(path: &Path, content: &str) -> FeedFormat {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase();

    match extension.as_str() {
        "json" => FeedFormat::Json,
        "xml" | "atom" | "rss" => FeedFormat::Xml,
        _ => match content.trim_start().chars().next() {
            Some('<') => FeedFormat::Xml,
            _ => FeedFormat::Json,
        },
    }
}

/// Factory: parser for a format
pub fn get_parser(format: FeedFormat) -> Box<dyn FeedParser> {
    match format {
        FeedFormat::Json => Box::new(JsonFeedParser),
        FeedFormat::Xml => Box::new(XmlFeedParser),
    }
}

/// Read and parse one saved feed file
pub fn read_feed_file(path: &Path) -> Result<Vec<RawItem>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read feed file: {}", path.display()))?;

    let parser = get_parser(detect_format(path, &content));
    parser
        .parse_str(&content)
        .with_context(|| format!("Failed to parse feed file: {}", path.display()))
}

// ----------------------------------------------------------------------------
// JSON
// ----------------------------------------------------------------------------

/// Accepts a bare array of entries, or an object holding one under
/// `entries` / `items`
pub struct JsonFeedParser;

impl FeedParser for JsonFeedParser {
    fn parse_str(&self, content: &str) -> Result<Vec<RawItem>> {
        let root: Value = serde_json::from_str(content).context("Failed to parse feed JSON")?;

        let entries = match root {
            Value::Array(entries) => entries,
            Value::Object(mut map) => match map.remove("entries").or_else(|| map.remove("items")) {
                Some(Value::Array(entries)) => entries,
                _ => Vec::new(),
            },
            _ => Vec::new(),
        };

        let mut items = Vec::with_capacity(entries.len());
        for (index, entry) in entries.into_iter().enumerate() {
            if !entry.is_object() {
                warn!(index, "skipping feed entry that is not an object");
                continue;
            }
            match serde_json::from_value::<RawItem>(entry) {
                Ok(item) => items.push(item),
                Err(e) => warn!(index, error = %e, "skipping malformed feed entry"),
            }
        }

        Ok(items)
    }

    fn format(&self) -> FeedFormat {
        FeedFormat::Json
    }
}

// ----------------------------------------------------------------------------
// XML (Atom / RSS)
// ----------------------------------------------------------------------------

/// Atom `<entry>` and RSS `<item>` elements
pub struct XmlFeedParser;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum XmlField {
    Title,
    Summary,
    Description,
    Content,
    Published,
    Updated,
    Id,
    Link,
}

impl XmlField {
    fn from_local_name(name: &str) -> Option<Self> {
        match name {
            "title" => Some(XmlField::Title),
            "summary" => Some(XmlField::Summary),
            "description" => Some(XmlField::Description),
            "content" | "encoded" => Some(XmlField::Content),
            "published" | "pubDate" | "date" => Some(XmlField::Published),
            "updated" => Some(XmlField::Updated),
            "id" | "guid" => Some(XmlField::Id),
            "link" => Some(XmlField::Link),
            _ => None,
        }
    }
}

fn local_name(element: &BytesStart<'_>) -> String {
    String::from_utf8_lossy(element.local_name().as_ref()).into_owned()
}

fn href_of(element: &BytesStart<'_>) -> Option<String> {
    let attr = element.try_get_attribute("href").ok().flatten()?;
    attr.unescape_value().ok().map(|v| v.into_owned())
}

fn set_if_empty(slot: &mut Value, text: String) {
    if slot.is_null() && !text.trim().is_empty() {
        *slot = Value::String(text.trim().to_string());
    }
}

impl XmlFeedParser {
    fn assign(item: &mut RawItem, field: XmlField, text: String) {
        match field {
            XmlField::Title => set_if_empty(&mut item.title, text),
            XmlField::Summary => set_if_empty(&mut item.summary, text),
            XmlField::Description => set_if_empty(&mut item.description, text),
            XmlField::Content => set_if_empty(&mut item.content, text),
            XmlField::Published => {
                // <published> beats an earlier <updated>
                if !text.trim().is_empty() {
                    item.published = Value::String(text.trim().to_string());
                }
            }
            XmlField::Updated => set_if_empty(&mut item.published, text),
            XmlField::Id => set_if_empty(&mut item.id, text),
            XmlField::Link => set_if_empty(&mut item.link, text),
        }
    }
}

impl FeedParser for XmlFeedParser {
    fn parse_str(&self, content: &str) -> Result<Vec<RawItem>> {
        let mut reader = Reader::from_str(content);
        reader.config_mut().trim_text(true);

        let mut items = Vec::new();
        let mut current: Option<RawItem> = None;
        let mut field: Option<(XmlField, String)> = None;
        let mut buffer = String::new();

        loop {
            match reader.read_event() {
                Ok(Event::Start(element)) => {
                    let name = local_name(&element);
                    if name == "entry" || name == "item" {
                        current = Some(RawItem::default());
                        continue;
                    }
                    let Some(item) = current.as_mut() else { continue };
                    if field.is_some() {
                        // Nested markup inside a field (xhtml content)
                        continue;
                    }
                    if let Some(kind) = XmlField::from_local_name(&name) {
                        if kind == XmlField::Link {
                            if let Some(href) = href_of(&element) {
                                set_if_empty(&mut item.link, href);
                            }
                        }
                        field = Some((kind, name));
                        buffer.clear();
                    }
                }
                Ok(Event::Empty(element)) => {
                    if let Some(item) = current.as_mut() {
                        if local_name(&element) == "link" {
                            if let Some(href) = href_of(&element) {
                                set_if_empty(&mut item.link, href);
                            }
                        }
                    }
                }
                Ok(Event::Text(text)) => {
                    if field.is_some() {
                        match text.unescape() {
                            Ok(decoded) => buffer.push_str(&decoded),
                            Err(e) => debug!(error = %e, "undecodable text in feed entry"),
                        }
                    }
                }
                Ok(Event::CData(data)) => {
                    if field.is_some() {
                        buffer.push_str(&String::from_utf8_lossy(&data.into_inner()));
                    }
                }
                Ok(Event::End(element)) => {
                    let name = String::from_utf8_lossy(element.local_name().as_ref()).into_owned();
                    if name == "entry" || name == "item" {
                        if let Some(item) = current.take() {
                            items.push(item);
                        }
                        field = None;
                        continue;
                    }
                    let closes_field = matches!(&field, Some((_, open_name)) if *open_name == name);
                    if closes_field {
                        if let (Some((kind, _)), Some(item)) = (field.take(), current.as_mut()) {
                            XmlFeedParser::assign(item, kind, std::mem::take(&mut buffer));
                        }
                    }
                }
                Ok(Event::Eof) => break,
                Err(e) => {
                    return Err(anyhow::anyhow!(
                        "XML error at position {}: {}",
                        reader.buffer_position(),
                        e
                    ))
                }
                _ => {}
            }
        }

        Ok(items)
    }

    fn format(&self) -> FeedFormat {
        FeedFormat::Xml
    }
}

// ============================================================================
// TESTS
// ============================================================================

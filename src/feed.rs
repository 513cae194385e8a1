//! Upstream RSS feed fetcher and parser.
//!
//! The feed is RSS 2.0 with one `<item>` per alert. Structured fields are
//! not provided as elements; age, missing date and missing-from location
//! are embedded in the description text and pulled out with patterns:
//!
//! ```text
//! <item>
//!   <title>Missing: JANE DOE (AZ)</title>
//!   <link>https://example.org/poster/NCMC/2041</link>
//!   <description>JANE DOE, Age Now: 15, Missing: 08/01/2025. Missing From PHOENIX, AZ. ...</description>
//!   <pubDate>Fri, 01 Aug 2025 18:04:00 EST</pubDate>
//!   <guid>2041</guid>
//!   <enclosure url="https://example.org/photo/2041.jpg" type="image/jpeg"/>
//! </item>
//! ```
//!
//! Fetching never fails loudly: transport errors, bad status codes and
//! unparseable bodies produce an empty list, which the pipeline treats as
//! "no update available".

use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use quick_xml::events::{BytesStart, Event};
use regex::Regex;
use std::sync::LazyLock;
use tracing::{debug, warn};

use crate::config::FeedConfig;
use crate::http;
use crate::logging::sanitize;
use crate::markup::{clean_text, collapse_whitespace};
use crate::models::RawRecord;
use crate::traits::FeedSource;

static AGE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bAge(?:\s+Now)?\s*:\s*(\d{1,3})\b").expect("valid regex"));
static MISSING_DATE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bMissing\s*:\s*(\d{1,2}/\d{1,2}/\d{4}|\d{4}-\d{2}-\d{2})").expect("valid regex")
});
static MISSING_FROM_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bMissing\s+From\s+([^,.;]+?)\s*,\s*([A-Za-z]{2})\b").expect("valid regex")
});
static STATE_SUFFIX_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s*\([A-Za-z]{2}\)\s*$").expect("valid regex"));

// ═══════════════════════════════════════════════════════════════════════
// HTTP source
// ═══════════════════════════════════════════════════════════════════════

/// Fetches the configured feed URL over HTTP.
pub struct HttpFeed {
    config: FeedConfig,
    client: reqwest::Client,
}

impl HttpFeed {
    pub fn new(config: &FeedConfig) -> Result<Self> {
        Ok(Self {
            config: config.clone(),
            client: http::client(config.timeout_secs)?,
        })
    }

    async fn fetch_body(&self) -> Result<String> {
        let resp = self.client.get(&self.config.url).send().await?;
        let status = resp.status();
        if !status.is_success() {
            bail!("feed returned HTTP {}", status);
        }
        Ok(resp.text().await?)
    }
}

#[async_trait]
impl FeedSource for HttpFeed {
    async fn fetch(&self) -> Vec<RawRecord> {
        let body = match self.fetch_body().await {
            Ok(b) => b,
            Err(e) => {
                warn!(
                    url = %sanitize(&self.config.url),
                    error = %sanitize(&e.to_string()),
                    "feed fetch failed"
                );
                return Vec::new();
            }
        };

        match parse_feed(&body, &self.config.name_prefixes) {
            Ok(records) => {
                debug!(items = records.len(), "feed parsed");
                records
            }
            Err(e) => {
                warn!(error = %sanitize(&e.to_string()), "feed parse failed");
                Vec::new()
            }
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Parsing
// ═══════════════════════════════════════════════════════════════════════

/// Which `<item>` child element the reader is currently inside.
#[derive(Clone, Copy)]
enum Field {
    Title,
    Link,
    Description,
    PubDate,
    Guid,
}

#[derive(Default)]
struct ItemBuf {
    title: String,
    link: String,
    description: String,
    pub_date: String,
    guid: String,
    enclosure: Option<String>,
}

impl ItemBuf {
    fn push(&mut self, field: Field, text: &str) {
        let target = match field {
            Field::Title => &mut self.title,
            Field::Link => &mut self.link,
            Field::Description => &mut self.description,
            Field::PubDate => &mut self.pub_date,
            Field::Guid => &mut self.guid,
        };
        target.push_str(text);
    }
}

/// Parse an RSS document into raw records, in feed order.
///
/// Items without a usable title are skipped. Returns an error only when the
/// XML itself is malformed before any item could be read.
pub fn parse_feed(xml: &str, name_prefixes: &[String]) -> Result<Vec<RawRecord>> {
    let mut reader = quick_xml::Reader::from_str(xml);
    let mut records = Vec::new();
    let mut item: Option<ItemBuf> = None;
    let mut field: Option<Field> = None;

    loop {
        let event = match reader.read_event() {
            Ok(ev) => ev,
            Err(e) => {
                if records.is_empty() {
                    bail!("malformed feed XML: {}", e);
                }
                warn!(
                    parsed = records.len(),
                    error = %sanitize(&e.to_string()),
                    "feed XML truncated; keeping items read so far"
                );
                break;
            }
        };

        match event {
            Event::Start(ref e) => match e.local_name().as_ref() {
                b"item" => item = Some(ItemBuf::default()),
                name if item.is_some() => {
                    field = match name {
                        b"title" => Some(Field::Title),
                        b"link" => Some(Field::Link),
                        b"description" => Some(Field::Description),
                        b"pubDate" => Some(Field::PubDate),
                        b"guid" => Some(Field::Guid),
                        b"enclosure" => {
                            if let Some(ref mut it) = item {
                                it.enclosure = it.enclosure.take().or_else(|| enclosure_url(e));
                            }
                            None
                        }
                        _ => None,
                    };
                }
                _ => {}
            },
            Event::Empty(ref e) => {
                if e.local_name().as_ref() == b"enclosure" {
                    if let Some(ref mut it) = item {
                        it.enclosure = it.enclosure.take().or_else(|| enclosure_url(e));
                    }
                }
            }
            Event::Text(ref t) => {
                if let (Some(it), Some(f)) = (item.as_mut(), field) {
                    let text = t
                        .unescape()
                        .map(|c| c.into_owned())
                        .unwrap_or_else(|_| String::from_utf8_lossy(t).into_owned());
                    it.push(f, &text);
                }
            }
            Event::CData(ref t) => {
                if let (Some(it), Some(f)) = (item.as_mut(), field) {
                    it.push(f, &String::from_utf8_lossy(t));
                }
            }
            Event::End(ref e) => match e.local_name().as_ref() {
                b"item" => {
                    if let Some(it) = item.take() {
                        if let Some(rec) = build_record(it, name_prefixes) {
                            records.push(rec);
                        }
                    }
                    field = None;
                }
                _ => field = None,
            },
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(records)
}

fn enclosure_url(e: &BytesStart) -> Option<String> {
    e.attributes()
        .flatten()
        .find(|a| a.key.as_ref() == b"url")
        .and_then(|a| a.unescape_value().ok().map(|v| v.trim().to_string()))
        .filter(|v| !v.is_empty())
}

fn build_record(it: ItemBuf, name_prefixes: &[String]) -> Option<RawRecord> {
    let title = collapse_whitespace(&it.title);
    if title.is_empty() {
        return None;
    }

    let description = clean_text(&it.description).unwrap_or_default();
    let (missing_city, missing_state) = extract_missing_from(&description);

    Some(RawRecord {
        name: extract_name(&title, name_prefixes),
        link: non_empty(it.link),
        pub_date: non_empty(it.pub_date),
        guid: non_empty(it.guid),
        photo_url: it.enclosure,
        age: extract_age(&description),
        missing_date: extract_missing_date(&description),
        missing_city,
        missing_state,
        title,
        description,
    })
}

fn non_empty(s: String) -> Option<String> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Strip editorial prefixes (case-insensitive, repeatedly) and a trailing `(ST)`.
pub fn extract_name(title: &str, prefixes: &[String]) -> String {
    let mut name = title.trim();
    loop {
        let before = name;
        for prefix in prefixes {
            let p = prefix.trim();
            if p.is_empty() || name.len() < p.len() || !name.is_char_boundary(p.len()) {
                continue;
            }
            if name[..p.len()].eq_ignore_ascii_case(p) {
                name = name[p.len()..].trim_start();
            }
        }
        if name == before {
            break;
        }
    }
    let without_state = STATE_SUFFIX_RE.replace(name, "");
    collapse_whitespace(&without_state)
}

fn extract_age(description: &str) -> Option<u32> {
    AGE_RE
        .captures(description)
        .and_then(|c| c[1].parse::<u32>().ok())
        .filter(|age| *age < 130)
}

/// `MM/DD/YYYY` or `YYYY-MM-DD`, normalized to ISO; invalid dates become `None`.
fn extract_missing_date(description: &str) -> Option<String> {
    let raw = MISSING_DATE_RE.captures(description)?.get(1)?.as_str().to_string();
    NaiveDate::parse_from_str(&raw, "%m/%d/%Y")
        .or_else(|_| NaiveDate::parse_from_str(&raw, "%Y-%m-%d"))
        .ok()
        .map(|d| d.format("%Y-%m-%d").to_string())
}

fn extract_missing_from(description: &str) -> (Option<String>, Option<String>) {
    match MISSING_FROM_RE.captures(description) {
        Some(c) => (
            Some(title_case(c[1].trim())),
            Some(c[2].to_uppercase()),
        ),
        None => (None, None),
    }
}

/// `SAN TAN VALLEY` → `San Tan Valley`.
fn title_case(s: &str) -> String {
    s.split_whitespace()
        .map(|w| {
            let lower = w.to_lowercase();
            let mut chars = lower.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prefixes() -> Vec<String> {
        crate::config::parse_config(
            r#"
[output]
path = "x.json"
[feed]
url = "http://localhost/feed"
[region]
places = { "phoenix" = "Maricopa" }
[detail]
base_url = "http://localhost/poster"
"#,
        )
        .unwrap()
        .feed
        .name_prefixes
    }

    const FEED: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0"><channel>
<title>Missing Children</title>
<item>
  <title>Missing: JANE DOE (AZ)</title>
  <link>https://example.org/poster/NCMC/2041</link>
  <description>JANE DOE, Age Now: 15, Missing: 08/01/2025. Missing From PHOENIX, AZ. ANYONE HAVING INFORMATION SHOULD CONTACT...</description>
  <pubDate>Fri, 01 Aug 2025 18:04:00 EST</pubDate>
  <guid>2041</guid>
  <enclosure url="https://example.org/photo/2041.jpg" length="0" type="image/jpeg"/>
</item>
<item>
  <title><![CDATA[Endangered Missing: JOHN Q. PUBLIC (AZ)]]></title>
  <link>https://example.org/poster/NCMC/2042</link>
  <description><![CDATA[<p>JOHN Q. PUBLIC, Missing: 13/45/2025. Missing From SAN TAN VALLEY, AZ.</p>]]></description>
  <guid>2042</guid>
</item>
<item>
  <title></title>
  <description>no title, skipped</description>
</item>
</channel></rss>"#;

    #[test]
    fn parses_items_in_order() {
        let records = parse_feed(FEED, &prefixes()).unwrap();
        assert_eq!(records.len(), 2);

        let jane = &records[0];
        assert_eq!(jane.name, "JANE DOE");
        assert_eq!(jane.guid.as_deref(), Some("2041"));
        assert_eq!(jane.age, Some(15));
        assert_eq!(jane.missing_date.as_deref(), Some("2025-08-01"));
        assert_eq!(jane.missing_city.as_deref(), Some("Phoenix"));
        assert_eq!(jane.missing_state.as_deref(), Some("AZ"));
        assert_eq!(
            jane.photo_url.as_deref(),
            Some("https://example.org/photo/2041.jpg")
        );
        assert!(jane.pub_date.is_some());
    }

    #[test]
    fn tolerates_missing_enclosure_age_and_bad_date() {
        let records = parse_feed(FEED, &prefixes()).unwrap();
        let john = &records[1];
        assert_eq!(john.name, "JOHN Q. PUBLIC");
        assert!(john.photo_url.is_none());
        assert!(john.age.is_none());
        assert!(john.missing_date.is_none());
        assert_eq!(john.missing_city.as_deref(), Some("San Tan Valley"));
        assert!(!john.description.contains('<'));
    }

    #[test]
    fn empty_channel_yields_no_records() {
        let xml = r#"<rss><channel><title>x</title></channel></rss>"#;
        assert!(parse_feed(xml, &prefixes()).unwrap().is_empty());
    }

    #[test]
    fn garbage_is_an_error_not_a_panic() {
        assert!(parse_feed("<rss><channel><item><title>a</titl", &prefixes())
            .map(|r| r.is_empty())
            .unwrap_or(true));
    }

    #[test]
    fn strips_stacked_prefixes_case_insensitively() {
        let p = prefixes();
        assert_eq!(extract_name("AMBER ALERT: missing: Ana Ruiz (az)", &p), "Ana Ruiz");
        assert_eq!(extract_name("Critically Missing: Bo Lee", &p), "Bo Lee");
        assert_eq!(extract_name("Missingno Smith", &p), "Missingno Smith");
    }

    #[test]
    fn iso_missing_date_is_accepted() {
        assert_eq!(
            extract_missing_date("Missing: 2025-08-19 from home").as_deref(),
            Some("2025-08-19")
        );
    }
}

//! Per-case detail page scraper.
//!
//! Detail pages live at `<detail.base_url>/<sourceId>` and are uncontrolled
//! third-party HTML. Two shapes are recognized:
//!
//! - label/value pairs: `<dt>Hair Color:</dt><dd>Brown</dd>`, the same with
//!   `th`/`td`, `span`, `strong`, `b` or `label`, and the inline form
//!   `<p><strong>Circumstances:</strong> Last seen ...</p>`
//! - a contact block: any element whose class contains `contact`; its first
//!   text line is the agency and the first phone-shaped token is the phone
//!
//! Every value goes through [`markup::clean_text`]. Nothing here is an
//! error: a page that cannot be fetched or matched yields empty details.

use async_trait::async_trait;
use regex::Regex;
use std::sync::LazyLock;
use tracing::{debug, warn};

use crate::config::DetailConfig;
use crate::http;
use crate::logging::sanitize;
use crate::markup::{self, collapse_whitespace};
use crate::models::CaseDetails;
use crate::traits::DetailSource;

static CONTACT_BLOCK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?is)<(div|section|p|td|address)\b[^>]*class\s*=\s*["'][^"']*contact[^"']*["'][^>]*>(.*?)</\s*(?:div|section|p|td|address)\s*>"#,
    )
    .expect("valid regex")
});
static PHONE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:\+?1[\s.-]?)?\(?\d{3}\)?[\s.-]?\d{3}[\s.-]?\d{4}").expect("valid regex")
});
static LINE_BREAK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)<\s*(?:br|/p|/div|/li|/span|/strong|/b|/h\d)\s*/?\s*>").expect("valid regex")
});

/// Label variants accepted for each field, lowercase.
const SEX_LABELS: &[&str] = &["sex", "gender"];
const RACE_LABELS: &[&str] = &["race"];
const HAIR_LABELS: &[&str] = &["hair color", "hair"];
const EYE_LABELS: &[&str] = &["eye color", "eyes"];
const HEIGHT_LABELS: &[&str] = &["height"];
const WEIGHT_LABELS: &[&str] = &["weight"];
const DOB_LABELS: &[&str] = &["dob", "date of birth", "birth date"];
const CIRCUMSTANCES_LABELS: &[&str] = &["circumstances", "details"];
const AGENCY_LABELS: &[&str] = &["agency", "investigating agency", "contact agency"];
const PHONE_LABELS: &[&str] = &["agency phone", "contact phone", "phone"];

/// Scrapes detail pages over HTTP, one request per call.
pub struct HttpDetailSource {
    base_url: String,
    client: reqwest::Client,
}

impl HttpDetailSource {
    pub fn new(config: &DetailConfig) -> anyhow::Result<Self> {
        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            client: http::client(config.timeout_secs)?,
        })
    }

    pub fn url_for(&self, source_id: &str) -> String {
        format!("{}/{}", self.base_url, http::uri_encode(source_id))
    }
}

#[async_trait]
impl DetailSource for HttpDetailSource {
    async fn fetch_details(&self, source_id: &str) -> CaseDetails {
        let url = self.url_for(source_id);
        let resp = match self.client.get(&url).send().await {
            Ok(r) => r,
            Err(e) => {
                warn!(
                    source_id = %sanitize(source_id),
                    error = %sanitize(&e.to_string()),
                    "detail fetch failed"
                );
                return CaseDetails::default();
            }
        };

        let status = resp.status();
        if !status.is_success() {
            warn!(source_id = %sanitize(source_id), %status, "detail page returned non-success");
            return CaseDetails::default();
        }

        match resp.text().await {
            Ok(html) => {
                let details = parse_detail_html(&html);
                if details.is_empty() {
                    debug!(source_id = %sanitize(source_id), "detail page had no recognizable fields");
                }
                details
            }
            Err(e) => {
                warn!(
                    source_id = %sanitize(source_id),
                    error = %sanitize(&e.to_string()),
                    "detail body unreadable"
                );
                CaseDetails::default()
            }
        }
    }
}

/// Extract every recognized field from a detail page.
pub fn parse_detail_html(html: &str) -> CaseDetails {
    let html = markup::remove_scripts(html);
    let html = html.as_str();
    let pairs = label_pairs(html);
    let lookup = |labels: &[&str]| -> Option<String> {
        labels.iter().find_map(|wanted| {
            pairs
                .iter()
                .find(|(label, _)| label.as_str() == *wanted)
                .map(|(_, value)| value.clone())
        })
    };

    let (block_agency, block_phone) = contact_block(html);

    CaseDetails {
        sex: lookup(SEX_LABELS),
        race: lookup(RACE_LABELS),
        hair_color: lookup(HAIR_LABELS),
        eye_color: lookup(EYE_LABELS),
        height: lookup(HEIGHT_LABELS),
        weight: lookup(WEIGHT_LABELS),
        date_of_birth: lookup(DOB_LABELS),
        circumstances: lookup(CIRCUMSTANCES_LABELS),
        contact_agency: lookup(AGENCY_LABELS).or(block_agency),
        contact_phone: lookup(PHONE_LABELS)
            .and_then(|p| find_phone(&p))
            .or(block_phone),
    }
}

/// All `(label, value)` pairs in document order; labels lowercased without
/// the trailing colon, values cleaned of markup.
fn label_pairs(html: &str) -> Vec<(String, String)> {
    static PAIR_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(
            r"(?is)<(dt|th|td|span|strong|b|label)\b[^>]*>\s*([A-Za-z][A-Za-z .]{1,40}?)\s*:?\s*</\s*(?:dt|th|td|span|strong|b|label)\s*>\s*(?:</\s*(?:span|strong|b)\s*>\s*)?<(dd|td|span|div|p)\b[^>]*>(.*?)</\s*(?:dd|td|span|div|p)\s*>",
        )
        .expect("valid regex")
    });
    static INLINE_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(
            r"(?is)<(strong|b|span|label)\b[^>]*>\s*([A-Za-z][A-Za-z .]{1,40}?)\s*:\s*</\s*(?:strong|b|span|label)\s*>([^<]*(?:<(?:br|em|i|a)\b[^>]*>[^<]*(?:</(?:em|i|a)>[^<]*)?)*)",
        )
        .expect("valid regex")
    });

    let mut pairs = Vec::new();
    for caps in PAIR_RE.captures_iter(html) {
        push_pair(&mut pairs, &caps[2], &caps[4]);
    }
    for caps in INLINE_RE.captures_iter(html) {
        push_pair(&mut pairs, &caps[2], &caps[3]);
    }
    pairs
}

fn push_pair(pairs: &mut Vec<(String, String)>, label: &str, raw_value: &str) {
    let label = collapse_whitespace(label).trim_end_matches(':').trim().to_lowercase();
    if let Some(value) = markup::clean_text(raw_value) {
        if !pairs.iter().any(|(l, _)| *l == label) {
            pairs.push((label, value));
        }
    }
}

/// Agency and phone from the first contact block, if any.
fn contact_block(html: &str) -> (Option<String>, Option<String>) {
    let Some(caps) = CONTACT_BLOCK_RE.captures(html) else {
        return (None, None);
    };
    let with_breaks = LINE_BREAK_RE.replace_all(&caps[2], "\n");
    let text = markup::strip_tags(&with_breaks);

    let phone = find_phone(&text);
    let agency = text
        .lines()
        .map(collapse_whitespace)
        .map(|l| {
            PHONE_RE
                .replace_all(&l, "")
                .trim()
                .trim_end_matches([',', ':', '-'])
                .trim()
                .to_string()
        })
        .find(|l| !l.is_empty() && !is_contact_heading(l));

    (agency, phone)
}

fn is_contact_heading(line: &str) -> bool {
    let lower = line.to_lowercase();
    let lower = lower.trim_end_matches(':').trim();
    lower == "contact"
        || lower == "contact information"
        || lower.starts_with("anyone having information")
        || lower.starts_with("if you have information")
}

fn find_phone(text: &str) -> Option<String> {
    PHONE_RE.find(text).map(|m| m.as_str().trim().to_string())
}

//! Core data models used throughout the sync job.
//!
//! [`RawRecord`] is what the feed parser produces, [`CaseDetails`] what the
//! detail scraper produces, [`Enrichment`] what the completion service
//! produces, and [`Case`] is the assembled, persisted record. The persisted
//! artifact is [`SyncArtifact`]; its JSON field names are camelCase because
//! the static site and mobile client consume it directly.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Default `caseType` when enrichment did not run or failed.
pub const DEFAULT_CASE_TYPE: &str = "Missing";

/// One `<item>` from the upstream feed, before region filtering.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawRecord {
    pub title: String,
    pub link: Option<String>,
    pub description: String,
    pub pub_date: Option<String>,
    pub guid: Option<String>,
    pub photo_url: Option<String>,
    pub age: Option<u32>,
    /// ISO `YYYY-MM-DD`.
    pub missing_date: Option<String>,
    pub missing_city: Option<String>,
    pub missing_state: Option<String>,
    pub name: String,
}

impl RawRecord {
    /// Natural key: the `guid`, or the last path segment of `link`. A
    /// permalink `guid` is reduced to its last path segment as well.
    pub fn source_id(&self) -> Option<String> {
        if let Some(guid) = self.guid.as_deref().map(str::trim) {
            if guid.contains("://") {
                if let Some(id) = last_path_segment(guid) {
                    return Some(id);
                }
            } else if !guid.is_empty() {
                return Some(guid.to_string());
            }
        }
        last_path_segment(self.link.as_deref()?.trim())
    }
}

fn last_path_segment(url: &str) -> Option<String> {
    let url = url.split(['?', '#']).next().unwrap_or(url);
    let path = match url.split_once("://") {
        Some((_, rest)) => rest.split_once('/')?.1,
        None => url,
    };
    path.trim_end_matches('/')
        .rsplit('/')
        .next()
        .filter(|s| !s.is_empty() && !s.contains(':'))
        .map(str::to_string)
}

/// Best-effort fields scraped from a case detail page. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CaseDetails {
    pub sex: Option<String>,
    pub race: Option<String>,
    pub hair_color: Option<String>,
    pub eye_color: Option<String>,
    pub height: Option<String>,
    pub weight: Option<String>,
    pub date_of_birth: Option<String>,
    pub circumstances: Option<String>,
    pub contact_agency: Option<String>,
    pub contact_phone: Option<String>,
}

impl CaseDetails {
    pub fn is_empty(&self) -> bool {
        *self == CaseDetails::default()
    }
}

/// Output of the completion service for one case.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Enrichment {
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub case_type: Option<String>,
    #[serde(default)]
    pub last_seen_wearing: Option<String>,
    #[serde(default)]
    pub normalized_name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MissingFrom {
    pub city: String,
    pub region: String,
    pub state_or_province: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Physical {
    #[serde(default)]
    pub sex: Option<String>,
    #[serde(default)]
    pub race: Option<String>,
    #[serde(default)]
    pub height: Option<String>,
    #[serde(default)]
    pub weight: Option<String>,
    #[serde(default)]
    pub hair_color: Option<String>,
    #[serde(default)]
    pub eye_color: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Contact {
    #[serde(default)]
    pub agency: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
}

/// One missing-person alert as persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Case {
    pub id: String,
    pub source_id: String,
    pub name: String,
    #[serde(default)]
    pub age: Option<u32>,
    #[serde(default)]
    pub missing_date: Option<String>,
    pub missing_from: MissingFrom,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub physical: Option<Physical>,
    #[serde(default)]
    pub date_of_birth: Option<String>,
    #[serde(default)]
    pub circumstances: Option<String>,
    #[serde(default)]
    pub contact: Contact,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default = "default_case_type")]
    pub case_type: String,
    #[serde(default)]
    pub last_seen_wearing: Option<String>,
    #[serde(default)]
    pub normalized_name: Option<String>,
    #[serde(default)]
    pub enriched_by_llm: bool,
    #[serde(default)]
    pub photo_url: Option<String>,
    #[serde(default)]
    pub poster_url: Option<String>,
    pub synced_at: DateTime<Utc>,
}

fn default_case_type() -> String {
    DEFAULT_CASE_TYPE.to_string()
}

impl Case {
    /// `missingDate` parsed as a calendar date, if well formed.
    pub fn missing_on(&self) -> Option<NaiveDate> {
        self.missing_date
            .as_deref()
            .and_then(|d| NaiveDate::parse_from_str(d.trim(), "%Y-%m-%d").ok())
    }
}

/// The persisted output, written locally and replicated to blob storage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncArtifact {
    pub cases: Vec<Case>,
    #[serde(default)]
    pub id_map: BTreeMap<String, String>,
    pub last_sync: DateTime<Utc>,
    #[serde(default)]
    pub total_in_region_source: usize,
    #[serde(default)]
    pub total_filtered: usize,
    #[serde(default)]
    pub new_cases_this_sync: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_id_prefers_guid() {
        let rec = RawRecord {
            guid: Some(" NCMC-2041 ".into()),
            link: Some("https://example.org/poster/NCMC/999".into()),
            ..Default::default()
        };
        assert_eq!(rec.source_id().as_deref(), Some("NCMC-2041"));
    }

    #[test]
    fn permalink_guid_uses_last_segment() {
        let rec = RawRecord {
            guid: Some("https://example.org/poster/NCMC/2041#rss".into()),
            link: Some("https://example.org/poster/NCMC/999".into()),
            ..Default::default()
        };
        assert_eq!(rec.source_id().as_deref(), Some("2041"));

        let bare_host = RawRecord {
            guid: Some("https://example.org/".into()),
            link: Some("https://example.org/poster/NCMC/3050".into()),
            ..Default::default()
        };
        assert_eq!(bare_host.source_id().as_deref(), Some("3050"));
    }

    #[test]
    fn source_id_falls_back_to_link_segment() {
        let rec = RawRecord {
            guid: Some("".into()),
            link: Some("https://example.org/poster/NCMC/2041/?src=rss".into()),
            ..Default::default()
        };
        assert_eq!(rec.source_id().as_deref(), Some("2041"));
    }

    #[test]
    fn case_deserializes_with_defaults() {
        let json = r#"{
            "id": "MC-ABC123",
            "sourceId": "2041",
            "name": "Jane Doe",
            "missingFrom": {"city": "Phoenix", "region": "Maricopa", "stateOrProvince": "AZ"},
            "syncedAt": "2025-08-19T10:00:00Z"
        }"#;
        let case: Case = serde_json::from_str(json).unwrap();
        assert_eq!(case.case_type, DEFAULT_CASE_TYPE);
        assert!(!case.enriched_by_llm);
        assert!(case.physical.is_none());
        assert!(case.missing_on().is_none());
    }

    #[test]
    fn artifact_uses_camel_case_keys() {
        let artifact = SyncArtifact {
            cases: vec![],
            id_map: BTreeMap::new(),
            last_sync: Utc::now(),
            total_in_region_source: 4,
            total_filtered: 2,
            new_cases_this_sync: 1,
        };
        let json = serde_json::to_string(&artifact).unwrap();
        assert!(json.contains("\"idMap\""));
        assert!(json.contains("\"totalInRegionSource\":4"));
        assert!(json.contains("\"newCasesThisSync\":1"));
    }
}

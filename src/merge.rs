//! Building and merging [`Case`] records.
//!
//! A case is assembled in layers:
//!
//! 1. [`case_from_record`]: feed fields (name, age, dates, location, links)
//! 2. [`apply_details`]: detail page fields, then the city contact fallback
//! 3. [`apply_enrichment`]: model output, or the defaults on failure
//!
//! Steps 2 and 3 only run on first sighting. For a case that is already in
//! the previous artifact, [`carry_forward`] takes the fresh feed fields and
//! copies everything else from the stored record.

use chrono::{DateTime, Utc};
use std::cmp::Ordering;

use crate::config::Config;
use crate::models::{
    Case, CaseDetails, Contact, Enrichment, MissingFrom, Physical, RawRecord, DEFAULT_CASE_TYPE,
};

/// Feed-derived fields only; detail and enrichment fields start empty.
pub fn case_from_record(
    raw: &RawRecord,
    source_id: &str,
    id: &str,
    region: &str,
    default_state: Option<&str>,
    now: DateTime<Utc>,
) -> Case {
    let state = raw
        .missing_state
        .as_deref()
        .or(default_state)
        .unwrap_or_default()
        .trim()
        .to_uppercase();

    Case {
        id: id.to_string(),
        source_id: source_id.to_string(),
        name: raw.name.clone(),
        age: raw.age,
        missing_date: raw.missing_date.clone(),
        missing_from: MissingFrom {
            city: raw.missing_city.clone().unwrap_or_default(),
            region: region.to_string(),
            state_or_province: state,
        },
        physical: None,
        date_of_birth: None,
        circumstances: None,
        contact: Contact::default(),
        summary: None,
        case_type: DEFAULT_CASE_TYPE.to_string(),
        last_seen_wearing: None,
        normalized_name: None,
        enriched_by_llm: false,
        photo_url: raw.photo_url.clone(),
        poster_url: raw.link.clone(),
        synced_at: now,
    }
}

/// Copy scraped fields onto `case`, then fill the contact from the static
/// city table when the page named no agency.
pub fn apply_details(case: &mut Case, details: CaseDetails, config: &Config) {
    let physical = Physical {
        sex: details.sex,
        race: details.race,
        height: details.height,
        weight: details.weight,
        hair_color: details.hair_color,
        eye_color: details.eye_color,
    };
    if physical != Physical::default() {
        case.physical = Some(physical);
    }

    case.date_of_birth = details.date_of_birth;
    case.circumstances = details.circumstances;
    case.contact = Contact {
        agency: details.contact_agency,
        phone: details.contact_phone,
    };

    if case.contact.agency.is_none() {
        if let Some(entry) = config.contact_for_city(&case.missing_from.city) {
            case.contact.agency = Some(entry.agency.clone());
            if entry.phone.is_some() {
                case.contact.phone = entry.phone.clone();
            }
        }
    }
}

/// Apply model output. `None` leaves the defaults: `caseType = "Missing"`,
/// `enrichedByLlm = false`.
pub fn apply_enrichment(case: &mut Case, enrichment: Option<Enrichment>) {
    let Some(e) = enrichment else {
        case.case_type = DEFAULT_CASE_TYPE.to_string();
        case.enriched_by_llm = false;
        return;
    };

    case.summary = e.summary;
    case.case_type = e.case_type.unwrap_or_else(|| DEFAULT_CASE_TYPE.to_string());
    case.last_seen_wearing = e.last_seen_wearing;
    case.normalized_name = e.normalized_name;
    case.enriched_by_llm = true;
}

/// `fresh` carries this run's feed fields; every detail, enrichment and
/// bookkeeping field comes from `previous`.
pub fn carry_forward(fresh: Case, previous: &Case) -> Case {
    Case {
        id: previous.id.clone(),
        source_id: fresh.source_id,
        name: fresh.name,
        age: fresh.age,
        missing_date: fresh.missing_date,
        missing_from: fresh.missing_from,
        physical: previous.physical.clone(),
        date_of_birth: previous.date_of_birth.clone(),
        circumstances: previous.circumstances.clone(),
        contact: previous.contact.clone(),
        summary: previous.summary.clone(),
        case_type: previous.case_type.clone(),
        last_seen_wearing: previous.last_seen_wearing.clone(),
        normalized_name: previous.normalized_name.clone(),
        enriched_by_llm: previous.enriched_by_llm,
        photo_url: fresh.photo_url,
        poster_url: fresh.poster_url,
        synced_at: previous.synced_at,
    }
}

/// Most recent `missingDate` first; undated or unparseable cases last.
/// Ties keep their input order.
pub fn sort_cases(cases: &mut [Case]) {
    cases.sort_by(|a, b| match (a.missing_on(), b.missing_on()) {
        (Some(x), Some(y)) => y.cmp(&x),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::parse_config;
    use chrono::TimeZone;

    fn config() -> Config {
        parse_config(
            r#"
[output]
path = "out.json"
[feed]
url = "http://localhost/feed"
[region]
state = "AZ"
places = { "phoenix" = "Maricopa", "flagstaff" = "Coconino" }
[detail]
base_url = "http://localhost/poster"
[contacts."Phoenix"]
agency = "Phoenix Police Department"
phone = "(602) 262-6151"
"#,
        )
        .unwrap()
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 8, 19, 12, 0, 0).unwrap()
    }

    fn raw(city: &str, date: Option<&str>) -> RawRecord {
        RawRecord {
            title: "Missing: JANE DOE".into(),
            link: Some("https://example.org/poster/2041".into()),
            name: "JANE DOE".into(),
            age: Some(15),
            missing_date: date.map(str::to_string),
            missing_city: Some(city.into()),
            missing_state: None,
            photo_url: Some("https://example.org/photo/2041.jpg".into()),
            ..Default::default()
        }
    }

    fn dated(id: &str, date: Option<&str>) -> Case {
        let mut c = case_from_record(&raw("Phoenix", date), id, id, "Maricopa", Some("AZ"), now());
        c.id = id.into();
        c
    }

    #[test]
    fn record_fields_and_defaults() {
        let c = case_from_record(&raw("Phoenix", Some("2025-08-01")), "2041", "MC-ABC123", "Maricopa", Some("az"), now());
        assert_eq!(c.missing_from.state_or_province, "AZ");
        assert_eq!(c.missing_from.region, "Maricopa");
        assert_eq!(c.poster_url.as_deref(), Some("https://example.org/poster/2041"));
        assert_eq!(c.case_type, DEFAULT_CASE_TYPE);
        assert!(!c.enriched_by_llm);
        assert!(c.physical.is_none());
    }

    #[test]
    fn contact_falls_back_to_city_table() {
        let cfg = config();
        let mut c = dated("MC-1", None);
        apply_details(
            &mut c,
            CaseDetails {
                sex: Some("Female".into()),
                ..Default::default()
            },
            &cfg,
        );
        assert_eq!(c.contact.agency.as_deref(), Some("Phoenix Police Department"));
        assert_eq!(c.contact.phone.as_deref(), Some("(602) 262-6151"));
        assert_eq!(c.physical.unwrap().sex.as_deref(), Some("Female"));
    }

    #[test]
    fn scraped_agency_wins_over_table() {
        let cfg = config();
        let mut c = dated("MC-1", None);
        apply_details(
            &mut c,
            CaseDetails {
                contact_agency: Some("Maricopa County Sheriff".into()),
                contact_phone: Some("602-876-1000".into()),
                ..Default::default()
            },
            &cfg,
        );
        assert_eq!(c.contact.agency.as_deref(), Some("Maricopa County Sheriff"));
        assert_eq!(c.contact.phone.as_deref(), Some("602-876-1000"));
    }

    #[test]
    fn city_without_table_entry_keeps_empty_contact() {
        let cfg = config();
        let mut c = case_from_record(&raw("Flagstaff", None), "9", "MC-9", "Coconino", None, now());
        apply_details(&mut c, CaseDetails::default(), &cfg);
        assert_eq!(c.contact, Contact::default());
        assert!(c.physical.is_none());
    }

    #[test]
    fn enrichment_failure_uses_defaults() {
        let mut c = dated("MC-1", None);
        apply_enrichment(&mut c, None);
        assert_eq!(c.case_type, "Missing");
        assert!(!c.enriched_by_llm);

        apply_enrichment(
            &mut c,
            Some(Enrichment {
                summary: Some("Jane was last seen in Phoenix.".into()),
                case_type: None,
                last_seen_wearing: Some("red hoodie".into()),
                normalized_name: Some("Jane Doe".into()),
            }),
        );
        assert_eq!(c.case_type, "Missing");
        assert!(c.enriched_by_llm);
        assert_eq!(c.normalized_name.as_deref(), Some("Jane Doe"));
        assert_eq!(c.name, "JANE DOE");
    }

    #[test]
    fn carry_forward_keeps_stored_fields() {
        let mut previous = dated("MC-1", Some("2025-08-01"));
        previous.summary = Some("Old summary".into());
        previous.case_type = "Runaway".into();
        previous.enriched_by_llm = true;
        previous.contact.agency = Some("Phoenix PD".into());
        previous.synced_at = Utc.with_ymd_and_hms(2025, 8, 2, 0, 0, 0).unwrap();

        let mut fresh = dated("MC-1", Some("2025-08-01"));
        fresh.age = Some(16);
        let merged = carry_forward(fresh, &previous);

        assert_eq!(merged.age, Some(16));
        assert_eq!(merged.summary.as_deref(), Some("Old summary"));
        assert_eq!(merged.case_type, "Runaway");
        assert!(merged.enriched_by_llm);
        assert_eq!(merged.contact.agency.as_deref(), Some("Phoenix PD"));
        assert_eq!(merged.synced_at, previous.synced_at);
    }

    #[test]
    fn sorts_newest_first_undated_last() {
        let mut cases = vec![
            dated("a", Some("2025-08-01")),
            dated("b", None),
            dated("c", Some("2025-08-19")),
            dated("d", Some("not a date")),
        ];
        sort_cases(&mut cases);
        let order: Vec<&str> = cases.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(order, vec!["c", "a", "b", "d"]);
    }
}

//! Region filter: known place name → administrative region.
//!
//! Matching is exact after case folding and whitespace normalization; a
//! place that is not in the table is outside the region.

use std::collections::HashMap;

use crate::config::RegionConfig;
use crate::markup::collapse_whitespace;

pub struct RegionFilter {
    places: HashMap<String, String>,
    state: Option<String>,
}

impl RegionFilter {
    pub fn new(places: impl IntoIterator<Item = (String, String)>, state: Option<String>) -> Self {
        Self {
            places: places
                .into_iter()
                .map(|(place, region)| (normalize(&place), region))
                .collect(),
            state: state.map(|s| s.trim().to_uppercase()),
        }
    }

    pub fn from_config(config: &RegionConfig) -> Self {
        Self::new(config.places.clone(), config.state.clone())
    }

    /// Region for `place`, or `None` when the place is unknown or the state
    /// does not match the configured one.
    pub fn resolve(&self, place: &str, state: Option<&str>) -> Option<&str> {
        if let Some(ref wanted) = self.state {
            match state {
                Some(s) if s.trim().eq_ignore_ascii_case(wanted) => {}
                _ => return None,
            }
        }
        self.places.get(&normalize(place)).map(String::as_str)
    }
}

fn normalize(place: &str) -> String {
    collapse_whitespace(place).to_lowercase()
}

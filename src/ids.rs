//! Stable public identifiers for cases.
//!
//! Each upstream `sourceId` is mapped once to an id of the form
//! `<prefix><6 chars>` and the mapping is never changed afterwards. The map
//! travels inside the persisted artifact (`idMap`), so there is no separate
//! store file to keep in sync.
//!
//! # Minting
//!
//! Characters are drawn from [`ALPHABET`] by rejection sampling over single
//! random bytes:
//!
//! ```text
//! limit = 256 - (256 % 36) = 252
//! loop { b = random_byte(); if b < limit { return b % 36 } }
//! ```
//!
//! Bytes in `252..=255` are discarded, so every character has probability
//! exactly 1/36. The random source must implement [`CryptoRng`].

use rand::{CryptoRng, RngCore};
use std::collections::{BTreeMap, HashSet};

use crate::models::SyncArtifact;

/// Output alphabet for the random part of an id.
pub const ALPHABET: &[u8; 36] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Number of random characters after the prefix.
pub const ID_RANDOM_LEN: usize = 6;

/// Append-only `sourceId → id` map.
#[derive(Debug, Clone, Default)]
pub struct IdentifierStore {
    prefix: String,
    map: BTreeMap<String, String>,
    issued: HashSet<String>,
}

impl IdentifierStore {
    pub fn new(prefix: &str) -> Self {
        Self {
            prefix: prefix.to_string(),
            ..Default::default()
        }
    }

    /// Seed from the previous artifact's `idMap`, plus any persisted case whose
    /// mapping is missing from it.
    pub fn from_artifact(prefix: &str, artifact: Option<&SyncArtifact>) -> Self {
        let mut store = Self::new(prefix);
        if let Some(prev) = artifact {
            for (source_id, id) in &prev.id_map {
                store.insert(source_id, id);
            }
            for case in &prev.cases {
                if !store.map.contains_key(&case.source_id) {
                    store.insert(&case.source_id, &case.id);
                }
            }
        }
        store
    }

    fn insert(&mut self, source_id: &str, id: &str) {
        self.map.insert(source_id.to_string(), id.to_string());
        self.issued.insert(id.to_string());
    }

    /// Existing id for `source_id`, or a newly minted one. The flag is `true`
    /// when the id was minted by this call.
    pub fn issue_or_get(&mut self, source_id: &str) -> (String, bool) {
        self.issue_or_get_with(source_id, &mut rand::rng())
    }

    pub fn issue_or_get_with<R: CryptoRng + ?Sized>(
        &mut self,
        source_id: &str,
        rng: &mut R,
    ) -> (String, bool) {
        if let Some(id) = self.map.get(source_id) {
            return (id.clone(), false);
        }
        let id = loop {
            let candidate = mint_id(&self.prefix, rng);
            if !self.issued.contains(&candidate) {
                break candidate;
            }
        };
        self.insert(source_id, &id);
        (id, true)
    }

    /// Snapshot for persistence.
    pub fn to_map(&self) -> BTreeMap<String, String> {
        self.map.clone()
    }
}

/// `prefix` followed by [`ID_RANDOM_LEN`] uniformly chosen alphabet characters.
pub fn mint_id<R: CryptoRng + ?Sized>(prefix: &str, rng: &mut R) -> String {
    let mut id = String::with_capacity(prefix.len() + ID_RANDOM_LEN);
    id.push_str(prefix);
    for _ in 0..ID_RANDOM_LEN {
        id.push(ALPHABET[sample_index(rng, ALPHABET.len())] as char);
    }
    id
}

/// Uniform index in `0..n` from single random bytes, rejecting the biased tail.
pub fn sample_index<R: RngCore + ?Sized>(rng: &mut R, n: usize) -> usize {
    debug_assert!(n > 0 && n <= 256);
    let limit = 256 - (256 % n);
    let mut byte = [0u8; 1];
    loop {
        rng.fill_bytes(&mut byte);
        let b = byte[0] as usize;
        if b < limit {
            return b % n;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Case, Contact, MissingFrom, DEFAULT_CASE_TYPE};
    use chrono::Utc;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    /// Replays a fixed byte script, then zeros.
    struct ScriptedBytes {
        bytes: Vec<u8>,
        pos: usize,
    }

    impl RngCore for ScriptedBytes {
        fn next_u32(&mut self) -> u32 {
            let mut b = [0u8; 4];
            self.fill_bytes(&mut b);
            u32::from_le_bytes(b)
        }
        fn next_u64(&mut self) -> u64 {
            let mut b = [0u8; 8];
            self.fill_bytes(&mut b);
            u64::from_le_bytes(b)
        }
        fn fill_bytes(&mut self, dst: &mut [u8]) {
            for d in dst {
                *d = self.bytes.get(self.pos).copied().unwrap_or(0);
                self.pos += 1;
            }
        }
    }

    impl CryptoRng for ScriptedBytes {}

    #[test]
    fn rejects_bytes_at_or_above_limit() {
        // 256 - 256 % 36 = 252
        let mut rng = ScriptedBytes {
            bytes: vec![255, 252, 41],
            pos: 0,
        };
        assert_eq!(sample_index(&mut rng, 36), 5);
        assert_eq!(rng.pos, 3);
    }

    #[test]
    fn accepts_last_byte_below_limit() {
        let mut rng = ScriptedBytes {
            bytes: vec![251],
            pos: 0,
        };
        assert_eq!(sample_index(&mut rng, 36), 251 % 36);
    }

    #[test]
    fn power_of_two_alphabet_never_rejects() {
        let mut rng = ScriptedBytes {
            bytes: vec![255],
            pos: 0,
        };
        assert_eq!(sample_index(&mut rng, 32), 31);
        assert_eq!(rng.pos, 1);
    }

    #[test]
    fn minted_id_has_prefix_and_alphabet_chars() {
        let id = mint_id("MC-", &mut rand::rng());
        assert!(id.starts_with("MC-"));
        let tail = &id[3..];
        assert_eq!(tail.len(), ID_RANDOM_LEN);
        assert!(tail.bytes().all(|b| ALPHABET.contains(&b)));
    }

    #[test]
    fn alphabet_is_uniform_over_large_sample() {
        let mut rng = StdRng::seed_from_u64(0x5eed);
        let mut counts = [0usize; 36];
        let draws = 360_000;
        for _ in 0..draws {
            counts[sample_index(&mut rng, 36)] += 1;
        }
        let expected = (draws / 36) as f64;
        // chi-square, 35 dof; p=0.001 critical value is ~66.6
        let chi2: f64 = counts
            .iter()
            .map(|&c| {
                let d = c as f64 - expected;
                d * d / expected
            })
            .sum();
        assert!(chi2 < 66.6, "chi2 = {}, counts = {:?}", chi2, counts);
    }

    #[test]
    fn issue_or_get_is_stable() {
        let mut store = IdentifierStore::new("MC-");
        let (first, new1) = store.issue_or_get("2041");
        let (second, new2) = store.issue_or_get("2041");
        assert!(new1);
        assert!(!new2);
        assert_eq!(first, second);
        assert_eq!(store.to_map().len(), 1);
    }

    #[test]
    fn collisions_are_re_minted() {
        let mut store = IdentifierStore::new("X");
        // First id: six zero bytes -> "AAAAAA". The second mint replays the
        // same bytes and must be rejected, then index 1 -> "BBBBBB".
        let mut rng = ScriptedBytes {
            bytes: vec![0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 1, 1, 1, 1, 1, 1],
            pos: 0,
        };
        let (a, _) = store.issue_or_get_with("one", &mut rng);
        let (b, _) = store.issue_or_get_with("two", &mut rng);
        assert_eq!(a, "XAAAAAA");
        assert_eq!(b, "XBBBBBB");
    }

    #[test]
    fn reloaded_store_returns_same_ids() {
        let mut store = IdentifierStore::new("MC-");
        let (id, _) = store.issue_or_get("2041");

        let case = Case {
            id: "MC-LEGACY".into(),
            source_id: "1999".into(),
            name: "Old Case".into(),
            age: None,
            missing_date: None,
            missing_from: MissingFrom::default(),
            physical: None,
            date_of_birth: None,
            circumstances: None,
            contact: Contact::default(),
            summary: None,
            case_type: DEFAULT_CASE_TYPE.into(),
            last_seen_wearing: None,
            normalized_name: None,
            enriched_by_llm: false,
            photo_url: None,
            poster_url: None,
            synced_at: Utc::now(),
        };
        let artifact = SyncArtifact {
            cases: vec![case],
            id_map: store.to_map(),
            last_sync: Utc::now(),
            total_in_region_source: 0,
            total_filtered: 0,
            new_cases_this_sync: 0,
        };

        let mut reloaded = IdentifierStore::from_artifact("MC-", Some(&artifact));
        assert_eq!(reloaded.issue_or_get("2041"), (id, false));
        assert_eq!(reloaded.issue_or_get("1999"), ("MC-LEGACY".to_string(), false));
    }
}

//! Change detection between runs.
//!
//! A [`Fingerprint`] is the exact serialized bytes of an ordered case list.
//! Two runs that assemble identical lists produce identical bytes, because
//! every map in the model is ordered and struct fields serialize in
//! declaration order. The fingerprint is never persisted.

use anyhow::Result;
use sha2::{Digest, Sha256};

use crate::models::Case;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fingerprint(Vec<u8>);

impl Fingerprint {
    pub fn of(cases: &[Case]) -> Result<Self> {
        Ok(Self(serde_json::to_vec(cases)?))
    }

    /// Hex SHA-256 of the serialized list, for logs.
    pub fn digest(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(&self.0);
        hex::encode(hasher.finalize())
    }

    pub fn short(&self) -> String {
        self.digest()[..12].to_string()
    }
}

/// `true` unless both lists serialize to the same bytes. No previous list
/// counts as changed.
pub fn has_changed(previous: Option<&Fingerprint>, next: &Fingerprint) -> bool {
    previous != Some(next)
}

/// Whether the write/upload/notify stages need to run at all.
pub fn needs_publish(previous: Option<&Fingerprint>, next: &Fingerprint, new_cases: usize) -> bool {
    new_cases > 0 || has_changed(previous, next)
}

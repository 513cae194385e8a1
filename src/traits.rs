//! Seams between the pipeline and its network collaborators.
//!
//! The pipeline talks to the feed, the detail pages, the completion service,
//! blob storage and the notification endpoint only through these traits.
//! The HTTP-backed implementations live in their own modules
//! ([`crate::feed`], [`crate::detail`], [`crate::enrich`],
//! [`crate::upload`], [`crate::notify`]); tests plug in in-memory ones.
//!
//! ```text
//! ┌──────────────────────── Pipeline ────────────────────────┐
//! │ FeedSource → DetailSource → Enricher                     │
//! │                          ↘ store::write_atomic           │
//! │                            ArtifactUploader  Notifier    │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! Degraded failures stop at this boundary: [`FeedSource`],
//! [`DetailSource`] and [`Enricher`] return empty values instead of errors.
//! [`ArtifactUploader`] and [`Notifier`] return `Result` so the pipeline can
//! log and count failures, but it never aborts on them.
//!
//! # Example
//!
//! ```rust
//! use amber_sync::models::RawRecord;
//! use amber_sync::traits::FeedSource;
//! use async_trait::async_trait;
//!
//! pub struct FixedFeed(Vec<RawRecord>);
//!
//! #[async_trait]
//! impl FeedSource for FixedFeed {
//!     async fn fetch(&self) -> Vec<RawRecord> {
//!         self.0.clone()
//!     }
//! }
//! ```

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{Case, CaseDetails, Enrichment, RawRecord};

/// Produces the current list of raw alerts. Empty means "no update available".
#[async_trait]
pub trait FeedSource: Send + Sync {
    async fn fetch(&self) -> Vec<RawRecord>;
}

/// Best-effort scrape of one case's detail document.
#[async_trait]
pub trait DetailSource: Send + Sync {
    /// Never fails; unreachable or unparseable pages yield `CaseDetails::default()`.
    async fn fetch_details(&self, source_id: &str) -> CaseDetails;
}

/// Summary and classification for a first-sighting case.
#[async_trait]
pub trait Enricher: Send + Sync {
    /// `None` on any failure; the case keeps its default enrichment fields.
    async fn enrich(&self, case: &Case) -> Option<Enrichment>;
}

/// Secondary replica of the persisted artifact.
#[async_trait]
pub trait ArtifactUploader: Send + Sync {
    /// Short label for logs (e.g. `"blob:feeds/missing-children.json"`).
    fn target(&self) -> String;

    async fn upload(&self, payload: &[u8]) -> Result<()>;
}

/// Subscriber notification for a newly discovered case.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, case: &Case) -> Result<()>;
}

/// Enricher used when no completion service is configured.
pub struct DisabledEnricher;

#[async_trait]
impl Enricher for DisabledEnricher {
    async fn enrich(&self, _case: &Case) -> Option<Enrichment> {
        None
    }
}

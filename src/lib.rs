//! # amber-sync
//!
//! Periodic sync of a public missing-children alert feed for one region.
//!
//! Each run fetches the feed, keeps the alerts whose location falls inside
//! the configured region, gives every case a stable public id, scrapes and
//! enriches cases the first time they are seen, and publishes the merged
//! list as a JSON artifact: written locally, replicated to blob storage,
//! and announced to subscribers through a push-notification endpoint.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌──────────┐   ┌───────────────┐   ┌─────────────┐
//! │   Feed   │──▶│  Region  │──▶│  Identifier   │──▶│ Detail page │
//! │ RSS/XML  │   │  filter  │   │    store      │   │  + enrich   │
//! └──────────┘   └──────────┘   └───────────────┘   └──────┬──────┘
//!                                                          │
//!                     ┌────────────────────────────────────┘
//!                     ▼
//!              ┌─────────────┐   ┌──────────────┐   ┌──────────┐
//!              │ merge, sort │──▶│ fingerprint  │──▶│  write   │──▶ upload, notify
//!              └─────────────┘   └──────────────┘   └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! amber-sync status                 # which stages are configured
//! amber-sync sync --dry-run         # assemble without publishing
//! amber-sync sync                   # full run
//! amber-sync cases --new-only       # cases first seen in the last run
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration and credentials |
//! | [`models`] | Feed records, cases, and the persisted artifact |
//! | [`feed`] | Feed fetch and RSS parsing |
//! | [`region`] | Place → region lookup |
//! | [`ids`] | Stable public identifiers |
//! | [`detail`] | Detail page scraping |
//! | [`markup`] | Tag stripping for untrusted HTML |
//! | [`enrich`] | Chat-completion enrichment |
//! | [`merge`] | Case assembly, copy-forward, ordering |
//! | [`fingerprint`] | Change detection |
//! | [`store`] | Atomic local persistence |
//! | [`upload`] | Blob storage replica |
//! | [`notify`] | Push notifications |
//! | [`pipeline`] | The sync run |
//! | [`traits`] | Seams for the network stages |

pub mod cases;
pub mod config;
pub mod detail;
pub mod enrich;
pub mod feed;
pub mod fingerprint;
pub mod http;
pub mod ids;
pub mod logging;
pub mod markup;
pub mod merge;
pub mod models;
pub mod notify;
pub mod pipeline;
pub mod region;
pub mod sources;
pub mod store;
pub mod traits;
pub mod upload;

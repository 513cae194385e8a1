//! The sync run: feed → region → ids → details → enrichment → merge →
//! change detection → write → upload → notify.
//!
//! # Run Lifecycle
//!
//! ```text
//! load previous ──▶ fetch feed ──(empty)──▶ error, nothing touched
//!                        │
//!                        ▼
//!        for each in-region record, in feed order:
//!          known sourceId with stored case ──▶ carry_forward
//!          otherwise ──▶ details (paced) ──▶ contact fallback ──▶ enrich
//!                        │
//!                        ▼
//!        append stored cases absent from the feed, sort
//!                        │
//!                        ▼
//!        fingerprint unchanged and nothing new ──▶ done
//!                        │
//!                        ▼
//!        write_atomic ──▶ upload (optional) ──▶ notify new cases (optional)
//! ```
//!
//! Every collaborator sits behind a trait from [`crate::traits`], so tests
//! drive the whole run with in-memory fakes. Only two failures end a run
//! with an error: an empty feed and a failed local write. Everything else
//! degrades to a warning.

use anyhow::{bail, Context, Result};
use chrono::Utc;
use std::collections::{HashMap, HashSet};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::detail::HttpDetailSource;
use crate::enrich::ChatCompletionEnricher;
use crate::feed::HttpFeed;
use crate::fingerprint::{needs_publish, Fingerprint};
use crate::ids::IdentifierStore;
use crate::logging::sanitize;
use crate::merge;
use crate::models::{Case, SyncArtifact};
use crate::notify::HttpNotifier;
use crate::region::RegionFilter;
use crate::store;
use crate::traits::{
    ArtifactUploader, DetailSource, DisabledEnricher, Enricher, FeedSource, Notifier,
};
use crate::upload::BlobUploader;

#[derive(Debug, Clone, Copy, Default)]
pub struct SyncOptions {
    /// Assemble and report, but never write, upload or notify.
    pub dry_run: bool,
}

/// What one run did.
#[derive(Debug, Clone, Default)]
pub struct SyncReport {
    pub feed_items: usize,
    pub in_region: usize,
    pub new_cases: usize,
    /// Cases with a known id but no stored record, rebuilt from scratch.
    pub repaired: usize,
    /// Stored cases absent from this feed, kept as they were.
    pub retained: usize,
    pub total_cases: usize,
    pub changed: bool,
    pub written: bool,
    pub uploaded: bool,
    pub notified: usize,
    pub notify_failures: usize,
    pub fingerprint: String,
}

pub struct Pipeline {
    config: Config,
    region: RegionFilter,
    feed: Box<dyn FeedSource>,
    details: Box<dyn DetailSource>,
    enricher: Box<dyn Enricher>,
    uploader: Option<Box<dyn ArtifactUploader>>,
    notifier: Option<Box<dyn Notifier>>,
}

impl Pipeline {
    /// A pipeline with explicit feed, detail and enrichment stages and no
    /// upload or notification.
    pub fn new(
        config: &Config,
        feed: Box<dyn FeedSource>,
        details: Box<dyn DetailSource>,
        enricher: Box<dyn Enricher>,
    ) -> Self {
        Self {
            config: config.clone(),
            region: RegionFilter::from_config(&config.region),
            feed,
            details,
            enricher,
            uploader: None,
            notifier: None,
        }
    }

    pub fn with_uploader(mut self, uploader: Box<dyn ArtifactUploader>) -> Self {
        self.uploader = Some(uploader);
        self
    }

    pub fn with_notifier(mut self, notifier: Box<dyn Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// HTTP-backed stages from configuration. Upload and notification are
    /// left out when their credentials are absent or unusable.
    pub fn from_config(config: &Config) -> Result<Self> {
        let feed = HttpFeed::new(&config.feed)?;
        let details = HttpDetailSource::new(&config.detail)?;

        let enricher: Box<dyn Enricher> = match config.credentials.llm_api_key {
            Some(ref key) if config.enrichment_active() => {
                Box::new(ChatCompletionEnricher::new(&config.enrichment, key)?)
            }
            _ => {
                info!("enrichment disabled");
                Box::new(DisabledEnricher)
            }
        };

        let mut pipeline = Self::new(config, Box::new(feed), Box::new(details), enricher);

        match config.storage_target().map(|(storage, key)| BlobUploader::new(storage, key)) {
            Some(Ok(uploader)) => pipeline = pipeline.with_uploader(Box::new(uploader)),
            Some(Err(e)) => warn!(
                error = %sanitize(&format!("{:#}", e)),
                "blob upload disabled for this run"
            ),
            None => info!("blob upload not configured"),
        }

        match config.notify_target().map(|(notify, key)| HttpNotifier::new(notify, key)) {
            Some(Ok(notifier)) => pipeline = pipeline.with_notifier(Box::new(notifier)),
            Some(Err(e)) => warn!(
                error = %sanitize(&format!("{:#}", e)),
                "notifications disabled for this run"
            ),
            None => info!("notifications not configured"),
        }

        Ok(pipeline)
    }

    pub async fn run(&self, options: SyncOptions) -> Result<SyncReport> {
        let now = Utc::now();
        let output = &self.config.output.path;
        let previous = store::load_previous(output);

        let records = self.feed.fetch().await;
        if records.is_empty() {
            bail!(
                "feed returned no items; leaving {} untouched",
                output.display()
            );
        }

        let mut report = SyncReport {
            feed_items: records.len(),
            ..Default::default()
        };

        let mut ids = IdentifierStore::from_artifact(&self.config.ids.prefix, previous.as_ref());
        let stored: HashMap<&str, &Case> = previous
            .iter()
            .flat_map(|p| p.cases.iter())
            .map(|c| (c.source_id.as_str(), c))
            .collect();

        let mut seen: HashSet<String> = HashSet::new();
        let mut cases: Vec<Case> = Vec::new();
        let mut new_ids: Vec<String> = Vec::new();
        let mut detail_fetches = 0usize;

        for raw in &records {
            let Some(source_id) = raw.source_id() else {
                debug!(title = %sanitize(&raw.title), "item has no guid or link; skipped");
                continue;
            };
            let Some(city) = raw.missing_city.as_deref() else {
                continue;
            };
            let Some(region) = self.region.resolve(city, raw.missing_state.as_deref()) else {
                continue;
            };
            if !seen.insert(source_id.clone()) {
                debug!(source_id = %sanitize(&source_id), "duplicate item in feed; keeping first");
                continue;
            }
            report.in_region += 1;

            let (id, minted) = ids.issue_or_get(&source_id);
            let fresh = merge::case_from_record(
                raw,
                &source_id,
                &id,
                region,
                self.config.region.state.as_deref(),
                now,
            );

            if let Some(prev) = stored.get(source_id.as_str()) {
                cases.push(merge::carry_forward(fresh, prev));
                continue;
            }

            let case = self.assemble_new(fresh, &source_id, detail_fetches).await;
            detail_fetches += 1;

            if minted {
                info!(case_id = %case.id, name = %sanitize(&case.name), "new case");
                new_ids.push(case.id.clone());
            } else {
                info!(case_id = %case.id, "rebuilt case with known id and no stored record");
                report.repaired += 1;
            }
            cases.push(case);
        }

        if let Some(ref prev) = previous {
            for case in &prev.cases {
                if !seen.contains(&case.source_id) {
                    cases.push(case.clone());
                    report.retained += 1;
                }
            }
        }

        merge::sort_cases(&mut cases);
        report.new_cases = new_ids.len();
        report.total_cases = cases.len();

        let next = Fingerprint::of(&cases)?;
        let prev_fp = previous
            .as_ref()
            .map(|p| Fingerprint::of(&p.cases))
            .transpose()?;
        report.fingerprint = next.short();

        if !needs_publish(prev_fp.as_ref(), &next, new_ids.len()) {
            info!(fingerprint = %report.fingerprint, "no changes since last sync");
            return Ok(report);
        }
        report.changed = true;

        if options.dry_run {
            info!("dry run; skipping write, upload and notify");
            return Ok(report);
        }

        let artifact = SyncArtifact {
            cases,
            id_map: ids.to_map(),
            last_sync: now,
            total_in_region_source: report.feed_items,
            total_filtered: report.in_region,
            new_cases_this_sync: new_ids.len(),
        };
        let bytes = serde_json::to_vec_pretty(&artifact)?;

        let path = output.clone();
        let payload = bytes.clone();
        tokio::task::spawn_blocking(move || store::write_atomic(&path, &payload))
            .await
            .context("write task panicked")?
            .with_context(|| format!("Failed to write {}", output.display()))?;
        report.written = true;
        info!(path = %output.display(), cases = artifact.cases.len(), "artifact written");

        if let Some(ref uploader) = self.uploader {
            match uploader.upload(&bytes).await {
                Ok(()) => {
                    report.uploaded = true;
                    info!(blob = %uploader.target(), "artifact uploaded");
                }
                Err(e) => warn!(
                    blob = %uploader.target(),
                    error = %sanitize(&format!("{:#}", e)),
                    "upload failed; local artifact is still current"
                ),
            }
        }

        if let Some(ref notifier) = self.notifier {
            for id in &new_ids {
                let Some(case) = artifact.cases.iter().find(|c| &c.id == id) else {
                    continue;
                };
                match notifier.notify(case).await {
                    Ok(()) => report.notified += 1,
                    Err(e) => {
                        report.notify_failures += 1;
                        warn!(
                            case_id = %case.id,
                            error = %sanitize(&format!("{:#}", e)),
                            "notification failed"
                        );
                    }
                }
            }
        }

        Ok(report)
    }

    /// Details, contact fallback and enrichment for a case seen for the
    /// first time. Consecutive detail fetches are spaced by `detail.delay_ms`.
    async fn assemble_new(&self, mut case: Case, source_id: &str, fetches_so_far: usize) -> Case {
        if fetches_so_far > 0 && self.config.detail.delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(self.config.detail.delay_ms)).await;
        }

        let details = self.details.fetch_details(source_id).await;
        merge::apply_details(&mut case, details, &self.config);

        let enrichment = self.enricher.enrich(&case).await;
        merge::apply_enrichment(&mut case, enrichment);
        case
    }
}

/// Run one sync from configuration and print the summary to stdout.
pub async fn run_sync(config: &Config, dry_run: bool) -> Result<SyncReport> {
    let pipeline = Pipeline::from_config(config)?;
    let report = pipeline.run(SyncOptions { dry_run }).await?;
    print_report(&report, dry_run);
    Ok(report)
}

pub fn print_report(report: &SyncReport, dry_run: bool) {
    if dry_run {
        println!("sync (dry-run)");
    } else {
        println!("sync");
    }
    println!("  feed items: {}", report.feed_items);
    println!("  in region: {}", report.in_region);
    println!("  new cases: {}", report.new_cases);
    if report.repaired > 0 {
        println!("  rebuilt cases: {}", report.repaired);
    }
    println!("  retained from previous sync: {}", report.retained);
    println!("  total cases: {}", report.total_cases);
    println!("  fingerprint: {}", report.fingerprint);
    if !report.changed {
        println!("  no changes");
    } else if report.written {
        println!("  written: yes");
        println!("  uploaded: {}", if report.uploaded { "yes" } else { "no" });
        println!(
            "  notifications: {} sent, {} failed",
            report.notified, report.notify_failures
        );
    }
    println!("ok");
}

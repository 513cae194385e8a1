use anyhow::Result;

use crate::config::Config;
use crate::store;

/// One row of `amber-sync status`.
#[derive(Debug, Clone, PartialEq)]
pub struct StageStatus {
    pub stage: &'static str,
    pub status: String,
    pub enabled: bool,
}

pub fn stage_statuses(config: &Config) -> Vec<StageStatus> {
    let mut rows = vec![
        StageStatus {
            stage: "feed",
            status: "OK".to_string(),
            enabled: true,
        },
        StageStatus {
            stage: "region",
            status: format!(
                "{} places{}",
                config.region.places.len(),
                config
                    .region
                    .state
                    .as_deref()
                    .map(|s| format!(" in {}", s))
                    .unwrap_or_default()
            ),
            enabled: true,
        },
        StageStatus {
            stage: "detail",
            status: format!("OK ({} ms between fetches)", config.detail.delay_ms),
            enabled: true,
        },
    ];

    let enrichment = if config.enrichment_active() {
        ("OK", true)
    } else if config.enrichment.is_enabled() {
        ("NOT CONFIGURED (OPENAI_API_KEY unset)", false)
    } else {
        ("DISABLED", false)
    };
    rows.push(StageStatus {
        stage: "enrichment",
        status: enrichment.0.to_string(),
        enabled: enrichment.1,
    });

    let upload = match (&config.storage, config.storage_target()) {
        (None, _) => ("NOT CONFIGURED", false),
        (Some(_), None) => ("NOT CONFIGURED (AZURE_STORAGE_ACCOUNT_KEY unset)", false),
        (Some(_), Some(_)) => ("OK", true),
    };
    rows.push(StageStatus {
        stage: "upload",
        status: upload.0.to_string(),
        enabled: upload.1,
    });

    let notify = match (&config.notify, config.notify_target()) {
        (None, _) => ("NOT CONFIGURED", false),
        (Some(_), None) => ("NOT CONFIGURED (NOTIFY_FUNCTION_KEY unset)", false),
        (Some(_), Some(_)) => ("OK", true),
    };
    rows.push(StageStatus {
        stage: "notify",
        status: notify.0.to_string(),
        enabled: notify.1,
    });

    rows
}

pub fn show_status(config: &Config) -> Result<()> {
    println!("{:<12} {:<8} STATUS", "STAGE", "ENABLED");
    for row in stage_statuses(config) {
        println!("{:<12} {:<8} {}", row.stage, row.enabled, row.status);
    }

    println!();
    let path = &config.output.path;
    match store::load_previous(path) {
        Some(artifact) => {
            println!("artifact: {}", path.display());
            println!("  last sync: {}", artifact.last_sync.to_rfc3339());
            println!("  cases: {}", artifact.cases.len());
            println!("  ids issued: {}", artifact.id_map.len());
            println!("  feed items last sync: {}", artifact.total_in_region_source);
            println!("  in region last sync: {}", artifact.total_filtered);
            println!("  new last sync: {}", artifact.new_cases_this_sync);
        }
        None => println!("artifact: {} (not yet written)", path.display()),
    }

    Ok(())
}

//! Push notifications for newly discovered cases.
//!
//! One `POST <endpoint>?code=<key>` per case. The body follows the dispatch
//! function's contract:
//!
//! ```json
//! {
//!   "notification": {
//!     "title": "Missing child: Jane Doe",
//!     "body": "Jane Doe, 15, missing from Phoenix since 2025-08-01.",
//!     "data": {"type": "missing_child", "tag": "missing-children", "url": "...", "caseId": "MC-ABC123"}
//!   },
//!   "tags": ["missing-children"]
//! }
//! ```

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde_json::{json, Value};

use crate::config::NotifyConfig;
use crate::http;
use crate::models::Case;
use crate::traits::Notifier;

pub struct HttpNotifier {
    config: NotifyConfig,
    function_key: String,
    client: reqwest::Client,
}

impl HttpNotifier {
    pub fn new(config: &NotifyConfig, function_key: &str) -> Result<Self> {
        Ok(Self {
            config: config.clone(),
            function_key: function_key.to_string(),
            client: http::client(config.timeout_secs)?,
        })
    }

    pub fn payload(&self, case: &Case) -> Value {
        notification_payload(case, &self.config)
    }
}

#[async_trait]
impl Notifier for HttpNotifier {
    async fn notify(&self, case: &Case) -> Result<()> {
        let resp = self
            .client
            .post(&self.config.endpoint)
            .query(&[("code", self.function_key.as_str())])
            .json(&self.payload(case))
            .send()
            .await
            .with_context(|| format!("Failed to send notification for {}", case.id))?;

        let status = resp.status();
        if !status.is_success() {
            let excerpt = http::body_excerpt(resp).await;
            bail!("notification endpoint returned {}: {}", status, excerpt);
        }
        Ok(())
    }
}

/// Display name: the model's normalized form when present, else the feed name.
fn display_name(case: &Case) -> &str {
    case.normalized_name.as_deref().unwrap_or(&case.name)
}

pub fn notification_title(case: &Case) -> String {
    format!("Missing child: {}", display_name(case))
}

pub fn notification_body(case: &Case) -> String {
    let mut body = display_name(case).to_string();
    if let Some(age) = case.age {
        body.push_str(&format!(", {}", age));
    }
    if !case.missing_from.city.is_empty() {
        body.push_str(&format!(", missing from {}", case.missing_from.city));
    } else {
        body.push_str(", missing");
    }
    if let Some(ref date) = case.missing_date {
        body.push_str(&format!(" since {}", date));
    }
    body.push('.');
    body
}

pub fn deep_link(case: &Case, config: &NotifyConfig) -> Option<String> {
    match config.deep_link_base {
        Some(ref base) => Some(format!(
            "{}/{}",
            base.trim_end_matches('/'),
            http::uri_encode(&case.id)
        )),
        None => case.poster_url.clone(),
    }
}

pub fn notification_payload(case: &Case, config: &NotifyConfig) -> Value {
    let tag = config.tags.first().cloned().unwrap_or_default();
    json!({
        "notification": {
            "title": notification_title(case),
            "body": notification_body(case),
            "data": {
                "type": "missing_child",
                "tag": tag,
                "url": deep_link(case, config),
                "caseId": case.id,
            }
        },
        "tags": config.tags,
    })
}

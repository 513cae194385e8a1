//! LLM enrichment for first-sighting cases.
//!
//! Sends one chat-completion request per new case and expects the model to
//! answer with a single JSON object:
//!
//! ```json
//! {"summary": "...", "caseType": "Runaway", "lastSeenWearing": "...", "normalizedName": "Jane Doe"}
//! ```
//!
//! Models sometimes wrap the object in prose or code fences, so the first
//! balanced `{...}` substring is extracted before parsing.
//!
//! # Failure handling
//!
//! Every failure collapses to `None`: non-2xx status, timeout, transport
//! error, missing `choices[0].message.content`, no JSON object, invalid
//! JSON. The pipeline then leaves `caseType = "Missing"` and
//! `enrichedByLlm = false`.
//!
//! # Retry Strategy
//!
//! - HTTP 429 and 5xx → retry with exponential backoff (1s, 2s, 4s, ...)
//! - other non-2xx → give up immediately
//! - network errors and timeouts → retry
//!
//! Attempts are capped at `enrichment.max_retries + 1`.

use std::time::Duration;

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use tracing::{debug, warn};

use crate::config::EnrichmentConfig;
use crate::http;
use crate::logging::sanitize;
use crate::models::{Case, Enrichment};
use crate::traits::Enricher;

/// Longest summary kept; the model is asked for two sentences.
const MAX_SUMMARY_CHARS: usize = 600;

/// Chat-completion client for an OpenAI-compatible endpoint.
pub struct ChatCompletionEnricher {
    config: EnrichmentConfig,
    model: String,
    api_key: String,
    client: reqwest::Client,
}

impl ChatCompletionEnricher {
    pub fn new(config: &EnrichmentConfig, api_key: &str) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow!("enrichment.model required for the completion provider"))?;
        Ok(Self {
            config: config.clone(),
            model,
            api_key: api_key.to_string(),
            client: http::client(config.timeout_secs)?,
        })
    }

    async fn complete(&self, prompt: &str) -> Result<String> {
        let body = serde_json::json!({
            "model": self.model,
            "messages": [{"role": "user", "content": prompt}],
            "temperature": self.config.temperature,
            "max_tokens": self.config.max_tokens,
        });

        let mut last_err = None;

        for attempt in 0..=self.config.max_retries {
            if attempt > 0 {
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                tokio::time::sleep(delay).await;
            }

            let resp = self
                .client
                .post(&self.config.endpoint)
                .bearer_auth(&self.api_key)
                .json(&body)
                .send()
                .await;

            match resp {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        let json: serde_json::Value = response.json().await?;
                        return message_content(&json);
                    }

                    let excerpt = http::body_excerpt(response).await;
                    if status.as_u16() == 429 || status.is_server_error() {
                        last_err = Some(anyhow!("completion API error {}: {}", status, excerpt));
                        continue;
                    }

                    bail!("completion API error {}: {}", status, excerpt);
                }
                Err(e) => {
                    last_err = Some(e.into());
                    continue;
                }
            }
        }

        Err(last_err.unwrap_or_else(|| anyhow!("completion failed after retries")))
    }
}

#[async_trait]
impl Enricher for ChatCompletionEnricher {
    async fn enrich(&self, case: &Case) -> Option<Enrichment> {
        let prompt = build_prompt(case);
        let content = match self.complete(&prompt).await {
            Ok(c) => c,
            Err(e) => {
                warn!(
                    case_id = %case.id,
                    error = %sanitize(&e.to_string()),
                    "enrichment request failed"
                );
                return None;
            }
        };

        match parse_enrichment(&content) {
            Some(enrichment) => {
                debug!(case_id = %case.id, "enrichment parsed");
                Some(enrichment)
            }
            None => {
                warn!(
                    case_id = %case.id,
                    response = %sanitize(&content),
                    "enrichment response had no usable JSON object"
                );
                None
            }
        }
    }
}

/// `choices[0].message.content` from a chat-completion response.
fn message_content(json: &serde_json::Value) -> Result<String> {
    json.pointer("/choices/0/message/content")
        .and_then(|c| c.as_str())
        .map(str::to_string)
        .ok_or_else(|| anyhow!("completion response missing choices[0].message.content"))
}

/// Prompt for one case. Only fields already known are included.
pub fn build_prompt(case: &Case) -> String {
    let mut facts = Vec::new();
    facts.push(format!("Name: {}", case.name));
    if let Some(age) = case.age {
        facts.push(format!("Age: {}", age));
    }
    if let Some(ref date) = case.missing_date {
        facts.push(format!("Missing since: {}", date));
    }
    facts.push(format!(
        "Missing from: {}, {}",
        case.missing_from.city, case.missing_from.state_or_province
    ));
    if let Some(ref physical) = case.physical {
        let parts: Vec<String> = [
            ("Sex", &physical.sex),
            ("Race", &physical.race),
            ("Height", &physical.height),
            ("Weight", &physical.weight),
            ("Hair", &physical.hair_color),
            ("Eyes", &physical.eye_color),
        ]
        .iter()
        .filter_map(|&(label, v)| v.as_ref().map(|v| format!("{}: {}", label, v)))
        .collect();
        if !parts.is_empty() {
            facts.push(parts.join(", "));
        }
    }
    if let Some(ref circumstances) = case.circumstances {
        facts.push(format!("Circumstances: {}", circumstances));
    }

    format!(
        "You are normalizing a public missing-child alert for a community information site.\n\
         Respond with ONLY a JSON object and no other text, with these keys:\n\
         - \"summary\": two plain sentences describing the case, no speculation\n\
         - \"caseType\": one of \"Missing\", \"Endangered Missing\", \"Runaway\", \"Family Abduction\", \"Non-Family Abduction\", \"Lost, Injured, Otherwise Missing\"\n\
         - \"lastSeenWearing\": clothing description from the circumstances, or null\n\
         - \"normalizedName\": the person's name in normal capitalization\n\n\
         Alert:\n{}",
        facts.join("\n")
    )
}

/// Parse the first JSON object in `content` into an [`Enrichment`].
///
/// Blank strings are treated as absent; an object with no usable field at
/// all is a failure.
pub fn parse_enrichment(content: &str) -> Option<Enrichment> {
    let object = first_json_object(content)?;
    let raw: Enrichment = serde_json::from_str(object).ok()?;

    let clean = |v: Option<String>| {
        v.map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty() && !s.eq_ignore_ascii_case("null"))
    };
    let enrichment = Enrichment {
        summary: clean(raw.summary).map(|s| s.chars().take(MAX_SUMMARY_CHARS).collect()),
        case_type: clean(raw.case_type),
        last_seen_wearing: clean(raw.last_seen_wearing),
        normalized_name: clean(raw.normalized_name),
    };

    if enrichment == Enrichment::default() {
        None
    } else {
        Some(enrichment)
    }
}

/// First balanced `{ ... }` substring, skipping braces inside JSON strings.
pub fn first_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, c) in text[start..].char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Contact, MissingFrom, DEFAULT_CASE_TYPE};
    use chrono::Utc;

    fn case() -> Case {
        Case {
            id: "MC-ABC123".into(),
            source_id: "2041".into(),
            name: "JANE DOE".into(),
            age: Some(15),
            missing_date: Some("2025-08-01".into()),
            missing_from: MissingFrom {
                city: "Phoenix".into(),
                region: "Maricopa".into(),
                state_or_province: "AZ".into(),
            },
            physical: None,
            date_of_birth: None,
            circumstances: Some("Last seen wearing a red hoodie.".into()),
            contact: Contact::default(),
            summary: None,
            case_type: DEFAULT_CASE_TYPE.into(),
            last_seen_wearing: None,
            normalized_name: None,
            enriched_by_llm: false,
            photo_url: None,
            poster_url: None,
            synced_at: Utc::now(),
        }
    }

    #[test]
    fn extracts_object_from_wrapping_text() {
        let content = "Sure! Here is the JSON:\n```json\n{\"summary\": \"A {curly} case.\", \"caseType\": \"Runaway\"}\n```\nHope that helps {not json}";
        let obj = first_json_object(content).unwrap();
        assert!(obj.starts_with('{') && obj.ends_with('}'));
        let e = parse_enrichment(content).unwrap();
        assert_eq!(e.summary.as_deref(), Some("A {curly} case."));
        assert_eq!(e.case_type.as_deref(), Some("Runaway"));
        assert!(e.last_seen_wearing.is_none());
    }

    #[test]
    fn nested_objects_are_balanced() {
        let text = r#"x {"a": {"b": "}"}, "c": 1} y"#;
        assert_eq!(first_json_object(text), Some(r#"{"a": {"b": "}"}, "c": 1}"#));
    }

    #[test]
    fn no_object_or_bad_json_is_none() {
        assert!(parse_enrichment("I cannot help with that.").is_none());
        assert!(parse_enrichment("{summary: unquoted}").is_none());
        assert!(parse_enrichment("{\"summary\": \"unterminated").is_none());
    }

    #[test]
    fn blank_fields_are_absent() {
        let e = parse_enrichment(
            r#"{"summary": "Two sentences.", "caseType": " ", "lastSeenWearing": "null", "normalizedName": "Jane Doe"}"#,
        )
        .unwrap();
        assert!(e.case_type.is_none());
        assert!(e.last_seen_wearing.is_none());
        assert_eq!(e.normalized_name.as_deref(), Some("Jane Doe"));
    }

    #[test]
    fn empty_object_is_failure() {
        assert!(parse_enrichment("{}").is_none());
    }

    #[test]
    fn prompt_includes_known_facts() {
        let prompt = build_prompt(&case());
        assert!(prompt.contains("Name: JANE DOE"));
        assert!(prompt.contains("Age: 15"));
        assert!(prompt.contains("Missing from: Phoenix, AZ"));
        assert!(prompt.contains("red hoodie"));
        assert!(prompt.contains("ONLY a JSON object"));
    }

    #[test]
    fn reads_message_content() {
        let json = serde_json::json!({"choices": [{"message": {"role": "assistant", "content": "{}"}}]});
        assert_eq!(message_content(&json).unwrap(), "{}");
        assert!(message_content(&serde_json::json!({"choices": []})).is_err());
    }
}

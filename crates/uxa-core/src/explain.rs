//! On-demand plain-language explanations for violations and audit items.
//!
//! Explanations are requested one item at a time by an explicit user action
//! and are never part of a scan. Each item moves through
//! `Unrequested -> Pending -> Resolved | Failed`; a failed item can be
//! requested again, a resolved one is served from the book.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use anyhow::{anyhow, Context};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::{ScanReport, Violation};

/// Text shown when an explanation could not be produced.
pub const EXPLANATION_UNAVAILABLE: &str = "Explanation unavailable.";

/// Identifies the item an explanation belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum ExplanationKey {
    /// Accessibility violation, by rule id.
    Violation(String),
    /// Secondary audit item, by audit id.
    AuditItem(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "text", rename_all = "snake_case")]
pub enum ExplanationState {
    #[default]
    Unrequested,
    Pending,
    Resolved(String),
    /// Carries the placeholder shown instead of an explanation.
    Failed(String),
}

/// External summarisation service.
#[async_trait]
pub trait ExplanationService: Send + Sync {
    async fn explain(&self, prompt: &str) -> anyhow::Result<String>;
}

/// Prompt sent for one item.
pub fn explanation_prompt(text: &str) -> String {
    format!(
        "Explain this web accessibility or quality issue to a developer. \
State in one sentence what it means, then give one or two practical points on how to fix it. \
Use at most 50 words.\n\nIssue: {text}"
    )
}

/// Text describing a violation: long description, else help, else rule id.
pub fn violation_text(violation: &Violation) -> &str {
    [violation.description.as_str(), violation.help.as_str()]
        .into_iter()
        .find(|s| !s.trim().is_empty())
        .unwrap_or(violation.id.as_str())
}

/// Title and description of a secondary audit item from the engine's raw report.
pub fn audit_item_text(report: &ScanReport, audit_id: &str) -> Option<String> {
    let item = report.secondary_audit().raw.as_ref()?.get("audits")?.get(audit_id)?;
    let title = item.get("title").and_then(|t| t.as_str()).unwrap_or(audit_id);
    match item.get("description").and_then(|d| d.as_str()) {
        Some(desc) if !desc.trim().is_empty() => Some(format!("{title}: {desc}")),
        _ => Some(title.to_string()),
    }
}

/// Per-item explanation state, independent of the scan lifecycle.
#[derive(Debug, Default)]
pub struct ExplanationBook {
    entries: Mutex<HashMap<ExplanationKey, ExplanationState>>,
}

impl ExplanationBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self, key: &ExplanationKey) -> ExplanationState {
        self.entries
            .lock()
            .map(|entries| entries.get(key).cloned().unwrap_or_default())
            .unwrap_or_default()
    }

    fn set(&self, key: &ExplanationKey, state: ExplanationState) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.insert(key.clone(), state);
        }
    }

    /// Request an explanation for `key` unless one is resolved or in flight.
    pub async fn request(
        &self,
        key: ExplanationKey,
        text: &str,
        service: &dyn ExplanationService,
    ) -> ExplanationState {
        {
            let Ok(mut entries) = self.entries.lock() else {
                return ExplanationState::Failed(EXPLANATION_UNAVAILABLE.to_string());
            };
            match entries.get(&key).cloned() {
                Some(state @ ExplanationState::Resolved(_)) | Some(state @ ExplanationState::Pending) => {
                    return state;
                }
                _ => {
                    entries.insert(key.clone(), ExplanationState::Pending);
                }
            }
        }

        let state = match service.explain(&explanation_prompt(text)).await {
            Ok(summary) if !summary.trim().is_empty() => ExplanationState::Resolved(summary.trim().to_string()),
            Ok(_) => ExplanationState::Failed(EXPLANATION_UNAVAILABLE.to_string()),
            Err(e) => {
                tracing::warn!(key = ?key, error = %e, "explanation request failed");
                ExplanationState::Failed(EXPLANATION_UNAVAILABLE.to_string())
            }
        };
        self.set(&key, state.clone());
        state
    }
}

/// Generative Language API settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeminiConfig {
    pub api_key: Option<String>,
    pub model: String,
    pub endpoint: String,
    pub timeout_ms: u64,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            api_key: std::env::var("GEMINI_API_KEY").ok(),
            model: "gemini-2.0-flash".to_string(),
            endpoint: "https://generativelanguage.googleapis.com".to_string(),
            timeout_ms: 20_000,
        }
    }
}

impl GeminiConfig {
    pub fn from_env() -> Self {
        Self::default()
    }

    pub fn with_api_key(mut self, key: &str) -> Self {
        self.api_key = Some(key.to_string());
        self
    }
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
}

#[derive(Debug, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    text: Option<String>,
}

/// First candidate's text from a `generateContent` response.
pub fn parse_generate_response(body: &serde_json::Value) -> anyhow::Result<String> {
    let response: GenerateResponse =
        serde_json::from_value(body.clone()).context("unexpected response shape")?;
    response
        .candidates
        .into_iter()
        .next()
        .and_then(|c| c.content)
        .and_then(|c| c.parts.into_iter().find_map(|p| p.text))
        .ok_or_else(|| anyhow!("response contained no text"))
}

/// Explanation service backed by the Gemini REST API.
pub struct GeminiExplainer {
    config: GeminiConfig,
    http_client: reqwest::Client,
}

impl GeminiExplainer {
    pub fn new(config: GeminiConfig) -> anyhow::Result<Self> {
        let http_client = reqwest::Client::builder()
            .user_agent(concat!("uxa/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .context("failed to create HTTP client")?;
        Ok(Self { config, http_client })
    }

    pub fn from_env() -> anyhow::Result<Self> {
        Self::new(GeminiConfig::from_env())
    }
}

#[async_trait]
impl ExplanationService for GeminiExplainer {
    async fn explain(&self, prompt: &str) -> anyhow::Result<String> {
        let key = self
            .config
            .api_key
            .as_deref()
            .ok_or_else(|| anyhow!("GEMINI_API_KEY is not set"))?;
        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            self.config.endpoint.trim_end_matches('/'),
            self.config.model
        );
        let body = serde_json::json!({
            "contents": [{ "parts": [{ "text": prompt }] }]
        });

        let response = self
            .http_client
            .post(&url)
            .header("x-goog-api-key", key)
            .json(&body)
            .send()
            .await
            .context("explanation request failed")?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            anyhow::bail!("explanation service returned {status}: {text}");
        }

        let value: serde_json::Value = response.json().await.context("invalid JSON from explanation service")?;
        parse_generate_response(&value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fakes::CannedExplainer;
    use serde_json::json;

    fn key() -> ExplanationKey {
        ExplanationKey::Violation("color-contrast".into())
    }

    #[tokio::test]
    async fn test_resolved_is_not_requested_twice() {
        let book = ExplanationBook::new();
        let service = CannedExplainer::new("Text lacks contrast. Darken the foreground colour.");
        assert_eq!(book.state(&key()), ExplanationState::Unrequested);

        let first = book.request(key(), "Elements must meet contrast ratio", &service).await;
        assert!(matches!(first, ExplanationState::Resolved(_)));
        let second = book.request(key(), "Elements must meet contrast ratio", &service).await;
        assert_eq!(first, second);
        assert_eq!(service.calls(), 1);
        assert!(service.prompts()[0].contains("at most 50 words"));
    }

    #[tokio::test]
    async fn test_failure_yields_placeholder_and_can_retry() {
        let book = ExplanationBook::new();
        let failing = CannedExplainer::failing("quota exceeded");
        let state = book.request(key(), "x", &failing).await;
        assert_eq!(state, ExplanationState::Failed(EXPLANATION_UNAVAILABLE.to_string()));

        let ok = CannedExplainer::new("Fixed.");
        let state = book.request(key(), "x", &ok).await;
        assert_eq!(state, ExplanationState::Resolved("Fixed.".into()));
    }

    #[tokio::test]
    async fn test_keys_are_independent() {
        let book = ExplanationBook::new();
        let service = CannedExplainer::new("ok");
        book.request(key(), "x", &service).await;
        assert_eq!(
            book.state(&ExplanationKey::AuditItem("color-contrast".into())),
            ExplanationState::Unrequested
        );
    }

    #[test]
    fn test_parse_generate_response() {
        let body = json!({
            "candidates": [{"content": {"parts": [{"text": "Add alt text."}], "role": "model"}}]
        });
        assert_eq!(parse_generate_response(&body).unwrap(), "Add alt text.");
        assert!(parse_generate_response(&json!({"candidates": []})).is_err());
    }

    #[tokio::test]
    async fn test_missing_key_is_error() {
        let config = GeminiConfig {
            api_key: None,
            ..GeminiConfig::default()
        };
        let explainer = GeminiExplainer::new(config).unwrap();
        let err = explainer.explain("x").await.unwrap_err();
        assert!(err.to_string().contains("GEMINI_API_KEY"));
    }

    #[test]
    fn test_violation_text_fallbacks() {
        let mut v = Violation {
            id: "region".into(),
            impact: crate::domain::Impact::Moderate,
            description: String::new(),
            help: "Content in landmarks".into(),
            help_url: None,
            tags: vec![],
            nodes: vec![],
        };
        assert_eq!(violation_text(&v), "Content in landmarks");
        v.help.clear();
        assert_eq!(violation_text(&v), "region");
    }
}

//! Accessibility audit stage: inject the rule engine, run it, parse its result.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;

use crate::config::{AuditConfig, ConfigError};
use crate::domain::{AuditResult, Impact, RuleCheck, ScanError, Violation, ViolationNode};
use crate::page::RenderablePage;
use crate::scripts;

/// Presentation classes toggled by the client surface on live-page elements.
pub const HIGHLIGHT_STYLES: &str = r#"
.violation-highlight { outline: 3px solid #dc2626 !important; outline-offset: 2px !important; }
.violation-highlight-critical { outline-color: #dc2626 !important; background-color: rgba(220, 38, 38, 0.15) !important; }
.violation-highlight-serious { outline-color: #f59e0b !important; background-color: rgba(245, 158, 11, 0.15) !important; }
.violation-highlight-moderate { outline-color: #3498db !important; background-color: rgba(52, 152, 219, 0.15) !important; }
.violation-highlight-minor { outline-color: #64748b !important; background-color: rgba(100, 116, 139, 0.15) !important; }
"#;

/// Class names applied to an element highlighted for a violation of `impact`.
pub fn highlight_classes(impact: Impact) -> [&'static str; 2] {
    let tier = match impact {
        Impact::Critical => "violation-highlight-critical",
        Impact::Serious => "violation-highlight-serious",
        Impact::Moderate => "violation-highlight-moderate",
        Impact::Minor => "violation-highlight-minor",
    };
    ["violation-highlight", tier]
}

/// Browser bundle of the accessibility rule engine.
#[derive(Clone)]
pub struct AccessibilityEngine {
    source: Arc<str>,
}

impl AccessibilityEngine {
    pub fn from_source(source: impl Into<Arc<str>>) -> Self {
        Self {
            source: source.into(),
        }
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let source = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        if source.trim().is_empty() {
            return Err(ConfigError::Invalid(format!(
                "rule engine source {} is empty",
                path.display()
            )));
        }
        Ok(Self::from_source(source))
    }

    pub fn source(&self) -> &str {
        &self.source
    }
}

impl std::fmt::Debug for AccessibilityEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessibilityEngine")
            .field("source_len", &self.source.len())
            .finish()
    }
}

/// Engine output before impacts are normalised.
#[derive(Debug, Deserialize)]
struct RawAuditResult {
    #[serde(default)]
    violations: Vec<RawViolation>,
    #[serde(default)]
    passes: Vec<RuleCheck>,
    #[serde(default)]
    incomplete: Vec<RuleCheck>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawViolation {
    id: String,
    #[serde(default)]
    impact: Option<Impact>,
    #[serde(default)]
    description: String,
    #[serde(default)]
    help: String,
    #[serde(default)]
    help_url: Option<String>,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(default)]
    nodes: Vec<ViolationNode>,
}

impl From<RawViolation> for Violation {
    fn from(raw: RawViolation) -> Self {
        let impact = raw.impact.unwrap_or_else(|| {
            tracing::debug!(rule = %raw.id, "violation without impact, treating as minor");
            Impact::Minor
        });
        Violation {
            id: raw.id,
            impact,
            description: raw.description,
            help: raw.help,
            help_url: raw.help_url,
            tags: raw.tags,
            nodes: raw.nodes,
        }
    }
}

/// Parse the engine's `{violations, passes, incomplete}` payload.
pub fn parse_audit_payload(value: serde_json::Value) -> Result<AuditResult, serde_json::Error> {
    let raw: RawAuditResult = serde_json::from_value(value)?;
    Ok(AuditResult {
        violations: raw.violations.into_iter().map(Violation::from).collect(),
        passes: raw.passes,
        incomplete: raw.incomplete,
    })
}

/// Inject and execute the rule engine. Any failure is fatal for the scan.
pub async fn run_audit(
    page: &dyn RenderablePage,
    engine: &AccessibilityEngine,
    config: &AuditConfig,
    url: &str,
) -> Result<AuditResult, ScanError> {
    let limit = Duration::from_millis(config.timeout_ms);
    match tokio::time::timeout(limit, execute(page, engine, url)).await {
        Ok(result) => result,
        Err(_) => Err(ScanError::AuditEngineFailure {
            url: url.to_string(),
            reason: format!("rule engine did not finish within {}ms", config.timeout_ms),
        }),
    }
}

async fn execute(
    page: &dyn RenderablePage,
    engine: &AccessibilityEngine,
    url: &str,
) -> Result<AuditResult, ScanError> {
    let failure = |reason: String| ScanError::AuditEngineFailure {
        url: url.to_string(),
        reason,
    };

    page.inject_script(engine.source())
        .await
        .map_err(|e| failure(format!("injection failed: {e}")))?;

    let present = page
        .evaluate(scripts::AUDIT_ENGINE_PROBE)
        .await
        .map_err(|e| failure(format!("engine probe failed: {e}")))?;
    if present != serde_json::Value::Bool(true) {
        return Err(failure("engine global missing after injection".to_string()));
    }

    if let Err(e) = page.inject_style(HIGHLIGHT_STYLES).await {
        tracing::warn!(error = %e, "highlight stylesheet injection failed, continuing");
    }

    let payload = page
        .evaluate(scripts::AUDIT_RUN)
        .await
        .map_err(|e| failure(format!("execution failed: {e}")))?;

    parse_audit_payload(payload).map_err(|e| failure(format!("unexpected engine output: {e}")))
}

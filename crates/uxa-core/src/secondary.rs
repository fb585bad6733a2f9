//! Secondary audit stage: performance / SEO scoring through an external engine.
//!
//! The stage never fails the scan. Engine errors and ceiling timeouts become a
//! degraded [`SecondaryAuditResult`].

use std::process::Stdio;
use std::time::Duration;

use anyhow::{anyhow, bail, Context};
use async_trait::async_trait;
use tokio::process::Command;

use crate::config::SecondaryConfig;
use crate::domain::{AuditCategory, CategoryScores, SecondaryAuditResult};
use crate::page::BrowserEndpoint;

/// Inputs handed to a secondary engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecondaryAuditRequest {
    pub url: String,
    /// Already-launched browser the engine should drive.
    pub endpoint: BrowserEndpoint,
    pub categories: Vec<AuditCategory>,
    pub max_wait_for_fcp_ms: u64,
    pub max_wait_for_load_ms: u64,
}

impl SecondaryAuditRequest {
    pub fn new(url: &str, endpoint: &BrowserEndpoint, config: &SecondaryConfig) -> Self {
        Self {
            url: url.to_string(),
            endpoint: endpoint.clone(),
            categories: AuditCategory::ALL.to_vec(),
            max_wait_for_fcp_ms: config.max_wait_for_fcp_ms,
            max_wait_for_load_ms: config.max_wait_for_load_ms,
        }
    }
}

/// Scores plus the engine's own report.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineReport {
    pub scores: CategoryScores,
    pub raw: serde_json::Value,
}

#[async_trait]
pub trait SecondaryAuditEngine: Send + Sync {
    async fn audit(&self, request: &SecondaryAuditRequest) -> anyhow::Result<EngineReport>;
}

/// Run the engine under the configured ceiling and absorb every failure.
pub async fn run_secondary_audit(
    engine: &dyn SecondaryAuditEngine,
    url: &str,
    endpoint: &BrowserEndpoint,
    config: &SecondaryConfig,
) -> SecondaryAuditResult {
    if !config.enabled {
        return SecondaryAuditResult::skipped();
    }

    let request = SecondaryAuditRequest::new(url, endpoint, config);
    let ceiling = Duration::from_millis(config.ceiling_ms);

    match tokio::time::timeout(ceiling, engine.audit(&request)).await {
        Ok(Ok(report)) => SecondaryAuditResult::completed(report.scores, report.raw),
        Ok(Err(e)) => SecondaryAuditResult::degraded(format!("{e:#}")),
        Err(_) => SecondaryAuditResult::degraded(format!(
            "secondary audit timed out after {}ms",
            config.ceiling_ms
        )),
    }
}

/// Report keys dropped from `raw`; large and unused downstream.
const BULKY_KEYS: [&str; 3] = ["i18n", "timing", "fullPageScreenshot"];

/// Runs the Lighthouse CLI against the shared browser's debugging port.
#[derive(Debug, Clone)]
pub struct LighthouseCli {
    binary: String,
}

impl LighthouseCli {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    pub fn from_config(config: &SecondaryConfig) -> Self {
        Self::new(config.binary.clone())
    }

    pub fn args(request: &SecondaryAuditRequest) -> Vec<String> {
        let categories = request
            .categories
            .iter()
            .map(|c| c.engine_id())
            .collect::<Vec<_>>()
            .join(",");
        vec![
            request.url.clone(),
            format!("--port={}", request.endpoint.debug_port),
            "--output=json".to_string(),
            "--output-path=stdout".to_string(),
            "--quiet".to_string(),
            format!("--only-categories={categories}"),
            "--disable-storage-reset".to_string(),
            "--screenEmulation.disabled".to_string(),
            "--throttling.cpuSlowdownMultiplier=1".to_string(),
            format!("--max-wait-for-fcp={}", request.max_wait_for_fcp_ms),
            format!("--max-wait-for-load={}", request.max_wait_for_load_ms),
        ]
    }

    /// Extract category scores from a Lighthouse JSON report.
    pub fn parse_report(mut report: serde_json::Value) -> anyhow::Result<EngineReport> {
        if let Some(err) = report.get("runtimeError") {
            let code = err.get("code").and_then(|c| c.as_str()).unwrap_or("UNKNOWN");
            let message = err.get("message").and_then(|m| m.as_str()).unwrap_or("");
            bail!("{code}: {message}");
        }

        let score = |category: AuditCategory| -> anyhow::Result<u8> {
            let raw = report
                .pointer(&format!("/categories/{}/score", category.engine_id()))
                .and_then(|s| s.as_f64())
                .ok_or_else(|| anyhow!("no score reported for category '{}'", category.engine_id()))?;
            Ok((raw * 100.0).round().clamp(0.0, 100.0) as u8)
        };

        let scores = CategoryScores {
            performance: score(AuditCategory::Performance)?,
            accessibility: score(AuditCategory::Accessibility)?,
            best_practices: score(AuditCategory::BestPractices)?,
            seo: score(AuditCategory::Seo)?,
        };

        if let Some(obj) = report.as_object_mut() {
            for key in BULKY_KEYS {
                obj.remove(key);
            }
        }

        Ok(EngineReport { scores, raw: report })
    }
}

#[async_trait]
impl SecondaryAuditEngine for LighthouseCli {
    async fn audit(&self, request: &SecondaryAuditRequest) -> anyhow::Result<EngineReport> {
        let output = Command::new(&self.binary)
            .args(Self::args(request))
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .with_context(|| format!("failed to start {}", self.binary))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let tail = stderr.lines().rev().find(|l| !l.trim().is_empty()).unwrap_or("").trim();
            bail!(
                "{} exited with {}: {}",
                self.binary,
                output.status.code().map_or_else(|| "signal".to_string(), |c| c.to_string()),
                tail
            );
        }

        let report: serde_json::Value =
            serde_json::from_slice(&output.stdout).context("engine produced invalid JSON")?;
        Self::parse_report(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::secondary::{SECONDARY_FAILURE_HINT, SECONDARY_FAILURE_MESSAGE};
    use crate::fakes::{FailingSecondaryEngine, StaticSecondaryEngine};
    use serde_json::json;

    fn endpoint() -> BrowserEndpoint {
        BrowserEndpoint {
            ws_url: "ws://127.0.0.1:9222/devtools/browser/abc".to_string(),
            debug_port: 9222,
        }
    }

    fn lighthouse_report() -> serde_json::Value {
        json!({
            "lighthouseVersion": "11.4.0",
            "categories": {
                "performance": {"score": 0.912},
                "accessibility": {"score": 0.88},
                "best-practices": {"score": 1.0},
                "seo": {"score": 0.755}
            },
            "i18n": {"rendererFormattedStrings": {}}
        })
    }

    #[test]
    fn test_parse_report_rounds_scores() {
        let report = LighthouseCli::parse_report(lighthouse_report()).unwrap();
        assert_eq!(report.scores.performance, 91);
        assert_eq!(report.scores.accessibility, 88);
        assert_eq!(report.scores.best_practices, 100);
        assert_eq!(report.scores.seo, 76);
        assert!(report.raw.get("i18n").is_none());
        assert_eq!(report.raw["lighthouseVersion"], "11.4.0");
    }

    #[test]
    fn test_runtime_error_is_engine_error() {
        let err = LighthouseCli::parse_report(json!({
            "runtimeError": {"code": "NO_FCP", "message": "The page did not paint any content."},
            "categories": {}
        }))
        .unwrap_err();
        assert!(err.to_string().starts_with("NO_FCP"));
    }

    #[test]
    fn test_null_score_is_engine_error() {
        let mut report = lighthouse_report();
        report["categories"]["performance"]["score"] = serde_json::Value::Null;
        let err = LighthouseCli::parse_report(report).unwrap_err();
        assert!(err.to_string().contains("performance"));
    }

    #[test]
    fn test_args_target_shared_browser() {
        let request = SecondaryAuditRequest::new("https://example.com/", &endpoint(), &SecondaryConfig::default());
        let args = LighthouseCli::args(&request);
        assert_eq!(args[0], "https://example.com/");
        assert!(args.contains(&"--port=9222".to_string()));
        assert!(args.contains(&"--only-categories=performance,accessibility,best-practices,seo".to_string()));
        assert!(args.contains(&"--max-wait-for-fcp=15000".to_string()));
        assert!(args.contains(&"--max-wait-for-load=30000".to_string()));
    }

    #[tokio::test]
    async fn test_engine_error_degrades() {
        let engine = FailingSecondaryEngine::new("NO_FCP: The page did not paint any content.");
        let result = run_secondary_audit(&engine, "https://example.com/", &endpoint(), &SecondaryConfig::default()).await;
        assert_eq!(result.error.as_deref(), Some(SECONDARY_FAILURE_MESSAGE));
        assert_eq!(result.hint.as_deref(), Some(SECONDARY_FAILURE_HINT));
        assert!(result.details.unwrap().contains("NO_FCP"));
        assert!(result.scores.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_ceiling_timeout_degrades() {
        let engine = StaticSecondaryEngine::hanging();
        let result = run_secondary_audit(&engine, "https://example.com/", &endpoint(), &SecondaryConfig::default()).await;
        assert!(result.is_degraded());
        assert!(result.details.unwrap().contains("timed out after 120000ms"));
    }

    #[tokio::test]
    async fn test_disabled_is_skipped_without_calling_engine() {
        let engine = StaticSecondaryEngine::new(CategoryScores {
            performance: 1,
            accessibility: 2,
            best_practices: 3,
            seo: 4,
        });
        let config = SecondaryConfig {
            enabled: false,
            ..SecondaryConfig::default()
        };
        let result = run_secondary_audit(&engine, "https://example.com/", &endpoint(), &config).await;
        assert!(result.is_degraded());
        assert_eq!(engine.calls(), 0);
    }

    #[tokio::test]
    async fn test_missing_binary_degrades() {
        let engine = LighthouseCli::new("uxa-definitely-not-installed");
        let result = run_secondary_audit(&engine, "https://example.com/", &endpoint(), &SecondaryConfig::default()).await;
        assert!(result.details.unwrap().contains("failed to start"));
    }
}

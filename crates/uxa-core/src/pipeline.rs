//! Scan pipeline: the strictly sequential stage runner for one page.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::time::timeout;
use tracing::Instrument;
use uuid::Uuid;

use crate::aggregate::aggregate;
use crate::audit::{run_audit, AccessibilityEngine};
use crate::capture::capture;
use crate::config::ScanConfig;
use crate::domain::{ScanError, ScanReport, ScanRequest};
use crate::heatmap::{correlate, PageGeometry};
use crate::interception::{InterceptPolicy, RequestFilter};
use crate::metrics::METRICS;
use crate::navigation::navigate;
use crate::obs;
use crate::page::{BrowserSession, PageError};
use crate::secondary::{run_secondary_audit, SecondaryAuditEngine};
use crate::stabilizer::stabilize;

fn elapsed_ms(since: Instant) -> u64 {
    since.elapsed().as_millis() as u64
}

/// Runs interception, navigation, stabilization, capture, audit, correlation
/// and the secondary audit against one browser session, then aggregates.
pub struct ScanPipeline {
    config: ScanConfig,
    engine: AccessibilityEngine,
    secondary: Arc<dyn SecondaryAuditEngine>,
    policy: Arc<InterceptPolicy>,
}

impl ScanPipeline {
    pub fn new(
        config: ScanConfig,
        engine: AccessibilityEngine,
        secondary: Arc<dyn SecondaryAuditEngine>,
    ) -> Self {
        Self {
            config,
            engine,
            secondary,
            policy: Arc::new(InterceptPolicy::standard()),
        }
    }

    pub fn with_policy(mut self, policy: InterceptPolicy) -> Self {
        self.policy = Arc::new(policy);
        self
    }

    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    /// Produce exactly one report, or the fatal error that prevented it.
    pub async fn run(
        &self,
        request: &ScanRequest,
        session: &dyn BrowserSession,
    ) -> Result<ScanReport, ScanError> {
        let scan_id = Uuid::new_v4();
        let id = scan_id.to_string();
        let started = Instant::now();

        METRICS.inc_scans_started();
        obs::emit_scan_started(&id, request.url());

        let result = self
            .execute(scan_id, &id, request, session)
            .instrument(obs::scan_span(&id, request.url()))
            .await;

        match &result {
            Ok(report) => {
                METRICS.inc_scans_completed();
                obs::emit_scan_finished(
                    &id,
                    elapsed_ms(started),
                    report.audit().violations.len(),
                    report.heatmap().len(),
                );
            }
            Err(e) => {
                METRICS.inc_scans_failed();
                obs::emit_scan_failed(&id, e.kind(), e);
            }
        }
        result
    }

    async fn execute(
        &self,
        scan_id: Uuid,
        id: &str,
        request: &ScanRequest,
        session: &dyn BrowserSession,
    ) -> Result<ScanReport, ScanError> {
        let page = session.page();
        let url = request.url();

        let filter: Arc<dyn RequestFilter> = self.policy.clone();
        let install_limit = self.config.navigation.intercept_install_timeout_ms;
        let install = page.intercept_requests(filter);
        let installed = match timeout(Duration::from_millis(install_limit), install).await {
            Ok(result) => result,
            Err(_) => Err(PageError::Timeout {
                operation: "request interception install".to_string(),
                limit_ms: install_limit,
            }),
        };
        installed.map_err(|e| ScanError::Session {
            url: url.to_string(),
            reason: format!("failed to install request interception: {e}"),
        })?;

        let t = Instant::now();
        let nav = navigate(page, url, &self.config.navigation).await?;
        if nav.fell_back {
            METRICS.inc_navigation_fallbacks();
            obs::emit_navigation_fallback(id, nav.strict_error.as_deref().unwrap_or("unknown"));
        }
        obs::emit_stage_completed(id, "navigate", elapsed_ms(t));

        let t = Instant::now();
        stabilize(page, &self.config.stabilizer).await;
        obs::emit_stage_completed(id, "stabilize", elapsed_ms(t));

        let t = Instant::now();
        let capture = capture(page, &self.config.capture, url).await?;
        obs::emit_stage_completed(id, "capture", elapsed_ms(t));

        let t = Instant::now();
        let audit = run_audit(page, &self.engine, &self.config.audit, url).await?;
        obs::emit_stage_completed(id, "audit", elapsed_ms(t));

        let t = Instant::now();
        let geometry = PageGeometry::new(page, &self.config.correlation);
        let correlation = correlate(&audit, &geometry).await;
        METRICS.add_heatmap_nodes_dropped(correlation.dropped() as u64);
        obs::emit_heatmap_correlated(id, correlation.points.len(), correlation.dropped());
        obs::emit_stage_completed(id, "correlate", elapsed_ms(t));

        let t = Instant::now();
        let secondary =
            run_secondary_audit(self.secondary.as_ref(), url, session.endpoint(), &self.config.secondary)
                .await;
        if self.config.secondary.enabled && secondary.is_degraded() {
            METRICS.inc_secondary_degraded();
            obs::emit_secondary_degraded(id, secondary.details.as_deref().unwrap_or(""));
        }
        obs::emit_stage_completed(id, "secondary_audit", elapsed_ms(t));

        Ok(aggregate(scan_id, capture, audit, correlation.points, secondary, request))
    }
}

//! Structured observability hooks for the scan lifecycle.
//!
//! Events are emitted at `info!` level (warnings for degradations and
//! failures) with an `event` field, so JSON log consumers can filter on it.

use tracing::info;

/// RAII guard that enters a scan-scoped span for the duration of a scan.
///
/// ```ignore
/// let _span = ScanSpan::enter("5b1c…", "https://example.com/");
/// // every event below carries scan_id and url
/// ```
pub struct ScanSpan {
    _span: tracing::span::EnteredSpan,
}

impl ScanSpan {
    pub fn enter(scan_id: &str, url: &str) -> Self {
        Self {
            _span: scan_span(scan_id, url).entered(),
        }
    }
}

/// The span behind [`ScanSpan`], for instrumenting futures that must stay `Send`.
pub fn scan_span(scan_id: &str, url: &str) -> tracing::Span {
    tracing::info_span!("uxa.scan", scan_id = %scan_id, url = %url)
}

pub fn emit_scan_started(scan_id: &str, url: &str) {
    info!(event = "scan.started", scan_id = %scan_id, url = %url);
}

/// Emit event: one pipeline stage finished.
pub fn emit_stage_completed(scan_id: &str, stage: &str, elapsed_ms: u64) {
    info!(event = "scan.stage_completed", scan_id = %scan_id, stage = %stage, elapsed_ms = elapsed_ms);
}

/// Emit event: strict navigation failed and the relaxed policy was used.
pub fn emit_navigation_fallback(scan_id: &str, strict_error: &str) {
    tracing::warn!(event = "scan.navigation_fallback", scan_id = %scan_id, strict_error = %strict_error);
}

pub fn emit_heatmap_correlated(scan_id: &str, points: usize, dropped: usize) {
    info!(event = "scan.heatmap_correlated", scan_id = %scan_id, points = points, dropped = dropped);
}

pub fn emit_secondary_degraded(scan_id: &str, details: &str) {
    tracing::warn!(event = "scan.secondary_degraded", scan_id = %scan_id, details = %details);
}

/// Emit event: report assembled.
pub fn emit_scan_finished(scan_id: &str, duration_ms: u64, violations: usize, heatmap_points: usize) {
    info!(
        event = "scan.finished",
        scan_id = %scan_id,
        duration_ms = duration_ms,
        violations = violations,
        heatmap_points = heatmap_points,
    );
}

/// Emit event: scan aborted with a fatal error.
pub fn emit_scan_failed(scan_id: &str, kind: &str, error: &dyn std::fmt::Display) {
    tracing::warn!(event = "scan.failed", scan_id = %scan_id, kind = %kind, error = %error);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scan_span_create() {
        let _span = ScanSpan::enter("scan-1", "https://example.com/");
        emit_stage_completed("scan-1", "navigate", 12);
    }
}

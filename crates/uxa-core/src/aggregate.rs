//! Report aggregator.

use uuid::Uuid;

use crate::domain::{AuditResult, HeatmapPoint, PageCapture, ScanReport, ScanRequest, SecondaryAuditResult};

/// Merge stage outputs into the immutable report.
pub fn aggregate(
    scan_id: Uuid,
    capture: PageCapture,
    audit: AuditResult,
    heatmap: Vec<HeatmapPoint>,
    secondary_audit: SecondaryAuditResult,
    request: &ScanRequest,
) -> ScanReport {
    ScanReport::assemble(
        scan_id,
        request.url().to_string(),
        capture.timestamp,
        capture.page_width,
        capture.page_height,
        capture.screenshot,
        audit,
        heatmap,
        secondary_audit,
    )
}

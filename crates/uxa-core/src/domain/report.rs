//! The immutable scan report handed to exporters and clients.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::audit::AuditResult;
use super::heatmap::HeatmapPoint;
use super::scan::Screenshot;
use super::secondary::SecondaryAuditResult;

/// Single artifact produced per scan request.
///
/// Fields are read-only; a report is built once by
/// [`aggregate`](crate::aggregate::aggregate) or read back from JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanReport {
    scan_id: Uuid,
    url: String,
    timestamp: DateTime<Utc>,
    page_width: u32,
    page_height: u32,
    screenshot: Screenshot,
    audit: AuditResult,
    heatmap: Vec<HeatmapPoint>,
    secondary_audit: SecondaryAuditResult,
}

impl ScanReport {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn assemble(
        scan_id: Uuid,
        url: String,
        timestamp: DateTime<Utc>,
        page_width: u32,
        page_height: u32,
        screenshot: Screenshot,
        audit: AuditResult,
        heatmap: Vec<HeatmapPoint>,
        secondary_audit: SecondaryAuditResult,
    ) -> Self {
        Self {
            scan_id,
            url,
            timestamp,
            page_width,
            page_height,
            screenshot,
            audit,
            heatmap,
            secondary_audit,
        }
    }

    pub fn scan_id(&self) -> Uuid {
        self.scan_id
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn page_width(&self) -> u32 {
        self.page_width
    }

    pub fn page_height(&self) -> u32 {
        self.page_height
    }

    pub fn screenshot(&self) -> &Screenshot {
        &self.screenshot
    }

    pub fn audit(&self) -> &AuditResult {
        &self.audit
    }

    pub fn heatmap(&self) -> &[HeatmapPoint] {
        &self.heatmap
    }

    pub fn secondary_audit(&self) -> &SecondaryAuditResult {
        &self.secondary_audit
    }

    /// Parse a report previously written with `serde_json`.
    pub fn from_json(raw: &str) -> serde_json::Result<Self> {
        serde_json::from_str(raw)
    }
}

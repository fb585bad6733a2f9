//! Flat CSV export: one row per violation node.

use uxa_core::ScanReport;

use crate::error::{ExportError, ExportResult};
use crate::{ExportFormat, ReportRenderer};

pub const HEADER: [&str; 5] = ["Impact", "Title", "Description", "Detail", "Selector"];

/// Rows follow the correlator's `violations[].nodes[]` order whether or not
/// the node produced a heatmap point.
#[derive(Debug, Clone, Copy, Default)]
pub struct TabularRenderer;

impl ReportRenderer for TabularRenderer {
    fn format(&self) -> ExportFormat {
        ExportFormat::Csv
    }

    fn render(&self, report: &ScanReport) -> ExportResult<Vec<u8>> {
        let mut writer = csv::Writer::from_writer(Vec::new());
        writer.write_record(HEADER)?;

        for violation in &report.audit().violations {
            for node in &violation.nodes {
                writer.write_record([
                    violation.impact.as_str(),
                    violation.help.as_str(),
                    violation.description.as_str(),
                    node.failure_summary.as_deref().unwrap_or(""),
                    node.primary_selector().unwrap_or(""),
                ])?;
            }
        }

        writer.into_inner().map_err(|e| ExportError::Io(e.into_error()))
    }
}

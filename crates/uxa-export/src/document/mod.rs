//! Paginated PDF export.
//!
//! Layout and painting are split: [`DocumentLayout::build`] decides what goes
//! on which page and is testable without parsing PDF output, `pdf::paint`
//! draws it.

pub mod layout;
mod pdf;

use uxa_core::ScanReport;

pub use layout::{Block, DocumentLayout, LayoutPage, Placed, RgbColor, ScoreDial};

use crate::error::ExportResult;
use crate::{ExportFormat, ReportRenderer};

#[derive(Debug, Clone, Copy, Default)]
pub struct DocumentRenderer;

impl ReportRenderer for DocumentRenderer {
    fn format(&self) -> ExportFormat {
        ExportFormat::Pdf
    }

    fn render(&self, report: &ScanReport) -> ExportResult<Vec<u8>> {
        let layout = DocumentLayout::build(report);
        tracing::debug!(
            scan_id = %report.scan_id(),
            pages = layout.page_count(),
            "document laid out"
        );
        pdf::paint(&layout, report)
    }
}

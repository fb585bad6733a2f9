//! Export renderers for UXability scan reports
//!
//! Both renderers are pure transforms of a [`ScanReport`] into bytes. Callers
//! own transport: the returned [`ExportArtifact`] carries the content type and
//! a suggested file name.

pub mod document;
pub mod error;
pub mod tabular;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uxa_core::ScanReport;

pub use document::{Block, DocumentLayout, DocumentRenderer};
pub use error::{ExportError, ExportResult};
pub use tabular::TabularRenderer;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    /// Paginated document.
    Pdf,
    /// One row per violation node.
    Csv,
}

impl ExportFormat {
    pub fn content_type(&self) -> &'static str {
        match self {
            ExportFormat::Pdf => "application/pdf",
            ExportFormat::Csv => "text/csv",
        }
    }

    pub fn file_name(&self) -> &'static str {
        match self {
            ExportFormat::Pdf => "report.pdf",
            ExportFormat::Csv => "report.csv",
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExportFormat::Pdf => write!(f, "pdf"),
            ExportFormat::Csv => write!(f, "csv"),
        }
    }
}

impl FromStr for ExportFormat {
    type Err = ExportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pdf" => Ok(ExportFormat::Pdf),
            "csv" => Ok(ExportFormat::Csv),
            other => Err(ExportError::UnknownFormat(other.to_string())),
        }
    }
}

/// Rendered bytes plus what a transport needs to deliver them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportArtifact {
    pub bytes: Vec<u8>,
    pub content_type: &'static str,
    pub file_name: String,
}

/// A pure `ScanReport -> bytes` transform.
pub trait ReportRenderer {
    fn format(&self) -> ExportFormat;

    fn render(&self, report: &ScanReport) -> ExportResult<Vec<u8>>;
}

/// Render `report` in `format`.
pub fn export(report: &ScanReport, format: ExportFormat) -> ExportResult<ExportArtifact> {
    let renderer: &dyn ReportRenderer = match format {
        ExportFormat::Pdf => &DocumentRenderer,
        ExportFormat::Csv => &TabularRenderer,
    };
    let bytes = renderer.render(report)?;
    tracing::info!(
        event = "report.exported",
        scan_id = %report.scan_id(),
        format = %format,
        bytes = bytes.len(),
    );
    Ok(ExportArtifact {
        bytes,
        content_type: format.content_type(),
        file_name: format.file_name().to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_parsing() {
        assert_eq!("PDF".parse::<ExportFormat>().unwrap(), ExportFormat::Pdf);
        assert_eq!("csv".parse::<ExportFormat>().unwrap(), ExportFormat::Csv);
        assert!(matches!(
            "xlsx".parse::<ExportFormat>(),
            Err(ExportError::UnknownFormat(_))
        ));
    }

    #[test]
    fn test_content_types() {
        assert_eq!(ExportFormat::Pdf.content_type(), "application/pdf");
        assert_eq!(ExportFormat::Csv.file_name(), "report.csv");
    }
}

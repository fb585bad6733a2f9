//! Export error type.

/// A failed export. The report itself is untouched and can be exported again.
#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("pdf rendering failed: {0}")]
    Pdf(String),

    #[error("csv rendering failed: {0}")]
    Csv(#[from] csv::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("unknown export format '{0}' (expected pdf or csv)")]
    UnknownFormat(String),
}

pub type ExportResult<T> = std::result::Result<T, ExportError>;

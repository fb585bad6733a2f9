//! Scan error taxonomy.
//!
//! Only fatal conditions live here. Degradations (secondary audit failure,
//! stale selectors, unusable screenshots at export time) are recorded inside
//! the report or handled locally and never abort a scan.

use serde::{Deserialize, Serialize};

use crate::config::ConfigError;

/// Errors that abort a scan. No report is produced.
#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    #[error("invalid scan request for '{url}': {reason}")]
    InvalidRequest { url: String, reason: String },

    #[error("navigation to {url} failed: strict load: {strict}; relaxed load: {relaxed}")]
    NavigationFailure {
        url: String,
        strict: String,
        relaxed: String,
    },

    #[error("accessibility engine failed on {url}: {reason}")]
    AuditEngineFailure { url: String, reason: String },

    #[error("page capture failed on {url}: {reason}")]
    CaptureFailure { url: String, reason: String },

    #[error("browser session failed for {url}: {reason}")]
    Session { url: String, reason: String },

    #[error("scan of {url} was cancelled")]
    Cancelled { url: String },

    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
}

impl ScanError {
    /// Stable machine-readable name.
    pub fn kind(&self) -> &'static str {
        match self {
            ScanError::InvalidRequest { .. } => "invalid_request",
            ScanError::NavigationFailure { .. } => "navigation_failure",
            ScanError::AuditEngineFailure { .. } => "audit_engine_failure",
            ScanError::CaptureFailure { .. } => "capture_failure",
            ScanError::Session { .. } => "session_failure",
            ScanError::Cancelled { .. } => "cancelled",
            ScanError::Config(_) => "invalid_config",
        }
    }

    pub fn url(&self) -> Option<&str> {
        match self {
            ScanError::InvalidRequest { url, .. }
            | ScanError::NavigationFailure { url, .. }
            | ScanError::AuditEngineFailure { url, .. }
            | ScanError::CaptureFailure { url, .. }
            | ScanError::Session { url, .. }
            | ScanError::Cancelled { url } => Some(url),
            ScanError::Config(_) => None,
        }
    }

    /// Original failure text, enough to tell navigation from audit failures apart.
    pub fn details(&self) -> Option<String> {
        match self {
            ScanError::InvalidRequest { reason, .. }
            | ScanError::AuditEngineFailure { reason, .. }
            | ScanError::CaptureFailure { reason, .. }
            | ScanError::Session { reason, .. } => Some(reason.clone()),
            ScanError::NavigationFailure { strict, relaxed, .. } => {
                Some(format!("strict: {strict}; relaxed: {relaxed}"))
            }
            ScanError::Cancelled { .. } => None,
            ScanError::Config(e) => Some(e.to_string()),
        }
    }

    pub fn to_failure(&self) -> ScanFailure {
        ScanFailure {
            kind: self.kind().to_string(),
            message: self.to_string(),
            url: self.url().map(str::to_string),
            details: self.details(),
        }
    }
}

/// Structured error object surfaced to callers when a scan aborts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanFailure {
    pub kind: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

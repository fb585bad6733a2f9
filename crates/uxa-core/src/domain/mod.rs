//! Domain model for a single page scan.
//!
//! Every stage of the pipeline owns exactly one of these types and never
//! mutates the output of an earlier stage. [`ScanReport`] is the only type the
//! export renderers and the client surface need to understand.

pub mod audit;
pub mod error;
pub mod heatmap;
pub mod report;
pub mod scan;
pub mod secondary;

pub use audit::{AuditResult, Impact, ImpactCounts, ImpactGroup, RuleCheck, Violation, ViolationNode};
pub use error::{ScanError, ScanFailure};
pub use heatmap::HeatmapPoint;
pub use report::ScanReport;
pub use scan::{ImageFormat, PageCapture, ScanRequest, Screenshot, ScreenshotDecodeError};
pub use secondary::{AuditCategory, CategoryScores, SecondaryAuditResult};

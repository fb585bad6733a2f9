//! UXability scan engine
//!
//! Drives a headless page through navigation, stabilization, capture and an
//! accessibility audit, correlates every violation node with its on-page
//! rectangle, merges an independent performance/SEO audit and returns one
//! immutable [`ScanReport`].

pub mod aggregate;
pub mod audit;
pub mod capture;
pub mod config;
pub mod domain;
pub mod explain;
pub mod fakes;
pub mod heatmap;
pub mod interception;
pub mod metrics;
pub mod navigation;
pub mod obs;
pub mod page;
pub mod pipeline;
pub mod scheduler;
pub mod scripts;
pub mod secondary;
pub mod stabilizer;
pub mod telemetry;
pub mod viewer;

/// Crate version, embedded in exported documents.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub use aggregate::aggregate;
pub use audit::{highlight_classes, run_audit, AccessibilityEngine, HIGHLIGHT_STYLES};
pub use capture::capture;
pub use config::{
    AuditConfig, CaptureConfig, ConfigError, CorrelationConfig, NavigationConfig, ScanConfig,
    SchedulerConfig, SecondaryConfig, StabilizerConfig,
};
pub use domain::{
    AuditCategory, AuditResult, CategoryScores, HeatmapPoint, ImageFormat, Impact, ImpactCounts,
    ImpactGroup, PageCapture, RuleCheck, ScanError, ScanFailure, ScanReport, ScanRequest,
    Screenshot, ScreenshotDecodeError, SecondaryAuditResult, Violation, ViolationNode,
};
pub use explain::{
    ExplanationBook, ExplanationKey, ExplanationService, ExplanationState, GeminiConfig,
    GeminiExplainer,
};
pub use heatmap::{correlate, Correlation, ElementGeometry, GeometryResolver, PageGeometry};
pub use interception::{
    evaluate_request, InterceptDecision, InterceptPolicy, InterceptRule, InterceptedRequest,
    RequestFilter, ResourceType,
};
pub use navigation::{navigate, NavigationReport};
pub use page::{
    BrowserEndpoint, BrowserLauncher, BrowserSession, NavigationOutcome, PageError, PageResult,
    RenderablePage, ScreenshotOptions, WaitPolicy,
};
pub use pipeline::ScanPipeline;
pub use scheduler::{ScanHandle, ScanScheduler};
pub use secondary::{
    run_secondary_audit, EngineReport, LighthouseCli, SecondaryAuditEngine, SecondaryAuditRequest,
};
pub use stabilizer::{stabilize, StabilizationReport};
pub use telemetry::init_tracing;
pub use viewer::{DisplayGeometry, DisplayRect, ZoomLevel};

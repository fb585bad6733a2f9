//! The Renderable Page capability and the browser session that owns it.
//!
//! The scan pipeline depends only on the six operations of [`RenderablePage`].
//! Concrete bindings (CDP, test fakes) live outside this module.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::ImageFormat;
use crate::interception::RequestFilter;

/// Errors produced by a page binding.
#[derive(Debug, thiserror::Error)]
pub enum PageError {
    #[error("{operation} timed out after {limit_ms}ms")]
    Timeout { operation: String, limit_ms: u64 },

    #[error("navigation failed: {0}")]
    Navigation(String),

    #[error("page script threw: {0}")]
    Script(String),

    #[error("browser protocol error: {0}")]
    Protocol(String),

    #[error("page or browser is closed")]
    Closed,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for page operations.
pub type PageResult<T> = std::result::Result<T, PageError>;

/// When a navigation counts as finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WaitPolicy {
    /// Load fired and at most two requests in flight for 500 ms.
    NetworkIdle,
    /// DOM parsed.
    DomContentLoaded,
}

impl std::fmt::Display for WaitPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WaitPolicy::NetworkIdle => write!(f, "network_idle"),
            WaitPolicy::DomContentLoaded => write!(f, "dom_content_loaded"),
        }
    }
}

/// What the binding observed when a navigation completed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NavigationOutcome {
    pub final_url: String,
    pub wait_policy: WaitPolicy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScreenshotOptions {
    pub full_page: bool,
    pub format: ImageFormat,
    pub quality: u8,
}

impl Default for ScreenshotOptions {
    fn default() -> Self {
        Self {
            full_page: true,
            format: ImageFormat::Jpeg,
            quality: 80,
        }
    }
}

/// A live, navigable page.
#[async_trait]
pub trait RenderablePage: Send + Sync {
    async fn navigate(
        &self,
        url: &str,
        wait: WaitPolicy,
        timeout: Duration,
    ) -> PageResult<NavigationOutcome>;

    /// Evaluate an expression in page context, awaiting promises, and return
    /// the result by value.
    async fn evaluate(&self, script: &str) -> PageResult<serde_json::Value>;

    async fn inject_script(&self, source: &str) -> PageResult<()>;

    async fn inject_style(&self, source: &str) -> PageResult<()>;

    async fn screenshot(&self, options: &ScreenshotOptions) -> PageResult<Vec<u8>>;

    /// Install a filter consulted for every outgoing request from now on.
    async fn intercept_requests(&self, filter: Arc<dyn RequestFilter>) -> PageResult<()>;
}

/// Connection details for the browser process that hosts a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrowserEndpoint {
    pub ws_url: String,
    pub debug_port: u16,
}

/// A dedicated browser process or context owned by exactly one scan.
#[async_trait]
pub trait BrowserSession: Send + Sync {
    fn page(&self) -> &dyn RenderablePage;

    fn endpoint(&self) -> &BrowserEndpoint;

    /// Tear down the browser. Must be idempotent.
    async fn close(&mut self) -> PageResult<()>;
}

/// Starts fresh browser sessions on demand.
#[async_trait]
pub trait BrowserLauncher: Send + Sync {
    async fn launch(&self) -> PageResult<Box<dyn BrowserSession>>;
}

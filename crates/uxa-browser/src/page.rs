//! [`RenderablePage`] over one flattened DevTools target session.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine as _;
use serde_json::{json, Value};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use uxa_core::{
    ImageFormat, InterceptDecision, InterceptedRequest, NavigationOutcome, PageError, PageResult,
    RenderablePage, RequestFilter, ResourceType, ScreenshotOptions, WaitPolicy,
};

use crate::cdp::{CdpConnection, CdpEvent};
use crate::error::{CdpError, CdpResult};

/// Tracks lifecycle events of one navigation (one loader).
#[derive(Debug, Clone)]
pub struct LifecycleWatch {
    loader_id: Option<String>,
    wait: WaitPolicy,
    dom_content_loaded: bool,
    load: bool,
    network_almost_idle: bool,
}

impl LifecycleWatch {
    /// `loader_id` is `None` for same-document navigations.
    pub fn new(loader_id: Option<String>, wait: WaitPolicy) -> Self {
        Self {
            loader_id,
            wait,
            dom_content_loaded: false,
            load: false,
            network_almost_idle: false,
        }
    }

    /// Record a `Page.lifecycleEvent` payload; returns true once the wait
    /// policy is satisfied.
    pub fn observe(&mut self, params: &Value) -> bool {
        let loader = params.get("loaderId").and_then(Value::as_str);
        if let (Some(expected), Some(actual)) = (self.loader_id.as_deref(), loader) {
            if expected != actual {
                return self.satisfied();
            }
        }
        match params.get("name").and_then(Value::as_str) {
            Some("DOMContentLoaded") => self.dom_content_loaded = true,
            Some("load") => self.load = true,
            // Chrome's ≤2 connections for 500 ms signal.
            Some("networkAlmostIdle") => self.network_almost_idle = true,
            _ => {}
        }
        self.satisfied()
    }

    pub fn satisfied(&self) -> bool {
        match self.wait {
            WaitPolicy::DomContentLoaded => self.dom_content_loaded,
            WaitPolicy::NetworkIdle => self.load && self.network_almost_idle,
        }
    }
}

/// Pull the request id and filter input out of a `Fetch.requestPaused` event.
pub fn paused_request(params: &Value) -> Option<(String, InterceptedRequest)> {
    let id = params.get("requestId")?.as_str()?.to_string();
    let url = params.pointer("/request/url")?.as_str()?;
    let resource_type = params
        .get("resourceType")
        .and_then(Value::as_str)
        .map(ResourceType::from_name)
        .unwrap_or_else(|| ResourceType::Other("unknown".to_string()));
    Some((id, InterceptedRequest::new(resource_type, url)))
}

/// Page-side value of a `Runtime.evaluate` result, or the thrown message.
pub fn evaluation_value(result: &Value) -> PageResult<Value> {
    if let Some(details) = result.get("exceptionDetails") {
        let message = details
            .pointer("/exception/description")
            .and_then(Value::as_str)
            .or_else(|| details.get("text").and_then(Value::as_str))
            .unwrap_or("uncaught exception");
        return Err(PageError::Script(message.to_string()));
    }
    Ok(result.pointer("/result/value").cloned().unwrap_or(Value::Null))
}

fn style_injection(css: &str) -> PageResult<String> {
    let literal = serde_json::to_string(css).map_err(|e| PageError::Script(e.to_string()))?;
    Ok(format!(
        "(() => {{ const style = document.createElement('style'); style.textContent = {literal}; (document.head || document.documentElement).appendChild(style); return true; }})()"
    ))
}

pub struct CdpPage {
    conn: Arc<CdpConnection>,
    session_id: String,
    interceptor: Mutex<Option<JoinHandle<()>>>,
}

impl CdpPage {
    /// Enable the domains the scan relies on for an attached target session.
    pub async fn attach(conn: Arc<CdpConnection>, session_id: String) -> CdpResult<Self> {
        let page = Self {
            conn,
            session_id,
            interceptor: Mutex::new(None),
        };
        page.call("Page.enable", json!({})).await?;
        page.call("Runtime.enable", json!({})).await?;
        page.call("Page.setLifecycleEventsEnabled", json!({ "enabled": true }))
            .await?;
        Ok(page)
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    async fn call(&self, method: &str, params: Value) -> CdpResult<Value> {
        self.conn.send(method, params, Some(&self.session_id)).await
    }

    async fn await_lifecycle(
        &self,
        events: &mut mpsc::UnboundedReceiver<CdpEvent>,
        mut watch: LifecycleWatch,
    ) -> PageResult<()> {
        while let Some(event) = events.recv().await {
            if event.session_id.as_deref() == Some(self.session_id.as_str()) && watch.observe(&event.params) {
                return Ok(());
            }
        }
        Err(PageError::Closed)
    }
}

#[async_trait]
impl RenderablePage for CdpPage {
    async fn navigate(
        &self,
        url: &str,
        wait: WaitPolicy,
        timeout: Duration,
    ) -> PageResult<NavigationOutcome> {
        let mut events = self.conn.listen("Page.lifecycleEvent").await;

        let run = async {
            let result = self.call("Page.navigate", json!({ "url": url })).await?;
            if let Some(error) = result.get("errorText").and_then(Value::as_str) {
                return Err(PageError::Navigation(error.to_string()));
            }
            let loader_id = result
                .get("loaderId")
                .and_then(Value::as_str)
                .map(str::to_string);
            if loader_id.is_some() {
                self.await_lifecycle(&mut events, LifecycleWatch::new(loader_id, wait))
                    .await?;
            }
            Ok::<(), PageError>(())
        };

        match tokio::time::timeout(timeout, run).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(e),
            Err(_) => {
                return Err(PageError::Timeout {
                    operation: format!("navigation ({wait})"),
                    limit_ms: timeout.as_millis() as u64,
                })
            }
        }

        let final_url = self
            .evaluate("window.location.href")
            .await
            .ok()
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_else(|| url.to_string());
        Ok(NavigationOutcome {
            final_url,
            wait_policy: wait,
        })
    }

    async fn evaluate(&self, script: &str) -> PageResult<Value> {
        let result = self
            .call(
                "Runtime.evaluate",
                json!({
                    "expression": script,
                    "awaitPromise": true,
                    "returnByValue": true,
                }),
            )
            .await?;
        evaluation_value(&result)
    }

    async fn inject_script(&self, source: &str) -> PageResult<()> {
        let result = self
            .call(
                "Runtime.evaluate",
                json!({ "expression": source, "returnByValue": false }),
            )
            .await?;
        evaluation_value(&result).map(|_| ())
    }

    async fn inject_style(&self, source: &str) -> PageResult<()> {
        self.evaluate(&style_injection(source)?).await.map(|_| ())
    }

    async fn screenshot(&self, options: &ScreenshotOptions) -> PageResult<Vec<u8>> {
        let format = match options.format {
            ImageFormat::Jpeg => "jpeg",
            ImageFormat::Png => "png",
        };
        let mut params = json!({ "format": format, "fromSurface": true });
        if options.format == ImageFormat::Jpeg {
            params["quality"] = json!(options.quality);
        }
        if options.full_page {
            let metrics = self.call("Page.getLayoutMetrics", json!({})).await?;
            let size = metrics
                .get("cssContentSize")
                .or_else(|| metrics.get("contentSize"))
                .ok_or_else(|| CdpError::MissingField {
                    method: "Page.getLayoutMetrics".to_string(),
                    field: "cssContentSize",
                })?;
            let width = size.get("width").and_then(Value::as_f64).unwrap_or(0.0);
            let height = size.get("height").and_then(Value::as_f64).unwrap_or(0.0);
            params["captureBeyondViewport"] = json!(true);
            params["clip"] = json!({
                "x": 0, "y": 0,
                "width": width.ceil(), "height": height.ceil(),
                "scale": 1,
            });
        }

        let result = self.call("Page.captureScreenshot", params).await?;
        let data = result
            .get("data")
            .and_then(Value::as_str)
            .ok_or_else(|| CdpError::MissingField {
                method: "Page.captureScreenshot".to_string(),
                field: "data",
            })?;
        base64::engine::general_purpose::STANDARD
            .decode(data)
            .map_err(|e| PageError::Protocol(format!("screenshot payload: {e}")))
    }

    async fn intercept_requests(&self, filter: Arc<dyn RequestFilter>) -> PageResult<()> {
        let mut paused = self.conn.listen("Fetch.requestPaused").await;
        self.call("Fetch.enable", json!({ "patterns": [{ "urlPattern": "*" }] }))
            .await?;

        let conn = self.conn.clone();
        let session = self.session_id.clone();
        let task = tokio::spawn(async move {
            while let Some(event) = paused.recv().await {
                if event.session_id.as_deref() != Some(session.as_str()) {
                    continue;
                }
                let Some((request_id, request)) = paused_request(&event.params) else {
                    continue;
                };
                let resumed = match filter.decide(&request) {
                    InterceptDecision::Continue => conn.dispatch(
                        "Fetch.continueRequest",
                        json!({ "requestId": request_id }),
                        Some(&session),
                    ),
                    InterceptDecision::Abort { reason } => {
                        tracing::trace!(url = %request.url, %reason, "request blocked");
                        conn.dispatch(
                            "Fetch.failRequest",
                            json!({ "requestId": request_id, "errorReason": "BlockedByClient" }),
                            Some(&session),
                        )
                    }
                };
                if resumed.is_err() {
                    break;
                }
            }
        });

        if let Some(previous) = self.interceptor.lock().await.replace(task) {
            previous.abort();
        }
        Ok(())
    }
}

impl Drop for CdpPage {
    fn drop(&mut self) {
        if let Some(task) = self.interceptor.get_mut().take() {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_network_idle_needs_load_and_idle() {
        let mut watch = LifecycleWatch::new(Some("L1".into()), WaitPolicy::NetworkIdle);
        assert!(!watch.observe(&json!({"name": "DOMContentLoaded", "loaderId": "L1"})));
        assert!(!watch.observe(&json!({"name": "networkAlmostIdle", "loaderId": "L1"})));
        assert!(watch.observe(&json!({"name": "load", "loaderId": "L1"})));
    }

    #[test]
    fn test_dom_content_loaded_policy() {
        let mut watch = LifecycleWatch::new(Some("L1".into()), WaitPolicy::DomContentLoaded);
        assert!(watch.observe(&json!({"name": "DOMContentLoaded", "loaderId": "L1"})));
    }

    #[test]
    fn test_other_loaders_are_ignored() {
        let mut watch = LifecycleWatch::new(Some("L2".into()), WaitPolicy::DomContentLoaded);
        assert!(!watch.observe(&json!({"name": "DOMContentLoaded", "loaderId": "L1"})));
        assert!(watch.observe(&json!({"name": "DOMContentLoaded", "loaderId": "L2"})));
    }

    #[test]
    fn test_paused_request_extraction() {
        let (id, request) = paused_request(&json!({
            "requestId": "interception-job-4.0",
            "resourceType": "Media",
            "request": {"url": "https://cdn.example.com/intro.mp4", "method": "GET"}
        }))
        .unwrap();
        assert_eq!(id, "interception-job-4.0");
        assert_eq!(request.resource_type, ResourceType::Media);
        assert_eq!(request.url, "https://cdn.example.com/intro.mp4");

        assert!(paused_request(&json!({"requestId": "x"})).is_none());
    }

    #[test]
    fn test_evaluation_value_and_exceptions() {
        assert_eq!(
            evaluation_value(&json!({"result": {"type": "number", "value": 1234}})).unwrap(),
            json!(1234)
        );
        assert_eq!(
            evaluation_value(&json!({"result": {"type": "undefined"}})).unwrap(),
            Value::Null
        );
        let err = evaluation_value(&json!({
            "result": {"type": "object"},
            "exceptionDetails": {"text": "Uncaught", "exception": {"description": "ReferenceError: axe is not defined"}}
        }))
        .unwrap_err();
        assert!(matches!(err, PageError::Script(ref m) if m.contains("axe is not defined")));
    }

    #[test]
    fn test_style_injection_escapes_css() {
        let script = style_injection(".a::after { content: \"'\"; }").unwrap();
        assert!(script.contains(r#"".a::after { content: \"'\"; }""#));
        assert!(script.starts_with("(() =>"));
    }
}

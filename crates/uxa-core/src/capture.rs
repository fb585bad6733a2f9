//! Capture stage: full-page screenshot plus post-sweep document dimensions.

use std::time::Duration;

use chrono::Utc;
use serde::Deserialize;

use crate::config::CaptureConfig;
use crate::domain::{PageCapture, ScanError, Screenshot};
use crate::page::{PageError, RenderablePage, ScreenshotOptions};
use crate::scripts;

#[derive(Debug, Deserialize)]
struct DocumentSize {
    width: f64,
    height: f64,
}

pub async fn capture(
    page: &dyn RenderablePage,
    config: &CaptureConfig,
    url: &str,
) -> Result<PageCapture, ScanError> {
    let failure = |reason: String| ScanError::CaptureFailure {
        url: url.to_string(),
        reason,
    };

    let limit = Duration::from_millis(config.timeout_ms);
    let timed_out = |operation: &str| PageError::Timeout {
        operation: operation.to_string(),
        limit_ms: config.timeout_ms,
    };

    let measured = match tokio::time::timeout(limit, page.evaluate(scripts::DOCUMENT_SIZE)).await {
        Ok(result) => result,
        Err(_) => Err(timed_out("document size")),
    };
    let size: DocumentSize = measured
        .map_err(|e| failure(format!("failed to measure document: {e}")))
        .and_then(|v| {
            serde_json::from_value(v).map_err(|e| failure(format!("unexpected document size: {e}")))
        })?;

    let options = ScreenshotOptions {
        full_page: true,
        format: config.format,
        quality: config.quality,
    };
    let bytes = match tokio::time::timeout(limit, page.screenshot(&options)).await {
        Ok(result) => result,
        Err(_) => Err(timed_out("screenshot")),
    }
    .map_err(|e| failure(e.to_string()))?;

    if bytes.is_empty() {
        return Err(failure("screenshot was empty".to_string()));
    }

    Ok(PageCapture {
        screenshot: Screenshot::new(config.format, bytes),
        page_width: size.width.max(0.0).round() as u32,
        page_height: size.height.max(0.0).round() as u32,
        timestamp: Utc::now(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ImageFormat;
    use crate::fakes::ScriptedPage;

    #[tokio::test]
    async fn test_capture_records_document_size() {
        let page = ScriptedPage::builder().document_size(1440, 5230).build();
        let cap = capture(&page, &CaptureConfig::default(), "https://example.com/")
            .await
            .unwrap();
        assert_eq!(cap.page_width, 1440);
        assert_eq!(cap.page_height, 5230);
        assert_eq!(cap.screenshot.format(), ImageFormat::Jpeg);
        assert!(!cap.screenshot.is_empty());
    }

    #[tokio::test]
    async fn test_screenshot_error_is_capture_failure() {
        let page = ScriptedPage::builder().screenshot_fails("target crashed").build();
        let err = capture(&page, &CaptureConfig::default(), "https://example.com/")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "capture_failure");
        assert!(err.to_string().contains("target crashed"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_hung_document_measure_is_capture_failure() {
        let page = ScriptedPage::builder().measure_hangs().build();
        let config = CaptureConfig {
            timeout_ms: 3_000,
            ..CaptureConfig::default()
        };
        let err = capture(&page, &config, "https://example.com/").await.unwrap_err();
        assert_eq!(err.kind(), "capture_failure");
        assert!(err.to_string().contains("document size"));
    }
}

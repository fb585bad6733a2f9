//! Scan scheduler: one dedicated browser per scan, bounded concurrency.
//!
//! Requests beyond `max_concurrent_browsers` wait for a permit in FIFO order.
//! A [`SessionGuard`] owns each browser so that completion, failure and
//! cancellation all tear it down.

use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinHandle;

use crate::domain::{ScanError, ScanReport, ScanRequest};
use crate::page::{BrowserLauncher, BrowserSession};
use crate::pipeline::ScanPipeline;

/// Owns a browser session and closes it exactly once.
struct SessionGuard {
    session: Option<Box<dyn BrowserSession>>,
}

impl SessionGuard {
    fn new(session: Box<dyn BrowserSession>) -> Self {
        Self {
            session: Some(session),
        }
    }

    async fn close(mut self) {
        if let Some(mut session) = self.session.take() {
            if let Err(e) = session.close().await {
                tracing::warn!(error = %e, "failed to close browser session");
            }
        }
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        let Some(mut session) = self.session.take() else {
            return;
        };
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(e) = session.close().await {
                        tracing::warn!(error = %e, "failed to close abandoned browser session");
                    }
                });
            }
            Err(_) => {
                tracing::warn!("no async runtime to close abandoned browser session");
            }
        }
    }
}

/// Handle to a scan running in the background.
pub struct ScanHandle {
    url: String,
    task: JoinHandle<Result<ScanReport, ScanError>>,
}

impl ScanHandle {
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Abort the scan. Its browser session is torn down as the task unwinds.
    pub fn cancel(&self) {
        self.task.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    pub async fn join(self) -> Result<ScanReport, ScanError> {
        match self.task.await {
            Ok(result) => result,
            Err(e) if e.is_cancelled() => Err(ScanError::Cancelled { url: self.url }),
            Err(e) => Err(ScanError::Session {
                url: self.url,
                reason: format!("scan task panicked: {e}"),
            }),
        }
    }
}

#[derive(Clone)]
pub struct ScanScheduler {
    pipeline: Arc<ScanPipeline>,
    launcher: Arc<dyn BrowserLauncher>,
    permits: Arc<Semaphore>,
    max_concurrent: usize,
}

impl ScanScheduler {
    pub fn new(pipeline: Arc<ScanPipeline>, launcher: Arc<dyn BrowserLauncher>) -> Self {
        let max_concurrent = pipeline.config().scheduler.max_concurrent_browsers.max(1);
        Self {
            pipeline,
            launcher,
            permits: Arc::new(Semaphore::new(max_concurrent)),
            max_concurrent,
        }
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    /// Permits not currently held by a running scan.
    pub fn available_permits(&self) -> usize {
        self.permits.available_permits()
    }

    pub async fn scan(&self, request: ScanRequest) -> Result<ScanReport, ScanError> {
        run_scan(
            self.pipeline.clone(),
            self.launcher.clone(),
            self.permits.clone(),
            request,
        )
        .await
    }

    pub fn spawn(&self, request: ScanRequest) -> ScanHandle {
        let url = request.url().to_string();
        let task = tokio::spawn(run_scan(
            self.pipeline.clone(),
            self.launcher.clone(),
            self.permits.clone(),
            request,
        ));
        ScanHandle { url, task }
    }

    /// Run every request under the shared bound; results keep request order.
    pub async fn scan_all(&self, requests: Vec<ScanRequest>) -> Vec<Result<ScanReport, ScanError>> {
        let handles: Vec<_> = requests.into_iter().map(|r| self.spawn(r)).collect();
        futures::future::join_all(handles.into_iter().map(ScanHandle::join)).await
    }
}

async fn run_scan(
    pipeline: Arc<ScanPipeline>,
    launcher: Arc<dyn BrowserLauncher>,
    permits: Arc<Semaphore>,
    request: ScanRequest,
) -> Result<ScanReport, ScanError> {
    let url = request.url().to_string();

    let _permit = permits.acquire_owned().await.map_err(|_| ScanError::Session {
        url: url.clone(),
        reason: "scheduler is shut down".to_string(),
    })?;

    let session = launcher.launch().await.map_err(|e| ScanError::Session {
        url: url.clone(),
        reason: format!("failed to launch browser: {e}"),
    })?;
    tracing::debug!(url = %url, endpoint = %session.endpoint().ws_url, "browser session launched");

    let guard = SessionGuard::new(session);
    let result = match guard.session.as_deref() {
        Some(session) => pipeline.run(&request, session).await,
        None => Err(ScanError::Session {
            url,
            reason: "browser session closed before the scan started".to_string(),
        }),
    };
    guard.close().await;
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::AccessibilityEngine;
    use crate::config::ScanConfig;
    use crate::fakes::{FakeLauncher, ScriptedPage, StaticSecondaryEngine};
    use std::time::Duration;

    fn scheduler(launcher: Arc<FakeLauncher>, max: usize) -> ScanScheduler {
        let mut config = ScanConfig::default();
        config.scheduler.max_concurrent_browsers = max;
        let pipeline = ScanPipeline::new(
            config,
            AccessibilityEngine::from_source("window.axe = {};"),
            Arc::new(StaticSecondaryEngine::perfect()),
        );
        ScanScheduler::new(Arc::new(pipeline), launcher)
    }

    #[tokio::test(start_paused = true)]
    async fn test_bound_is_respected_and_order_kept() {
        let launcher = Arc::new(FakeLauncher::new(|| {
            ScriptedPage::builder()
                .navigation_delay(Duration::from_secs(2))
                .build()
        }));
        let sched = scheduler(launcher.clone(), 2);

        let requests: Vec<_> = (0..5)
            .map(|i| ScanRequest::new(&format!("https://example.com/page-{i}")).unwrap())
            .collect();
        let results = sched.scan_all(requests).await;

        assert_eq!(results.len(), 5);
        for (i, r) in results.iter().enumerate() {
            let report = r.as_ref().unwrap();
            assert_eq!(report.url(), format!("https://example.com/page-{i}"));
        }
        assert_eq!(launcher.launches(), 5);
        assert_eq!(launcher.closes(), 5);
        assert_eq!(launcher.peak_open(), 2);
        assert_eq!(sched.available_permits(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_tears_down_browser() {
        let launcher = Arc::new(FakeLauncher::new(|| {
            ScriptedPage::builder()
                .navigation_delay(Duration::from_secs(30))
                .build()
        }));
        let sched = scheduler(launcher.clone(), 1);

        let handle = sched.spawn(ScanRequest::new("https://example.com/slow").unwrap());
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(launcher.launches(), 1);

        handle.cancel();
        let err = handle.join().await.unwrap_err();
        assert_eq!(err.kind(), "cancelled");

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(launcher.closes(), 1);
        assert_eq!(sched.available_permits(), 1);
    }

    fn assert_send<T: Send>(_: &T) {}

    #[test]
    fn test_scan_future_is_send() {
        let launcher = Arc::new(FakeLauncher::new(|| ScriptedPage::builder().build()));
        let sched = scheduler(launcher.clone(), 1);
        let scan = run_scan(
            sched.pipeline.clone(),
            launcher,
            sched.permits.clone(),
            ScanRequest::new("https://example.com/").unwrap(),
        );
        assert_send(&scan);
    }

    #[tokio::test]
    async fn test_launch_failure_is_session_error() {
        let launcher = Arc::new(FakeLauncher::failing("chrome not found"));
        let sched = scheduler(launcher, 1);
        let err = sched
            .scan(ScanRequest::new("https://example.com/").unwrap())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "session_failure");
        assert!(err.to_string().contains("chrome not found"));
    }

    #[tokio::test]
    async fn test_failed_scan_still_closes_browser() {
        let launcher = Arc::new(FakeLauncher::new(|| {
            ScriptedPage::builder()
                .navigation(crate::fakes::NavigationScript::FailAll("net::ERR_CONNECTION_REFUSED".into()))
                .build()
        }));
        let sched = scheduler(launcher.clone(), 1);
        let err = sched
            .scan(ScanRequest::new("https://example.com/").unwrap())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "navigation_failure");
        assert_eq!(launcher.closes(), 1);
    }
}

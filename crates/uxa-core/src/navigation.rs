//! Navigation controller: strict network-idle load with one relaxed fallback.

use std::time::Duration;

use crate::config::NavigationConfig;
use crate::domain::ScanError;
use crate::page::{NavigationOutcome, PageError, PageResult, RenderablePage, WaitPolicy};

/// Result of a successful navigation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NavigationReport {
    pub outcome: NavigationOutcome,
    /// The strict attempt failed and the relaxed one succeeded.
    pub fell_back: bool,
    /// Why the strict attempt failed, when it did.
    pub strict_error: Option<String>,
}

/// Bound a binding call by `limit` even if the binding ignores its own timeout.
async fn attempt(
    page: &dyn RenderablePage,
    url: &str,
    wait: WaitPolicy,
    limit: Duration,
) -> PageResult<NavigationOutcome> {
    match tokio::time::timeout(limit, page.navigate(url, wait, limit)).await {
        Ok(result) => result,
        Err(_) => Err(PageError::Timeout {
            operation: format!("navigation ({wait})"),
            limit_ms: limit.as_millis() as u64,
        }),
    }
}

/// Load `url`, falling back once from network-idle to DOM-parsed.
///
/// Both attempts failing aborts the scan with [`ScanError::NavigationFailure`].
pub async fn navigate(
    page: &dyn RenderablePage,
    url: &str,
    config: &NavigationConfig,
) -> Result<NavigationReport, ScanError> {
    let strict_err = match attempt(page, url, WaitPolicy::NetworkIdle, config.strict_timeout()).await {
        Ok(outcome) => {
            return Ok(NavigationReport {
                outcome,
                fell_back: false,
                strict_error: None,
            })
        }
        Err(e) => e,
    };

    tracing::warn!(
        url = %url,
        error = %strict_err,
        "strict navigation failed, retrying with relaxed wait policy"
    );

    match attempt(page, url, WaitPolicy::DomContentLoaded, config.relaxed_timeout()).await {
        Ok(outcome) => Ok(NavigationReport {
            outcome,
            fell_back: true,
            strict_error: Some(strict_err.to_string()),
        }),
        Err(relaxed_err) => Err(ScanError::NavigationFailure {
            url: url.to_string(),
            strict: strict_err.to_string(),
            relaxed: relaxed_err.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fakes::{NavigationScript, ScriptedPage};

    const URL: &str = "https://example.com/";

    #[tokio::test]
    async fn test_strict_success_does_not_fall_back() {
        let page = ScriptedPage::builder().build();
        let report = navigate(&page, URL, &NavigationConfig::default()).await.unwrap();
        assert!(!report.fell_back);
        assert_eq!(report.outcome.wait_policy, WaitPolicy::NetworkIdle);
        assert_eq!(page.navigations(), vec![WaitPolicy::NetworkIdle]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_strict_timeout_falls_back() {
        let page = ScriptedPage::builder()
            .navigation(NavigationScript::HangStrict)
            .build();
        let report = navigate(&page, URL, &NavigationConfig::default()).await.unwrap();
        assert!(report.fell_back);
        assert_eq!(report.outcome.wait_policy, WaitPolicy::DomContentLoaded);
        assert!(report.strict_error.unwrap().contains("timed out"));
        assert_eq!(
            page.navigations(),
            vec![WaitPolicy::NetworkIdle, WaitPolicy::DomContentLoaded]
        );
    }

    #[tokio::test]
    async fn test_both_attempts_fail() {
        let page = ScriptedPage::builder()
            .navigation(NavigationScript::FailAll("net::ERR_NAME_NOT_RESOLVED".into()))
            .build();
        let err = navigate(&page, URL, &NavigationConfig::default()).await.unwrap_err();
        assert_eq!(err.kind(), "navigation_failure");
        assert_eq!(err.url(), Some(URL));
        assert!(err.to_string().contains("ERR_NAME_NOT_RESOLVED"));
    }
}

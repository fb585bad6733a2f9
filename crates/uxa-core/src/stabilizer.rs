//! Render stabilizer: font wait, settle delays and a lazy-content scroll sweep.
//!
//! Every wait is bounded and nothing here fails the scan. A slow or
//! infinite-scroll page yields partial coverage, recorded in the report.

use std::time::Duration;

use serde::Serialize;

use crate::config::StabilizerConfig;
use crate::page::{PageError, PageResult, RenderablePage};
use crate::scripts;

/// What the stabilizer actually managed to do.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StabilizationReport {
    /// The font-loading signal fired before the ceiling.
    pub fonts_ready: bool,
    pub scroll_steps: u32,
    /// Distance scrolled, in CSS pixels.
    pub swept_px: u64,
    /// The sweep stopped at `max_scroll_steps` before reaching the bottom.
    pub truncated: bool,
}

pub async fn stabilize(page: &dyn RenderablePage, config: &StabilizerConfig) -> StabilizationReport {
    let mut report = StabilizationReport {
        fonts_ready: wait_for_fonts(page, Duration::from_millis(config.font_ceiling_ms)).await,
        ..StabilizationReport::default()
    };

    tokio::time::sleep(Duration::from_millis(config.settle_ms)).await;

    sweep(page, config, &mut report).await;

    let step_limit = Duration::from_millis(config.step_timeout_ms);
    if let Err(e) = bounded_evaluate(page, scripts::SCROLL_TO_TOP, step_limit, "scroll to top").await {
        tracing::warn!(error = %e, "failed to restore scroll position");
    }

    tokio::time::sleep(Duration::from_millis(config.post_sweep_settle_ms)).await;

    tracing::debug!(
        fonts_ready = report.fonts_ready,
        scroll_steps = report.scroll_steps,
        swept_px = report.swept_px,
        truncated = report.truncated,
        "page stabilized"
    );
    report
}

async fn bounded_evaluate(
    page: &dyn RenderablePage,
    script: &str,
    limit: Duration,
    operation: &str,
) -> PageResult<serde_json::Value> {
    match tokio::time::timeout(limit, page.evaluate(script)).await {
        Ok(result) => result,
        Err(_) => Err(PageError::Timeout {
            operation: operation.to_string(),
            limit_ms: limit.as_millis() as u64,
        }),
    }
}

async fn wait_for_fonts(page: &dyn RenderablePage, ceiling: Duration) -> bool {
    match tokio::time::timeout(ceiling, page.evaluate(scripts::FONTS_READY)).await {
        Ok(Ok(_)) => true,
        Ok(Err(e)) => {
            tracing::warn!(error = %e, "font readiness check failed, continuing");
            false
        }
        Err(_) => {
            tracing::warn!(
                ceiling_ms = ceiling.as_millis() as u64,
                "font loading signal never fired, continuing"
            );
            false
        }
    }
}

/// Scroll in fixed steps until the distance covered reaches the scrollable
/// height, which is re-read after every step so lazily appended content counts.
async fn sweep(page: &dyn RenderablePage, config: &StabilizerConfig, report: &mut StabilizationReport) {
    let interval = Duration::from_millis(config.scroll_interval_ms);
    let step_limit = Duration::from_millis(config.step_timeout_ms);
    let step = config.scroll_step_px;
    let script = scripts::scroll_by(step);

    loop {
        if report.scroll_steps >= config.max_scroll_steps {
            report.truncated = true;
            tracing::warn!(
                max_scroll_steps = config.max_scroll_steps,
                "scroll sweep hit its step cap; coverage is partial"
            );
            break;
        }

        tokio::time::sleep(interval).await;

        let height = match bounded_evaluate(page, &script, step_limit, "scroll step").await {
            Ok(value) => value.as_f64().unwrap_or(0.0),
            Err(e) => {
                tracing::warn!(error = %e, "scroll sweep step failed, stopping sweep");
                break;
            }
        };

        report.scroll_steps += 1;
        report.swept_px += u64::from(step);

        if report.swept_px as f64 >= height {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fakes::ScriptedPage;

    #[tokio::test(start_paused = true)]
    async fn test_sweep_covers_document_then_resets() {
        let page = ScriptedPage::builder().document_size(1280, 1000).build();
        let report = stabilize(&page, &StabilizerConfig::default()).await;

        assert!(report.fonts_ready);
        // 300 + 300 + 300 + 300 >= 1000
        assert_eq!(report.scroll_steps, 4);
        assert_eq!(report.swept_px, 1200);
        assert!(!report.truncated);
        assert_eq!(page.scroll_y(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_font_signal_never_fires() {
        let page = ScriptedPage::builder().fonts_hang().build();
        let started = tokio::time::Instant::now();
        let report = stabilize(&page, &StabilizerConfig::default()).await;

        assert!(!report.fonts_ready);
        assert!(started.elapsed() >= Duration::from_millis(5_000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_infinite_scroll_is_capped() {
        let page = ScriptedPage::builder()
            .document_size(1280, 2000)
            .growing_height(600)
            .build();
        let config = StabilizerConfig {
            max_scroll_steps: 10,
            ..StabilizerConfig::default()
        };
        let report = stabilize(&page, &config).await;

        assert!(report.truncated);
        assert_eq!(report.scroll_steps, 10);
        assert_eq!(page.scroll_y(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_hung_scroll_step_is_bounded() {
        let page = ScriptedPage::builder().scroll_hangs().build();
        let config = StabilizerConfig {
            step_timeout_ms: 2_000,
            ..StabilizerConfig::default()
        };
        let started = tokio::time::Instant::now();
        let report = stabilize(&page, &config).await;

        assert_eq!(report.scroll_steps, 0);
        assert!(!report.truncated);
        // settle + interval + one step ceiling + scroll-to-top + post-sweep settle
        assert!(started.elapsed() < Duration::from_millis(10_000));
    }
}

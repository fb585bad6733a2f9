//! Scan configuration: timeouts, stabilization tuning, capture and engine settings.
//!
//! All durations are stored as milliseconds. The delay values in
//! [`StabilizerConfig`] are tuning parameters, not readiness guarantees.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::domain::ImageFormat;

/// Errors raised while loading or validating configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("{0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct NavigationConfig {
    /// Network-idle load ceiling.
    pub strict_timeout_ms: u64,
    /// DOM-parsed fallback ceiling; must be shorter than the strict one.
    pub relaxed_timeout_ms: u64,
    /// Bound on installing request interception before the first load.
    pub intercept_install_timeout_ms: u64,
}

impl Default for NavigationConfig {
    fn default() -> Self {
        Self {
            strict_timeout_ms: 45_000,
            relaxed_timeout_ms: 15_000,
            intercept_install_timeout_ms: 10_000,
        }
    }
}

impl NavigationConfig {
    pub fn strict_timeout(&self) -> Duration {
        Duration::from_millis(self.strict_timeout_ms)
    }

    pub fn relaxed_timeout(&self) -> Duration {
        Duration::from_millis(self.relaxed_timeout_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StabilizerConfig {
    /// Upper bound on waiting for the page's font-loading signal.
    pub font_ceiling_ms: u64,
    /// Settle delay after fonts (post-font reflow).
    pub settle_ms: u64,
    pub scroll_step_px: u32,
    pub scroll_interval_ms: u64,
    /// Settle delay after the sweep (scroll-triggered animations).
    pub post_sweep_settle_ms: u64,
    /// Caps the sweep on infinite-scroll pages.
    pub max_scroll_steps: u32,
    /// Bound on each scroll step and on the final scroll back to the top.
    pub step_timeout_ms: u64,
}

impl Default for StabilizerConfig {
    fn default() -> Self {
        Self {
            font_ceiling_ms: 5_000,
            settle_ms: 1_000,
            scroll_step_px: 300,
            scroll_interval_ms: 100,
            post_sweep_settle_ms: 1_000,
            max_scroll_steps: 200,
            step_timeout_ms: 5_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CaptureConfig {
    pub format: ImageFormat,
    /// Compression quality (JPEG only), 1–100.
    pub quality: u8,
    pub timeout_ms: u64,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            format: ImageFormat::Jpeg,
            quality: 80,
            timeout_ms: 30_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CorrelationConfig {
    /// Bound on resolving one selector.
    pub lookup_timeout_ms: u64,
    /// Bound on the whole correlation pass; later nodes are dropped.
    pub stage_ceiling_ms: u64,
}

impl Default for CorrelationConfig {
    fn default() -> Self {
        Self {
            lookup_timeout_ms: 2_000,
            stage_ceiling_ms: 60_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AuditConfig {
    /// Bound on injecting and running the rule engine.
    pub timeout_ms: u64,
    /// Path to the rule engine's browser bundle (e.g. `axe.min.js`).
    pub engine_source: Option<PathBuf>,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 60_000,
            engine_source: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SecondaryConfig {
    pub enabled: bool,
    pub max_wait_for_fcp_ms: u64,
    pub max_wait_for_load_ms: u64,
    /// Hard ceiling on the whole stage.
    pub ceiling_ms: u64,
    /// Engine executable looked up on `PATH`.
    pub binary: String,
}

impl Default for SecondaryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_wait_for_fcp_ms: 15_000,
            max_wait_for_load_ms: 30_000,
            ceiling_ms: 120_000,
            binary: "lighthouse".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Maximum concurrently running browser processes; extra scans queue.
    pub max_concurrent_browsers: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_browsers: 2,
        }
    }
}

/// Complete scan configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ScanConfig {
    pub navigation: NavigationConfig,
    pub stabilizer: StabilizerConfig,
    pub capture: CaptureConfig,
    pub audit: AuditConfig,
    pub correlation: CorrelationConfig,
    pub secondary: SecondaryConfig,
    pub scheduler: SchedulerConfig,
}

impl ScanConfig {
    /// Load a JSON config file. Missing sections fall back to defaults.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: ScanConfig = serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let nav = &self.navigation;
        if nav.strict_timeout_ms == 0 || nav.relaxed_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "navigation timeouts must be greater than zero".into(),
            ));
        }
        if nav.relaxed_timeout_ms >= nav.strict_timeout_ms {
            return Err(ConfigError::Invalid(format!(
                "relaxed navigation timeout ({}ms) must be shorter than strict timeout ({}ms)",
                nav.relaxed_timeout_ms, nav.strict_timeout_ms
            )));
        }
        if self.stabilizer.scroll_step_px == 0 {
            return Err(ConfigError::Invalid("scroll_step_px must be greater than zero".into()));
        }
        if !(1..=100).contains(&self.capture.quality) {
            return Err(ConfigError::Invalid(format!(
                "capture quality must be within 1..=100, got {}",
                self.capture.quality
            )));
        }
        if self.audit.timeout_ms == 0
            || self.capture.timeout_ms == 0
            || self.stabilizer.step_timeout_ms == 0
            || self.navigation.intercept_install_timeout_ms == 0
            || self.correlation.lookup_timeout_ms == 0
            || self.correlation.stage_ceiling_ms == 0
        {
            return Err(ConfigError::Invalid("stage timeouts must be greater than zero".into()));
        }
        if self.secondary.enabled && self.secondary.ceiling_ms == 0 {
            return Err(ConfigError::Invalid("secondary ceiling must be greater than zero".into()));
        }
        if self.scheduler.max_concurrent_browsers == 0 {
            return Err(ConfigError::Invalid(
                "max_concurrent_browsers must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let cfg = ScanConfig::default();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.navigation.strict_timeout_ms, 45_000);
        assert_eq!(cfg.navigation.relaxed_timeout_ms, 15_000);
        assert_eq!(cfg.stabilizer.scroll_step_px, 300);
        assert_eq!(cfg.capture.quality, 80);
        assert_eq!(cfg.scheduler.max_concurrent_browsers, 2);
    }

    #[test]
    fn test_relaxed_must_be_shorter() {
        let mut cfg = ScanConfig::default();
        cfg.navigation.relaxed_timeout_ms = 45_000;
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("must be shorter"));
    }

    #[test]
    fn test_zero_stage_timeout_rejected() {
        let mut cfg = ScanConfig::default();
        cfg.correlation.lookup_timeout_ms = 0;
        assert!(cfg.validate().is_err());

        let mut cfg = ScanConfig::default();
        cfg.stabilizer.step_timeout_ms = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_zero_browsers_rejected() {
        let mut cfg = ScanConfig::default();
        cfg.scheduler.max_concurrent_browsers = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"navigation": {{"strict_timeout_ms": 20000}}, "secondary": {{"enabled": false}}}}"#).unwrap();

        let cfg = ScanConfig::from_file(file.path()).unwrap();
        assert_eq!(cfg.navigation.strict_timeout_ms, 20_000);
        assert_eq!(cfg.navigation.relaxed_timeout_ms, 15_000);
        assert!(!cfg.secondary.enabled);
        assert_eq!(cfg.stabilizer, StabilizerConfig::default());
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = ScanConfig::from_file(Path::new("/nonexistent/uxa.json")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}

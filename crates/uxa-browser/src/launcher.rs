//! Headless Chrome process management.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tempfile::TempDir;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use url::Url;
use uxa_core::{BrowserEndpoint, BrowserLauncher, BrowserSession, PageResult, RenderablePage};

use crate::cdp::CdpConnection;
use crate::error::{CdpError, CdpResult};
use crate::page::CdpPage;

const DEVTOOLS_BANNER: &str = "DevTools listening on ";
const BROWSER_CLOSE_GRACE: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ChromeConfig {
    pub binary: PathBuf,
    pub window_width: u32,
    pub window_height: u32,
    /// Time allowed for the process to announce its devtools endpoint.
    pub startup_timeout_ms: u64,
    /// Per-command ceiling; stage timeouts are expected to fire first.
    pub command_timeout_ms: u64,
    pub extra_args: Vec<String>,
}

impl Default for ChromeConfig {
    fn default() -> Self {
        Self {
            binary: std::env::var("UXA_CHROME")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("chromium")),
            window_width: 1920,
            window_height: 1080,
            startup_timeout_ms: 30_000,
            command_timeout_ms: 180_000,
            extra_args: Vec::new(),
        }
    }
}

impl ChromeConfig {
    pub fn with_binary(mut self, binary: impl Into<PathBuf>) -> Self {
        self.binary = binary.into();
        self
    }
}

pub fn chrome_args(config: &ChromeConfig, profile_dir: &Path) -> Vec<String> {
    let mut args = vec![
        "--headless=new".to_string(),
        "--remote-debugging-port=0".to_string(),
        format!("--user-data-dir={}", profile_dir.display()),
        "--no-sandbox".to_string(),
        "--disable-gpu".to_string(),
        "--disable-dev-shm-usage".to_string(),
        "--no-first-run".to_string(),
        "--no-default-browser-check".to_string(),
        "--hide-scrollbars".to_string(),
        "--mute-audio".to_string(),
        format!("--window-size={},{}", config.window_width, config.window_height),
    ];
    args.extend(config.extra_args.iter().cloned());
    args.push("about:blank".to_string());
    args
}

/// Extract the browser websocket URL from a Chrome stderr line.
pub fn parse_devtools_line(line: &str) -> Option<String> {
    let rest = line.trim().strip_prefix(DEVTOOLS_BANNER)?;
    rest.starts_with("ws://").then(|| rest.to_string())
}

pub fn port_from_ws_url(ws_url: &str) -> Option<u16> {
    Url::parse(ws_url).ok()?.port()
}

fn string_field(value: &Value, method: &str, field: &'static str) -> CdpResult<String> {
    value
        .get(field)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| CdpError::MissingField {
            method: method.to_string(),
            field,
        })
}

/// Starts one headless Chrome per session.
#[derive(Debug, Clone, Default)]
pub struct ChromeLauncher {
    config: ChromeConfig,
}

impl ChromeLauncher {
    pub fn new(config: ChromeConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ChromeConfig {
        &self.config
    }

    async fn start(&self) -> CdpResult<ChromeSession> {
        let profile = tempfile::Builder::new().prefix("uxa-chrome-").tempdir()?;
        let mut child = Command::new(&self.config.binary)
            .args(chrome_args(&self.config, profile.path()))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| CdpError::Launch(format!("{}: {e}", self.config.binary.display())))?;

        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| CdpError::Launch("browser stderr not captured".to_string()))?;
        let mut lines = BufReader::new(stderr).lines();

        let startup = Duration::from_millis(self.config.startup_timeout_ms);
        let ws_url = tokio::time::timeout(startup, async {
            while let Some(line) = lines.next_line().await? {
                if let Some(url) = parse_devtools_line(&line) {
                    return Ok::<String, CdpError>(url);
                }
            }
            Err(CdpError::Launch(
                "browser exited before announcing its devtools endpoint".to_string(),
            ))
        })
        .await
        .map_err(|_| CdpError::Timeout {
            method: "browser startup".to_string(),
            limit_ms: self.config.startup_timeout_ms,
        })??;

        // Keep draining so a chatty browser never blocks on a full pipe.
        tokio::spawn(async move {
            while let Ok(Some(line)) = lines.next_line().await {
                tracing::trace!(target: "uxa_browser::chrome", "{line}");
            }
        });

        let debug_port = port_from_ws_url(&ws_url)
            .ok_or_else(|| CdpError::Launch(format!("no port in devtools url {ws_url}")))?;

        let conn = Arc::new(
            CdpConnection::connect(
                &ws_url,
                Duration::from_millis(self.config.command_timeout_ms),
            )
            .await?,
        );
        let target = conn
            .send("Target.createTarget", json!({ "url": "about:blank" }), None)
            .await?;
        let target_id = string_field(&target, "Target.createTarget", "targetId")?;
        let attached = conn
            .send(
                "Target.attachToTarget",
                json!({ "targetId": target_id, "flatten": true }),
                None,
            )
            .await?;
        let session_id = string_field(&attached, "Target.attachToTarget", "sessionId")?;
        let page = CdpPage::attach(conn.clone(), session_id).await?;

        tracing::debug!(port = debug_port, pid = ?child.id(), "browser started");
        Ok(ChromeSession {
            page,
            conn,
            endpoint: BrowserEndpoint { ws_url, debug_port },
            child: Some(child),
            profile: Some(profile),
        })
    }
}

#[async_trait]
impl BrowserLauncher for ChromeLauncher {
    async fn launch(&self) -> PageResult<Box<dyn BrowserSession>> {
        let session = self.start().await?;
        Ok(Box::new(session))
    }
}

/// A running browser process plus its one attached page.
pub struct ChromeSession {
    page: CdpPage,
    conn: Arc<CdpConnection>,
    endpoint: BrowserEndpoint,
    child: Option<Child>,
    profile: Option<TempDir>,
}

#[async_trait]
impl BrowserSession for ChromeSession {
    fn page(&self) -> &dyn RenderablePage {
        &self.page
    }

    fn endpoint(&self) -> &BrowserEndpoint {
        &self.endpoint
    }

    async fn close(&mut self) -> PageResult<()> {
        let Some(mut child) = self.child.take() else {
            return Ok(());
        };
        let _ = tokio::time::timeout(
            BROWSER_CLOSE_GRACE,
            self.conn.send("Browser.close", json!({}), None),
        )
        .await;
        if let Err(e) = child.kill().await {
            tracing::debug!(error = %e, "browser already exited");
        }
        if let Some(profile) = self.profile.take() {
            if let Err(e) = profile.close() {
                tracing::warn!(error = %e, "failed to remove browser profile");
            }
        }
        tracing::debug!(port = self.endpoint.debug_port, "browser closed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_devtools_line() {
        assert_eq!(
            parse_devtools_line(
                "DevTools listening on ws://127.0.0.1:39781/devtools/browser/5b0c2f5e-7c1d-4a57-9a2a-0c8e"
            )
            .as_deref(),
            Some("ws://127.0.0.1:39781/devtools/browser/5b0c2f5e-7c1d-4a57-9a2a-0c8e")
        );
        assert!(parse_devtools_line("[1019/101500.123:ERROR:gpu_init.cc(523)] Passthrough is not supported").is_none());
        assert!(parse_devtools_line("DevTools listening on http://127.0.0.1:9222").is_none());
    }

    #[test]
    fn test_port_from_ws_url() {
        assert_eq!(port_from_ws_url("ws://127.0.0.1:39781/devtools/browser/abc"), Some(39781));
        assert_eq!(port_from_ws_url("not a url"), None);
    }

    #[test]
    fn test_chrome_args() {
        let config = ChromeConfig {
            extra_args: vec!["--lang=en-US".into()],
            ..ChromeConfig::default()
        };
        let args = chrome_args(&config, Path::new("/tmp/uxa-chrome-x"));
        assert!(args.contains(&"--headless=new".to_string()));
        assert!(args.contains(&"--remote-debugging-port=0".to_string()));
        assert!(args.contains(&"--user-data-dir=/tmp/uxa-chrome-x".to_string()));
        assert!(args.contains(&"--window-size=1920,1080".to_string()));
        assert!(args.contains(&"--lang=en-US".to_string()));
        assert_eq!(args.last().map(String::as_str), Some("about:blank"));
    }

    #[tokio::test]
    async fn test_missing_binary_fails_launch() {
        let launcher = ChromeLauncher::new(
            ChromeConfig::default().with_binary("/nonexistent/uxa-test-chrome"),
        );
        let err = match launcher.launch().await {
            Ok(_) => panic!("launch should fail"),
            Err(e) => e,
        };
        assert!(err.to_string().contains("browser launch failed"));
    }
}

//! UXability CLI
//!
//! The `uxa` command scans live pages and works with the saved reports.
//!
//! ## Commands
//!
//! - `scan`: audit one or more URLs, one JSON report per page
//! - `export`: render a saved report as PDF or CSV
//! - `explain`: ask the explanation service about one violation or audit item

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, Level};

use uxa_browser::{ChromeConfig, ChromeLauncher};
use uxa_core::explain::{audit_item_text, violation_text};
use uxa_core::metrics::METRICS;
use uxa_core::obs::ScanSpan;
use uxa_core::{
    AccessibilityEngine, BrowserLauncher, ExplanationBook, ExplanationKey, ExplanationService,
    ExplanationState, GeminiConfig, GeminiExplainer, LighthouseCli, ScanConfig,
    ScanFailure, ScanPipeline, ScanReport, ScanRequest, ScanScheduler,
};
use uxa_export::ExportFormat;

#[derive(Parser)]
#[command(name = "uxa")]
#[command(author = "UXability Team")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Accessibility, performance and SEO scans of live web pages", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan one or more pages
    Scan {
        /// Absolute http(s) URLs to scan
        #[arg(required = true)]
        urls: Vec<String>,

        /// JSON configuration file
        #[arg(long, env = "UXA_CONFIG")]
        config: Option<PathBuf>,

        /// Accessibility rule engine script
        #[arg(long, env = "UXA_AXE_SOURCE")]
        axe_source: Option<PathBuf>,

        /// Chrome or Chromium binary
        #[arg(long, env = "UXA_CHROME")]
        chrome: Option<PathBuf>,

        /// Maximum concurrently running browsers
        #[arg(long, env = "UXA_MAX_BROWSERS")]
        max_browsers: Option<usize>,

        /// Skip the performance/SEO audit
        #[arg(long)]
        no_secondary: bool,

        /// Directory for the JSON reports
        #[arg(short, long, default_value = ".")]
        out: PathBuf,
    },

    /// Render a saved report as PDF or CSV
    Export {
        /// Report written by `uxa scan`
        report: PathBuf,

        /// Output format: pdf or csv
        #[arg(short, long)]
        format: ExportFormat,

        /// Output file (default: report.pdf / report.csv next to the report)
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Explain one violation or secondary audit item
    Explain {
        /// Report written by `uxa scan`
        report: PathBuf,

        /// Violation rule id, e.g. image-alt
        #[arg(long, required_unless_present = "audit_item", conflicts_with = "audit_item")]
        violation: Option<String>,

        /// Secondary audit item id, e.g. uses-text-compression
        #[arg(long)]
        audit_item: Option<String>,

        /// API key for the explanation service
        #[arg(long, env = "GEMINI_API_KEY", hide_env_values = true)]
        api_key: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    uxa_core::init_tracing(cli.json, level);

    match cli.command {
        Commands::Scan {
            urls,
            config,
            axe_source,
            chrome,
            max_browsers,
            no_secondary,
            out,
        } => {
            let overrides = ScanOverrides {
                axe_source,
                max_browsers,
                no_secondary,
            };
            cmd_scan(&urls, config.as_deref(), &overrides, chrome, &out).await
        }
        Commands::Export {
            report,
            format,
            out,
        } => cmd_export(&report, format, out.as_deref()).map(|_| ()),
        Commands::Explain {
            report,
            violation,
            audit_item,
            api_key,
        } => {
            let key = match (violation, audit_item) {
                (Some(id), _) => ExplanationKey::Violation(id),
                (None, Some(id)) => ExplanationKey::AuditItem(id),
                (None, None) => anyhow::bail!("pass --violation or --audit-item"),
            };
            let mut config = GeminiConfig::from_env();
            if let Some(key) = api_key.as_deref() {
                config = config.with_api_key(key);
            }
            let service = GeminiExplainer::new(config)?;
            let text = cmd_explain(&report, key, &service).await?;
            println!("{text}");
            Ok(())
        }
    }
}

/// Command-line values that win over the config file.
#[derive(Debug, Default)]
struct ScanOverrides {
    axe_source: Option<PathBuf>,
    max_browsers: Option<usize>,
    no_secondary: bool,
}

fn load_config(path: Option<&Path>, overrides: &ScanOverrides) -> Result<ScanConfig> {
    let mut config = match path {
        Some(path) => ScanConfig::from_file(path)
            .with_context(|| format!("Failed to load config {:?}", path))?,
        None => ScanConfig::default(),
    };
    if let Some(source) = &overrides.axe_source {
        config.audit.engine_source = Some(source.clone());
    }
    if let Some(n) = overrides.max_browsers {
        config.scheduler.max_concurrent_browsers = n;
    }
    if overrides.no_secondary {
        config.secondary.enabled = false;
    }
    config.validate()?;
    Ok(config)
}

/// One line of `index.json` in the output directory.
#[derive(Debug, Serialize)]
struct ManifestEntry {
    url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    report: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    failure: Option<ScanFailure>,
}

#[derive(Debug, Default, Serialize)]
struct ScanManifest {
    entries: Vec<ManifestEntry>,
}

impl ScanManifest {
    fn failures(&self) -> impl Iterator<Item = &ScanFailure> {
        self.entries.iter().filter_map(|e| e.failure.as_ref())
    }
}

fn report_file_name(index: usize) -> String {
    format!("{}-report.json", index + 1)
}

fn summary_line(report: &ScanReport) -> String {
    let audit = report.audit();
    let groups = audit.group_by_impact();
    let by_impact = if groups.is_empty() {
        "clean".to_string()
    } else {
        groups
            .iter()
            .map(|g| format!("{} {}", g.violations.len(), g.impact))
            .collect::<Vec<_>>()
            .join(", ")
    };
    let secondary = match report.secondary_audit().scores {
        Some(s) if !report.secondary_audit().is_degraded() => format!(
            "perf {} / a11y {} / bp {} / seo {}",
            s.performance, s.accessibility, s.best_practices, s.seo
        ),
        _ => "secondary unavailable".to_string(),
    };
    format!(
        "{}: {} violations ({}), {} heatmap points, {}",
        report.url(),
        audit.violations.len(),
        by_impact,
        report.heatmap().len(),
        secondary
    )
}

/// Scan `urls` in order and write one report per successful scan into `out`.
async fn run_scans(scheduler: &ScanScheduler, urls: &[String], out: &Path) -> Result<ScanManifest> {
    std::fs::create_dir_all(out).with_context(|| format!("Failed to create {:?}", out))?;

    let mut manifest = ScanManifest::default();
    let mut pending = Vec::new();
    for (index, url) in urls.iter().enumerate() {
        match ScanRequest::new(url) {
            Ok(request) => pending.push((index, request)),
            Err(e) => manifest.entries.push(ManifestEntry {
                url: url.clone(),
                report: None,
                failure: Some(e.to_failure()),
            }),
        }
    }

    let (indices, requests): (Vec<usize>, Vec<ScanRequest>) = pending.into_iter().unzip();
    let results = scheduler.scan_all(requests).await;

    for (index, result) in indices.into_iter().zip(results) {
        let url = urls[index].clone();
        match result {
            Ok(report) => {
                let path = out.join(report_file_name(index));
                let json = serde_json::to_string_pretty(&report)?;
                std::fs::write(&path, json)
                    .with_context(|| format!("Failed to write report to {:?}", path))?;
                info!(scan_id = %report.scan_id(), path = %path.display(), "report written");
                println!("{}", summary_line(&report));
                manifest.entries.push(ManifestEntry {
                    url,
                    report: Some(path),
                    failure: None,
                });
            }
            Err(e) => manifest.entries.push(ManifestEntry {
                url,
                report: None,
                failure: Some(e.to_failure()),
            }),
        }
    }

    let order = |entry: &ManifestEntry| urls.iter().position(|u| *u == entry.url);
    manifest.entries.sort_by_key(order);

    let index_path = out.join("index.json");
    std::fs::write(&index_path, serde_json::to_string_pretty(&manifest)?)
        .with_context(|| format!("Failed to write {:?}", index_path))?;
    Ok(manifest)
}

async fn cmd_scan(
    urls: &[String],
    config_path: Option<&Path>,
    overrides: &ScanOverrides,
    chrome: Option<PathBuf>,
    out: &Path,
) -> Result<()> {
    let config = load_config(config_path, overrides)?;
    let engine_path = config.audit.engine_source.clone().context(
        "No accessibility engine configured; pass --axe-source or set UXA_AXE_SOURCE",
    )?;
    let engine = AccessibilityEngine::load(&engine_path)?;
    let secondary = Arc::new(LighthouseCli::from_config(&config.secondary));

    let mut chrome_config = ChromeConfig::default();
    if let Some(binary) = chrome {
        chrome_config = chrome_config.with_binary(binary);
    }
    let launcher: Arc<dyn BrowserLauncher> = Arc::new(ChromeLauncher::new(chrome_config));
    let pipeline = Arc::new(ScanPipeline::new(config, engine, secondary));
    let scheduler = ScanScheduler::new(pipeline, launcher);

    let manifest = run_scans(&scheduler, urls, out).await?;
    METRICS.flush();

    let failed = manifest.failures().count();
    for failure in manifest.failures() {
        println!("{}", serde_json::to_string(failure)?);
    }
    if failed > 0 {
        anyhow::bail!("{} of {} scans failed", failed, urls.len());
    }
    Ok(())
}

fn read_report(path: &Path) -> Result<ScanReport> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read report {:?}", path))?;
    ScanReport::from_json(&raw).with_context(|| format!("Not a scan report: {:?}", path))
}

fn cmd_export(report_path: &Path, format: ExportFormat, out: Option<&Path>) -> Result<PathBuf> {
    let report = read_report(report_path)?;
    let _span = ScanSpan::enter(&report.scan_id().to_string(), report.url());
    let artifact = uxa_export::export(&report, format)?;

    let target = match out {
        Some(path) => path.to_path_buf(),
        None => report_path
            .parent()
            .unwrap_or_else(|| Path::new("."))
            .join(&artifact.file_name),
    };
    std::fs::write(&target, &artifact.bytes)
        .with_context(|| format!("Failed to write to {:?}", target))?;
    println!(
        "Wrote {} ({}, {} bytes)",
        target.display(),
        artifact.content_type,
        artifact.bytes.len()
    );
    Ok(target)
}

async fn cmd_explain(
    report_path: &Path,
    key: ExplanationKey,
    service: &dyn ExplanationService,
) -> Result<String> {
    let report = read_report(report_path)?;
    let text = match &key {
        ExplanationKey::Violation(id) => report
            .audit()
            .violations
            .iter()
            .find(|v| v.id == *id)
            .map(|v| violation_text(v).to_string())
            .with_context(|| format!("No violation {:?} in {:?}", id, report_path))?,
        ExplanationKey::AuditItem(id) => audit_item_text(&report, id)
            .with_context(|| format!("No audit item {:?} in {:?}", id, report_path))?,
    };

    let book = ExplanationBook::new();
    match book.request(key, &text, service).await {
        ExplanationState::Resolved(summary) => Ok(summary),
        ExplanationState::Failed(placeholder) => Ok(placeholder),
        other => anyhow::bail!("Explanation did not complete: {:?}", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use uxa_core::fakes::{AuditScript, CannedExplainer, FakeLauncher, ScriptedPage, StaticSecondaryEngine};

    fn scheduler(launcher: Arc<FakeLauncher>) -> ScanScheduler {
        let pipeline = ScanPipeline::new(
            ScanConfig::default(),
            AccessibilityEngine::from_source("window.axe = { run: () => {} };"),
            Arc::new(StaticSecondaryEngine::perfect()),
        );
        ScanScheduler::new(Arc::new(pipeline), launcher)
    }

    fn page_with_violation() -> ScriptedPage {
        ScriptedPage::builder()
            .element("img.hero", 40.0, 100.0, 320.0, 180.0)
            .audit(AuditScript::Payload(json!({
                "violations": [{
                    "id": "image-alt",
                    "impact": "critical",
                    "description": "Ensures <img> elements have alternate text or a role of none or presentation",
                    "help": "Images must have alternate text",
                    "nodes": [{"target": ["img.hero"], "failureSummary": "Element does not have an alt attribute"}]
                }],
                "passes": [],
                "incomplete": []
            })))
            .build()
    }

    async fn scanned_report(dir: &Path) -> PathBuf {
        let launcher = Arc::new(FakeLauncher::new(page_with_violation));
        let urls = vec!["https://shop.example.com/".to_string()];
        let manifest = run_scans(&scheduler(launcher), &urls, dir).await.unwrap();
        manifest.entries[0].report.clone().unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_scan_writes_numbered_reports_and_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let launcher = Arc::new(FakeLauncher::new(page_with_violation));
        let urls = vec![
            "https://shop.example.com/".to_string(),
            "https://shop.example.com/cart".to_string(),
        ];

        let manifest = run_scans(&scheduler(launcher.clone()), &urls, dir.path())
            .await
            .unwrap();

        assert_eq!(manifest.failures().count(), 0);
        assert!(dir.path().join("1-report.json").exists());
        assert!(dir.path().join("2-report.json").exists());
        assert!(dir.path().join("index.json").exists());
        assert_eq!(launcher.launches(), 2);
        assert_eq!(launcher.closes(), 2);

        let report = read_report(&dir.path().join("2-report.json")).unwrap();
        assert_eq!(report.url(), "https://shop.example.com/cart");
        assert_eq!(report.heatmap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalid_url_fails_without_launching() {
        let dir = tempfile::tempdir().unwrap();
        let launcher = Arc::new(FakeLauncher::new(page_with_violation));
        let urls = vec![
            "ftp://files.example.com/".to_string(),
            "https://shop.example.com/".to_string(),
        ];

        let manifest = run_scans(&scheduler(launcher.clone()), &urls, dir.path())
            .await
            .unwrap();

        assert_eq!(launcher.launches(), 1);
        let failures: Vec<_> = manifest.failures().collect();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].kind, "invalid_request");
        assert_eq!(manifest.entries[0].url, "ftp://files.example.com/");
        assert!(!dir.path().join("1-report.json").exists());
        assert!(dir.path().join("2-report.json").exists());
    }

    #[tokio::test(start_paused = true)]
    async fn test_summary_line_lists_present_tiers() {
        let dir = tempfile::tempdir().unwrap();
        let report = read_report(&scanned_report(dir.path()).await).unwrap();
        let line = summary_line(&report);
        assert!(line.starts_with("https://shop.example.com/: 1 violations (1 critical), 1 heatmap points"));
        assert!(line.ends_with("perf 100 / a11y 100 / bp 100 / seo 100"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_export_csv_next_to_report() {
        let dir = tempfile::tempdir().unwrap();
        let report = scanned_report(dir.path()).await;

        let written = cmd_export(&report, ExportFormat::Csv, None).unwrap();
        assert_eq!(written, dir.path().join("report.csv"));
        let csv = std::fs::read_to_string(written).unwrap();
        let lines: Vec<_> = csv.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[1].starts_with("critical,Images must have alternate text"));
        assert!(lines[1].ends_with("img.hero"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_export_pdf_to_explicit_path() {
        let dir = tempfile::tempdir().unwrap();
        let report = scanned_report(dir.path()).await;
        let target = dir.path().join("out.pdf");

        cmd_export(&report, ExportFormat::Pdf, Some(&target)).unwrap();
        let bytes = std::fs::read(target).unwrap();
        assert!(bytes.starts_with(b"%PDF"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_explain_violation_uses_description() {
        let dir = tempfile::tempdir().unwrap();
        let report = scanned_report(dir.path()).await;
        let service = CannedExplainer::new("Images need alt text. Add a descriptive alt attribute.");

        let text = cmd_explain(&report, ExplanationKey::Violation("image-alt".into()), &service)
            .await
            .unwrap();

        assert_eq!(text, "Images need alt text. Add a descriptive alt attribute.");
        assert_eq!(service.calls(), 1);
        assert!(service.prompts()[0].contains("Ensures <img> elements have alternate text"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_explain_unknown_violation_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let report = scanned_report(dir.path()).await;
        let service = CannedExplainer::new("unused");

        let err = cmd_explain(&report, ExplanationKey::Violation("color-contrast".into()), &service)
            .await
            .unwrap_err();
        assert!(format!("{err:#}").contains("No violation"));
        assert_eq!(service.calls(), 0);
    }

    #[test]
    fn test_load_config_overrides() {
        let overrides = ScanOverrides {
            axe_source: Some(PathBuf::from("/opt/axe/axe.min.js")),
            max_browsers: Some(4),
            no_secondary: true,
        };
        let config = load_config(None, &overrides).unwrap();
        assert_eq!(config.audit.engine_source, Some(PathBuf::from("/opt/axe/axe.min.js")));
        assert_eq!(config.scheduler.max_concurrent_browsers, 4);
        assert!(!config.secondary.enabled);

        let zero = ScanOverrides {
            max_browsers: Some(0),
            ..ScanOverrides::default()
        };
        assert!(load_config(None, &zero).is_err());
    }

    #[test]
    fn test_report_file_names_are_one_based() {
        assert_eq!(report_file_name(0), "1-report.json");
        assert_eq!(report_file_name(9), "10-report.json");
    }
}

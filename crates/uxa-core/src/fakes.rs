//! In-memory fakes for the browser, engine and explanation traits (testing only)
//!
//! Provides `ScriptedPage`, `FakeLauncher`, `StaticGeometry`,
//! `StaticSecondaryEngine`, `FailingSecondaryEngine` and `CannedExplainer`,
//! which satisfy the trait contracts without a browser or network.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::anyhow;
use async_trait::async_trait;
use serde_json::{json, Value};

use crate::domain::CategoryScores;
use crate::explain::ExplanationService;
use crate::heatmap::{ElementGeometry, GeometryResolver};
use crate::interception::{InterceptDecision, InterceptedRequest, RequestFilter};
use crate::page::*;
use crate::scripts;
use crate::secondary::{EngineReport, SecondaryAuditEngine, SecondaryAuditRequest};

/// Minimal JPEG markers; enough for the core, not decodable.
pub const FAKE_JPEG: [u8; 4] = [0xff, 0xd8, 0xff, 0xd9];

// ---------------------------------------------------------------------------
// ScriptedPage
// ---------------------------------------------------------------------------

/// How navigation attempts behave.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NavigationScript {
    Succeed,
    /// Network-idle never settles; DOM-parsed succeeds.
    HangStrict,
    /// Network-idle errors out; DOM-parsed succeeds.
    FailStrict(String),
    FailAll(String),
}

/// How the rule engine behaves.
#[derive(Debug, Clone, PartialEq)]
pub enum AuditScript {
    Payload(Value),
    InjectionFails(String),
    /// Injection reports success but the engine global never appears.
    EngineMissing,
    RunThrows(String),
}

fn empty_audit() -> Value {
    json!({ "violations": [], "passes": [], "incomplete": [] })
}

#[derive(Default)]
struct PageState {
    navigations: Vec<WaitPolicy>,
    scroll_y: u64,
    scroll_steps: u32,
    engine_loaded: bool,
    injected_styles: usize,
    resolve_calls: usize,
    filter: Option<Arc<dyn RequestFilter>>,
}

pub struct ScriptedPageBuilder {
    navigation: NavigationScript,
    navigation_delay: Duration,
    fonts_hang: bool,
    width: u32,
    height: u32,
    growth: u32,
    elements: HashMap<String, ElementGeometry>,
    scroll_offset: (f64, f64),
    audit: AuditScript,
    style_fails: bool,
    screenshot: Result<Vec<u8>, String>,
    hangs: Hangs,
}

/// Page calls that never answer.
#[derive(Debug, Clone, Copy, Default)]
struct Hangs {
    scroll: bool,
    measure: bool,
    resolve: bool,
    intercept: bool,
}

impl Default for ScriptedPageBuilder {
    fn default() -> Self {
        Self {
            navigation: NavigationScript::Succeed,
            navigation_delay: Duration::ZERO,
            fonts_hang: false,
            width: 1280,
            height: 2400,
            growth: 0,
            elements: HashMap::new(),
            scroll_offset: (0.0, 0.0),
            audit: AuditScript::Payload(empty_audit()),
            style_fails: false,
            screenshot: Ok(FAKE_JPEG.to_vec()),
            hangs: Hangs::default(),
        }
    }
}

impl ScriptedPageBuilder {
    pub fn navigation(mut self, script: NavigationScript) -> Self {
        self.navigation = script;
        self
    }

    /// Every navigation attempt takes this long before its outcome.
    pub fn navigation_delay(mut self, delay: Duration) -> Self {
        self.navigation_delay = delay;
        self
    }

    pub fn fonts_hang(mut self) -> Self {
        self.fonts_hang = true;
        self
    }

    pub fn document_size(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    /// Scrollable height grows by `px` on every sweep step.
    pub fn growing_height(mut self, px: u32) -> Self {
        self.growth = px;
        self
    }

    /// Register an element by selector with its viewport-relative rect.
    pub fn element(mut self, selector: &str, left: f64, top: f64, width: f64, height: f64) -> Self {
        self.elements.insert(
            selector.to_string(),
            ElementGeometry {
                left,
                top,
                width,
                height,
            },
        );
        self
    }

    /// Scroll offset observed when selectors are resolved.
    pub fn scroll_offset(mut self, x: f64, y: f64) -> Self {
        self.scroll_offset = (x, y);
        self
    }

    pub fn audit(mut self, script: AuditScript) -> Self {
        self.audit = script;
        self
    }

    pub fn style_injection_fails(mut self) -> Self {
        self.style_fails = true;
        self
    }

    pub fn screenshot_bytes(mut self, bytes: Vec<u8>) -> Self {
        self.screenshot = Ok(bytes);
        self
    }

    pub fn screenshot_fails(mut self, message: &str) -> Self {
        self.screenshot = Err(message.to_string());
        self
    }

    /// Scroll steps and the scroll back to the top never answer.
    pub fn scroll_hangs(mut self) -> Self {
        self.hangs.scroll = true;
        self
    }

    /// The document-size query never answers.
    pub fn measure_hangs(mut self) -> Self {
        self.hangs.measure = true;
        self
    }

    /// Selector lookups are counted but never answer.
    pub fn resolve_hangs(mut self) -> Self {
        self.hangs.resolve = true;
        self
    }

    /// Installing request interception never completes.
    pub fn intercept_hangs(mut self) -> Self {
        self.hangs.intercept = true;
        self
    }

    pub fn build(self) -> ScriptedPage {
        ScriptedPage {
            script: self,
            state: Mutex::new(PageState::default()),
        }
    }
}

/// In-memory Renderable Page driven by a fixed script.
pub struct ScriptedPage {
    script: ScriptedPageBuilder,
    state: Mutex<PageState>,
}

impl ScriptedPage {
    pub fn builder() -> ScriptedPageBuilder {
        ScriptedPageBuilder::default()
    }

    pub fn navigations(&self) -> Vec<WaitPolicy> {
        self.state.lock().unwrap().navigations.clone()
    }

    pub fn scroll_y(&self) -> u64 {
        self.state.lock().unwrap().scroll_y
    }

    pub fn injected_styles(&self) -> usize {
        self.state.lock().unwrap().injected_styles
    }

    /// Number of selector lookups evaluated.
    pub fn resolve_calls(&self) -> usize {
        self.state.lock().unwrap().resolve_calls
    }

    /// Ask the installed request filter, if any.
    pub fn filter_decision(&self, request: &InterceptedRequest) -> Option<InterceptDecision> {
        let filter = self.state.lock().unwrap().filter.clone();
        filter.map(|f| f.decide(request))
    }

    fn current_height(&self, steps: u32) -> u64 {
        u64::from(self.script.height) + u64::from(self.script.growth) * u64::from(steps)
    }

    fn resolve(&self, script: &str) -> Value {
        self.state.lock().unwrap().resolve_calls += 1;

        let Some(rest) = script.split_once("const selector = ").map(|(_, r)| r) else {
            return Value::Null;
        };
        let selector = serde_json::Deserializer::from_str(rest)
            .into_iter::<String>()
            .next()
            .and_then(Result::ok);

        match selector.and_then(|s| self.script.elements.get(&s).copied()) {
            Some(g) => json!({
                "left": g.left + self.script.scroll_offset.0,
                "top": g.top + self.script.scroll_offset.1,
                "width": g.width,
                "height": g.height,
            }),
            None => Value::Null,
        }
    }
}

fn parse_step(script: &str) -> u64 {
    script
        .split_once("const step = ")
        .and_then(|(_, rest)| rest.split(';').next())
        .and_then(|n| n.trim().parse().ok())
        .unwrap_or(0)
}

#[async_trait]
impl RenderablePage for ScriptedPage {
    async fn navigate(&self, url: &str, wait: WaitPolicy, _timeout: Duration) -> PageResult<NavigationOutcome> {
        self.state.lock().unwrap().navigations.push(wait);
        if !self.script.navigation_delay.is_zero() {
            tokio::time::sleep(self.script.navigation_delay).await;
        }

        let strict = wait == WaitPolicy::NetworkIdle;
        match &self.script.navigation {
            NavigationScript::HangStrict if strict => std::future::pending().await,
            NavigationScript::FailStrict(msg) if strict => Err(PageError::Navigation(msg.clone())),
            NavigationScript::FailAll(msg) => Err(PageError::Navigation(msg.clone())),
            _ => Ok(NavigationOutcome {
                final_url: url.to_string(),
                wait_policy: wait,
            }),
        }
    }

    async fn evaluate(&self, script: &str) -> PageResult<Value> {
        match scripts::tag_of(script) {
            Some("fonts-ready") => {
                if self.script.fonts_hang {
                    std::future::pending::<()>().await;
                }
                Ok(Value::Bool(true))
            }
            Some("scroll-by" | "scroll-top") if self.script.hangs.scroll => {
                std::future::pending::<()>().await;
                Ok(Value::Null)
            }
            Some("document-size") if self.script.hangs.measure => {
                std::future::pending::<()>().await;
                Ok(Value::Null)
            }
            Some("resolve") if self.script.hangs.resolve => {
                self.state.lock().unwrap().resolve_calls += 1;
                std::future::pending::<()>().await;
                Ok(Value::Null)
            }
            Some("scroll-by") => {
                let mut state = self.state.lock().unwrap();
                state.scroll_y += parse_step(script);
                state.scroll_steps += 1;
                Ok(json!(self.current_height(state.scroll_steps)))
            }
            Some("scroll-top") => {
                self.state.lock().unwrap().scroll_y = 0;
                Ok(Value::Bool(true))
            }
            Some("document-size") => {
                let steps = self.state.lock().unwrap().scroll_steps;
                Ok(json!({ "width": self.script.width, "height": self.current_height(steps) }))
            }
            Some("audit-probe") => Ok(Value::Bool(self.state.lock().unwrap().engine_loaded)),
            Some("audit-run") => match &self.script.audit {
                AuditScript::Payload(v) => Ok(v.clone()),
                AuditScript::RunThrows(msg) => Err(PageError::Script(msg.clone())),
                _ => Ok(empty_audit()),
            },
            Some("resolve") => Ok(self.resolve(script)),
            _ => Err(PageError::Script(format!("unsupported script: {script}"))),
        }
    }

    async fn inject_script(&self, _source: &str) -> PageResult<()> {
        match &self.script.audit {
            AuditScript::InjectionFails(msg) => Err(PageError::Script(msg.clone())),
            AuditScript::EngineMissing => Ok(()),
            _ => {
                self.state.lock().unwrap().engine_loaded = true;
                Ok(())
            }
        }
    }

    async fn inject_style(&self, _source: &str) -> PageResult<()> {
        if self.script.style_fails {
            return Err(PageError::Script("style-src blocked by content security policy".into()));
        }
        self.state.lock().unwrap().injected_styles += 1;
        Ok(())
    }

    async fn screenshot(&self, _options: &ScreenshotOptions) -> PageResult<Vec<u8>> {
        self.script.screenshot.clone().map_err(PageError::Protocol)
    }

    async fn intercept_requests(&self, filter: Arc<dyn RequestFilter>) -> PageResult<()> {
        if self.script.hangs.intercept {
            std::future::pending::<()>().await;
        }
        self.state.lock().unwrap().filter = Some(filter);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// FakeLauncher
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct LauncherCounters {
    launches: AtomicUsize,
    closes: AtomicUsize,
    open: AtomicUsize,
    peak_open: AtomicUsize,
}

pub struct FakeSession {
    page: ScriptedPage,
    endpoint: BrowserEndpoint,
    closed: bool,
    counters: Arc<LauncherCounters>,
}

impl FakeSession {
    pub fn new(page: ScriptedPage) -> Self {
        Self {
            page,
            endpoint: BrowserEndpoint {
                ws_url: "ws://127.0.0.1:9222/devtools/browser/fake".to_string(),
                debug_port: 9222,
            },
            closed: false,
            counters: Arc::new(LauncherCounters::default()),
        }
    }

    pub fn scripted_page(&self) -> &ScriptedPage {
        &self.page
    }
}

#[async_trait]
impl BrowserSession for FakeSession {
    fn page(&self) -> &dyn RenderablePage {
        &self.page
    }

    fn endpoint(&self) -> &BrowserEndpoint {
        &self.endpoint
    }

    async fn close(&mut self) -> PageResult<()> {
        if !self.closed {
            self.closed = true;
            self.counters.closes.fetch_add(1, Ordering::SeqCst);
            self.counters.open.fetch_sub(1, Ordering::SeqCst);
        }
        Ok(())
    }
}

type PageFactory = Box<dyn Fn() -> ScriptedPage + Send + Sync>;

/// Launcher producing `FakeSession`s; counts launches, closes and peak
/// concurrently open sessions.
pub struct FakeLauncher {
    factory: PageFactory,
    failure: Option<String>,
    counters: Arc<LauncherCounters>,
}

impl FakeLauncher {
    pub fn new(factory: impl Fn() -> ScriptedPage + Send + Sync + 'static) -> Self {
        Self {
            factory: Box::new(factory),
            failure: None,
            counters: Arc::new(LauncherCounters::default()),
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            failure: Some(message.to_string()),
            ..Self::new(|| ScriptedPage::builder().build())
        }
    }

    pub fn launches(&self) -> usize {
        self.counters.launches.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.counters.closes.load(Ordering::SeqCst)
    }

    pub fn peak_open(&self) -> usize {
        self.counters.peak_open.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BrowserLauncher for FakeLauncher {
    async fn launch(&self) -> PageResult<Box<dyn BrowserSession>> {
        if let Some(msg) = &self.failure {
            return Err(PageError::Protocol(msg.clone()));
        }
        self.counters.launches.fetch_add(1, Ordering::SeqCst);
        let open = self.counters.open.fetch_add(1, Ordering::SeqCst) + 1;
        self.counters.peak_open.fetch_max(open, Ordering::SeqCst);

        let mut session = FakeSession::new((self.factory)());
        session.counters = self.counters.clone();
        Ok(Box::new(session))
    }
}

// ---------------------------------------------------------------------------
// StaticGeometry
// ---------------------------------------------------------------------------

/// Selector-to-geometry map that counts lookups.
#[derive(Debug, Default)]
pub struct StaticGeometry {
    elements: HashMap<String, ElementGeometry>,
    calls: AtomicUsize,
}

impl StaticGeometry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, selector: &str, geometry: ElementGeometry) -> Self {
        self.elements.insert(selector.to_string(), geometry);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl GeometryResolver for StaticGeometry {
    async fn resolve(&self, selector: &str) -> Option<ElementGeometry> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.elements.get(selector).copied()
    }
}

// ---------------------------------------------------------------------------
// Secondary engines
// ---------------------------------------------------------------------------

/// Returns fixed scores, or never answers when built with `hanging()`.
#[derive(Debug)]
pub struct StaticSecondaryEngine {
    scores: CategoryScores,
    hang: bool,
    calls: AtomicUsize,
}

impl StaticSecondaryEngine {
    pub fn new(scores: CategoryScores) -> Self {
        Self {
            scores,
            hang: false,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn perfect() -> Self {
        Self::new(CategoryScores {
            performance: 100,
            accessibility: 100,
            best_practices: 100,
            seo: 100,
        })
    }

    pub fn hanging() -> Self {
        Self {
            hang: true,
            ..Self::perfect()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SecondaryAuditEngine for StaticSecondaryEngine {
    async fn audit(&self, request: &SecondaryAuditRequest) -> anyhow::Result<EngineReport> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.hang {
            std::future::pending::<()>().await;
        }
        Ok(EngineReport {
            scores: self.scores,
            raw: json!({
                "finalDisplayedUrl": request.url,
                "audits": {
                    "uses-text-compression": {
                        "title": "Enable text compression",
                        "description": "Text-based resources should be served with compression."
                    }
                }
            }),
        })
    }
}

/// Always raises the given message.
#[derive(Debug)]
pub struct FailingSecondaryEngine {
    message: String,
}

impl FailingSecondaryEngine {
    pub fn new(message: &str) -> Self {
        Self {
            message: message.to_string(),
        }
    }
}

#[async_trait]
impl SecondaryAuditEngine for FailingSecondaryEngine {
    async fn audit(&self, _request: &SecondaryAuditRequest) -> anyhow::Result<EngineReport> {
        Err(anyhow!("{}", self.message))
    }
}

// ---------------------------------------------------------------------------
// CannedExplainer
// ---------------------------------------------------------------------------

/// Replies with a fixed summary or a fixed error, recording prompts.
#[derive(Debug)]
pub struct CannedExplainer {
    reply: Result<String, String>,
    prompts: Mutex<Vec<String>>,
}

impl CannedExplainer {
    pub fn new(summary: &str) -> Self {
        Self {
            reply: Ok(summary.to_string()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            reply: Err(message.to_string()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl ExplanationService for CannedExplainer {
    async fn explain(&self, prompt: &str) -> anyhow::Result<String> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        self.reply.clone().map_err(|e| anyhow!(e))
    }
}

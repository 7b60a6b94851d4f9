//! Scripted in-memory backend for pipeline tests
//!
//! Pages are keyed by URL path. Each session answers the scripts from
//! `docshot::scripts` against its own page state, so tests exercise the real
//! pipeline without a browser.

#![allow(dead_code)]

use docshot::backend::{Engine, EngineLauncher, PdfPageSetup, SessionDriver};
use docshot::diagnostics::{DiagnosticReport, DiagnosticsSink};
use docshot::{scripts, CaptureConfig, Capturer, EngineConfig, Error, Result};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use url::Url;

pub const PNG_MAGIC: &[u8] = b"\x89PNG\r\n\x1a\n";
pub const PDF_MAGIC: &[u8] = b"%PDF-";

const READY_ATTRIBUTE: &str = "data-render-state";
const READY_VALUE: &str = "ready";
const LOGO_SELECTOR: &str = "img[data-logo]";
const CODE_SELECTOR: &str = "pre code";

/// How one document of the fake site behaves
#[derive(Debug, Clone)]
pub struct FakePage {
    pub root_selector: String,
    /// Root element exists once navigation is done
    pub root_present: bool,
    /// Ready sentinel appears this long after navigation; `None` never
    pub ready_after: Option<Duration>,
    pub fonts_loaded: bool,
    pub logo_loaded: bool,
    pub code_rendered: bool,
    /// Scroll height of the root in the rebuilt document
    pub content_height_px: f64,
    /// Root markup is missing from the snapshot even though readiness passed
    pub drop_root_from_snapshot: bool,
    pub navigation_error: Option<String>,
    /// Navigation takes this long to commit
    pub navigation_delay: Option<Duration>,
    /// Each evaluation of the ready sentinel blocks this long
    pub ready_check_hangs: Option<Duration>,
    /// Root disappears after this many presence checks
    pub root_checks_before_removal: Option<usize>,
    /// Stylesheets of the rebuilt document never finish loading
    pub stylesheets_stall: bool,
    /// Fonts never finish loading once the document is rebuilt
    pub fonts_stall_after_rebuild: bool,
    /// Replacing the document throws
    pub reject_rebuild: bool,
    /// The engine dies while printing
    pub crash_on_print: bool,
}

impl FakePage {
    pub fn resume() -> Self {
        Self {
            root_selector: "#resume-root".to_string(),
            root_present: true,
            ready_after: Some(Duration::ZERO),
            fonts_loaded: true,
            logo_loaded: true,
            code_rendered: false,
            content_height_px: 1122.0,
            drop_root_from_snapshot: false,
            navigation_error: None,
            navigation_delay: None,
            ready_check_hangs: None,
            root_checks_before_removal: None,
            stylesheets_stall: false,
            fonts_stall_after_rebuild: false,
            reject_rebuild: false,
            crash_on_print: false,
        }
    }

    pub fn banner() -> Self {
        Self {
            root_selector: "#banner-root".to_string(),
            code_rendered: true,
            ..Self::resume()
        }
    }

    pub fn ready_after(mut self, delay: Option<Duration>) -> Self {
        self.ready_after = delay;
        self
    }

    pub fn height(mut self, px: f64) -> Self {
        self.content_height_px = px;
        self
    }
}

/// What the fake observed, for assertions
#[derive(Debug, Default)]
pub struct Journal {
    pub navigations: Vec<String>,
    pub rebuilt_documents: Vec<String>,
    pub prints: Vec<PdfPageSetup>,
    pub element_captures: Vec<String>,
    pub print_media: usize,
    /// Layout and print calls in the order they happened
    pub events: Vec<String>,
}

struct State {
    pages: Mutex<HashMap<String, FakePage>>,
    launches: AtomicUsize,
    failing_launches: AtomicUsize,
    launch_delay: Mutex<Duration>,
    // liveness flags of every engine launched
    engines: Mutex<Vec<Arc<AtomicBool>>>,
    opened: AtomicUsize,
    closed: AtomicUsize,
    broken_diagnostics: AtomicBool,
    journal: Mutex<Journal>,
}

/// Launcher and control surface of the fake engine
#[derive(Clone)]
pub struct FakeBackend {
    state: Arc<State>,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self {
            state: Arc::new(State {
                pages: Mutex::new(HashMap::new()),
                launches: AtomicUsize::new(0),
                failing_launches: AtomicUsize::new(0),
                launch_delay: Mutex::new(Duration::ZERO),
                engines: Mutex::new(Vec::new()),
                opened: AtomicUsize::new(0),
                closed: AtomicUsize::new(0),
                broken_diagnostics: AtomicBool::new(false),
                journal: Mutex::new(Journal::default()),
            }),
        }
    }

    pub fn with_page(self, path: &str, page: FakePage) -> Self {
        self.state.pages.lock().unwrap().insert(path.to_string(), page);
        self
    }

    pub fn launcher(&self) -> Arc<dyn EngineLauncher> {
        Arc::new(self.clone())
    }

    /// Fail the next `n` launches
    pub fn fail_launches(&self, n: usize) {
        self.state.failing_launches.store(n, Ordering::SeqCst);
    }

    pub fn set_launch_delay(&self, delay: Duration) {
        *self.state.launch_delay.lock().unwrap() = delay;
    }

    /// Make diagnostic screenshots and markup reads fail
    pub fn break_diagnostics(&self) {
        self.state.broken_diagnostics.store(true, Ordering::SeqCst);
    }

    pub fn launches(&self) -> usize {
        self.state.launches.load(Ordering::SeqCst)
    }

    pub fn sessions_opened(&self) -> usize {
        self.state.opened.load(Ordering::SeqCst)
    }

    pub fn sessions_closed(&self) -> usize {
        self.state.closed.load(Ordering::SeqCst)
    }

    /// Kill every engine launched so far
    pub fn crash(&self) {
        for alive in self.state.engines.lock().unwrap().iter() {
            alive.store(false, Ordering::SeqCst);
        }
    }

    pub fn live_engines(&self) -> usize {
        self.state
            .engines
            .lock()
            .unwrap()
            .iter()
            .filter(|alive| alive.load(Ordering::SeqCst))
            .count()
    }

    pub fn journal<T>(&self, f: impl FnOnce(&Journal) -> T) -> T {
        f(&self.state.journal.lock().unwrap())
    }
}

impl EngineLauncher for FakeBackend {
    fn launch(&self, _config: &EngineConfig) -> Result<Arc<dyn Engine>> {
        let delay = *self.state.launch_delay.lock().unwrap();
        std::thread::sleep(delay);

        self.state.launches.fetch_add(1, Ordering::SeqCst);
        let failing = self.state.failing_launches.load(Ordering::SeqCst);
        if failing > 0 {
            self.state.failing_launches.store(failing - 1, Ordering::SeqCst);
            return Err(Error::Engine("fake browser failed to start".into()));
        }

        let alive = Arc::new(AtomicBool::new(true));
        self.state.engines.lock().unwrap().push(alive.clone());
        Ok(Arc::new(FakeEngine {
            alive,
            state: self.state.clone(),
        }))
    }
}

pub struct FakeEngine {
    alive: Arc<AtomicBool>,
    state: Arc<State>,
}

impl Engine for FakeEngine {
    fn open_context(&self) -> Result<Box<dyn SessionDriver>> {
        if !self.alive.load(Ordering::SeqCst) {
            return Err(Error::Engine("fake engine is gone".into()));
        }
        self.state.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeSession {
            state: self.state.clone(),
            engine_alive: self.alive.clone(),
            page: None,
            navigated_at: None,
            rebuilt: None,
            root_checks: 0,
            print_media: false,
            layout_width: None,
            closed: false,
        }))
    }

    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    fn close(&self) {
        self.alive.store(false, Ordering::SeqCst);
    }
}

/// One page of the fake engine. State is private to the session.
pub struct FakeSession {
    state: Arc<State>,
    engine_alive: Arc<AtomicBool>,
    page: Option<(Url, FakePage)>,
    navigated_at: Option<Instant>,
    rebuilt: Option<String>,
    root_checks: usize,
    print_media: bool,
    layout_width: Option<u32>,
    closed: bool,
}

impl FakeSession {
    fn alive(&self) -> bool {
        self.engine_alive.load(Ordering::SeqCst)
    }

    fn event(&self, event: String) {
        self.state.journal.lock().unwrap().events.push(event);
    }

    // How long `script` blocks the page's main thread
    fn hang_for(&self, script: &str) -> Option<Duration> {
        let (_, page) = self.page.as_ref()?;
        let hang = page.ready_check_hangs?;
        (script == scripts::ready_attribute(&page.root_selector, READY_ATTRIBUTE, READY_VALUE)).then_some(hang)
    }

    fn check(&self) -> Result<()> {
        if self.closed {
            return Err(Error::Engine("session already closed".into()));
        }
        if !self.alive() {
            return Err(Error::EngineUnavailable("fake engine crashed".into()));
        }
        Ok(())
    }

    fn page(&self) -> Result<&(Url, FakePage)> {
        self.page
            .as_ref()
            .ok_or_else(|| Error::Engine("evaluate before navigate".into()))
    }

    fn root_markup(url: &Url, page: &FakePage) -> String {
        let id = page.root_selector.trim_start_matches('#');
        format!(
            "<div id=\"{}\" {}=\"{}\">{}</div>",
            id,
            READY_ATTRIBUTE,
            READY_VALUE,
            url.query().unwrap_or_default()
        )
    }

    fn answer(&mut self, script: &str) -> Result<serde_json::Value> {
        use serde_json::Value;

        if script == scripts::document_parsed() {
            return Ok(Value::Bool(self.page.is_some()));
        }
        if script == scripts::fonts_loaded() {
            let page = &self.page()?.1;
            let stalled = self.rebuilt.is_some() && page.fonts_stall_after_rebuild;
            return Ok(Value::Bool(page.fonts_loaded && !stalled));
        }
        if script == scripts::document_complete() {
            let stalled = self.rebuilt.is_some() && self.page()?.1.stylesheets_stall;
            return Ok(Value::Bool(!stalled));
        }
        if script == scripts::inject_quality_styles() {
            return Ok(Value::Bool(true));
        }
        if script == scripts::logo_loaded(LOGO_SELECTOR) {
            return Ok(Value::Bool(self.page()?.1.logo_loaded));
        }
        if script == scripts::code_block_rendered(CODE_SELECTOR) {
            return Ok(Value::Bool(self.page()?.1.code_rendered));
        }
        if let Some(html) = script_rebuild_payload(script) {
            if self.page()?.1.reject_rebuild {
                return Err(Error::Engine("document.write is blocked".into()));
            }
            self.state.journal.lock().unwrap().rebuilt_documents.push(html.clone());
            self.rebuilt = Some(html);
            return Ok(Value::Bool(true));
        }

        let (url, page) = self.page()?.clone();
        let root = page.root_selector.as_str();
        let elapsed = self.navigated_at.map(|t| t.elapsed()).unwrap_or_default();

        if script == scripts::root_present(root) {
            self.root_checks += 1;
            let removed = page.root_checks_before_removal.is_some_and(|n| self.root_checks > n);
            return Ok(Value::Bool(page.root_present && !removed));
        }
        if script == scripts::ready_attribute(root, READY_ATTRIBUTE, READY_VALUE) {
            let ready = page.root_present && page.ready_after.is_some_and(|d| elapsed >= d);
            return Ok(Value::Bool(ready));
        }
        if script == scripts::extract_snapshot(root) {
            let markup = if page.drop_root_from_snapshot {
                Value::Null
            } else {
                Value::String(Self::root_markup(&url, &page))
            };
            let snapshot = serde_json::json!({
                "stylesheetLinks": ["<link rel=\"stylesheet\" href=\"/assets/resume.css\">"],
                "inlineStyles": ["<style>.title{font-weight:700}</style>"],
                "rootMarkup": markup,
                "rootVariables": " --accent: #0a7; ",
            });
            return Ok(Value::String(snapshot.to_string()));
        }
        if script == scripts::content_height(root) {
            let from_root = self.rebuilt.as_deref().is_some_and(|doc| doc.contains(root.trim_start_matches('#')));
            self.event("measure".to_string());
            // screen layout at the window width wraps differently from print
            let height = if self.print_media && self.layout_width.is_some() {
                page.content_height_px
            } else {
                (page.content_height_px * 0.8).round()
            };
            let m = serde_json::json!({ "height": height, "fromRoot": from_root });
            return Ok(Value::String(m.to_string()));
        }
        if script == scripts::element_extent(root) {
            return Ok(Value::String(r#"{"right":1200,"bottom":630}"#.to_string()));
        }

        // Lookups of elements this page does not have
        if script.starts_with("document.querySelector(") || script.contains("const el = document.querySelector(") {
            return Ok(Value::Bool(false));
        }
        Err(Error::Engine(format!("unexpected script: {}", script)))
    }
}

// Recover the markup passed to `scripts::replace_document`
fn script_rebuild_payload(script: &str) -> Option<String> {
    let prefix = "(function(){ document.open(); document.write(";
    let suffix = "); document.close(); return true; })()";
    let literal = script.strip_prefix(prefix)?.strip_suffix(suffix)?;
    serde_json::from_str::<String>(literal).ok()
}

impl SessionDriver for FakeSession {
    fn navigate(&mut self, url: &str, timeout: Duration) -> Result<()> {
        self.check()?;
        let url = Url::parse(url).map_err(|e| Error::Engine(e.to_string()))?;
        self.state.journal.lock().unwrap().navigations.push(url.to_string());

        let page = self
            .state
            .pages
            .lock()
            .unwrap()
            .get(url.path())
            .cloned()
            // unknown documents render an empty page
            .unwrap_or_else(|| FakePage {
                root_present: false,
                ..FakePage::resume()
            });
        if let Some(reason) = &page.navigation_error {
            return Err(Error::Engine(reason.clone()));
        }
        if let Some(delay) = page.navigation_delay {
            std::thread::sleep(delay.min(timeout));
            if delay > timeout {
                return Err(Error::Engine("navigation still pending".into()));
            }
        }
        self.page = Some((url, page));
        self.navigated_at = Some(Instant::now());
        self.rebuilt = None;
        self.root_checks = 0;
        self.print_media = false;
        self.layout_width = None;
        Ok(())
    }

    fn evaluate(&mut self, script: &str) -> Result<serde_json::Value> {
        self.check()?;
        if let Some(hang) = self.hang_for(script) {
            std::thread::sleep(hang);
        }
        self.answer(script)
    }

    fn evaluate_within(&mut self, script: &str, timeout: Duration) -> Result<serde_json::Value> {
        self.check()?;
        if let Some(hang) = self.hang_for(script) {
            std::thread::sleep(hang.min(timeout));
            if hang > timeout {
                return Err(Error::Engine(format!("page did not answer within {}ms", timeout.as_millis())));
            }
        }
        self.answer(script)
    }

    fn set_layout_width(&mut self, width_px: u32) -> Result<()> {
        self.check()?;
        self.layout_width = Some(width_px);
        self.event(format!("layout-width:{}", width_px));
        Ok(())
    }

    fn capture_element_png(&mut self, selector: &str) -> Result<Vec<u8>> {
        self.check()?;
        let (url, page) = self.page()?.clone();
        if !page.root_present || page.root_selector != selector {
            return Err(Error::ElementNotFound(selector.to_string()));
        }
        self.state.journal.lock().unwrap().element_captures.push(selector.to_string());
        let mut png = PNG_MAGIC.to_vec();
        png.extend_from_slice(url.query().unwrap_or_default().as_bytes());
        Ok(png)
    }

    fn capture_page_png(&mut self) -> Result<Vec<u8>> {
        self.check()?;
        if self.state.broken_diagnostics.load(Ordering::SeqCst) {
            return Err(Error::Engine("screenshot exploded".into()));
        }
        Ok(PNG_MAGIC.to_vec())
    }

    fn document_html(&mut self) -> Result<String> {
        self.check()?;
        if self.state.broken_diagnostics.load(Ordering::SeqCst) {
            return Err(Error::Engine("markup exploded".into()));
        }
        Ok(self
            .rebuilt
            .clone()
            .unwrap_or_else(|| "<html><body><div id=\"loading\"></div></body></html>".to_string()))
    }

    fn emulate_print_media(&mut self) -> Result<()> {
        self.check()?;
        self.state.journal.lock().unwrap().print_media += 1;
        self.print_media = true;
        self.event("print-media".to_string());
        Ok(())
    }

    fn print_pdf(&mut self, setup: &PdfPageSetup) -> Result<Vec<u8>> {
        self.check()?;
        let doc = self
            .rebuilt
            .clone()
            .ok_or_else(|| Error::Engine("print before rebuild".into()))?;
        if self.page()?.1.crash_on_print {
            self.engine_alive.store(false, Ordering::SeqCst);
            return Err(Error::Engine("target closed".into()));
        }
        self.state.journal.lock().unwrap().prints.push(*setup);
        self.event("print".to_string());
        let mut pdf = PDF_MAGIC.to_vec();
        pdf.extend_from_slice(format!("{:.4}x{:.4}\n", setup.paper_width_in, setup.paper_height_in).as_bytes());
        pdf.extend_from_slice(doc.as_bytes());
        Ok(pdf)
    }

    fn close(&mut self) -> Result<()> {
        if !self.closed {
            self.closed = true;
            self.state.closed.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }
}

/// Collects every diagnostic report
#[derive(Default)]
pub struct RecordingSink {
    pub reports: Mutex<Vec<DiagnosticReport>>,
}

impl RecordingSink {
    pub fn stages(&self) -> Vec<(docshot::Stage, String)> {
        self.reports
            .lock()
            .unwrap()
            .iter()
            .map(|r| (r.stage, r.hint.clone()))
            .collect()
    }
}

impl DiagnosticsSink for RecordingSink {
    fn store(&self, report: &DiagnosticReport) -> Result<()> {
        self.reports.lock().unwrap().push(report.clone());
        Ok(())
    }
}

/// Sink that always fails
pub struct FailingSink;

impl DiagnosticsSink for FailingSink {
    fn store(&self, _report: &DiagnosticReport) -> Result<()> {
        Err(Error::Other("disk full".into()))
    }
}

/// Short budgets so timeouts are observable in tests
pub fn fast_config() -> CaptureConfig {
    let mut cfg = CaptureConfig {
        base_url: "http://docs.test".to_string(),
        navigation_timeout_ms: 500,
        ..Default::default()
    };
    cfg.readiness.root_timeout_ms = 300;
    cfg.readiness.ready_attribute_timeout_ms = 300;
    cfg.readiness.fonts_timeout_ms = 300;
    cfg.readiness.logo_timeout_ms = 300;
    cfg.readiness.code_block_timeout_ms = 300;
    cfg.readiness.stylesheets_timeout_ms = 300;
    cfg.readiness.poll_interval_ms = 10;
    cfg.page.settle_delay_ms = 0;
    cfg
}

pub fn capturer(backend: &FakeBackend, sink: Arc<dyn DiagnosticsSink>) -> Capturer {
    Capturer::new(fast_config(), backend.launcher(), sink).unwrap()
}

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

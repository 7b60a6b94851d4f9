//! Chrome DevTools Protocol backend implementation

use crate::backend::{Engine, EngineLauncher, PdfPageSetup, SessionDriver};
use crate::{scripts, EngineConfig, Error, Result};
use headless_chrome::protocol::cdp::{Emulation, Page, Target};
use headless_chrome::types::{Bounds, PrintToPdfOptions};
use headless_chrome::{Browser, LaunchOptions, Tab};
use log::{debug, warn};
use serde::Deserialize;
use std::ffi::OsStr;
use std::sync::{mpsc, Arc, Mutex};
use std::time::Duration;

/// Run a blocking protocol call on a helper thread and wait at most `timeout`
/// for its answer. `None` means the call is still outstanding; it finishes on
/// its own once the tab's command timeout fires.
fn within<T, F>(timeout: Duration, call: F) -> Option<anyhow::Result<T>>
where
    T: Send + 'static,
    F: FnOnce() -> anyhow::Result<T> + Send + 'static,
{
    let (tx, rx) = mpsc::channel();
    std::thread::spawn(move || {
        let _ = tx.send(call());
    });
    rx.recv_timeout(timeout).ok()
}

/// Launches headless Chrome through the `headless_chrome` crate
#[derive(Debug, Default, Clone, Copy)]
pub struct CdpLauncher;

impl EngineLauncher for CdpLauncher {
    fn launch(&self, config: &EngineConfig) -> Result<Arc<dyn Engine>> {
        let args: Vec<&OsStr> = config.extra_args.iter().map(OsStr::new).collect();

        // Configure headless Chrome launch options
        let launch_options = LaunchOptions::default_builder()
            .headless(true)
            .sandbox(config.sandbox)
            .window_size(Some((config.viewport.width, config.viewport.height)))
            .idle_browser_timeout(Duration::from_millis(config.idle_timeout_ms))
            .path(config.chrome_path.clone())
            .args(args)
            .build()
            .map_err(|e| Error::EngineUnavailable(format!("Failed to build launch options: {}", e)))?;

        let browser = Browser::new(launch_options)
            .map_err(|e| Error::EngineUnavailable(format!("Failed to launch browser: {}", e)))?;

        Ok(Arc::new(CdpEngine {
            shared: Arc::new(Shared {
                browser: Mutex::new(Some(browser)),
                config: config.clone(),
            }),
        }))
    }
}

struct Shared {
    browser: Mutex<Option<Browser>>,
    config: EngineConfig,
}

impl Shared {
    // `Browser` is a cheap handle; clone it out so no lock is held across a
    // protocol round-trip.
    fn browser(&self) -> Option<Browser> {
        self.browser.lock().ok().and_then(|b| b.clone())
    }

    fn alive(&self) -> bool {
        self.browser().is_some_and(|b| b.get_version().is_ok())
    }
}

/// One running Chrome process
///
/// Every capture session gets its own browser context, so cookies, storage
/// and in-flight navigations never leak between concurrent captures.
pub struct CdpEngine {
    shared: Arc<Shared>,
}

impl Engine for CdpEngine {
    fn open_context(&self) -> Result<Box<dyn SessionDriver>> {
        let browser = self
            .shared
            .browser()
            .ok_or_else(|| Error::EngineUnavailable("browser already closed".into()))?;

        let context = browser
            .new_context()
            .map_err(|e| Error::Engine(format!("Failed to create browser context: {}", e)))?;
        let context_id = context.get_id().to_string();
        let tab = context
            .new_tab()
            .map_err(|e| Error::Engine(format!("Failed to create tab: {}", e)))?;

        tab.set_default_timeout(Duration::from_millis(self.shared.config.command_timeout_ms));

        let mut session = CdpSession {
            shared: self.shared.clone(),
            tab,
            context_id,
            closed: false,
        };

        if let Some(ua) = &self.shared.config.user_agent {
            if let Err(e) = session.tab.set_user_agent(ua, None, None) {
                let _ = session.close();
                return Err(Error::Engine(format!("Failed to set user agent: {}", e)));
            }
        }

        debug!("Opened browser context {}", session.context_id);
        Ok(Box::new(session))
    }

    fn is_alive(&self) -> bool {
        self.shared.alive()
    }

    fn close(&self) {
        // Dropping the last `Browser` handle terminates the child process.
        let taken = match self.shared.browser.lock() {
            Ok(mut b) => b.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        drop(taken);
    }
}

/// A tab inside its own browser context
pub struct CdpSession {
    shared: Arc<Shared>,
    tab: Arc<Tab>,
    context_id: String,
    closed: bool,
}

#[derive(Deserialize)]
struct Extent {
    right: f64,
    bottom: f64,
}

impl CdpSession {
    /// Wrap a backend failure, reporting a dead browser as such.
    fn fail(&self, what: &str, err: impl std::fmt::Display) -> Error {
        if self.shared.alive() {
            Error::Engine(format!("{}: {}", what, err))
        } else {
            Error::EngineUnavailable(format!("{}: {}", what, err))
        }
    }

    /// Grow the window so an element reaching past the viewport is painted
    /// in full.
    fn fit_window_to(&mut self, selector: &str) -> Result<()> {
        let value = self.evaluate(&scripts::element_extent(selector))?;
        let Some(raw) = value.as_str() else {
            return Err(Error::ElementNotFound(selector.to_string()));
        };
        let extent: Extent =
            serde_json::from_str(raw).map_err(|e| Error::Capture(format!("malformed element extent: {}", e)))?;

        let viewport = self.shared.config.viewport;
        let width = extent.right.max(viewport.width as f64);
        let height = extent.bottom.max(viewport.height as f64);
        if width > viewport.width as f64 || height > viewport.height as f64 {
            self.tab
                .set_bounds(Bounds::Normal {
                    left: Some(0),
                    top: Some(0),
                    width: Some(width),
                    height: Some(height),
                })
                .map_err(|e| self.fail("Failed to resize window", e))?;
            // let layout catch up with the new window size
            std::thread::sleep(Duration::from_millis(100));
        }
        Ok(())
    }
}

impl SessionDriver for CdpSession {
    fn navigate(&mut self, url: &str, timeout: Duration) -> Result<()> {
        let tab = self.tab.clone();
        let target = url.to_string();
        let outcome = within(timeout, move || {
            tab.navigate_to(&target)?;
            Ok(())
        });

        match outcome {
            Some(Ok(())) => Ok(()),
            Some(Err(e)) if self.shared.alive() => Err(Error::Navigation {
                url: url.to_string(),
                reason: e.to_string(),
            }),
            Some(Err(e)) => Err(Error::EngineUnavailable(format!("Navigation failed: {}", e))),
            None => Err(Error::NavigationTimeout {
                url: url.to_string(),
                timeout_ms: timeout.as_millis() as u64,
            }),
        }
    }

    fn evaluate(&mut self, script: &str) -> Result<serde_json::Value> {
        let result = self
            .tab
            .evaluate(script, false)
            .map_err(|e| self.fail("Evaluation failed", e))?;
        Ok(result.value.unwrap_or(serde_json::Value::Null))
    }

    fn evaluate_within(&mut self, script: &str, timeout: Duration) -> Result<serde_json::Value> {
        let tab = self.tab.clone();
        let script = script.to_string();
        match within(timeout, move || tab.evaluate(&script, false)) {
            Some(Ok(result)) => Ok(result.value.unwrap_or(serde_json::Value::Null)),
            Some(Err(e)) => Err(self.fail("Evaluation failed", e)),
            None => Err(Error::Engine(format!("page did not answer within {}ms", timeout.as_millis()))),
        }
    }

    fn set_layout_width(&mut self, width_px: u32) -> Result<()> {
        let height = self.shared.config.viewport.height;
        self.tab
            .set_bounds(Bounds::Normal {
                left: Some(0),
                top: Some(0),
                width: Some(width_px as f64),
                height: Some(height as f64),
            })
            .map_err(|e| self.fail("Failed to set layout width", e))?;
        // let layout catch up with the new window size
        std::thread::sleep(Duration::from_millis(100));
        Ok(())
    }

    fn capture_element_png(&mut self, selector: &str) -> Result<Vec<u8>> {
        self.fit_window_to(selector)?;
        let element = self
            .tab
            .find_element(selector)
            .map_err(|_| Error::ElementNotFound(selector.to_string()))?;
        element
            .capture_screenshot(Page::CaptureScreenshotFormatOption::Png)
            .map_err(|e| self.fail("Element screenshot failed", e))
    }

    fn capture_page_png(&mut self) -> Result<Vec<u8>> {
        self.tab
            .capture_screenshot(Page::CaptureScreenshotFormatOption::Png, None, None, true)
            .map_err(|e| self.fail("Screenshot failed", e))
    }

    fn document_html(&mut self) -> Result<String> {
        self.tab.get_content().map_err(|e| self.fail("Failed to read document", e))
    }

    fn emulate_print_media(&mut self) -> Result<()> {
        self.tab
            .call_method(Emulation::SetEmulatedMedia {
                media: Some("print".to_string()),
                features: None,
            })
            .map_err(|e| self.fail("Failed to emulate print media", e))?;
        Ok(())
    }

    fn print_pdf(&mut self, setup: &PdfPageSetup) -> Result<Vec<u8>> {
        let options = PrintToPdfOptions {
            landscape: Some(false),
            display_header_footer: Some(false),
            print_background: Some(setup.print_background),
            scale: Some(1.0),
            paper_width: Some(setup.paper_width_in),
            paper_height: Some(setup.paper_height_in),
            // Zero margins; spacing lives in the document's own padding
            margin_top: Some(0.0),
            margin_bottom: Some(0.0),
            margin_left: Some(0.0),
            margin_right: Some(0.0),
            prefer_css_page_size: Some(false),
            ..Default::default()
        };
        self.tab
            .print_to_pdf(Some(options))
            .map_err(|e| self.fail("Print to PDF failed", e))
    }

    fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        if let Err(e) = self.tab.close(true) {
            warn!("Failed to close tab of context {}: {}", self.context_id, e);
        }

        // Nothing to dispose once the browser itself is gone.
        let Some(browser) = self.shared.browser() else {
            return Ok(());
        };
        browser.call_method(Target::DisposeBrowserContext {
            browser_context_id: self.context_id.clone(),
        })?;
        debug!("Disposed browser context {}", self.context_id);
        Ok(())
    }
}

impl Drop for CdpSession {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!("{}", e);
        }
    }
}

//! Engine and session traits the pipeline is written against.
//!
//! The CDP adapter in [`crate::cdp`] implements them over headless Chrome.
//! Anything else that can open isolated browsing contexts, evaluate script,
//! rasterize and print can stand in, which is how the pipeline is tested
//! without a browser.

use crate::{EngineConfig, Result};
use std::sync::Arc;
use std::time::Duration;

/// Physical page setup handed to [`SessionDriver::print_pdf`].
///
/// Lengths are in inches, the unit the print backend expects.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PdfPageSetup {
    pub paper_width_in: f64,
    pub paper_height_in: f64,
    pub print_background: bool,
}

/// Launches the shared engine process.
pub trait EngineLauncher: Send + Sync {
    fn launch(&self, config: &EngineConfig) -> Result<Arc<dyn Engine>>;
}

/// A live engine process shared by every capture.
///
/// Implementations must allow `open_context` from several threads at once:
/// each call returns an independent session.
pub trait Engine: Send + Sync {
    /// Open a fresh, isolated browsing context with a single page in it
    fn open_context(&self) -> Result<Box<dyn SessionDriver>>;

    /// Cheap health check; `false` once the process is gone
    fn is_alive(&self) -> bool;

    /// Terminate the process. Sessions still open become unusable.
    fn close(&self);
}

/// One isolated page inside the engine, used for exactly one capture.
pub trait SessionDriver: Send {
    /// Start loading `url`; returns once the navigation is committed, fails,
    /// or `timeout` runs out (reported as [`crate::Error::NavigationTimeout`])
    fn navigate(&mut self, url: &str, timeout: Duration) -> Result<()>;

    /// Evaluate an expression in the page and return its JSON value
    /// (`Null` when the expression yields nothing serializable)
    fn evaluate(&mut self, script: &str) -> Result<serde_json::Value>;

    /// Like [`SessionDriver::evaluate`], but gives up after `timeout`.
    ///
    /// Readiness polling uses this so a page whose main thread is busy cannot
    /// hold an evaluation past its budget. Backends whose calls cannot block may
    /// keep the default.
    fn evaluate_within(&mut self, script: &str, timeout: Duration) -> Result<serde_json::Value> {
        let _ = timeout;
        self.evaluate(script)
    }

    /// Lay the page out at `width_px` CSS pixels, the width it will be
    /// printed at
    fn set_layout_width(&mut self, width_px: u32) -> Result<()>;

    /// Rasterize the bounding box of the first element matching `selector`,
    /// including parts outside the viewport
    fn capture_element_png(&mut self, selector: &str) -> Result<Vec<u8>>;

    /// Rasterize the whole page
    fn capture_page_png(&mut self) -> Result<Vec<u8>>;

    /// Serialized markup of the current document
    fn document_html(&mut self) -> Result<String>;

    /// Switch CSS media emulation to `print`
    fn emulate_print_media(&mut self) -> Result<()>;

    /// Print the current document to PDF with zero margins
    fn print_pdf(&mut self, setup: &PdfPageSetup) -> Result<Vec<u8>>;

    /// Close the page and dispose its browsing context. Idempotent.
    fn close(&mut self) -> Result<()>;
}

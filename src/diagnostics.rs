//! Post-mortem capture on failure paths.
//!
//! The happy path never touches this module. When a stage fails, the
//! recorder grabs a full-page screenshot and the current markup, tags them
//! with the stage and hands them to a [`DiagnosticsSink`]. Every step is best
//! effort: a diagnostics failure is logged and swallowed so the original
//! error is the one the caller sees.

use crate::navigation::CaptureSession;
use crate::{Error, Result, Stage};
use log::{info, warn};
use std::path::PathBuf;
use std::sync::Arc;

/// Everything captured for one failed stage
#[derive(Debug, Clone)]
pub struct DiagnosticReport {
    pub request_id: u64,
    pub stage: Stage,
    /// What failed, e.g. the readiness predicate name
    pub hint: String,
    pub url: Option<String>,
    pub screenshot: Option<Vec<u8>>,
    pub markup: Option<String>,
}

/// Destination for diagnostic reports
pub trait DiagnosticsSink: Send + Sync {
    fn store(&self, report: &DiagnosticReport) -> Result<()>;
}

/// Logs a summary of each report (sizes and a markup excerpt)
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

const MARKUP_EXCERPT: usize = 512;

impl DiagnosticsSink for LogSink {
    fn store(&self, report: &DiagnosticReport) -> Result<()> {
        let excerpt = report
            .markup
            .as_deref()
            .map(|m| excerpt(m, MARKUP_EXCERPT))
            .unwrap_or_default();
        warn!(
            "capture #{} failed at {} ({}) url={} screenshot={}B markup={}B: {}",
            report.request_id,
            report.stage,
            report.hint,
            report.url.as_deref().unwrap_or("-"),
            report.screenshot.as_ref().map_or(0, |s| s.len()),
            report.markup.as_ref().map_or(0, |m| m.len()),
            excerpt
        );
        Ok(())
    }
}

/// Writes `<request>-<stage>.png` and `<request>-<stage>.html` into a directory
#[derive(Debug, Clone)]
pub struct DirectorySink {
    dir: PathBuf,
}

impl DirectorySink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn stem(report: &DiagnosticReport) -> String {
        format!("capture-{}-{}", report.request_id, report.stage)
    }
}

impl DiagnosticsSink for DirectorySink {
    fn store(&self, report: &DiagnosticReport) -> Result<()> {
        std::fs::create_dir_all(&self.dir)
            .map_err(|e| Error::Other(format!("cannot create {}: {}", self.dir.display(), e)))?;

        let stem = Self::stem(report);
        if let Some(png) = &report.screenshot {
            let path = self.dir.join(format!("{}.png", stem));
            std::fs::write(&path, png)
                .map_err(|e| Error::Other(format!("cannot write {}: {}", path.display(), e)))?;
        }
        if let Some(markup) = &report.markup {
            let path = self.dir.join(format!("{}.html", stem));
            let body = format!(
                "<!-- stage: {} | {} | {} -->\n{}",
                report.stage,
                report.hint,
                report.url.as_deref().unwrap_or("-"),
                markup
            );
            std::fs::write(&path, body)
                .map_err(|e| Error::Other(format!("cannot write {}: {}", path.display(), e)))?;
        }
        info!("Diagnostics for capture #{} written to {}", report.request_id, self.dir.display());
        Ok(())
    }
}

/// Best-effort failure recorder shared by all captures
#[derive(Clone)]
pub struct DiagnosticsRecorder {
    sink: Arc<dyn DiagnosticsSink>,
}

impl DiagnosticsRecorder {
    pub fn new(sink: Arc<dyn DiagnosticsSink>) -> Self {
        Self { sink }
    }

    /// Capture a screenshot and the markup of `session`, tagged with `stage`.
    /// Never fails.
    pub fn record(&self, session: &mut CaptureSession, stage: Stage, hint: &str) {
        let request_id = session.id();
        let url = session.url().map(|u| u.to_string());

        let screenshot = session
            .driver()
            .capture_page_png()
            .map_err(|e| warn!("capture #{}: diagnostics screenshot failed: {}", request_id, e))
            .ok();
        let markup = session
            .driver()
            .document_html()
            .map_err(|e| warn!("capture #{}: diagnostics markup failed: {}", request_id, e))
            .ok();

        let report = DiagnosticReport {
            request_id,
            stage,
            hint: hint.to_string(),
            url,
            screenshot,
            markup,
        };
        if let Err(e) = self.sink.store(&report) {
            warn!("capture #{}: storing diagnostics failed: {}", request_id, e);
        }
    }
}

impl Default for DiagnosticsRecorder {
    fn default() -> Self {
        Self::new(Arc::new(LogSink))
    }
}

fn excerpt(s: &str, max: usize) -> String {
    let flat: String = s.split_whitespace().collect::<Vec<_>>().join(" ");
    match flat.char_indices().nth(max) {
        Some((idx, _)) => format!("{}…", &flat[..idx]),
        None => flat,
    }
}

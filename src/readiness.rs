//! Waiting for the source page to finish rendering.
//!
//! Readiness is an ordered list of named predicates, each a boolean script
//! with its own budget. [`plan`] picks the list for a capture; [`wait_ready`]
//! runs it front to back and stops at the first predicate that times out.

use crate::backend::SessionDriver;
use crate::config::CaptureConfig;
use crate::diagnostics::DiagnosticsRecorder;
use crate::navigation::CaptureSession;
use crate::{scripts, CaptureKind, Error, Result, Stage};
use log::{debug, trace, warn};
use std::fmt;
use std::time::{Duration, Instant};

/// Named readiness conditions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReadinessPredicate {
    /// The target root element exists
    RootPresent,
    /// The root carries the page's own "ready" sentinel
    ReadyAttribute,
    /// Web fonts finished loading
    FontsLoaded,
    /// The supplied logo image loaded with non-zero intrinsic size
    LogoLoaded,
    /// The banner's highlighted code block has content
    CodeBlockRendered,
    /// The rebuilt document's linked stylesheets finished loading
    StylesheetsLoaded,
}

impl ReadinessPredicate {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReadinessPredicate::RootPresent => "root-present",
            ReadinessPredicate::ReadyAttribute => "ready-attribute",
            ReadinessPredicate::FontsLoaded => "fonts-loaded",
            ReadinessPredicate::LogoLoaded => "logo-loaded",
            ReadinessPredicate::CodeBlockRendered => "code-block-rendered",
            ReadinessPredicate::StylesheetsLoaded => "stylesheets-loaded",
        }
    }
}

impl fmt::Display for ReadinessPredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One predicate with the script that evaluates it and its budget
#[derive(Debug, Clone, PartialEq)]
pub struct ReadinessCheck {
    pub predicate: ReadinessPredicate,
    pub script: String,
    pub timeout: Duration,
}

impl ReadinessCheck {
    pub fn new(predicate: ReadinessPredicate, script: String, timeout: Duration) -> Self {
        Self { predicate, script, timeout }
    }
}

/// Readiness checks for a capture of `kind`, in the order they must pass.
pub fn plan(kind: CaptureKind, has_logo: bool, config: &CaptureConfig) -> Vec<ReadinessCheck> {
    let sel = &config.selectors;
    let r = &config.readiness;
    let root = sel.root_selector(kind);

    let mut checks = vec![
        ReadinessCheck::new(
            ReadinessPredicate::RootPresent,
            scripts::root_present(&root),
            Duration::from_millis(r.root_timeout_ms),
        ),
        ReadinessCheck::new(
            ReadinessPredicate::ReadyAttribute,
            scripts::ready_attribute(&root, &sel.ready_attribute, &sel.ready_value),
            Duration::from_millis(r.ready_attribute_timeout_ms),
        ),
        ReadinessCheck::new(
            ReadinessPredicate::FontsLoaded,
            scripts::fonts_loaded(),
            Duration::from_millis(r.fonts_timeout_ms),
        ),
    ];

    if has_logo {
        checks.push(ReadinessCheck::new(
            ReadinessPredicate::LogoLoaded,
            scripts::logo_loaded(&sel.logo_selector),
            Duration::from_millis(r.logo_timeout_ms),
        ));
    }

    if kind == CaptureKind::Banner {
        checks.push(ReadinessCheck::new(
            ReadinessPredicate::CodeBlockRendered,
            scripts::code_block_rendered(&sel.code_block_selector),
            Duration::from_millis(r.code_block_timeout_ms),
        ));
    }

    checks
}

/// Run `checks` in order. The first one that does not pass within its budget
/// records diagnostics and fails with [`Error::Readiness`] naming it.
pub fn wait_ready(
    session: &mut CaptureSession,
    checks: &[ReadinessCheck],
    poll_interval: Duration,
    diagnostics: &DiagnosticsRecorder,
) -> Result<()> {
    let started = Instant::now();
    for check in checks {
        let step = Instant::now();
        match poll_until(session.driver(), &check.script, check.timeout, poll_interval) {
            Ok(true) => {
                trace!("capture #{}: {} passed in {:?}", session.id(), check.predicate, step.elapsed());
            }
            Ok(false) => {
                warn!(
                    "capture #{}: readiness check {} timed out after {:?}",
                    session.id(),
                    check.predicate,
                    step.elapsed()
                );
                diagnostics.record(session, Stage::Readiness, check.predicate.as_str());
                return Err(Error::Readiness {
                    predicate: check.predicate,
                    timeout_ms: check.timeout.as_millis() as u64,
                });
            }
            Err(e) => {
                warn!("capture #{}: engine lost during {}: {}", session.id(), check.predicate, e);
                diagnostics.record(session, Stage::Readiness, check.predicate.as_str());
                return Err(e);
            }
        }
    }
    debug!("capture #{}: page ready in {:?}", session.id(), started.elapsed());
    Ok(())
}

/// Evaluate `script` until it yields `true` or `timeout` elapses.
///
/// The script is evaluated at least once, and no single evaluation may run
/// past the deadline by more than one `interval`. Evaluation errors count as
/// "not yet", since a page that is mid-navigation or re-rendering can reject a
/// script transiently. The exception is [`Error::EngineUnavailable`], which
/// ends the wait immediately.
pub fn poll_until(
    driver: &mut dyn SessionDriver,
    script: &str,
    timeout: Duration,
    interval: Duration,
) -> Result<bool> {
    let deadline = Instant::now() + timeout;
    loop {
        let budget = deadline.saturating_duration_since(Instant::now()).max(interval);
        match driver.evaluate_within(script, budget) {
            Ok(serde_json::Value::Bool(true)) => return Ok(true),
            Ok(_) => {}
            Err(e @ Error::EngineUnavailable(_)) => return Err(e),
            Err(e) => trace!("check failed, retrying: {}", e),
        }

        let now = Instant::now();
        if now >= deadline {
            return Ok(false);
        }
        std::thread::sleep(interval.min(deadline - now));
    }
}

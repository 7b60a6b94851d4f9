//! The blocking capture pipeline.
//!
//! ```text
//! open session -> navigate -> wait ready -+-> element screenshot            (banner)
//!                                         |
//!                                         +-> extract -> rebuild -> settle
//!                                               -> print layout -> measure
//!                                               -> print                    (resume-pdf)
//! ```
//!
//! The session is closed on every path before [`run`] returns.

use crate::config::CaptureConfig;
use crate::diagnostics::DiagnosticsRecorder;
use crate::manager::EngineManager;
use crate::navigation::{self, CaptureSession};
use crate::{dimensions, readiness, rebuild, snapshot, strategy};
use crate::{CaptureKind, CaptureRequest, CaptureResult, Error, Result, Stage};
use log::{error, info, warn};
use std::time::{Duration, Instant};
use url::Url;

/// Capture `request` end to end on the shared engine.
pub fn run(
    manager: &EngineManager,
    config: &CaptureConfig,
    diagnostics: &DiagnosticsRecorder,
    request: &CaptureRequest,
) -> Result<CaptureResult> {
    let started = Instant::now();
    let url = request.target_url(&config.base()?)?;

    let mut session = navigation::open(manager, request)?;
    let id = session.id();

    let outcome = capture(&mut session, &url, config, diagnostics, request);

    // A stage error on a dead engine is an engine failure, whatever the stage
    // saw. Discard the engine so the next request relaunches.
    let outcome = match outcome {
        Err(e) if !matches!(e, Error::EngineUnavailable(_)) && !session.engine().is_alive() => {
            Err(Error::EngineUnavailable(format!("engine lost during capture: {}", e)))
        }
        other => other,
    };
    if matches!(outcome, Err(Error::EngineUnavailable(_))) {
        manager.invalidate(session.engine());
    }

    if let Err(e) = session.close() {
        warn!("capture #{}: closing session failed: {}", id, e);
    }

    match &outcome {
        Ok(result) => info!(
            "capture #{}: {} {} ok, {} bytes in {:?} (sha256 {})",
            id,
            request.kind(),
            url,
            result.len(),
            started.elapsed(),
            result.sha256_hex()
        ),
        Err(e) => error!(
            "capture #{}: {} {} failed after {:?}: {}",
            id,
            request.kind(),
            url,
            started.elapsed(),
            e
        ),
    }
    outcome
}

fn capture(
    session: &mut CaptureSession,
    url: &Url,
    config: &CaptureConfig,
    diagnostics: &DiagnosticsRecorder,
    request: &CaptureRequest,
) -> Result<CaptureResult> {
    let kind = request.kind();
    let poll = Duration::from_millis(config.readiness.poll_interval_ms);
    let root = config.selectors.root_selector(kind);

    navigation::navigate(session, url, config.navigation_timeout(), poll, diagnostics)?;

    let checks = readiness::plan(kind, request.has_logo(), config);
    readiness::wait_ready(session, &checks, poll, diagnostics)?;

    let bytes = match kind {
        CaptureKind::Banner => strategy::element_screenshot(session, &root, diagnostics)?,
        CaptureKind::ResumePdf => {
            let snap = recorded(session, diagnostics, Stage::Extraction, |s| snapshot::extract(s, &root))?;

            let base = rebuild::base_href(url);
            recorded(session, diagnostics, Stage::Rebuild, |s| {
                rebuild::rebuild(s, &snap, &base)?;
                rebuild::settle(
                    s,
                    Duration::from_millis(config.readiness.stylesheets_timeout_ms),
                    Duration::from_millis(config.readiness.fonts_timeout_ms),
                    poll,
                    Duration::from_millis(config.page.settle_delay_ms),
                )
            })?;

            let dims = recorded(session, diagnostics, Stage::Measure, |s| {
                strategy::prepare_print_layout(s, &config.page)?;
                dimensions::measure(s, &root, &config.page)
            })?;
            recorded(session, diagnostics, Stage::Capture, |s| strategy::paginated_print(s, &dims))?
        }
    };

    Ok(CaptureResult::new(bytes, kind.content_kind()))
}

/// Run one stage, recording diagnostics if it fails.
fn recorded<T>(
    session: &mut CaptureSession,
    diagnostics: &DiagnosticsRecorder,
    stage: Stage,
    f: impl FnOnce(&mut CaptureSession) -> Result<T>,
) -> Result<T> {
    let result = f(session);
    if let Err(e) = &result {
        diagnostics.record(session, stage, &e.to_string());
    }
    result
}

//! Opening isolated capture sessions and navigating them.

use crate::backend::{Engine, SessionDriver};
use crate::diagnostics::DiagnosticsRecorder;
use crate::manager::EngineManager;
use crate::readiness::poll_until;
use crate::{scripts, CaptureRequest, Error, Result, Stage};
use log::{debug, warn};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use url::Url;

static NEXT_CAPTURE_ID: AtomicU64 = AtomicU64::new(1);

/// One isolated browsing context serving exactly one capture request.
///
/// The session is closed when dropped, so every exit path of the pipeline
/// (including `?` on errors) tears it down. `close` does the same explicitly
/// and reports the outcome.
pub struct CaptureSession {
    id: u64,
    driver: Box<dyn SessionDriver>,
    engine: Arc<dyn Engine>,
    url: Option<Url>,
    closed: bool,
}

impl CaptureSession {
    pub fn new(driver: Box<dyn SessionDriver>, engine: Arc<dyn Engine>) -> Self {
        Self {
            id: NEXT_CAPTURE_ID.fetch_add(1, Ordering::Relaxed),
            driver,
            engine,
            url: None,
            closed: false,
        }
    }

    /// Process-unique id used in logs and diagnostics
    pub fn id(&self) -> u64 {
        self.id
    }

    /// URL the session was last navigated to
    pub fn url(&self) -> Option<&Url> {
        self.url.as_ref()
    }

    pub fn driver(&mut self) -> &mut dyn SessionDriver {
        self.driver.as_mut()
    }

    /// Engine this session was opened from
    pub fn engine(&self) -> &Arc<dyn Engine> {
        &self.engine
    }

    pub fn close(mut self) -> Result<()> {
        self.closed = true;
        self.driver.close()
    }
}

impl Drop for CaptureSession {
    fn drop(&mut self) {
        if !self.closed {
            if let Err(e) = self.driver.close() {
                warn!("capture #{}: closing session failed: {}", self.id, e);
            }
        }
    }
}

/// Open a fresh isolated session on the shared engine for `request`.
pub fn open(manager: &EngineManager, request: &CaptureRequest) -> Result<CaptureSession> {
    let engine = manager.acquire()?;
    let driver = match engine.open_context() {
        Ok(driver) => driver,
        Err(e) => {
            if !engine.is_alive() {
                manager.invalidate(&engine);
                return Err(Error::EngineUnavailable(e.to_string()));
            }
            return Err(e);
        }
    };
    let session = CaptureSession::new(driver, engine);
    debug!("capture #{}: opened {} session", session.id(), request.kind());
    Ok(session)
}

/// Load `url` and wait until its structural DOM is parsed.
///
/// Sub-resources are not awaited here; that is the readiness waiter's job.
/// On failure the diagnostics recorder runs before the error is returned.
pub fn navigate(
    session: &mut CaptureSession,
    url: &Url,
    timeout: Duration,
    poll_interval: Duration,
    diagnostics: &DiagnosticsRecorder,
) -> Result<()> {
    let started = Instant::now();
    session.url = Some(url.clone());

    let result = load(session, url, timeout, poll_interval);
    match &result {
        Ok(()) => debug!("capture #{}: navigated to {} in {:?}", session.id, url, started.elapsed()),
        Err(e) => {
            warn!("capture #{}: navigation to {} failed: {}", session.id, url, e);
            diagnostics.record(session, Stage::Navigation, "navigation");
        }
    }
    result
}

fn load(session: &mut CaptureSession, url: &Url, timeout: Duration, poll_interval: Duration) -> Result<()> {
    let started = Instant::now();
    let timed_out = || Error::NavigationTimeout {
        url: url.to_string(),
        timeout_ms: timeout.as_millis() as u64,
    };

    if let Err(e) = session.driver().navigate(url.as_str(), timeout) {
        return Err(match e {
            Error::NavigationTimeout { .. } | Error::EngineUnavailable(_) => e,
            // a backend that gave up on its own clock still ran out of our budget
            _ if started.elapsed() >= timeout => timed_out(),
            Error::Navigation { .. } => e,
            other => Error::Navigation {
                url: url.to_string(),
                reason: other.to_string(),
            },
        });
    }

    let remaining = timeout.saturating_sub(started.elapsed());
    if poll_until(session.driver(), &scripts::document_parsed(), remaining, poll_interval)? {
        Ok(())
    } else {
        Err(timed_out())
    }
}

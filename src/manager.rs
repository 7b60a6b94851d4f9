//! Ownership of the one shared browsing-engine process.

use crate::backend::{Engine, EngineLauncher};
use crate::{EngineConfig, Error, Result};
use log::{debug, info, warn};
use std::sync::{Arc, RwLock};
use std::time::Instant;

/// Lazily launches, shares and tears down the engine process.
///
/// Constructed once at startup and handed to whoever captures. The launch
/// step runs under the write lock with a re-check, so callers racing on the
/// first `acquire` start at most one process. Once an engine is running,
/// `acquire` only takes the read lock.
pub struct EngineManager {
    launcher: Arc<dyn EngineLauncher>,
    config: EngineConfig,
    slot: RwLock<Option<Arc<dyn Engine>>>,
}

impl EngineManager {
    pub fn new(launcher: Arc<dyn EngineLauncher>, config: EngineConfig) -> Self {
        Self {
            launcher,
            config,
            slot: RwLock::new(None),
        }
    }

    /// Return the running engine, launching one if there is none or the
    /// current one stopped answering.
    ///
    /// A failed launch leaves the manager unlaunched; the next call retries.
    pub fn acquire(&self) -> Result<Arc<dyn Engine>> {
        if let Some(engine) = self.current() {
            if engine.is_alive() {
                return Ok(engine);
            }
        }

        let mut slot = self
            .slot
            .write()
            .map_err(|_| Error::EngineUnavailable("engine slot poisoned".into()))?;

        // Another caller may have relaunched while we waited for the lock.
        if let Some(engine) = slot.as_ref() {
            if engine.is_alive() {
                return Ok(engine.clone());
            }
            warn!("Shared engine stopped responding; relaunching");
            engine.close();
            *slot = None;
        }

        let started = Instant::now();
        let engine = self
            .launcher
            .launch(&self.config)
            .map_err(|e| match e {
                Error::EngineUnavailable(_) => e,
                other => Error::EngineUnavailable(other.to_string()),
            })?;
        info!("Launched shared engine in {:?}", started.elapsed());

        *slot = Some(engine.clone());
        Ok(engine)
    }

    /// Drop `engine` if it is still the current one, so the next `acquire`
    /// relaunches. Used after an engine-level failure.
    pub fn invalidate(&self, engine: &Arc<dyn Engine>) {
        let Ok(mut slot) = self.slot.write() else {
            return;
        };
        let is_current = slot.as_ref().is_some_and(|cur| same_engine(cur, engine));
        if is_current {
            debug!("Discarding failed engine");
            engine.close();
            *slot = None;
        }
    }

    /// Terminate the engine. A later `acquire` transparently relaunches.
    pub fn shutdown(&self) {
        let taken = match self.slot.write() {
            Ok(mut slot) => slot.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(engine) = taken {
            info!("Shutting down shared engine");
            engine.close();
        }
    }

    /// Whether an engine is currently held (it may still be unhealthy)
    pub fn is_launched(&self) -> bool {
        self.current().is_some()
    }

    fn current(&self) -> Option<Arc<dyn Engine>> {
        self.slot.read().ok().and_then(|slot| slot.clone())
    }
}

// Compare data pointers only; vtable pointers of the same type may differ.
fn same_engine(a: &Arc<dyn Engine>, b: &Arc<dyn Engine>) -> bool {
    std::ptr::eq(Arc::as_ptr(a) as *const (), Arc::as_ptr(b) as *const ())
}

impl Drop for EngineManager {
    fn drop(&mut self) {
        self.shutdown();
    }
}

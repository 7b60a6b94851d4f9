use crate::backend::EngineLauncher;
use crate::diagnostics::{DiagnosticsRecorder, DiagnosticsSink, DirectorySink, LogSink};
use crate::manager::EngineManager;
use crate::{pipeline, CaptureConfig, CaptureRequest, CaptureResult, Error, Result};
use futures::future::join_all;
use std::sync::Arc;

struct Inner {
    manager: EngineManager,
    config: CaptureConfig,
    diagnostics: DiagnosticsRecorder,
}

/// Async entry point for captures.
///
/// Owns the [`EngineManager`] and runs each capture on tokio's blocking pool,
/// so concurrent requests progress independently while the backend blocks.
/// Cloning is cheap; clones share the same engine.
#[derive(Clone)]
pub struct Capturer {
    inner: Arc<Inner>,
}

impl Capturer {
    /// Build a capturer over `launcher`, reporting failures to `sink`.
    pub fn new(config: CaptureConfig, launcher: Arc<dyn EngineLauncher>, sink: Arc<dyn DiagnosticsSink>) -> Result<Self> {
        config.validate()?;
        let manager = EngineManager::new(launcher, config.engine.clone());
        Ok(Self {
            inner: Arc::new(Inner {
                manager,
                config,
                diagnostics: DiagnosticsRecorder::new(sink),
            }),
        })
    }

    /// Like [`Capturer::new`], with the sink chosen from
    /// `config.diagnostics_dir` (a directory sink, or logging only).
    pub fn from_config(config: CaptureConfig, launcher: Arc<dyn EngineLauncher>) -> Result<Self> {
        let sink: Arc<dyn DiagnosticsSink> = match &config.diagnostics_dir {
            Some(dir) => Arc::new(DirectorySink::new(dir)),
            None => Arc::new(LogSink),
        };
        Self::new(config, launcher, sink)
    }

    /// Capturer backed by headless Chrome.
    #[cfg(feature = "cdp")]
    pub fn with_chrome(config: CaptureConfig) -> Result<Self> {
        Self::from_config(config, Arc::new(crate::cdp::CdpLauncher))
    }

    pub fn config(&self) -> &CaptureConfig {
        &self.inner.config
    }

    pub fn manager(&self) -> &EngineManager {
        &self.inner.manager
    }

    /// Capture `request` without blocking the async runtime.
    pub async fn capture(&self, request: CaptureRequest) -> Result<CaptureResult> {
        let inner = self.inner.clone();
        tokio::task::spawn_blocking(move || pipeline::run(&inner.manager, &inner.config, &inner.diagnostics, &request))
            .await
            .map_err(|e| Error::Other(format!("Capture task failed: {}", e)))?
    }

    /// Capture on the current thread. For callers outside an async runtime.
    pub fn capture_blocking(&self, request: &CaptureRequest) -> Result<CaptureResult> {
        pipeline::run(&self.inner.manager, &self.inner.config, &self.inner.diagnostics, request)
    }

    /// Run several captures concurrently; results keep the order of `requests`.
    pub async fn capture_all(&self, requests: Vec<CaptureRequest>) -> Vec<Result<CaptureResult>> {
        join_all(requests.into_iter().map(|r| self.capture(r))).await
    }

    /// Launch the engine ahead of the first request.
    pub async fn warm_up(&self) -> Result<()> {
        let inner = self.inner.clone();
        tokio::task::spawn_blocking(move || inner.manager.acquire().map(|_| ()))
            .await
            .map_err(|e| Error::Other(format!("Warm-up task failed: {}", e)))?
    }

    /// Stop the engine. Later captures relaunch it.
    pub async fn shutdown(&self) {
        let inner = self.inner.clone();
        if let Err(e) = tokio::task::spawn_blocking(move || inner.manager.shutdown()).await {
            log::warn!("Engine shutdown task failed: {}", e);
        }
    }
}

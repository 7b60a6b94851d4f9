//! Docshot capture pipeline
//!
//! Turns a dynamically rendered, data-bound document (a resume or a
//! promotional banner) served by an external document source into a
//! deterministic PNG or single-page PDF, by driving a shared headless
//! browsing engine through navigation, readiness waiting, snapshot
//! extraction, minimal-document rebuild and measurement.
//!
//! # Features
//!
//! - **CDP Backend** (default): Uses Chrome DevTools Protocol via headless Chrome
//! - **Backend seam**: the pipeline talks to [`backend::Engine`] and
//!   [`backend::SessionDriver`], so alternative engines (or scripted test
//!   doubles) plug in without touching the stages
//! - **One engine, many sessions**: a single engine process is shared and each
//!   capture runs in its own isolated browser context
//!
//! # Example
//!
//! ```no_run
//! use docshot::{CaptureConfig, CaptureKind, CaptureRequest, Capturer};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = CaptureConfig {
//!     base_url: "http://localhost:3000".to_string(),
//!     ..Default::default()
//! };
//!
//! let capturer = Capturer::with_chrome(config)?;
//! let request = CaptureRequest::new(CaptureKind::ResumePdf, "/resume/preview")
//!     .palette("slate")
//!     .lang("en")
//!     .owner("user-42");
//! let pdf = capturer.capture(request).await?;
//! std::fs::write("resume.pdf", pdf.bytes())?;
//! capturer.shutdown().await;
//! # Ok(())
//! # }
//! ```

use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use url::Url;

pub mod error;
pub use error::{Error, Result, Stage};

pub mod config;
pub use config::{CaptureConfig, PageConfig, ReadinessConfig, SelectorConfig};

// Engine/session traits the pipeline is written against
pub mod backend;

#[cfg(feature = "cdp")]
pub mod cdp;

pub mod scripts;
pub mod manager;
pub mod navigation;
pub mod readiness;
pub mod snapshot;
pub mod rebuild;
pub mod dimensions;
pub mod strategy;
pub mod diagnostics;
pub mod pipeline;

// Async facade over the blocking pipeline
pub mod async_api;

pub use async_api::Capturer;
pub use dimensions::{ComputedDimensions, LengthUnit};
pub use manager::EngineManager;
pub use snapshot::Snapshot;

/// Query parameter carrying the palette identifier
pub const PARAM_PALETTE: &str = "palette";
/// Query parameter carrying the logo image reference
pub const PARAM_LOGO: &str = "logo";
/// Query parameter carrying the language code
pub const PARAM_LANG: &str = "lang";
/// Query parameter carrying the banner color
pub const PARAM_COLOR: &str = "color";
/// Query parameter carrying the owning-user identifier
pub const PARAM_OWNER: &str = "userId";

/// Configuration for launching the shared browsing engine
///
/// The defaults launch a sandboxed headless Chrome found on the `PATH` with a
/// desktop-sized window and an idle timeout long enough that a quiet service
/// does not lose its engine between requests.
///
/// # Examples
///
/// ```
/// let cfg = docshot::EngineConfig::default();
/// assert!(cfg.sandbox);
/// assert_eq!(cfg.viewport.width, 1280);
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Explicit browser executable; autodetected when `None`
    pub chrome_path: Option<PathBuf>,
    /// Window dimensions of every capture session
    pub viewport: Viewport,
    /// Whether to keep the browser sandbox enabled
    pub sandbox: bool,
    /// How long the engine may sit idle before the backend reaps it
    pub idle_timeout_ms: u64,
    /// Budget for a single protocol command (screenshot, print, evaluate)
    pub command_timeout_ms: u64,
    /// Extra command-line switches passed to the browser
    pub extra_args: Vec<String>,
    /// Optional user agent override for every session
    pub user_agent: Option<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            chrome_path: None,
            viewport: Viewport::default(),
            sandbox: true,
            idle_timeout_ms: 24 * 60 * 60 * 1000,
            command_timeout_ms: 30000,
            extra_args: vec!["--font-render-hinting=none".to_string()],
            user_agent: None,
        }
    }
}

/// Viewport dimensions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
        }
    }
}

/// What a capture produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CaptureKind {
    /// Element screenshot of a promotional banner (PNG)
    Banner,
    /// Single-page paginated print of a resume (PDF)
    ResumePdf,
}

impl CaptureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CaptureKind::Banner => "banner",
            CaptureKind::ResumePdf => "resume-pdf",
        }
    }

    /// Content kind of the artifact this capture kind produces
    pub fn content_kind(&self) -> ContentKind {
        match self {
            CaptureKind::Banner => ContentKind::Png,
            CaptureKind::ResumePdf => ContentKind::Pdf,
        }
    }
}

impl fmt::Display for CaptureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for CaptureKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "banner" => Ok(CaptureKind::Banner),
            "resume-pdf" | "resume" => Ok(CaptureKind::ResumePdf),
            other => Err(Error::Config(format!("unknown capture kind '{}'", other))),
        }
    }
}

/// Content type of a capture result
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentKind {
    Png,
    Pdf,
}

impl ContentKind {
    pub fn mime(&self) -> &'static str {
        match self {
            ContentKind::Png => "image/png",
            ContentKind::Pdf => "application/pdf",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            ContentKind::Png => "png",
            ContentKind::Pdf => "pdf",
        }
    }
}

/// Immutable description of one document to capture
///
/// Parameters are opaque strings: they are passed through to the target URL
/// and never interpreted by the pipeline. They are kept sorted so the same
/// request always produces the same URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureRequest {
    kind: CaptureKind,
    path: String,
    params: BTreeMap<String, String>,
}

impl CaptureRequest {
    pub fn new(kind: CaptureKind, path: impl Into<String>) -> Self {
        Self {
            kind,
            path: path.into(),
            params: BTreeMap::new(),
        }
    }

    /// Add (or replace) a named query parameter
    pub fn param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(name.into(), value.into());
        self
    }

    pub fn palette(self, palette: impl Into<String>) -> Self {
        self.param(PARAM_PALETTE, palette)
    }

    pub fn logo(self, logo: impl Into<String>) -> Self {
        self.param(PARAM_LOGO, logo)
    }

    pub fn lang(self, lang: impl Into<String>) -> Self {
        self.param(PARAM_LANG, lang)
    }

    pub fn color(self, color: impl Into<String>) -> Self {
        self.param(PARAM_COLOR, color)
    }

    pub fn owner(self, owner: impl Into<String>) -> Self {
        self.param(PARAM_OWNER, owner)
    }

    pub fn kind(&self) -> CaptureKind {
        self.kind
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn params(&self) -> &BTreeMap<String, String> {
        &self.params
    }

    /// Whether a logo reference was supplied (an empty value counts as none)
    pub fn has_logo(&self) -> bool {
        self.params.get(PARAM_LOGO).is_some_and(|v| !v.trim().is_empty())
    }

    /// Build the document-source URL for this request against `base`.
    pub fn target_url(&self, base: &Url) -> Result<Url> {
        let mut url = base
            .join(&self.path)
            .map_err(|e| Error::Config(format!("invalid target path '{}': {}", self.path, e)))?;
        url.set_query(None);
        if !self.params.is_empty() {
            url.query_pairs_mut().extend_pairs(self.params.iter());
        }
        Ok(url)
    }
}

/// Output of a successful capture; ownership passes to the caller.
#[derive(Debug, Clone)]
pub struct CaptureResult {
    bytes: Vec<u8>,
    content_kind: ContentKind,
}

impl CaptureResult {
    pub fn new(bytes: Vec<u8>, content_kind: ContentKind) -> Self {
        Self { bytes, content_kind }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    pub fn content_kind(&self) -> ContentKind {
        self.content_kind
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Hex sha256 of the artifact, used to compare repeated captures
    pub fn sha256_hex(&self) -> String {
        hex::encode(Sha256::digest(&self.bytes))
    }
}

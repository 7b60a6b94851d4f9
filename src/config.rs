//! Capture configuration: timeouts, selectors and page geometry.

use crate::{CaptureKind, EngineConfig, Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

/// Environment variable overriding [`CaptureConfig::base_url`]
pub const ENV_BASE_URL: &str = "DOCSHOT_BASE_URL";
/// Environment variable overriding [`EngineConfig::chrome_path`]
pub const ENV_CHROME_PATH: &str = "DOCSHOT_CHROME_PATH";

/// Top-level configuration for a [`crate::Capturer`].
///
/// Every field has a default, so a JSON file only needs to name what it
/// changes.
///
/// ```
/// let cfg: docshot::CaptureConfig =
///     serde_json::from_str(r#"{ "base_url": "http://docs:8080" }"#).unwrap();
/// assert_eq!(cfg.navigation_timeout_ms, 30000);
/// cfg.validate().unwrap();
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Origin of the document source; request paths are joined onto it
    pub base_url: String,
    pub engine: EngineConfig,
    /// Budget for the target to reach a parsed DOM
    pub navigation_timeout_ms: u64,
    pub readiness: ReadinessConfig,
    pub selectors: SelectorConfig,
    pub page: PageConfig,
    /// When set, failure diagnostics are written here instead of only logged
    pub diagnostics_dir: Option<PathBuf>,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:3000".to_string(),
            engine: EngineConfig::default(),
            navigation_timeout_ms: 30_000,
            readiness: ReadinessConfig::default(),
            selectors: SelectorConfig::default(),
            page: PageConfig::default(),
            diagnostics_dir: None,
        }
    }
}

/// Per-predicate wait budgets
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ReadinessConfig {
    pub root_timeout_ms: u64,
    pub ready_attribute_timeout_ms: u64,
    pub fonts_timeout_ms: u64,
    pub logo_timeout_ms: u64,
    pub code_block_timeout_ms: u64,
    /// Budget for the rebuilt document's stylesheets to load
    pub stylesheets_timeout_ms: u64,
    /// Delay between two evaluations of the same predicate
    pub poll_interval_ms: u64,
}

impl Default for ReadinessConfig {
    fn default() -> Self {
        Self {
            root_timeout_ms: 15_000,
            ready_attribute_timeout_ms: 20_000,
            fonts_timeout_ms: 10_000,
            logo_timeout_ms: 10_000,
            code_block_timeout_ms: 10_000,
            stylesheets_timeout_ms: 10_000,
            poll_interval_ms: 100,
        }
    }
}

/// How the document source marks up what we capture
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SelectorConfig {
    /// Id of the resume root element
    pub resume_root_id: String,
    /// Id of the banner root element
    pub banner_root_id: String,
    /// Attribute the page sets on the root once rendering has settled
    pub ready_attribute: String,
    /// Sentinel value of `ready_attribute`
    pub ready_value: String,
    /// Image element showing the supplied logo
    pub logo_selector: String,
    /// Syntax-highlighted code preview inside banners
    pub code_block_selector: String,
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            resume_root_id: "resume-root".to_string(),
            banner_root_id: "banner-root".to_string(),
            ready_attribute: "data-render-state".to_string(),
            ready_value: "ready".to_string(),
            logo_selector: "img[data-logo]".to_string(),
            code_block_selector: "pre code".to_string(),
        }
    }
}

impl SelectorConfig {
    pub fn root_id(&self, kind: CaptureKind) -> &str {
        match kind {
            CaptureKind::Banner => &self.banner_root_id,
            CaptureKind::ResumePdf => &self.resume_root_id,
        }
    }

    /// CSS selector for the root element of `kind`
    pub fn root_selector(&self, kind: CaptureKind) -> String {
        format!("#{}", self.root_id(kind))
    }
}

/// Geometry of the printed page
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PageConfig {
    /// Fixed physical page width (A4 by default)
    pub width_mm: f64,
    /// Added to the measured height against off-by-one clipping
    pub height_buffer_mm: f64,
    /// Pause after the document is rebuilt, before measuring
    pub settle_delay_ms: u64,
}

impl Default for PageConfig {
    fn default() -> Self {
        Self {
            width_mm: 210.0,
            height_buffer_mm: 2.0,
            settle_delay_ms: 300,
        }
    }
}

impl CaptureConfig {
    /// Load a configuration from a JSON file; missing fields take defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("cannot read {}: {}", path.display(), e)))?;
        let cfg: CaptureConfig = serde_json::from_str(&raw)
            .map_err(|e| Error::Config(format!("cannot parse {}: {}", path.display(), e)))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Apply `DOCSHOT_*` environment overrides.
    pub fn apply_env(mut self) -> Self {
        if let Ok(base) = std::env::var(ENV_BASE_URL) {
            if !base.trim().is_empty() {
                self.base_url = base;
            }
        }
        if let Ok(path) = std::env::var(ENV_CHROME_PATH) {
            if !path.trim().is_empty() {
                self.engine.chrome_path = Some(PathBuf::from(path));
            }
        }
        self
    }

    pub fn base(&self) -> Result<Url> {
        Url::parse(&self.base_url)
            .map_err(|e| Error::Config(format!("invalid base_url '{}': {}", self.base_url, e)))
    }

    pub fn navigation_timeout(&self) -> Duration {
        Duration::from_millis(self.navigation_timeout_ms)
    }

    pub fn validate(&self) -> Result<()> {
        self.base()?;

        if self.navigation_timeout_ms == 0 {
            return Err(Error::Config("navigation_timeout_ms must be positive".into()));
        }

        let r = &self.readiness;
        let budgets = [
            ("root_timeout_ms", r.root_timeout_ms),
            ("ready_attribute_timeout_ms", r.ready_attribute_timeout_ms),
            ("fonts_timeout_ms", r.fonts_timeout_ms),
            ("logo_timeout_ms", r.logo_timeout_ms),
            ("code_block_timeout_ms", r.code_block_timeout_ms),
            ("stylesheets_timeout_ms", r.stylesheets_timeout_ms),
            ("poll_interval_ms", r.poll_interval_ms),
        ];
        if let Some((name, _)) = budgets.iter().find(|(_, v)| *v == 0) {
            return Err(Error::Config(format!("readiness.{} must be positive", name)));
        }

        let s = &self.selectors;
        let selectors = [
            ("resume_root_id", &s.resume_root_id),
            ("banner_root_id", &s.banner_root_id),
            ("ready_attribute", &s.ready_attribute),
            ("ready_value", &s.ready_value),
            ("logo_selector", &s.logo_selector),
            ("code_block_selector", &s.code_block_selector),
        ];
        if let Some((name, _)) = selectors.iter().find(|(_, v)| v.trim().is_empty()) {
            return Err(Error::Config(format!("selectors.{} must not be empty", name)));
        }
        // root ids are spliced into `#id` selectors unescaped
        for (name, id) in [("resume_root_id", &s.resume_root_id), ("banner_root_id", &s.banner_root_id)] {
            if !is_css_identifier(id) {
                return Err(Error::Config(format!(
                    "selectors.{} '{}' is not a plain CSS identifier",
                    name, id
                )));
            }
        }

        if !(self.page.width_mm.is_finite() && self.page.width_mm > 0.0) {
            return Err(Error::Config("page.width_mm must be positive".into()));
        }
        if !(self.page.height_buffer_mm.is_finite() && self.page.height_buffer_mm >= 0.0) {
            return Err(Error::Config("page.height_buffer_mm must not be negative".into()));
        }
        if self.page.settle_delay_ms >= 1000 {
            return Err(Error::Config("page.settle_delay_ms must stay under one second".into()));
        }

        Ok(())
    }
}

/// Letters, digits, `-` and `_`, not starting with a digit or `--`
fn is_css_identifier(id: &str) -> bool {
    let rest = id.strip_prefix('-').unwrap_or(id);
    let mut chars = rest.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

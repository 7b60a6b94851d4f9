//! Error types for the capture pipeline

use crate::readiness::ReadinessPredicate;
use std::fmt;
use thiserror::Error;

/// Result type alias for capture operations
pub type Result<T> = std::result::Result<T, Error>;

/// Pipeline stage an error (or a diagnostics record) belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Engine,
    Navigation,
    Readiness,
    Extraction,
    Rebuild,
    Measure,
    Capture,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Engine => "engine",
            Stage::Navigation => "navigation",
            Stage::Readiness => "readiness",
            Stage::Extraction => "extraction",
            Stage::Rebuild => "rebuild",
            Stage::Measure => "measure",
            Stage::Capture => "capture",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors that can occur while producing a capture
#[derive(Error, Debug)]
pub enum Error {
    /// The shared browsing engine could not be launched or stopped answering
    #[error("Browsing engine unavailable: {0}")]
    EngineUnavailable(String),

    /// The target URL failed to load
    #[error("Navigation to {url} failed: {reason}")]
    Navigation { url: String, reason: String },

    /// The target URL did not reach a parsed DOM in time
    #[error("Navigation to {url} timed out after {timeout_ms}ms")]
    NavigationTimeout { url: String, timeout_ms: u64 },

    /// The page loaded but one readiness predicate never held
    #[error("Readiness check '{predicate}' did not pass within {timeout_ms}ms")]
    Readiness {
        predicate: ReadinessPredicate,
        timeout_ms: u64,
    },

    /// The target element was absent when it was needed
    #[error("Element not found: {0}")]
    ElementNotFound(String),

    /// The snapshot could not be read back from the page
    #[error("Snapshot extraction failed: {0}")]
    Extraction(String),

    /// The minimal document could not replace the page
    #[error("Document rebuild failed: {0}")]
    Rebuild(String),

    /// The rebuilt document could not be laid out or measured for print
    #[error("Measuring content failed: {0}")]
    Measure(String),

    /// Rasterizing to PNG/PDF failed
    #[error("Capture failed: {0}")]
    Capture(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Backend-level failure that does not fit a pipeline stage
    #[error("Engine error: {0}")]
    Engine(String),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Stage the error is attributed to, if any.
    pub fn stage(&self) -> Option<Stage> {
        match self {
            Error::EngineUnavailable(_) | Error::Engine(_) => Some(Stage::Engine),
            Error::Navigation { .. } | Error::NavigationTimeout { .. } => Some(Stage::Navigation),
            Error::Readiness { .. } => Some(Stage::Readiness),
            Error::Extraction(_) => Some(Stage::Extraction),
            Error::Rebuild(_) => Some(Stage::Rebuild),
            Error::Measure(_) => Some(Stage::Measure),
            Error::ElementNotFound(_) | Error::Capture(_) => Some(Stage::Capture),
            Error::Config(_) | Error::Other(_) => None,
        }
    }

    /// Whether retrying the identical request later can reasonably succeed.
    ///
    /// Readiness failures reproduce on retry against the same source page, and
    /// a missing element is a contract violation of the source.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::EngineUnavailable(_) | Error::Navigation { .. } | Error::NavigationTimeout { .. }
        )
    }

    /// True when the page never produced its root element at all, as opposed
    /// to producing it and never finishing rendering.
    pub fn is_page_missing(&self) -> bool {
        matches!(
            self,
            Error::Navigation { .. }
                | Error::NavigationTimeout { .. }
                | Error::Readiness {
                    predicate: ReadinessPredicate::RootPresent,
                    ..
                }
        )
    }

    /// Message suitable for end users; internal stage names are not exposed.
    pub fn user_message(&self) -> &'static str {
        match self {
            Error::Config(_) => "The document service is misconfigured.",
            _ => "Could not generate the document, please try again.",
        }
    }
}

impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Error::Engine(err.to_string())
    }
}

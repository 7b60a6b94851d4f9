//! Reading styles and the target subtree back out of a ready page.

use crate::navigation::CaptureSession;
use crate::{scripts, Error, Result};
use log::debug;
use serde::Deserialize;

/// Styles plus target markup, enough to rebuild the target in isolation.
///
/// Produced once per capture after readiness succeeded, consumed by
/// [`crate::rebuild`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    /// `<link rel="stylesheet">` tags of the head, verbatim
    pub stylesheet_links: Vec<String>,
    /// `<style>` tags of the head, verbatim
    pub inline_styles: Vec<String>,
    /// Outer markup of the root element
    pub root_markup: String,
    /// Custom properties set inline on `<html>`, flattened as `--a: 1; --b: 2;`
    pub root_variables: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawSnapshot {
    #[serde(default)]
    stylesheet_links: Vec<String>,
    #[serde(default)]
    inline_styles: Vec<String>,
    root_markup: Option<String>,
    #[serde(default)]
    root_variables: String,
}

impl Snapshot {
    /// Parse the JSON produced by [`scripts::extract_snapshot`].
    pub fn from_json(raw: &str, root_selector: &str) -> Result<Self> {
        let raw: RawSnapshot =
            serde_json::from_str(raw).map_err(|e| Error::Extraction(format!("malformed snapshot: {}", e)))?;
        let root_markup = raw
            .root_markup
            .filter(|m| !m.trim().is_empty())
            .ok_or_else(|| Error::ElementNotFound(root_selector.to_string()))?;
        Ok(Snapshot {
            stylesheet_links: raw.stylesheet_links,
            inline_styles: raw.inline_styles,
            root_markup,
            root_variables: raw.root_variables.trim().to_string(),
        })
    }
}

/// Extract a [`Snapshot`] of `root_selector` in one evaluation.
pub fn extract(session: &mut CaptureSession, root_selector: &str) -> Result<Snapshot> {
    let value = session
        .driver()
        .evaluate(&scripts::extract_snapshot(root_selector))
        .map_err(|e| Error::Extraction(e.to_string()))?;
    let raw = value
        .as_str()
        .ok_or_else(|| Error::Extraction(format!("expected a JSON string, got {}", value)))?;
    let snapshot = Snapshot::from_json(raw, root_selector)?;
    debug!(
        "capture #{}: snapshot with {} stylesheet(s), {} style block(s), {} bytes of markup",
        session.id(),
        snapshot.stylesheet_links.len(),
        snapshot.inline_styles.len(),
        snapshot.root_markup.len()
    );
    Ok(snapshot)
}

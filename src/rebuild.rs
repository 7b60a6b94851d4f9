//! Rebuilding a minimal document around the extracted target.
//!
//! Printing the original page risks pulling in interactive chrome, off-screen
//! elements and anything else that shifts layout. The rebuilt document holds
//! only the extracted styles, a few print-safety rules and the target
//! subtree.

use crate::navigation::CaptureSession;
use crate::readiness::{poll_until, ReadinessPredicate};
use crate::snapshot::Snapshot;
use crate::{scripts, Error, Result};
use log::debug;
use std::time::Duration;
use url::Url;

/// Rules appended after the page's own styles
pub const PRINT_SAFETY_CSS: &str = "\
*, *::before, *::after { -webkit-print-color-adjust: exact !important; print-color-adjust: exact !important; }
*:focus, *:focus-visible, *:focus-within { outline: none !important; }
*, *:hover { --tw-ring-shadow: 0 0 #0000 !important; --tw-ring-offset-shadow: 0 0 #0000 !important; }
html, body { margin: 0 !important; padding: 0 !important; }
body > * { break-inside: avoid; page-break-inside: avoid; }
.no-print, [data-no-print] { display: none !important; }
@page { margin: 0; }";

/// `<base>` target for `url`: its origin, so relative assets still resolve
pub fn base_href(url: &Url) -> String {
    format!("{}/", url.origin().ascii_serialization())
}

/// Serialize the minimal document for `snapshot`.
pub fn render_minimal_document(snapshot: &Snapshot, base_href: &str) -> String {
    let mut head = String::new();
    head.push_str("<meta charset=\"utf-8\">");
    head.push_str(&format!("<base href=\"{}\">", escape_attr(base_href)));
    for link in &snapshot.stylesheet_links {
        head.push_str(link);
    }
    for style in &snapshot.inline_styles {
        head.push_str(style);
    }
    head.push_str("<style data-docshot=\"print-safety\">");
    head.push_str(PRINT_SAFETY_CSS);
    head.push_str("</style>");
    if !snapshot.root_variables.is_empty() {
        head.push_str(&format!(
            "<style data-docshot=\"root-variables\">:root {{ {} }}</style>",
            snapshot.root_variables
        ));
    }

    format!(
        "<!DOCTYPE html><html><head>{}</head><body>{}</body></html>",
        head, snapshot.root_markup
    )
}

/// Replace the session's document with the minimal document for `snapshot`.
pub fn rebuild(session: &mut CaptureSession, snapshot: &Snapshot, base_href: &str) -> Result<()> {
    let html = render_minimal_document(snapshot, base_href);
    session
        .driver()
        .evaluate(&scripts::replace_document(&html))
        .map_err(|e| Error::Rebuild(e.to_string()))?;
    debug!("capture #{}: rebuilt document ({} bytes)", session.id(), html.len());
    Ok(())
}

/// Wait for the rebuilt document's stylesheets and then its fonts, then pause
/// for `settle_delay` so layout caught up with the replaced document.
pub fn settle(
    session: &mut CaptureSession,
    stylesheets_timeout: Duration,
    fonts_timeout: Duration,
    poll_interval: Duration,
    settle_delay: Duration,
) -> Result<()> {
    if !poll_until(session.driver(), &scripts::document_complete(), stylesheets_timeout, poll_interval)? {
        return Err(Error::Readiness {
            predicate: ReadinessPredicate::StylesheetsLoaded,
            timeout_ms: stylesheets_timeout.as_millis() as u64,
        });
    }
    if !poll_until(session.driver(), &scripts::fonts_loaded(), fonts_timeout, poll_interval)? {
        return Err(Error::Readiness {
            predicate: ReadinessPredicate::FontsLoaded,
            timeout_ms: fonts_timeout.as_millis() as u64,
        });
    }
    std::thread::sleep(settle_delay);
    Ok(())
}

fn escape_attr(s: &str) -> String {
    s.replace('&', "&amp;").replace('"', "&quot;").replace('<', "&lt;")
}

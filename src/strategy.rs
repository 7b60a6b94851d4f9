//! Terminal capture operations: element screenshot and paginated print.

use crate::config::PageConfig;
use crate::dimensions::{self, ComputedDimensions};
use crate::diagnostics::DiagnosticsRecorder;
use crate::navigation::CaptureSession;
use crate::{scripts, Error, Result, Stage};
use log::{debug, warn};

/// Rasterize the element matching `root_selector` on the original page to PNG.
///
/// The root is checked again right before capture; its absence is a contract
/// violation of the document source and fails with
/// [`Error::ElementNotFound`] after diagnostics are recorded.
pub fn element_screenshot(
    session: &mut CaptureSession,
    root_selector: &str,
    diagnostics: &DiagnosticsRecorder,
) -> Result<Vec<u8>> {
    let present = matches!(
        session.driver().evaluate(&scripts::root_present(root_selector)),
        Ok(serde_json::Value::Bool(true))
    );
    if !present {
        diagnostics.record(session, Stage::Capture, "element-not-found");
        return Err(Error::ElementNotFound(root_selector.to_string()));
    }

    if let Err(e) = session.driver().evaluate(&scripts::inject_quality_styles()) {
        warn!("capture #{}: quality style injection failed: {}", session.id(), e);
    }

    let png = session
        .driver()
        .capture_element_png(root_selector)
        .map_err(|e| match e {
            Error::ElementNotFound(_) => e,
            other => Error::Capture(format!("element screenshot failed: {}", other)),
        })?;
    if png.is_empty() {
        return Err(Error::Capture("element screenshot returned no data".into()));
    }
    debug!("capture #{}: element screenshot {} bytes", session.id(), png.len());
    Ok(png)
}

/// Switch the rebuilt document to print media at the page width, so the
/// height measured next is the height that gets printed.
pub fn prepare_print_layout(session: &mut CaptureSession, page: &PageConfig) -> Result<()> {
    session
        .driver()
        .emulate_print_media()
        .map_err(|e| Error::Measure(format!("print media emulation failed: {}", e)))?;

    let width_px = dimensions::mm_to_px(page.width_mm);
    session
        .driver()
        .set_layout_width(width_px)
        .map_err(|e| Error::Measure(format!("setting layout width failed: {}", e)))?;
    debug!("capture #{}: print layout at {}px", session.id(), width_px);
    Ok(())
}

/// Print the rebuilt document to a single-page PDF of exactly `dims`.
///
/// Expects [`prepare_print_layout`] to have run before measuring. Margins are
/// zero; spacing lives in the document's own padding so screen and print
/// render alike.
pub fn paginated_print(session: &mut CaptureSession, dims: &ComputedDimensions) -> Result<Vec<u8>> {
    let setup = dims.page_setup();
    let pdf = session
        .driver()
        .print_pdf(&setup)
        .map_err(|e| Error::Capture(format!("print to PDF failed: {}", e)))?;
    if pdf.is_empty() {
        return Err(Error::Capture("print to PDF returned no data".into()));
    }
    debug!(
        "capture #{}: printed {:.2}x{:.2}in PDF, {} bytes",
        session.id(),
        setup.paper_width_in,
        setup.paper_height_in,
        pdf.len()
    );
    Ok(pdf)
}

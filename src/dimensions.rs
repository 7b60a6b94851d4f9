//! Exact page size for the paginated print path.
//!
//! Content height varies per request, so the page height is measured on the
//! rebuilt document every time and never cached. Width stays fixed.

use crate::backend::PdfPageSetup;
use crate::config::PageConfig;
use crate::navigation::CaptureSession;
use crate::{scripts, Error, Result};
use log::{debug, warn};
use serde::Deserialize;

/// CSS reference pixels per inch
pub const PX_PER_INCH: f64 = 96.0;
pub const MM_PER_INCH: f64 = 25.4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LengthUnit {
    Millimeters,
    Inches,
}

/// Width and height of the single output page
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ComputedDimensions {
    pub width: f64,
    pub height: f64,
    pub unit: LengthUnit,
}

/// Convert CSS pixels to millimetres at 96 px/in.
pub fn px_to_mm(px: f64) -> f64 {
    px * MM_PER_INCH / PX_PER_INCH
}

/// Whole CSS pixels spanned by `mm` at 96 px/in
pub fn mm_to_px(mm: f64) -> u32 {
    (mm * PX_PER_INCH / MM_PER_INCH).round().max(0.0) as u32
}

impl ComputedDimensions {
    /// Page of fixed `width_mm` tall enough for `content_px` plus `buffer_mm`.
    pub fn from_content_height(content_px: f64, width_mm: f64, buffer_mm: f64) -> Self {
        let content_px = if content_px.is_finite() { content_px.max(0.0) } else { 0.0 };
        Self {
            width: width_mm,
            height: px_to_mm(content_px) + buffer_mm,
            unit: LengthUnit::Millimeters,
        }
    }

    pub fn to_unit(&self, unit: LengthUnit) -> Self {
        let factor = match (self.unit, unit) {
            (LengthUnit::Millimeters, LengthUnit::Inches) => 1.0 / MM_PER_INCH,
            (LengthUnit::Inches, LengthUnit::Millimeters) => MM_PER_INCH,
            _ => 1.0,
        };
        Self {
            width: self.width * factor,
            height: self.height * factor,
            unit,
        }
    }

    /// Print setup for exactly one page of these dimensions
    pub fn page_setup(&self) -> PdfPageSetup {
        let inches = self.to_unit(LengthUnit::Inches);
        PdfPageSetup {
            paper_width_in: inches.width,
            paper_height_in: inches.height,
            print_background: true,
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Measurement {
    height: f64,
    from_root: bool,
}

/// Measure the rebuilt document and derive the page size.
///
/// Uses the root's scroll height, or the whole document's when the root is
/// gone.
pub fn measure(session: &mut CaptureSession, root_selector: &str, page: &PageConfig) -> Result<ComputedDimensions> {
    let value = session
        .driver()
        .evaluate(&scripts::content_height(root_selector))
        .map_err(|e| Error::Measure(e.to_string()))?;
    let raw = value
        .as_str()
        .ok_or_else(|| Error::Measure(format!("unexpected measurement {}", value)))?;
    let m: Measurement =
        serde_json::from_str(raw).map_err(|e| Error::Measure(format!("malformed measurement: {}", e)))?;

    if !m.from_root {
        warn!(
            "capture #{}: {} missing after rebuild, measuring whole document",
            session.id(),
            root_selector
        );
    }

    let dims = ComputedDimensions::from_content_height(m.height, page.width_mm, page.height_buffer_mm);
    debug!(
        "capture #{}: content {}px -> page {:.2}x{:.2}mm",
        session.id(),
        m.height,
        dims.width,
        dims.height
    );
    Ok(dims)
}

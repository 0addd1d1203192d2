//! Border measurement to content rectangle conversion.
//!
//! Detection often runs on a downsized copy of the image. [`resolve`]
//! maps the measured margins back to original-resolution pixels and
//! produces a rectangle that is always non-empty and inside the image.

use serde::Deserialize;

use crate::border;
use crate::types::{BorderMeasurement, ContentArea, Dimensions, PixelBuffer};

/// A precomputed content area payload could not be used.
///
/// Callers recover from this by falling back to a generic trim; it is
/// never fatal to a conversion.
#[derive(Debug, thiserror::Error)]
pub enum MalformedContentArea {
    /// The payload is not valid JSON or lacks required fields.
    #[error("content area is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// The rectangle has a zero width or height.
    #[error("content area has an empty {axis}")]
    Empty {
        /// Which axis was empty.
        axis: &'static str,
    },
}

/// Convert a border measurement into a content rectangle.
///
/// `scale_factor` is the ratio of detection resolution to original
/// resolution (`0.5` when detection ran on a half-size copy). Margins
/// are divided by it and rounded to whole pixels. A non-finite or
/// non-positive factor is treated as `1.0`.
///
/// The result is clamped to the original image and floored at one
/// pixel on each axis, so an all-background image still yields a
/// usable 1x1 (or wider) rectangle.
#[must_use]
pub fn resolve(
    measurement: BorderMeasurement,
    original_width: u32,
    original_height: u32,
    scale_factor: f64,
) -> ContentArea {
    resolve_axes(
        measurement,
        original_width,
        original_height,
        scale_factor,
        scale_factor,
    )
}

/// [`resolve`] with separate horizontal and vertical factors, for
/// working copies whose axes were rounded independently.
#[must_use]
pub fn resolve_axes(
    measurement: BorderMeasurement,
    original_width: u32,
    original_height: u32,
    scale_x: f64,
    scale_y: f64,
) -> ContentArea {
    let sanitize = |s: f64| if s.is_finite() && s > 0.0 { s } else { 1.0 };
    let (scale_x, scale_y) = (sanitize(scale_x), sanitize(scale_y));
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let to_original = |margin: u32, scale: f64| (f64::from(margin) / scale).round() as u32;

    let x = to_original(measurement.left, scale_x);
    let y = to_original(measurement.top, scale_y);
    let right = to_original(measurement.right, scale_x);
    let bottom = to_original(measurement.bottom, scale_y);

    let width = original_width.saturating_sub(x).saturating_sub(right).max(1);
    let height = original_height.saturating_sub(y).saturating_sub(bottom).max(1);

    ContentArea {
        x,
        y,
        width,
        height,
    }
    .clamped_to(Dimensions::new(original_width, original_height))
}

/// Detect borders on `buffer` and resolve them at scale 1.
#[must_use]
pub fn detect_content_area(buffer: &PixelBuffer, threshold: f64) -> ContentArea {
    let measurement = border::detect(buffer, threshold);
    resolve(measurement, buffer.width(), buffer.height(), 1.0)
}

/// The wrapper object older clients send: detection results plus the
/// content area nested under `contentArea`.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct BorderPayload {
    content_area: ContentArea,
}

/// Parse a content area sent by a client.
///
/// Accepts either a bare `{x, y, width, height}` object (with `left` /
/// `top` accepted for `x` / `y`) or a wrapper object carrying it under
/// `contentArea`.
///
/// # Errors
///
/// Returns [`MalformedContentArea`] if neither form parses or the
/// rectangle is empty.
pub fn parse_content_area(payload: &str) -> Result<ContentArea, MalformedContentArea> {
    let area = match serde_json::from_str::<ContentArea>(payload) {
        Ok(area) => area,
        Err(bare_err) => match serde_json::from_str::<BorderPayload>(payload) {
            Ok(wrapper) => wrapper.content_area,
            Err(_) => return Err(bare_err.into()),
        },
    };
    if area.width == 0 {
        return Err(MalformedContentArea::Empty { axis: "width" });
    }
    if area.height == 0 {
        return Err(MalformedContentArea::Empty { axis: "height" });
    }
    Ok(area)
}

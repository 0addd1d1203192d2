//! Background border detection.
//!
//! Scans each edge of a [`PixelBuffer`] inward and counts the
//! consecutive rows (or columns) made entirely of background pixels.
//! The four edges are measured independently: a fully background image
//! reports the whole dimension on every edge, and it is up to
//! [`crate::content_area::resolve`] to turn that into a non-empty
//! rectangle.

use crate::types::{BorderMeasurement, PixelBuffer, brightness};

/// Brightness threshold used by the fast interactive preview.
pub const PREVIEW_THRESHOLD: f64 = 220.0;

/// Brightness threshold used by the full-resolution pass that drives
/// the authoritative crop. Only near-white pixels count as background.
pub const PRECISE_THRESHOLD: f64 = 240.0;

/// Measure the background margin on each edge.
///
/// A row or column is background when every pixel in it has a
/// brightness (mean of R, G, B) of at least `threshold`.
#[must_use]
pub fn detect(buffer: &PixelBuffer, threshold: f64) -> BorderMeasurement {
    detect_by(buffer, |pixel| brightness(pixel) >= threshold)
}

/// Measure the background margin on each edge using an arbitrary
/// per-pixel background predicate.
#[must_use]
pub fn detect_by<F>(buffer: &PixelBuffer, is_background: F) -> BorderMeasurement
where
    F: Fn([u8; 4]) -> bool,
{
    let (width, height) = (buffer.width(), buffer.height());
    let row_is_background = |y: u32| (0..width).all(|x| is_background(buffer.pixel(x, y)));
    let column_is_background = |x: u32| (0..height).all(|y| is_background(buffer.pixel(x, y)));

    BorderMeasurement {
        top: leading_run(0..height, row_is_background),
        bottom: leading_run((0..height).rev(), row_is_background),
        left: leading_run(0..width, column_is_background),
        right: leading_run((0..width).rev(), column_is_background),
    }
}

/// Count how many items from the front of `lines` satisfy `is_background`
/// before the first one that does not.
fn leading_run<I, F>(lines: I, is_background: F) -> u32
where
    I: Iterator<Item = u32>,
    F: Fn(u32) -> bool,
{
    let mut count = 0;
    for line in lines {
        if !is_background(line) {
            break;
        }
        count += 1;
    }
    count
}

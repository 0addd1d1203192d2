//! Reduction to a preview working resolution.
//!
//! Live previews and the fast border pass run on a reduced copy so the
//! longest axis is at most `max_dimension`. Each axis is rounded to
//! whole pixels independently, so the copy records one scale factor per
//! axis (reduced / original). [`Downsampled::resolve`] uses them to map
//! margins measured on the copy back to original pixels.
//!
//! Images already at or below the target are returned unchanged with
//! both factors at `1.0`.

use image::DynamicImage;
use image::imageops::FilterType;

use crate::content_area;
use crate::types::{BorderMeasurement, ContentArea, Dimensions, PixelBuffer};

/// Bilinear resampling for working copies.
pub const FILTER: FilterType = FilterType::Triangle;

/// A reduced working copy.
#[derive(Debug, Clone)]
pub struct Downsampled {
    /// RGBA8 pixels at working resolution.
    pub buffer: PixelBuffer,
    /// Working width divided by original width.
    pub scale_x: f64,
    /// Working height divided by original height.
    pub scale_y: f64,
}

impl Downsampled {
    /// Map margins measured on the working copy to a content area in
    /// `original` pixels.
    #[must_use]
    pub fn resolve(&self, measurement: BorderMeasurement, original: Dimensions) -> ContentArea {
        content_area::resolve_axes(
            measurement,
            original.width,
            original.height,
            self.scale_x,
            self.scale_y,
        )
    }
}

/// Reduce `image` so its longest axis is at most `max_dimension`.
#[must_use]
pub fn downsample(image: &DynamicImage, max_dimension: u32) -> Downsampled {
    let (w, h) = (image.width(), image.height());
    if w.max(h) <= max_dimension || max_dimension == 0 {
        return Downsampled {
            buffer: PixelBuffer::from(image.to_rgba8()),
            scale_x: 1.0,
            scale_y: 1.0,
        };
    }

    let resized = image.resize(max_dimension, max_dimension, FILTER);
    Downsampled {
        scale_x: f64::from(resized.width()) / f64::from(w.max(1)),
        scale_y: f64::from(resized.height()) / f64::from(h.max(1)),
        buffer: PixelBuffer::from(resized.to_rgba8()),
    }
}

//! Bitmap-to-vector tracing.
//!
//! [`Tracer`] turns an encoded bitmap plus [`TraceParams`] into raw SVG
//! markup. [`VtracerTracer`] implements it with `vtracer`: the bitmap is
//! first thresholded to pure black and white, then traced in binary
//! mode, so `threshold` has the same meaning it has for a potrace-style
//! tracer. The curve parameters are mapped onto vtracer's corner and
//! segment-length knobs.

use std::fmt;

use image::{Rgba, RgbaImage};
use visioncortex::PathSimplifyMode;
use vtracer::{ColorImage, ColorMode, Config, Hierarchical};

use vexel_pipeline::Quality;

/// How ambiguous turns are resolved while decomposing a bitmap into
/// paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnPolicy {
    /// Prefer the color that occurs less often in the neighborhood.
    Minority,
    /// Prefer the color that occurs more often in the neighborhood.
    Majority,
    /// Always turn towards black.
    Black,
    /// Always turn towards white.
    White,
}

impl fmt::Display for TurnPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Minority => "minority",
            Self::Majority => "majority",
            Self::Black => "black",
            Self::White => "white",
        })
    }
}

/// Tracer parameters for one quality tier.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TraceParams {
    /// Pixels with luma below this are foreground.
    pub threshold: u8,
    /// Curve optimization tolerance.
    pub opt_tolerance: f64,
    /// Corner threshold; larger values give smoother curves.
    pub alpha_max: f64,
    /// Ambiguous turn resolution.
    pub turn_policy: TurnPolicy,
    /// Join adjacent segments into curves.
    pub opt_curve: bool,
}

impl TraceParams {
    /// Lower threshold and tighter curve fitting.
    pub const HIGH: Self = Self {
        threshold: 128,
        opt_tolerance: 0.2,
        alpha_max: 1.0,
        turn_policy: TurnPolicy::Minority,
        opt_curve: true,
    };

    /// Looser parameters for typical documents.
    pub const STANDARD: Self = Self {
        threshold: 160,
        opt_tolerance: 0.4,
        alpha_max: 1.3,
        turn_policy: TurnPolicy::Minority,
        opt_curve: true,
    };

    /// Parameters for a quality tier.
    #[must_use]
    pub const fn for_quality(quality: Quality) -> Self {
        match quality {
            Quality::High => Self::HIGH,
            Quality::Standard => Self::STANDARD,
        }
    }
}

/// Errors raised by a [`Tracer`].
#[derive(Debug, thiserror::Error)]
pub enum TraceError {
    /// The bitmap handed to the tracer could not be read.
    #[error("tracer could not read bitmap: {0}")]
    Bitmap(#[from] image::ImageError),

    /// The tracing engine failed.
    #[error("tracing failed: {0}")]
    Engine(String),
}

/// Converts an encoded bitmap into raw SVG markup.
pub trait Tracer: Send + Sync {
    /// Trace `bitmap` (any format the implementation can decode).
    ///
    /// # Errors
    ///
    /// Returns [`TraceError`] if the bitmap cannot be read or tracing
    /// fails.
    fn trace(&self, bitmap: &[u8], params: &TraceParams) -> Result<String, TraceError>;
}

/// [`Tracer`] backed by `vtracer` in binary mode.
#[derive(Debug, Clone, Copy)]
pub struct VtracerTracer {
    /// Patches smaller than this many pixels are discarded.
    pub filter_speckle: usize,
    /// Decimal places in emitted path data.
    pub path_precision: u32,
}

impl Default for VtracerTracer {
    fn default() -> Self {
        Self {
            filter_speckle: 4,
            path_precision: 2,
        }
    }
}

impl VtracerTracer {
    /// vtracer configuration for `params`.
    #[must_use]
    pub fn config(&self, params: &TraceParams) -> Config {
        #[allow(clippy::cast_possible_truncation)]
        let corner_threshold = (60.0 * params.alpha_max).round() as i32;
        Config {
            color_mode: ColorMode::Binary,
            hierarchical: Hierarchical::Stacked,
            mode: if params.opt_curve {
                PathSimplifyMode::Spline
            } else {
                PathSimplifyMode::Polygon
            },
            filter_speckle: self.filter_speckle,
            color_precision: 6,
            layer_difference: 16,
            corner_threshold,
            length_threshold: params.opt_tolerance.mul_add(5.0, 3.5),
            max_iterations: 10,
            splice_threshold: 45,
            path_precision: Some(self.path_precision),
        }
    }
}

impl Tracer for VtracerTracer {
    fn trace(&self, bitmap: &[u8], params: &TraceParams) -> Result<String, TraceError> {
        let image = image::load_from_memory(bitmap)?.to_rgba8();
        let binary = binarize(&image, params.threshold);
        let (width, height) = (binary.width() as usize, binary.height() as usize);
        let color_image = ColorImage {
            pixels: binary.into_raw(),
            width,
            height,
        };
        let svg = vtracer::convert(color_image, self.config(params)).map_err(TraceError::Engine)?;
        Ok(svg.to_string())
    }
}

/// Map every pixel to opaque black (luma below `threshold`) or white.
fn binarize(image: &RgbaImage, threshold: u8) -> RgbaImage {
    RgbaImage::from_fn(image.width(), image.height(), |x, y| {
        let Rgba([r, g, b, _]) = *image.get_pixel(x, y);
        let luma = (2126 * u32::from(r) + 7152 * u32::from(g) + 722 * u32::from(b)) / 10_000;
        if luma < u32::from(threshold) {
            Rgba([0, 0, 0, 255])
        } else {
            Rgba([255, 255, 255, 255])
        }
    })
}

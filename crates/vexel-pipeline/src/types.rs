//! Shared types for the vexel conversion pipeline.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Re-export `RgbaImage` so downstream crates can build pixel buffers
/// without depending on `image` directly.
pub use image::RgbaImage;

/// Image dimensions in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimensions {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl Dimensions {
    /// Create a new dimensions value.
    #[must_use]
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Length of the longer axis.
    #[must_use]
    pub const fn longer_edge(self) -> u32 {
        if self.width >= self.height {
            self.width
        } else {
            self.height
        }
    }

    /// Scale both axes so the longer edge equals `target`, preserving
    /// the aspect ratio. Enlarges when the image is smaller than the
    /// target. Neither axis drops below 1 pixel.
    #[must_use]
    pub fn fit_longer_edge(self, target: u32) -> Self {
        let longer = self.longer_edge().max(1);
        let scale = f64::from(target) / f64::from(longer);
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let scaled = |v: u32| ((f64::from(v) * scale).round() as u32).max(1);
        Self {
            width: scaled(self.width),
            height: scaled(self.height),
        }
    }
}

impl fmt::Display for Dimensions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Read-only view over decoded RGBA8 pixel data.
///
/// Samples are row-major with a top-left origin, four channels
/// (red, green, blue, alpha) per pixel. Detection code never mutates
/// the buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixelBuffer {
    width: u32,
    height: u32,
    samples: Vec<u8>,
}

impl PixelBuffer {
    /// Wrap raw RGBA samples.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidBuffer`] if the sample count does
    /// not equal `width * height * 4`.
    pub fn from_rgba(width: u32, height: u32, samples: Vec<u8>) -> Result<Self, PipelineError> {
        let expected = u64::from(width) * u64::from(height) * 4;
        if samples.len() as u64 != expected {
            return Err(PipelineError::InvalidBuffer {
                expected,
                actual: samples.len(),
            });
        }
        Ok(Self {
            width,
            height,
            samples,
        })
    }

    /// Buffer width in pixels.
    #[must_use]
    pub const fn width(&self) -> u32 {
        self.width
    }

    /// Buffer height in pixels.
    #[must_use]
    pub const fn height(&self) -> u32 {
        self.height
    }

    /// Buffer dimensions.
    #[must_use]
    pub const fn dimensions(&self) -> Dimensions {
        Dimensions::new(self.width, self.height)
    }

    /// The raw RGBA samples.
    #[must_use]
    pub fn samples(&self) -> &[u8] {
        &self.samples
    }

    /// RGBA channels of the pixel at `(x, y)`.
    ///
    /// Callers must stay within `width` x `height`.
    #[must_use]
    pub fn pixel(&self, x: u32, y: u32) -> [u8; 4] {
        let idx = (y as usize * self.width as usize + x as usize) * 4;
        [
            self.samples[idx],
            self.samples[idx + 1],
            self.samples[idx + 2],
            self.samples[idx + 3],
        ]
    }

    /// Mean of the red, green, and blue channels at `(x, y)`. Alpha is
    /// ignored.
    #[must_use]
    pub fn brightness(&self, x: u32, y: u32) -> f64 {
        brightness(self.pixel(x, y))
    }
}

impl From<RgbaImage> for PixelBuffer {
    fn from(image: RgbaImage) -> Self {
        let (width, height) = image.dimensions();
        Self {
            width,
            height,
            samples: image.into_raw(),
        }
    }
}

/// Arithmetic mean of the RGB channels of an RGBA pixel.
#[must_use]
pub fn brightness(pixel: [u8; 4]) -> f64 {
    (f64::from(pixel[0]) + f64::from(pixel[1]) + f64::from(pixel[2])) / 3.0
}

/// Thickness of the background margin on each edge, in pixels.
///
/// These are counts, not coordinates: `bottom = 3` means the three
/// bottom-most rows are background.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BorderMeasurement {
    /// Background rows at the top edge.
    pub top: u32,
    /// Background rows at the bottom edge.
    pub bottom: u32,
    /// Background columns at the left edge.
    pub left: u32,
    /// Background columns at the right edge.
    pub right: u32,
}

impl BorderMeasurement {
    /// Returns `true` when no edge has any background margin.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.top == 0 && self.bottom == 0 && self.left == 0 && self.right == 0
    }

    /// Returns `true` when the margins consume the whole image on
    /// either axis (the all-background case).
    #[must_use]
    pub const fn covers_everything(&self, dimensions: Dimensions) -> bool {
        self.top >= dimensions.height || self.left >= dimensions.width
    }
}

/// Axis-aligned rectangle in original-image pixel coordinates.
///
/// Always non-empty: `width` and `height` are at least 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentArea {
    /// Left edge.
    #[serde(alias = "left")]
    pub x: u32,
    /// Top edge.
    #[serde(alias = "top")]
    pub y: u32,
    /// Width, at least 1.
    pub width: u32,
    /// Height, at least 1.
    pub height: u32,
}

impl ContentArea {
    /// The rectangle covering a whole image.
    #[must_use]
    pub const fn full(dimensions: Dimensions) -> Self {
        Self {
            x: 0,
            y: 0,
            width: if dimensions.width == 0 { 1 } else { dimensions.width },
            height: if dimensions.height == 0 {
                1
            } else {
                dimensions.height
            },
        }
    }

    /// Clamp the rectangle so it lies inside `dimensions` and keeps at
    /// least one pixel on each axis.
    #[must_use]
    pub fn clamped_to(self, dimensions: Dimensions) -> Self {
        let max_x = dimensions.width.saturating_sub(1);
        let max_y = dimensions.height.saturating_sub(1);
        let x = self.x.min(max_x);
        let y = self.y.min(max_y);
        let width = self.width.min(dimensions.width.saturating_sub(x)).max(1);
        let height = self.height.min(dimensions.height.saturating_sub(y)).max(1);
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Exclusive right edge.
    #[must_use]
    pub const fn right(&self) -> u32 {
        self.x + self.width
    }

    /// Exclusive bottom edge.
    #[must_use]
    pub const fn bottom(&self) -> u32 {
        self.y + self.height
    }

    /// Returns `true` if the pixel `(x, y)` lies inside the rectangle.
    #[must_use]
    pub const fn contains(&self, x: u32, y: u32) -> bool {
        x >= self.x && x < self.right() && y >= self.y && y < self.bottom()
    }
}

/// Longer-edge target for the optional resize stage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetSize {
    /// Keep the source resolution.
    #[default]
    Auto,
    /// 128 px longer edge.
    Small,
    /// 256 px longer edge.
    Medium,
    /// 512 px longer edge.
    Large,
}

impl TargetSize {
    /// Longer-edge pixel target, or `None` for [`TargetSize::Auto`].
    #[must_use]
    pub const fn longer_edge(self) -> Option<u32> {
        match self {
            Self::Auto => None,
            Self::Small => Some(128),
            Self::Medium => Some(256),
            Self::Large => Some(512),
        }
    }
}

impl FromStr for TargetSize {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" | "" => Ok(Self::Auto),
            "small" => Ok(Self::Small),
            "medium" => Ok(Self::Medium),
            "large" => Ok(Self::Large),
            other => Err(PipelineError::InvalidOption(format!(
                "unknown size {other:?} (expected auto, small, medium, or large)"
            ))),
        }
    }
}

impl fmt::Display for TargetSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Auto => "auto",
            Self::Small => "small",
            Self::Medium => "medium",
            Self::Large => "large",
        })
    }
}

/// Tracing quality tier.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Quality {
    /// Looser parameters tuned for speed and typical documents.
    #[default]
    Standard,
    /// Lower threshold and tighter curve fitting.
    High,
}

impl FromStr for Quality {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "standard" | "" => Ok(Self::Standard),
            "high" => Ok(Self::High),
            other => Err(PipelineError::InvalidOption(format!(
                "unknown quality {other:?} (expected standard or high)"
            ))),
        }
    }
}

impl fmt::Display for Quality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Standard => "standard",
            Self::High => "high",
        })
    }
}

/// A CSS color token safe to substitute into an SVG attribute value.
///
/// Accepts anything a browser might accept as a color (`#ff0000`,
/// `red`, `rgb(255, 0, 0)`) but rejects characters that could break
/// out of a quoted attribute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SvgColor(String);

impl SvgColor {
    /// The color the tracer emits when no color is requested.
    pub const DEFAULT: &'static str = "#000000";

    /// Validate and wrap a color token.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidOption`] for an empty token or
    /// one containing quotes, angle brackets, or `&`.
    pub fn parse(value: &str) -> Result<Self, PipelineError> {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err(PipelineError::InvalidOption("color is empty".into()));
        }
        if trimmed
            .chars()
            .any(|c| matches!(c, '"' | '\'' | '<' | '>' | '&') || c.is_control())
        {
            return Err(PipelineError::InvalidOption(format!(
                "color {trimmed:?} contains characters not allowed in an attribute"
            )));
        }
        Ok(Self(trimmed.to_owned()))
    }

    /// The color as written.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns `true` if this is the tracer's default black.
    #[must_use]
    pub fn is_default(&self) -> bool {
        self.0.eq_ignore_ascii_case(Self::DEFAULT)
            || self.0.eq_ignore_ascii_case("#000")
            || self.0.eq_ignore_ascii_case("black")
    }
}

impl TryFrom<String> for SvgColor {
    type Error = PipelineError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<SvgColor> for String {
    fn from(color: SvgColor) -> Self {
        color.0
    }
}

impl fmt::Display for SvgColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Per-request conversion settings.
///
/// Defaults: no border removal, black, `auto` size, `standard` quality.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConversionOptions {
    /// Crop away the detected background margin before tracing.
    pub remove_border: bool,
    /// Requested fill/stroke color; `None` keeps the tracer's black.
    pub color: Option<SvgColor>,
    /// Optional resize tier.
    pub target_size: TargetSize,
    /// Tracing quality tier.
    pub quality: Quality,
}

impl ConversionOptions {
    /// Build options from the string form fields used on the wire.
    ///
    /// Missing fields take their documented defaults. `remove_border`
    /// is `true` only for the literal `"true"` (case-insensitive).
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidOption`] for an unknown size or
    /// quality value or an unsafe color token.
    pub fn from_fields(
        remove_border: Option<&str>,
        color: Option<&str>,
        size: Option<&str>,
        quality: Option<&str>,
    ) -> Result<Self, PipelineError> {
        let color = match color.map(str::trim) {
            None | Some("") => None,
            Some(value) => Some(SvgColor::parse(value)?),
        };
        Ok(Self {
            remove_border: remove_border.is_some_and(|v| v.trim().eq_ignore_ascii_case("true")),
            color,
            target_size: size.map_or(Ok(TargetSize::Auto), str::parse)?,
            quality: quality.map_or(Ok(Quality::Standard), str::parse)?,
        })
    }

    /// The color to substitute into the document, if recoloring was
    /// requested. The tracer's default black does not count.
    #[must_use]
    pub fn recolor_target(&self) -> Option<&SvgColor> {
        self.color.as_ref().filter(|c| !c.is_default())
    }

    /// The color to draw with: the requested one or black.
    #[must_use]
    pub fn fill_color(&self) -> &str {
        self.color.as_ref().map_or(SvgColor::DEFAULT, SvgColor::as_str)
    }
}

/// Errors that can occur in the pure pipeline stages.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// Failed to decode the input image.
    #[error("failed to decode image: {0}")]
    ImageDecode(#[from] image::ImageError),

    /// The input image bytes were empty.
    #[error("input image data is empty")]
    EmptyInput,

    /// A pixel buffer's sample count did not match its dimensions.
    #[error("pixel buffer has {actual} samples, expected {expected}")]
    InvalidBuffer {
        /// Expected `width * height * 4`.
        expected: u64,
        /// Actual sample count.
        actual: usize,
    },

    /// A conversion option could not be parsed.
    #[error("invalid option: {0}")]
    InvalidOption(String),
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    // --- Dimensions ---

    #[test]
    fn fit_longer_edge_landscape_shrinks() {
        let fitted = Dimensions::new(1000, 800).fit_longer_edge(128);
        assert_eq!(fitted, Dimensions::new(128, 102));
    }

    #[test]
    fn fit_longer_edge_portrait_shrinks() {
        let fitted = Dimensions::new(800, 1000).fit_longer_edge(128);
        assert_eq!(fitted, Dimensions::new(102, 128));
    }

    #[test]
    fn fit_longer_edge_enlarges_small_images() {
        let fitted = Dimensions::new(64, 32).fit_longer_edge(512);
        assert_eq!(fitted, Dimensions::new(512, 256));
    }

    #[test]
    fn fit_longer_edge_never_reaches_zero() {
        let fitted = Dimensions::new(10_000, 1).fit_longer_edge(128);
        assert_eq!(fitted, Dimensions::new(128, 1));
    }

    // --- PixelBuffer ---

    #[test]
    fn pixel_buffer_rejects_wrong_length() {
        let result = PixelBuffer::from_rgba(2, 2, vec![0; 15]);
        assert!(matches!(
            result,
            Err(PipelineError::InvalidBuffer {
                expected: 16,
                actual: 15
            })
        ));
    }

    #[test]
    fn brightness_ignores_alpha() {
        let buffer = PixelBuffer::from_rgba(1, 1, vec![30, 60, 90, 0]).unwrap();
        assert!((buffer.brightness(0, 0) - 60.0).abs() < f64::EPSILON);
    }

    #[test]
    fn from_rgba_image_keeps_layout() {
        let image = RgbaImage::from_fn(3, 2, |x, y| image::Rgba([x as u8, y as u8, 0, 255]));
        let buffer = PixelBuffer::from(image);
        assert_eq!(buffer.dimensions(), Dimensions::new(3, 2));
        assert_eq!(buffer.pixel(2, 1), [2, 1, 0, 255]);
    }

    // --- ContentArea ---

    #[test]
    fn clamp_pulls_rectangle_inside_image() {
        let area = ContentArea {
            x: 90,
            y: 5,
            width: 50,
            height: 500,
        };
        let clamped = area.clamped_to(Dimensions::new(100, 100));
        assert_eq!(
            clamped,
            ContentArea {
                x: 90,
                y: 5,
                width: 10,
                height: 95
            }
        );
    }

    #[test]
    fn clamp_keeps_one_pixel_when_origin_is_out_of_bounds() {
        let area = ContentArea {
            x: 400,
            y: 400,
            width: 10,
            height: 10,
        };
        let clamped = area.clamped_to(Dimensions::new(100, 50));
        assert_eq!(
            clamped,
            ContentArea {
                x: 99,
                y: 49,
                width: 1,
                height: 1
            }
        );
    }

    #[test]
    fn content_area_accepts_left_top_aliases() {
        let area: ContentArea =
            serde_json::from_str(r#"{"left":4,"top":5,"width":6,"height":7}"#).unwrap();
        assert_eq!(
            area,
            ContentArea {
                x: 4,
                y: 5,
                width: 6,
                height: 7
            }
        );
    }

    // --- Options ---

    #[test]
    fn options_defaults_when_fields_missing() {
        let options = ConversionOptions::from_fields(None, None, None, None).unwrap();
        assert_eq!(options, ConversionOptions::default());
        assert_eq!(options.fill_color(), "#000000");
    }

    #[test]
    fn options_parse_wire_strings() {
        let options = ConversionOptions::from_fields(
            Some("true"),
            Some("#ff0000"),
            Some("small"),
            Some("high"),
        )
        .unwrap();
        assert!(options.remove_border);
        assert_eq!(options.color.as_ref().map(SvgColor::as_str), Some("#ff0000"));
        assert_eq!(options.target_size, TargetSize::Small);
        assert_eq!(options.quality, Quality::High);
    }

    #[test]
    fn options_reject_unknown_size() {
        let result = ConversionOptions::from_fields(None, None, Some("huge"), None);
        assert!(matches!(result, Err(PipelineError::InvalidOption(_))));
    }

    #[test]
    fn remove_border_only_for_literal_true() {
        let options = ConversionOptions::from_fields(Some("yes"), None, None, None).unwrap();
        assert!(!options.remove_border);
    }

    #[test]
    fn default_black_is_not_a_recolor() {
        let options =
            ConversionOptions::from_fields(None, Some("#000000"), None, None).unwrap();
        assert!(options.recolor_target().is_none());
    }

    #[test]
    fn color_rejects_attribute_breakout() {
        assert!(SvgColor::parse(r#"red" onload="x"#).is_err());
        assert!(SvgColor::parse("   ").is_err());
        assert!(SvgColor::parse("rgb(1, 2, 3)").is_ok());
    }

    #[test]
    fn target_size_edges_match_tiers() {
        assert_eq!(TargetSize::Auto.longer_edge(), None);
        assert_eq!(TargetSize::Small.longer_edge(), Some(128));
        assert_eq!(TargetSize::Medium.longer_edge(), Some(256));
        assert_eq!(TargetSize::Large.longer_edge(), Some(512));
    }

    #[test]
    fn error_invalid_option_display() {
        let err = PipelineError::InvalidOption("bad".to_string());
        assert_eq!(err.to_string(), "invalid option: bad");
    }
}

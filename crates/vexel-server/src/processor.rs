//! Raster operations ahead of tracing.
//!
//! [`ImageProcessor`] is the seam between the orchestrator and the
//! raster library. [`ImageCrateProcessor`] implements it with the
//! `image` and `imageproc` crates.

use image::codecs::png::{CompressionType, FilterType as PngFilter, PngEncoder};
use image::imageops::FilterType;
use image::{DynamicImage, ImageEncoder, Rgba, RgbaImage};

use vexel_pipeline::border;
use vexel_pipeline::content_area;
use vexel_pipeline::decode::{self, DecodedImage};
use vexel_pipeline::{ContentArea, Dimensions, PipelineError, PixelBuffer};

/// Per-channel distance from white still treated as background by
/// [`ImageProcessor::trim`].
pub const TRIM_TOLERANCE: u8 = 10;

/// Brightness multiplier applied by [`ImageProcessor::enhance`].
pub const BRIGHTNESS: f32 = 1.1;

/// Saturation multiplier applied by [`ImageProcessor::enhance`].
pub const SATURATION: f32 = 1.2;

/// Fraction of darkest / brightest pixels ignored when stretching
/// levels.
const NORMALIZE_CLIP: f64 = 0.01;

/// Errors raised by an [`ImageProcessor`].
#[derive(Debug, thiserror::Error)]
pub enum ProcessorError {
    /// The upload is not a decodable image.
    #[error(transparent)]
    Decode(#[from] PipelineError),

    /// The processed image could not be encoded.
    #[error("failed to encode PNG: {0}")]
    Encode(#[source] image::ImageError),
}

/// Raster operations used by the conversion pipeline.
///
/// Implementations must be pure with respect to their inputs; the
/// orchestrator calls them from blocking worker threads.
pub trait ImageProcessor: Send + Sync {
    /// Decode an upload and detect its container format.
    ///
    /// # Errors
    ///
    /// Returns [`ProcessorError::Decode`] for empty or unreadable input.
    fn decode(&self, bytes: &[u8]) -> Result<DecodedImage, ProcessorError>;

    /// Crop away a near-white margin. Images that are entirely
    /// background are returned unchanged.
    fn trim(&self, image: DynamicImage) -> DynamicImage;

    /// Crop to `area`, clamped to the image bounds.
    fn crop(&self, image: DynamicImage, area: ContentArea) -> DynamicImage;

    /// Scale so the longer edge equals `longer_edge`, preserving aspect
    /// ratio and enlarging smaller images.
    fn resize(&self, image: DynamicImage, longer_edge: u32) -> DynamicImage;

    /// Flatten onto white, stretch levels, then raise brightness and
    /// saturation.
    fn enhance(&self, image: DynamicImage) -> DynamicImage;

    /// Encode as PNG with minimal compression.
    ///
    /// # Errors
    ///
    /// Returns [`ProcessorError::Encode`] if encoding fails.
    fn encode_png(&self, image: &DynamicImage) -> Result<Vec<u8>, ProcessorError>;
}

/// [`ImageProcessor`] backed by the `image` crate.
#[derive(Debug, Clone, Copy, Default)]
pub struct ImageCrateProcessor;

impl ImageProcessor for ImageCrateProcessor {
    fn decode(&self, bytes: &[u8]) -> Result<DecodedImage, ProcessorError> {
        Ok(decode::decode(bytes)?)
    }

    fn trim(&self, image: DynamicImage) -> DynamicImage {
        let buffer = PixelBuffer::from(image.to_rgba8());
        let measurement = border::detect_by(&buffer, |p| {
            p[..3].iter().all(|&c| u8::MAX - c <= TRIM_TOLERANCE)
        });
        if measurement.is_empty() || measurement.covers_everything(buffer.dimensions()) {
            return image;
        }
        let area = content_area::resolve(measurement, buffer.width(), buffer.height(), 1.0);
        self.crop(image, area)
    }

    fn crop(&self, image: DynamicImage, area: ContentArea) -> DynamicImage {
        let area = area.clamped_to(Dimensions::new(image.width(), image.height()));
        image.crop_imm(area.x, area.y, area.width, area.height)
    }

    fn resize(&self, image: DynamicImage, longer_edge: u32) -> DynamicImage {
        let target = Dimensions::new(image.width(), image.height()).fit_longer_edge(longer_edge);
        image.resize_exact(target.width, target.height, FilterType::Lanczos3)
    }

    fn enhance(&self, image: DynamicImage) -> DynamicImage {
        let flat = flatten_onto_white(&image.to_rgba8());
        let (low, high) = luma_bounds(&flat);
        let enhanced = imageproc::map::map_pixels(&flat, |pixel: Rgba<u8>| {
            let Rgba([r, g, b, a]) = pixel;
            let [r, g, b] = [r, g, b].map(|c| stretch(c, low, high) * BRIGHTNESS);
            let gray = 0.2126 * r + 0.7152 * g + 0.0722 * b;
            let saturate = |c: f32| to_channel((c - gray).mul_add(SATURATION, gray));
            Rgba([saturate(r), saturate(g), saturate(b), a])
        });
        DynamicImage::ImageRgba8(enhanced)
    }

    fn encode_png(&self, image: &DynamicImage) -> Result<Vec<u8>, ProcessorError> {
        let rgba = image.to_rgba8();
        let mut buf = Vec::new();
        let encoder =
            PngEncoder::new_with_quality(&mut buf, CompressionType::Fast, PngFilter::NoFilter);
        encoder
            .write_image(
                rgba.as_raw(),
                rgba.width(),
                rgba.height(),
                image::ExtendedColorType::Rgba8,
            )
            .map_err(ProcessorError::Encode)?;
        Ok(buf)
    }
}

/// Composite every pixel over opaque white.
fn flatten_onto_white(image: &RgbaImage) -> RgbaImage {
    imageproc::map::map_pixels(image, |Rgba([r, g, b, a]): Rgba<u8>| {
        let alpha = f32::from(a) / 255.0;
        let over = |c: u8| to_channel(f32::from(c).mul_add(alpha, 255.0 * (1.0 - alpha)));
        Rgba([over(r), over(g), over(b), u8::MAX])
    })
}

/// Luma values at the `NORMALIZE_CLIP` and `1 - NORMALIZE_CLIP`
/// percentiles.
fn luma_bounds(image: &RgbaImage) -> (u8, u8) {
    let mut histogram = [0_u64; 256];
    for Rgba([r, g, b, _]) in image.pixels() {
        let luma = 0.2126f32.mul_add(
            f32::from(*r),
            0.7152f32.mul_add(f32::from(*g), 0.0722 * f32::from(*b)),
        );
        histogram[usize::from(to_channel(luma))] += 1;
    }
    let total = u64::from(image.width()) * u64::from(image.height());
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
    let clip = (total as f64 * NORMALIZE_CLIP) as u64;

    let mut seen = 0;
    let mut low = 0;
    for (value, count) in histogram.iter().enumerate() {
        seen += count;
        if seen > clip {
            low = value;
            break;
        }
    }
    let mut seen = 0;
    let mut high = 255;
    for (value, count) in histogram.iter().enumerate().rev() {
        seen += count;
        if seen > clip {
            high = value;
            break;
        }
    }
    (
        u8::try_from(low).unwrap_or(0),
        u8::try_from(high).unwrap_or(u8::MAX),
    )
}

/// Map `value` from `[low, high]` onto `[0, 255]`. A flat range leaves
/// the value unchanged.
fn stretch(value: u8, low: u8, high: u8) -> f32 {
    if high <= low {
        return f32::from(value);
    }
    let span = f32::from(high - low);
    ((f32::from(value) - f32::from(low)) * 255.0 / span).clamp(0.0, 255.0)
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn to_channel(value: f32) -> u8 {
    value.round().clamp(0.0, 255.0) as u8
}

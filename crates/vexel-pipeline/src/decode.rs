//! Image decoding.
//!
//! Accepts raw image bytes (PNG, JPEG, BMP, WebP) and produces a decoded
//! image together with the container format it was sniffed as. The
//! format name is reported back to clients in conversion metadata.

use image::{DynamicImage, ImageFormat};

use crate::types::{Dimensions, PipelineError, PixelBuffer};

/// A decoded image plus the format it was stored in.
#[derive(Debug, Clone)]
pub struct DecodedImage {
    /// Decoded pixels.
    pub image: DynamicImage,
    /// Container format detected from the magic bytes.
    pub format: ImageFormat,
}

impl DecodedImage {
    /// Pixel dimensions of the decoded image.
    #[must_use]
    pub fn dimensions(&self) -> Dimensions {
        Dimensions::new(self.image.width(), self.image.height())
    }

    /// Lowercase format name, e.g. `"png"` or `"jpeg"`.
    #[must_use]
    pub fn format_name(&self) -> &'static str {
        format_name(self.format)
    }

    /// Convert to an RGBA8 [`PixelBuffer`].
    #[must_use]
    pub fn to_pixel_buffer(&self) -> PixelBuffer {
        PixelBuffer::from(self.image.to_rgba8())
    }
}

/// Decode raw image bytes.
///
/// # Errors
///
/// Returns [`PipelineError::EmptyInput`] if `bytes` is empty.
/// Returns [`PipelineError::ImageDecode`] if the format is unrecognized
/// or the data is corrupt.
pub fn decode(bytes: &[u8]) -> Result<DecodedImage, PipelineError> {
    if bytes.is_empty() {
        return Err(PipelineError::EmptyInput);
    }
    let format = image::guess_format(bytes)?;
    let image = image::load_from_memory_with_format(bytes, format)?;
    Ok(DecodedImage { image, format })
}

/// Lowercase name for an image format.
#[must_use]
pub fn format_name(format: ImageFormat) -> &'static str {
    format.extensions_str().first().copied().map_or("unknown", |ext| match ext {
        "jpg" => "jpeg",
        other => other,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = image::RgbaImage::from_fn(width, height, |x, _| {
            if x % 2 == 0 {
                image::Rgba([255, 255, 255, 255])
            } else {
                image::Rgba([0, 0, 0, 255])
            }
        });
        let mut buf = Vec::new();
        let encoder = image::codecs::png::PngEncoder::new(&mut buf);
        image::ImageEncoder::write_image(
            encoder,
            img.as_raw(),
            img.width(),
            img.height(),
            image::ExtendedColorType::Rgba8,
        )
        .unwrap();
        buf
    }

    #[test]
    fn empty_input_returns_error() {
        assert!(matches!(decode(&[]), Err(PipelineError::EmptyInput)));
    }

    #[test]
    fn corrupt_bytes_returns_image_decode_error() {
        let result = decode(&[0xFF, 0xFE, 0x00, 0x01]);
        assert!(matches!(result, Err(PipelineError::ImageDecode(_))));
    }

    #[test]
    fn png_is_decoded_with_format() {
        let decoded = decode(&png_bytes(17, 31)).unwrap();
        assert_eq!(decoded.format, ImageFormat::Png);
        assert_eq!(decoded.format_name(), "png");
        assert_eq!(decoded.dimensions(), Dimensions::new(17, 31));
    }

    #[test]
    fn pixel_buffer_keeps_pixels() {
        let buffer = decode(&png_bytes(4, 2)).unwrap().to_pixel_buffer();
        assert_eq!(buffer.pixel(0, 0), [255, 255, 255, 255]);
        assert_eq!(buffer.pixel(1, 1), [0, 0, 0, 255]);
    }

    #[test]
    fn jpeg_name_is_normalized() {
        assert_eq!(format_name(ImageFormat::Jpeg), "jpeg");
        assert_eq!(format_name(ImageFormat::WebP), "webp");
    }
}

//! vexel-pipeline: Pure raster-to-SVG building blocks (sans-IO).
//!
//! Provides the pieces shared by the conversion service and the live
//! preview:
//!
//! - border detection and content-area resolution
//! - coarse grid sampling for instant previews, with cooperative
//!   cancellation
//! - canonicalization and validation of traced SVG markup
//!
//! This crate has **no I/O dependencies** -- it operates on in-memory
//! byte slices and returns structured data. HTTP lives in
//! `vexel-server`, browser interaction in `vexel-worker`.

pub mod border;
pub mod cancel;
pub mod canonicalize;
pub mod content_area;
pub mod decode;
pub mod diagnostics;
pub mod downsample;
pub mod preview;
pub mod types;

use std::time::Duration;

pub use cancel::{CancellationToken, Cancelled, RunGate, RunTicket};
pub use canonicalize::{InvalidSvgError, SvgDocument, canonicalize};
pub use content_area::MalformedContentArea;
pub use diagnostics::{Clock, PreviewDiagnostics, WebClock};
pub use preview::{PreviewFrame, PreviewJob, PreviewSettings};
pub use types::{
    BorderMeasurement, ContentArea, ConversionOptions, Dimensions, PipelineError, PixelBuffer,
    Quality, SvgColor, TargetSize,
};

/// Why a staged preview produced no frame.
#[derive(Debug, thiserror::Error)]
pub enum PreviewError {
    /// The input could not be decoded.
    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    /// The run was superseded.
    #[error(transparent)]
    Cancelled(#[from] Cancelled),
}

/// A preview frame plus what it took to produce it.
#[derive(Debug, Clone)]
pub struct StagedPreview {
    /// The sampled frame, in working-resolution coordinates.
    pub frame: PreviewFrame,
    /// Per-stage timing and counts.
    pub diagnostics: PreviewDiagnostics,
}

/// An upload decoded, reduced, and (when border removal is on)
/// border-detected, ready to be sampled.
///
/// Both [`preview_staged`] and the web worker build one of these and
/// then drive a [`PreviewJob`](preview::PreviewJob) over it; the worker
/// yields between chunks, `preview_staged` does not.
#[derive(Debug)]
pub struct PreviewStage {
    /// The working copy.
    pub working: PixelBuffer,
    /// Content area in working pixels.
    pub working_area: Option<ContentArea>,
    original: Dimensions,
    original_area: Option<ContentArea>,
    input_bytes: usize,
    decode: Duration,
    downsample: Duration,
    detect: Option<Duration>,
}

impl PreviewStage {
    /// Decode `image_bytes`, reduce to `settings.max_dimension`, and
    /// detect the content area at [`border::PREVIEW_THRESHOLD`] when
    /// `options.remove_border` is set.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError`] if the bytes cannot be decoded.
    pub fn prepare<C: Clock>(
        image_bytes: &[u8],
        options: &ConversionOptions,
        settings: PreviewSettings,
        clock: &C,
    ) -> Result<Self, PipelineError> {
        let t = clock.now();
        let decoded = decode::decode(image_bytes)?;
        let original = decoded.dimensions();
        let decode_duration = clock.elapsed(&t);

        let t = clock.now();
        let working = downsample::downsample(&decoded.image, settings.max_dimension);
        drop(decoded);
        let downsample_duration = clock.elapsed(&t);

        let (working_area, original_area, detect) = if options.remove_border {
            let t = clock.now();
            let measurement = border::detect(&working.buffer, border::PREVIEW_THRESHOLD);
            let dims = working.buffer.dimensions();
            let working_area = content_area::resolve(measurement, dims.width, dims.height, 1.0);
            let original_area = working.resolve(measurement, original);
            (Some(working_area), Some(original_area), Some(clock.elapsed(&t)))
        } else {
            (None, None, None)
        };

        Ok(Self {
            working: working.buffer,
            working_area,
            original,
            original_area,
            input_bytes: image_bytes.len(),
            decode: decode_duration,
            downsample: downsample_duration,
            detect,
        })
    }

    /// Content area in original pixels, for conversion requests.
    #[must_use]
    pub const fn content_area(&self) -> Option<ContentArea> {
        self.original_area
    }

    /// A sampler over the working copy.
    #[must_use]
    pub fn job(&self, options: &ConversionOptions, settings: PreviewSettings) -> PreviewJob<'_> {
        PreviewJob::new(&self.working, self.working_area, options, settings)
    }

    /// Diagnostics for a finished run over this stage.
    #[must_use]
    pub fn diagnostics(
        &self,
        frame: &PreviewFrame,
        sample: Duration,
        total: Duration,
    ) -> PreviewDiagnostics {
        PreviewDiagnostics {
            decode: self.decode,
            downsample: self.downsample,
            detect: self.detect,
            sample,
            total,
            summary: diagnostics::PreviewSummary {
                input_bytes: self.input_bytes,
                original: self.original,
                working: self.working.dimensions(),
                content_area: self.original_area,
                cell_count: frame.cells.len(),
                overlay_count: frame.overlays.len(),
            },
        }
    }
}

/// Decode `image_bytes` and sample a live preview.
///
/// Runs [`PreviewStage::prepare`] and then samples the grid in
/// cancellable chunks. The content-area estimate in the diagnostics is
/// in original pixels.
///
/// # Errors
///
/// Returns [`PreviewError::Pipeline`] if the bytes cannot be decoded
/// and [`PreviewError::Cancelled`] if `token` is cancelled.
pub fn preview_staged<C: Clock>(
    image_bytes: &[u8],
    options: &ConversionOptions,
    settings: PreviewSettings,
    token: &CancellationToken,
    clock: &C,
) -> Result<StagedPreview, PreviewError> {
    let start = clock.now();
    let stage = PreviewStage::prepare(image_bytes, options, settings, clock)?;
    if token.is_cancelled() {
        return Err(Cancelled.into());
    }

    let t = clock.now();
    let frame = stage.job(options, settings).run(token)?;
    let sample = clock.elapsed(&t);

    let diagnostics = stage.diagnostics(&frame, sample, clock.elapsed(&start));
    Ok(StagedPreview { frame, diagnostics })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    /// 400x300 white PNG with a dark 300x200 block inset by 50 px.
    fn framed_png() -> Vec<u8> {
        let img = image::RgbaImage::from_fn(400, 300, |x, y| {
            if (50..350).contains(&x) && (50..250).contains(&y) {
                image::Rgba([20, 20, 20, 255])
            } else {
                image::Rgba([255, 255, 255, 255])
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
    fn staged_preview_without_border_removal() {
        let staged = preview_staged(
            &framed_png(),
            &ConversionOptions::default(),
            PreviewSettings::default(),
            &CancellationToken::new(),
            &WebClock,
        )
        .unwrap();
        assert_eq!(staged.frame.view_box, Dimensions::new(400, 300));
        assert!(staged.frame.overlays.is_empty());
        assert_eq!(staged.diagnostics.summary.cell_count, 150 * 100);
        assert!(staged.diagnostics.detect.is_none());
    }

    #[test]
    fn staged_preview_maps_area_back_to_original() {
        let options = ConversionOptions {
            remove_border: true,
            ..ConversionOptions::default()
        };
        let settings = PreviewSettings {
            max_dimension: 200,
            ..PreviewSettings::default()
        };
        let staged = preview_staged(
            &framed_png(),
            &options,
            settings,
            &CancellationToken::new(),
            &WebClock,
        )
        .unwrap();
        assert_eq!(staged.diagnostics.summary.working, Dimensions::new(200, 150));
        let area = staged.diagnostics.summary.content_area.unwrap();
        assert!(area.x.abs_diff(50) <= 2, "x = {}", area.x);
        assert!(area.y.abs_diff(50) <= 2, "y = {}", area.y);
        assert!(area.width.abs_diff(300) <= 4, "width = {}", area.width);
        assert!(area.height.abs_diff(200) <= 4, "height = {}", area.height);
        assert_eq!(staged.frame.overlays.len(), 4);
    }

    #[test]
    fn stage_drives_job_in_steps() {
        let options = ConversionOptions {
            remove_border: true,
            ..ConversionOptions::default()
        };
        let settings = PreviewSettings {
            max_dimension: 200,
            ..PreviewSettings::default()
        };
        let stage = PreviewStage::prepare(&framed_png(), &options, settings, &WebClock).unwrap();
        assert_eq!(stage.working.dimensions(), Dimensions::new(200, 150));
        let working_area = stage.working_area.unwrap();
        assert!(working_area.x.abs_diff(25) <= 1, "x = {}", working_area.x);
        let original_area = stage.content_area().unwrap();
        assert!(original_area.x.abs_diff(50) <= 2, "x = {}", original_area.x);

        let mut job = stage.job(&options, settings);
        let mut steps = 0;
        while job.step() {
            steps += 1;
        }
        let stepped = job.finish();
        assert!(steps > 1);

        let whole = stage.job(&options, settings).run(&CancellationToken::new()).unwrap();
        assert_eq!(stepped, whole);

        let diagnostics = stage.diagnostics(&stepped, Duration::ZERO, Duration::ZERO);
        assert_eq!(diagnostics.summary.cell_count, stepped.cells.len());
        assert_eq!(diagnostics.summary.content_area, Some(original_area));
        assert!(diagnostics.detect.is_some());
    }

    #[test]
    fn cancelled_token_stops_staged_preview() {
        let token = CancellationToken::new();
        token.cancel();
        let result = preview_staged(
            &framed_png(),
            &ConversionOptions::default(),
            PreviewSettings::default(),
            &token,
            &WebClock,
        );
        assert!(matches!(result, Err(PreviewError::Cancelled(_))));
    }

    #[test]
    fn garbage_input_is_a_pipeline_error() {
        let result = preview_staged(
            b"not an image",
            &ConversionOptions::default(),
            PreviewSettings::default(),
            &CancellationToken::new(),
            &WebClock,
        );
        assert!(matches!(result, Err(PreviewError::Pipeline(_))));
    }
}

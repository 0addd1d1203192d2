//! Live-preview sampling.
//!
//! Produces a coarse, instantly available approximation of the traced
//! output while the authoritative conversion runs elsewhere. The image
//! is sampled on a square grid; each grid cell's top-left pixel becomes
//! one rectangle whose opacity grows with the pixel's darkness.
//!
//! When border removal is requested the preview keeps original image
//! coordinates: only cells inside the content area are drawn, and the
//! border regions outside it are reported as [`BorderOverlay`]s so the
//! renderer can highlight what the conversion will crop away.
//!
//! Sampling runs in bounded row chunks. [`PreviewJob::step`] processes
//! one chunk so single-threaded callers can yield between chunks, and
//! [`PreviewJob::run`] checks a [`CancellationToken`] at every chunk
//! boundary.

use crate::border::PREVIEW_THRESHOLD;
use crate::cancel::{CancellationToken, Cancelled};
use crate::content_area::detect_content_area;
use crate::types::{ContentArea, ConversionOptions, Dimensions, PixelBuffer, brightness};

/// Pixels with alpha below this are treated as fully transparent.
pub const ALPHA_CUTOFF: u8 = 50;

/// Pixels brighter than this are treated as blank paper.
pub const INK_CUTOFF: f64 = 240.0;

/// No drawn cell is lighter than this opacity.
pub const MIN_OPACITY: f64 = 0.2;

/// Performance knobs for preview sampling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PreviewSettings {
    /// Grid cell size in pixels, applied to both axes.
    pub grid_step: u32,
    /// Pixel rows processed between cancellation checks.
    pub chunk_rows: u32,
    /// Longer-edge size the source is reduced to before sampling.
    pub max_dimension: u32,
}

impl Default for PreviewSettings {
    fn default() -> Self {
        Self {
            grid_step: 2,
            chunk_rows: 20,
            max_dimension: 800,
        }
    }
}

impl PreviewSettings {
    /// Coarser settings for constrained runtimes (phones, low-end
    /// devices).
    #[must_use]
    pub const fn constrained() -> Self {
        Self {
            grid_step: 4,
            chunk_rows: 10,
            max_dimension: 400,
        }
    }
}

/// One drawn grid cell.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PreviewCell {
    /// Left edge in preview coordinates.
    pub x: u32,
    /// Top edge in preview coordinates.
    pub y: u32,
    /// Opacity in `[MIN_OPACITY, 1.0]`.
    pub opacity: f64,
}

/// A border region that the conversion would crop away.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BorderOverlay {
    /// Left edge.
    pub x: u32,
    /// Top edge.
    pub y: u32,
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

/// A finished preview, ready for serialization.
#[derive(Debug, Clone, PartialEq)]
pub struct PreviewFrame {
    /// Coordinate space of the document.
    pub view_box: Dimensions,
    /// Side length of each cell.
    pub cell_size: u32,
    /// Fill color for every cell.
    pub fill: String,
    /// Drawn cells in row-major order.
    pub cells: Vec<PreviewCell>,
    /// Highlighted border regions (empty unless border removal is on).
    pub overlays: Vec<BorderOverlay>,
}

/// Opacity for a pixel of the given brightness.
#[must_use]
pub fn opacity_for(brightness: f64) -> f64 {
    (1.0 - brightness / 255.0).max(MIN_OPACITY)
}

/// The content area a preview should use for `options`: detected at
/// [`PREVIEW_THRESHOLD`] when border removal is on, otherwise `None`.
#[must_use]
pub fn preview_area(buffer: &PixelBuffer, options: &ConversionOptions) -> Option<ContentArea> {
    options
        .remove_border
        .then(|| detect_content_area(buffer, PREVIEW_THRESHOLD))
}

/// Border regions of `dimensions` lying outside `area`.
#[must_use]
pub fn border_overlays(dimensions: Dimensions, area: ContentArea) -> Vec<BorderOverlay> {
    let (w, h) = (dimensions.width, dimensions.height);
    let mut overlays = Vec::with_capacity(4);
    if area.y > 0 {
        overlays.push(BorderOverlay {
            x: 0,
            y: 0,
            width: w,
            height: area.y,
        });
    }
    if area.bottom() < h {
        overlays.push(BorderOverlay {
            x: 0,
            y: area.bottom(),
            width: w,
            height: h - area.bottom(),
        });
    }
    if area.x > 0 {
        overlays.push(BorderOverlay {
            x: 0,
            y: 0,
            width: area.x,
            height: h,
        });
    }
    if area.right() < w {
        overlays.push(BorderOverlay {
            x: area.right(),
            y: 0,
            width: w - area.right(),
            height: h,
        });
    }
    overlays
}

/// Incremental preview sampler.
#[derive(Debug)]
pub struct PreviewJob<'a> {
    buffer: &'a PixelBuffer,
    region: ContentArea,
    settings: PreviewSettings,
    next_row: u32,
    frame: PreviewFrame,
}

impl<'a> PreviewJob<'a> {
    /// Prepare a job over `buffer`.
    ///
    /// `content_area` only restricts sampling when
    /// `options.remove_border` is set.
    #[must_use]
    pub fn new(
        buffer: &'a PixelBuffer,
        content_area: Option<ContentArea>,
        options: &ConversionOptions,
        settings: PreviewSettings,
    ) -> Self {
        let dimensions = buffer.dimensions();
        let full = ContentArea::full(dimensions);
        let (region, overlays) = match content_area.filter(|_| options.remove_border) {
            Some(area) => {
                let area = area.clamped_to(dimensions);
                (area, border_overlays(dimensions, area))
            }
            None => (full, Vec::new()),
        };
        let settings = PreviewSettings {
            grid_step: settings.grid_step.max(1),
            chunk_rows: settings.chunk_rows.max(1),
            ..settings
        };
        Self {
            buffer,
            region,
            settings,
            next_row: region.y,
            frame: PreviewFrame {
                view_box: Dimensions::new(dimensions.width.max(1), dimensions.height.max(1)),
                cell_size: settings.grid_step,
                fill: options.fill_color().to_owned(),
                cells: Vec::new(),
                overlays,
            },
        }
    }

    /// Whether every row has been sampled.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.next_row >= self.region.bottom().min(self.buffer.height())
    }

    /// Sample one chunk of rows. Returns `true` while rows remain.
    pub fn step(&mut self) -> bool {
        let end = self.region.bottom().min(self.buffer.height());
        let chunk_end = self.next_row.saturating_add(self.settings.chunk_rows).min(end);
        let right = self.region.right().min(self.buffer.width());
        let step = self.settings.grid_step;

        let mut y = self.next_row;
        while y < chunk_end {
            let mut x = self.region.x;
            while x < right {
                if let Some(cell) = self.sample_cell(x, y) {
                    self.frame.cells.push(cell);
                }
                x += step;
            }
            y += step;
        }
        self.next_row = y;
        !self.is_finished()
    }

    fn sample_cell(&self, x: u32, y: u32) -> Option<PreviewCell> {
        let pixel = self.buffer.pixel(x, y);
        if pixel[3] < ALPHA_CUTOFF {
            return None;
        }
        let value = brightness(pixel);
        if value > INK_CUTOFF {
            return None;
        }
        Some(PreviewCell {
            x,
            y,
            opacity: opacity_for(value),
        })
    }

    /// Drive the job to completion, checking `token` before every chunk.
    ///
    /// # Errors
    ///
    /// Returns [`Cancelled`] if the token is cancelled before the last
    /// chunk completes or right after it; no partial frame is returned.
    pub fn run(mut self, token: &CancellationToken) -> Result<PreviewFrame, Cancelled> {
        while !self.is_finished() {
            if token.is_cancelled() {
                return Err(Cancelled);
            }
            self.step();
        }
        if token.is_cancelled() {
            return Err(Cancelled);
        }
        Ok(self.finish())
    }

    /// Consume the job and return the frame sampled so far.
    #[must_use]
    pub fn finish(self) -> PreviewFrame {
        self.frame
    }
}

/// Sample a complete preview frame.
///
/// # Errors
///
/// Returns [`Cancelled`] if `token` is cancelled mid-run.
pub fn sample(
    buffer: &PixelBuffer,
    content_area: Option<ContentArea>,
    options: &ConversionOptions,
    settings: PreviewSettings,
    token: &CancellationToken,
) -> Result<PreviewFrame, Cancelled> {
    PreviewJob::new(buffer, content_area, options, settings).run(token)
}

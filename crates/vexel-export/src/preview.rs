//! Preview SVG serializer.
//!
//! Turns a sampled [`PreviewFrame`] into an SVG document using the
//! [`svg`] crate for document construction and XML escaping.
//!
//! Each drawn cell becomes a square `<rect>` with the frame's fill
//! color and a per-cell `opacity`. Border overlays are grouped under
//! `<g id="border-overlay">` and drawn as dashed orange rectangles on
//! top of the cells.
//!
//! The serialized markup is passed through
//! [`vexel_pipeline::canonicalize`] so previews share the responsive
//! root attributes of final conversions.

use svg::Document;
use svg::node::Text;
use svg::node::element::{Description, Group, Rectangle, Title};

use vexel_pipeline::cancel::{CancellationToken, Cancelled};
use vexel_pipeline::preview::{self, BorderOverlay, PreviewCell, PreviewFrame, PreviewSettings};
use vexel_pipeline::{
    ContentArea, ConversionOptions, InvalidSvgError, PixelBuffer, SvgDocument, canonicalize,
};

/// Highlight color for border overlays.
pub const OVERLAY_COLOR: &str = "#ff9800";

/// Fill opacity of border overlays.
pub const OVERLAY_OPACITY: f64 = 0.6;

/// Metadata to embed in the SVG document.
///
/// Both fields are optional. When present, a `<title>` and/or `<desc>`
/// element is emitted immediately after the opening `<svg>` tag.
/// Text values are XML-escaped automatically by the `svg` crate.
#[derive(Debug, Clone, Default)]
pub struct SvgMetadata<'a> {
    /// Document title, typically the source filename.
    pub title: Option<&'a str>,
    /// Document description, typically the conversion options.
    pub description: Option<&'a str>,
}

/// Why a preview could not be rendered.
#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    /// The sampling run was superseded.
    #[error(transparent)]
    Cancelled(#[from] Cancelled),

    /// The serialized markup failed validation.
    #[error(transparent)]
    InvalidSvg(#[from] InvalidSvgError),
}

fn cell_rect(cell: &PreviewCell, size: u32, fill: &str) -> Rectangle {
    Rectangle::new()
        .set("x", cell.x)
        .set("y", cell.y)
        .set("width", size)
        .set("height", size)
        .set("fill", fill)
        .set("opacity", format!("{:.2}", cell.opacity))
}

fn overlay_rect(overlay: &BorderOverlay) -> Rectangle {
    Rectangle::new()
        .set("x", overlay.x)
        .set("y", overlay.y)
        .set("width", overlay.width)
        .set("height", overlay.height)
        .set("fill", OVERLAY_COLOR)
        .set("fill-opacity", OVERLAY_OPACITY)
        .set("stroke", OVERLAY_COLOR)
        .set("stroke-width", 2)
        .set("stroke-dasharray", "4,2")
}

/// Serialize a preview frame into raw (uncanonicalized) SVG markup.
#[must_use]
pub fn to_preview_svg(frame: &PreviewFrame, metadata: &SvgMetadata<'_>) -> String {
    let (w, h) = (frame.view_box.width, frame.view_box.height);
    let mut doc = Document::new()
        .set("width", w)
        .set("height", h)
        .set("viewBox", (0, 0, w, h));

    if let Some(title) = metadata.title {
        doc = doc.add(Title::new(title));
    }
    if let Some(description) = metadata.description {
        doc = doc.add(Description::new().add(Text::new(description)));
    }

    if !frame.cells.is_empty() {
        let cells = frame
            .cells
            .iter()
            .fold(Group::new().set("id", "preview-cells"), |group, cell| {
                group.add(cell_rect(cell, frame.cell_size, &frame.fill))
            });
        doc = doc.add(cells);
    }

    if !frame.overlays.is_empty() {
        let overlays = frame
            .overlays
            .iter()
            .fold(Group::new().set("id", "border-overlay"), |group, overlay| {
                group.add(overlay_rect(overlay))
            });
        doc = doc.add(overlays);
    }

    doc.to_string()
}

/// Serialize and canonicalize a preview frame.
///
/// # Errors
///
/// Returns [`InvalidSvgError`] if the serialized markup does not
/// validate, which indicates a serializer bug.
pub fn frame_to_document(
    frame: &PreviewFrame,
    metadata: &SvgMetadata<'_>,
) -> Result<SvgDocument, InvalidSvgError> {
    // Cells already carry the requested color; overlays must keep theirs.
    canonicalize(&to_preview_svg(frame, metadata), &ConversionOptions::default())
}

/// Sample `buffer` and render the preview document in one call.
///
/// # Errors
///
/// Returns [`RenderError::Cancelled`] if `token` is cancelled before
/// sampling completes; no document is produced in that case.
pub fn render(
    buffer: &PixelBuffer,
    content_area: Option<ContentArea>,
    options: &ConversionOptions,
    settings: PreviewSettings,
    token: &CancellationToken,
) -> Result<SvgDocument, RenderError> {
    let frame = preview::sample(buffer, content_area, options, settings, token)?;
    Ok(frame_to_document(&frame, &SvgMetadata::default())?)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use vexel_pipeline::types::{RgbaImage, SvgColor};
    use vexel_pipeline::{Dimensions, canonicalize::svg_dimensions};

    fn frame(cells: Vec<PreviewCell>, overlays: Vec<BorderOverlay>) -> PreviewFrame {
        PreviewFrame {
            view_box: Dimensions::new(40, 30),
            cell_size: 2,
            fill: "#000000".to_owned(),
            cells,
            overlays,
        }
    }

    fn no_meta() -> SvgMetadata<'static> {
        SvgMetadata::default()
    }

    fn cell(x: u32, y: u32, opacity: f64) -> PreviewCell {
        PreviewCell { x, y, opacity }
    }

    #[test]
    fn empty_frame_is_a_valid_document() {
        let doc = frame_to_document(&frame(vec![], vec![]), &no_meta()).unwrap();
        assert!(doc.as_str().starts_with("<svg"));
        assert!(!doc.as_str().contains("<rect"));
        let size = svg_dimensions(doc.as_str()).unwrap();
        assert!((size.width - 40.0).abs() < f64::EPSILON);
    }

    #[test]
    fn cells_become_rects_with_two_decimal_opacity() {
        let svg = to_preview_svg(&frame(vec![cell(4, 6, 0.333_333)], vec![]), &no_meta());
        assert!(svg.contains("<rect"));
        assert!(svg.contains(r#"x="4""#));
        assert!(svg.contains(r#"y="6""#));
        assert!(svg.contains(r#"width="2""#));
        assert!(svg.contains(r#"opacity="0.33""#));
        assert!(svg.contains(r##"fill="#000000""##));
    }

    #[test]
    fn overlays_are_dashed_orange() {
        let overlay = BorderOverlay {
            x: 0,
            y: 0,
            width: 40,
            height: 5,
        };
        let svg = to_preview_svg(&frame(vec![], vec![overlay]), &no_meta());
        assert!(svg.contains(r#"id="border-overlay""#));
        assert!(svg.contains(r##"stroke="#ff9800""##));
        assert!(svg.contains(r#"stroke-dasharray="4,2""#));
        assert!(svg.contains(r#"fill-opacity="0.6""#));
        assert!(svg.contains(r#"stroke-width="2""#));
    }

    #[test]
    fn overlays_follow_cells() {
        let overlay = BorderOverlay {
            x: 0,
            y: 0,
            width: 40,
            height: 5,
        };
        let svg = to_preview_svg(&frame(vec![cell(8, 8, 1.0)], vec![overlay]), &no_meta());
        let cells = svg.find("preview-cells").unwrap();
        let overlays = svg.find("border-overlay").unwrap();
        assert!(cells < overlays);
    }

    #[test]
    fn title_and_desc_are_escaped() {
        let meta = SvgMetadata {
            title: Some("A <B> & C"),
            description: Some("size=auto"),
        };
        let svg = to_preview_svg(&frame(vec![], vec![]), &meta);
        assert!(svg.contains("<title>A &lt;B&gt; &amp; C</title>"));
        assert!(svg.contains("<desc>size=auto</desc>"));
    }

    #[test]
    fn canonical_preview_is_responsive_and_single_line() {
        let doc = frame_to_document(&frame(vec![cell(0, 0, 1.0)], vec![]), &no_meta()).unwrap();
        assert!(doc.as_str().contains(r#"width="100%""#));
        assert!(doc.as_str().contains(r#"preserveAspectRatio="xMidYMid meet""#));
        assert!(!doc.as_str().contains('\n'));
        assert!(doc.as_str().ends_with("</svg>"));
    }

    #[test]
    fn render_uses_requested_color_and_keeps_overlay_color() {
        let buffer = PixelBuffer::from(RgbaImage::from_fn(10, 10, |x, y| {
            if (3..7).contains(&x) && (3..7).contains(&y) {
                image::Rgba([0, 0, 0, 255])
            } else {
                image::Rgba([255, 255, 255, 255])
            }
        }));
        let options = ConversionOptions {
            remove_border: true,
            color: Some(SvgColor::parse("#2255aa").unwrap()),
            ..ConversionOptions::default()
        };
        let area = preview::preview_area(&buffer, &options);
        let doc = render(
            &buffer,
            area,
            &options,
            PreviewSettings::default(),
            &CancellationToken::new(),
        )
        .unwrap();
        assert!(doc.as_str().contains(r##"fill="#2255aa""##));
        assert!(doc.as_str().contains(r##"fill="#ff9800""##));
    }

    #[test]
    fn cancelled_render_produces_nothing() {
        let buffer = PixelBuffer::from(RgbaImage::from_pixel(4, 4, image::Rgba([0, 0, 0, 255])));
        let token = CancellationToken::new();
        token.cancel();
        let result = render(
            &buffer,
            None,
            &ConversionOptions::default(),
            PreviewSettings::default(),
            &token,
        );
        assert!(matches!(result, Err(RenderError::Cancelled(_))));
    }
}

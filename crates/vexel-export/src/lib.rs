//! vexel-export: Pure preview serializers (sans-IO)
//!
//! Converts sampled preview frames into SVG documents.

pub mod preview;

pub use preview::{RenderError, SvgMetadata, frame_to_document, render, to_preview_svg};

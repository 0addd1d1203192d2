//! End-to-end conversion of one upload.
//!
//! [`run_pipeline`] is the synchronous sequence:
//!
//! 1. decode (record width, height, format)
//! 2. border removal: crop to the client's content area, or trim
//! 3. optional resize to the size tier
//! 4. enhance and encode a lossless PNG
//! 5. trace with the quality tier's parameters
//! 6. canonicalize
//!
//! [`Orchestrator::convert`] runs it on the blocking pool under the
//! configured time budget.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use serde::Serialize;
use tracing::{debug, info, warn};

use vexel_pipeline::{
    ContentArea, ConversionOptions, MalformedContentArea, SvgDocument, canonicalize,
};

use crate::error::ConversionError;
use crate::processor::ImageProcessor;
use crate::tracer::{TraceParams, Tracer};

/// One conversion request.
#[derive(Debug)]
pub struct ConversionRequest {
    /// The uploaded image bytes.
    pub image: Bytes,
    /// Parsed options.
    pub options: ConversionOptions,
    /// Client-computed content area, if one was sent. A malformed value
    /// is kept so the pipeline can log it and fall back to trimming.
    pub content_area: Option<Result<ContentArea, MalformedContentArea>>,
}

/// Facts about the uploaded image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversionMetadata {
    /// Decoded width in pixels.
    pub original_width: u32,
    /// Decoded height in pixels.
    pub original_height: u32,
    /// Container format, e.g. `png`.
    pub format: String,
}

/// A finished conversion.
#[derive(Debug, Clone)]
pub struct ConversionOutput {
    /// The canonical document.
    pub svg: SvgDocument,
    /// Upload size in bytes.
    pub original_size: usize,
    /// Document length in characters.
    pub svg_size: usize,
    /// Facts about the upload.
    pub metadata: ConversionMetadata,
}

/// Runs conversions against a processor and a tracer.
#[derive(Clone)]
pub struct Orchestrator {
    processor: Arc<dyn ImageProcessor>,
    tracer: Arc<dyn Tracer>,
    timeout: Duration,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl Orchestrator {
    /// Build an orchestrator with a per-request time budget.
    #[must_use]
    pub fn new(
        processor: Arc<dyn ImageProcessor>,
        tracer: Arc<dyn Tracer>,
        timeout: Duration,
    ) -> Self {
        Self {
            processor,
            tracer,
            timeout,
        }
    }

    /// Convert one upload.
    ///
    /// The work runs on tokio's blocking pool. If it does not finish
    /// within the time budget the request fails with
    /// [`ConversionError::Timeout`]; the abandoned task's result is
    /// discarded when it completes.
    ///
    /// # Errors
    ///
    /// See [`run_pipeline`].
    pub async fn convert(
        &self,
        request: ConversionRequest,
    ) -> Result<ConversionOutput, ConversionError> {
        let processor = Arc::clone(&self.processor);
        let tracer = Arc::clone(&self.tracer);
        let task = tokio::task::spawn_blocking(move || {
            run_pipeline(processor.as_ref(), tracer.as_ref(), request)
        });

        match tokio::time::timeout(self.timeout, task).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_error)) => Err(ConversionError::Internal(join_error.to_string())),
            Err(_) => Err(ConversionError::Timeout(self.timeout)),
        }
    }
}

/// Run the conversion sequence synchronously.
///
/// # Errors
///
/// - [`ConversionError::NoImageProvided`] for an empty upload
/// - [`ConversionError::Processor`] if decoding or encoding fails
/// - [`ConversionError::Trace`] if tracing fails
/// - [`ConversionError::InvalidSvg`] if the traced markup does not
///   canonicalize
///
/// A malformed content area is not an error: it is logged and the
/// generic trim is used instead.
pub fn run_pipeline(
    processor: &dyn ImageProcessor,
    tracer: &dyn Tracer,
    request: ConversionRequest,
) -> Result<ConversionOutput, ConversionError> {
    let ConversionRequest {
        image: bytes,
        options,
        content_area,
    } = request;
    if bytes.is_empty() {
        return Err(ConversionError::NoImageProvided);
    }

    // 1. Decode.
    let decoded = processor.decode(&bytes)?;
    let metadata = ConversionMetadata {
        original_width: decoded.image.width(),
        original_height: decoded.image.height(),
        format: decoded.format_name().to_owned(),
    };
    info!(
        width = metadata.original_width,
        height = metadata.original_height,
        format = %metadata.format,
        bytes = bytes.len(),
        "decoded upload"
    );
    let mut image = decoded.image;

    // 2. Border removal.
    if options.remove_border {
        image = match content_area {
            Some(Ok(area)) => {
                debug!(?area, "cropping to client content area");
                processor.crop(image, area)
            }
            Some(Err(err)) => {
                warn!(error = %err, "ignoring malformed content area; trimming instead");
                processor.trim(image)
            }
            None => processor.trim(image),
        };
    }

    // 3. Resize.
    if let Some(longer_edge) = options.target_size.longer_edge() {
        image = processor.resize(image, longer_edge);
    }

    // 4. Enhance and encode.
    let png = processor.encode_png(&processor.enhance(image))?;
    let original_size = bytes.len();
    drop(bytes);

    // 5. Trace.
    let params = TraceParams::for_quality(options.quality);
    debug!(?params, "tracing");
    let raw = tracer.trace(&png, &params)?;

    // 6. Canonicalize.
    let svg = canonicalize(&raw, &options)?;
    info!(svg_bytes = svg.len(), quality = %options.quality, "converted");

    Ok(ConversionOutput {
        original_size,
        svg_size: svg.char_count(),
        svg,
        metadata,
    })
}

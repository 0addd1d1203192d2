//! vexel-server: HTTP conversion service.
//!
//! Accepts a multipart upload, prepares the raster with
//! [`processor::ImageProcessor`], traces it with [`tracer::Tracer`], and
//! returns a canonical SVG produced by `vexel_pipeline::canonicalize`.
//! [`orchestrator::Orchestrator`] sequences the stages; [`routes`]
//! exposes them over axum.

pub mod config;
pub mod error;
pub mod orchestrator;
pub mod processor;
pub mod routes;
pub mod tracer;

pub use config::ServerConfig;
pub use error::{ConversionError, ErrorResponse};
pub use orchestrator::{ConversionOutput, ConversionRequest, Orchestrator};
pub use processor::{ImageCrateProcessor, ImageProcessor, ProcessorError};
pub use routes::{AppState, create_app};
pub use tracer::{TraceError, TraceParams, Tracer, VtracerTracer};

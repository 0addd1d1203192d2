//! HTTP surface: multipart conversion and health.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::multipart::MultipartRejection;
use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use tower_http::trace::TraceLayer;
use tracing::debug;

use vexel_pipeline::ConversionOptions;
use vexel_pipeline::content_area::parse_content_area;

use crate::config::ServerConfig;
use crate::error::ConversionError;
use crate::orchestrator::{ConversionMetadata, ConversionRequest, Orchestrator};

/// Shared, read-only state for every request.
#[derive(Debug)]
pub struct AppState {
    /// Runs conversions.
    pub orchestrator: Orchestrator,
    /// Effective configuration.
    pub config: ServerConfig,
}

/// Successful conversion body.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversionResponse {
    /// Always `true`.
    pub success: bool,
    /// The canonical SVG document.
    pub svg: String,
    /// Upload size in bytes.
    pub original_size: usize,
    /// SVG size in bytes.
    pub svg_size: usize,
    /// Facts about the upload.
    pub metadata: ConversionMetadata,
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    timestamp: String,
    version: &'static str,
}

/// Build the router.
///
/// Conversion and health are mounted both at the root and under `/api`.
pub fn create_app(state: AppState) -> Router {
    let body_limit = state.config.max_upload_bytes;
    let cors = state.config.cors_layer();

    Router::new()
        .route("/convert-to-svg", post(convert_to_svg))
        .route("/api/convert-to-svg", post(convert_to_svg))
        .route("/health", get(health_check))
        .route("/api/health", get(health_check))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(Arc::new(state))
}

async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        timestamp: chrono::Utc::now().to_rfc3339(),
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn convert_to_svg(
    State(state): State<Arc<AppState>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<ConversionResponse>, ConversionError> {
    let form = UploadForm::read(multipart?).await?;
    let request = form.into_request()?;
    let output = state.orchestrator.convert(request).await?;

    Ok(Json(ConversionResponse {
        success: true,
        svg: output.svg.into_string(),
        original_size: output.original_size,
        svg_size: output.svg_size,
        metadata: output.metadata,
    }))
}

/// The multipart fields of a conversion request, as received.
#[derive(Debug, Default)]
struct UploadForm {
    image: Option<Bytes>,
    remove_border: Option<String>,
    color: Option<String>,
    size: Option<String>,
    quality: Option<String>,
    content_area: Option<String>,
}

impl UploadForm {
    async fn read(mut multipart: Multipart) -> Result<Self, ConversionError> {
        let mut form = Self::default();
        while let Some(field) = multipart.next_field().await? {
            let Some(name) = field.name().map(str::to_owned) else {
                continue;
            };
            match name.as_str() {
                "image" => form.image = Some(field.bytes().await?),
                "removeBorder" => form.remove_border = Some(field.text().await?),
                "color" | "svgColor" => form.color = Some(field.text().await?),
                "size" => form.size = Some(field.text().await?),
                "quality" => form.quality = Some(field.text().await?),
                "contentArea" | "borderData" => form.content_area = Some(field.text().await?),
                other => debug!(field = other, "ignoring unknown form field"),
            }
        }
        Ok(form)
    }

    fn into_request(self) -> Result<ConversionRequest, ConversionError> {
        let image = self
            .image
            .filter(|bytes| !bytes.is_empty())
            .ok_or(ConversionError::NoImageProvided)?;
        let options = ConversionOptions::from_fields(
            self.remove_border.as_deref(),
            self.color.as_deref(),
            self.size.as_deref(),
            self.quality.as_deref(),
        )?;
        let content_area = self
            .content_area
            .filter(|text| !text.trim().is_empty())
            .map(|text| parse_content_area(&text));

        Ok(ConversionRequest {
            image,
            options,
            content_area,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn missing_image_is_rejected() {
        let form = UploadForm {
            size: Some("small".into()),
            ..UploadForm::default()
        };
        assert!(matches!(
            form.into_request(),
            Err(ConversionError::NoImageProvided)
        ));
    }

    #[test]
    fn empty_image_is_rejected() {
        let form = UploadForm {
            image: Some(Bytes::new()),
            ..UploadForm::default()
        };
        assert!(matches!(
            form.into_request(),
            Err(ConversionError::NoImageProvided)
        ));
    }

    #[test]
    fn fields_become_options() {
        let form = UploadForm {
            image: Some(Bytes::from_static(b"png")),
            remove_border: Some("true".into()),
            color: Some("#336699".into()),
            size: Some("medium".into()),
            quality: Some("high".into()),
            content_area: Some(r#"{"x":1,"y":2,"width":3,"height":4}"#.into()),
        };
        let request = form.into_request().unwrap();
        assert!(request.options.remove_border);
        assert_eq!(request.options.fill_color(), "#336699");
        assert_eq!(request.options.target_size.longer_edge(), Some(256));
        assert_eq!(request.options.quality, vexel_pipeline::Quality::High);
        let area = request.content_area.unwrap().unwrap();
        assert_eq!((area.x, area.y, area.width, area.height), (1, 2, 3, 4));
    }

    #[test]
    fn blank_content_area_counts_as_absent() {
        let form = UploadForm {
            image: Some(Bytes::from_static(b"png")),
            content_area: Some("  ".into()),
            ..UploadForm::default()
        };
        assert!(form.into_request().unwrap().content_area.is_none());
    }

    #[test]
    fn unknown_quality_is_an_invalid_option() {
        let form = UploadForm {
            image: Some(Bytes::from_static(b"png")),
            quality: Some("ultra".into()),
            ..UploadForm::default()
        };
        assert!(matches!(
            form.into_request(),
            Err(ConversionError::InvalidOption(_))
        ));
    }
}

//! End-to-end tests of the HTTP surface using `tower::ServiceExt::oneshot`.

#![allow(clippy::unwrap_used)]

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use image::{DynamicImage, Rgba, RgbaImage};
use serde_json::Value;
use tower::ServiceExt;

use vexel_server::{
    AppState, ImageCrateProcessor, ImageProcessor, Orchestrator, ServerConfig, TraceError,
    TraceParams, Tracer, VtracerTracer, create_app,
};

const BOUNDARY: &str = "vexel-test-boundary";

/// Reports the traced bitmap's size as a one-path SVG.
struct EchoTracer;

impl Tracer for EchoTracer {
    fn trace(&self, bitmap: &[u8], _: &TraceParams) -> Result<String, TraceError> {
        let img = image::load_from_memory(bitmap)?;
        Ok(format!(
            r##"<svg xmlns="http://www.w3.org/2000/svg" width="{}" height="{}"><path d="M0 0h1v1z" fill="#000000" stroke="#000000"/></svg>"##,
            img.width(),
            img.height()
        ))
    }
}

fn app_with(tracer: Arc<dyn Tracer>, config: ServerConfig) -> Router {
    let orchestrator = Orchestrator::new(Arc::new(ImageCrateProcessor), tracer, config.timeout());
    create_app(AppState {
        orchestrator,
        config,
    })
}

fn app() -> Router {
    app_with(Arc::new(EchoTracer), ServerConfig::default())
}

/// 40x30 black rectangle inside a 5 px white frame.
fn framed_png() -> Vec<u8> {
    let img = RgbaImage::from_fn(40, 30, |x, y| {
        if (5..35).contains(&x) && (5..25).contains(&y) {
            Rgba([0, 0, 0, 255])
        } else {
            Rgba([255, 255, 255, 255])
        }
    });
    ImageCrateProcessor
        .encode_png(&DynamicImage::ImageRgba8(img))
        .unwrap()
}

enum Part<'a> {
    File(&'a [u8]),
    Text(&'a str),
}

fn multipart(parts: &[(&str, Part<'_>)]) -> Request<Body> {
    let mut body = Vec::new();
    for (name, part) in parts {
        body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        match part {
            Part::File(bytes) => {
                body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{name}\"; filename=\"upload.png\"\r\n\
                         Content-Type: image/png\r\n\r\n"
                    )
                    .as_bytes(),
                );
                body.extend_from_slice(bytes);
            }
            Part::Text(text) => {
                body.extend_from_slice(
                    format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n{text}")
                        .as_bytes(),
                );
            }
        }
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());

    Request::builder()
        .method("POST")
        .uri("/convert-to-svg")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .unwrap()
}

async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

#[tokio::test]
async fn health_reports_healthy() {
    for uri in ["/health", "/api/health"] {
        let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
        let (status, body) = send(app(), request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
        assert!(body["timestamp"].as_str().unwrap().contains('T'));
    }
}

#[tokio::test]
async fn converts_upload() {
    let png = framed_png();
    let (status, body) = send(app(), multipart(&[("image", Part::File(&png))])).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    let svg = body["svg"].as_str().unwrap();
    assert!(svg.starts_with("<svg"));
    assert!(svg.contains(r#"width="100%""#));
    assert!(svg.contains(r#"viewBox="0 0 40 30""#));
    assert_eq!(body["svgSize"], svg.chars().count());
    assert_eq!(body["originalSize"], png.len());
    assert_eq!(body["metadata"]["originalWidth"], 40);
    assert_eq!(body["metadata"]["originalHeight"], 30);
    assert_eq!(body["metadata"]["format"], "png");
}

#[tokio::test]
async fn api_prefix_is_mounted() {
    let png = framed_png();
    let mut request = multipart(&[("image", Part::File(&png))]);
    *request.uri_mut() = "/api/convert-to-svg".parse().unwrap();
    let (status, _) = send(app(), request).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn missing_image_is_bad_request() {
    let (status, body) = send(app(), multipart(&[("size", Part::Text("small"))])).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
    assert_eq!(body["error"], "no image provided");
}

#[tokio::test]
async fn unknown_size_is_bad_request() {
    let png = framed_png();
    let (status, body) = send(
        app(),
        multipart(&[("image", Part::File(&png)), ("size", Part::Text("huge"))]),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("huge"));
}

#[tokio::test]
async fn undecodable_image_is_bad_request() {
    let (status, body) = send(
        app(),
        multipart(&[("image", Part::File(b"definitely not a png"))]),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn content_area_crops_before_tracing() {
    let png = framed_png();
    let (status, body) = send(
        app(),
        multipart(&[
            ("image", Part::File(&png)),
            ("removeBorder", Part::Text("true")),
            (
                "contentArea",
                Part::Text(r#"{"x":5,"y":5,"width":30,"height":20}"#),
            ),
        ]),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["svg"].as_str().unwrap().contains(r#"viewBox="0 0 30 20""#));
}

#[tokio::test]
async fn malformed_content_area_falls_back_to_trim() {
    let png = framed_png();
    let (status, body) = send(
        app(),
        multipart(&[
            ("image", Part::File(&png)),
            ("removeBorder", Part::Text("true")),
            ("borderData", Part::Text("{\"contentArea\": oops")),
        ]),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert!(body["svg"].as_str().unwrap().contains(r#"viewBox="0 0 30 20""#));
}

#[tokio::test]
async fn requested_color_replaces_black() {
    let png = framed_png();
    let (status, body) = send(
        app(),
        multipart(&[("image", Part::File(&png)), ("svgColor", Part::Text("#1e88e5"))]),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let svg = body["svg"].as_str().unwrap();
    assert!(svg.contains(r##"fill="#1e88e5""##));
    assert!(svg.contains(r##"stroke="#1e88e5""##));
    assert!(!svg.contains("#000000"));
}

#[tokio::test]
async fn oversized_upload_is_rejected() {
    let config = ServerConfig {
        max_upload_bytes: 1024,
        ..ServerConfig::default()
    };
    let big = vec![0_u8; 8 * 1024];
    let (status, body) = send(
        app_with(Arc::new(EchoTracer), config),
        multipart(&[("image", Part::File(&big))]),
    )
    .await;
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn slow_conversion_times_out_as_retriable() {
    struct Stalled;

    impl Tracer for Stalled {
        fn trace(&self, _: &[u8], _: &TraceParams) -> Result<String, TraceError> {
            std::thread::sleep(Duration::from_millis(300));
            Err(TraceError::Engine("stalled".into()))
        }
    }

    let config = ServerConfig {
        timeout_secs: 0,
        ..ServerConfig::default()
    };
    let png = framed_png();
    let (status, body) = send(
        app_with(Arc::new(Stalled), config),
        multipart(&[("image", Part::File(&png))]),
    )
    .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["retriable"], true);
}

#[tokio::test]
async fn real_tracer_produces_canonical_svg() {
    let png = framed_png();
    let (status, body) = send(
        app_with(Arc::new(VtracerTracer::default()), ServerConfig::default()),
        multipart(&[("image", Part::File(&png)), ("quality", Part::Text("high"))]),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let svg = body["svg"].as_str().unwrap();
    assert!(svg.starts_with("<svg"));
    assert!(svg.ends_with("</svg>"));
    assert!(svg.contains("<path"));
    assert!(!svg.contains("<?xml"));
    assert!(!svg.contains("<!--"));
}

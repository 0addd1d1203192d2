//! Locating and talking to a conversion server.
//!
//! [`BackendConfig`] holds an ordered list of candidate base URLs. The
//! first one whose `/health` endpoint answers within [`PROBE_TIMEOUT`]
//! becomes the active backend and is reused for the rest of the
//! process. [`BackendConfig::rediscover`] drops the cached choice and
//! probes again, which callers do after a connection failure.

use std::path::Path;
use std::time::Duration;

use reqwest::StatusCode;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use tracing::{debug, info, warn};

use vexel_pipeline::{ContentArea, ConversionOptions};

/// Base URLs tried when none is given explicitly.
pub const DEFAULT_CANDIDATES: &[&str] = &[
    "http://localhost:3001",
    "http://127.0.0.1:3001",
    "http://localhost:3000",
];

/// How long a health probe may take.
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(3);

/// Failures talking to a conversion server.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    /// No candidate answered its health probe.
    #[error("no conversion server reachable (tried {})", .tried.join(", "))]
    Unreachable {
        /// Every base URL that was probed.
        tried: Vec<String>,
    },

    /// Transport-level failure.
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The server answered with an error body.
    #[error("server rejected conversion ({status}): {message}")]
    Rejected {
        /// HTTP status code.
        status: u16,
        /// The server's `error` field.
        message: String,
        /// Whether the server marked the failure as retriable.
        retriable: bool,
    },
}

/// Candidate servers and the one currently in use.
#[derive(Debug, Clone)]
pub struct BackendConfig {
    candidates: Vec<String>,
    active: Option<String>,
}

impl BackendConfig {
    /// Candidates in probe order: `explicit` first, then the defaults.
    ///
    /// Trailing slashes are removed and duplicates dropped.
    #[must_use]
    pub fn new(explicit: Option<&str>) -> Self {
        let mut candidates: Vec<String> = Vec::new();
        for url in explicit.into_iter().chain(DEFAULT_CANDIDATES.iter().copied()) {
            let url = url.trim().trim_end_matches('/');
            if !url.is_empty() && !candidates.iter().any(|c| c == url) {
                candidates.push(url.to_owned());
            }
        }
        Self {
            candidates,
            active: None,
        }
    }

    /// Base URLs in probe order.
    #[must_use]
    pub fn candidates(&self) -> &[String] {
        &self.candidates
    }

    /// The backend chosen by the last discovery, if any.
    #[must_use]
    pub fn active(&self) -> Option<&str> {
        self.active.as_deref()
    }

    /// The active backend, discovering one first if needed.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::Unreachable`] if no candidate is healthy.
    pub async fn resolve(&mut self, client: &reqwest::Client) -> Result<String, BackendError> {
        if let Some(active) = &self.active {
            return Ok(active.clone());
        }
        self.rediscover(client).await
    }

    /// Forget the active backend and probe every candidate again.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::Unreachable`] if no candidate is healthy.
    pub async fn rediscover(&mut self, client: &reqwest::Client) -> Result<String, BackendError> {
        self.active = None;
        for candidate in &self.candidates {
            if probe(client, candidate).await {
                info!(backend = %candidate, "using conversion server");
                self.active = Some(candidate.clone());
                return Ok(candidate.clone());
            }
            debug!(backend = %candidate, "health probe failed");
        }
        Err(BackendError::Unreachable {
            tried: self.candidates.clone(),
        })
    }
}

async fn probe(client: &reqwest::Client, base: &str) -> bool {
    client
        .get(format!("{base}/health"))
        .timeout(PROBE_TIMEOUT)
        .send()
        .await
        .is_ok_and(|response| response.status().is_success())
}

/// Body of a `/convert-to-svg` response, success or failure.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConvertReply {
    success: bool,
    #[serde(default)]
    svg: Option<String>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    retriable: bool,
}

/// A conversion to submit.
#[derive(Debug)]
pub struct Upload<'a> {
    /// Raw image bytes.
    pub bytes: Vec<u8>,
    /// Source path, used for the multipart file name.
    pub path: &'a Path,
    /// Conversion options.
    pub options: &'a ConversionOptions,
    /// Content area computed locally, if any.
    pub content_area: Option<ContentArea>,
}

impl Upload<'_> {
    fn form(&self) -> Form {
        let file_name = self
            .path
            .file_name()
            .map_or_else(|| "upload".to_owned(), |n| n.to_string_lossy().into_owned());
        let mut form = Form::new()
            .part("image", Part::bytes(self.bytes.clone()).file_name(file_name))
            .text("removeBorder", self.options.remove_border.to_string())
            .text("size", self.options.target_size.to_string())
            .text("quality", self.options.quality.to_string());
        if let Some(color) = &self.options.color {
            form = form.text("color", color.to_string());
        }
        if let Some(area) = self.content_area
            && let Ok(json) = serde_json::to_string(&area)
        {
            form = form.text("contentArea", json);
        }
        form
    }
}

/// Convert `upload` on the active backend and return the SVG.
///
/// A connection failure triggers one rediscovery and retry; a
/// retriable server error is retried once on the same backend.
///
/// # Errors
///
/// Returns [`BackendError`] if no backend is reachable or the
/// conversion fails.
pub async fn convert(
    backend: &mut BackendConfig,
    client: &reqwest::Client,
    upload: &Upload<'_>,
) -> Result<String, BackendError> {
    let base = backend.resolve(client).await?;
    match submit(client, &base, upload).await {
        Err(BackendError::Http(e)) if e.is_connect() => {
            warn!(backend = %base, error = %e, "backend went away; rediscovering");
            let base = backend.rediscover(client).await?;
            submit(client, &base, upload).await
        }
        Err(BackendError::Rejected {
            retriable: true,
            message,
            ..
        }) => {
            warn!(%message, "retrying conversion");
            submit(client, &base, upload).await
        }
        other => other,
    }
}

async fn submit(
    client: &reqwest::Client,
    base: &str,
    upload: &Upload<'_>,
) -> Result<String, BackendError> {
    let response = client
        .post(format!("{base}/convert-to-svg"))
        .multipart(upload.form())
        .send()
        .await?;
    let status = response.status();
    let body = response.text().await?;
    interpret(status, &body)
}

/// Turn a `/convert-to-svg` response into the SVG or an error.
///
/// The status is read before the body is parsed, so an error page from a
/// proxy in front of the server still reports its status.
fn interpret(status: StatusCode, body: &str) -> Result<String, BackendError> {
    match serde_json::from_str::<ConvertReply>(body) {
        Ok(ConvertReply {
            success: true,
            svg: Some(svg),
            ..
        }) if status.is_success() => Ok(svg),
        Ok(reply) => Err(BackendError::Rejected {
            status: status.as_u16(),
            message: reply
                .error
                .unwrap_or_else(|| "missing svg in response".to_owned()),
            retriable: reply.retriable,
        }),
        Err(_) => Err(BackendError::Rejected {
            status: status.as_u16(),
            message: format!("{status} with a non-JSON body"),
            retriable: matches!(
                status,
                StatusCode::BAD_GATEWAY | StatusCode::SERVICE_UNAVAILABLE | StatusCode::GATEWAY_TIMEOUT
            ),
        }),
    }
}

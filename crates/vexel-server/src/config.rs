//! Server configuration from flags and environment.

use std::net::SocketAddr;
use std::time::Duration;

use axum::http::{HeaderValue, Method, header};
use clap::Parser;
use tower_http::cors::{Any, CorsLayer};
use tracing::warn;

/// Default upload limit: 10 MiB.
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

/// Default per-request time budget in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Raster-to-SVG conversion service.
#[derive(Debug, Clone, Parser)]
#[command(name = "vexel-server", version)]
pub struct ServerConfig {
    /// Address to listen on.
    #[arg(long, env = "VEXEL_ADDR", default_value = "0.0.0.0:3001")]
    pub addr: SocketAddr,

    /// Largest accepted request body in bytes.
    #[arg(long, env = "VEXEL_MAX_UPLOAD_BYTES", default_value_t = DEFAULT_MAX_UPLOAD_BYTES)]
    pub max_upload_bytes: usize,

    /// Seconds a conversion may take before it is abandoned.
    #[arg(long, env = "VEXEL_TIMEOUT_SECS", default_value_t = DEFAULT_TIMEOUT_SECS)]
    pub timeout_secs: u64,

    /// Comma-separated CORS origins. Empty allows any origin.
    #[arg(long, env = "VEXEL_ALLOWED_ORIGINS", value_delimiter = ',')]
    pub allowed_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: SocketAddr::from(([0, 0, 0, 0], 3001)),
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            allowed_origins: Vec::new(),
        }
    }
}

impl ServerConfig {
    /// The per-request time budget.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// CORS policy for the configured origins.
    ///
    /// Origins that are not valid header values are skipped with a
    /// warning. When none remain, any origin is allowed.
    #[must_use]
    pub fn cors_layer(&self) -> CorsLayer {
        let origins: Vec<HeaderValue> = self
            .allowed_origins
            .iter()
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .filter_map(|s| match s.parse() {
                Ok(origin) => Some(origin),
                Err(_) => {
                    warn!(origin = s, "ignoring invalid CORS origin");
                    None
                }
            })
            .collect();

        let cors = CorsLayer::new()
            .allow_methods([Method::GET, Method::POST])
            .allow_headers([header::CONTENT_TYPE]);
        if origins.is_empty() {
            cors.allow_origin(Any)
        } else {
            cors.allow_origin(origins)
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = ServerConfig::try_parse_from(["vexel-server"]).unwrap();
        assert_eq!(config.addr, ServerConfig::default().addr);
        assert_eq!(config.max_upload_bytes, 10 * 1024 * 1024);
        assert_eq!(config.timeout(), Duration::from_secs(60));
    }

    #[test]
    fn inherits_workspace_toolchain() {
        assert_eq!(env!("CARGO_PKG_RUST_VERSION"), "1.89");
    }

    #[test]
    fn origins_split_on_commas() {
        let config = ServerConfig::try_parse_from([
            "vexel-server",
            "--allowed-origins",
            "http://localhost:3000,https://example.com",
        ])
        .unwrap();
        assert_eq!(
            config.allowed_origins,
            vec!["http://localhost:3000", "https://example.com"]
        );
    }

    #[test]
    fn flags_override_defaults() {
        let config = ServerConfig::try_parse_from([
            "vexel-server",
            "--addr",
            "127.0.0.1:8080",
            "--timeout-secs",
            "5",
        ])
        .unwrap();
        assert_eq!(config.addr.port(), 8080);
        assert_eq!(config.timeout_secs, 5);
    }
}

//! Preview diagnostics: per-stage timing and counts.
//!
//! Every call to [`preview_staged`](crate::preview_staged) collects
//! diagnostics alongside the preview frame. The worker logs them to the
//! browser console and the CLI prints them as a report.
//!
//! Time is read through the [`Clock`] trait so the sans-IO core never
//! touches a platform clock directly. [`WebClock`] is backed by the
//! `web-time` crate, which uses `performance.now()` on WASM and
//! `std::time::Instant` on native.
//!
//! Durations are serialized as fractional seconds (`f64`) for JSON
//! compatibility, since `std::time::Duration` does not implement serde
//! traits.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::types::{ContentArea, Dimensions};

/// Source of monotonic timestamps.
pub trait Clock {
    /// Opaque timestamp type.
    type Instant;

    /// The current time.
    fn now(&self) -> Self::Instant;

    /// Time elapsed since `since`.
    fn elapsed(&self, since: &Self::Instant) -> Duration;
}

/// [`Clock`] backed by `web_time::Instant`.
#[derive(Debug, Clone, Copy, Default)]
pub struct WebClock;

impl Clock for WebClock {
    type Instant = web_time::Instant;

    fn now(&self) -> web_time::Instant {
        web_time::Instant::now()
    }

    fn elapsed(&self, since: &web_time::Instant) -> Duration {
        since.elapsed()
    }
}

/// Serde support for `std::time::Duration` as fractional seconds.
mod duration_serde {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        duration.as_secs_f64().serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(|_| {
            serde::de::Error::custom(
                "duration seconds must be finite, non-negative, and representable as a Duration",
            )
        })
    }
}

/// Optional-duration variant of [`duration_serde`].
mod option_duration_serde {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    #[allow(clippy::ref_option)]
    pub fn serialize<S: Serializer>(
        duration: &Option<Duration>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        duration.map(|d| d.as_secs_f64()).serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Duration>, D::Error> {
        Option::<f64>::deserialize(deserializer)?
            .map(|secs| {
                Duration::try_from_secs_f64(secs)
                    .map_err(|_| serde::de::Error::custom("invalid duration seconds"))
            })
            .transpose()
    }
}

/// Diagnostics collected from a single preview run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreviewDiagnostics {
    /// Image decoding.
    #[serde(with = "duration_serde")]
    pub decode: Duration,
    /// Reduction to working resolution.
    #[serde(with = "duration_serde")]
    pub downsample: Duration,
    /// Border detection (only when border removal is on).
    #[serde(with = "option_duration_serde")]
    pub detect: Option<Duration>,
    /// Grid sampling.
    #[serde(with = "duration_serde")]
    pub sample: Duration,
    /// Total wall-clock duration.
    #[serde(with = "duration_serde")]
    pub total: Duration,
    /// Summary counts.
    pub summary: PreviewSummary,
}

/// Counts describing a preview run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreviewSummary {
    /// Size of the input in bytes.
    pub input_bytes: usize,
    /// Decoded image size.
    pub original: Dimensions,
    /// Size the preview was sampled at.
    pub working: Dimensions,
    /// Content area estimate in original pixels, if detected.
    pub content_area: Option<ContentArea>,
    /// Cells drawn.
    pub cell_count: usize,
    /// Border overlays drawn.
    pub overlay_count: usize,
}

impl PreviewDiagnostics {
    /// Format diagnostics as a human-readable report.
    #[must_use]
    pub fn report(&self) -> String {
        let total_ms = duration_ms(self.total);
        let mut lines = vec![
            format!("Preview Diagnostics\n{}", "=".repeat(48)),
            format!(
                "Image: {} ({} bytes) -> working {}",
                self.summary.original, self.summary.input_bytes, self.summary.working,
            ),
            format!("Total duration: {total_ms:.3}ms"),
            String::new(),
            format!("{:<16} {:>10} {:>9}", "Stage", "Duration", "% Total"),
            "-".repeat(48),
        ];

        let mut stages = vec![("Decode", self.decode), ("Downsample", self.downsample)];
        if let Some(detect) = self.detect {
            stages.push(("Detect", detect));
        }
        stages.push(("Sample", self.sample));

        for (name, duration) in stages {
            let ms = duration_ms(duration);
            let pct = if total_ms > 0.0 {
                ms / total_ms * 100.0
            } else {
                0.0
            };
            lines.push(format!("{name:<16} {ms:>8.3}ms {pct:>8.1}%"));
        }

        lines.push(String::new());
        lines.push(format!(
            "Cells: {}  |  Overlays: {}",
            self.summary.cell_count, self.summary.overlay_count,
        ));
        if let Some(area) = self.summary.content_area {
            lines.push(format!(
                "Content area: {}x{} at ({}, {})",
                area.width, area.height, area.x, area.y,
            ));
        }
        lines.join("\n")
    }
}

/// Convert a `Duration` to milliseconds as `f64`.
fn duration_ms(d: Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn sample_diagnostics(detect: Option<Duration>) -> PreviewDiagnostics {
        PreviewDiagnostics {
            decode: Duration::from_millis(4),
            downsample: Duration::from_millis(2),
            detect,
            sample: Duration::from_millis(3),
            total: Duration::from_millis(10),
            summary: PreviewSummary {
                input_bytes: 1234,
                original: Dimensions::new(400, 300),
                working: Dimensions::new(400, 300),
                content_area: None,
                cell_count: 17,
                overlay_count: 0,
            },
        }
    }

    #[test]
    fn report_lists_stages() {
        let report = sample_diagnostics(None).report();
        assert!(report.contains("Decode"));
        assert!(report.contains("Sample"));
        assert!(!report.contains("Detect"));
        assert!(report.contains("Cells: 17"));
    }

    #[test]
    fn report_includes_optional_detect_stage() {
        let report = sample_diagnostics(Some(Duration::from_millis(1))).report();
        assert!(report.contains("Detect"));
    }

    #[test]
    fn durations_serialize_as_seconds() {
        let json = serde_json::to_value(sample_diagnostics(None)).unwrap();
        assert!((json["total"].as_f64().unwrap() - 0.01).abs() < 1e-9);
        assert!(json["detect"].is_null());
        let back: PreviewDiagnostics = serde_json::from_value(json).unwrap();
        assert_eq!(back.decode, Duration::from_millis(4));
    }

    #[test]
    fn web_clock_is_monotonic() {
        let clock = WebClock;
        let start = clock.now();
        assert!(clock.elapsed(&start) >= Duration::ZERO);
    }
}

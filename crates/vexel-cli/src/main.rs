//! vexel: command-line front end for raster-to-SVG conversion.
//!
//! - `preview` runs the live-preview pipeline locally and prints
//!   per-stage diagnostics, optionally writing the preview SVG
//! - `detect` measures the content area at full resolution
//! - `convert` uploads an image to a conversion server and writes the
//!   canonical SVG it returns
//!
//! # Usage
//!
//! ```text
//! cargo run --release --bin vexel -- preview --remove-border scan.png
//! cargo run --release --bin vexel -- convert --detect-border -o out.svg scan.png
//! ```

#![allow(clippy::print_stdout, clippy::print_stderr)]

mod backend;

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::{Duration, Instant};

use clap::{Args, Parser, Subcommand, ValueEnum};
use tracing::info;
use tracing_subscriber::EnvFilter;

use vexel_pipeline::border::PRECISE_THRESHOLD;
use vexel_pipeline::content_area::detect_content_area;
use vexel_pipeline::diagnostics::{Clock, PreviewDiagnostics};
use vexel_pipeline::{
    CancellationToken, ContentArea, ConversionOptions, PreviewSettings, Quality, SvgColor,
    TargetSize,
};

use crate::backend::{BackendConfig, Upload};

/// Raster-to-SVG conversion and live-preview diagnostics.
#[derive(Parser)]
#[command(name = "vexel", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the live preview locally and print diagnostics.
    Preview(PreviewArgs),
    /// Print the full-resolution content area as JSON.
    Detect(DetectArgs),
    /// Convert an image on a vexel server.
    Convert(ConvertArgs),
}

/// Options shared by every subcommand that shapes a conversion.
#[derive(Args)]
struct OptionArgs {
    /// Crop away the background border before tracing.
    #[arg(long)]
    remove_border: bool,

    /// Fill and stroke color, e.g. `#336699` or `navy`.
    #[arg(long)]
    color: Option<String>,
}

impl OptionArgs {
    fn to_options(&self, size: Size, quality: Tier) -> Result<ConversionOptions, String> {
        let color = self
            .color
            .as_deref()
            .map(SvgColor::parse)
            .transpose()
            .map_err(|e| e.to_string())?;
        Ok(ConversionOptions {
            remove_border: self.remove_border,
            color,
            target_size: size.into(),
            quality: quality.into(),
        })
    }
}

#[derive(Args)]
struct PreviewArgs {
    /// Path to the input image (PNG, JPEG, BMP, WebP).
    image_path: PathBuf,

    #[command(flatten)]
    options: OptionArgs,

    /// Use the coarse grid meant for memory-constrained devices.
    #[arg(long)]
    constrained: bool,

    /// Override the working resolution (longer edge in pixels).
    #[arg(long, value_parser = clap::builder::RangedU64ValueParser::<u32>::new().range(1..))]
    max_dimension: Option<u32>,

    /// Write the preview SVG to this file.
    #[arg(long)]
    svg: Option<PathBuf>,

    /// Number of runs for averaging.
    #[arg(long, default_value_t = 1, value_parser = clap::builder::RangedU64ValueParser::<usize>::new().range(1..))]
    runs: usize,

    /// Output diagnostics as JSON instead of a human-readable report.
    #[arg(long)]
    json: bool,
}

#[derive(Args)]
struct DetectArgs {
    /// Path to the input image.
    image_path: PathBuf,

    /// Brightness at or above which a pixel counts as background.
    #[arg(long, default_value_t = PRECISE_THRESHOLD)]
    threshold: f64,
}

#[derive(Args)]
struct ConvertArgs {
    /// Path to the input image.
    image_path: PathBuf,

    #[command(flatten)]
    options: OptionArgs,

    /// Resize tier applied before tracing.
    #[arg(long, value_enum, default_value_t = Size::Auto)]
    size: Size,

    /// Tracing quality tier.
    #[arg(long, value_enum, default_value_t = Tier::Standard)]
    quality: Tier,

    /// Measure the content area locally at full resolution and send it
    /// with the upload (implies --remove-border).
    #[arg(long)]
    detect_border: bool,

    /// Server base URL. Tried before the default local candidates.
    #[arg(long, env = "VEXEL_BACKEND_URL")]
    backend: Option<String>,

    /// Write the SVG here instead of stdout.
    #[arg(short, long)]
    output: Option<PathBuf>,
}

#[derive(Clone, Copy, ValueEnum)]
enum Size {
    Auto,
    Small,
    Medium,
    Large,
}

impl From<Size> for TargetSize {
    fn from(size: Size) -> Self {
        match size {
            Size::Auto => Self::Auto,
            Size::Small => Self::Small,
            Size::Medium => Self::Medium,
            Size::Large => Self::Large,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum Tier {
    Standard,
    High,
}

impl From<Tier> for Quality {
    fn from(tier: Tier) -> Self {
        match tier {
            Tier::Standard => Self::Standard,
            Tier::High => Self::High,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let result = match cli.command {
        Command::Preview(args) => run_preview(&args),
        Command::Detect(args) => run_detect(&args),
        Command::Convert(args) => run_convert(args).await,
    };
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(msg) => {
            eprintln!("{msg}");
            ExitCode::FAILURE
        }
    }
}

fn read_image(path: &Path) -> Result<Vec<u8>, String> {
    std::fs::read(path).map_err(|e| format!("Error reading {}: {e}", path.display()))
}

/// Decode `path` at full resolution and measure its content area.
fn full_resolution_area(path: &Path, threshold: f64) -> Result<ContentArea, String> {
    let bytes = read_image(path)?;
    let decoded = vexel_pipeline::decode::decode(&bytes).map_err(|e| e.to_string())?;
    Ok(detect_content_area(&decoded.to_pixel_buffer(), threshold))
}

fn run_detect(args: &DetectArgs) -> Result<(), String> {
    let area = full_resolution_area(&args.image_path, args.threshold)?;
    let json = serde_json::to_string_pretty(&area).map_err(|e| e.to_string())?;
    println!("{json}");
    Ok(())
}

fn run_preview(args: &PreviewArgs) -> Result<(), String> {
    let options = args.options.to_options(Size::Auto, Tier::Standard)?;
    let mut settings = if args.constrained {
        PreviewSettings::constrained()
    } else {
        PreviewSettings::default()
    };
    if let Some(max_dimension) = args.max_dimension {
        settings.max_dimension = max_dimension;
    }

    let image_bytes = read_image(&args.image_path)?;
    eprintln!(
        "Image: {} ({} bytes)",
        args.image_path.display(),
        image_bytes.len(),
    );
    eprintln!("Options: {options:?}");
    eprintln!("Settings: {settings:?}");
    eprintln!("Runs: {}", args.runs);
    eprintln!();

    let token = CancellationToken::new();
    let mut all_diagnostics = Vec::with_capacity(args.runs);

    for run in 0..args.runs {
        if args.runs > 1 {
            eprintln!("--- Run {}/{} ---", run + 1, args.runs);
        }

        let staged =
            vexel_pipeline::preview_staged(&image_bytes, &options, settings, &token, &StdClock)
                .map_err(|e| format!("Preview error: {e}"))?;

        if args.json {
            let json = serde_json::to_string_pretty(&staged.diagnostics)
                .map_err(|e| format!("Error serializing diagnostics: {e}"))?;
            println!("{json}");
        } else {
            println!("{}", staged.diagnostics.report());
        }

        // Write SVG on the first run only.
        if run == 0
            && let Some(ref svg_path) = args.svg
        {
            let title = args
                .image_path
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or("preview");
            let desc = format!("{options:?}");
            let metadata = vexel_export::SvgMetadata {
                title: Some(title),
                description: Some(&desc),
            };
            let svg = vexel_export::to_preview_svg(&staged.frame, &metadata);
            match std::fs::write(svg_path, &svg) {
                Ok(()) => eprintln!("SVG written to {} ({} bytes)", svg_path.display(), svg.len()),
                Err(e) => eprintln!("Error writing SVG to {}: {e}", svg_path.display()),
            }
        }

        all_diagnostics.push(staged.diagnostics);

        if args.runs > 1 {
            eprintln!();
        }
    }

    if args.runs > 1 {
        print_multi_run_summary(&all_diagnostics);
    }
    Ok(())
}

async fn run_convert(args: ConvertArgs) -> Result<(), String> {
    let mut options = args.options.to_options(args.size, args.quality)?;
    let content_area = if args.detect_border {
        options.remove_border = true;
        let area = full_resolution_area(&args.image_path, PRECISE_THRESHOLD)?;
        info!(?area, "measured content area");
        Some(area)
    } else {
        None
    };

    let upload = Upload {
        bytes: read_image(&args.image_path)?,
        path: &args.image_path,
        options: &options,
        content_area,
    };
    let client = reqwest::Client::new();
    let mut backend = BackendConfig::new(args.backend.as_deref());

    let started = Instant::now();
    let svg = backend::convert(&mut backend, &client, &upload)
        .await
        .map_err(|e| e.to_string())?;
    info!(
        svg_bytes = svg.len(),
        elapsed_ms = started.elapsed().as_millis(),
        "converted"
    );

    match &args.output {
        Some(path) => std::fs::write(path, &svg)
            .map_err(|e| format!("Error writing SVG to {}: {e}", path.display()))?,
        None => println!("{svg}"),
    }
    Ok(())
}

/// [`Clock`] implementation backed by [`std::time::Instant`].
struct StdClock;

impl Clock for StdClock {
    type Instant = Instant;

    fn now(&self) -> Instant {
        Instant::now()
    }

    fn elapsed(&self, since: &Instant) -> Duration {
        since.elapsed()
    }
}

/// Function pointer type for extracting a stage duration from diagnostics.
type StageExtractor = fn(&PreviewDiagnostics) -> Option<Duration>;

/// Print aggregated statistics across multiple runs.
#[allow(clippy::cast_precision_loss)]
fn print_multi_run_summary(all_diagnostics: &[PreviewDiagnostics]) {
    println!();
    println!(
        "Summary ({} runs)\n{}",
        all_diagnostics.len(),
        "=".repeat(48),
    );

    if all_diagnostics.is_empty() {
        println!("Warning: no diagnostics to summarize");
        return;
    }

    let durations: Vec<f64> = all_diagnostics
        .iter()
        .map(|d| d.total.as_secs_f64() * 1000.0)
        .collect();

    let min = durations.iter().copied().reduce(f64::min).unwrap_or(0.0);
    let max = durations.iter().copied().reduce(f64::max).unwrap_or(0.0);
    let mean = durations.iter().sum::<f64>() / durations.len() as f64;

    println!("Total duration: min={min:.3}ms  mean={mean:.3}ms  max={max:.3}ms");

    println!();
    println!("{:<16} {:>12}", "Stage", "Mean (ms)");
    println!("{}", "-".repeat(30));

    let stage_extractors: &[(&str, StageExtractor)] = &[
        ("Decode", |d| Some(d.decode)),
        ("Downsample", |d| Some(d.downsample)),
        ("Detect", |d| d.detect),
        ("Sample", |d| Some(d.sample)),
    ];

    for (name, extractor) in stage_extractors {
        let stage_durations: Vec<f64> = all_diagnostics
            .iter()
            .filter_map(extractor)
            .map(|dur| dur.as_secs_f64() * 1000.0)
            .collect();

        if stage_durations.is_empty() {
            continue;
        }

        let stage_mean = stage_durations.iter().sum::<f64>() / stage_durations.len() as f64;
        println!("{name:<16} {stage_mean:>10.3}ms");
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn convert_flags_become_options() {
        let cli = Cli::try_parse_from([
            "vexel",
            "convert",
            "scan.png",
            "--remove-border",
            "--color",
            "#336699",
            "--size",
            "large",
            "--quality",
            "high",
        ])
        .unwrap();
        let Command::Convert(args) = cli.command else {
            unreachable!("parsed a different subcommand");
        };
        let options = args.options.to_options(args.size, args.quality).unwrap();
        assert!(options.remove_border);
        assert_eq!(options.fill_color(), "#336699");
        assert_eq!(options.target_size, TargetSize::Large);
        assert_eq!(options.quality, Quality::High);
    }

    #[test]
    fn unsafe_color_is_rejected() {
        let args = OptionArgs {
            remove_border: false,
            color: Some("\"><script>".into()),
        };
        assert!(args.to_options(Size::Auto, Tier::Standard).is_err());
    }

    #[test]
    fn detect_defaults_to_precise_threshold() {
        let cli = Cli::try_parse_from(["vexel", "detect", "scan.png"]).unwrap();
        let Command::Detect(args) = cli.command else {
            unreachable!("parsed a different subcommand");
        };
        assert!((args.threshold - PRECISE_THRESHOLD).abs() < f64::EPSILON);
    }
}

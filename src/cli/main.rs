//! Passport photo CLI tool
//!
//! Turns one portrait into an exact-size passport or visa photo using the
//! same controller a graphical frontend would drive.

use super::config::CliConfigBuilder;
use crate::{
    config::{
        BackgroundColor, ExportFormat, PhotoStandard, PipelineConfig, OUTPUT_SPECS, PRINT_DPI,
    },
    controller::PipelineController,
    crop::CropOffset,
    segmentation::{MaskFileBackend, SegmentationBackend, UnavailableBackend},
    services::{ImageIOService, PipelineTimings, ProcessingStage, ProgressReporter, ProgressUpdate},
    tracing_config::{init_cli_tracing, spans, TracingFormat},
};
use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn, Instrument};

/// Passport and visa photo maker
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(name = "passport-photo")]
pub struct Cli {
    /// Portrait photo to convert (JPEG or PNG)
    #[arg(value_name = "INPUT", required_unless_present_any = ["list_standards", "list_colors"])]
    pub input: Option<PathBuf>,

    /// Output file or directory [default: current directory]
    #[arg(short, long, value_name = "OUTPUT")]
    pub output: Option<PathBuf>,

    /// Grayscale foreground mask produced by a segmentation tool
    #[arg(short, long, value_name = "PATH")]
    pub mask: Option<PathBuf>,

    /// Photo standard [default: schengen]
    #[arg(short, long, value_enum)]
    pub standard: Option<CliStandard>,

    /// Background color: palette name (see --list-colors) or #RRGGBB
    #[arg(short, long, value_name = "NAME|HEX")]
    pub background: Option<String>,

    /// Zoom factor within the configured bounds [default: 1.0]
    #[arg(short, long)]
    pub zoom: Option<f64>,

    /// Horizontal pan of the crop center from the photo center, in pixels
    #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
    pub offset_x: f64,

    /// Vertical pan of the crop center from the photo center, in pixels
    #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
    pub offset_y: f64,

    /// Gaussian feather radius for the mask edge, in pixels [default: 0]
    #[arg(long)]
    pub feather: Option<f32>,

    /// Output format when OUTPUT is a directory [default: jpeg]; a file
    /// name's .jpg, .jpeg or .png extension takes precedence
    #[arg(short, long, value_enum)]
    pub format: Option<CliExportFormat>,

    /// JPEG quality (1-100) [default: 100]
    #[arg(short, long)]
    pub quality: Option<u8>,

    /// JSON configuration file; command-line flags override its values
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Seconds to wait for the segmentation mask before falling back
    #[arg(long, value_name = "SECS")]
    pub segmentation_timeout: Option<u64>,

    /// List supported photo standards and exit
    #[arg(long)]
    pub list_standards: bool,

    /// List the background color palette and exit
    #[arg(long)]
    pub list_colors: bool,

    /// Enable verbose logging (-v: INFO, -vv: DEBUG, -vvv: TRACE)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum, Debug)]
pub enum CliStandard {
    /// 35×45 mm
    Schengen,
    /// 2×2 in
    Us,
}

impl From<CliStandard> for PhotoStandard {
    fn from(standard: CliStandard) -> Self {
        match standard {
            CliStandard::Schengen => PhotoStandard::Schengen,
            CliStandard::Us => PhotoStandard::Us,
        }
    }
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum, Debug)]
pub enum CliExportFormat {
    Jpeg,
    Png,
}

impl From<CliExportFormat> for ExportFormat {
    fn from(format: CliExportFormat) -> Self {
        match format {
            CliExportFormat::Jpeg => ExportFormat::Jpeg,
            CliExportFormat::Png => ExportFormat::Png,
        }
    }
}

/// Spinner frontend for pipeline progress
struct SpinnerProgressReporter {
    bar: ProgressBar,
}

impl SpinnerProgressReporter {
    fn new() -> Result<Self> {
        let bar = ProgressBar::new_spinner();
        bar.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.green} [{elapsed_precise}] {msg}")
                .context("Invalid spinner template")?,
        );
        bar.enable_steady_tick(Duration::from_millis(100));
        Ok(Self { bar })
    }
}

impl ProgressReporter for SpinnerProgressReporter {
    fn report_progress(&self, update: ProgressUpdate) {
        self.bar
            .set_message(format!("[{}%] {}", update.progress, update.description));
    }

    fn report_completion(&self, timings: &PipelineTimings) {
        debug!(
            segmentation_ms = timings.segmentation_ms,
            compositing_ms = timings.compositing_ms,
            rendering_ms = timings.rendering_ms,
            total_ms = timings.total_ms,
            "pipeline timings"
        );
    }

    fn report_error(&self, stage: ProcessingStage, error: &str) {
        self.bar
            .println(format!("warning during {}: {}", stage.description(), error));
    }
}

impl Drop for SpinnerProgressReporter {
    fn drop(&mut self) {
        self.bar.finish_and_clear();
    }
}

pub async fn main() -> Result<()> {
    let cli = Cli::parse();

    let session_id =
        init_cli_tracing(cli.verbose, TracingFormat::Console).context("Failed to initialize tracing")?;

    if cli.list_standards {
        print_standards();
        return Ok(());
    }
    if cli.list_colors {
        print_colors();
        return Ok(());
    }

    CliConfigBuilder::validate_cli(&cli).context("Invalid CLI arguments")?;
    let config = CliConfigBuilder::from_cli(&cli).context("Failed to build configuration")?;

    let input = cli
        .input
        .clone()
        .context("An input photo is required")?;
    let standard_id = config.standard.spec().id;
    let path = run(&cli, &input, config)
        .instrument(spans::file_processing(&input))
        .instrument(spans::session(&session_id, standard_id))
        .await?;
    println!("{}", path.display());
    Ok(())
}

async fn run(cli: &Cli, input: &Path, config: PipelineConfig) -> Result<PathBuf> {
    let source = ImageIOService::load_bitmap(input)
        .with_context(|| format!("Failed to load photo '{}'", input.display()))?;
    info!(
        width = source.width(),
        height = source.height(),
        "loaded photo"
    );

    let mut controller = PipelineController::new(config)
        .context("Invalid pipeline configuration")?
        .with_progress_reporter(Box::new(SpinnerProgressReporter::new()?));

    let backend: Arc<dyn SegmentationBackend> = match &cli.mask {
        Some(mask) => Arc::new(MaskFileBackend::new(mask.clone())),
        None => Arc::new(UnavailableBackend::new(
            "no mask given (use --mask), keeping the original background",
        )),
    };
    let service = controller.segmentation_service(backend);
    controller
        .upload_and_segment(source, &service)
        .await
        .context("Failed to prepare the composite")?;

    if let Some(reason) = controller.segmentation_fallback() {
        warn!(reason = %reason, "background was not replaced");
    }

    if let Some(zoom) = cli.zoom {
        controller.set_zoom(zoom);
    }
    if cli.offset_x != 0.0 || cli.offset_y != 0.0 {
        controller.set_offset(CropOffset::new(cli.offset_x, cli.offset_y));
    }
    if let Some(rect) = controller.crop_rectangle() {
        debug!(?rect, "final crop");
    }

    controller
        .export_availability()
        .context("The photo cannot be exported")?;

    let destination = cli.output.clone().unwrap_or_else(|| PathBuf::from("."));
    let path = controller
        .export_to(&destination)
        .with_context(|| format!("Failed to write photo to '{}'", destination.display()))?;
    Ok(path)
}

fn print_standards() {
    println!("Supported photo standards ({} DPI):", PRINT_DPI);
    for spec in OUTPUT_SPECS {
        let (w_mm, h_mm) = spec.physical_size_mm();
        println!(
            "  {:<10} {:>5}x{:<5} px  {:.0}x{:.0} mm  {}",
            spec.id, spec.width_px, spec.height_px, w_mm, h_mm, spec.label
        );
    }
}

fn print_colors() {
    println!("Background palette:");
    for (name, color) in BackgroundColor::PALETTE {
        println!("  {:<12} {}", name, color.to_hex());
    }
    println!("Any #RRGGBB value is accepted as well.");
}

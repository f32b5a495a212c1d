#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::uninlined_format_args)]

//! # Passport Photo Pipeline
//!
//! Turns a portrait photo plus a foreground mask into a passport or visa
//! photo of an exact print size: the background is replaced with a flat
//! color, the face is framed under the standard's aspect ratio, and the crop
//! is resampled to the standard's pixel dimensions at 600 DPI.
//!
//! ## Features
//!
//! - **Mask feathering**: separable Gaussian blur of the mask edge, radius in pixels
//! - **Compositing**: flattens the photo onto any RGB color, always opaque
//! - **Aspect-locked cropping**: pan and zoom that can never leave the photo
//! - **Exact-size rendering**: Schengen 827×1063 and US 1181×1181 pixels
//! - **Session controller**: upload, segmentation with timeout and fallback,
//!   interactive adjustment, export, superseded-render rejection
//! - **CLI Integration**: Optional command-line interface (enable with `cli` feature)
//!
//! Computing the mask itself is left to an external collaborator plugged in
//! through [`SegmentationBackend`].
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use passport_photo::{
//!     BackgroundColor, ImageIOService, MaskFileBackend, PhotoStandard, PipelineConfig,
//!     PipelineController,
//! };
//! use std::sync::Arc;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = PipelineConfig::builder()
//!     .standard(PhotoStandard::Us)
//!     .background(BackgroundColor::OFF_WHITE)
//!     .feather_radius(2.0)
//!     .build()?;
//! let mut controller = PipelineController::new(config)?;
//!
//! let photo = ImageIOService::load_bitmap("portrait.jpg")?;
//! let service = controller.segmentation_service(Arc::new(MaskFileBackend::new("portrait-mask.png")));
//! controller.upload_and_segment(photo, &service).await?;
//!
//! controller.set_zoom(1.4);
//! controller.pan_by(0.0, -30.0);
//! let written = controller.export_to("out/")?;
//! println!("saved {}", written.display());
//! # Ok(())
//! # }
//! ```
//!
//! ## Building blocks
//!
//! Every stage is also available as a pure function:
//!
//! ```rust
//! use passport_photo::{
//!     composite, compute_crop_rectangle, feather, render, BackgroundColor, Bitmap, CropOffset,
//!     Mask, US,
//! };
//!
//! # fn main() -> passport_photo::Result<()> {
//! let photo = Bitmap::filled(400, 300, BackgroundColor::BLACK)?;
//! let mask = feather(&Mask::opaque(400, 300), 0.0)?;
//! let flattened = composite(&photo, &mask, BackgroundColor::WHITE)?;
//! let crop = compute_crop_rectangle(400, 300, CropOffset::CENTER, 1.0, US.aspect_ratio())?;
//! let image = render(&flattened, Some(&crop), &US)?;
//! assert_eq!(image.dimensions(), (1181, 1181));
//! # Ok(())
//! # }
//! ```
//!
//! ### Feature Flags
//!
//! - `cli` (default): Command-line interface, spinner and tracing subscriber
//! - `tracing-json`: JSON log output for the CLI

#[cfg(feature = "cli")]
pub mod cli;
pub mod compositor;
pub mod config;
pub mod controller;
pub mod crop;
pub mod error;
pub mod feather;
pub mod renderer;
pub mod segmentation;
pub mod services;
#[cfg(feature = "cli")]
pub mod tracing_config;
pub mod types;

// Public API exports
pub use compositor::composite;
pub use config::{
    BackgroundColor, ExportFormat, OutputSpec, PhotoStandard, PipelineConfig,
    PipelineConfigBuilder, ZoomBounds, OUTPUT_SPECS, PRINT_DPI, SCHENGEN, US,
};
pub use controller::{PipelineController, PipelineState, RenderJob, RenderedFrame, UploadTicket};
pub use crop::{compute_crop_rectangle, CropGeometry, CropOffset, CropRectangle};
pub use error::{PhotoError, Result};
pub use feather::feather;
pub use renderer::{render, sample_bilinear};
pub use segmentation::{
    MaskFileBackend, SegmentationBackend, SegmentationOutcome, SegmentationService,
    StaticMaskBackend, UnavailableBackend,
};
pub use services::{
    ImageIOService, NoOpProgressReporter, PipelineTimings, ProcessingStage, ProgressReporter,
    ProgressTracker, ProgressUpdate,
};
pub use types::{Bitmap, CompositeImage, FeatheredMask, FinalImage, Mask};

#[cfg(feature = "cli")]
pub use tracing_config::{init_cli_tracing, TracingConfig, TracingFormat};

/// Make a passport photo in one call
///
/// Runs segmentation through `backend` (falling back to the whole photo when
/// it fails), applies `zoom` and `offset`, and renders at the configured
/// standard.
///
/// # Examples
///
/// ```rust,no_run
/// use passport_photo::{make_passport_photo, CropOffset, ImageIOService, PipelineConfig, UnavailableBackend};
/// use std::sync::Arc;
///
/// # async fn example() -> anyhow::Result<()> {
/// let photo = ImageIOService::load_bitmap("portrait.png")?;
/// let image = make_passport_photo(
///     photo,
///     Arc::new(UnavailableBackend::default()),
///     PipelineConfig::default(),
///     1.0,
///     CropOffset::CENTER,
/// )
/// .await?;
/// assert_eq!(image.dimensions(), (827, 1063));
/// # Ok(())
/// # }
/// ```
pub async fn make_passport_photo(
    source: Bitmap,
    backend: std::sync::Arc<dyn SegmentationBackend>,
    config: PipelineConfig,
    zoom: f64,
    offset: CropOffset,
) -> Result<FinalImage> {
    let mut controller = PipelineController::new(config)?;
    let service = controller.segmentation_service(backend);
    controller.upload_and_segment(source, &service).await?;
    controller.set_zoom(zoom);
    controller.set_offset(offset);
    controller.export()
}

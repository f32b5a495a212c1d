//! Photo session controller
//!
//! `PipelineController` owns one photo at a time and moves it through
//! `Empty → MaskPending → Ready → Exporting → Ready`. Waiting for the
//! segmentation collaborator is the only suspension point; everything else
//! runs synchronously on the caller's thread.
//!
//! Renders can be moved off the caller's thread with [`RenderJob`]. Every
//! input that changes what a render would produce bumps a render epoch, and
//! only a frame carrying the current epoch is ever accepted, so a superseded
//! render is dropped instead of racing into the visible state.

use crate::{
    compositor::composite,
    config::{BackgroundColor, OutputSpec, PhotoStandard, PipelineConfig},
    crop::{CropGeometry, CropOffset, CropRectangle},
    error::{PhotoError, Result},
    feather::feather,
    renderer::render,
    segmentation::{SegmentationBackend, SegmentationOutcome, SegmentationService},
    services::{
        ImageIOService, PipelineTimings, ProcessingStage, ProgressReporter, ProgressTracker,
    },
    types::{Bitmap, CompositeImage, FeatheredMask, FinalImage, Mask},
};
use instant::Instant;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, span, warn, Level};

/// Lifecycle state of a photo session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    /// No photo uploaded
    Empty,
    /// Photo uploaded, waiting for the segmentation mask
    MaskPending,
    /// Composite available; background, standard and crop may change
    Ready,
    /// A synchronous export is rendering
    Exporting,
}

impl std::fmt::Display for PipelineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            PipelineState::Empty => "empty",
            PipelineState::MaskPending => "mask pending",
            PipelineState::Ready => "ready",
            PipelineState::Exporting => "exporting",
        };
        f.write_str(name)
    }
}

/// Handle returned by [`PipelineController::upload`]
///
/// A segmentation result is only applied when handed back with the ticket of
/// the most recent upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadTicket {
    generation: u64,
}

impl UploadTicket {
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

/// Everything derived from one uploaded photo
#[derive(Debug)]
struct Session {
    source: Arc<Bitmap>,
    feathered: Option<FeatheredMask>,
    composite: Option<Arc<CompositeImage>>,
    crop: Option<CropGeometry>,
    fallback: Option<PhotoError>,
    retry_used: bool,
}

impl Session {
    fn new(source: Bitmap) -> Self {
        Self {
            source: Arc::new(source),
            feathered: None,
            composite: None,
            crop: None,
            fallback: None,
            retry_used: false,
        }
    }
}

/// Snapshot of the inputs of one render, safe to move to another thread
#[derive(Debug)]
pub struct RenderJob {
    epoch: u64,
    composite: Arc<CompositeImage>,
    crop: CropRectangle,
    spec: OutputSpec,
}

impl RenderJob {
    #[must_use]
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Render on the current thread
    ///
    /// # Errors
    /// Propagates renderer failures.
    pub fn run(self) -> Result<RenderedFrame> {
        let image = render(&self.composite, Some(&self.crop), &self.spec)?;
        Ok(RenderedFrame {
            epoch: self.epoch,
            image,
        })
    }

    /// Render on tokio's blocking pool
    ///
    /// Must be called from within a tokio runtime.
    #[must_use]
    pub fn spawn(self) -> JoinHandle<Result<RenderedFrame>> {
        tokio::task::spawn_blocking(move || self.run())
    }
}

/// Output of a [`RenderJob`], to be handed to [`PipelineController::accept_render`]
#[derive(Debug)]
pub struct RenderedFrame {
    epoch: u64,
    image: FinalImage,
}

impl RenderedFrame {
    #[must_use]
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    #[must_use]
    pub fn image(&self) -> &FinalImage {
        &self.image
    }
}

/// Orchestrates segmentation, feathering, compositing, cropping and export
/// for a single photo session
pub struct PipelineController {
    config: PipelineConfig,
    state: PipelineState,
    generation: u64,
    render_epoch: u64,
    background: BackgroundColor,
    spec: OutputSpec,
    session: Option<Session>,
    progress: ProgressTracker,
    timings: PipelineTimings,
}

impl PipelineController {
    /// Create a controller in the `Empty` state
    ///
    /// # Errors
    /// Returns `InvalidConfig` when the configuration fails validation.
    pub fn new(config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            background: config.background,
            spec: *config.standard.spec(),
            config,
            state: PipelineState::Empty,
            generation: 0,
            render_epoch: 0,
            session: None,
            progress: ProgressTracker::no_op(),
            timings: PipelineTimings::default(),
        })
    }

    /// Report stages to `reporter`
    #[must_use]
    pub fn with_progress_reporter(mut self, reporter: Box<dyn ProgressReporter>) -> Self {
        self.progress = ProgressTracker::new(reporter);
        self
    }

    /// Wrap a segmentation backend with this session's configured timeout
    pub fn segmentation_service(&self, backend: Arc<dyn SegmentationBackend>) -> SegmentationService {
        SegmentationService::new(backend, self.config.segmentation_timeout())
    }

    #[must_use]
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    #[must_use]
    pub fn state(&self) -> PipelineState {
        self.state
    }

    /// Background color used for the next composite
    #[must_use]
    pub fn background(&self) -> BackgroundColor {
        self.background
    }

    /// Output standard used for the next export
    #[must_use]
    pub fn output_spec(&self) -> &OutputSpec {
        &self.spec
    }

    /// Uploaded photo, if any
    #[must_use]
    pub fn source(&self) -> Option<&Bitmap> {
        self.session.as_ref().map(|s| s.source.as_ref())
    }

    /// Current composite; `None` until segmentation completes
    #[must_use]
    pub fn composite(&self) -> Option<&CompositeImage> {
        self.session
            .as_ref()
            .and_then(|s| s.composite.as_deref())
    }

    /// Feathered mask used for the current composite
    #[must_use]
    pub fn feathered_mask(&self) -> Option<&FeatheredMask> {
        self.session.as_ref().and_then(|s| s.feathered.as_ref())
    }

    /// Current crop rectangle, if one fits the photo
    #[must_use]
    pub fn crop_rectangle(&self) -> Option<CropRectangle> {
        self.crop().and_then(CropGeometry::rectangle_opt)
    }

    /// Current zoom; `None` until a crop exists
    #[must_use]
    pub fn zoom(&self) -> Option<f64> {
        self.crop().map(CropGeometry::zoom)
    }

    /// Current pan offset; `None` until a crop exists
    #[must_use]
    pub fn offset(&self) -> Option<CropOffset> {
        self.crop().map(CropGeometry::offset)
    }

    /// Why the collaborator's mask was replaced by the all-opaque fallback
    #[must_use]
    pub fn segmentation_fallback(&self) -> Option<&PhotoError> {
        self.session.as_ref().and_then(|s| s.fallback.as_ref())
    }

    /// Epoch a render prepared now would carry
    #[must_use]
    pub fn render_epoch(&self) -> u64 {
        self.render_epoch
    }

    #[must_use]
    pub fn timings(&self) -> &PipelineTimings {
        &self.timings
    }

    fn crop(&self) -> Option<&CropGeometry> {
        self.session.as_ref().and_then(|s| s.crop.as_ref())
    }

    fn crop_mut(&mut self) -> Option<&mut CropGeometry> {
        if self.state != PipelineState::Ready {
            return None;
        }
        self.session.as_mut().and_then(|s| s.crop.as_mut())
    }

    fn bump_epoch(&mut self) {
        self.render_epoch = self.render_epoch.wrapping_add(1);
    }

    /// Start a new session with `source`, discarding everything derived from
    /// the previous photo
    #[instrument(skip(self, source), fields(width = source.width(), height = source.height()))]
    pub fn upload(&mut self, source: Bitmap) -> UploadTicket {
        self.generation += 1;
        self.bump_epoch();
        self.session = Some(Session::new(source));
        self.state = PipelineState::MaskPending;
        self.timings = PipelineTimings::default();

        self.progress.restart();
        self.progress.report_stage(ProcessingStage::Upload);
        info!(generation = self.generation, "photo uploaded, waiting for mask");

        UploadTicket {
            generation: self.generation,
        }
    }

    /// Apply the segmentation collaborator's answer for `ticket`
    ///
    /// Returns `Ok(false)` when the ticket is stale or the answer was already
    /// applied. A failed answer, or a mask whose size differs from the photo,
    /// is replaced by an all-opaque mask.
    ///
    /// # Errors
    /// Propagates feathering and compositing failures; the session stays in
    /// `MaskPending`.
    pub fn complete_segmentation(
        &mut self,
        ticket: UploadTicket,
        result: Result<Mask>,
    ) -> Result<bool> {
        let Some(dimensions) = self.session.as_ref().map(|s| s.source.dimensions()) else {
            return Ok(false);
        };
        self.apply_outcome(ticket, SegmentationOutcome::from_result(result, dimensions, 0))
    }

    #[instrument(skip(self, outcome), fields(generation = ticket.generation))]
    fn apply_outcome(&mut self, ticket: UploadTicket, outcome: SegmentationOutcome) -> Result<bool> {
        if ticket.generation != self.generation
            || self.state != PipelineState::MaskPending
            || self.session.is_none()
        {
            debug!(
                current = self.generation,
                state = %self.state,
                "ignoring segmentation result for a superseded upload"
            );
            return Ok(false);
        }

        let SegmentationOutcome {
            mask,
            fallback_reason,
            ..
        } = outcome;
        if let Some(ref err) = fallback_reason {
            warn!(error = %err, "using all-opaque mask");
            self.progress.report_error(&err.to_string());
        }

        self.install_mask(&mask)?;
        if let Some(session) = self.session.as_mut() {
            session.fallback = fallback_reason;
            let (width, height) = session.source.dimensions();
            session.crop = Some(CropGeometry::new(
                width,
                height,
                self.spec,
                self.config.zoom_bounds,
                self.config.min_crop_side_px,
            ));
        }

        self.progress.report_stage(ProcessingStage::Cropping);
        self.state = PipelineState::Ready;
        self.bump_epoch();
        Ok(true)
    }

    /// Upload `source`, wait for `service` and apply its answer
    ///
    /// # Errors
    /// Propagates feathering and compositing failures.
    pub async fn upload_and_segment(
        &mut self,
        source: Bitmap,
        service: &SegmentationService,
    ) -> Result<UploadTicket> {
        let ticket = self.upload(source);
        let source = self.session_source()?;

        self.progress.report_stage(ProcessingStage::Segmentation);
        let outcome = service.segment_or_fallback(&source).await;
        self.timings.segmentation_ms = outcome.elapsed_ms;

        self.apply_outcome(ticket, outcome)?;
        Ok(ticket)
    }

    /// Ask the collaborator again after a fallback
    ///
    /// Allowed once per upload. Returns whether the new mask replaced the
    /// fallback; crop, background and standard are kept either way.
    ///
    /// # Errors
    /// - `InvalidConfig` when no fallback is active or the retry was used
    /// - Feathering and compositing failures
    #[instrument(skip(self, service), fields(backend = service.backend_name()))]
    pub async fn retry_segmentation(&mut self, service: &SegmentationService) -> Result<bool> {
        let allowed = self.state == PipelineState::Ready
            && self
                .session
                .as_ref()
                .is_some_and(|s| s.fallback.is_some() && !s.retry_used);
        if !allowed {
            return Err(PhotoError::invalid_config(
                "segmentation can only be retried once, after the collaborator failed",
            ));
        }

        if let Some(session) = self.session.as_mut() {
            session.retry_used = true;
        }
        let source = self.session_source()?;

        self.progress.report_stage(ProcessingStage::Segmentation);
        let result = service.segment(&source).await;

        match result {
            Ok(mask) => {
                self.install_mask(&mask)?;
                if let Some(session) = self.session.as_mut() {
                    session.fallback = None;
                }
                self.bump_epoch();
                info!("segmentation retry succeeded");
                Ok(true)
            },
            Err(e) => {
                warn!(error = %e, "segmentation retry failed, keeping all-opaque mask");
                if let Some(session) = self.session.as_mut() {
                    session.fallback = Some(e);
                }
                Ok(false)
            },
        }
    }

    fn session_source(&self) -> Result<Arc<Bitmap>> {
        self.session
            .as_ref()
            .map(|s| Arc::clone(&s.source))
            .ok_or_else(|| PhotoError::not_ready("no photo uploaded"))
    }

    /// Feather `mask` and rebuild the composite from it
    fn install_mask(&mut self, mask: &Mask) -> Result<()> {
        let feathered = {
            let _span = span!(Level::DEBUG, "feathering", radius = self.config.feather_radius)
                .entered();
            self.progress.report_stage(ProcessingStage::Feathering);
            feather(mask, self.config.feather_radius)?
        };
        if let Some(session) = self.session.as_mut() {
            session.feathered = Some(feathered);
        }
        self.rebuild_composite()
    }

    fn rebuild_composite(&mut self) -> Result<()> {
        let background = self.background;
        let Some(session) = self.session.as_mut() else {
            return Ok(());
        };
        let Some(feathered) = session.feathered.as_ref() else {
            return Ok(());
        };

        let _span = span!(Level::DEBUG, "compositing", background = %background).entered();
        self.progress.report_stage(ProcessingStage::Compositing);
        let start = Instant::now();
        let result = composite(&session.source, feathered, background)?;
        session.composite = Some(Arc::new(result));
        self.timings.compositing_ms = start.elapsed().as_millis() as u64;
        Ok(())
    }

    /// Change the background color
    ///
    /// Re-composites in `Ready`; otherwise the color is used by the next
    /// composite.
    ///
    /// # Errors
    /// Propagates compositing failures.
    pub fn set_background_color(&mut self, color: BackgroundColor) -> Result<()> {
        if color == self.background {
            return Ok(());
        }
        self.background = color;
        if self.state == PipelineState::Ready {
            self.rebuild_composite()?;
            self.bump_epoch();
        } else {
            debug!(background = %color, state = %self.state, "background queued");
        }
        Ok(())
    }

    /// Change the output standard, keeping the pan and zoom where they still fit
    pub fn set_output_spec(&mut self, spec: OutputSpec) {
        self.spec = spec;
        if let Some(crop) = self.crop_mut() {
            crop.set_output_spec(spec);
        }
        self.bump_epoch();
    }

    /// Change the output standard by name
    pub fn set_standard(&mut self, standard: PhotoStandard) {
        self.set_output_spec(*standard.spec());
    }

    /// Set the zoom, clamped to the configured bounds; ignored until `Ready`
    pub fn set_zoom(&mut self, zoom: f64) {
        if let Some(crop) = self.crop_mut() {
            crop.set_zoom(zoom);
            self.bump_epoch();
        } else {
            debug!(zoom, state = %self.state, "ignoring zoom input");
        }
    }

    /// Set the pan offset; ignored until `Ready`
    pub fn set_offset(&mut self, offset: CropOffset) {
        if let Some(crop) = self.crop_mut() {
            crop.set_offset(offset);
            self.bump_epoch();
        } else {
            debug!(?offset, state = %self.state, "ignoring pan input");
        }
    }

    /// Move the pan by a delta in photo pixels; ignored until `Ready`
    pub fn pan_by(&mut self, dx: f64, dy: f64) {
        if let Some(crop) = self.crop_mut() {
            crop.pan_by(dx, dy);
            self.bump_epoch();
        } else {
            debug!(dx, dy, state = %self.state, "ignoring pan input");
        }
    }

    /// Back to minimum zoom and a centered pan; ignored until `Ready`
    pub fn reset_crop(&mut self) {
        if let Some(crop) = self.crop_mut() {
            crop.reset();
            self.bump_epoch();
        }
    }

    /// Whether an export would currently succeed
    ///
    /// # Errors
    /// - `NotReady` before segmentation completes
    /// - `ImageTooSmall` when the photo cannot hold a crop of the standard
    pub fn export_availability(&self) -> Result<()> {
        if self.state != PipelineState::Ready {
            return Err(PhotoError::not_ready(format!(
                "session is {}",
                self.state
            )));
        }
        match self.crop() {
            Some(crop) => crop.rectangle().map(|_| ()),
            None => Err(PhotoError::not_ready("no crop rectangle has been selected")),
        }
    }

    /// Whether the export action should be enabled
    #[must_use]
    pub fn can_export(&self) -> bool {
        self.export_availability().is_ok()
    }

    /// Render the current crop at the exact size of the active standard
    ///
    /// Passes through `Exporting` and always returns to `Ready`.
    ///
    /// # Errors
    /// See [`Self::export_availability`]; renderer failures are propagated.
    #[instrument(skip(self), fields(spec = self.spec.id))]
    pub fn export(&mut self) -> Result<FinalImage> {
        self.export_availability()?;
        let (composite, crop) = match self.session.as_ref() {
            Some(Session {
                composite: Some(composite),
                crop: Some(crop),
                ..
            }) => (Arc::clone(composite), crop.rectangle_opt()),
            _ => return Err(PhotoError::not_ready("no composite available")),
        };

        self.state = PipelineState::Exporting;
        self.progress.report_stage(ProcessingStage::Rendering);
        let start = Instant::now();
        let result = render(&composite, crop.as_ref(), &self.spec);
        self.state = PipelineState::Ready;

        match result {
            Ok(image) => {
                self.timings.rendering_ms = start.elapsed().as_millis() as u64;
                self.timings.total_ms = self.progress.elapsed_ms();
                self.progress.report_stage(ProcessingStage::Completed);
                self.progress.report_completion(&self.timings);
                info!(
                    width = self.spec.width_px,
                    height = self.spec.height_px,
                    rendering_ms = self.timings.rendering_ms,
                    "photo exported"
                );
                Ok(image)
            },
            Err(e) => {
                self.progress.report_error(&e.to_string());
                Err(e)
            },
        }
    }

    /// Export and write the photo with the configured format and quality
    ///
    /// `destination` is a directory (the file is named after the standard)
    /// or a file path.
    ///
    /// # Errors
    /// Export failures plus encoding and file write failures.
    pub fn export_to<P: AsRef<Path>>(&mut self, destination: P) -> Result<PathBuf> {
        let image = self.export()?;
        self.progress.report_stage(ProcessingStage::Encoding);
        ImageIOService::export(
            &image,
            destination,
            self.config.export_format,
            self.config.jpeg_quality,
        )
    }

    /// Snapshot the current state into a job that can render elsewhere
    ///
    /// Preparing a job supersedes any job prepared earlier.
    ///
    /// # Errors
    /// See [`Self::export_availability`].
    pub fn prepare_render(&mut self) -> Result<RenderJob> {
        self.export_availability()?;
        let (composite, crop) = match self.session.as_ref() {
            Some(Session {
                composite: Some(composite),
                crop: Some(crop),
                ..
            }) => (Arc::clone(composite), crop.rectangle()?),
            _ => return Err(PhotoError::not_ready("no composite available")),
        };

        self.bump_epoch();
        Ok(RenderJob {
            epoch: self.render_epoch,
            composite,
            crop,
            spec: self.spec,
        })
    }

    /// Take the image of a finished job if nothing superseded it
    ///
    /// Returns `None` for frames of stale jobs.
    pub fn accept_render(&mut self, frame: RenderedFrame) -> Option<FinalImage> {
        if frame.epoch != self.render_epoch || self.state != PipelineState::Ready {
            debug!(
                frame_epoch = frame.epoch,
                current_epoch = self.render_epoch,
                "discarding stale render"
            );
            return None;
        }
        // One frame per epoch
        self.bump_epoch();
        Some(frame.image)
    }
}

impl std::fmt::Debug for PipelineController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineController")
            .field("state", &self.state)
            .field("generation", &self.generation)
            .field("render_epoch", &self.render_epoch)
            .field("background", &self.background)
            .field("spec", &self.spec.id)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::{SCHENGEN, US},
        segmentation::{StaticMaskBackend, UnavailableBackend},
        services::{ProgressUpdate, PipelineTimings},
    };
    use image::{Rgba, RgbaImage};
    use std::sync::Mutex;
    use std::time::Duration;

    fn photo(width: u32, height: u32) -> Bitmap {
        Bitmap::new(RgbaImage::from_fn(width, height, |x, y| {
            Rgba([(x % 256) as u8, (y % 256) as u8, 128, 255])
        }))
        .unwrap()
    }

    fn controller() -> PipelineController {
        PipelineController::new(PipelineConfig::default()).unwrap()
    }

    fn ready_controller(width: u32, height: u32) -> PipelineController {
        let mut controller = controller();
        let ticket = controller.upload(photo(width, height));
        assert!(controller
            .complete_segmentation(ticket, Ok(Mask::opaque(width, height)))
            .unwrap());
        controller
    }

    #[test]
    fn test_starts_empty_and_not_exportable() {
        let mut controller = controller();
        assert_eq!(controller.state(), PipelineState::Empty);
        assert!(!controller.can_export());
        assert!(matches!(controller.export(), Err(PhotoError::NotReady(_))));
        assert!(matches!(
            controller.prepare_render(),
            Err(PhotoError::NotReady(_))
        ));
    }

    #[test]
    fn test_rejects_invalid_config() {
        let config = PipelineConfig {
            feather_radius: -1.0,
            ..PipelineConfig::default()
        };
        assert!(PipelineController::new(config).is_err());
    }

    #[test]
    fn test_mask_pending_ignores_crop_and_queues_background() {
        let mut controller = controller();
        let ticket = controller.upload(photo(40, 40));
        assert_eq!(controller.state(), PipelineState::MaskPending);
        assert!(matches!(
            controller.export_availability(),
            Err(PhotoError::NotReady(_))
        ));

        controller.set_zoom(2.0);
        controller.pan_by(5.0, 5.0);
        controller.set_background_color(BackgroundColor::BLUE).unwrap();
        controller.set_output_spec(US);
        assert!(controller.crop_rectangle().is_none());

        controller
            .complete_segmentation(ticket, Ok(Mask::filled(40, 40, 0.0)))
            .unwrap();
        assert_eq!(controller.state(), PipelineState::Ready);
        assert_eq!(controller.zoom(), Some(1.0));
        assert_eq!(controller.output_spec(), &US);
        let composite = controller.composite().unwrap();
        assert_eq!(composite.background(), BackgroundColor::BLUE);
        assert_eq!(composite.bitmap(), &Bitmap::filled(40, 40, BackgroundColor::BLUE).unwrap());
    }

    #[test]
    fn test_stale_ticket_is_ignored() {
        let mut controller = controller();
        let first = controller.upload(photo(20, 20));
        let second = controller.upload(photo(30, 30));
        assert!(!controller
            .complete_segmentation(first, Ok(Mask::opaque(20, 20)))
            .unwrap());
        assert_eq!(controller.state(), PipelineState::MaskPending);

        assert!(controller
            .complete_segmentation(second, Ok(Mask::opaque(30, 30)))
            .unwrap());
        // Answering twice changes nothing
        assert!(!controller
            .complete_segmentation(second, Ok(Mask::filled(30, 30, 0.0)))
            .unwrap());
        assert_eq!(controller.composite().unwrap().bitmap(), &photo(30, 30));
    }

    #[test]
    fn test_failed_segmentation_falls_back_to_source() {
        let mut controller = controller();
        let ticket = controller.upload(photo(24, 16));
        controller
            .complete_segmentation(ticket, Err(PhotoError::segmentation_unavailable("offline")))
            .unwrap();
        assert_eq!(controller.state(), PipelineState::Ready);
        assert_eq!(controller.composite().unwrap().bitmap(), &photo(24, 16));
        assert!(matches!(
            controller.segmentation_fallback(),
            Some(PhotoError::SegmentationUnavailable(_))
        ));
    }

    #[test]
    fn test_mismatched_mask_falls_back() {
        let mut controller = controller();
        let ticket = controller.upload(photo(24, 16));
        controller
            .complete_segmentation(ticket, Ok(Mask::filled(16, 24, 0.0)))
            .unwrap();
        assert_eq!(controller.composite().unwrap().bitmap(), &photo(24, 16));
        assert!(controller.segmentation_fallback().is_some());
    }

    #[test]
    fn test_background_change_recomposites() {
        let mut controller = controller();
        let ticket = controller.upload(photo(10, 10));
        controller
            .complete_segmentation(ticket, Ok(Mask::filled(10, 10, 0.0)))
            .unwrap();
        let epoch = controller.render_epoch();

        controller.set_background_color(BackgroundColor::RED).unwrap();
        assert!(controller.render_epoch() > epoch);
        assert_eq!(
            controller.composite().unwrap().bitmap(),
            &Bitmap::filled(10, 10, BackgroundColor::RED).unwrap()
        );
    }

    #[test]
    fn test_spec_change_keeps_zoom() {
        let mut controller = ready_controller(400, 300);
        controller.set_zoom(2.0);
        controller.set_standard(PhotoStandard::Us);
        assert_eq!(controller.zoom(), Some(2.0));
        let rect = controller.crop_rectangle().unwrap();
        assert!((rect.aspect_ratio() - US.aspect_ratio()).abs() < 1e-3);
        assert!(rect.is_within(400, 300, 1e-6));
    }

    #[test]
    fn test_zoom_is_clamped_and_reset() {
        let mut controller = ready_controller(200, 200);
        controller.set_zoom(10.0);
        assert_eq!(controller.zoom(), Some(3.0));
        controller.pan_by(30.0, 0.0);
        controller.reset_crop();
        assert_eq!(controller.zoom(), Some(1.0));
        let offset = controller.offset().unwrap();
        assert!(offset.x.abs() < 1e-9 && offset.y.abs() < 1e-9);
    }

    #[test]
    fn test_export_returns_to_ready() {
        let mut controller = ready_controller(300, 400);
        let image = controller.export().unwrap();
        assert_eq!(image.dimensions(), SCHENGEN.dimensions());
        assert_eq!(controller.state(), PipelineState::Ready);

        controller.set_standard(PhotoStandard::Us);
        let image = controller.export().unwrap();
        assert_eq!(image.dimensions(), (1181, 1181));
    }

    #[test]
    fn test_too_small_image_disables_export() {
        let config = PipelineConfig::builder()
            .min_crop_side_px(64.0)
            .build()
            .unwrap();
        let mut controller = PipelineController::new(config).unwrap();
        let ticket = controller.upload(photo(20, 20));
        controller
            .complete_segmentation(ticket, Ok(Mask::opaque(20, 20)))
            .unwrap();

        assert_eq!(controller.state(), PipelineState::Ready);
        assert!(!controller.can_export());
        assert!(matches!(
            controller.export(),
            Err(PhotoError::ImageTooSmall(_))
        ));
        assert_eq!(controller.state(), PipelineState::Ready);
    }

    #[test]
    fn test_new_upload_discards_derived_data() {
        let mut controller = ready_controller(50, 50);
        assert!(controller.composite().is_some());
        controller.upload(photo(60, 40));
        assert_eq!(controller.state(), PipelineState::MaskPending);
        assert!(controller.composite().is_none());
        assert!(controller.crop_rectangle().is_none());
        assert_eq!(controller.source().unwrap().dimensions(), (60, 40));
    }

    #[test]
    fn test_render_job_round_trip() {
        let mut controller = ready_controller(120, 160);
        let job = controller.prepare_render().unwrap();
        let frame = job.run().unwrap();
        let image = controller.accept_render(frame).unwrap();
        assert_eq!(image.dimensions(), SCHENGEN.dimensions());
    }

    #[test]
    fn test_superseded_render_is_discarded() {
        let mut controller = ready_controller(120, 160);
        let job = controller.prepare_render().unwrap();
        controller.set_zoom(1.5);
        let frame = job.run().unwrap();
        assert!(controller.accept_render(frame).is_none());

        let first = controller.prepare_render().unwrap();
        let second = controller.prepare_render().unwrap();
        let first_frame = first.run().unwrap();
        let second_frame = second.run().unwrap();
        assert!(controller.accept_render(first_frame).is_none());
        assert!(controller.accept_render(second_frame).is_some());
    }

    #[tokio::test]
    async fn test_spawned_render() {
        let mut controller = ready_controller(90, 90);
        controller.set_standard(PhotoStandard::Us);
        let frame = controller.prepare_render().unwrap().spawn().await.unwrap().unwrap();
        let image = controller.accept_render(frame).unwrap();
        assert_eq!(image.dimensions(), (1181, 1181));
    }

    #[tokio::test]
    async fn test_upload_and_segment_with_unavailable_backend() {
        let mut controller = controller();
        let service = controller.segmentation_service(Arc::new(UnavailableBackend::default()));
        controller
            .upload_and_segment(photo(32, 32), &service)
            .await
            .unwrap();
        assert_eq!(controller.state(), PipelineState::Ready);
        assert_eq!(controller.composite().unwrap().bitmap(), &photo(32, 32));
        assert!(controller.segmentation_fallback().is_some());
    }

    #[tokio::test]
    async fn test_retry_only_after_fallback_and_once() {
        let mut controller = controller();
        let good = SegmentationService::new(
            Arc::new(StaticMaskBackend::new(Mask::filled(32, 32, 0.0))),
            Duration::from_secs(1),
        );
        let bad = SegmentationService::new(
            Arc::new(UnavailableBackend::new("offline")),
            Duration::from_secs(1),
        );

        controller.upload_and_segment(photo(32, 32), &good).await.unwrap();
        assert!(matches!(
            controller.retry_segmentation(&good).await,
            Err(PhotoError::InvalidConfig(_))
        ));

        controller.upload_and_segment(photo(32, 32), &bad).await.unwrap();
        controller.set_zoom(2.0);
        assert!(controller.retry_segmentation(&good).await.unwrap());
        assert!(controller.segmentation_fallback().is_none());
        assert_eq!(controller.zoom(), Some(2.0));
        assert_eq!(
            controller.composite().unwrap().bitmap(),
            &Bitmap::filled(32, 32, BackgroundColor::WHITE).unwrap()
        );
        assert!(controller.retry_segmentation(&good).await.is_err());
    }

    #[tokio::test]
    async fn test_failed_retry_keeps_fallback() {
        let mut controller = controller();
        let bad = controller.segmentation_service(Arc::new(UnavailableBackend::new("offline")));
        controller.upload_and_segment(photo(16, 16), &bad).await.unwrap();
        assert!(!controller.retry_segmentation(&bad).await.unwrap());
        assert!(controller.segmentation_fallback().is_some());
        assert!(controller.retry_segmentation(&bad).await.is_err());
    }

    #[test]
    fn test_progress_stages_reported() {
        struct Recorder(Arc<Mutex<Vec<ProcessingStage>>>);

        impl ProgressReporter for Recorder {
            fn report_progress(&self, update: ProgressUpdate) {
                self.0.lock().unwrap().push(update.stage);
            }
            fn report_completion(&self, _timings: &PipelineTimings) {}
            fn report_error(&self, _stage: ProcessingStage, _error: &str) {}
        }

        let stages = Arc::new(Mutex::new(Vec::new()));
        let mut controller = controller().with_progress_reporter(Box::new(Recorder(Arc::clone(&stages))));
        let ticket = controller.upload(photo(30, 30));
        controller
            .complete_segmentation(ticket, Ok(Mask::opaque(30, 30)))
            .unwrap();
        controller.export().unwrap();

        let stages = stages.lock().unwrap();
        assert_eq!(stages.first(), Some(&ProcessingStage::Upload));
        assert!(stages.contains(&ProcessingStage::Compositing));
        assert!(stages.contains(&ProcessingStage::Rendering));
        assert_eq!(stages.last(), Some(&ProcessingStage::Completed));
    }
}

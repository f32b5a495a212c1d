//! End-to-end workflows through the pipeline controller
//!
//! Photos and masks are written to temporary files, segmented through the
//! mask-file backend and exported to disk, mirroring what the CLI does.

use image::{GrayImage, Luma, Rgba, RgbaImage};
use passport_photo::{
    BackgroundColor, Bitmap, CropOffset, ExportFormat, ImageIOService, Mask, MaskFileBackend,
    PhotoError, PhotoStandard, PipelineConfig, PipelineController, PipelineState, Result,
    SegmentationBackend, StaticMaskBackend, UnavailableBackend,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

/// A flat gray "person" on a green backdrop
fn create_test_photo(width: u32, height: u32) -> RgbaImage {
    RgbaImage::from_fn(width, height, |x, y| {
        if is_subject(x, y, width, height) {
            Rgba([90, 90, 90, 255])
        } else {
            Rgba([0, 200, 0, 255])
        }
    })
}

fn is_subject(x: u32, y: u32, width: u32, height: u32) -> bool {
    x >= width / 4 && x < width * 3 / 4 && y >= height / 5
}

fn create_test_mask(width: u32, height: u32) -> GrayImage {
    GrayImage::from_fn(width, height, |x, y| {
        if is_subject(x, y, width, height) {
            Luma([255])
        } else {
            Luma([0])
        }
    })
}

fn write_fixtures(dir: &Path, width: u32, height: u32) -> (PathBuf, PathBuf) {
    let photo_path = dir.join("portrait.png");
    let mask_path = dir.join("portrait-mask.png");
    create_test_photo(width, height).save(&photo_path).unwrap();
    create_test_mask(width, height).save(&mask_path).unwrap();
    (photo_path, mask_path)
}

fn file_backend(path: &Path) -> Arc<dyn SegmentationBackend> {
    Arc::new(MaskFileBackend::new(path))
}

#[tokio::test]
async fn test_file_to_file_workflow() -> Result<()> {
    let temp_dir = TempDir::new().unwrap();
    let (photo_path, mask_path) = write_fixtures(temp_dir.path(), 400, 500);

    let config = PipelineConfig::builder()
        .background(BackgroundColor::BLUE)
        .export_format(ExportFormat::Png)
        .build()?;
    let mut controller = PipelineController::new(config)?;

    let photo = ImageIOService::load_bitmap(&photo_path)?;
    let service = controller.segmentation_service(file_backend(&mask_path));
    controller.upload_and_segment(photo, &service).await?;
    assert_eq!(controller.state(), PipelineState::Ready);
    assert!(controller.segmentation_fallback().is_none());

    // Backdrop pixels are replaced, subject pixels kept
    let composite = controller.composite().unwrap().bitmap();
    assert_eq!(composite.pixel(2, 2), BackgroundColor::BLUE.to_rgba());
    assert_eq!(composite.pixel(200, 400), Rgba([90, 90, 90, 255]));

    let out_dir = temp_dir.path().join("out");
    let written = controller.export_to(&out_dir)?;
    assert_eq!(written, out_dir.join("schengen-photo.png"));
    assert_eq!(controller.state(), PipelineState::Ready);

    let reloaded = ImageIOService::load_bitmap(&written)?;
    assert_eq!(reloaded.dimensions(), (827, 1063));
    Ok(())
}

#[tokio::test]
async fn test_adjustments_then_jpeg_export() -> Result<()> {
    let temp_dir = TempDir::new().unwrap();
    let (photo_path, mask_path) = write_fixtures(temp_dir.path(), 640, 480);

    let mut controller = PipelineController::new(PipelineConfig::default())?;
    let service = controller.segmentation_service(file_backend(&mask_path));
    controller
        .upload_and_segment(ImageIOService::load_bitmap(&photo_path)?, &service)
        .await?;

    controller.set_standard(PhotoStandard::Us);
    controller.set_zoom(2.0);
    controller.pan_by(25.0, -10.0);
    controller.set_background_color(BackgroundColor::OFF_WHITE)?;

    assert_eq!(controller.zoom(), Some(2.0));
    let crop = controller.crop_rectangle().unwrap();
    assert!((crop.width - 240.0).abs() < 1e-9);
    assert!((crop.height - 240.0).abs() < 1e-9);
    assert!(crop.is_within(640, 480, 1e-9));

    let written = controller.export_to(temp_dir.path())?;
    assert_eq!(written.file_name().unwrap(), "us-photo.jpg");
    let reloaded = ImageIOService::load_bitmap(&written)?;
    assert_eq!(reloaded.dimensions(), (1181, 1181));
    Ok(())
}

#[tokio::test]
async fn test_missing_mask_falls_back_and_retry_recovers() -> Result<()> {
    let temp_dir = TempDir::new().unwrap();
    let (photo_path, mask_path) = write_fixtures(temp_dir.path(), 300, 400);
    let photo = ImageIOService::load_bitmap(&photo_path)?;

    let mut controller = PipelineController::new(PipelineConfig::default())?;
    let missing = controller
        .segmentation_service(file_backend(&temp_dir.path().join("no-such-mask.png")));
    controller.upload_and_segment(photo.clone(), &missing).await?;

    assert_eq!(controller.state(), PipelineState::Ready);
    assert!(matches!(
        controller.segmentation_fallback(),
        Some(PhotoError::SegmentationUnavailable(_))
    ));
    assert_eq!(controller.composite().unwrap().bitmap(), &photo);
    controller.set_zoom(1.5);

    let working = controller.segmentation_service(file_backend(&mask_path));
    assert!(controller.retry_segmentation(&working).await?);
    assert!(controller.segmentation_fallback().is_none());
    assert_eq!(controller.zoom(), Some(1.5));
    assert_eq!(
        controller.composite().unwrap().bitmap().pixel(1, 1),
        BackgroundColor::WHITE.to_rgba()
    );

    // Only one retry per upload
    let err = controller.retry_segmentation(&working).await.unwrap_err();
    assert!(matches!(err, PhotoError::InvalidConfig(_)));
    Ok(())
}

#[tokio::test]
async fn test_new_upload_discards_previous_session() -> Result<()> {
    let mut controller = PipelineController::new(PipelineConfig::default())?;
    let first = Bitmap::filled(200, 200, BackgroundColor::RED)?;
    let second = Bitmap::filled(120, 160, BackgroundColor::BLACK)?;

    let stale_ticket = controller.upload(first);
    let fresh_ticket = controller.upload(second.clone());
    assert!(fresh_ticket.generation() > stale_ticket.generation());

    // The first photo's mask arrives late and is ignored
    assert!(!controller.complete_segmentation(stale_ticket, Ok(Mask::opaque(200, 200)))?);
    assert_eq!(controller.state(), PipelineState::MaskPending);

    assert!(controller.complete_segmentation(fresh_ticket, Ok(Mask::opaque(120, 160)))?);
    assert_eq!(controller.source(), Some(&second));
    assert_eq!(controller.composite().unwrap().dimensions(), (120, 160));
    Ok(())
}

#[tokio::test]
async fn test_superseded_background_render_is_discarded() -> Result<()> {
    let mut controller = PipelineController::new(PipelineConfig::default())?;
    let photo = Bitmap::filled(300, 300, BackgroundColor::RED)?;
    let service = controller.segmentation_service(Arc::new(StaticMaskBackend::new(
        Mask::filled(300, 300, 0.0),
    )));
    controller.upload_and_segment(photo, &service).await?;

    let stale_job = controller.prepare_render()?;
    controller.set_background_color(BackgroundColor::LIGHT_GRAY)?;
    let fresh_job = controller.prepare_render()?;

    let stale_frame = stale_job.spawn().await.unwrap()?;
    let fresh_frame = fresh_job.spawn().await.unwrap()?;

    assert!(controller.accept_render(stale_frame).is_none());
    let image = controller.accept_render(fresh_frame).unwrap();
    assert_eq!(image.background(), BackgroundColor::LIGHT_GRAY);
    assert!(image
        .bitmap()
        .as_image()
        .pixels()
        .all(|p| *p == BackgroundColor::LIGHT_GRAY.to_rgba()));
    Ok(())
}

#[tokio::test]
async fn test_choices_made_while_pending_apply_on_completion() -> Result<()> {
    let mut controller = PipelineController::new(PipelineConfig::default())?;
    let ticket = controller.upload(Bitmap::filled(400, 300, BackgroundColor::BLACK)?);

    controller.set_background_color(BackgroundColor::BLUE)?;
    controller.set_standard(PhotoStandard::Us);
    controller.set_zoom(2.5);
    controller.set_offset(CropOffset::new(40.0, 0.0));
    assert!(controller.export().is_err());

    controller.complete_segmentation(ticket, Ok(Mask::filled(400, 300, 0.0)))?;
    assert_eq!(controller.output_spec().id, "us");
    assert_eq!(controller.zoom(), Some(1.0));
    assert_eq!(controller.offset(), Some(CropOffset::CENTER));

    let image = controller.export()?;
    assert_eq!(image.dimensions(), (1181, 1181));
    assert_eq!(image.bitmap().pixel(600, 600), BackgroundColor::BLUE.to_rgba());
    Ok(())
}

#[tokio::test]
async fn test_unavailable_backend_still_exports_whole_photo() -> Result<()> {
    let temp_dir = TempDir::new().unwrap();
    let (photo_path, _) = write_fixtures(temp_dir.path(), 500, 500);

    let mut controller = PipelineController::new(PipelineConfig::default())?;
    let service =
        controller.segmentation_service(Arc::new(UnavailableBackend::new("no model installed")));
    controller
        .upload_and_segment(ImageIOService::load_bitmap(&photo_path)?, &service)
        .await?;

    assert!(controller.can_export());
    let written = controller.export_to(temp_dir.path().join("photo.jpg"))?;
    assert_eq!(written, temp_dir.path().join("photo.jpg"));
    assert!(written.exists());

    // A .png file name wins over the configured JPEG format
    let written = controller.export_to(temp_dir.path().join("photo.png"))?;
    assert!(std::fs::read(&written).unwrap().starts_with(b"\x89PNG"));
    assert!(matches!(
        controller.export_to(temp_dir.path().join("photo.bmp")),
        Err(PhotoError::InvalidInput(_))
    ));
    assert_eq!(controller.state(), PipelineState::Ready);
    Ok(())
}

//! Exact-size output rendering
//!
//! Rasterizes the crop region of a composite into a canvas of exactly the
//! output standard's pixel dimensions, using bilinear resampling.

use crate::{
    config::OutputSpec,
    crop::CropRectangle,
    error::{PhotoError, Result},
    types::{Bitmap, CompositeImage, FinalImage},
};
use image::{ImageBuffer, Rgba, RgbaImage};
use tracing::{debug, instrument};

/// Tolerance, in pixels, for crops that touch the composite edge
const BOUNDS_TOLERANCE: f64 = 1e-6;

/// Bilinearly sample `image` at continuous pixel coordinates
///
/// Pixel centers sit at integer coordinates. Neighbours outside the image are
/// clamped to the nearest edge pixel.
#[must_use]
pub fn sample_bilinear(image: &RgbaImage, x: f64, y: f64) -> Rgba<u8> {
    let max_x = f64::from(image.width().saturating_sub(1));
    let max_y = f64::from(image.height().saturating_sub(1));
    let x = x.clamp(0.0, max_x);
    let y = y.clamp(0.0, max_y);

    let x0 = x.floor();
    let y0 = y.floor();
    let fx = x - x0;
    let fy = y - y0;
    let x1 = (x0 + 1.0).min(max_x);
    let y1 = (y0 + 1.0).min(max_y);

    let p00 = image.get_pixel(x0 as u32, y0 as u32);
    let p10 = image.get_pixel(x1 as u32, y0 as u32);
    let p01 = image.get_pixel(x0 as u32, y1 as u32);
    let p11 = image.get_pixel(x1 as u32, y1 as u32);

    let mut out = [0u8; 4];
    for (channel, value) in out.iter_mut().enumerate() {
        let top = f64::from(p00[channel]) * (1.0 - fx) + f64::from(p10[channel]) * fx;
        let bottom = f64::from(p01[channel]) * (1.0 - fx) + f64::from(p11[channel]) * fx;
        *value = (top * (1.0 - fy) + bottom * fy).round().clamp(0.0, 255.0) as u8;
    }
    Rgba(out)
}

/// Source coordinate sampled for output pixel `index` along one axis
#[inline]
#[must_use]
pub fn source_coordinate(crop_origin: f64, crop_extent: f64, output_extent: u32, index: u32) -> f64 {
    crop_origin + (f64::from(index) + 0.5) * crop_extent / f64::from(output_extent) - 0.5
}

/// Render the crop of a composite at the exact size of `spec`
///
/// The canvas is first filled with the composite's background color, then every
/// output pixel is resampled from the crop region.
///
/// # Errors
/// - `NotReady` when no crop rectangle has been computed yet
/// - `InvalidInput` when the crop is empty or reaches outside the composite
#[instrument(skip(composite, crop), fields(spec = spec.id))]
pub fn render(
    composite: &CompositeImage,
    crop: Option<&CropRectangle>,
    spec: &OutputSpec,
) -> Result<FinalImage> {
    let crop = crop.ok_or_else(|| PhotoError::not_ready("no crop rectangle has been selected"))?;

    let (width, height) = composite.dimensions();
    if !crop.is_within(width, height, BOUNDS_TOLERANCE) {
        return Err(PhotoError::invalid_input(format!(
            "Crop {:?} is not inside the {}x{} composite",
            crop, width, height
        )));
    }

    let background = composite.background();
    let mut canvas: RgbaImage =
        ImageBuffer::from_pixel(spec.width_px, spec.height_px, background.to_rgba());

    let source = composite.bitmap().as_image();
    for (x, y, pixel) in canvas.enumerate_pixels_mut() {
        let sx = source_coordinate(crop.x, crop.width, spec.width_px, x);
        let sy = source_coordinate(crop.y, crop.height, spec.height_px, y);
        *pixel = sample_bilinear(source, sx, sy);
    }

    debug!(
        width = spec.width_px,
        height = spec.height_px,
        scale = f64::from(spec.width_px) / crop.width,
        "rendered output canvas"
    );
    Ok(FinalImage::new(Bitmap::new(canvas)?, *spec, background))
}

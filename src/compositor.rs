//! Background compositing
//!
//! Flattens the source photo onto a solid background color through a
//! feathered mask. The output is always opaque since the deliverable is a
//! printed photo, not a layered image.

use crate::{
    config::BackgroundColor,
    error::{PhotoError, Result},
    types::{Bitmap, CompositeImage, FeatheredMask},
};
use image::{ImageBuffer, Rgba};
use tracing::instrument;

/// Blend one channel: `w·src + (1−w)·bg`, rounded to the nearest integer
#[inline]
fn blend_channel(src: u8, bg: u8, weight: f32) -> u8 {
    let value = weight * f32::from(src) + (1.0 - weight) * f32::from(bg);
    value.round().clamp(0.0, 255.0) as u8
}

/// Composite `source` over `background` using `mask` as foreground weight
///
/// Channels are blended on their stored sRGB values. The source alpha
/// channel scales the mask, so transparent source pixels show the
/// background. The result is a pure function of the three inputs.
///
/// # Errors
/// Returns `DimensionMismatch` when the mask and source sizes differ.
#[instrument(skip(source, mask), fields(width = source.width(), height = source.height(), background = %background))]
pub fn composite(
    source: &Bitmap,
    mask: &FeatheredMask,
    background: BackgroundColor,
) -> Result<CompositeImage> {
    if mask.dimensions() != source.dimensions() {
        return Err(PhotoError::dimension_mismatch(
            source.dimensions(),
            mask.dimensions(),
        ));
    }

    let [bg_r, bg_g, bg_b] = background.channels();
    let src = source.as_image();
    let output = ImageBuffer::from_fn(source.width(), source.height(), |x, y| {
        let pixel = src.get_pixel(x, y);
        let weight = mask.value(x, y) * (f32::from(pixel[3]) / 255.0);
        Rgba([
            blend_channel(pixel[0], bg_r, weight),
            blend_channel(pixel[1], bg_g, weight),
            blend_channel(pixel[2], bg_b, weight),
            255,
        ])
    });

    Ok(CompositeImage::new(Bitmap::new(output)?, background))
}

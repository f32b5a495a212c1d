//! Core image and mask types flowing through the pipeline

use crate::{
    config::{BackgroundColor, OutputSpec},
    error::{PhotoError, Result},
};
use image::{DynamicImage, GrayImage, ImageBuffer, Luma, RgbaImage};
use ndarray::Array2;

/// Owned RGBA8 bitmap with non-zero dimensions
///
/// Pipeline stages never mutate a bitmap in place; each stage produces a new one.
#[derive(Debug, Clone, PartialEq)]
pub struct Bitmap {
    image: RgbaImage,
}

impl Bitmap {
    /// Wrap an RGBA buffer
    ///
    /// # Errors
    /// Returns `InvalidInput` when either dimension is zero.
    pub fn new(image: RgbaImage) -> Result<Self> {
        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            return Err(PhotoError::invalid_input(format!(
                "Bitmap must have non-zero dimensions, got {}x{}",
                width, height
            )));
        }
        Ok(Self { image })
    }

    /// Convert any decoded image to RGBA8
    ///
    /// # Errors
    /// Returns `InvalidInput` when either dimension is zero.
    pub fn from_dynamic(image: &DynamicImage) -> Result<Self> {
        Self::new(image.to_rgba8())
    }

    /// A bitmap filled with one opaque color
    ///
    /// # Errors
    /// Returns `InvalidInput` when either dimension is zero.
    pub fn filled(width: u32, height: u32, color: BackgroundColor) -> Result<Self> {
        Self::new(ImageBuffer::from_pixel(width, height, color.to_rgba()))
    }

    #[must_use]
    pub fn width(&self) -> u32 {
        self.image.width()
    }

    #[must_use]
    pub fn height(&self) -> u32 {
        self.image.height()
    }

    #[must_use]
    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    /// Borrow the underlying buffer
    #[must_use]
    pub fn as_image(&self) -> &RgbaImage {
        &self.image
    }

    /// Take ownership of the underlying buffer
    #[must_use]
    pub fn into_image(self) -> RgbaImage {
        self.image
    }

    /// Pixel at (x, y); callers guarantee the coordinate is in bounds
    #[must_use]
    pub fn pixel(&self, x: u32, y: u32) -> image::Rgba<u8> {
        *self.image.get_pixel(x, y)
    }
}

/// Per-pixel foreground probability in [0, 1]
///
/// Stored as a `height × width` array. Produced by the segmentation
/// collaborator and only ever read afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct Mask {
    values: Array2<f32>,
}

impl Mask {
    /// Build a mask from row-major values
    ///
    /// # Errors
    /// Returns `InvalidInput` when the buffer length does not match the
    /// dimensions or a value is not a finite number in [0, 1].
    pub fn new(width: u32, height: u32, values: Vec<f32>) -> Result<Self> {
        let expected = width as usize * height as usize;
        if values.len() != expected {
            return Err(PhotoError::invalid_input(format!(
                "Mask buffer holds {} values, {}x{} needs {}",
                values.len(),
                width,
                height,
                expected
            )));
        }
        if let Some(bad) = values
            .iter()
            .find(|v| !v.is_finite() || !(0.0..=1.0).contains(*v))
        {
            return Err(PhotoError::invalid_input(format!(
                "Mask value {} is outside [0, 1]",
                bad
            )));
        }

        let values = Array2::from_shape_vec((height as usize, width as usize), values)
            .map_err(|e| PhotoError::invalid_input(format!("Invalid mask shape: {}", e)))?;
        Ok(Self { values })
    }

    /// A mask with every pixel set to `value` (clamped into [0, 1])
    #[must_use]
    pub fn filled(width: u32, height: u32, value: f32) -> Self {
        let value = if value.is_finite() { value.clamp(0.0, 1.0) } else { 0.0 };
        Self {
            values: Array2::from_elem((height as usize, width as usize), value),
        }
    }

    /// All-foreground mask, used when segmentation is unavailable
    #[must_use]
    pub fn opaque(width: u32, height: u32) -> Self {
        Self::filled(width, height, 1.0)
    }

    /// Convert an 8-bit grayscale image (0 = background, 255 = foreground)
    #[must_use]
    pub fn from_luma(image: &GrayImage) -> Self {
        let (width, height) = image.dimensions();
        let values = Array2::from_shape_fn((height as usize, width as usize), |(y, x)| {
            f32::from(image.get_pixel(x as u32, y as u32)[0]) / 255.0
        });
        Self { values }
    }

    /// Convert to an 8-bit grayscale image
    #[must_use]
    pub fn to_luma(&self) -> GrayImage {
        ImageBuffer::from_fn(self.width(), self.height(), |x, y| {
            let value = self.value(x, y);
            Luma([(value * 255.0).round().clamp(0.0, 255.0) as u8])
        })
    }

    /// Resize the mask to new dimensions
    ///
    /// # Errors
    /// Returns `InvalidInput` when the target dimensions are zero.
    pub fn resize(&self, new_width: u32, new_height: u32) -> Result<Self> {
        if new_width == 0 || new_height == 0 {
            return Err(PhotoError::invalid_input(format!(
                "Cannot resize mask to {}x{}",
                new_width, new_height
            )));
        }
        let source: ImageBuffer<Luma<f32>, Vec<f32>> =
            ImageBuffer::from_raw(self.width(), self.height(), self.values.iter().copied().collect())
                .ok_or_else(|| PhotoError::processing("Failed to view mask as image"))?;
        let resized = image::imageops::resize(
            &source,
            new_width,
            new_height,
            image::imageops::FilterType::Triangle,
        );
        let values = resized.into_raw().into_iter().map(|v| v.clamp(0.0, 1.0)).collect();
        Self::new(new_width, new_height, values)
    }

    #[must_use]
    pub fn width(&self) -> u32 {
        self.values.ncols() as u32
    }

    #[must_use]
    pub fn height(&self) -> u32 {
        self.values.nrows() as u32
    }

    #[must_use]
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width(), self.height())
    }

    /// Foreground probability at (x, y); out-of-bounds reads are background
    #[must_use]
    pub fn value(&self, x: u32, y: u32) -> f32 {
        self.values
            .get((y as usize, x as usize))
            .copied()
            .unwrap_or(0.0)
    }

    /// Borrow the values as a `height × width` array
    #[must_use]
    pub fn values(&self) -> &Array2<f32> {
        &self.values
    }

    pub(crate) fn from_array(values: Array2<f32>) -> Self {
        Self { values }
    }
}

/// A mask after edge feathering; only [`crate::feather::feather`] creates one
#[derive(Debug, Clone, PartialEq)]
pub struct FeatheredMask {
    mask: Mask,
    radius: f32,
}

impl FeatheredMask {
    pub(crate) fn new(mask: Mask, radius: f32) -> Self {
        Self { mask, radius }
    }

    /// Radius the mask was feathered with
    #[must_use]
    pub fn radius(&self) -> f32 {
        self.radius
    }

    #[must_use]
    pub fn mask(&self) -> &Mask {
        &self.mask
    }

    #[must_use]
    pub fn dimensions(&self) -> (u32, u32) {
        self.mask.dimensions()
    }

    #[must_use]
    pub fn value(&self, x: u32, y: u32) -> f32 {
        self.mask.value(x, y)
    }
}

/// Opaque foreground-on-background composite of source dimensions
#[derive(Debug, Clone, PartialEq)]
pub struct CompositeImage {
    bitmap: Bitmap,
    background: BackgroundColor,
}

impl CompositeImage {
    pub(crate) fn new(bitmap: Bitmap, background: BackgroundColor) -> Self {
        Self { bitmap, background }
    }

    #[must_use]
    pub fn bitmap(&self) -> &Bitmap {
        &self.bitmap
    }

    /// Background color the composite was flattened onto
    #[must_use]
    pub fn background(&self) -> BackgroundColor {
        self.background
    }

    #[must_use]
    pub fn dimensions(&self) -> (u32, u32) {
        self.bitmap.dimensions()
    }
}

/// Rendered photo with the exact pixel size of its output standard
#[derive(Debug, Clone, PartialEq)]
pub struct FinalImage {
    bitmap: Bitmap,
    spec: OutputSpec,
    background: BackgroundColor,
}

impl FinalImage {
    pub(crate) fn new(bitmap: Bitmap, spec: OutputSpec, background: BackgroundColor) -> Self {
        Self {
            bitmap,
            spec,
            background,
        }
    }

    #[must_use]
    pub fn bitmap(&self) -> &Bitmap {
        &self.bitmap
    }

    #[must_use]
    pub fn spec(&self) -> &OutputSpec {
        &self.spec
    }

    #[must_use]
    pub fn background(&self) -> BackgroundColor {
        self.background
    }

    #[must_use]
    pub fn dimensions(&self) -> (u32, u32) {
        self.bitmap.dimensions()
    }

    /// Convert into a `DynamicImage` for encoding
    #[must_use]
    pub fn into_dynamic(self) -> DynamicImage {
        DynamicImage::ImageRgba8(self.bitmap.into_image())
    }
}

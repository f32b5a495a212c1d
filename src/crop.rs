//! Aspect-locked crop geometry
//!
//! The crop rectangle is never mutated incrementally. Every pan or zoom event
//! recomputes it from `(offset, zoom, aspect ratio)` with
//! [`compute_crop_rectangle`], which keeps it inside the image and at the
//! exact aspect ratio of the active output standard.

use crate::{
    config::{OutputSpec, ZoomBounds},
    error::{PhotoError, Result},
};
use serde::{Deserialize, Serialize};
use tracing::trace;

/// Smallest crop side, in source pixels, accepted by default
pub const MIN_CROP_SIDE_PX: f64 = 1.0;

/// Pan offset: displacement of the crop center from the image center, in pixels
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CropOffset {
    pub x: f64,
    pub y: f64,
}

impl CropOffset {
    #[must_use]
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Centered pan
    pub const CENTER: Self = Self::new(0.0, 0.0);
}

/// Crop region in composite pixel coordinates
///
/// Coordinates are sub-pixel so the aspect ratio is exact rather than rounded.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CropRectangle {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl CropRectangle {
    #[must_use]
    pub fn aspect_ratio(&self) -> f64 {
        self.width / self.height
    }

    #[must_use]
    pub fn center(&self) -> (f64, f64) {
        (self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    /// Whether the rectangle lies inside a `width × height` image, within `tolerance` pixels
    #[must_use]
    pub fn is_within(&self, width: u32, height: u32, tolerance: f64) -> bool {
        let (w, h) = (f64::from(width), f64::from(height));
        self.width > 0.0
            && self.height > 0.0
            && self.x >= -tolerance
            && self.y >= -tolerance
            && self.x + self.width <= w + tolerance
            && self.y + self.height <= h + tolerance
    }

    /// Pan offset that reproduces this rectangle's center in a `width × height` image
    #[must_use]
    pub fn offset_in(&self, width: u32, height: u32) -> CropOffset {
        let (cx, cy) = self.center();
        CropOffset::new(cx - f64::from(width) / 2.0, cy - f64::from(height) / 2.0)
    }
}

/// Compute the crop rectangle for an image, pan offset, zoom and aspect ratio
///
/// At zoom 1 the rectangle is the largest rectangle of `aspect_ratio` that fits
/// inside the image. Higher zoom shrinks it proportionally around the pan
/// center, which is then clamped so the rectangle stays inside the image.
///
/// # Errors
/// - `InvalidInput` for zero image dimensions, zoom below 1 or not finite,
///   a non-positive aspect ratio, or a non-finite offset
/// - `ImageTooSmall` when the zoom-1 rectangle has a side under one pixel
pub fn compute_crop_rectangle(
    image_width: u32,
    image_height: u32,
    offset: CropOffset,
    zoom: f64,
    aspect_ratio: f64,
) -> Result<CropRectangle> {
    compute_crop_rectangle_with_min(
        image_width,
        image_height,
        offset,
        zoom,
        aspect_ratio,
        MIN_CROP_SIDE_PX,
    )
}

/// [`compute_crop_rectangle`] with a custom minimum crop side
///
/// # Errors
/// As [`compute_crop_rectangle`], with `ImageTooSmall` raised against `min_side_px`.
pub fn compute_crop_rectangle_with_min(
    image_width: u32,
    image_height: u32,
    offset: CropOffset,
    zoom: f64,
    aspect_ratio: f64,
    min_side_px: f64,
) -> Result<CropRectangle> {
    if image_width == 0 || image_height == 0 {
        return Err(PhotoError::invalid_input(format!(
            "Cannot crop an empty {}x{} image",
            image_width, image_height
        )));
    }
    if !zoom.is_finite() || zoom < 1.0 {
        return Err(PhotoError::invalid_input(format!(
            "Zoom must be a finite value >= 1, got {}",
            zoom
        )));
    }
    if !aspect_ratio.is_finite() || aspect_ratio <= 0.0 {
        return Err(PhotoError::invalid_input(format!(
            "Aspect ratio must be positive, got {}",
            aspect_ratio
        )));
    }
    if !offset.x.is_finite() || !offset.y.is_finite() {
        return Err(PhotoError::invalid_input("Pan offset must be finite"));
    }

    let (img_w, img_h) = (f64::from(image_width), f64::from(image_height));

    // Largest rectangle of the requested aspect ratio inside the image
    let (base_w, base_h) = if img_w / img_h > aspect_ratio {
        ((img_h * aspect_ratio).min(img_w), img_h)
    } else {
        (img_w, (img_w / aspect_ratio).min(img_h))
    };

    if base_w < min_side_px || base_h < min_side_px {
        return Err(PhotoError::image_too_small(format!(
            "{}x{} image only fits a {:.2}x{:.2} crop at aspect ratio {:.4} (minimum side {} px)",
            image_width, image_height, base_w, base_h, aspect_ratio, min_side_px
        )));
    }

    let width = base_w / zoom;
    let height = base_h / zoom;

    let half_w = width / 2.0;
    let half_h = height / 2.0;
    let cx = (img_w / 2.0 + offset.x).clamp(half_w, img_w - half_w);
    let cy = (img_h / 2.0 + offset.y).clamp(half_h, img_h - half_h);

    let rect = CropRectangle {
        x: (cx - half_w).clamp(0.0, img_w - width),
        y: (cy - half_h).clamp(0.0, img_h - height),
        width,
        height,
    };
    trace!(?rect, zoom, aspect_ratio, "computed crop rectangle");
    Ok(rect)
}

/// Outcome of the last recomputation
#[derive(Debug, Clone)]
enum CropState {
    Ready(CropRectangle),
    TooSmall(String),
    Invalid(String),
}

/// Interactive crop state: pan offset, zoom and the active output standard
///
/// Every mutation recomputes the rectangle from scratch and replaces the stored
/// offset with the effective (clamped) one, so pan state never drifts outside
/// the image.
#[derive(Debug, Clone)]
pub struct CropGeometry {
    image_width: u32,
    image_height: u32,
    offset: CropOffset,
    zoom: f64,
    spec: OutputSpec,
    bounds: ZoomBounds,
    min_side_px: f64,
    state: CropState,
}

impl CropGeometry {
    /// Start at minimum zoom with a centered pan
    #[must_use]
    pub fn new(
        image_width: u32,
        image_height: u32,
        spec: OutputSpec,
        bounds: ZoomBounds,
        min_side_px: f64,
    ) -> Self {
        let mut geometry = Self {
            image_width,
            image_height,
            offset: CropOffset::CENTER,
            zoom: bounds.min,
            spec,
            bounds,
            min_side_px,
            state: CropState::Invalid("crop not computed yet".to_string()),
        };
        geometry.recompute();
        geometry
    }

    fn recompute(&mut self) {
        self.state = match compute_crop_rectangle_with_min(
            self.image_width,
            self.image_height,
            self.offset,
            self.zoom,
            self.spec.aspect_ratio(),
            self.min_side_px,
        ) {
            Ok(rect) => {
                self.offset = rect.offset_in(self.image_width, self.image_height);
                CropState::Ready(rect)
            },
            Err(PhotoError::ImageTooSmall(msg)) => CropState::TooSmall(msg),
            Err(other) => CropState::Invalid(other.to_string()),
        };
    }

    /// Current rectangle
    ///
    /// # Errors
    /// `ImageTooSmall` when the image cannot hold a crop of the active aspect
    /// ratio, `InvalidInput` for any other geometry failure.
    pub fn rectangle(&self) -> Result<CropRectangle> {
        match &self.state {
            CropState::Ready(rect) => Ok(*rect),
            CropState::TooSmall(msg) => Err(PhotoError::image_too_small(msg.clone())),
            CropState::Invalid(msg) => Err(PhotoError::invalid_input(msg.clone())),
        }
    }

    /// Current rectangle, if one could be computed
    #[must_use]
    pub fn rectangle_opt(&self) -> Option<CropRectangle> {
        match self.state {
            CropState::Ready(rect) => Some(rect),
            _ => None,
        }
    }

    #[must_use]
    pub fn offset(&self) -> CropOffset {
        self.offset
    }

    #[must_use]
    pub fn zoom(&self) -> f64 {
        self.zoom
    }

    #[must_use]
    pub fn spec(&self) -> &OutputSpec {
        &self.spec
    }

    #[must_use]
    pub fn zoom_bounds(&self) -> ZoomBounds {
        self.bounds
    }

    /// Set the zoom, clamped to the configured bounds
    pub fn set_zoom(&mut self, zoom: f64) {
        self.zoom = self.bounds.clamp(zoom);
        self.recompute();
    }

    /// Set the pan offset relative to the image center
    pub fn set_offset(&mut self, offset: CropOffset) {
        if offset.x.is_finite() && offset.y.is_finite() {
            self.offset = offset;
        }
        self.recompute();
    }

    /// Move the pan by a delta in image pixels
    pub fn pan_by(&mut self, dx: f64, dy: f64) {
        self.set_offset(CropOffset::new(self.offset.x + dx, self.offset.y + dy));
    }

    /// Switch output standard, keeping the current pan and zoom where possible
    pub fn set_output_spec(&mut self, spec: OutputSpec) {
        self.spec = spec;
        self.recompute();
    }

    /// Back to minimum zoom and a centered pan
    pub fn reset(&mut self) {
        self.offset = CropOffset::CENTER;
        self.zoom = self.bounds.min;
        self.recompute();
    }
}

//! Configuration types for the passport photo pipeline

use crate::error::{PhotoError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// Print resolution every output standard is defined at
pub const PRINT_DPI: u32 = 600;

/// Target pixel dimensions for a named physical photo standard
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct OutputSpec {
    /// Identifier used in file names and on the command line
    pub id: &'static str,
    /// Output width in pixels
    pub width_px: u32,
    /// Output height in pixels
    pub height_px: u32,
    /// Human readable physical size
    pub label: &'static str,
}

impl OutputSpec {
    /// Width divided by height
    #[must_use]
    pub fn aspect_ratio(&self) -> f64 {
        f64::from(self.width_px) / f64::from(self.height_px)
    }

    /// Output dimensions as (width, height)
    #[must_use]
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width_px, self.height_px)
    }

    /// Physical print size in millimetres at [`PRINT_DPI`]
    #[must_use]
    pub fn physical_size_mm(&self) -> (f64, f64) {
        let mm_per_px = 25.4 / f64::from(PRINT_DPI);
        (
            f64::from(self.width_px) * mm_per_px,
            f64::from(self.height_px) * mm_per_px,
        )
    }
}

/// Schengen visa photo, 35×45 mm
pub const SCHENGEN: OutputSpec = OutputSpec {
    id: "schengen",
    width_px: 827,
    height_px: 1063,
    label: "Schengen (35×45 mm)",
};

/// US passport photo, 2×2 inch
pub const US: OutputSpec = OutputSpec {
    id: "us",
    width_px: 1181,
    height_px: 1181,
    label: "US (2×2 inch)",
};

/// Every supported output standard
pub const OUTPUT_SPECS: [OutputSpec; 2] = [SCHENGEN, US];

/// Supported photo standards
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PhotoStandard {
    /// Schengen visa (35×45 mm)
    Schengen,
    /// US passport (2×2 inch)
    Us,
}

impl PhotoStandard {
    /// All standards in display order
    pub const ALL: [PhotoStandard; 2] = [PhotoStandard::Schengen, PhotoStandard::Us];

    /// Pixel specification of this standard
    #[must_use]
    pub fn spec(self) -> &'static OutputSpec {
        match self {
            Self::Schengen => &SCHENGEN,
            Self::Us => &US,
        }
    }
}

impl Default for PhotoStandard {
    fn default() -> Self {
        Self::Schengen
    }
}

impl std::fmt::Display for PhotoStandard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.spec().id)
    }
}

impl FromStr for PhotoStandard {
    type Err = PhotoError;

    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|standard| standard.spec().id == wanted)
            .ok_or_else(|| {
                PhotoError::invalid_config(format!(
                    "Unknown photo standard '{}'. Supported: schengen, us",
                    s
                ))
            })
    }
}

/// Flat background color that replaces everything outside the mask
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BackgroundColor {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl BackgroundColor {
    pub const WHITE: Self = Self::new(0xff, 0xff, 0xff);
    pub const BLUE: Self = Self::new(0x87, 0xce, 0xeb);
    pub const LIGHT_GRAY: Self = Self::new(0xd9, 0xd9, 0xd9);
    pub const OFF_WHITE: Self = Self::new(0xf2, 0xf2, 0xf2);
    pub const RED: Self = Self::new(0xff, 0x00, 0x00);
    pub const BLACK: Self = Self::new(0x00, 0x00, 0x00);

    /// Named colors offered to the user, in display order
    pub const PALETTE: [(&'static str, BackgroundColor); 6] = [
        ("white", Self::WHITE),
        ("blue", Self::BLUE),
        ("light-gray", Self::LIGHT_GRAY),
        ("off-white", Self::OFF_WHITE),
        ("red", Self::RED),
        ("black", Self::BLACK),
    ];

    #[must_use]
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Channels as an array
    #[must_use]
    pub fn channels(self) -> [u8; 3] {
        [self.r, self.g, self.b]
    }

    /// Opaque RGBA pixel of this color
    #[must_use]
    pub fn to_rgba(self) -> image::Rgba<u8> {
        image::Rgba([self.r, self.g, self.b, 255])
    }

    /// Palette name of this color, if it is one of the offered colors
    #[must_use]
    pub fn palette_name(self) -> Option<&'static str> {
        Self::PALETTE
            .iter()
            .find(|(_, color)| *color == self)
            .map(|(name, _)| *name)
    }

    /// Parse a hex color string
    ///
    /// Supports both #RRGGBB and #RGB formats, with or without the `#`.
    ///
    /// # Errors
    /// Returns `InvalidConfig` for malformed strings.
    pub fn parse_hex(hex: &str) -> Result<Self> {
        let digits = hex.trim().trim_start_matches('#');
        if !digits.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(PhotoError::invalid_config(format!(
                "Invalid hex color '{}'",
                hex
            )));
        }

        let component = |range: std::ops::Range<usize>| -> Result<u8> {
            digits
                .get(range)
                .and_then(|part| u8::from_str_radix(part, 16).ok())
                .ok_or_else(|| PhotoError::invalid_config(format!("Invalid hex color '{}'", hex)))
        };

        match digits.len() {
            6 => Ok(Self::new(component(0..2)?, component(2..4)?, component(4..6)?)),
            3 => Ok(Self::new(
                component(0..1)? * 17,
                component(1..2)? * 17,
                component(2..3)? * 17,
            )),
            _ => Err(PhotoError::invalid_config(
                "Color must be in #RRGGBB or #RGB format",
            )),
        }
    }

    /// Lowercase `#rrggbb` representation
    #[must_use]
    pub fn to_hex(self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }
}

impl Default for BackgroundColor {
    fn default() -> Self {
        Self::WHITE
    }
}

impl std::fmt::Display for BackgroundColor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.palette_name() {
            Some(name) => write!(f, "{} ({})", name, self.to_hex()),
            None => f.write_str(&self.to_hex()),
        }
    }
}

impl FromStr for BackgroundColor {
    type Err = PhotoError;

    /// Accepts palette names (`white`, `light-gray`, `Light Gray`, `light_gray`) or hex
    fn from_str(s: &str) -> Result<Self> {
        let normalized: String = s
            .trim()
            .to_ascii_lowercase()
            .chars()
            .map(|c| if c == ' ' || c == '_' { '-' } else { c })
            .collect();

        if let Some((_, color)) = Self::PALETTE.iter().find(|(name, _)| *name == normalized) {
            return Ok(*color);
        }
        Self::parse_hex(s)
    }
}

/// Encoded file format of exported photos
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    /// Lossy JPEG, the format print services expect
    Jpeg,
    /// Lossless PNG
    Png,
}

impl ExportFormat {
    /// File extension without the dot
    #[must_use]
    pub fn extension(self) -> &'static str {
        match self {
            Self::Jpeg => "jpg",
            Self::Png => "png",
        }
    }

    /// Format named by a file extension, case-insensitively
    #[must_use]
    pub fn from_extension(extension: &str) -> Option<Self> {
        match extension.to_ascii_lowercase().as_str() {
            "jpg" | "jpeg" => Some(Self::Jpeg),
            "png" => Some(Self::Png),
            _ => None,
        }
    }
}

impl Default for ExportFormat {
    fn default() -> Self {
        Self::Jpeg
    }
}

/// Allowed zoom range of the interactive crop
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ZoomBounds {
    pub min: f64,
    pub max: f64,
}

impl ZoomBounds {
    /// Clamp a requested zoom into the bounds; non-finite values map to `min`
    #[must_use]
    pub fn clamp(&self, zoom: f64) -> f64 {
        if zoom.is_finite() {
            zoom.clamp(self.min, self.max)
        } else {
            self.min
        }
    }

    /// Whether `zoom` lies inside the bounds
    #[must_use]
    pub fn contains(&self, zoom: f64) -> bool {
        (self.min..=self.max).contains(&zoom)
    }
}

impl Default for ZoomBounds {
    fn default() -> Self {
        Self { min: 1.0, max: 3.0 }
    }
}

/// Configuration of a photo pipeline session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Gaussian feather radius applied to segmentation masks (0 = no feathering)
    pub feather_radius: f32,

    /// Zoom range of the crop
    pub zoom_bounds: ZoomBounds,

    /// Smallest crop side, in source pixels, an image must allow at zoom 1
    pub min_crop_side_px: f64,

    /// How long the segmentation collaborator may take before it counts as failed
    pub segmentation_timeout_ms: u64,

    /// Standard selected when a session starts
    pub standard: PhotoStandard,

    /// Background color selected when a session starts
    pub background: BackgroundColor,

    /// Encoded format of exported photos
    pub export_format: ExportFormat,

    /// JPEG quality (1-100, 100 = maximum)
    pub jpeg_quality: u8,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            feather_radius: 0.0,
            zoom_bounds: ZoomBounds::default(),
            min_crop_side_px: 1.0,
            segmentation_timeout_ms: 30_000,
            standard: PhotoStandard::default(),
            background: BackgroundColor::default(),
            export_format: ExportFormat::default(),
            jpeg_quality: 100,
        }
    }
}

impl PipelineConfig {
    /// Create a new configuration builder
    ///
    /// # Examples
    /// ```rust
    /// use passport_photo::{BackgroundColor, PhotoStandard, PipelineConfig};
    ///
    /// let config = PipelineConfig::builder()
    ///     .standard(PhotoStandard::Us)
    ///     .background(BackgroundColor::LIGHT_GRAY)
    ///     .feather_radius(2.0)
    ///     .build()
    ///     .unwrap();
    /// assert_eq!(config.standard, PhotoStandard::Us);
    /// ```
    #[must_use]
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder::default()
    }

    /// Segmentation timeout as a `Duration`
    #[must_use]
    pub fn segmentation_timeout(&self) -> Duration {
        Duration::from_millis(self.segmentation_timeout_ms)
    }

    /// Load a configuration from a JSON file; missing fields take their defaults
    ///
    /// # Errors
    /// - File cannot be read
    /// - File is not valid JSON for this structure
    /// - Loaded values fail validation
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_ref = path.as_ref();
        let content = std::fs::read_to_string(path_ref)
            .map_err(|e| PhotoError::file_io_error("read config file", path_ref, &e))?;
        let config: Self = serde_json::from_str(&content).map_err(|e| {
            PhotoError::invalid_config(format!(
                "Failed to parse '{}': {}",
                path_ref.display(),
                e
            ))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Validate all configuration parameters
    ///
    /// # Errors
    /// - Negative or non-finite feather radius
    /// - Zoom bounds that are not finite, below 1 or inverted
    /// - Non-positive minimum crop side
    /// - Zero segmentation timeout
    /// - JPEG quality outside 1-100
    pub fn validate(&self) -> Result<()> {
        if !self.feather_radius.is_finite() || self.feather_radius < 0.0 {
            return Err(PhotoError::config_value_error(
                "feather radius",
                self.feather_radius,
                ">= 0",
            ));
        }

        let bounds = self.zoom_bounds;
        if !bounds.min.is_finite() || !bounds.max.is_finite() || bounds.min < 1.0 {
            return Err(PhotoError::config_value_error(
                "minimum zoom",
                bounds.min,
                ">= 1.0",
            ));
        }
        if bounds.max < bounds.min {
            return Err(PhotoError::config_value_error(
                "maximum zoom",
                bounds.max,
                &format!(">= {}", bounds.min),
            ));
        }

        if !self.min_crop_side_px.is_finite() || self.min_crop_side_px <= 0.0 {
            return Err(PhotoError::config_value_error(
                "minimum crop side",
                self.min_crop_side_px,
                "> 0",
            ));
        }

        if self.segmentation_timeout_ms == 0 {
            return Err(PhotoError::config_value_error(
                "segmentation timeout",
                self.segmentation_timeout_ms,
                "> 0 ms",
            ));
        }

        if self.jpeg_quality == 0 || self.jpeg_quality > 100 {
            return Err(PhotoError::config_value_error(
                "JPEG quality",
                self.jpeg_quality,
                "1-100",
            ));
        }

        Ok(())
    }
}

/// Builder for `PipelineConfig`
#[derive(Debug, Default)]
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl PipelineConfigBuilder {
    #[must_use]
    pub fn feather_radius(mut self, radius: f32) -> Self {
        self.config.feather_radius = radius;
        self
    }

    #[must_use]
    pub fn zoom_bounds(mut self, min: f64, max: f64) -> Self {
        self.config.zoom_bounds = ZoomBounds { min, max };
        self
    }

    #[must_use]
    pub fn min_crop_side_px(mut self, side: f64) -> Self {
        self.config.min_crop_side_px = side;
        self
    }

    #[must_use]
    pub fn segmentation_timeout(mut self, timeout: Duration) -> Self {
        self.config.segmentation_timeout_ms = timeout.as_millis() as u64;
        self
    }

    #[must_use]
    pub fn standard(mut self, standard: PhotoStandard) -> Self {
        self.config.standard = standard;
        self
    }

    #[must_use]
    pub fn background(mut self, color: BackgroundColor) -> Self {
        self.config.background = color;
        self
    }

    #[must_use]
    pub fn export_format(mut self, format: ExportFormat) -> Self {
        self.config.export_format = format;
        self
    }

    /// Set JPEG quality, clamped to 1-100
    #[must_use]
    pub fn jpeg_quality(mut self, quality: u8) -> Self {
        self.config.jpeg_quality = quality.clamp(1, 100);
        self
    }

    /// Build and validate the configuration
    ///
    /// # Errors
    /// Returns `InvalidConfig` when any value fails [`PipelineConfig::validate`].
    pub fn build(self) -> Result<PipelineConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

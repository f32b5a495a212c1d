//! Error types for the passport photo pipeline

use thiserror::Error;

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, PhotoError>;

/// Errors raised by the compositing, cropping and rendering pipeline
///
/// `InvalidInput` and `DimensionMismatch` are programming errors inside the
/// pipeline and abort the current operation. `ImageTooSmall` and `NotReady`
/// are expected conditions a frontend shows as a disabled export action.
/// `SegmentationUnavailable` never escapes the controller: it degrades to an
/// all-opaque mask.
#[derive(Error, Debug)]
pub enum PhotoError {
    /// Malformed or empty image, mask or parameter
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Source bitmap and mask disagree in size
    #[error("Dimension mismatch: expected {expected:?}, got {actual:?}")]
    DimensionMismatch {
        /// Dimensions of the source bitmap (width, height)
        expected: (u32, u32),
        /// Dimensions of the offending mask (width, height)
        actual: (u32, u32),
    },

    /// The image cannot hold a crop of the requested aspect ratio
    #[error("Image too small: {0}")]
    ImageTooSmall(String),

    /// Export attempted before a crop rectangle exists
    #[error("Not ready: {0}")]
    NotReady(String),

    /// The external segmentation collaborator failed or timed out
    #[error("Segmentation unavailable: {0}")]
    SegmentationUnavailable(String),

    /// Input/output errors (file not found, permission denied, etc.)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Image decoding or encoding errors
    #[error("Image processing error: {0}")]
    Image(#[from] image::ImageError),

    /// Invalid configuration or parameters
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Generic processing failure
    #[error("Processing error: {0}")]
    Processing(String),
}

impl PhotoError {
    /// Create a new invalid input error
    pub fn invalid_input<S: Into<String>>(msg: S) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Create a new dimension mismatch error
    #[must_use]
    pub fn dimension_mismatch(expected: (u32, u32), actual: (u32, u32)) -> Self {
        Self::DimensionMismatch { expected, actual }
    }

    /// Create a new image-too-small error
    pub fn image_too_small<S: Into<String>>(msg: S) -> Self {
        Self::ImageTooSmall(msg.into())
    }

    /// Create a new not-ready error
    pub fn not_ready<S: Into<String>>(msg: S) -> Self {
        Self::NotReady(msg.into())
    }

    /// Create a new segmentation-unavailable error
    pub fn segmentation_unavailable<S: Into<String>>(msg: S) -> Self {
        Self::SegmentationUnavailable(msg.into())
    }

    /// Create a new invalid configuration error
    pub fn invalid_config<S: Into<String>>(msg: S) -> Self {
        Self::InvalidConfig(msg.into())
    }

    /// Create a new processing error
    pub fn processing<S: Into<String>>(msg: S) -> Self {
        Self::Processing(msg.into())
    }

    /// Create file I/O error with operation context
    pub fn file_io_error<P: AsRef<std::path::Path>>(
        operation: &str,
        path: P,
        error: &std::io::Error,
    ) -> Self {
        let path_display = path.as_ref().display();
        Self::Io(std::io::Error::new(
            error.kind(),
            format!("Failed to {} '{}': {}", operation, path_display, error),
        ))
    }

    /// Create configuration error with valid ranges
    pub fn config_value_error<T: std::fmt::Display>(
        parameter: &str,
        value: T,
        valid_range: &str,
    ) -> Self {
        Self::InvalidConfig(format!(
            "Invalid {}: {} (valid range: {})",
            parameter, value, valid_range
        ))
    }

    /// Whether the error is an expected user-facing condition rather than a failure
    ///
    /// Frontends disable the export action for these instead of reporting an error.
    #[must_use]
    pub fn is_user_facing(&self) -> bool {
        matches!(self, Self::ImageTooSmall(_) | Self::NotReady(_))
    }
}

//! Image I/O operations service
//!
//! Keeps file and codec handling out of the pipeline modules so that the
//! controller only ever sees decoded bitmaps and finished images.

use crate::{
    config::{ExportFormat, OutputSpec},
    error::{PhotoError, Result},
    types::{Bitmap, FinalImage, Mask},
};
use image::{
    codecs::{jpeg::JpegEncoder, png::PngEncoder},
    DynamicImage, ExtendedColorType, ImageEncoder,
};
use std::path::{Path, PathBuf};

/// Service for loading photos and masks and writing exported photos
pub struct ImageIOService;

impl ImageIOService {
    /// Load a photo from a file path
    ///
    /// The format is detected from the extension first and from the file
    /// content when the extension is missing or wrong.
    ///
    /// # Errors
    /// - File does not exist or cannot be read
    /// - Content is not a decodable image
    /// - Image has a zero dimension
    ///
    /// # Examples
    /// ```rust,no_run
    /// use passport_photo::services::ImageIOService;
    ///
    /// let photo = ImageIOService::load_bitmap("portrait.jpg")?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn load_bitmap<P: AsRef<Path>>(path: P) -> Result<Bitmap> {
        let image = Self::load_dynamic(path.as_ref())?;
        Bitmap::from_dynamic(&image)
    }

    /// Decode a photo from raw file bytes
    ///
    /// # Errors
    /// Returns an error when the bytes are not a decodable image.
    pub fn load_bitmap_from_bytes(bytes: &[u8]) -> Result<Bitmap> {
        let image = image::load_from_memory(bytes).map_err(|e| {
            PhotoError::invalid_input(format!("Failed to decode image from bytes: {}", e))
        })?;
        Bitmap::from_dynamic(&image)
    }

    /// Load a grayscale mask image; luminance 255 means fully foreground
    ///
    /// Color masks are converted to luminance first.
    ///
    /// # Errors
    /// - File does not exist or cannot be read
    /// - Content is not a decodable image
    pub fn load_mask<P: AsRef<Path>>(path: P) -> Result<Mask> {
        let image = Self::load_dynamic(path.as_ref())?;
        let mask = Mask::from_luma(&image.to_luma8());
        log::debug!(
            "Loaded {}x{} mask from {}",
            mask.width(),
            mask.height(),
            path.as_ref().display()
        );
        Ok(mask)
    }

    fn load_dynamic(path: &Path) -> Result<DynamicImage> {
        if !path.exists() {
            return Err(PhotoError::file_io_error(
                "read image file",
                path,
                &std::io::Error::new(std::io::ErrorKind::NotFound, "file does not exist"),
            ));
        }

        match image::open(path) {
            Ok(image) => Ok(image),
            Err(e) => {
                log::debug!(
                    "Extension-based loading failed for {}: {}. Attempting content-based detection.",
                    path.display(),
                    e
                );
                let data = std::fs::read(path)
                    .map_err(|io_err| PhotoError::file_io_error("read image data", path, &io_err))?;
                image::load_from_memory(&data).map_err(|content_err| {
                    PhotoError::invalid_input(format!(
                        "Failed to decode '{}': {}",
                        path.display(),
                        content_err
                    ))
                })
            },
        }
    }

    /// Encode a finished photo
    ///
    /// Both formats are written as 8-bit RGB; the photo is opaque so no
    /// alpha channel is kept. `quality` only affects JPEG.
    ///
    /// # Errors
    /// Returns `InvalidConfig` for a JPEG quality outside 1-100, or the
    /// encoder's error.
    pub fn encode(image: &FinalImage, format: ExportFormat, quality: u8) -> Result<Vec<u8>> {
        let rgb = DynamicImage::ImageRgba8(image.bitmap().as_image().clone()).to_rgb8();
        let (width, height) = rgb.dimensions();
        let mut buffer = Vec::new();

        match format {
            ExportFormat::Jpeg => {
                if quality == 0 || quality > 100 {
                    return Err(PhotoError::config_value_error(
                        "JPEG quality",
                        quality,
                        "1-100",
                    ));
                }
                JpegEncoder::new_with_quality(&mut buffer, quality).write_image(
                    rgb.as_raw(),
                    width,
                    height,
                    ExtendedColorType::Rgb8,
                )?;
            },
            ExportFormat::Png => {
                PngEncoder::new(&mut buffer).write_image(
                    rgb.as_raw(),
                    width,
                    height,
                    ExtendedColorType::Rgb8,
                )?;
            },
        }

        log::debug!(
            "Encoded {}x{} {} photo ({} bytes)",
            width,
            height,
            format.extension(),
            buffer.len()
        );
        Ok(buffer)
    }

    /// Name of an exported file: `<standard id>-photo.<extension>`
    #[must_use]
    pub fn export_file_name(spec: &OutputSpec, format: ExportFormat) -> String {
        format!("{}-photo.{}", spec.id, format.extension())
    }

    /// Write a finished photo to disk
    ///
    /// When `destination` is an existing directory, or has no extension, the
    /// photo is written inside it under [`Self::export_file_name`] in the
    /// requested `format`. Otherwise `destination` is the file path and its
    /// extension decides the format. Missing parent directories are created.
    ///
    /// # Errors
    /// - `destination` names a file with an extension other than jpg, jpeg or png
    /// - Directory creation or file write fails
    /// - Encoding fails
    pub fn export<P: AsRef<Path>>(
        image: &FinalImage,
        destination: P,
        format: ExportFormat,
        quality: u8,
    ) -> Result<PathBuf> {
        let destination = destination.as_ref();
        let (path, format) = match destination.extension() {
            Some(ext) if !destination.is_dir() => {
                let named = ext
                    .to_str()
                    .and_then(ExportFormat::from_extension)
                    .ok_or_else(|| {
                        PhotoError::invalid_input(format!(
                            "Cannot export to {}: use a .jpg, .jpeg or .png file name",
                            destination.display()
                        ))
                    })?;
                if named != format {
                    log::debug!(
                        "Export path {} overrides {} with {}",
                        destination.display(),
                        format.extension(),
                        named.extension()
                    );
                }
                (destination.to_path_buf(), named)
            },
            _ => (
                destination.join(Self::export_file_name(image.spec(), format)),
                format,
            ),
        };

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| PhotoError::file_io_error("create output directory", parent, &e))?;
            }
        }

        let bytes = Self::encode(image, format, quality)?;
        std::fs::write(&path, &bytes)
            .map_err(|e| PhotoError::file_io_error("write photo", &path, &e))?;

        log::info!("Exported {} photo to {}", image.spec().id, path.display());
        Ok(path)
    }

    /// Check if a file path has an extension this crate can decode
    pub fn is_supported_format<P: AsRef<Path>>(path: P) -> bool {
        path.as_ref()
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| matches!(ext.to_lowercase().as_str(), "jpg" | "jpeg" | "png"))
            .unwrap_or(false)
    }
}

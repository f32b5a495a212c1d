//! Segmentation collaborator boundary
//!
//! The crate never computes foreground masks itself. A [`SegmentationBackend`]
//! hands one over for a decoded photo; [`SegmentationService`] bounds the call
//! with a timeout, validates the result and degrades to an all-opaque mask when
//! the collaborator fails, so the pipeline is never blocked on it.

use crate::{
    error::{PhotoError, Result},
    services::ImageIOService,
    types::{Bitmap, Mask},
};
use async_trait::async_trait;
use instant::Instant;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

/// External producer of foreground-probability masks
#[async_trait]
pub trait SegmentationBackend: Send + Sync {
    /// Produce a mask for `source`
    ///
    /// # Errors
    /// Any error is treated by the caller as the collaborator being unavailable.
    async fn segment(&self, source: &Bitmap) -> Result<Mask>;

    /// Short name used in logs
    fn name(&self) -> &str;
}

/// Mask precomputed by an external tool and stored as a grayscale image
///
/// Masks whose size differs from the photo are resized to match.
#[derive(Debug, Clone)]
pub struct MaskFileBackend {
    path: PathBuf,
}

impl MaskFileBackend {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl SegmentationBackend for MaskFileBackend {
    async fn segment(&self, source: &Bitmap) -> Result<Mask> {
        let path = self.path.clone();
        let mask = tokio::task::spawn_blocking(move || ImageIOService::load_mask(&path))
            .await
            .map_err(|e| PhotoError::processing(format!("Mask loading task failed: {}", e)))??;

        let (width, height) = source.dimensions();
        if mask.dimensions() == (width, height) {
            Ok(mask)
        } else {
            debug!(
                from = ?mask.dimensions(),
                to = ?(width, height),
                "resizing mask file to photo dimensions"
            );
            mask.resize(width, height)
        }
    }

    fn name(&self) -> &str {
        "mask-file"
    }
}

/// In-memory mask handed over by a caller that ran segmentation itself
#[derive(Debug, Clone)]
pub struct StaticMaskBackend {
    mask: Mask,
}

impl StaticMaskBackend {
    #[must_use]
    pub fn new(mask: Mask) -> Self {
        Self { mask }
    }
}

#[async_trait]
impl SegmentationBackend for StaticMaskBackend {
    async fn segment(&self, _source: &Bitmap) -> Result<Mask> {
        Ok(self.mask.clone())
    }

    fn name(&self) -> &str {
        "static"
    }
}

/// Backend standing in for a collaborator that is not available
#[derive(Debug, Clone, Default)]
pub struct UnavailableBackend {
    reason: String,
}

impl UnavailableBackend {
    pub fn new<S: Into<String>>(reason: S) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl SegmentationBackend for UnavailableBackend {
    async fn segment(&self, _source: &Bitmap) -> Result<Mask> {
        Err(PhotoError::segmentation_unavailable(if self.reason.is_empty() {
            "no segmentation backend configured"
        } else {
            self.reason.as_str()
        }))
    }

    fn name(&self) -> &str {
        "unavailable"
    }
}

/// Result of a segmentation request after fallback handling
#[derive(Debug)]
pub struct SegmentationOutcome {
    /// Mask with the photo's dimensions; all-opaque when the collaborator failed
    pub mask: Mask,
    /// Why the collaborator's mask was not used, if it was not
    pub fallback_reason: Option<PhotoError>,
    /// Wall time spent waiting for the collaborator
    pub elapsed_ms: u64,
}

impl SegmentationOutcome {
    /// Resolve a collaborator's answer for a photo of `dimensions`
    ///
    /// A failed answer, or a mask of any other size, is replaced by an
    /// all-opaque mask and recorded as `SegmentationUnavailable`.
    #[must_use]
    pub fn from_result(result: Result<Mask>, dimensions: (u32, u32), elapsed_ms: u64) -> Self {
        let (width, height) = dimensions;
        let fallback_reason = match result {
            Ok(mask) if mask.dimensions() == dimensions => {
                return Self {
                    mask,
                    fallback_reason: None,
                    elapsed_ms,
                };
            },
            Ok(mask) => PhotoError::segmentation_unavailable(format!(
                "collaborator returned a {:?} mask for a {:?} photo",
                mask.dimensions(),
                dimensions
            )),
            Err(PhotoError::SegmentationUnavailable(msg)) => {
                PhotoError::segmentation_unavailable(msg)
            },
            Err(e) => PhotoError::segmentation_unavailable(e.to_string()),
        };
        Self {
            mask: Mask::opaque(width, height),
            fallback_reason: Some(fallback_reason),
            elapsed_ms,
        }
    }

    /// Whether the all-opaque fallback mask was applied
    #[must_use]
    pub fn used_fallback(&self) -> bool {
        self.fallback_reason.is_some()
    }
}

/// Timeout and fallback policy around a segmentation backend
#[derive(Clone)]
pub struct SegmentationService {
    backend: Arc<dyn SegmentationBackend>,
    timeout: Duration,
}

impl SegmentationService {
    pub fn new(backend: Arc<dyn SegmentationBackend>, timeout: Duration) -> Self {
        Self { backend, timeout }
    }

    #[must_use]
    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Ask the backend for a mask without any fallback
    ///
    /// # Errors
    /// `SegmentationUnavailable` when the backend fails, times out or returns a
    /// mask whose dimensions differ from the photo.
    #[instrument(skip(self, source), fields(backend = self.backend.name()))]
    pub async fn segment(&self, source: &Bitmap) -> Result<Mask> {
        let mask = match tokio::time::timeout(self.timeout, self.backend.segment(source)).await {
            Ok(Ok(mask)) => mask,
            Ok(Err(PhotoError::SegmentationUnavailable(msg))) => {
                return Err(PhotoError::segmentation_unavailable(msg))
            },
            Ok(Err(e)) => return Err(PhotoError::segmentation_unavailable(e.to_string())),
            Err(_) => {
                return Err(PhotoError::segmentation_unavailable(format!(
                    "backend '{}' timed out after {} ms",
                    self.backend.name(),
                    self.timeout.as_millis()
                )))
            },
        };

        if mask.dimensions() != source.dimensions() {
            return Err(PhotoError::segmentation_unavailable(format!(
                "backend '{}' returned a {:?} mask for a {:?} photo",
                self.backend.name(),
                mask.dimensions(),
                source.dimensions()
            )));
        }
        Ok(mask)
    }

    /// Ask the backend for a mask, degrading to an all-opaque mask on failure
    pub async fn segment_or_fallback(&self, source: &Bitmap) -> SegmentationOutcome {
        let start = Instant::now();
        let result = self.segment(source).await;
        let elapsed_ms = start.elapsed().as_millis() as u64;

        let outcome = SegmentationOutcome::from_result(result, source.dimensions(), elapsed_ms);
        match &outcome.fallback_reason {
            None => info!(backend = self.backend.name(), elapsed_ms, "segmentation mask ready"),
            Some(e) => warn!(
                backend = self.backend.name(),
                error = %e,
                "segmentation unavailable, treating the whole photo as foreground"
            ),
        }
        outcome
    }
}

impl std::fmt::Debug for SegmentationService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SegmentationService")
            .field("backend", &self.backend.name())
            .field("timeout", &self.timeout)
            .finish()
    }
}

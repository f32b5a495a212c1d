//! Progress reporting service
//!
//! Separates progress reporting from the pipeline so that frontends can
//! render stages however they like (log lines, a spinner, nothing at all).

use instant::Instant;

/// Stages a photo passes through between upload and export
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessingStage {
    /// Photo received and decoded
    Upload,
    /// Waiting for the segmentation collaborator
    Segmentation,
    /// Softening the mask edge
    Feathering,
    /// Flattening the photo onto the background color
    Compositing,
    /// Fitting the crop rectangle
    Cropping,
    /// Resampling the crop to the output size
    Rendering,
    /// Encoding and writing the exported file
    Encoding,
    /// Processing completed
    Completed,
}

impl ProcessingStage {
    /// Get a human-readable description of the processing stage
    #[must_use]
    pub fn description(&self) -> &'static str {
        match self {
            ProcessingStage::Upload => "Loading photo",
            ProcessingStage::Segmentation => "Separating background",
            ProcessingStage::Feathering => "Feathering mask edge",
            ProcessingStage::Compositing => "Replacing background",
            ProcessingStage::Cropping => "Fitting crop",
            ProcessingStage::Rendering => "Rendering photo",
            ProcessingStage::Encoding => "Saving photo",
            ProcessingStage::Completed => "Photo ready",
        }
    }

    /// Get the typical progress percentage for this stage
    #[must_use]
    pub fn progress_percentage(&self) -> u8 {
        match self {
            ProcessingStage::Upload => 5,
            ProcessingStage::Segmentation => 40,
            ProcessingStage::Feathering => 55,
            ProcessingStage::Compositing => 65,
            ProcessingStage::Cropping => 70,
            ProcessingStage::Rendering => 90,
            ProcessingStage::Encoding => 98,
            ProcessingStage::Completed => 100,
        }
    }
}

/// Progress update containing stage and timing information
#[derive(Debug, Clone)]
pub struct ProgressUpdate {
    /// Current processing stage
    pub stage: ProcessingStage,
    /// Progress percentage (0-100)
    pub progress: u8,
    /// Human-readable stage description
    pub description: String,
    /// Elapsed time since processing started (milliseconds)
    pub elapsed_ms: u64,
}

impl ProgressUpdate {
    /// Create a new progress update
    #[must_use]
    pub fn new(stage: ProcessingStage, start_time: Instant) -> Self {
        Self {
            progress: stage.progress_percentage(),
            description: stage.description().to_string(),
            elapsed_ms: start_time.elapsed().as_millis() as u64,
            stage,
        }
    }
}

/// Wall-clock time spent in each pipeline step, in milliseconds
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PipelineTimings {
    pub segmentation_ms: u64,
    pub compositing_ms: u64,
    pub rendering_ms: u64,
    pub total_ms: u64,
}

/// Trait for reporting progress of a photo session
pub trait ProgressReporter: Send + Sync {
    /// Report a progress update
    fn report_progress(&self, update: ProgressUpdate);

    /// Report that a photo was rendered, with the timings of its steps
    fn report_completion(&self, timings: &PipelineTimings);

    /// Report an error during processing
    fn report_error(&self, stage: ProcessingStage, error: &str);
}

/// No-op progress reporter that discards all progress updates
pub struct NoOpProgressReporter;

impl ProgressReporter for NoOpProgressReporter {
    fn report_progress(&self, _update: ProgressUpdate) {}

    fn report_completion(&self, _timings: &PipelineTimings) {}

    fn report_error(&self, _stage: ProcessingStage, _error: &str) {}
}

/// Progress tracker that manages timing and progress reporting
pub struct ProgressTracker {
    reporter: Box<dyn ProgressReporter>,
    start_time: Instant,
    current_stage: Option<ProcessingStage>,
}

impl ProgressTracker {
    /// Create a new progress tracker with the specified reporter
    #[must_use]
    pub fn new(reporter: Box<dyn ProgressReporter>) -> Self {
        Self {
            reporter,
            start_time: Instant::now(),
            current_stage: None,
        }
    }

    /// Create a progress tracker that discards everything
    #[must_use]
    pub fn no_op() -> Self {
        Self::new(Box::new(NoOpProgressReporter))
    }

    /// Restart the clock, e.g. when a new photo is uploaded
    pub fn restart(&mut self) {
        self.start_time = Instant::now();
        self.current_stage = None;
    }

    /// Report progress for a specific stage
    pub fn report_stage(&mut self, stage: ProcessingStage) {
        self.current_stage = Some(stage);
        self.reporter
            .report_progress(ProgressUpdate::new(stage, self.start_time));
    }

    /// Report completion with final timings
    pub fn report_completion(&self, timings: &PipelineTimings) {
        self.reporter.report_completion(timings);
    }

    /// Report an error against the current stage
    pub fn report_error(&self, error: &str) {
        let stage = self.current_stage.unwrap_or(ProcessingStage::Upload);
        self.reporter.report_error(stage, error);
    }

    /// Get the elapsed time since tracking started
    #[must_use]
    pub fn elapsed_ms(&self) -> u64 {
        self.start_time.elapsed().as_millis() as u64
    }

    /// Get the current processing stage
    #[must_use]
    pub fn current_stage(&self) -> Option<ProcessingStage> {
        self.current_stage
    }
}

impl std::fmt::Debug for ProgressTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressTracker")
            .field("current_stage", &self.current_stage)
            .finish_non_exhaustive()
    }
}

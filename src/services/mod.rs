//! Services that keep I/O and reporting out of the pipeline modules

pub mod io;
pub mod progress;

pub use io::ImageIOService;
pub use progress::{
    NoOpProgressReporter, PipelineTimings, ProcessingStage, ProgressReporter, ProgressTracker,
    ProgressUpdate,
};

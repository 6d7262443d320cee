//! Progress reporting service
//!
//! Keeps progress reporting out of the pipeline so a frontend can forward
//! stage events (logs today, a streaming response later) without the
//! pipeline or the inference argument contract changing.

use std::sync::Arc;
use std::time::Instant;

/// Stages of one generation request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessingStage {
    /// Checking upload content types
    MediaTypeCheck,
    /// Writing uploads into the request workspace
    Staging,
    /// Reading input dimensions
    Probing,
    /// Computing inference parameters
    ParameterDerivation,
    /// External inference process running
    Inference,
    /// Verifying and handing off the output
    Finalizing,
    /// Request completed
    Completed,
}

impl ProcessingStage {
    /// Get a human-readable description of the processing stage
    #[must_use]
    pub fn description(&self) -> &'static str {
        match self {
            ProcessingStage::MediaTypeCheck => "Checking upload types",
            ProcessingStage::Staging => "Staging uploads",
            ProcessingStage::Probing => "Probing input media",
            ProcessingStage::ParameterDerivation => "Deriving inference parameters",
            ProcessingStage::Inference => "Running lip-sync inference",
            ProcessingStage::Finalizing => "Finalizing output video",
            ProcessingStage::Completed => "Processing completed",
        }
    }

    /// Get the typical progress percentage for this stage
    #[must_use]
    pub fn progress_percentage(&self) -> u8 {
        match self {
            ProcessingStage::MediaTypeCheck => 1,
            ProcessingStage::Staging => 5,
            ProcessingStage::Probing => 8,
            ProcessingStage::ParameterDerivation => 10,
            ProcessingStage::Inference => 15,
            ProcessingStage::Finalizing => 95,
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

/// Trait for reporting progress of a generation request
pub trait ProgressReporter: Send + Sync {
    /// Report a progress update
    fn report_progress(&self, update: ProgressUpdate);

    /// Report request completion
    fn report_completion(&self, total_ms: u64);

    /// Report an error during processing
    fn report_error(&self, stage: ProcessingStage, error: &str);
}

/// No-op progress reporter that discards all progress updates
pub struct NoOpProgressReporter;

impl ProgressReporter for NoOpProgressReporter {
    fn report_progress(&self, _update: ProgressUpdate) {}

    fn report_completion(&self, _total_ms: u64) {}

    fn report_error(&self, _stage: ProcessingStage, _error: &str) {}
}

/// Emits progress as tracing events
pub struct TracingProgressReporter;

impl ProgressReporter for TracingProgressReporter {
    fn report_progress(&self, update: ProgressUpdate) {
        tracing::debug!(
            stage = ?update.stage,
            progress = update.progress,
            elapsed_ms = update.elapsed_ms,
            "{}",
            update.description
        );
    }

    fn report_completion(&self, total_ms: u64) {
        tracing::info!(total_ms, "✅ Lip-sync video generated");
    }

    fn report_error(&self, stage: ProcessingStage, error: &str) {
        tracing::warn!(stage = ?stage, error = %error, "❌ Error during {}", stage.description());
    }
}

/// Tracks the stages of a single request against one reporter
#[derive(Clone)]
pub struct ProgressTracker {
    reporter: Arc<dyn ProgressReporter>,
    start_time: Instant,
    current: Option<ProcessingStage>,
}

impl ProgressTracker {
    #[must_use]
    pub fn new(reporter: Arc<dyn ProgressReporter>) -> Self {
        Self {
            reporter,
            start_time: Instant::now(),
            current: None,
        }
    }

    /// Report entering a stage
    pub fn report_stage(&mut self, stage: ProcessingStage) {
        self.current = Some(stage);
        self.reporter
            .report_progress(ProgressUpdate::new(stage, self.start_time));
    }

    /// Report a failure in the current stage
    pub fn report_error(&self, error: &str) {
        let stage = self.current.unwrap_or(ProcessingStage::MediaTypeCheck);
        self.reporter.report_error(stage, error);
    }

    /// Report completion with the total elapsed time
    pub fn report_completion(&mut self) {
        self.report_stage(ProcessingStage::Completed);
        self.reporter
            .report_completion(self.start_time.elapsed().as_millis() as u64);
    }

    /// Stage most recently entered
    #[must_use]
    pub fn current_stage(&self) -> Option<ProcessingStage> {
        self.current
    }
}

//! Structured job logging utilities.
//!
//! Provides consistent, structured logging for job processing with
//! tracing spans and contextual information.

use tracing::{error, info, warn, Span};
use ugc_models::JobId;

use crate::error::Stage;

/// Job logger for structured logging with consistent formatting.
///
/// Every event carries the job ID and the intensity label so log lines of
/// concurrent jobs can be told apart.
#[derive(Debug, Clone)]
pub struct JobLogger {
    job_id: String,
    intensity: String,
}

impl JobLogger {
    pub fn new(job_id: &JobId, intensity: &str) -> Self {
        Self {
            job_id: job_id.to_string(),
            intensity: intensity.to_string(),
        }
    }

    /// Log the start of a job.
    pub fn log_start(&self, message: &str) {
        info!(
            job_id = %self.job_id,
            intensity = %self.intensity,
            "Job started: {}", message
        );
    }

    /// Log entry into a pipeline stage.
    pub fn log_stage(&self, stage: Stage, message: &str) {
        info!(
            job_id = %self.job_id,
            stage = %stage,
            "Job progress: {}", message
        );
    }

    /// Log a degraded-success warning.
    pub fn log_warning(&self, stage: Stage, message: &str) {
        warn!(
            job_id = %self.job_id,
            stage = %stage,
            "Job warning: {}", message
        );
    }

    pub fn log_error(&self, message: &str) {
        error!(
            job_id = %self.job_id,
            intensity = %self.intensity,
            "Job error: {}", message
        );
    }

    /// Log the completion of a job.
    pub fn log_completion(&self, message: &str, elapsed_secs: f64) {
        info!(
            job_id = %self.job_id,
            intensity = %self.intensity,
            elapsed_secs,
            "Job completed: {}", message
        );
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub fn intensity(&self) -> &str {
        &self.intensity
    }

    /// Create a tracing span for this job.
    ///
    /// Events from the media crate emitted inside the span inherit the job ID.
    pub fn create_span(&self) -> Span {
        tracing::info_span!(
            "job",
            job_id = %self.job_id,
            intensity = %self.intensity
        )
    }
}

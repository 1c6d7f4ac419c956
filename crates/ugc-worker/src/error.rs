//! Worker error types.

use std::fmt;
use thiserror::Error;
use ugc_media::MediaError;

pub type WorkerResult<T> = Result<T, WorkerError>;

/// Pipeline stage, used to name where a job failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Validate,
    Randomize,
    Overlay,
    Deliver,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Validate => "validate",
            Stage::Randomize => "randomize",
            Stage::Overlay => "overlay",
            Stage::Deliver => "deliver",
        }
    }

    /// Plain-language name for user-facing messages.
    fn describe(&self) -> &'static str {
        match self {
            Stage::Validate => "checking the input files",
            Stage::Randomize => "randomizing the video",
            Stage::Overlay => "adding the product overlay",
            Stage::Deliver => "saving the final video",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Job failed while {}: {message}", .stage.describe())]
    StageFailed {
        stage: Stage,
        message: String,
        #[source]
        source: Option<MediaError>,
    },

    #[error("Job cancelled before {}", .0.describe())]
    Cancelled(Stage),

    #[error("Invalid job request: {0}")]
    InvalidRequest(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl WorkerError {
    /// Wrap a fatal media error with the stage it happened in.
    ///
    /// Cancellation is kept distinct so callers can tell it from a failure.
    pub fn stage(stage: Stage, cause: MediaError) -> Self {
        if matches!(cause, MediaError::Cancelled) {
            return Self::Cancelled(stage);
        }
        let message = match &cause {
            MediaError::FileNotFound(path) => format!("input file not found: {}", path.display()),
            MediaError::EmptyFile(path) => format!("input file is empty: {}", path.display()),
            MediaError::Timeout(secs) => format!("FFmpeg did not finish within {} seconds", secs),
            MediaError::FfmpegNotFound | MediaError::FfprobeNotFound => {
                "FFmpeg is not installed on this machine".to_string()
            }
            other => other.to_string(),
        };
        Self::StageFailed {
            stage,
            message,
            source: Some(cause),
        }
    }

    pub fn invalid_request(msg: impl Into<String>) -> Self {
        Self::InvalidRequest(msg.into())
    }

    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, WorkerError::Cancelled(_))
    }

    /// Stage the job stopped in, if known.
    pub fn failed_stage(&self) -> Option<Stage> {
        match self {
            WorkerError::StageFailed { stage, .. } | WorkerError::Cancelled(stage) => Some(*stage),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_stage_message_names_stage_and_file() {
        let err = WorkerError::stage(Stage::Validate, MediaError::FileNotFound(PathBuf::from("/in/voice.mp3")));
        assert_eq!(
            err.to_string(),
            "Job failed while checking the input files: input file not found: /in/voice.mp3"
        );
        assert_eq!(err.failed_stage(), Some(Stage::Validate));
    }

    #[test]
    fn test_cancel_is_not_a_failure() {
        let err = WorkerError::stage(Stage::Overlay, MediaError::Cancelled);
        assert!(err.is_cancelled());
        assert_eq!(err.to_string(), "Job cancelled before adding the product overlay");
    }

    #[test]
    fn test_timeout_message() {
        let err = WorkerError::stage(Stage::Randomize, MediaError::Timeout(1200));
        assert!(err.to_string().contains("within 1200 seconds"));
    }
}

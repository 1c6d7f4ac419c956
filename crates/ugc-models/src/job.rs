//! Job identifiers and requests.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use uuid::Uuid;

use crate::{OverlayRequest, RandomizationProfile};

/// Unique identifier for a job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct JobId(pub String);

impl JobId {
    /// Generate a new random job ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First UUID group, used in intermediate file names.
    pub fn short(&self) -> &str {
        self.0.split('-').next().unwrap_or(&self.0)
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One ad-generation run handed to the worker.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct JobRequest {
    /// Assigned when omitted
    #[serde(default)]
    pub job_id: JobId,

    /// Lip-synced or stitched source video
    pub source_video: PathBuf,

    /// Pristine TTS voice track
    pub tts_audio: PathBuf,

    /// Intensity label; unknown values fall back to medium
    #[serde(default = "default_intensity")]
    pub intensity: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub overlay: Option<OverlayRequest>,

    /// Final deliverable path; defaults to the worker output directory
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_path: Option<PathBuf>,

    /// Custom profile used instead of the intensity table
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile_override: Option<RandomizationProfile>,
}

fn default_intensity() -> String {
    "medium".to_string()
}

impl JobRequest {
    pub fn new(
        source_video: impl Into<PathBuf>,
        tts_audio: impl Into<PathBuf>,
        intensity: impl Into<String>,
    ) -> Self {
        Self {
            job_id: JobId::new(),
            source_video: source_video.into(),
            tts_audio: tts_audio.into(),
            intensity: intensity.into(),
            overlay: None,
            output_path: None,
            profile_override: None,
        }
    }

    pub fn with_overlay(mut self, overlay: OverlayRequest) -> Self {
        self.overlay = Some(overlay);
        self
    }

    pub fn with_output_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.output_path = Some(path.into());
        self
    }
}

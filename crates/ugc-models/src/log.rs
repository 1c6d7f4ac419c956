//! Audit log of every randomization decision taken for a job.
//!
//! The log is returned by the media core and persisted by the worker as a
//! sidecar JSON file next to the final output.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::{EncoderChoice, Intensity, JobId, KeywordTiming, OverlayGeometry};

/// Outcome of one effect's activation roll.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct EffectDetail {
    pub applied: bool,
    pub probability: f64,
    /// Uniform draw compared against `probability`
    pub roll: f64,
    /// Sampled values; `null` when the effect was skipped
    #[serde(default)]
    pub params: serde_json::Value,
}

impl EffectDetail {
    pub fn skipped(probability: f64, roll: f64) -> Self {
        Self {
            applied: false,
            probability,
            roll,
            params: serde_json::Value::Null,
        }
    }

    pub fn applied(probability: f64, roll: f64, params: serde_json::Value) -> Self {
        Self {
            applied: true,
            probability,
            roll,
            params,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct VisualLog {
    pub applied: bool,
    pub effects_applied_detail: BTreeMap<String, EffectDetail>,
    pub frames_processed: u64,
    /// Frames where at least one effect failed and the frame was kept as-is
    #[serde(default)]
    pub frame_failures: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl VisualLog {
    pub fn applied_effects(&self) -> impl Iterator<Item = &str> {
        self.effects_applied_detail
            .iter()
            .filter(|(_, d)| d.applied)
            .map(|(name, _)| name.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct AudioLog {
    pub applied: bool,
    pub effects_applied_detail: BTreeMap<String, EffectDetail>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sample_rate: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channels: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct EncodingLog {
    pub applied: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encoder: Option<EncoderChoice>,
    /// FFmpeg audio filter chain used in the finalizer
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_filters: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub equalizer: Option<EffectDetail>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct MetadataLog {
    pub applied: bool,
    pub stripped: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decoy_roll: Option<f64>,
    #[serde(default)]
    pub decoys: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct OverlayLog {
    pub requested: bool,
    pub applied: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timing: Option<KeywordTiming>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub geometry: Option<OverlayGeometry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skipped_reason: Option<String>,
}

/// Complete record of a job's randomization and overlay decisions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct RandomizationLog {
    pub job_id: JobId,
    /// Label as requested by the caller
    pub requested_intensity: String,
    /// Intensity actually resolved (unknown labels fall back to medium)
    pub intensity: Intensity,
    /// Seed of the job RNG
    pub seed: u64,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    pub visual: VisualLog,
    pub audio: AudioLog,
    pub metadata: MetadataLog,
    pub encoding: EncodingLog,
    pub overlay: OverlayLog,
    /// Degraded-success messages for the caller
    #[serde(default)]
    pub warnings: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_output: Option<PathBuf>,
}

impl RandomizationLog {
    pub fn new(job_id: JobId, requested_intensity: impl Into<String>, intensity: Intensity, seed: u64) -> Self {
        Self {
            job_id,
            requested_intensity: requested_intensity.into(),
            intensity,
            seed,
            started_at: Utc::now(),
            completed_at: None,
            visual: VisualLog::default(),
            audio: AudioLog::default(),
            metadata: MetadataLog::default(),
            encoding: EncodingLog::default(),
            overlay: OverlayLog::default(),
            warnings: Vec::new(),
            final_output: None,
        }
    }

    pub fn warn(&mut self, message: impl Into<String>) {
        self.warnings.push(message.into());
    }
}

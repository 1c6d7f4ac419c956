//! Output encoder configuration.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Output video codec (H.264)
pub const DEFAULT_VIDEO_CODEC: &str = "libx264";
/// Output audio codec
pub const DEFAULT_AUDIO_CODEC: &str = "aac";
/// Encoding preset used when encoding is not randomized
pub const DEFAULT_PRESET: &str = "medium";
/// CRF used when encoding is not randomized
pub const DEFAULT_CRF: u8 = 20;
/// Audio bitrate
pub const DEFAULT_AUDIO_BITRATE: &str = "192k";
/// Tune value meaning "no -tune flag"
pub const NO_TUNE: &str = "none";

/// Concrete encoder parameters chosen for one output file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct EncoderChoice {
    /// Constant Rate Factor (quality, 0-51, lower is better)
    pub crf: u8,

    /// x264 preset (e.g., "fast", "medium", "slow")
    pub preset: String,

    /// x264 tune, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tune: Option<String>,

    #[serde(default = "default_audio_bitrate")]
    pub audio_bitrate: String,
}

fn default_audio_bitrate() -> String {
    DEFAULT_AUDIO_BITRATE.to_string()
}

impl Default for EncoderChoice {
    fn default() -> Self {
        Self {
            crf: DEFAULT_CRF,
            preset: DEFAULT_PRESET.to_string(),
            tune: None,
            audio_bitrate: DEFAULT_AUDIO_BITRATE.to_string(),
        }
    }
}

impl EncoderChoice {
    pub fn new(crf: u8, preset: impl Into<String>, tune: Option<String>) -> Self {
        Self {
            crf: crf.min(51),
            preset: preset.into(),
            tune: tune.filter(|t| !t.is_empty() && t != NO_TUNE),
            ..Default::default()
        }
    }

    /// Video encoder arguments only.
    pub fn video_args(&self) -> Vec<String> {
        let mut args = vec![
            "-c:v".to_string(),
            DEFAULT_VIDEO_CODEC.to_string(),
            "-preset".to_string(),
            self.preset.clone(),
            "-crf".to_string(),
            self.crf.to_string(),
        ];

        if let Some(tune) = &self.tune {
            args.extend_from_slice(&["-tune".to_string(), tune.clone()]);
        }

        args.extend_from_slice(&["-pix_fmt".to_string(), "yuv420p".to_string()]);
        args
    }

    /// Convert to FFmpeg output arguments.
    pub fn to_ffmpeg_args(&self) -> Vec<String> {
        let mut args = self.video_args();
        args.extend_from_slice(&[
            "-c:a".to_string(),
            DEFAULT_AUDIO_CODEC.to_string(),
            "-b:a".to_string(),
            self.audio_bitrate.clone(),
        ]);
        args
    }
}

#![deny(unreachable_patterns)]
//! FFmpeg-driven video randomization for generated ad videos.
//!
//! This crate provides:
//! - Type-safe FFmpeg command building with enforced process timeouts
//! - Raw BGR frame I/O and a library of per-frame effects
//! - Profile-driven randomization: visual stack, offline audio DSP, final encode
//! - Offline speech transcription with word timings
//! - Keyword-timed product overlay compositing

pub mod audio_io;
pub mod command;
pub mod effects;
pub mod error;
pub mod frame;
pub mod fs_utils;
pub mod layout;
pub mod metrics;
pub mod overlay;
pub mod probe;
pub mod progress;
pub mod randomize;
pub mod transcription;

#[cfg(test)]
pub(crate) mod test_media;

pub use command::{check_ffmpeg, check_ffprobe, FfmpegCommand, FfmpegRunner, TimeoutPolicy};
pub use error::{MediaError, MediaResult};
pub use frame::{Frame, FrameReader, FrameWriter};
pub use fs_utils::{DirScratch, ScratchSpace};
pub use layout::DesignSpace;
pub use overlay::{OverlayCompositor, OverlayOutcome};
pub use probe::{probe_frame_dimensions, probe_video, VideoInfo};
pub use progress::FfmpegProgress;
pub use randomize::{
    check_cancelled, RandomizeRequest, Randomizer, AUDIO_FALLBACK_WARNING, VISUAL_FALLBACK_WARNING,
};
pub use transcription::{Transcriber, TranscriptionService};

#[cfg(feature = "whisper")]
pub use transcription::WhisperTranscriber;

//! Shared data models for the UGC ad randomization pipeline.
//!
//! This crate provides Serde-serializable types for:
//! - Randomization intensities and profiles (with validation)
//! - The per-job randomization audit log
//! - Product overlay requests, placement geometry and keyword timing
//! - Word-level transcripts
//! - Job requests and encoder choices

pub mod encoding;
pub mod intensity;
pub mod job;
pub mod log;
pub mod overlay;
pub mod profile;
pub mod transcript;

// Re-export common types
pub use encoding::EncoderChoice;
pub use intensity::{Intensity, IntensityParseError};
pub use job::{JobId, JobRequest};
pub use log::{
    AudioLog, EffectDetail, EncodingLog, MetadataLog, OverlayLog, RandomizationLog, VisualLog,
};
pub use overlay::{
    default_language_synonyms, HorizontalAnchor, KeywordTiming, OverlayGeometry,
    synonyms_for, OverlayPlacement, OverlayRequest, PlacementPreference, VerticalAnchor,
};
pub use profile::{
    AudioProfile, ChromaticRanges, EffectConfig, EncodingProfile, EqualizerRanges, GammaRanges,
    GlowRanges, HsvShiftRanges, LabShiftRanges, MetadataProfile, NoiseRanges, ParamRange,
    PitchRanges, ProfileError, RandomizationProfile, RangeSet, SharpenRanges, ShakeRanges,
    SpeckleRanges, TempoRanges, VisualProfile, VolumeRanges, TEMPO_RATE_MAX, TEMPO_RATE_MIN,
};
pub use transcript::{Transcript, TranscriptSegment, TranscriptWord};

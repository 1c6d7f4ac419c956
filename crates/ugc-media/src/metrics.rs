//! Metric names and recording helpers for the media pipeline.
//!
//! Recording is a no-op until the host process installs a recorder.

use metrics::{counter, histogram};

/// Metric names as constants for consistency.
pub mod names {
    pub const FFMPEG_DURATION_SECONDS: &str = "ugc_ffmpeg_duration_seconds";
    pub const FRAMES_PROCESSED_TOTAL: &str = "ugc_frames_processed_total";
    pub const EFFECT_FAILURES_TOTAL: &str = "ugc_effect_failures_total";
    pub const STAGE_FALLBACKS_TOTAL: &str = "ugc_stage_fallbacks_total";
    pub const STAGE_DURATION_SECONDS: &str = "ugc_stage_duration_seconds";
    pub const TRANSCRIPT_CACHE_TOTAL: &str = "ugc_transcript_cache_total";
    pub const TRANSCRIPTIONS_ABANDONED_TOTAL: &str = "ugc_transcriptions_abandoned_total";
    pub const OVERLAYS_TOTAL: &str = "ugc_overlays_total";
}

/// Record one FFmpeg invocation.
pub fn record_ffmpeg(duration_secs: f64, outcome: &'static str) {
    histogram!(names::FFMPEG_DURATION_SECONDS, "outcome" => outcome).record(duration_secs);
}

pub fn record_frames(count: u64) {
    counter!(names::FRAMES_PROCESSED_TOTAL).increment(count);
}

/// Record a single effect failing on a single frame.
pub fn record_effect_failure(effect: &'static str) {
    counter!(names::EFFECT_FAILURES_TOTAL, "effect" => effect).increment(1);
}

/// Record a best-effort stage falling back to its input.
pub fn record_fallback(stage: &'static str) {
    counter!(names::STAGE_FALLBACKS_TOTAL, "stage" => stage).increment(1);
}

pub fn record_stage(stage: &'static str, duration_secs: f64) {
    histogram!(names::STAGE_DURATION_SECONDS, "stage" => stage).record(duration_secs);
}

pub fn record_transcript_cache(hit: bool) {
    let outcome = if hit { "hit" } else { "miss" };
    counter!(names::TRANSCRIPT_CACHE_TOTAL, "outcome" => outcome).increment(1);
}

/// Record a transcription left running on its blocking thread after a timeout.
pub fn record_transcription_abandoned() {
    counter!(names::TRANSCRIPTIONS_ABANDONED_TOTAL).increment(1);
}

pub fn record_overlay(outcome: &'static str) {
    counter!(names::OVERLAYS_TOTAL, "outcome" => outcome).increment(1);
}

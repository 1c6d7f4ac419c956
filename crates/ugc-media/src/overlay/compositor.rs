//! FFmpeg filter graph for the keyword-timed product overlay.
//!
//! The overlay input is shifted with `-itsoffset` so that its own timeline
//! starts at the trigger moment. Gating with `enable=between(...)` alone would
//! show the clip's first frames frozen or out of step with the window; the
//! input offset moves the content, the `enable` expression only bounds it.

use std::path::Path;
use ugc_models::{EncoderChoice, KeywordTiming, OverlayGeometry};

use crate::command::FfmpegCommand;

/// Label of the composited video stream.
pub const OVERLAY_OUTPUT_LABEL: &str = "[vout]";

/// `filter_complex` graph compositing input 1 onto input 0.
pub fn overlay_filter(geometry: &OverlayGeometry, timing: &KeywordTiming) -> String {
    format!(
        "[1:v]scale={w}:{h},format=rgba[ov];\
         [0:v][ov]overlay=x={x}:y={y}:enable='between(t,{start:.3},{end:.3})':eof_action=pass{out}",
        w = geometry.width,
        h = geometry.height,
        x = geometry.x,
        y = geometry.y,
        start = timing.start,
        end = timing.end,
        out = OVERLAY_OUTPUT_LABEL,
    )
}

/// Full compositing command.
///
/// The clip is looped and cut to the window length so short product clips
/// still cover the whole window. Main audio is copied untouched and the
/// output keeps the main video's duration.
pub fn build_overlay_command(
    main: &Path,
    clip: &Path,
    output: &Path,
    geometry: &OverlayGeometry,
    timing: &KeywordTiming,
    main_duration: f64,
    encoder: &EncoderChoice,
) -> FfmpegCommand {
    let window = format!("{:.3}", timing.duration().max(0.0));
    let clip_args = ["-stream_loop", "-1", "-t", window.as_str()].map(String::from);

    FfmpegCommand::new(output)
        .input(main)
        .offset_input(clip, timing.start, &clip_args)
        .filter_complex(overlay_filter(geometry, timing))
        .map(OVERLAY_OUTPUT_LABEL)
        .map("0:a?")
        .output_args(encoder.video_args())
        .audio_codec("copy")
        .duration(main_duration)
        .faststart()
}

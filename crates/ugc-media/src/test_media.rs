//! Synthetic media fixtures for tests that need a real ffmpeg.

use std::path::Path;
use std::process::Command;

fn run(args: &[&str], output: &Path) -> bool {
    Command::new("ffmpeg")
        .args(["-y", "-nostdin", "-v", "error"])
        .args(args)
        .arg(output)
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

/// Test pattern video, optionally with a sine tone track.
pub fn synth_video(output: &Path, width: u32, height: u32, secs: f64, fps: u32, audio: bool) -> bool {
    let source = format!("testsrc=size={}x{}:rate={}", width, height, fps);
    synth_from(&source, output, secs, audio)
}

/// Single-color video, handy for checking where an overlay landed.
pub fn synth_color_video(output: &Path, color: &str, width: u32, height: u32, secs: f64, fps: u32, audio: bool) -> bool {
    let source = format!("color=c={}:size={}x{}:rate={}", color, width, height, fps);
    synth_from(&source, output, secs, audio)
}

fn synth_from(source: &str, output: &Path, secs: f64, audio: bool) -> bool {
    let duration = format!("{}", secs);
    let mut args = vec!["-f", "lavfi", "-i", source];
    let tone = format!("sine=frequency=440:sample_rate=44100:duration={}", secs);
    if audio {
        args.extend(["-f", "lavfi", "-i", tone.as_str()]);
    }
    args.extend(["-t", duration.as_str(), "-c:v", "libx264", "-pix_fmt", "yuv420p"]);
    if audio {
        args.extend(["-c:a", "aac", "-shortest"]);
    }
    run(&args, output)
}

/// Variable frame rate clip: 1 s at 20 fps then 2 s at 5 fps.
///
/// The container's nominal rate stays 20 while the average is 10.
pub fn synth_variable_rate_video(output: &Path, width: u32, height: u32) -> bool {
    let source = format!("testsrc=size={}x{}:rate=20", width, height);
    run(
        &[
            "-f", "lavfi", "-i", source.as_str(), "-t", "3",
            "-vf", "select='lt(n,20)+not(mod(n,4))'", "-vsync", "vfr",
            "-c:v", "libx264", "-pix_fmt", "yuv420p",
        ],
        output,
    )
}

/// Sine tone audio file; the codec follows the extension.
pub fn synth_tone(output: &Path, secs: f64) -> bool {
    let tone = format!("sine=frequency=440:sample_rate=44100:duration={}", secs);
    run(&["-f", "lavfi", "-i", tone.as_str()], output)
}

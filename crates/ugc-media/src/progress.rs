//! FFmpeg progress parsing.

use serde::{Deserialize, Serialize};

/// Progress information reported by `-progress pipe:2`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FfmpegProgress {
    /// Frames written so far
    pub frame: u64,
    /// Output time in milliseconds
    pub out_time_ms: i64,
    /// Encoding speed (e.g., 1.5 = 1.5x realtime)
    pub speed: f64,
    /// Whether encoding is complete
    pub is_complete: bool,
}

impl FfmpegProgress {
    /// Progress percentage given the expected output duration in milliseconds.
    pub fn percentage(&self, total_duration_ms: i64) -> f64 {
        if total_duration_ms <= 0 {
            return 0.0;
        }
        ((self.out_time_ms as f64 / total_duration_ms as f64) * 100.0).min(100.0)
    }

    /// Apply one `key=value` line. Returns true at the end of a progress block.
    pub fn update(&mut self, line: &str) -> bool {
        let Some((key, value)) = line.trim().split_once('=') else {
            return false;
        };

        match key {
            "out_time_us" => {
                if let Ok(us) = value.parse::<i64>() {
                    self.out_time_ms = us / 1000;
                }
            }
            "frame" => {
                if let Ok(frame) = value.parse() {
                    self.frame = frame;
                }
            }
            "speed" => {
                if let Some(speed) = value.strip_suffix('x').and_then(|s| s.trim().parse().ok()) {
                    self.speed = speed;
                }
            }
            "progress" => {
                self.is_complete = value == "end";
                return true;
            }
            _ => {}
        }
        false
    }

    /// Whether a stderr line is part of the progress stream rather than a log message.
    pub fn is_progress_line(line: &str) -> bool {
        const KEYS: &[&str] = &[
            "frame", "fps", "stream_0_0_q", "bitrate", "total_size", "out_time_us",
            "out_time_ms", "out_time", "dup_frames", "drop_frames", "speed", "progress",
        ];
        line.split_once('=')
            .map(|(key, _)| KEYS.contains(&key.trim()) || key.starts_with("stream_"))
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_updates() {
        let mut progress = FfmpegProgress::default();
        assert!(!progress.update("frame=120"));
        assert!(!progress.update("out_time_us=4000000"));
        assert!(!progress.update("speed=2.5x"));
        assert!(progress.update("progress=end"));

        assert_eq!(progress.frame, 120);
        assert_eq!(progress.out_time_ms, 4000);
        assert!((progress.speed - 2.5).abs() < 0.01);
        assert!(progress.is_complete);
        assert!((progress.percentage(8000) - 50.0).abs() < 0.01);
    }

    #[test]
    fn test_progress_line_detection() {
        assert!(FfmpegProgress::is_progress_line("frame=10"));
        assert!(FfmpegProgress::is_progress_line("stream_0_0_q=23.0"));
        assert!(!FfmpegProgress::is_progress_line("Error opening input file"));
    }
}

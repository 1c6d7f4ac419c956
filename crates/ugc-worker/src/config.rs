//! Worker configuration.

use std::path::PathBuf;
use ugc_media::TimeoutPolicy;

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Maximum concurrent jobs
    pub max_concurrent_jobs: usize,
    /// Work directory for intermediates, shared by all jobs
    pub work_dir: PathBuf,
    /// Where final videos go when a job does not name an output path
    pub output_dir: PathBuf,
    /// Wall-clock limit of every FFmpeg process
    pub ffmpeg_timeout: TimeoutPolicy,
    /// GGML whisper model; overlays are skipped without one
    pub whisper_model_path: Option<PathBuf>,
    /// Whisper language code, `auto` to detect
    pub whisper_language: String,
    /// Transcripts kept in memory, keyed by audio path
    pub transcript_cache_capacity: usize,
    /// Emit JSON log lines instead of the human-readable format
    pub json_logs: bool,
    /// Port of the Prometheus scrape endpoint, if any
    pub metrics_port: Option<u16>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        let work_dir = PathBuf::from("/tmp/ugc-work");
        Self {
            max_concurrent_jobs: 2,
            output_dir: work_dir.join("output"),
            work_dir,
            ffmpeg_timeout: TimeoutPolicy::default(),
            whisper_model_path: None,
            whisper_language: "auto".to_string(),
            transcript_cache_capacity: 32,
            json_logs: false,
            metrics_port: None,
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.trim().parse().ok())
}

fn env_string(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|s| !s.trim().is_empty())
}

impl WorkerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let work_dir = env_string("WORKER_WORK_DIR")
            .map(PathBuf::from)
            .unwrap_or(defaults.work_dir);
        let output_dir = env_string("WORKER_OUTPUT_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| work_dir.join("output"));

        let timeout_defaults = defaults.ffmpeg_timeout;
        let ffmpeg_timeout = TimeoutPolicy {
            base_secs: env_parse("FFMPEG_TIMEOUT_BASE_SECS").unwrap_or(timeout_defaults.base_secs),
            multiplier: env_parse("FFMPEG_TIMEOUT_MULTIPLIER").unwrap_or(timeout_defaults.multiplier),
            ceiling_secs: env_parse("FFMPEG_TIMEOUT_CEILING_SECS").unwrap_or(timeout_defaults.ceiling_secs),
        };

        Self {
            max_concurrent_jobs: env_parse::<usize>("WORKER_MAX_JOBS")
                .unwrap_or(defaults.max_concurrent_jobs)
                .max(1),
            work_dir,
            output_dir,
            ffmpeg_timeout,
            whisper_model_path: env_string("WHISPER_MODEL_PATH").map(PathBuf::from),
            whisper_language: env_string("WHISPER_LANGUAGE").unwrap_or(defaults.whisper_language),
            transcript_cache_capacity: env_parse("TRANSCRIPT_CACHE_CAPACITY")
                .unwrap_or(defaults.transcript_cache_capacity),
            json_logs: env_string("LOG_FORMAT").is_some_and(|f| f.eq_ignore_ascii_case("json")),
            metrics_port: env_parse("METRICS_PORT"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = WorkerConfig::default();
        assert_eq!(config.max_concurrent_jobs, 2);
        assert_eq!(config.output_dir, PathBuf::from("/tmp/ugc-work/output"));
        assert_eq!(config.ffmpeg_timeout.effective_secs(), 1200);
        assert_eq!(config.whisper_language, "auto");
        assert!(config.whisper_model_path.is_none());
    }
}

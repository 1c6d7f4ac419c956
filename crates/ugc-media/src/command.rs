//! FFmpeg command builder and runners.
//!
//! Every external process in the pipeline goes through [`FfmpegRunner`], which
//! enforces a wall-clock timeout and kills the child when it expires.

use std::collections::VecDeque;
use std::io::{BufRead, BufReader as StdBufReader};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tracing::{debug, warn};
use ugc_models::EncoderChoice;

use crate::error::{MediaError, MediaResult};
use crate::metrics;
use crate::progress::FfmpegProgress;

/// Number of stderr log lines kept for error reports.
const STDERR_TAIL_LINES: usize = 20;

/// Poll interval of the blocking runner.
const BLOCKING_POLL: Duration = Duration::from_millis(50);

/// One `-i` input together with the options that must precede it.
#[derive(Debug, Clone)]
struct FfmpegInput {
    args: Vec<String>,
    path: PathBuf,
}

/// Builder for FFmpeg commands with any number of inputs.
#[derive(Debug, Clone)]
pub struct FfmpegCommand {
    inputs: Vec<FfmpegInput>,
    output: PathBuf,
    output_args: Vec<String>,
    overwrite: bool,
    log_level: String,
}

impl FfmpegCommand {
    pub fn new(output: impl AsRef<Path>) -> Self {
        Self {
            inputs: Vec::new(),
            output: output.as_ref().to_path_buf(),
            output_args: Vec::new(),
            overwrite: true,
            log_level: "error".to_string(),
        }
    }

    /// Add a plain input.
    pub fn input(self, path: impl AsRef<Path>) -> Self {
        self.input_with_args(Vec::<String>::new(), path)
    }

    /// Add an input preceded by input-level options (`-ss`, `-t`, `-itsoffset`, ...).
    pub fn input_with_args<I, S>(mut self, args: I, path: impl AsRef<Path>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.inputs.push(FfmpegInput {
            args: args.into_iter().map(Into::into).collect(),
            path: path.as_ref().to_path_buf(),
        });
        self
    }

    /// Add an input whose own presentation timestamps are shifted by `offset_secs`.
    ///
    /// This moves the stream's content on the output timeline, unlike an
    /// `enable` expression which only gates visibility.
    pub fn offset_input(self, path: impl AsRef<Path>, offset_secs: f64, extra: &[String]) -> Self {
        let mut args = extra.to_vec();
        args.push("-itsoffset".to_string());
        args.push(format!("{:.3}", offset_secs.max(0.0)));
        self.input_with_args(args, path)
    }

    pub fn output_arg(mut self, arg: impl Into<String>) -> Self {
        self.output_args.push(arg.into());
        self
    }

    pub fn output_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.output_args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn filter_complex(self, filter: impl Into<String>) -> Self {
        self.output_arg("-filter_complex").output_arg(filter)
    }

    pub fn audio_filter(self, filter: impl Into<String>) -> Self {
        self.output_arg("-af").output_arg(filter)
    }

    pub fn map(self, spec: impl Into<String>) -> Self {
        self.output_arg("-map").output_arg(spec)
    }

    pub fn video_codec(self, codec: impl Into<String>) -> Self {
        self.output_arg("-c:v").output_arg(codec)
    }

    pub fn audio_codec(self, codec: impl Into<String>) -> Self {
        self.output_arg("-c:a").output_arg(codec)
    }

    pub fn no_audio(self) -> Self {
        self.output_arg("-an")
    }

    pub fn no_video(self) -> Self {
        self.output_arg("-vn")
    }

    /// Apply a concrete encoder choice.
    pub fn encoder(self, choice: &EncoderChoice) -> Self {
        self.output_args(choice.to_ffmpeg_args())
    }

    /// Drop global, stream and chapter metadata inherited from the inputs.
    pub fn strip_metadata(self) -> Self {
        self.output_args(["-map_metadata", "-1", "-map_chapters", "-1"])
    }

    pub fn metadata(self, key: &str, value: &str) -> Self {
        self.output_arg("-metadata").output_arg(format!("{}={}", key, value))
    }

    pub fn faststart(self) -> Self {
        self.output_args(["-movflags", "+faststart"])
    }

    /// Limit output duration.
    pub fn duration(self, seconds: f64) -> Self {
        self.output_arg("-t").output_arg(format!("{:.3}", seconds))
    }

    /// Extract a single frame.
    pub fn single_frame(self) -> Self {
        self.output_arg("-frames:v").output_arg("1")
    }

    pub fn log_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = level.into();
        self
    }

    pub fn output_path(&self) -> &Path {
        &self.output
    }

    pub fn input_count(&self) -> usize {
        self.inputs.len()
    }

    /// Build the command arguments.
    pub fn build_args(&self) -> Vec<String> {
        let mut args = Vec::new();

        if self.overwrite {
            args.push("-y".to_string());
        }

        args.push("-nostdin".to_string());
        args.push("-v".to_string());
        args.push(self.log_level.clone());

        // Progress output to stderr
        args.push("-progress".to_string());
        args.push("pipe:2".to_string());

        for input in &self.inputs {
            args.extend(input.args.iter().cloned());
            args.push("-i".to_string());
            args.push(input.path.to_string_lossy().to_string());
        }

        args.extend(self.output_args.iter().cloned());
        args.push(self.output.to_string_lossy().to_string());

        args
    }
}

/// Wall-clock process timeout: `min(base × multiplier, ceiling)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeoutPolicy {
    pub base_secs: u64,
    pub multiplier: f64,
    pub ceiling_secs: u64,
}

impl Default for TimeoutPolicy {
    fn default() -> Self {
        Self {
            base_secs: 600,
            multiplier: 2.0,
            ceiling_secs: 3600,
        }
    }
}

impl TimeoutPolicy {
    pub fn effective_secs(&self) -> u64 {
        let scaled = (self.base_secs as f64 * self.multiplier.max(0.0)).round() as u64;
        scaled.clamp(1, self.ceiling_secs.max(1))
    }

    pub fn duration(&self) -> Duration {
        Duration::from_secs(self.effective_secs())
    }
}

/// Runner for FFmpeg commands with a hard timeout.
#[derive(Debug, Clone, Default)]
pub struct FfmpegRunner {
    timeout_secs: Option<u64>,
}

impl FfmpegRunner {
    pub fn new() -> Self {
        Self { timeout_secs: None }
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = Some(secs);
        self
    }

    pub fn from_policy(policy: &TimeoutPolicy) -> Self {
        Self::new().with_timeout(policy.effective_secs())
    }

    pub fn timeout_secs(&self) -> Option<u64> {
        self.timeout_secs
    }

    /// Run an FFmpeg command. The child is killed if the timeout expires.
    pub async fn run(&self, cmd: &FfmpegCommand) -> MediaResult<FfmpegProgress> {
        check_ffmpeg()?;

        let args = cmd.build_args();
        debug!("Running FFmpeg: ffmpeg {}", args.join(" "));
        let started = Instant::now();

        let mut child = Command::new("ffmpeg")
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| MediaError::internal("FFmpeg stderr not captured"))?;

        let stderr_task = tokio::spawn(async move {
            let mut reader = BufReader::new(stderr).lines();
            let mut progress = FfmpegProgress::default();
            let mut tail = VecDeque::with_capacity(STDERR_TAIL_LINES);
            while let Ok(Some(line)) = reader.next_line().await {
                if FfmpegProgress::is_progress_line(&line) {
                    progress.update(&line);
                } else {
                    push_tail(&mut tail, line);
                }
            }
            (progress, tail)
        });

        let status = match self.timeout_secs {
            Some(secs) => {
                match tokio::time::timeout(Duration::from_secs(secs), child.wait()).await {
                    Ok(status) => status?,
                    Err(_) => {
                        warn!(timeout_secs = secs, "FFmpeg timed out, killing process");
                        let _ = child.kill().await;
                        stderr_task.abort();
                        metrics::record_ffmpeg(started.elapsed().as_secs_f64(), "timeout");
                        return Err(MediaError::Timeout(secs));
                    }
                }
            }
            None => child.wait().await?,
        };

        let (progress, tail) = stderr_task
            .await
            .map_err(|e| MediaError::internal(format!("FFmpeg stderr reader failed: {}", e)))?;

        if status.success() {
            metrics::record_ffmpeg(started.elapsed().as_secs_f64(), "success");
            Ok(progress)
        } else {
            metrics::record_ffmpeg(started.elapsed().as_secs_f64(), "failed");
            Err(MediaError::ffmpeg_failed(
                "FFmpeg exited with non-zero status",
                join_tail(tail),
                status.code(),
            ))
        }
    }

    /// Blocking variant for code already running on a blocking thread.
    pub fn run_blocking(&self, cmd: &FfmpegCommand) -> MediaResult<()> {
        check_ffmpeg()?;

        let args = cmd.build_args();
        debug!("Running FFmpeg (blocking): ffmpeg {}", args.join(" "));
        let started = Instant::now();

        let mut child = std::process::Command::new("ffmpeg")
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()?;

        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| MediaError::internal("FFmpeg stderr not captured"))?;
        let reader = std::thread::spawn(move || {
            let mut tail = VecDeque::with_capacity(STDERR_TAIL_LINES);
            for line in StdBufReader::new(stderr).lines().map_while(Result::ok) {
                if !FfmpegProgress::is_progress_line(&line) {
                    push_tail(&mut tail, line);
                }
            }
            tail
        });

        let deadline = self.timeout_secs.map(|s| started + Duration::from_secs(s));
        let status = loop {
            if let Some(status) = child.try_wait()? {
                break status;
            }
            if let (Some(deadline), Some(secs)) = (deadline, self.timeout_secs) {
                if Instant::now() >= deadline {
                    warn!(timeout_secs = secs, "FFmpeg timed out, killing process");
                    let _ = child.kill();
                    let _ = child.wait();
                    metrics::record_ffmpeg(started.elapsed().as_secs_f64(), "timeout");
                    return Err(MediaError::Timeout(secs));
                }
            }
            std::thread::sleep(BLOCKING_POLL);
        };

        let tail = reader.join().unwrap_or_default();

        if status.success() {
            metrics::record_ffmpeg(started.elapsed().as_secs_f64(), "success");
            Ok(())
        } else {
            metrics::record_ffmpeg(started.elapsed().as_secs_f64(), "failed");
            Err(MediaError::ffmpeg_failed(
                "FFmpeg exited with non-zero status",
                join_tail(tail),
                status.code(),
            ))
        }
    }
}

fn push_tail(tail: &mut VecDeque<String>, line: String) {
    if line.trim().is_empty() {
        return;
    }
    if tail.len() == STDERR_TAIL_LINES {
        tail.pop_front();
    }
    tail.push_back(line);
}

fn join_tail(tail: VecDeque<String>) -> Option<String> {
    if tail.is_empty() {
        None
    } else {
        Some(tail.into_iter().collect::<Vec<_>>().join("\n"))
    }
}

/// Check if FFmpeg is available.
pub fn check_ffmpeg() -> MediaResult<PathBuf> {
    which::which("ffmpeg").map_err(|_| MediaError::FfmpegNotFound)
}

/// Check if FFprobe is available.
pub fn check_ffprobe() -> MediaResult<PathBuf> {
    which::which("ffprobe").map_err(|_| MediaError::FfprobeNotFound)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_builder_orders_inputs() {
        let cmd = FfmpegCommand::new("out.mp4")
            .input("main.mp4")
            .offset_input("product.mp4", 3.2, &["-t".to_string(), "5.000".to_string()])
            .filter_complex("[0:v][1:v]overlay[outv]")
            .map("[outv]");

        let args = cmd.build_args();
        let main_pos = args.iter().position(|a| a == "main.mp4").unwrap();
        let offset_pos = args.iter().position(|a| a == "-itsoffset").unwrap();
        let product_pos = args.iter().position(|a| a == "product.mp4").unwrap();

        assert!(main_pos < offset_pos, "offset applies to the second input only");
        assert!(offset_pos < product_pos);
        assert_eq!(args[offset_pos + 1], "3.200");
        assert_eq!(args.last().map(String::as_str), Some("out.mp4"));
        assert_eq!(cmd.input_count(), 2);
    }

    #[test]
    fn test_encoder_and_metadata_args() {
        let cmd = FfmpegCommand::new("out.mp4")
            .input("in.mp4")
            .encoder(&EncoderChoice::new(21, "slow", None))
            .strip_metadata()
            .metadata("title", "abc")
            .faststart();

        let args = cmd.build_args();
        assert!(args.windows(2).any(|w| w[0] == "-map_metadata" && w[1] == "-1"));
        assert!(args.windows(2).any(|w| w[0] == "-metadata" && w[1] == "title=abc"));
        assert!(args.windows(2).any(|w| w[0] == "-crf" && w[1] == "21"));
        assert!(args.contains(&"+faststart".to_string()));
    }

    #[test]
    fn test_timeout_policy() {
        let policy = TimeoutPolicy::default();
        assert_eq!(policy.effective_secs(), 1200);

        let capped = TimeoutPolicy {
            base_secs: 900,
            multiplier: 10.0,
            ceiling_secs: 3600,
        };
        assert_eq!(capped.effective_secs(), 3600);
    }

    #[test]
    fn test_stderr_tail_is_bounded() {
        let mut tail = VecDeque::new();
        for i in 0..(STDERR_TAIL_LINES + 5) {
            push_tail(&mut tail, format!("line {}", i));
        }
        push_tail(&mut tail, "   ".to_string());
        assert_eq!(tail.len(), STDERR_TAIL_LINES);
        assert_eq!(tail.front().map(String::as_str), Some("line 5"));
    }

    #[tokio::test]
    #[ignore = "requires ffmpeg"]
    async fn test_runner_reports_failure_for_missing_input() {
        let dir = tempfile::tempdir().unwrap();
        let cmd = FfmpegCommand::new(dir.path().join("out.mp4")).input(dir.path().join("missing.mp4"));
        let err = FfmpegRunner::new().with_timeout(30).run(&cmd).await.unwrap_err();
        assert!(matches!(err, MediaError::FfmpegFailed { .. }));
    }
}

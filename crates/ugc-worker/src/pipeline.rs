//! One job from inputs to delivered video.
//!
//! Stages run strictly in order: validate, randomize, overlay, deliver.
//! Cancellation is honored at stage boundaries only; a running FFmpeg process
//! finishes or times out on its own.

use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::watch;
use tracing::Instrument;
use ugc_media::fs_utils::{ensure_non_empty, move_file};
use ugc_media::randomize::profiles;
use ugc_media::{check_cancelled, FfmpegRunner, OverlayCompositor, RandomizeRequest, Randomizer, ScratchSpace};
use ugc_models::{JobId, JobRequest, OverlayLog, RandomizationLog, RandomizationProfile};

use crate::config::WorkerConfig;
use crate::error::{Stage, WorkerError, WorkerResult};
use crate::files::JobFileSet;
use crate::logging::JobLogger;

/// Suffix of the audit log written next to the final video.
pub const LOG_SIDECAR_SUFFIX: &str = "randomization.json";

/// Where the audit log of `final_output` goes: `clip.mp4` → `clip.randomization.json`.
pub fn sidecar_path(final_output: &Path) -> PathBuf {
    final_output.with_extension(LOG_SIDECAR_SUFFIX)
}

/// A delivered job.
#[derive(Debug, Clone, Serialize)]
pub struct JobReport {
    pub job_id: JobId,
    pub output: PathBuf,
    pub log_path: PathBuf,
    pub warnings: Vec<String>,
    pub overlay_applied: bool,
    pub elapsed_secs: f64,
    #[serde(skip)]
    pub log: RandomizationLog,
}

/// Runs jobs. Cheap to share; holds no per-job state.
pub struct JobPipeline {
    config: WorkerConfig,
    randomizer: Randomizer,
    overlay: Option<Arc<OverlayCompositor>>,
}

impl JobPipeline {
    /// Pipeline with the speech model from the config. Without a model,
    /// overlay requests are skipped.
    pub fn new(config: WorkerConfig) -> Self {
        let runner = FfmpegRunner::from_policy(&config.ffmpeg_timeout);
        let overlay = build_overlay(&config, &runner).map(Arc::new);
        Self {
            randomizer: Randomizer::new(runner),
            config,
            overlay,
        }
    }

    /// Replace the overlay compositor (e.g. with a different speech backend).
    pub fn with_overlay(mut self, overlay: OverlayCompositor) -> Self {
        self.overlay = Some(Arc::new(overlay));
        self
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    pub fn overlay_enabled(&self) -> bool {
        self.overlay.is_some()
    }

    pub async fn run(&self, request: &JobRequest, cancel: Option<&watch::Receiver<bool>>) -> WorkerResult<JobReport> {
        let logger = JobLogger::new(&request.job_id, &request.intensity);
        let span = logger.create_span();
        let started = Instant::now();

        let result = self.run_stages(request, cancel, &logger, started).instrument(span).await;
        match &result {
            Ok(report) => {
                record_job("succeeded", started);
                logger.log_completion(&report.output.display().to_string(), report.elapsed_secs);
            }
            Err(e) if e.is_cancelled() => {
                record_job("cancelled", started);
                logger.log_warning(e.failed_stage().unwrap_or(Stage::Validate), &e.to_string());
            }
            Err(e) => {
                record_job("failed", started);
                logger.log_error(&e.to_string());
            }
        }
        result
    }

    async fn run_stages(
        &self,
        request: &JobRequest,
        cancel: Option<&watch::Receiver<bool>>,
        logger: &JobLogger,
        started: Instant,
    ) -> WorkerResult<JobReport> {
        logger.log_start(&request.source_video.display().to_string());

        // Validate
        logger.log_stage(Stage::Validate, "checking inputs");
        check_cancelled(cancel).map_err(|e| WorkerError::stage(Stage::Validate, e))?;
        ensure_non_empty(&request.source_video)
            .await
            .map_err(|e| WorkerError::stage(Stage::Validate, e))?;
        ensure_non_empty(&request.tts_audio)
            .await
            .map_err(|e| WorkerError::stage(Stage::Validate, e))?;
        let profile = self.resolve_profile(request)?;

        tokio::fs::create_dir_all(&self.config.work_dir).await?;
        let files = JobFileSet::new(&self.config.work_dir, &request.job_id);
        let final_output = self.final_output_path(request, &files);

        let seed: u64 = rand::random();
        let mut rng = StdRng::seed_from_u64(seed);
        let mut log = RandomizationLog::new(request.job_id.clone(), request.intensity.clone(), profile.intensity, seed);

        // Randomize
        logger.log_stage(Stage::Randomize, profile.intensity.as_str());
        check_cancelled(cancel).map_err(|e| WorkerError::stage(Stage::Randomize, e))?;
        let randomized = files.allocate("randomized", "mp4");
        let randomize = RandomizeRequest {
            source_video: &request.source_video,
            audio: Some(&request.tts_audio),
            output: &randomized,
            profile: &profile,
            scratch: &files,
            cancel,
        };
        let mut current = self
            .randomizer
            .randomize_video(&randomize, &mut rng, &mut log)
            .await
            .map_err(|e| WorkerError::stage(Stage::Randomize, e))?;
        for warning in &log.warnings {
            logger.log_warning(Stage::Randomize, warning);
        }

        // Overlay
        if let Some(overlay) = &request.overlay {
            logger.log_stage(Stage::Overlay, &overlay.clip_path.display().to_string());
            check_cancelled(cancel).map_err(|e| WorkerError::stage(Stage::Overlay, e))?;
            match &self.overlay {
                Some(compositor) => {
                    let encoder = log.encoding.encoder.clone().unwrap_or_default();
                    let outcome = compositor
                        .apply(&current, &request.tts_audio, overlay, &encoder, &files)
                        .await;
                    current = outcome.output;
                    log.overlay = outcome.log;
                }
                None => {
                    log.overlay = OverlayLog {
                        requested: true,
                        skipped_reason: Some("speech model not configured".to_string()),
                        ..Default::default()
                    };
                }
            }
            if let Some(reason) = &log.overlay.skipped_reason {
                let message = format!("Product overlay skipped: {}", reason);
                logger.log_warning(Stage::Overlay, &message);
                log.warn(message);
            }
        }

        // Deliver
        logger.log_stage(Stage::Deliver, &final_output.display().to_string());
        check_cancelled(cancel).map_err(|e| WorkerError::stage(Stage::Deliver, e))?;
        move_file(&current, &final_output)
            .await
            .map_err(|e| WorkerError::stage(Stage::Deliver, e))?;
        files.keep(&final_output);

        log.final_output = Some(final_output.clone());
        log.completed_at = Some(chrono::Utc::now());
        let log_path = sidecar_path(&final_output);
        tokio::fs::write(&log_path, serde_json::to_vec_pretty(&log)?).await?;

        files.cleanup();

        Ok(JobReport {
            job_id: request.job_id.clone(),
            output: final_output,
            log_path,
            warnings: log.warnings.clone(),
            overlay_applied: log.overlay.applied,
            elapsed_secs: started.elapsed().as_secs_f64(),
            log,
        })
    }

    fn resolve_profile(&self, request: &JobRequest) -> WorkerResult<RandomizationProfile> {
        match &request.profile_override {
            Some(profile) => {
                profile
                    .validate()
                    .map_err(|e| WorkerError::invalid_request(format!("profile override: {}", e)))?;
                Ok(profile.clone())
            }
            None => Ok(profiles::resolve_label(&request.intensity).0),
        }
    }

    fn final_output_path(&self, request: &JobRequest, files: &JobFileSet) -> PathBuf {
        if let Some(path) = &request.output_path {
            return path.clone();
        }
        let stem = request
            .source_video
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("video");
        self.config.output_dir.join(files.unique_name(&format!("{}_final", stem), "mp4"))
    }
}

#[cfg(feature = "whisper")]
fn build_overlay(config: &WorkerConfig, runner: &FfmpegRunner) -> Option<OverlayCompositor> {
    use ugc_media::{TranscriptionService, WhisperTranscriber};

    let model = config.whisper_model_path.as_ref()?;
    let transcriber = WhisperTranscriber::new(model, Some(config.whisper_language.clone()), runner.clone());
    let service = TranscriptionService::new(Arc::new(transcriber), config.transcript_cache_capacity)
        .with_timeout(config.ffmpeg_timeout.duration());
    Some(OverlayCompositor::new(runner.clone(), Arc::new(service)))
}

#[cfg(not(feature = "whisper"))]
fn build_overlay(config: &WorkerConfig, _runner: &FfmpegRunner) -> Option<OverlayCompositor> {
    if config.whisper_model_path.is_some() {
        tracing::warn!("WHISPER_MODEL_PATH is set but the worker was built without speech recognition");
    }
    None
}

fn record_job(outcome: &'static str, started: Instant) {
    metrics::counter!("ugc_jobs_total", "outcome" => outcome).increment(1);
    metrics::histogram!("ugc_job_duration_seconds", "outcome" => outcome).record(started.elapsed().as_secs_f64());
}

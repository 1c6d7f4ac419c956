//! Video randomization engine.
//!
//! [`Randomizer::randomize_video`] runs three stages in order:
//!
//! 1. visual: per-frame effect stack into a video-only intermediate
//! 2. audio: offline volume/pitch/tempo into a PCM intermediate
//! 3. finalize: single encode with EQ, randomized encoder settings and
//!    metadata scrubbing
//!
//! The first two fall back to their input on failure; the last one is fatal.
//! The `none` profile skips everything and copies the source byte for byte.

pub mod audio;
pub mod dsp;
pub mod finalize;
pub mod params;
pub mod profiles;
pub mod visual;
pub mod wave;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::{info, warn};
use ugc_models::{RandomizationLog, RandomizationProfile};

use crate::command::FfmpegRunner;
use crate::error::{MediaError, MediaResult};
use crate::fs_utils::{copy_file, ensure_non_empty, ScratchSpace};
use crate::metrics;
use crate::probe::{probe_frame_dimensions, probe_video};

pub use audio::{randomize_audio, AudioOutcome, AudioPlan};
pub use finalize::{finalize, FinalizePlan};
pub use params::{sample_parameters, EffectParameterSet};
pub use visual::{apply_frame_effects, run_visual_stage, VisualJob, VisualOutcome, VisualState};
pub use wave::WaveFunction;

/// Degraded-success message when the visual stage falls back.
pub const VISUAL_FALLBACK_WARNING: &str = "Randomization failed, using non-randomized video";
/// Degraded-success message when the audio stage falls back.
pub const AUDIO_FALLBACK_WARNING: &str = "Audio randomization failed, using original audio";

/// Return `Cancelled` if the shutdown flag is set.
pub fn check_cancelled(cancel: Option<&watch::Receiver<bool>>) -> MediaResult<()> {
    match cancel {
        Some(rx) if *rx.borrow() => Err(MediaError::Cancelled),
        _ => Ok(()),
    }
}

/// Inputs of one randomization run.
pub struct RandomizeRequest<'a> {
    pub source_video: &'a Path,
    /// Separate voice track to mux instead of the source's own audio
    pub audio: Option<&'a Path>,
    pub output: &'a Path,
    pub profile: &'a RandomizationProfile,
    pub scratch: &'a dyn ScratchSpace,
    /// Checked between stages
    pub cancel: Option<&'a watch::Receiver<bool>>,
}

#[derive(Debug, Clone)]
pub struct Randomizer {
    runner: FfmpegRunner,
    probe_timeout: Duration,
    stage_timeout: Option<Duration>,
}

impl Default for Randomizer {
    fn default() -> Self {
        Self::new(FfmpegRunner::new())
    }
}

impl Randomizer {
    pub fn new(runner: FfmpegRunner) -> Self {
        let stage_timeout = runner.timeout_secs().map(Duration::from_secs);
        Self {
            runner,
            probe_timeout: Duration::from_secs(60),
            stage_timeout,
        }
    }

    pub fn with_probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }

    pub fn runner(&self) -> &FfmpegRunner {
        &self.runner
    }

    /// Produce `request.output`, recording every decision into `log`.
    ///
    /// Returns the output path. Only input validation, probing, cancellation
    /// and the final encode can fail the run.
    pub async fn randomize_video(
        &self,
        request: &RandomizeRequest<'_>,
        rng: &mut StdRng,
        log: &mut RandomizationLog,
    ) -> MediaResult<PathBuf> {
        let profile = request.profile;
        profile.validate()?;
        ensure_non_empty(request.source_video).await?;
        if let Some(audio) = request.audio {
            ensure_non_empty(audio).await?;
        }

        if profile.is_passthrough() {
            info!(source = %request.source_video.display(), "Intensity none, copying source");
            copy_file(request.source_video, request.output).await?;
            return Ok(request.output.to_path_buf());
        }

        let info = probe_video(request.source_video, self.probe_timeout).await?;
        check_cancelled(request.cancel)?;

        let video = self.visual_stage(request, info.fps, rng, log).await?;
        check_cancelled(request.cancel)?;

        // Separate voice track first, otherwise the source's own audio.
        let audio_source = request
            .audio
            .or_else(|| info.has_audio.then_some(request.source_video));
        let audio = match audio_source {
            Some(path) if profile.audio.apply => {
                let outcome = randomize_audio(path, request.scratch, &profile.audio, rng, &self.runner).await;
                if !outcome.success {
                    log.warn(AUDIO_FALLBACK_WARNING);
                }
                log.audio = outcome.log;
                Some(outcome.output)
            }
            other => other.map(Path::to_path_buf),
        };
        check_cancelled(request.cancel)?;

        let plan = FinalizePlan::sample(profile, rng);
        log.encoding = plan.encoding_log(profile.encoding.apply);
        log.metadata = plan.metadata_log(profile.metadata.apply);
        finalize(&plan, &video, audio.as_deref(), request.output, &self.runner).await?;

        Ok(request.output.to_path_buf())
    }

    /// Visual stage on a blocking thread; returns the video to finalize.
    async fn visual_stage(
        &self,
        request: &RandomizeRequest<'_>,
        fps: f64,
        rng: &mut StdRng,
        log: &mut RandomizationLog,
    ) -> MediaResult<PathBuf> {
        let source = request.source_video.to_path_buf();
        if !request.profile.visual.apply {
            return Ok(source);
        }

        let (width, height) = probe_frame_dimensions(&source, request.scratch.dir(), &self.runner).await?;
        let job = VisualJob {
            source: source.clone(),
            output: request.scratch.allocate("visual", "mp4"),
            width,
            height,
            fps,
            deadline: self.stage_timeout.map(|t| Instant::now() + t),
        };
        let profile = request.profile.visual.clone();
        let mut stage_rng = StdRng::seed_from_u64(rng.random());

        let outcome = match tokio::task::spawn_blocking(move || run_visual_stage(&job, &profile, &mut stage_rng)).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(error = %e, "Visual stage task failed");
                metrics::record_fallback("visual");
                log.visual.error = Some(e.to_string());
                log.warn(VISUAL_FALLBACK_WARNING);
                return Ok(source);
            }
        };

        let succeeded = outcome.succeeded();
        log.visual = outcome.log;
        match outcome.output {
            Some(path) if succeeded => Ok(path),
            _ => {
                log.warn(VISUAL_FALLBACK_WARNING);
                Ok(source)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs_utils::DirScratch;
    use crate::probe::probe_video;
    use crate::test_media::{synth_video};
    use ugc_models::{Intensity, JobId};

    fn new_log(intensity: Intensity) -> RandomizationLog {
        RandomizationLog::new(JobId::from_string("test"), intensity.as_str(), intensity, 1)
    }

    #[test]
    fn test_check_cancelled() {
        let (tx, rx) = watch::channel(false);
        assert!(check_cancelled(Some(&rx)).is_ok());
        assert!(check_cancelled(None).is_ok());
        tx.send(true).unwrap();
        assert!(matches!(check_cancelled(Some(&rx)), Err(MediaError::Cancelled)));
    }

    #[tokio::test]
    async fn test_none_intensity_copies_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let scratch = DirScratch::new(dir.path());
        let source = dir.path().join("in.mp4");
        // Not a real video: the copy path must never look inside it.
        tokio::fs::write(&source, b"opaque bytes").await.unwrap();
        let output = dir.path().join("out.mp4");
        let profile = profiles::resolve(Intensity::None);

        let request = RandomizeRequest {
            source_video: &source,
            audio: None,
            output: &output,
            profile: &profile,
            scratch: &scratch,
            cancel: None,
        };
        let mut log = new_log(Intensity::None);
        let path = Randomizer::default()
            .randomize_video(&request, &mut StdRng::seed_from_u64(1), &mut log)
            .await
            .unwrap();

        assert_eq!(path, output);
        assert_eq!(tokio::fs::read(&output).await.unwrap(), b"opaque bytes");
        assert!(!log.visual.applied);
        assert!(log.warnings.is_empty());
    }

    #[tokio::test]
    async fn test_missing_source_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let scratch = DirScratch::new(dir.path());
        let source = dir.path().join("missing.mp4");
        let output = dir.path().join("out.mp4");
        let profile = profiles::resolve(Intensity::Low);
        let request = RandomizeRequest {
            source_video: &source,
            audio: None,
            output: &output,
            profile: &profile,
            scratch: &scratch,
            cancel: None,
        };
        let err = Randomizer::default()
            .randomize_video(&request, &mut StdRng::seed_from_u64(1), &mut new_log(Intensity::Low))
            .await
            .unwrap_err();
        assert!(matches!(err, MediaError::FileNotFound(_)));
    }

    #[tokio::test]
    #[ignore = "requires ffmpeg"]
    async fn test_high_intensity_end_to_end() {
        let dir = tempfile::tempdir().unwrap();
        let scratch = DirScratch::new(dir.path());
        let source = dir.path().join("src.mp4");
        assert!(synth_video(&source, 108, 192, 2.0, 15, true));
        let output = dir.path().join("final.mp4");
        let profile = profiles::resolve(Intensity::High);

        let request = RandomizeRequest {
            source_video: &source,
            audio: None,
            output: &output,
            profile: &profile,
            scratch: &scratch,
            cancel: None,
        };
        let mut log = new_log(Intensity::High);
        Randomizer::default()
            .randomize_video(&request, &mut StdRng::seed_from_u64(42), &mut log)
            .await
            .unwrap();

        let src = probe_video(&source, Duration::from_secs(30)).await.unwrap();
        let out = probe_video(&output, Duration::from_secs(30)).await.unwrap();
        assert_eq!((out.width, out.height), (src.width, src.height));
        assert!((out.duration - src.duration).abs() <= 0.5);
        assert!(out.size > 0);
        assert!(log.warnings.is_empty(), "{:?}", log.warnings);
        for effect in ["camera_shake", "analog_grain", "sharpen"] {
            assert!(log.visual.effects_applied_detail[effect].applied);
        }
        assert!(log.encoding.encoder.is_some());
    }

    #[tokio::test]
    #[ignore = "requires ffmpeg"]
    async fn test_cancel_before_visual_stage() {
        let dir = tempfile::tempdir().unwrap();
        let scratch = DirScratch::new(dir.path());
        let source = dir.path().join("src.mp4");
        assert!(synth_video(&source, 64, 48, 1.0, 10, false));
        let output = dir.path().join("final.mp4");
        let profile = profiles::resolve(Intensity::Low);
        let (tx, rx) = watch::channel(false);
        tx.send(true).unwrap();

        let request = RandomizeRequest {
            source_video: &source,
            audio: None,
            output: &output,
            profile: &profile,
            scratch: &scratch,
            cancel: Some(&rx),
        };
        let err = Randomizer::default()
            .randomize_video(&request, &mut StdRng::seed_from_u64(1), &mut new_log(Intensity::Low))
            .await
            .unwrap_err();
        assert!(matches!(err, MediaError::Cancelled));
        assert!(!output.exists());
    }
}

//! Keyword-timed product overlay.
//!
//! Timing comes from the pristine voice track: the first spoken trigger word
//! opens a window of `desired_duration` seconds. The product clip is then
//! scaled into a fixed placement and composited only inside that window.
//!
//! Every failure here is a skip. The job ships the pre-overlay video and the
//! reason lands in the [`OverlayLog`].

pub mod compositor;
pub mod geometry;
pub mod keywords;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};
use ugc_models::{EncoderChoice, OverlayLog, OverlayRequest};

use crate::command::FfmpegRunner;
use crate::fs_utils::{ensure_non_empty, remove_if_exists, ScratchSpace};
use crate::metrics;
use crate::probe::{probe_frame_dimensions, probe_video};
use crate::transcription::TranscriptionService;

pub use compositor::{build_overlay_command, overlay_filter};
pub use geometry::compute_geometry;
pub use keywords::{normalize_word, product_mention_times, KeywordMatcher};

/// Result of an overlay attempt.
#[derive(Debug, Clone)]
pub struct OverlayOutcome {
    /// Composited video, or the untouched main video on skip
    pub output: PathBuf,
    pub log: OverlayLog,
}

impl OverlayOutcome {
    pub fn applied(&self) -> bool {
        self.log.applied
    }
}

pub struct OverlayCompositor {
    runner: FfmpegRunner,
    transcription: Arc<TranscriptionService>,
    probe_timeout: Duration,
}

impl OverlayCompositor {
    pub fn new(runner: FfmpegRunner, transcription: Arc<TranscriptionService>) -> Self {
        Self {
            runner,
            transcription,
            probe_timeout: Duration::from_secs(60),
        }
    }

    pub fn with_probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }

    /// Composite `request.clip_path` onto `main`, timed from `voice`.
    ///
    /// `voice` must be the TTS track as rendered, not audio pulled back out of
    /// a muxed video.
    pub async fn apply(
        &self,
        main: &Path,
        voice: &Path,
        request: &OverlayRequest,
        encoder: &EncoderChoice,
        scratch: &dyn ScratchSpace,
    ) -> OverlayOutcome {
        let started = Instant::now();
        let mut log = OverlayLog {
            requested: true,
            ..Default::default()
        };

        match self.composite(main, voice, request, encoder, scratch, &mut log).await {
            Ok(output) => {
                log.applied = true;
                metrics::record_overlay("applied");
                metrics::record_stage("overlay", started.elapsed().as_secs_f64());
                info!(
                    keyword = log.timing.as_ref().map(|t| t.keyword.as_str()),
                    start = log.timing.as_ref().map(|t| t.start),
                    end = log.timing.as_ref().map(|t| t.end),
                    "Product overlay applied"
                );
                OverlayOutcome { output, log }
            }
            Err(skip) => {
                match skip {
                    Skip::Normal(ref reason) => {
                        metrics::record_overlay("skipped");
                        info!(reason = %reason, "Product overlay skipped");
                    }
                    Skip::Failed(ref reason) => {
                        metrics::record_overlay("failed");
                        warn!(reason = %reason, "Product overlay failed, keeping video without overlay");
                    }
                }
                log.skipped_reason = Some(skip.into_reason());
                OverlayOutcome {
                    output: main.to_path_buf(),
                    log,
                }
            }
        }
    }

    async fn composite(
        &self,
        main: &Path,
        voice: &Path,
        request: &OverlayRequest,
        encoder: &EncoderChoice,
        scratch: &dyn ScratchSpace,
        log: &mut OverlayLog,
    ) -> Result<PathBuf, Skip> {
        let matcher = KeywordMatcher::from_request(request);
        if matcher.is_empty() {
            return Err(Skip::Normal("no trigger keywords configured".into()));
        }
        ensure_non_empty(&request.clip_path)
            .await
            .map_err(|e| Skip::Failed(format!("overlay clip unusable: {}", e)))?;

        let transcript = self
            .transcription
            .transcribe(voice)
            .await
            .map_err(|e| Skip::Failed(format!("transcription failed: {}", e)))?;

        let mut timing = product_mention_times(&transcript, &matcher, request.desired_duration)
            .ok_or_else(|| Skip::Normal("trigger keyword not spoken".into()))?;

        let info = probe_video(main, self.probe_timeout)
            .await
            .map_err(|e| Skip::Failed(format!("main video probe failed: {}", e)))?;
        if timing.start >= info.duration {
            log.timing = Some(timing);
            return Err(Skip::Normal("trigger word falls after the end of the video".into()));
        }
        timing.end = timing.end.min(info.duration);
        log.timing = Some(timing.clone());

        let main_size = probe_frame_dimensions(main, scratch.dir(), &self.runner)
            .await
            .map_err(|e| Skip::Failed(format!("main video dimensions unavailable: {}", e)))?;
        let clip_size = probe_frame_dimensions(&request.clip_path, scratch.dir(), &self.runner)
            .await
            .map_err(|e| Skip::Failed(format!("overlay clip dimensions unavailable: {}", e)))?;

        let geometry = compute_geometry(
            main_size,
            clip_size,
            &request.effective_placement(),
            request.margin_percent,
        )
        .map_err(|e| Skip::Failed(e.to_string()))?;
        log.geometry = Some(geometry);

        let output = scratch.allocate("overlay", "mp4");
        let cmd = build_overlay_command(
            main,
            &request.clip_path,
            &output,
            &geometry,
            &timing,
            info.duration,
            encoder,
        );
        if let Err(e) = self.runner.run(&cmd).await {
            remove_if_exists(&output);
            return Err(Skip::Failed(format!("compositing failed: {}", e)));
        }
        Ok(output)
    }
}

enum Skip {
    /// Nothing to do for this job
    Normal(String),
    /// Something broke along the way
    Failed(String),
}

impl Skip {
    fn into_reason(self) -> String {
        match self {
            Skip::Normal(reason) | Skip::Failed(reason) => reason,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::FrameReader;
    use crate::fs_utils::DirScratch;
    use crate::test_media::{synth_color_video, synth_tone};
    use crate::transcription::tests::FakeTranscriber;
    use ugc_models::PlacementPreference;

    fn compositor(words: &[(&str, f64)]) -> OverlayCompositor {
        let fake = Arc::new(FakeTranscriber::with_words(words));
        let service = Arc::new(TranscriptionService::new(fake, 4));
        OverlayCompositor::new(FfmpegRunner::new().with_timeout(120), service)
    }

    #[tokio::test]
    async fn test_no_keyword_match_is_a_skip() {
        let dir = tempfile::tempdir().unwrap();
        let scratch = DirScratch::new(dir.path());
        let main = dir.path().join("main.mp4");
        let voice = dir.path().join("voice.wav");
        let clip = dir.path().join("clip.mp4");
        for path in [&main, &voice, &clip] {
            tokio::fs::write(path, b"not media").await.unwrap();
        }

        let request = OverlayRequest::new(&clip, vec!["buy".into()]);
        let outcome = compositor(&[("hello", 0.4), ("there", 0.9)])
            .apply(&main, &voice, &request, &EncoderChoice::default(), &scratch)
            .await;

        assert!(!outcome.applied());
        assert_eq!(outcome.output, main);
        assert!(outcome.log.requested);
        assert!(outcome.log.timing.is_none());
        assert_eq!(outcome.log.skipped_reason.as_deref(), Some("trigger keyword not spoken"));
    }

    #[tokio::test]
    async fn test_missing_clip_is_a_skip() {
        let dir = tempfile::tempdir().unwrap();
        let scratch = DirScratch::new(dir.path());
        let main = dir.path().join("main.mp4");
        let voice = dir.path().join("voice.wav");
        tokio::fs::write(&main, b"x").await.unwrap();
        tokio::fs::write(&voice, b"x").await.unwrap();

        let request = OverlayRequest::new(dir.path().join("absent.mp4"), vec!["buy".into()]);
        let outcome = compositor(&[("buy", 1.0)])
            .apply(&main, &voice, &request, &EncoderChoice::default(), &scratch)
            .await;

        assert!(!outcome.applied());
        assert_eq!(outcome.output, main);
        assert!(outcome.log.skipped_reason.unwrap().starts_with("overlay clip unusable"));
    }

    #[tokio::test]
    async fn test_empty_keyword_list_is_a_skip() {
        let dir = tempfile::tempdir().unwrap();
        let scratch = DirScratch::new(dir.path());
        let main = dir.path().join("main.mp4");
        let mut request = OverlayRequest::new(dir.path().join("clip.mp4"), vec![]);
        request.language_synonyms.clear();

        let outcome = compositor(&[("buy", 1.0)])
            .apply(&main, &main, &request, &EncoderChoice::default(), &scratch)
            .await;
        assert!(!outcome.applied());
        assert_eq!(outcome.log.skipped_reason.as_deref(), Some("no trigger keywords configured"));
    }

    fn is_red(bgr: [u8; 3]) -> bool {
        bgr[2] > 180 && bgr[1] < 90 && bgr[0] < 90
    }

    #[tokio::test]
    #[ignore = "requires ffmpeg"]
    async fn test_overlay_visible_only_inside_window() {
        let dir = tempfile::tempdir().unwrap();
        let scratch = DirScratch::new(dir.path());
        let main = dir.path().join("main.mp4");
        let clip = dir.path().join("clip.mp4");
        let voice = dir.path().join("voice.wav");
        assert!(synth_color_video(&main, "blue", 96, 160, 10.0, 10, true));
        assert!(synth_color_video(&clip, "red", 32, 32, 2.0, 10, false));
        assert!(synth_tone(&voice, 10.0));

        let request = OverlayRequest::new(&clip, vec!["buy".into()]);
        let outcome = compositor(&[("you", 2.8), ("should", 3.0), ("buy", 3.2), ("it", 3.5)])
            .apply(&main, &voice, &request, &EncoderChoice::default(), &scratch)
            .await;

        assert!(outcome.applied(), "{:?}", outcome.log.skipped_reason);
        let timing = outcome.log.timing.clone().unwrap();
        assert!((timing.start - 3.2).abs() < 1e-9);
        assert!((timing.end - 8.2).abs() < 1e-9);

        let src = probe_video(&main, Duration::from_secs(30)).await.unwrap();
        let out = probe_video(&outcome.output, Duration::from_secs(30)).await.unwrap();
        assert!((out.duration - src.duration).abs() <= 0.5);
        assert_eq!((out.width, out.height), (96, 160));

        let g = outcome.log.geometry.unwrap();
        let (cx, cy) = ((g.x + g.width / 2) as usize, (g.y + g.height / 2) as usize);
        let mut reader = FrameReader::open(&outcome.output, 96, 160, 10.0).unwrap();
        let mut samples = Vec::new();
        let mut index = 0u64;
        while let Some(frame) = reader.read_frame().unwrap() {
            if matches!(index, 10 | 50 | 90) {
                samples.push([frame[[cy, cx, 0]], frame[[cy, cx, 1]], frame[[cy, cx, 2]]]);
            }
            index += 1;
        }
        assert_eq!(samples.len(), 3);
        assert!(!is_red(samples[0]), "overlay visible before window: {:?}", samples[0]);
        assert!(is_red(samples[1]), "overlay missing inside window: {:?}", samples[1]);
        assert!(!is_red(samples[2]), "overlay visible after window: {:?}", samples[2]);
    }

    #[tokio::test]
    #[ignore = "requires ffmpeg"]
    async fn test_trigger_after_video_end_is_a_skip() {
        let dir = tempfile::tempdir().unwrap();
        let scratch = DirScratch::new(dir.path());
        let main = dir.path().join("main.mp4");
        let clip = dir.path().join("clip.mp4");
        assert!(synth_color_video(&main, "blue", 64, 64, 2.0, 10, false));
        assert!(synth_color_video(&clip, "red", 16, 16, 1.0, 10, false));

        let request = OverlayRequest::new(&clip, vec!["buy".into()]);
        let outcome = compositor(&[("buy", 30.0)])
            .apply(&main, &main, &request, &EncoderChoice::default(), &scratch)
            .await;
        assert!(!outcome.applied());
        assert_eq!(outcome.output, main);
        assert!(outcome.log.timing.is_some());
    }

    /// Pixels at `(frame index, y, x)`, read at 10 fps, plus the frame count.
    fn sample_pixels(path: &Path, width: u32, height: u32, at: &[(u64, usize, usize)]) -> (u64, Vec<[u8; 3]>) {
        let mut reader = FrameReader::open(path, width, height, 10.0).unwrap();
        let mut samples = Vec::new();
        let mut index = 0u64;
        while let Some(frame) = reader.read_frame().unwrap() {
            for &(_, y, x) in at.iter().filter(|(i, _, _)| *i == index) {
                samples.push([frame[[y, x, 0]], frame[[y, x, 1]], frame[[y, x, 2]]]);
            }
            index += 1;
        }
        (index, samples)
    }

    #[tokio::test]
    #[ignore = "requires ffmpeg"]
    async fn test_window_running_past_the_end_is_clamped() {
        let dir = tempfile::tempdir().unwrap();
        let scratch = DirScratch::new(dir.path());
        let main = dir.path().join("main.mp4");
        let clip = dir.path().join("clip.mp4");
        assert!(synth_color_video(&main, "blue", 64, 64, 4.0, 10, false));
        assert!(synth_color_video(&clip, "red", 16, 16, 1.0, 10, false));

        let mut request = OverlayRequest::new(&clip, vec!["buy".into()]);
        request.desired_duration = 5.0;
        request.placements = vec![PlacementPreference {
            relative_size: 0.5,
            ..Default::default()
        }];
        let outcome = compositor(&[("buy", 2.5)])
            .apply(&main, &main, &request, &EncoderChoice::default(), &scratch)
            .await;

        assert!(outcome.applied(), "{:?}", outcome.log.skipped_reason);
        let timing = outcome.log.timing.clone().unwrap();
        assert!((timing.start - 2.5).abs() < 1e-9);
        assert!((timing.end - 4.0).abs() <= 0.1, "window end {} not clamped", timing.end);

        let g = outcome.log.geometry.unwrap();
        let (cx, cy) = ((g.x + g.width / 2) as usize, (g.y + g.height / 2) as usize);
        let (frames, samples) = sample_pixels(&outcome.output, 64, 64, &[(10, cy, cx), (35, cy, cx)]);
        assert!((frames as i64 - 40).abs() <= 1, "output has {} frames", frames);
        assert!(!is_red(samples[0]), "overlay visible before window: {:?}", samples[0]);
        assert!(is_red(samples[1]), "overlay missing near the end: {:?}", samples[1]);
    }

    #[tokio::test]
    #[ignore = "requires ffmpeg"]
    async fn test_full_screen_overlay_on_portrait_video() {
        let dir = tempfile::tempdir().unwrap();
        let scratch = DirScratch::new(dir.path());
        let main = dir.path().join("main.mp4");
        let clip = dir.path().join("clip.mp4");
        assert!(synth_color_video(&main, "blue", 72, 128, 3.0, 10, false));
        assert!(synth_color_video(&clip, "red", 32, 32, 1.0, 10, false));

        let mut request = OverlayRequest::new(&clip, vec!["buy".into()]);
        request.desired_duration = 1.5;
        request.placements = vec![PlacementPreference {
            relative_size: 1.0,
            ..Default::default()
        }];
        let outcome = compositor(&[("buy", 0.5)])
            .apply(&main, &main, &request, &EncoderChoice::default(), &scratch)
            .await;

        assert!(outcome.applied(), "{:?}", outcome.log.skipped_reason);
        let g = outcome.log.geometry.unwrap();
        assert_eq!((g.x, g.y, g.width, g.height), (0, 0, 72, 128));

        let (frames, samples) = sample_pixels(
            &outcome.output,
            72,
            128,
            &[(12, 2, 2), (12, 125, 69), (12, 64, 36), (25, 64, 36)],
        );
        assert!((frames as i64 - 30).abs() <= 1, "output has {} frames", frames);
        for (i, bgr) in samples[..3].iter().enumerate() {
            assert!(is_red(*bgr), "sample {} not covered: {:?}", i, bgr);
        }
        assert!(!is_red(samples[3]), "overlay visible after window: {:?}", samples[3]);
    }
}

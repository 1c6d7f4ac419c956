//! Per-frame visual randomization driver.
//!
//! One run walks `Init → ParameterSampling → FrameLoop → Finalize` and ends in
//! `Success` or `FailedFallback`. Parameters are drawn once before the first
//! frame; only the frame time and the per-frame noise change inside the loop.
//! The whole run is blocking and belongs on a blocking thread.

use rand::Rng;
use std::path::PathBuf;
use std::time::Instant;
use tracing::{debug, info, warn};
use ugc_models::{VisualLog, VisualProfile};

use super::params::{sample_parameters, EffectParameterSet};
use crate::effects::{
    analog_grain, camera_shake, chromatic_aberration, difference_glow, edge_glow, hsv_shift,
    lab_shift, sharpen, speckles, white_noise, EffectResult, GammaLut,
};
use crate::error::{MediaError, MediaResult};
use crate::frame::{Frame, FrameReader, FrameWriter};
use crate::fs_utils::remove_if_exists;
use crate::metrics;

/// Frames between progress log lines.
const PROGRESS_EVERY: u64 = 300;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VisualState {
    Init,
    ParameterSampling,
    FrameLoop,
    Finalize,
    Success,
    FailedFallback,
}

impl VisualState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success | Self::FailedFallback)
    }
}

/// Everything the frame loop needs to know about its input and output.
#[derive(Debug, Clone)]
pub struct VisualJob {
    pub source: PathBuf,
    pub output: PathBuf,
    /// Decoded frame size
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    /// Wall-clock limit for the whole loop
    pub deadline: Option<Instant>,
}

#[derive(Debug)]
pub struct VisualOutcome {
    pub state: VisualState,
    /// Randomized video-only file; `None` when the stage failed
    pub output: Option<PathBuf>,
    pub log: VisualLog,
}

impl VisualOutcome {
    pub fn succeeded(&self) -> bool {
        self.state == VisualState::Success
    }
}

/// Time and position of the frame being processed.
#[derive(Debug, Clone, Copy)]
pub struct FrameClock {
    pub index: u64,
    pub time: f64,
}

impl FrameClock {
    pub fn at(index: u64, fps: f64) -> Self {
        let fps = if fps > 0.0 { fps } else { 30.0 };
        Self {
            index,
            time: index as f64 / fps,
        }
    }
}

fn step(current: &mut Frame, effect: &'static str, clock: FrameClock, failures: &mut u32, result: EffectResult) {
    match result {
        Ok(next) => *current = next,
        Err(e) => {
            warn!(effect, frame_index = clock.index, error = %e, "Effect failed, keeping frame");
            metrics::record_effect_failure(effect);
            *failures += 1;
        }
    }
}

/// Apply every active effect to one frame in the fixed stack order.
///
/// A failing effect leaves the frame as it was before that effect and the
/// stack continues. Returns the frame and the number of failed effects.
pub fn apply_frame_effects<R: Rng + ?Sized>(
    frame: Frame,
    params: &EffectParameterSet,
    lut: Option<&GammaLut>,
    clock: FrameClock,
    rng: &mut R,
) -> (Frame, u32) {
    let mut current = frame;
    let mut failures = 0;
    let t = clock.time;

    if let Some(shake) = &params.camera_shake {
        let result = camera_shake(&current, &shake.at(t));
        step(&mut current, "camera_shake", clock, &mut failures, result);
    }
    if let Some(hsv) = &params.hsv_shift {
        let result = hsv_shift(&current, &hsv.at(t));
        step(&mut current, "hsv_shift", clock, &mut failures, result);
    }
    if let Some(lab) = &params.lab_shift {
        let result = lab_shift(&current, &lab.at(t));
        step(&mut current, "lab_shift", clock, &mut failures, result);
    }
    if let Some(lut) = lut {
        let result = lut.apply(&current);
        step(&mut current, "gamma", clock, &mut failures, result);
    }
    if let Some(glow) = &params.edge_glow {
        let result = edge_glow(&current, glow);
        step(&mut current, "edge_glow", clock, &mut failures, result);
    }
    if let Some(glow) = &params.difference_glow {
        let result = difference_glow(&current, glow);
        step(&mut current, "difference_glow", clock, &mut failures, result);
    }
    if let Some(shift) = &params.chromatic_aberration {
        let result = chromatic_aberration(&current, shift);
        step(&mut current, "chromatic_aberration", clock, &mut failures, result);
    }
    if let Some(noise) = &params.analog_grain {
        let result = analog_grain(&current, noise, rng);
        step(&mut current, "analog_grain", clock, &mut failures, result);
    }
    if let Some(noise) = &params.white_noise {
        let result = white_noise(&current, noise, rng);
        step(&mut current, "white_noise", clock, &mut failures, result);
    }
    if let Some(sharpen_params) = &params.sharpen {
        let result = sharpen(&current, sharpen_params);
        step(&mut current, "sharpen", clock, &mut failures, result);
    }
    if let Some(speckle) = &params.speckles {
        let result = speckles(&current, speckle, rng);
        step(&mut current, "speckles", clock, &mut failures, result);
    }

    (current, failures)
}

struct VisualDriver<'a> {
    job: &'a VisualJob,
    state: VisualState,
    log: VisualLog,
}

impl<'a> VisualDriver<'a> {
    fn new(job: &'a VisualJob) -> Self {
        Self {
            job,
            state: VisualState::Init,
            log: VisualLog::default(),
        }
    }

    fn transition(&mut self, next: VisualState) {
        debug!(from = ?self.state, to = ?next, "Visual stage transition");
        self.state = next;
    }

    fn frame_loop<R: Rng + ?Sized>(&mut self, params: &EffectParameterSet, rng: &mut R) -> MediaResult<u64> {
        let job = self.job;
        let lut = params.gamma.and_then(GammaLut::new);

        let mut reader = FrameReader::open(&job.source, job.width, job.height, job.fps)?;
        let mut writer = FrameWriter::open(&job.output, job.width, job.height, job.fps)?;

        let started = Instant::now();
        let mut index = 0u64;
        while let Some(frame) = reader.read_frame()? {
            if job.deadline.is_some_and(|deadline| Instant::now() >= deadline) {
                return Err(MediaError::Timeout(started.elapsed().as_secs()));
            }

            let clock = FrameClock::at(index, job.fps);
            let (out, failures) = apply_frame_effects(frame, params, lut.as_ref(), clock, rng);
            if failures > 0 {
                self.log.frame_failures += 1;
            }
            writer.write_frame(&out)?;

            index += 1;
            if index % PROGRESS_EVERY == 0 {
                debug!(frames = index, "Visual randomization progress");
            }
        }

        reader.finish()?;
        let written = writer.finish()?;
        Ok(written)
    }

    fn run<R: Rng + ?Sized>(mut self, profile: &VisualProfile, rng: &mut R) -> VisualOutcome {
        self.transition(VisualState::ParameterSampling);
        let (params, details) = sample_parameters(profile, rng);
        self.log.effects_applied_detail = details;
        self.log.applied = true;
        info!(
            active_effects = params.active_count(),
            effects = ?self.log.applied_effects().collect::<Vec<_>>(),
            "Sampled visual parameters"
        );

        self.transition(VisualState::FrameLoop);
        let started = Instant::now();
        let result = self.frame_loop(&params, rng);

        self.transition(VisualState::Finalize);
        let result = match result {
            Ok(0) => Err(MediaError::frame_io("No frames were decoded from the source")),
            other => other,
        };

        match result {
            Ok(frames) => {
                self.log.frames_processed = frames;
                metrics::record_frames(frames);
                metrics::record_stage("visual", started.elapsed().as_secs_f64());
                info!(
                    frames,
                    frame_failures = self.log.frame_failures,
                    elapsed_secs = started.elapsed().as_secs_f64(),
                    "Visual randomization complete"
                );
                self.transition(VisualState::Success);
                VisualOutcome {
                    state: self.state,
                    output: Some(self.job.output.clone()),
                    log: self.log,
                }
            }
            Err(e) => self.fail(e),
        }
    }

    fn fail(mut self, error: MediaError) -> VisualOutcome {
        warn!(
            source = %self.job.source.display(),
            error = %error,
            "Visual randomization failed"
        );
        remove_if_exists(&self.job.output);
        metrics::record_fallback("visual");
        self.log.applied = false;
        self.log.error = Some(error.to_string());
        self.transition(VisualState::FailedFallback);
        VisualOutcome {
            state: self.state,
            output: None,
            log: self.log,
        }
    }
}

/// Run the visual stage to a terminal state.
///
/// Never returns an error: failures end in [`VisualState::FailedFallback`]
/// with the partial output removed, and the caller decides what to ship.
pub fn run_visual_stage<R: Rng + ?Sized>(job: &VisualJob, profile: &VisualProfile, rng: &mut R) -> VisualOutcome {
    let driver = VisualDriver::new(job);
    if job.width == 0 || job.height == 0 {
        return driver.fail(MediaError::InvalidDimensions {
            path: job.source.clone(),
            width: job.width,
            height: job.height,
        });
    }
    driver.run(profile, rng)
}

//! Offline audio randomization: volume, pitch and tempo.
//!
//! The track is decoded once to 16-bit PCM, processed in memory and written
//! back as a fresh PCM WAV. Lossy encoding happens only in the finalizer.

use rand::Rng;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{info, warn};
use ugc_models::{AudioLog, AudioProfile, EffectDetail};

use super::dsp::{apply_gain, pitch_shift, time_stretch};
use super::params::{roll_effect, sample_range};
use crate::audio_io::{read_wav, write_wav_pcm16};
use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::{MediaError, MediaResult};
use crate::fs_utils::{remove_if_exists, ScratchSpace};
use crate::metrics;

/// Values drawn for the audio stage.
#[derive(Debug, Clone, Copy, PartialEq, Default, serde::Serialize)]
pub struct AudioPlan {
    pub gain_db: Option<f64>,
    pub semitones: Option<f64>,
    pub tempo: Option<f64>,
}

impl AudioPlan {
    pub fn is_empty(&self) -> bool {
        self.gain_db.is_none() && self.semitones.is_none() && self.tempo.is_none()
    }
}

/// Roll volume, pitch and tempo independently.
pub fn sample_audio_plan<R: Rng + ?Sized>(
    profile: &AudioProfile,
    rng: &mut R,
) -> (AudioPlan, BTreeMap<String, EffectDetail>) {
    let mut details = BTreeMap::new();
    let gain_db = roll_effect(rng, "volume", &profile.volume, &mut details, |rng, p| {
        sample_range(rng, &p.gain_db)
    });
    let semitones = roll_effect(rng, "pitch", &profile.pitch, &mut details, |rng, p| {
        sample_range(rng, &p.semitones)
    });
    let tempo = roll_effect(rng, "tempo", &profile.tempo, &mut details, |rng, p| {
        sample_range(rng, &p.rate)
    });
    (
        AudioPlan {
            gain_db,
            semitones,
            tempo,
        },
        details,
    )
}

#[derive(Debug)]
pub struct AudioOutcome {
    /// `false` when the stage failed and `output` is the untouched input
    pub success: bool,
    pub output: PathBuf,
    pub log: AudioLog,
}

/// Decode, process and re-encode as PCM. Blocking.
fn process(
    input: &Path,
    decoded: &Path,
    output: &Path,
    plan: &AudioPlan,
    runner: &FfmpegRunner,
    log: &mut AudioLog,
) -> MediaResult<()> {
    let extract = FfmpegCommand::new(decoded)
        .input(input)
        .no_video()
        .map("0:a:0")
        .audio_codec("pcm_s16le");
    runner.run_blocking(&extract)?;

    let mut audio = read_wav(decoded)?;
    if audio.is_empty() {
        return Err(MediaError::internal("Decoded audio track is empty"));
    }
    log.sample_rate = Some(audio.sample_rate);
    log.channels = Some(audio.channel_count());
    let sample_rate = audio.sample_rate;

    if let Some(db) = plan.gain_db {
        for channel in audio.channels.iter_mut() {
            apply_gain(channel, db);
        }
    }
    if let Some(semitones) = plan.semitones {
        audio.map_channels(|c| pitch_shift(c, semitones, sample_rate));
    }
    if let Some(rate) = plan.tempo {
        audio.map_channels(|c| time_stretch(c, rate, sample_rate));
    }

    write_wav_pcm16(output, &audio)
}

/// Randomize the audio track of `input` (an audio file or a video with audio).
///
/// Never fails: on any error the original `input` is handed back with
/// `success = false`.
pub async fn randomize_audio<R: Rng + ?Sized>(
    input: &Path,
    scratch: &dyn ScratchSpace,
    profile: &AudioProfile,
    rng: &mut R,
    runner: &FfmpegRunner,
) -> AudioOutcome {
    let mut log = AudioLog::default();
    if !profile.apply {
        return AudioOutcome {
            success: true,
            output: input.to_path_buf(),
            log,
        };
    }

    let (plan, details) = sample_audio_plan(profile, rng);
    log.effects_applied_detail = details;
    if plan.is_empty() {
        info!("No audio effects rolled, keeping original track");
        return AudioOutcome {
            success: true,
            output: input.to_path_buf(),
            log,
        };
    }

    let decoded = scratch.allocate("audio_decoded", "wav");
    let output = scratch.allocate("audio_randomized", "wav");
    let started = Instant::now();

    let details = log.effects_applied_detail.clone();
    let task = {
        let input = input.to_path_buf();
        let decoded = decoded.clone();
        let output = output.clone();
        let runner = runner.clone();
        tokio::task::spawn_blocking(move || {
            let mut log = log;
            let result = process(&input, &decoded, &output, &plan, &runner, &mut log);
            (result, log)
        })
    };

    let (result, mut log) = match task.await {
        Ok(done) => done,
        Err(e) => (
            Err(MediaError::internal(format!("Audio task panicked: {}", e))),
            AudioLog {
                effects_applied_detail: details,
                ..AudioLog::default()
            },
        ),
    };
    remove_if_exists(&decoded);

    match result {
        Ok(()) => {
            log.applied = true;
            metrics::record_stage("audio", started.elapsed().as_secs_f64());
            info!(
                gain_db = ?plan.gain_db,
                semitones = ?plan.semitones,
                tempo = ?plan.tempo,
                "Audio randomization complete"
            );
            AudioOutcome {
                success: true,
                output,
                log,
            }
        }
        Err(e) => {
            warn!(input = %input.display(), error = %e, "Audio randomization failed, using original audio");
            remove_if_exists(&output);
            metrics::record_fallback("audio");
            log.applied = false;
            log.error = Some(e.to_string());
            AudioOutcome {
                success: false,
                output: input.to_path_buf(),
                log,
            }
        }
    }
}

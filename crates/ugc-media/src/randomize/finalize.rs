//! Final mux: EQ, randomized encoder settings and metadata scrubbing.
//!
//! This is the only lossy encode of the randomized streams. A failure here is
//! fatal for the job since it produces the deliverable.

use rand::seq::IndexedRandom;
use rand::Rng;
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Instant;
use tracing::info;
use ugc_models::encoding::{DEFAULT_CRF, DEFAULT_PRESET};
use ugc_models::{
    EffectDetail, EncoderChoice, EncodingLog, EncodingProfile, EqualizerRanges, MetadataLog,
    RandomizationProfile,
};

use super::params::{roll_effect, sample_count, sample_range};
use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::MediaResult;
use crate::metrics;

const DECOY_KEYS: [&str; 3] = ["title", "artist", "comment"];
const TOKEN_ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// One parametric EQ band.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize)]
pub struct EqBand {
    pub frequency_hz: f64,
    pub width_q: f64,
    pub gain_db: f64,
}

impl EqBand {
    pub fn to_filter(&self) -> String {
        format!(
            "equalizer=f={:.1}:t=q:w={:.3}:g={:.2}",
            self.frequency_hz, self.width_q, self.gain_db
        )
    }
}

/// Comma-joined FFmpeg filter chain, `None` for no bands.
pub fn equalizer_chain(bands: &[EqBand]) -> Option<String> {
    if bands.is_empty() {
        return None;
    }
    Some(bands.iter().map(EqBand::to_filter).collect::<Vec<_>>().join(","))
}

fn sample_bands<R: Rng + ?Sized>(rng: &mut R, ranges: &EqualizerRanges) -> Vec<EqBand> {
    let count = sample_count(rng, &ranges.bands);
    (0..count)
        .map(|_| EqBand {
            frequency_hz: sample_range(rng, &ranges.frequency_hz),
            width_q: sample_range(rng, &ranges.width_q),
            gain_db: sample_range(rng, &ranges.gain_db),
        })
        .collect()
}

/// Encoder settings drawn from the profile, or the defaults when encoding
/// randomization is off.
pub fn choose_encoder<R: Rng + ?Sized>(profile: &EncodingProfile, rng: &mut R) -> EncoderChoice {
    if !profile.apply {
        return EncoderChoice::new(DEFAULT_CRF, DEFAULT_PRESET, None);
    }
    let crf = sample_range(rng, &profile.crf).round().clamp(0.0, 51.0) as u8;
    let preset = profile
        .presets
        .choose(rng)
        .cloned()
        .unwrap_or_else(|| DEFAULT_PRESET.to_string());
    let tune = profile.tunes.choose(rng).cloned();
    EncoderChoice::new(crf, preset, tune)
}

fn random_token<R: Rng + ?Sized>(rng: &mut R, len: usize) -> String {
    (0..len)
        .map(|_| TOKEN_ALPHABET[rng.random_range(0..TOKEN_ALPHABET.len())] as char)
        .collect()
}

/// Everything decided for the final encode, before running it.
#[derive(Debug, Clone)]
pub struct FinalizePlan {
    pub encoder: EncoderChoice,
    pub audio_filter: Option<String>,
    pub equalizer: Option<EffectDetail>,
    pub strip_metadata: bool,
    pub decoy_roll: Option<f64>,
    pub decoys: BTreeMap<String, String>,
}

impl FinalizePlan {
    pub fn sample<R: Rng + ?Sized>(profile: &RandomizationProfile, rng: &mut R) -> Self {
        let mut details = BTreeMap::new();
        let bands = if profile.audio.apply {
            roll_effect(rng, "equalizer", &profile.audio.equalizer, &mut details, sample_bands)
        } else {
            None
        };
        let audio_filter = bands.as_deref().and_then(equalizer_chain);

        let encoder = choose_encoder(&profile.encoding, rng);

        let metadata = &profile.metadata;
        let mut decoy_roll = None;
        let mut decoys = BTreeMap::new();
        if metadata.apply {
            let roll: f64 = rng.random();
            decoy_roll = Some(roll);
            if roll < metadata.decoy_probability {
                for key in DECOY_KEYS {
                    let len = rng.random_range(6..=14);
                    decoys.insert(key.to_string(), random_token(rng, len));
                }
            }
        }

        Self {
            encoder,
            audio_filter,
            equalizer: details.remove("equalizer"),
            strip_metadata: metadata.apply && metadata.strip,
            decoy_roll,
            decoys,
        }
    }

    /// Build the mux command. `audio` is mapped when given, otherwise the
    /// video's own audio (if any) is kept.
    pub fn command(&self, video: &Path, audio: Option<&Path>, output: &Path) -> FfmpegCommand {
        let mut cmd = FfmpegCommand::new(output).input(video).map("0:v:0");
        cmd = match audio {
            Some(audio) => cmd.input(audio).map("1:a:0?"),
            None => cmd.map("0:a:0?"),
        };
        if let Some(filter) = &self.audio_filter {
            cmd = cmd.audio_filter(filter.clone());
        }
        cmd = cmd.encoder(&self.encoder);
        if self.strip_metadata {
            cmd = cmd.strip_metadata();
        }
        for (key, value) in &self.decoys {
            cmd = cmd.metadata(key, value);
        }
        cmd.faststart()
    }

    pub fn encoding_log(&self, applied: bool) -> EncodingLog {
        EncodingLog {
            applied,
            encoder: Some(self.encoder.clone()),
            audio_filters: self.audio_filter.clone(),
            equalizer: self.equalizer.clone(),
        }
    }

    pub fn metadata_log(&self, applied: bool) -> MetadataLog {
        MetadataLog {
            applied,
            stripped: self.strip_metadata,
            decoy_roll: self.decoy_roll,
            decoys: self.decoys.clone(),
        }
    }
}

/// Encode `video` + `audio` into `output`.
pub async fn finalize(
    plan: &FinalizePlan,
    video: &Path,
    audio: Option<&Path>,
    output: &Path,
    runner: &FfmpegRunner,
) -> MediaResult<()> {
    let started = Instant::now();
    let cmd = plan.command(video, audio, output);
    runner.run(&cmd).await?;
    metrics::record_stage("finalize", started.elapsed().as_secs_f64());
    info!(
        crf = plan.encoder.crf,
        preset = %plan.encoder.preset,
        tune = ?plan.encoder.tune,
        eq = ?plan.audio_filter,
        decoys = plan.decoys.len(),
        "Finalized output"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::randomize::profiles;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use ugc_models::Intensity;

    #[test]
    fn test_equalizer_chain_format() {
        let chain = equalizer_chain(&[
            EqBand {
                frequency_hz: 1000.0,
                width_q: 1.0,
                gain_db: -2.5,
            },
            EqBand {
                frequency_hz: 250.0,
                width_q: 0.8,
                gain_db: 1.0,
            },
        ])
        .unwrap();
        assert_eq!(
            chain,
            "equalizer=f=1000.0:t=q:w=1.000:g=-2.50,equalizer=f=250.0:t=q:w=0.800:g=1.00"
        );
        assert!(equalizer_chain(&[]).is_none());
    }

    #[test]
    fn test_encoder_choice_within_profile() {
        let profile = profiles::resolve(Intensity::High);
        for seed in 0..20 {
            let choice = choose_encoder(&profile.encoding, &mut StdRng::seed_from_u64(seed));
            assert!(profile.encoding.crf.contains(choice.crf as f64));
            assert!(profile.encoding.presets.contains(&choice.preset));
            if let Some(tune) = &choice.tune {
                assert!(profile.encoding.tunes.contains(tune));
            }
        }
    }

    #[test]
    fn test_disabled_encoding_uses_defaults() {
        let mut profile = profiles::resolve(Intensity::Low).encoding;
        profile.apply = false;
        let choice = choose_encoder(&profile, &mut StdRng::seed_from_u64(1));
        assert_eq!(choice.crf, DEFAULT_CRF);
        assert_eq!(choice.preset, DEFAULT_PRESET);
        assert!(choice.tune.is_none());
    }

    #[test]
    fn test_command_maps_streams_and_scrubs_metadata() {
        let mut profile = profiles::resolve(Intensity::High);
        profile.metadata.decoy_probability = 1.0;
        profile.audio.equalizer.probability = 1.0;
        let plan = FinalizePlan::sample(&profile, &mut StdRng::seed_from_u64(9));
        assert_eq!(plan.decoys.len(), 3);
        assert!(plan.audio_filter.as_deref().is_some_and(|f| f.starts_with("equalizer=")));

        let args = plan
            .command(Path::new("v.mp4"), Some(Path::new("a.wav")), Path::new("out.mp4"))
            .build_args();
        let joined = args.join(" ");
        assert!(joined.contains("-map 0:v:0"));
        assert!(joined.contains("-map 1:a:0?"));
        assert!(joined.contains("-map_metadata -1"));
        assert!(joined.contains("-movflags +faststart"));
        assert!(joined.contains("-af equalizer="));
        assert!(joined.contains("-metadata title="));
        assert_eq!(args.last().map(String::as_str), Some("out.mp4"));
    }

    #[test]
    fn test_metadata_off_keeps_source_tags() {
        let mut profile = profiles::resolve(Intensity::Low);
        profile.metadata.apply = false;
        let plan = FinalizePlan::sample(&profile, &mut StdRng::seed_from_u64(2));
        assert!(!plan.strip_metadata);
        assert!(plan.decoys.is_empty());
        let joined = plan.command(Path::new("v.mp4"), None, Path::new("o.mp4")).build_args().join(" ");
        assert!(!joined.contains("-map_metadata"));
        assert!(joined.contains("-map 0:a:0?"));
    }
}

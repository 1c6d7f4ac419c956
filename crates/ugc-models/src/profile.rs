//! Randomization profile configuration tree.
//!
//! A profile describes which visual, audio, metadata and encoding transforms
//! are eligible for a job, how likely each one is to fire, and the numeric
//! ranges its parameters are drawn from. Profiles are immutable once
//! resolved and must pass [`RandomizationProfile::validate`] before use.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::Intensity;

/// Errors found while validating a profile.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ProfileError {
    #[error("{field}: range min {min} is greater than max {max}")]
    InvertedRange { field: String, min: f64, max: f64 },

    #[error("{field}: range bound is not finite")]
    NonFiniteRange { field: String },

    #[error("{field}: probability {value} is outside [0, 1]")]
    InvalidProbability { field: String, value: f64 },

    #[error("{field}: at least one choice is required")]
    EmptyChoices { field: String },

    #[error("{field}: range [{min}, {max}] leaves the allowed [{lower}, {upper}]")]
    OutOfBounds {
        field: String,
        min: f64,
        max: f64,
        lower: f64,
        upper: f64,
    },
}

/// Slowest tempo rate a profile may draw.
pub const TEMPO_RATE_MIN: f64 = 0.5;
/// Fastest tempo rate a profile may draw.
pub const TEMPO_RATE_MAX: f64 = 2.0;

/// Inclusive numeric range `[min, max]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ParamRange {
    pub min: f64,
    pub max: f64,
}

impl ParamRange {
    pub const fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    /// A degenerate range that always yields `value`.
    pub const fn fixed(value: f64) -> Self {
        Self {
            min: value,
            max: value,
        }
    }

    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }

    pub fn span(&self) -> f64 {
        self.max - self.min
    }

    fn check(&self, field: &str) -> Result<(), ProfileError> {
        if !self.min.is_finite() || !self.max.is_finite() {
            return Err(ProfileError::NonFiniteRange {
                field: field.to_string(),
            });
        }
        if self.min > self.max {
            return Err(ProfileError::InvertedRange {
                field: field.to_string(),
                min: self.min,
                max: self.max,
            });
        }
        Ok(())
    }

    fn check_within(&self, field: &str, lower: f64, upper: f64) -> Result<(), ProfileError> {
        self.check(field)?;
        if self.min < lower || self.max > upper {
            return Err(ProfileError::OutOfBounds {
                field: field.to_string(),
                min: self.min,
                max: self.max,
                lower,
                upper,
            });
        }
        Ok(())
    }
}

/// Parameter ranges that can enumerate themselves for validation.
pub trait RangeSet {
    fn ranges(&self) -> Vec<(&'static str, ParamRange)>;
}

/// One optional transform: activation probability plus its parameter ranges.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct EffectConfig<P> {
    /// Chance that the effect is activated for a given video
    pub probability: f64,
    #[serde(flatten)]
    pub params: P,
}

impl<P> EffectConfig<P> {
    pub const fn new(probability: f64, params: P) -> Self {
        Self {
            probability,
            params,
        }
    }

    /// Same ranges, never activated.
    pub fn disabled(params: P) -> Self {
        Self {
            probability: 0.0,
            params,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.probability > 0.0
    }
}

impl<P: RangeSet> EffectConfig<P> {
    fn check(&self, name: &str) -> Result<(), ProfileError> {
        check_probability(name, self.probability)?;
        for (field, range) in self.params.ranges() {
            range.check(&format!("{}.{}", name, field))?;
        }
        Ok(())
    }
}

fn check_probability(field: &str, value: f64) -> Result<(), ProfileError> {
    if !(0.0..=1.0).contains(&value) || value.is_nan() {
        return Err(ProfileError::InvalidProbability {
            field: field.to_string(),
            value,
        });
    }
    Ok(())
}

macro_rules! range_set {
    ($ty:ident { $($field:ident),+ $(,)? }) => {
        impl RangeSet for $ty {
            fn ranges(&self) -> Vec<(&'static str, ParamRange)> {
                vec![$((stringify!($field), self.$field)),+]
            }
        }
    };
}

// =============================================================================
// Visual
// =============================================================================

/// Smooth camera shake built from superposed sine waves.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ShakeRanges {
    /// Peak translation per axis in pixels
    pub translate_px: ParamRange,
    /// Peak rotation in degrees
    pub rotation_deg: ParamRange,
    /// Peak zoom deviation from 1.0
    pub zoom: ParamRange,
    /// Oscillation frequency of each sine component
    pub frequency_hz: ParamRange,
    /// Number of sine components per axis (rounded, at least 1)
    pub components: ParamRange,
}
range_set!(ShakeRanges { translate_px, rotation_deg, zoom, frequency_hz, components });

/// Time-varying HSV shift. Hue is in 8-bit HSV units (0..180).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct HsvShiftRanges {
    pub hue_shift: ParamRange,
    /// Amplitude of the slow hue drift around `hue_shift`
    pub hue_drift: ParamRange,
    pub saturation_scale: ParamRange,
    pub saturation_offset: ParamRange,
    pub value_scale: ParamRange,
    pub value_offset: ParamRange,
    pub drift_frequency_hz: ParamRange,
}
range_set!(HsvShiftRanges {
    hue_shift,
    hue_drift,
    saturation_scale,
    saturation_offset,
    value_scale,
    value_offset,
    drift_frequency_hz,
});

/// Time-varying shift of the LAB chroma channels. Lightness is never touched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct LabShiftRanges {
    pub a_shift: ParamRange,
    pub b_shift: ParamRange,
    pub drift_amplitude: ParamRange,
    pub drift_frequency_hz: ParamRange,
}
range_set!(LabShiftRanges { a_shift, b_shift, drift_amplitude, drift_frequency_hz });

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct GammaRanges {
    pub gamma: ParamRange,
}
range_set!(GammaRanges { gamma });

/// Halo glow around bright or high-gradient regions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct GlowRanges {
    /// Mask threshold (luminance or gradient magnitude, 0..255)
    pub threshold: ParamRange,
    /// Blur kernel size (forced odd)
    pub blur_kernel: ParamRange,
    pub alpha: ParamRange,
}
range_set!(GlowRanges { threshold, blur_kernel, alpha });

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ChromaticRanges {
    /// Per-axis red channel offset in pixels
    pub red_shift_px: ParamRange,
    /// Per-axis blue channel offset in pixels
    pub blue_shift_px: ParamRange,
}
range_set!(ChromaticRanges { red_shift_px, blue_shift_px });

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct NoiseRanges {
    pub alpha: ParamRange,
    pub std_dev: ParamRange,
}
range_set!(NoiseRanges { alpha, std_dev });

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SharpenRanges {
    pub amount: ParamRange,
    /// Blur kernel size (forced odd, at least 3)
    pub kernel_size: ParamRange,
}
range_set!(SharpenRanges { amount, kernel_size });

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SpeckleRanges {
    /// Fraction of pixels turned white per frame
    pub density: ParamRange,
    /// Blend toward white (1.0 = pure white)
    pub intensity: ParamRange,
}
range_set!(SpeckleRanges { density, intensity });

/// Per-frame visual transforms.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct VisualProfile {
    pub apply: bool,
    pub camera_shake: EffectConfig<ShakeRanges>,
    pub hsv_shift: EffectConfig<HsvShiftRanges>,
    pub lab_shift: EffectConfig<LabShiftRanges>,
    pub gamma: EffectConfig<GammaRanges>,
    pub edge_glow: EffectConfig<GlowRanges>,
    pub difference_glow: EffectConfig<GlowRanges>,
    pub chromatic_aberration: EffectConfig<ChromaticRanges>,
    pub analog_grain: EffectConfig<NoiseRanges>,
    pub white_noise: EffectConfig<NoiseRanges>,
    pub sharpen: EffectConfig<SharpenRanges>,
    pub speckles: EffectConfig<SpeckleRanges>,
}

impl VisualProfile {
    pub fn validate(&self) -> Result<(), ProfileError> {
        self.camera_shake.check("visual.camera_shake")?;
        self.hsv_shift.check("visual.hsv_shift")?;
        self.lab_shift.check("visual.lab_shift")?;
        self.gamma.check("visual.gamma")?;
        self.edge_glow.check("visual.edge_glow")?;
        self.difference_glow.check("visual.difference_glow")?;
        self.chromatic_aberration.check("visual.chromatic_aberration")?;
        self.analog_grain.check("visual.analog_grain")?;
        self.white_noise.check("visual.white_noise")?;
        self.sharpen.check("visual.sharpen")?;
        self.speckles.check("visual.speckles")?;
        Ok(())
    }
}

// =============================================================================
// Audio
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct VolumeRanges {
    pub gain_db: ParamRange,
}
range_set!(VolumeRanges { gain_db });

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct PitchRanges {
    pub semitones: ParamRange,
}
range_set!(PitchRanges { semitones });

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct TempoRanges {
    /// Playback rate; values above 1.0 shorten the track
    pub rate: ParamRange,
}
range_set!(TempoRanges { rate });

/// Parametric EQ applied natively by FFmpeg in the finalizer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct EqualizerRanges {
    /// Number of bands (rounded, at least 1)
    pub bands: ParamRange,
    pub frequency_hz: ParamRange,
    pub gain_db: ParamRange,
    pub width_q: ParamRange,
}
range_set!(EqualizerRanges { bands, frequency_hz, gain_db, width_q });

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct AudioProfile {
    pub apply: bool,
    pub volume: EffectConfig<VolumeRanges>,
    pub pitch: EffectConfig<PitchRanges>,
    pub tempo: EffectConfig<TempoRanges>,
    pub equalizer: EffectConfig<EqualizerRanges>,
}

impl AudioProfile {
    pub fn validate(&self) -> Result<(), ProfileError> {
        self.volume.check("audio.volume")?;
        self.pitch.check("audio.pitch")?;
        self.tempo.check("audio.tempo")?;
        self.tempo
            .params
            .rate
            .check_within("audio.tempo.rate", TEMPO_RATE_MIN, TEMPO_RATE_MAX)?;
        self.equalizer.check("audio.equalizer")?;
        Ok(())
    }
}

// =============================================================================
// Metadata / encoding
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct MetadataProfile {
    pub apply: bool,
    /// Drop every container/stream metadata entry from the source
    pub strip: bool,
    /// Chance of injecting random title/artist/comment values
    pub decoy_probability: f64,
}

impl MetadataProfile {
    pub fn validate(&self) -> Result<(), ProfileError> {
        check_probability("metadata.decoy_probability", self.decoy_probability)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct EncodingProfile {
    pub apply: bool,
    pub crf: ParamRange,
    pub presets: Vec<String>,
    /// x264 tunes; the entry `"none"` means no `-tune` flag
    pub tunes: Vec<String>,
}

impl EncodingProfile {
    pub fn validate(&self) -> Result<(), ProfileError> {
        self.crf.check("encoding.crf")?;
        if self.presets.is_empty() {
            return Err(ProfileError::EmptyChoices {
                field: "encoding.presets".to_string(),
            });
        }
        if self.tunes.is_empty() {
            return Err(ProfileError::EmptyChoices {
                field: "encoding.tunes".to_string(),
            });
        }
        Ok(())
    }
}

/// Complete randomization configuration for one job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct RandomizationProfile {
    pub intensity: Intensity,
    pub visual: VisualProfile,
    pub audio: AudioProfile,
    pub metadata: MetadataProfile,
    pub encoding: EncodingProfile,
}

impl RandomizationProfile {
    /// Check every range has `min <= max` and every probability is in `[0, 1]`.
    pub fn validate(&self) -> Result<(), ProfileError> {
        self.visual.validate()?;
        self.audio.validate()?;
        self.metadata.validate()?;
        self.encoding.validate()?;
        Ok(())
    }

    /// True when no stage would do anything.
    pub fn is_passthrough(&self) -> bool {
        !self.visual.apply && !self.audio.apply && !self.metadata.apply && !self.encoding.apply
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noise(prob: f64, min: f64, max: f64) -> EffectConfig<NoiseRanges> {
        EffectConfig::new(
            prob,
            NoiseRanges {
                alpha: ParamRange::new(min, max),
                std_dev: ParamRange::fixed(4.0),
            },
        )
    }

    #[test]
    fn test_param_range_contains() {
        let range = ParamRange::new(-1.0, 2.0);
        assert!(range.contains(0.0));
        assert!(range.contains(2.0));
        assert!(!range.contains(2.5));
        assert!((range.span() - 3.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_inverted_range_rejected() {
        let err = noise(0.5, 0.3, 0.1).check("visual.analog_grain").unwrap_err();
        assert!(matches!(err, ProfileError::InvertedRange { .. }));
        assert!(err.to_string().contains("visual.analog_grain.alpha"));
    }

    #[test]
    fn test_probability_out_of_bounds_rejected() {
        let err = noise(1.5, 0.0, 0.1).check("visual.white_noise").unwrap_err();
        assert!(matches!(err, ProfileError::InvalidProbability { .. }));
    }

    #[test]
    fn test_nan_range_rejected() {
        let err = noise(0.5, f64::NAN, 0.1).check("x").unwrap_err();
        assert!(matches!(err, ProfileError::NonFiniteRange { .. }));
    }

    #[test]
    fn test_flattened_serde_shape() {
        let json = serde_json::to_value(noise(0.25, 0.0, 0.1)).unwrap();
        assert_eq!(json["probability"], 0.25);
        assert_eq!(json["alpha"]["max"], 0.1);
    }

    #[test]
    fn test_encoding_requires_choices() {
        let profile = EncodingProfile {
            apply: true,
            crf: ParamRange::new(18.0, 23.0),
            presets: vec![],
            tunes: vec!["none".to_string()],
        };
        assert!(matches!(
            profile.validate(),
            Err(ProfileError::EmptyChoices { .. })
        ));
    }

    fn audio(rate: ParamRange) -> AudioProfile {
        AudioProfile {
            apply: true,
            volume: EffectConfig::disabled(VolumeRanges {
                gain_db: ParamRange::fixed(0.0),
            }),
            pitch: EffectConfig::disabled(PitchRanges {
                semitones: ParamRange::fixed(0.0),
            }),
            tempo: EffectConfig::new(0.5, TempoRanges { rate }),
            equalizer: EffectConfig::disabled(EqualizerRanges {
                bands: ParamRange::fixed(1.0),
                frequency_hz: ParamRange::fixed(1000.0),
                gain_db: ParamRange::fixed(0.0),
                width_q: ParamRange::fixed(1.0),
            }),
        }
    }

    #[test]
    fn test_tempo_rate_is_bounded() {
        assert!(audio(ParamRange::new(0.97, 1.03)).validate().is_ok());
        assert!(audio(ParamRange::new(TEMPO_RATE_MIN, TEMPO_RATE_MAX)).validate().is_ok());
        for (min, max) in [(0.01, 1.0), (1.0, 50.0), (0.0, 0.0)] {
            let err = audio(ParamRange::new(min, max)).validate().unwrap_err();
            assert!(matches!(err, ProfileError::OutOfBounds { .. }), "{:?}", err);
        }
    }

    #[test]
    fn test_tempo_bound_applies_even_when_disabled() {
        let mut profile = audio(ParamRange::new(1.0, 10.0));
        profile.tempo.probability = 0.0;
        assert!(profile.validate().is_err());
    }
}

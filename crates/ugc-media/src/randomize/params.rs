//! One-shot parameter sampling for a video.
//!
//! [`sample_parameters`] rolls every effect's activation probability once
//! and draws its concrete values once. The resulting [`EffectParameterSet`]
//! is then only read by the frame loop, so the whole output carries a single
//! coherent fingerprint. Time-varying effects hold [`WaveFunction`]s that
//! are evaluated at each frame time without being re-drawn.

use rand::Rng;
use serde::Serialize;
use std::collections::BTreeMap;
use ugc_models::{EffectConfig, EffectDetail, ParamRange, VisualProfile};

use super::wave::WaveFunction;
use crate::effects::{
    normalize_kernel, ChromaticShift, GlowParams, HsvShift, LabShift, NoiseParams, ShakeSample,
    SharpenParams, SpeckleParams,
};

/// Uniform draw from an inclusive range.
pub fn sample_range<R: Rng + ?Sized>(rng: &mut R, range: &ParamRange) -> f64 {
    if range.max <= range.min {
        range.min
    } else {
        rng.random_range(range.min..=range.max)
    }
}

/// Rounded draw, at least 1.
pub(crate) fn sample_count<R: Rng + ?Sized>(rng: &mut R, range: &ParamRange) -> usize {
    sample_range(rng, range).round().max(1.0) as usize
}

/// Rounded draw forced to an odd kernel size of at least 3.
pub(crate) fn sample_kernel<R: Rng + ?Sized>(rng: &mut R, range: &ParamRange) -> usize {
    let raw = sample_range(rng, range).round().max(1.0) as usize;
    normalize_kernel(raw).unwrap_or(3)
}

/// Roll `config.probability` once, sampling parameters only on success.
pub(crate) fn roll_effect<P, T, R, F>(
    rng: &mut R,
    name: &str,
    config: &EffectConfig<P>,
    details: &mut BTreeMap<String, EffectDetail>,
    sample: F,
) -> Option<T>
where
    T: Serialize,
    R: Rng + ?Sized,
    F: FnOnce(&mut R, &P) -> T,
{
    let roll: f64 = rng.random();
    if config.probability > 0.0 && roll < config.probability {
        let params = sample(rng, &config.params);
        let json = serde_json::to_value(&params).unwrap_or(serde_json::Value::Null);
        details.insert(
            name.to_string(),
            EffectDetail::applied(config.probability, roll, json),
        );
        Some(params)
    } else {
        details.insert(
            name.to_string(),
            EffectDetail::skipped(config.probability, roll),
        );
        None
    }
}

/// Camera shake waves per axis.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ShakeParams {
    pub dx: WaveFunction,
    pub dy: WaveFunction,
    pub angle_deg: WaveFunction,
    /// Deviation from unit scale
    pub zoom: WaveFunction,
}

impl ShakeParams {
    pub fn at(&self, t: f64) -> ShakeSample {
        ShakeSample {
            dx: self.dx.eval(t),
            dy: self.dy.eval(t),
            angle_deg: self.angle_deg.eval(t),
            scale: 1.0 + self.zoom.eval(t),
        }
    }
}

/// Constant HSV adjustment plus a slow hue drift.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HsvDrift {
    pub base: HsvShift,
    pub hue_drift: WaveFunction,
}

impl HsvDrift {
    pub fn at(&self, t: f64) -> HsvShift {
        HsvShift {
            hue_shift: self.base.hue_shift + self.hue_drift.eval(t),
            ..self.base
        }
    }
}

/// Constant LAB chroma offset plus slow drift on each axis.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LabDrift {
    pub base: LabShift,
    pub a_drift: WaveFunction,
    pub b_drift: WaveFunction,
}

impl LabDrift {
    pub fn at(&self, t: f64) -> LabShift {
        LabShift {
            a: self.base.a + self.a_drift.eval(t),
            b: self.base.b + self.b_drift.eval(t),
        }
    }
}

/// Concrete values for every activated effect of one video.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct EffectParameterSet {
    pub camera_shake: Option<ShakeParams>,
    pub hsv_shift: Option<HsvDrift>,
    pub lab_shift: Option<LabDrift>,
    pub gamma: Option<f64>,
    pub edge_glow: Option<GlowParams>,
    pub difference_glow: Option<GlowParams>,
    pub chromatic_aberration: Option<ChromaticShift>,
    pub analog_grain: Option<NoiseParams>,
    pub white_noise: Option<NoiseParams>,
    pub sharpen: Option<SharpenParams>,
    pub speckles: Option<SpeckleParams>,
}

impl EffectParameterSet {
    pub fn active_count(&self) -> usize {
        [
            self.camera_shake.is_some(),
            self.hsv_shift.is_some(),
            self.lab_shift.is_some(),
            self.gamma.is_some(),
            self.edge_glow.is_some(),
            self.difference_glow.is_some(),
            self.chromatic_aberration.is_some(),
            self.analog_grain.is_some(),
            self.white_noise.is_some(),
            self.sharpen.is_some(),
            self.speckles.is_some(),
        ]
        .iter()
        .filter(|on| **on)
        .count()
    }

    pub fn is_empty(&self) -> bool {
        self.active_count() == 0
    }
}

fn sample_glow<R: Rng + ?Sized>(rng: &mut R, p: &ugc_models::GlowRanges) -> GlowParams {
    GlowParams {
        threshold: sample_range(rng, &p.threshold),
        blur_kernel: sample_kernel(rng, &p.blur_kernel),
        alpha: sample_range(rng, &p.alpha),
    }
}

fn sample_noise<R: Rng + ?Sized>(rng: &mut R, p: &ugc_models::NoiseRanges) -> NoiseParams {
    NoiseParams {
        alpha: sample_range(rng, &p.alpha),
        std_dev: sample_range(rng, &p.std_dev),
    }
}

/// Roll and sample every visual effect exactly once.
///
/// Returns the parameters for the frame loop and an audit entry per effect,
/// applied or not.
pub fn sample_parameters<R: Rng + ?Sized>(
    profile: &VisualProfile,
    rng: &mut R,
) -> (EffectParameterSet, BTreeMap<String, EffectDetail>) {
    let mut details = BTreeMap::new();
    let mut set = EffectParameterSet::default();

    set.camera_shake = roll_effect(rng, "camera_shake", &profile.camera_shake, &mut details, |rng, p| {
        let components = sample_count(rng, &p.components);
        let translate = sample_range(rng, &p.translate_px);
        let rotation = sample_range(rng, &p.rotation_deg);
        let zoom = sample_range(rng, &p.zoom);
        ShakeParams {
            dx: WaveFunction::sample(rng, components, translate, &p.frequency_hz),
            dy: WaveFunction::sample(rng, components, translate, &p.frequency_hz),
            angle_deg: WaveFunction::sample(rng, components, rotation, &p.frequency_hz),
            zoom: WaveFunction::sample(rng, components, zoom, &p.frequency_hz),
        }
    });

    set.hsv_shift = roll_effect(rng, "hsv_shift", &profile.hsv_shift, &mut details, |rng, p| {
        let base = HsvShift {
            hue_shift: sample_range(rng, &p.hue_shift),
            saturation_scale: sample_range(rng, &p.saturation_scale),
            saturation_offset: sample_range(rng, &p.saturation_offset),
            value_scale: sample_range(rng, &p.value_scale),
            value_offset: sample_range(rng, &p.value_offset),
        };
        let drift = sample_range(rng, &p.hue_drift);
        HsvDrift {
            base,
            hue_drift: WaveFunction::sample(rng, 2, drift, &p.drift_frequency_hz),
        }
    });

    set.lab_shift = roll_effect(rng, "lab_shift", &profile.lab_shift, &mut details, |rng, p| {
        let base = LabShift {
            a: sample_range(rng, &p.a_shift),
            b: sample_range(rng, &p.b_shift),
        };
        let drift = sample_range(rng, &p.drift_amplitude);
        LabDrift {
            base,
            a_drift: WaveFunction::sample(rng, 2, drift, &p.drift_frequency_hz),
            b_drift: WaveFunction::sample(rng, 2, drift, &p.drift_frequency_hz),
        }
    });

    set.gamma = roll_effect(rng, "gamma", &profile.gamma, &mut details, |rng, p| {
        sample_range(rng, &p.gamma)
    });

    set.edge_glow = roll_effect(rng, "edge_glow", &profile.edge_glow, &mut details, sample_glow);
    set.difference_glow = roll_effect(
        rng,
        "difference_glow",
        &profile.difference_glow,
        &mut details,
        sample_glow,
    );

    set.chromatic_aberration = roll_effect(
        rng,
        "chromatic_aberration",
        &profile.chromatic_aberration,
        &mut details,
        |rng, p| ChromaticShift {
            red: (sample_range(rng, &p.red_shift_px), sample_range(rng, &p.red_shift_px)),
            blue: (sample_range(rng, &p.blue_shift_px), sample_range(rng, &p.blue_shift_px)),
        },
    );

    set.analog_grain = roll_effect(rng, "analog_grain", &profile.analog_grain, &mut details, sample_noise);
    set.white_noise = roll_effect(rng, "white_noise", &profile.white_noise, &mut details, sample_noise);

    set.sharpen = roll_effect(rng, "sharpen", &profile.sharpen, &mut details, |rng, p| SharpenParams {
        amount: sample_range(rng, &p.amount),
        kernel_size: sample_kernel(rng, &p.kernel_size),
    });

    set.speckles = roll_effect(rng, "speckles", &profile.speckles, &mut details, |rng, p| SpeckleParams {
        density: sample_range(rng, &p.density),
        intensity: sample_range(rng, &p.intensity),
    });

    (set, details)
}

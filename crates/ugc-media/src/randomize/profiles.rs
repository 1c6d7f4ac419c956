//! Compiled-in randomization profiles per intensity.

use tracing::warn;
use ugc_models::{
    AudioProfile, ChromaticRanges, EffectConfig, EncodingProfile, EqualizerRanges, GammaRanges,
    GlowRanges, HsvShiftRanges, Intensity, LabShiftRanges, MetadataProfile, NoiseRanges,
    ParamRange, PitchRanges, RandomizationProfile, SharpenRanges, ShakeRanges, SpeckleRanges,
    TempoRanges, VisualProfile, VolumeRanges,
};

const fn r(min: f64, max: f64) -> ParamRange {
    ParamRange::new(min, max)
}

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|s| s.to_string()).collect()
}

/// Profile for a known intensity.
pub fn resolve(intensity: Intensity) -> RandomizationProfile {
    match intensity {
        Intensity::None => none(),
        Intensity::Low => low(),
        Intensity::Medium => medium(),
        Intensity::High => high(),
    }
}

/// Profile for a caller-supplied label. Unknown labels resolve to medium;
/// the returned flag is `false` in that case.
pub fn resolve_label(label: &str) -> (RandomizationProfile, bool) {
    let (intensity, recognized) = Intensity::from_label(label);
    if !recognized {
        warn!(label = %label, fallback = %intensity, "Unknown intensity, using fallback profile");
    }
    (resolve(intensity), recognized)
}

fn none() -> RandomizationProfile {
    let mut profile = low();
    profile.intensity = Intensity::None;
    profile.visual.apply = false;
    profile.audio.apply = false;
    profile.metadata.apply = false;
    profile.encoding.apply = false;
    profile
}

fn low() -> RandomizationProfile {
    RandomizationProfile {
        intensity: Intensity::Low,
        visual: VisualProfile {
            apply: true,
            camera_shake: EffectConfig::new(
                0.3,
                ShakeRanges {
                    translate_px: r(1.0, 3.0),
                    rotation_deg: r(0.1, 0.4),
                    zoom: r(0.002, 0.008),
                    frequency_hz: r(0.1, 0.5),
                    components: r(1.0, 2.0),
                },
            ),
            hsv_shift: EffectConfig::new(
                0.4,
                HsvShiftRanges {
                    hue_shift: r(-2.0, 2.0),
                    hue_drift: r(0.0, 1.0),
                    saturation_scale: r(0.97, 1.03),
                    saturation_offset: r(-3.0, 3.0),
                    value_scale: r(0.98, 1.02),
                    value_offset: r(-3.0, 3.0),
                    drift_frequency_hz: r(0.05, 0.2),
                },
            ),
            lab_shift: EffectConfig::new(
                0.3,
                LabShiftRanges {
                    a_shift: r(-2.0, 2.0),
                    b_shift: r(-2.0, 2.0),
                    drift_amplitude: r(0.0, 1.0),
                    drift_frequency_hz: r(0.05, 0.2),
                },
            ),
            gamma: EffectConfig::new(0.4, GammaRanges { gamma: r(0.95, 1.05) }),
            edge_glow: EffectConfig::new(
                0.1,
                GlowRanges {
                    threshold: r(120.0, 160.0),
                    blur_kernel: r(9.0, 15.0),
                    alpha: r(0.05, 0.12),
                },
            ),
            difference_glow: EffectConfig::disabled(GlowRanges {
                threshold: r(200.0, 230.0),
                blur_kernel: r(15.0, 25.0),
                alpha: r(0.05, 0.1),
            }),
            chromatic_aberration: EffectConfig::new(
                0.2,
                ChromaticRanges {
                    red_shift_px: r(-1.0, 1.0),
                    blue_shift_px: r(-1.0, 1.0),
                },
            ),
            analog_grain: EffectConfig::new(
                0.3,
                NoiseRanges {
                    alpha: r(0.2, 0.4),
                    std_dev: r(4.0, 8.0),
                },
            ),
            white_noise: EffectConfig::new(
                0.2,
                NoiseRanges {
                    alpha: r(0.1, 0.25),
                    std_dev: r(3.0, 6.0),
                },
            ),
            sharpen: EffectConfig::new(
                0.3,
                SharpenRanges {
                    amount: r(0.1, 0.3),
                    kernel_size: r(3.0, 5.0),
                },
            ),
            speckles: EffectConfig::new(
                0.1,
                SpeckleRanges {
                    density: r(0.000_02, 0.000_05),
                    intensity: r(0.5, 0.8),
                },
            ),
        },
        audio: AudioProfile {
            apply: true,
            volume: EffectConfig::new(0.5, VolumeRanges { gain_db: r(-1.0, 1.0) }),
            pitch: EffectConfig::new(0.3, PitchRanges { semitones: r(-0.2, 0.2) }),
            tempo: EffectConfig::new(0.3, TempoRanges { rate: r(0.99, 1.01) }),
            equalizer: EffectConfig::new(
                0.3,
                EqualizerRanges {
                    bands: r(1.0, 2.0),
                    frequency_hz: r(200.0, 6000.0),
                    gain_db: r(-2.0, 2.0),
                    width_q: r(0.7, 1.5),
                },
            ),
        },
        metadata: MetadataProfile {
            apply: true,
            strip: true,
            decoy_probability: 0.3,
        },
        encoding: EncodingProfile {
            apply: true,
            crf: r(20.0, 23.0),
            presets: strings(&["medium", "slow"]),
            tunes: strings(&["none", "film"]),
        },
    }
}

fn medium() -> RandomizationProfile {
    let mut p = low();
    p.intensity = Intensity::Medium;

    let v = &mut p.visual;
    v.camera_shake = EffectConfig::new(
        0.6,
        ShakeRanges {
            translate_px: r(2.0, 5.0),
            rotation_deg: r(0.2, 0.8),
            zoom: r(0.005, 0.015),
            frequency_hz: r(0.1, 0.8),
            components: r(2.0, 3.0),
        },
    );
    v.hsv_shift.probability = 0.6;
    v.hsv_shift.params.hue_shift = r(-4.0, 4.0);
    v.hsv_shift.params.hue_drift = r(0.5, 2.0);
    v.hsv_shift.params.saturation_scale = r(0.94, 1.06);
    v.lab_shift.probability = 0.5;
    v.lab_shift.params.a_shift = r(-4.0, 4.0);
    v.lab_shift.params.b_shift = r(-4.0, 4.0);
    v.lab_shift.params.drift_amplitude = r(0.5, 2.0);
    v.gamma = EffectConfig::new(0.6, GammaRanges { gamma: r(0.9, 1.1) });
    v.edge_glow.probability = 0.3;
    v.edge_glow.params.alpha = r(0.08, 0.18);
    v.chromatic_aberration = EffectConfig::new(
        0.4,
        ChromaticRanges {
            red_shift_px: r(-2.0, 2.0),
            blue_shift_px: r(-2.0, 2.0),
        },
    );
    v.analog_grain = EffectConfig::new(
        0.6,
        NoiseRanges {
            alpha: r(0.3, 0.6),
            std_dev: r(6.0, 12.0),
        },
    );
    v.white_noise.probability = 0.3;
    v.sharpen = EffectConfig::new(
        0.6,
        SharpenRanges {
            amount: r(0.2, 0.5),
            kernel_size: r(3.0, 7.0),
        },
    );
    v.speckles.probability = 0.3;
    v.speckles.params.density = r(0.000_05, 0.000_15);

    let a = &mut p.audio;
    a.volume = EffectConfig::new(0.7, VolumeRanges { gain_db: r(-2.0, 2.0) });
    a.pitch = EffectConfig::new(0.5, PitchRanges { semitones: r(-0.4, 0.4) });
    a.tempo = EffectConfig::new(0.5, TempoRanges { rate: r(0.98, 1.02) });
    a.equalizer.probability = 0.5;
    a.equalizer.params.bands = r(1.0, 3.0);
    a.equalizer.params.gain_db = r(-3.0, 3.0);

    p.metadata.decoy_probability = 0.5;
    p.encoding.crf = r(19.0, 24.0);
    p.encoding.presets = strings(&["fast", "medium", "slow"]);
    p.encoding.tunes = strings(&["none", "film", "grain"]);
    p
}

fn high() -> RandomizationProfile {
    let mut p = medium();
    p.intensity = Intensity::High;

    let v = &mut p.visual;
    v.camera_shake = EffectConfig::new(
        1.0,
        ShakeRanges {
            translate_px: r(4.0, 8.0),
            rotation_deg: r(0.4, 1.2),
            zoom: r(0.01, 0.025),
            frequency_hz: r(0.15, 1.0),
            components: r(2.0, 4.0),
        },
    );
    v.hsv_shift.probability = 0.8;
    v.hsv_shift.params.hue_shift = r(-6.0, 6.0);
    v.hsv_shift.params.hue_drift = r(1.0, 3.0);
    v.hsv_shift.params.saturation_scale = r(0.9, 1.1);
    v.hsv_shift.params.value_offset = r(-5.0, 5.0);
    v.lab_shift.probability = 0.7;
    v.lab_shift.params.a_shift = r(-6.0, 6.0);
    v.lab_shift.params.b_shift = r(-6.0, 6.0);
    v.lab_shift.params.drift_amplitude = r(1.0, 3.0);
    v.gamma = EffectConfig::new(0.8, GammaRanges { gamma: r(0.85, 1.15) });
    v.edge_glow.probability = 0.5;
    v.edge_glow.params.alpha = r(0.1, 0.25);
    v.chromatic_aberration = EffectConfig::new(
        0.6,
        ChromaticRanges {
            red_shift_px: r(-3.0, 3.0),
            blue_shift_px: r(-3.0, 3.0),
        },
    );
    v.analog_grain = EffectConfig::new(
        1.0,
        NoiseRanges {
            alpha: r(0.5, 0.9),
            std_dev: r(8.0, 16.0),
        },
    );
    v.white_noise.probability = 0.5;
    v.white_noise.params.alpha = r(0.2, 0.4);
    v.sharpen = EffectConfig::new(
        1.0,
        SharpenRanges {
            amount: r(0.3, 0.8),
            kernel_size: r(3.0, 9.0),
        },
    );
    v.speckles.probability = 0.5;
    v.speckles.params.density = r(0.000_1, 0.000_3);

    let a = &mut p.audio;
    a.volume = EffectConfig::new(0.9, VolumeRanges { gain_db: r(-3.0, 3.0) });
    a.pitch = EffectConfig::new(0.7, PitchRanges { semitones: r(-0.6, 0.6) });
    a.tempo = EffectConfig::new(0.7, TempoRanges { rate: r(0.97, 1.03) });
    a.equalizer.probability = 0.7;
    a.equalizer.params.bands = r(2.0, 4.0);
    a.equalizer.params.gain_db = r(-4.0, 4.0);

    p.metadata.decoy_probability = 0.7;
    p.encoding.crf = r(18.0, 25.0);
    p.encoding.presets = strings(&["faster", "fast", "medium", "slow"]);
    p
}

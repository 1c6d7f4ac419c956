//! Offline audio DSP on planar `f32` channels in `[-1, 1]`.
//!
//! Time stretching uses WSOLA: Hann-windowed frames are overlap-added at a
//! fixed output hop, and each next frame is taken from the input position
//! (within a small tolerance around the nominal one) whose waveform best
//! continues the previous frame. Pitch shifting stretches by the pitch
//! ratio and then resamples back to the original length.

use std::f32::consts::PI;

/// Analysis frame length in seconds.
const FRAME_SECS: f64 = 0.04;

/// Below this the stretch is skipped.
const RATE_EPSILON: f64 = 1e-4;

/// Decimation of the similarity search, in samples.
const SEARCH_STEP: usize = 2;

/// Multiply by `10^(db/20)` and clip.
pub fn apply_gain(samples: &mut [f32], gain_db: f64) {
    if gain_db.abs() < 1e-9 || !gain_db.is_finite() {
        return;
    }
    let gain = 10f64.powf(gain_db / 20.0) as f32;
    for s in samples.iter_mut() {
        *s = (*s * gain).clamp(-1.0, 1.0);
    }
}

fn hann(len: usize) -> Vec<f32> {
    if len < 2 {
        return vec![1.0; len];
    }
    (0..len)
        .map(|i| 0.5 - 0.5 * (2.0 * PI * i as f32 / len as f32).cos())
        .collect()
}

#[inline]
fn sample_at(input: &[f32], index: isize) -> f32 {
    if index < 0 {
        0.0
    } else {
        input.get(index as usize).copied().unwrap_or(0.0)
    }
}

/// Cross-correlation of `input[a..a+len]` and `input[b..b+len]`, decimated.
fn similarity(input: &[f32], a: isize, b: isize, len: usize) -> f32 {
    (0..len)
        .step_by(SEARCH_STEP)
        .map(|i| sample_at(input, a + i as isize) * sample_at(input, b + i as isize))
        .sum()
}

/// Change duration by `1 / rate` while keeping pitch. `rate > 1` shortens.
pub fn time_stretch(input: &[f32], rate: f64, sample_rate: u32) -> Vec<f32> {
    if input.is_empty() || !rate.is_finite() || rate <= 0.0 || (rate - 1.0).abs() < RATE_EPSILON {
        return input.to_vec();
    }

    let frame_len = ((sample_rate as f64 * FRAME_SECS).round() as usize).max(16) & !1;
    let hop_out = frame_len / 2;
    let hop_in = hop_out as f64 * rate;
    let tolerance = (frame_len / 8) as isize;
    let window = hann(frame_len);

    let out_len = (input.len() as f64 / rate).round() as usize;
    let mut out = vec![0.0f32; out_len + frame_len];
    let mut norm = vec![0.0f32; out_len + frame_len];

    let mut prev: isize = 0;
    let mut k = 0usize;
    loop {
        let out_pos = k * hop_out;
        if out_pos >= out_len {
            break;
        }

        let pos = if k == 0 {
            0
        } else {
            let nominal = (k as f64 * hop_in).round() as isize;
            // Natural continuation of the previous frame in the input
            let target = prev + hop_out as isize;
            let mut best = nominal;
            let mut best_score = f32::NEG_INFINITY;
            let mut offset = -tolerance;
            while offset <= tolerance {
                let candidate = (nominal + offset).max(0);
                let score = similarity(input, candidate, target, hop_out);
                if score > best_score {
                    best_score = score;
                    best = candidate;
                }
                offset += SEARCH_STEP as isize;
            }
            best
        };

        for (i, w) in window.iter().enumerate() {
            out[out_pos + i] += sample_at(input, pos + i as isize) * w;
            norm[out_pos + i] += w;
        }

        prev = pos;
        k += 1;
    }

    out.truncate(out_len);
    for (s, n) in out.iter_mut().zip(norm.iter()) {
        if *n > 1e-3 {
            *s /= n;
        }
    }
    out
}

/// Linear-interpolation resample to exactly `target_len` samples.
pub fn resample_linear(input: &[f32], target_len: usize) -> Vec<f32> {
    if target_len == 0 || input.is_empty() {
        return vec![0.0; target_len];
    }
    if input.len() == target_len {
        return input.to_vec();
    }
    if input.len() == 1 || target_len == 1 {
        return vec![input[0]; target_len];
    }

    let ratio = (input.len() - 1) as f64 / (target_len - 1) as f64;
    (0..target_len)
        .map(|i| {
            let x = i as f64 * ratio;
            let left = x.floor() as usize;
            let right = (left + 1).min(input.len() - 1);
            let frac = (x - left as f64) as f32;
            input[left] * (1.0 - frac) + input[right] * frac
        })
        .collect()
}

/// Shift pitch by `semitones` without changing duration.
pub fn pitch_shift(input: &[f32], semitones: f64, sample_rate: u32) -> Vec<f32> {
    if input.is_empty() || !semitones.is_finite() || semitones.abs() < 1e-6 {
        return input.to_vec();
    }
    let factor = 2f64.powf(semitones / 12.0);
    let stretched = time_stretch(input, 1.0 / factor, sample_rate);
    resample_linear(&stretched, input.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    const RATE: u32 = 16_000;

    fn sine(freq: f32, secs: f32) -> Vec<f32> {
        let n = (RATE as f32 * secs) as usize;
        (0..n)
            .map(|i| 0.5 * (2.0 * PI * freq * i as f32 / RATE as f32).sin())
            .collect()
    }

    /// Dominant frequency estimate from zero crossings.
    fn zero_crossing_freq(samples: &[f32]) -> f32 {
        let trimmed = &samples[samples.len() / 10..samples.len() * 9 / 10];
        let crossings = trimmed
            .windows(2)
            .filter(|w| (w[0] < 0.0) != (w[1] < 0.0))
            .count();
        crossings as f32 / 2.0 / (trimmed.len() as f32 / RATE as f32)
    }

    #[test]
    fn test_gain_scales_and_clips() {
        let mut samples = vec![0.1, -0.1, 0.9];
        apply_gain(&mut samples, 6.0);
        assert!((samples[0] - 0.1995).abs() < 1e-3);
        assert!((samples[1] + 0.1995).abs() < 1e-3);
        assert_eq!(samples[2], 1.0);
    }

    #[test]
    fn test_zero_gain_is_identity() {
        let mut samples = vec![0.25, -0.5];
        apply_gain(&mut samples, 0.0);
        assert_eq!(samples, vec![0.25, -0.5]);
    }

    #[test]
    fn test_stretch_changes_length_not_pitch() {
        let input = sine(440.0, 1.0);
        let out = time_stretch(&input, 1.25, RATE);
        assert_eq!(out.len(), (input.len() as f64 / 1.25).round() as usize);
        let freq = zero_crossing_freq(&out);
        assert!((freq - 440.0).abs() < 15.0, "freq {}", freq);
    }

    #[test]
    fn test_unit_rate_is_identity() {
        let input = sine(300.0, 0.2);
        assert_eq!(time_stretch(&input, 1.0, RATE), input);
        assert_eq!(pitch_shift(&input, 0.0, RATE), input);
    }

    #[test]
    fn test_pitch_shift_keeps_length_and_raises_pitch() {
        let input = sine(400.0, 1.0);
        let out = pitch_shift(&input, 12.0, RATE);
        assert_eq!(out.len(), input.len());
        let freq = zero_crossing_freq(&out);
        assert!((freq - 800.0).abs() < 40.0, "freq {}", freq);
    }

    #[test]
    fn test_resample_endpoints() {
        let out = resample_linear(&[0.0, 1.0], 5);
        assert_eq!(out, vec![0.0, 0.25, 0.5, 0.75, 1.0]);
        assert!(resample_linear(&[], 3).iter().all(|s| *s == 0.0));
    }
}

//! Per-frame stochastic overlays: film grain, white noise and speckles.
//!
//! The statistical parameters are fixed per video; the noise itself is drawn
//! fresh on every call.

use ndarray::s;
use rand::Rng;
use serde::{Deserialize, Serialize};

use super::{clamp_u8, dims, finite, is_neutral, EffectResult};
use crate::frame::Frame;

/// Gaussian noise strength: `pixel + alpha · N(0, std_dev)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NoiseParams {
    pub alpha: f64,
    pub std_dev: f64,
}

impl NoiseParams {
    fn is_neutral(&self) -> bool {
        is_neutral(self.alpha) || is_neutral(self.std_dev)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpeckleParams {
    /// Fraction of pixels hit per frame
    pub density: f64,
    /// Gate only: zero disables the effect. Speckles are always pure white.
    pub intensity: f64,
}

/// Standard normal draw (Box-Muller).
fn standard_normal<R: Rng + ?Sized>(rng: &mut R) -> f32 {
    let u1: f64 = rng.random::<f64>().max(f64::MIN_POSITIVE);
    let u2: f64 = rng.random::<f64>();
    ((-2.0 * u1.ln()).sqrt() * (std::f64::consts::TAU * u2).cos()) as f32
}

fn check_noise(params: &NoiseParams) -> Result<(), super::EffectError> {
    finite(params.alpha, "noise.alpha")?;
    finite(params.std_dev, "noise.std_dev")?;
    Ok(())
}

/// Monochrome grain: one noise value per pixel, added to all three channels.
pub fn analog_grain<R: Rng + ?Sized>(frame: &Frame, params: &NoiseParams, rng: &mut R) -> EffectResult {
    let (h, w) = dims(frame)?;
    check_noise(params)?;
    if params.is_neutral() {
        return Ok(frame.clone());
    }

    let scale = (params.alpha * params.std_dev) as f32;
    let mut out = frame.clone();
    for y in 0..h {
        for x in 0..w {
            let n = standard_normal(rng) * scale;
            for c in 0..3 {
                out[[y, x, c]] = clamp_u8(frame[[y, x, c]] as f32 + n);
            }
        }
    }
    Ok(out)
}

/// Colored noise: an independent draw for every channel of every pixel.
pub fn white_noise<R: Rng + ?Sized>(frame: &Frame, params: &NoiseParams, rng: &mut R) -> EffectResult {
    dims(frame)?;
    check_noise(params)?;
    if params.is_neutral() {
        return Ok(frame.clone());
    }

    let scale = (params.alpha * params.std_dev) as f32;
    Ok(frame.mapv(|v| clamp_u8(v as f32 + standard_normal(rng) * scale)))
}

/// Scatter `density · width · height` pure-white pixels at random positions.
pub fn speckles<R: Rng + ?Sized>(frame: &Frame, params: &SpeckleParams, rng: &mut R) -> EffectResult {
    let (h, w) = dims(frame)?;
    let density = finite(params.density, "speckles.density")?.clamp(0.0, 1.0);
    let intensity = finite(params.intensity, "speckles.intensity")?.clamp(0.0, 1.0);
    let count = (density * (w * h) as f64).round() as usize;
    if count == 0 || is_neutral(intensity) {
        return Ok(frame.clone());
    }

    let mut out = frame.clone();
    for _ in 0..count {
        let y = rng.random_range(0..h);
        let x = rng.random_range(0..w);
        out.slice_mut(s![y, x, ..]).fill(255);
    }
    Ok(out)
}

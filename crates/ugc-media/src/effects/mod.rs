//! Per-frame visual effects.
//!
//! Every effect takes a BGR [`Frame`] plus already-chosen parameters and
//! returns a new frame of the same dimensions. Neutral parameters (zero
//! amount, zero alpha, unit gamma, zero shift) return an exact copy of the
//! input. Noise-style effects take the RNG explicitly so the per-frame
//! randomness stays separate from the per-video parameter draw.

pub mod color;
#[cfg(feature = "opencv")]
mod cv;
pub mod filter;
pub mod geometry;
pub mod glow;
pub mod grain;

use thiserror::Error;

use crate::frame::Frame;

pub use color::{gamma, hsv_shift, lab_shift, GammaLut, HsvShift, LabShift};
pub use filter::{gaussian_blur, normalize_kernel, sharpen, SharpenParams};
pub use geometry::{camera_shake, chromatic_aberration, ChromaticShift, ShakeSample};
pub use glow::{difference_glow, edge_glow, GlowParams};
pub use grain::{analog_grain, speckles, white_noise, NoiseParams, SpeckleParams};

/// Tolerance under which a parameter counts as neutral.
pub const NEUTRAL_EPSILON: f64 = 1e-6;

/// Errors raised by a single effect on a single frame.
#[derive(Debug, Error)]
pub enum EffectError {
    #[error("expected a (height, width, 3) frame, got {0:?}")]
    BadShape((usize, usize, usize)),

    #[error("non-finite parameter: {0}")]
    NonFinite(&'static str),

    #[cfg(feature = "opencv")]
    #[error("OpenCV: {0}")]
    OpenCv(#[from] opencv::Error),
}

pub type EffectResult = Result<Frame, EffectError>;

/// `(height, width)` of a valid BGR frame.
pub(crate) fn dims(frame: &Frame) -> Result<(usize, usize), EffectError> {
    let (h, w, c) = frame.dim();
    if c != 3 || h == 0 || w == 0 {
        return Err(EffectError::BadShape((h, w, c)));
    }
    Ok((h, w))
}

pub(crate) fn finite(value: f64, name: &'static str) -> Result<f64, EffectError> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(EffectError::NonFinite(name))
    }
}

pub(crate) fn is_neutral(value: f64) -> bool {
    value.abs() < NEUTRAL_EPSILON
}

#[inline]
pub(crate) fn clamp_u8(value: f32) -> u8 {
    value.round().clamp(0.0, 255.0) as u8
}

/// BT.601 luma of a BGR pixel.
#[inline]
pub(crate) fn luma(b: u8, g: u8, r: u8) -> f32 {
    0.114 * b as f32 + 0.587 * g as f32 + 0.299 * r as f32
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use ndarray::Array3;

    /// A deterministic textured frame with edges, gradients and saturated areas.
    pub fn textured_frame(width: usize, height: usize) -> Frame {
        Array3::from_shape_fn((height, width, 3), |(y, x, c)| {
            let base = match c {
                0 => (x * 7 + y * 3) % 256,
                1 => (x * 2 + y * 5 + 40) % 256,
                _ => (x * y + 90) % 256,
            };
            if (x / 8 + y / 8) % 2 == 0 {
                base as u8
            } else {
                255 - base as u8
            }
        })
    }
}

//! Halo glow around bright or high-gradient regions.
//!
//! The mask is blurred and the unblurred mask subtracted, leaving only the
//! outward halo. Blending the blurred mask directly would brighten the
//! bright core itself.

use ndarray::{Array2, Array3};
use serde::{Deserialize, Serialize};

use super::filter::{blur_plane, normalize_kernel, sobel_magnitude};
use super::{clamp_u8, dims, finite, is_neutral, luma, EffectResult};
use crate::frame::Frame;

/// Warm tint applied to the halo, BGR in `[0, 1]`.
const WARM_TINT: [f32; 3] = [0.55, 0.85, 1.0];

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GlowParams {
    /// Mask threshold on a 0..255 scale
    pub threshold: f64,
    pub blur_kernel: usize,
    pub alpha: f64,
}

fn luma_plane(frame: &Frame, h: usize, w: usize) -> Array2<f32> {
    Array2::from_shape_fn((h, w), |(y, x)| luma(frame[[y, x, 0]], frame[[y, x, 1]], frame[[y, x, 2]]))
}

/// Screen-blend the tinted halo of `metric > threshold` onto the frame.
fn apply_halo(frame: &Frame, metric: &Array2<f32>, params: &GlowParams, kernel: usize) -> EffectResult {
    let (h, w) = metric.dim();
    let threshold = params.threshold as f32;
    let mask = metric.mapv(|v| if v > threshold { 255.0f32 } else { 0.0 });
    let blurred = blur_plane(&mask, kernel)?;
    let alpha = params.alpha as f32;

    Ok(Array3::from_shape_fn((h, w, 3), |(y, x, c)| {
        let halo = (blurred[[y, x]] - mask[[y, x]]).max(0.0) / 255.0;
        let glow = 255.0 * WARM_TINT[c] * halo * alpha;
        let base = frame[[y, x, c]] as f32;
        clamp_u8(255.0 - (255.0 - base) * (255.0 - glow) / 255.0)
    }))
}

fn check(params: &GlowParams) -> Result<Option<usize>, super::EffectError> {
    finite(params.alpha, "glow.alpha")?;
    finite(params.threshold, "glow.threshold")?;
    if is_neutral(params.alpha) {
        return Ok(None);
    }
    Ok(normalize_kernel(params.blur_kernel))
}

/// Glow around strong edges (Sobel magnitude of luma above `threshold`).
pub fn edge_glow(frame: &Frame, params: &GlowParams) -> EffectResult {
    let (h, w) = dims(frame)?;
    let Some(kernel) = check(params)? else {
        return Ok(frame.clone());
    };
    let gradient = sobel_magnitude(&luma_plane(frame, h, w))?;
    apply_halo(frame, &gradient, params, kernel)
}

/// Glow around bright areas (luma above `threshold`).
pub fn difference_glow(frame: &Frame, params: &GlowParams) -> EffectResult {
    let (h, w) = dims(frame)?;
    let Some(kernel) = check(params)? else {
        return Ok(frame.clone());
    };
    apply_halo(frame, &luma_plane(frame, h, w), params, kernel)
}

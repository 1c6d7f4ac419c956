//! Affine warps: camera shake and chromatic aberration.
//!
//! Warps run through `imgproc::warp_affine` with the `opencv` feature and
//! through a bilinear ndarray sampler otherwise.

use ndarray::{Array2, Axis};
use serde::{Deserialize, Serialize};

use super::{dims, finite, is_neutral, EffectError, EffectResult};
use crate::frame::Frame;

#[cfg(not(feature = "opencv"))]
use super::clamp_u8;
#[cfg(not(feature = "opencv"))]
use crate::effects::filter::reflect101;

/// Instantaneous shake transform at one frame time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ShakeSample {
    pub dx: f64,
    pub dy: f64,
    pub angle_deg: f64,
    pub scale: f64,
}

impl ShakeSample {
    pub const IDENTITY: ShakeSample = ShakeSample {
        dx: 0.0,
        dy: 0.0,
        angle_deg: 0.0,
        scale: 1.0,
    };

    fn is_identity(&self) -> bool {
        is_neutral(self.dx) && is_neutral(self.dy) && is_neutral(self.angle_deg) && is_neutral(self.scale - 1.0)
    }
}

/// Per-channel pixel offsets for chromatic aberration.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ChromaticShift {
    pub red: (f64, f64),
    pub blue: (f64, f64),
}

impl ChromaticShift {
    fn is_identity(&self) -> bool {
        [self.red.0, self.red.1, self.blue.0, self.blue.1]
            .iter()
            .all(|v| is_neutral(*v))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Border {
    /// Mirror without repeating the edge pixel
    Reflect,
    /// Repeat the edge pixel
    Replicate,
}

#[cfg(not(feature = "opencv"))]
impl Border {
    #[inline]
    fn index(self, i: isize, n: usize) -> usize {
        match self {
            Border::Reflect => reflect101(i, n),
            Border::Replicate => i.clamp(0, n as isize - 1) as usize,
        }
    }
}

/// Row-major 2x3 affine matrix mapping source to destination coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Affine([f64; 6]);

impl Affine {
    /// Rotation by `angle_deg` (counter-clockwise) and uniform `scale` about `(cx, cy)`.
    pub(crate) fn rotation(cx: f64, cy: f64, angle_deg: f64, scale: f64) -> Self {
        let (sin, cos) = angle_deg.to_radians().sin_cos();
        let a = scale * cos;
        let b = scale * sin;
        Affine([a, b, (1.0 - a) * cx - b * cy, -b, a, b * cx + (1.0 - a) * cy])
    }

    pub(crate) fn translation(dx: f64, dy: f64) -> Self {
        Affine([1.0, 0.0, dx, 0.0, 1.0, dy])
    }

    pub(crate) fn translated(mut self, dx: f64, dy: f64) -> Self {
        self.0[2] += dx;
        self.0[5] += dy;
        self
    }

    pub(crate) fn invert(&self) -> Option<Self> {
        let [a, b, c, d, e, f] = self.0;
        let det = a * e - b * d;
        if det.abs() < 1e-12 || !det.is_finite() {
            return None;
        }
        let inv = 1.0 / det;
        let (ia, ib, id, ie) = (e * inv, -b * inv, -d * inv, a * inv);
        Some(Affine([ia, ib, -(ia * c + ib * f), id, ie, -(id * c + ie * f)]))
    }

    /// Row-major `[a, b, c, d, e, f]`.
    #[cfg_attr(not(feature = "opencv"), allow(dead_code))]
    pub(crate) fn coefficients(&self) -> [f64; 6] {
        self.0
    }

    #[cfg_attr(feature = "opencv", allow(dead_code))]
    #[inline]
    fn apply(&self, x: f64, y: f64) -> (f64, f64) {
        let [a, b, c, d, e, f] = self.0;
        (a * x + b * y + c, d * x + e * y + f)
    }
}

/// Bilinear sample of channel `c` at fractional `(x, y)`.
#[cfg(not(feature = "opencv"))]
#[inline]
fn sample(frame: &Frame, x: f64, y: f64, c: usize, border: Border) -> f32 {
    let (h, w, _) = frame.dim();
    let x0 = x.floor();
    let y0 = y.floor();
    let fx = (x - x0) as f32;
    let fy = (y - y0) as f32;
    let (x0, y0) = (x0 as isize, y0 as isize);

    let px = |yy: isize, xx: isize| frame[[border.index(yy, h), border.index(xx, w), c]] as f32;
    let top = px(y0, x0) * (1.0 - fx) + px(y0, x0 + 1) * fx;
    let bottom = px(y0 + 1, x0) * (1.0 - fx) + px(y0 + 1, x0 + 1) * fx;
    top * (1.0 - fy) + bottom * fy
}

#[cfg(not(feature = "opencv"))]
fn warp_bilinear(frame: &Frame, inverse: &Affine, border: Border, channels: &[usize]) -> Frame {
    let (h, w, _) = frame.dim();
    let mut out = frame.clone();
    for y in 0..h {
        for x in 0..w {
            let (sx, sy) = inverse.apply(x as f64, y as f64);
            for &c in channels {
                out[[y, x, c]] = clamp_u8(sample(frame, sx, sy, c, border));
            }
        }
    }
    out
}

/// Warp all channels with `forward` (source → destination).
pub(crate) fn warp_affine(frame: &Frame, forward: &Affine, border: Border) -> EffectResult {
    dims(frame)?;
    let singular = || EffectError::NonFinite("affine matrix is singular");
    #[cfg(feature = "opencv")]
    {
        forward.invert().ok_or_else(singular)?;
        super::cv::warp_affine(frame, forward, border)
    }
    #[cfg(not(feature = "opencv"))]
    {
        let inverse = forward.invert().ok_or_else(singular)?;
        Ok(warp_bilinear(frame, &inverse, border, &[0, 1, 2]))
    }
}

/// One channel translated by `(dx, dy)` with replicated edges.
fn shifted_channel(frame: &Frame, channel: usize, dx: f64, dy: f64) -> Result<Array2<u8>, EffectError> {
    let shift = Affine::translation(dx, dy);
    #[cfg(feature = "opencv")]
    {
        let plane = frame.index_axis(Axis(2), channel).to_owned();
        super::cv::warp_plane(&plane, &shift, Border::Replicate)
    }
    #[cfg(not(feature = "opencv"))]
    {
        let inverse = shift
            .invert()
            .ok_or(EffectError::NonFinite("chromatic offset"))?;
        let warped = warp_bilinear(frame, &inverse, Border::Replicate, &[channel]);
        Ok(warped.index_axis(Axis(2), channel).to_owned())
    }
}

/// Rotate/scale about the frame center, then translate. Edges are mirrored.
pub fn camera_shake(frame: &Frame, shake: &ShakeSample) -> EffectResult {
    let (h, w) = dims(frame)?;
    for (value, name) in [
        (shake.dx, "shake.dx"),
        (shake.dy, "shake.dy"),
        (shake.angle_deg, "shake.angle_deg"),
        (shake.scale, "shake.scale"),
    ] {
        finite(value, name)?;
    }
    if shake.is_identity() {
        return Ok(frame.clone());
    }
    if shake.scale <= 0.0 {
        return Err(EffectError::NonFinite("shake.scale must be positive"));
    }

    let cx = (w as f64 - 1.0) / 2.0;
    let cy = (h as f64 - 1.0) / 2.0;
    let forward = Affine::rotation(cx, cy, shake.angle_deg, shake.scale).translated(shake.dx, shake.dy);
    warp_affine(frame, &forward, Border::Reflect)
}

/// Translate the red and blue channels independently; green is untouched.
pub fn chromatic_aberration(frame: &Frame, shift: &ChromaticShift) -> EffectResult {
    dims(frame)?;
    for value in [shift.red.0, shift.red.1, shift.blue.0, shift.blue.1] {
        finite(value, "chromatic offset")?;
    }
    if shift.is_identity() {
        return Ok(frame.clone());
    }

    let mut out = frame.clone();
    // BGR: blue is channel 0, red is channel 2.
    for (channel, (dx, dy)) in [(0usize, shift.blue), (2usize, shift.red)] {
        if is_neutral(dx) && is_neutral(dy) {
            continue;
        }
        let shifted = shifted_channel(frame, channel, dx, dy)?;
        out.index_axis_mut(Axis(2), channel).assign(&shifted);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effects::test_support::textured_frame;

    #[test]
    fn test_identity_shake_is_exact_copy() {
        let frame = textured_frame(40, 30);
        assert_eq!(camera_shake(&frame, &ShakeSample::IDENTITY).unwrap(), frame);
    }

    #[test]
    fn test_shake_preserves_dimensions() {
        let frame = textured_frame(41, 29);
        let shake = ShakeSample {
            dx: 3.5,
            dy: -2.0,
            angle_deg: 1.2,
            scale: 1.03,
        };
        let out = camera_shake(&frame, &shake).unwrap();
        assert_eq!(out.dim(), frame.dim());
        assert_ne!(out, frame);
    }

    #[test]
    fn test_integer_translation_reflects_edges() {
        let frame = textured_frame(10, 6);
        let shake = ShakeSample {
            dx: 1.0,
            ..ShakeSample::IDENTITY
        };
        let out = camera_shake(&frame, &shake).unwrap();
        // Interior moves right by one pixel.
        assert_eq!(out[[2, 5, 1]], frame[[2, 4, 1]]);
        // Column 0 samples source column -1, mirrored to column 1; never black.
        assert_eq!(out[[2, 0, 1]], frame[[2, 1, 1]]);
    }

    #[test]
    fn test_affine_inverse_roundtrip() {
        let m = Affine::rotation(10.0, 20.0, 15.0, 1.1).translated(3.0, -4.0);
        let inv = m.invert().unwrap();
        let (x, y) = m.apply(7.0, 9.0);
        let (bx, by) = inv.apply(x, y);
        assert!((bx - 7.0).abs() < 1e-9 && (by - 9.0).abs() < 1e-9);
    }

    #[test]
    fn test_chromatic_zero_offsets_is_identity() {
        let frame = textured_frame(16, 16);
        let out = chromatic_aberration(&frame, &ChromaticShift::default()).unwrap();
        assert_eq!(out, frame);
    }

    #[test]
    fn test_chromatic_keeps_green() {
        let frame = textured_frame(16, 16);
        let shift = ChromaticShift {
            red: (2.0, 0.0),
            blue: (-1.0, 1.0),
        };
        let out = chromatic_aberration(&frame, &shift).unwrap();
        assert_eq!(
            out.index_axis(ndarray::Axis(2), 1),
            frame.index_axis(ndarray::Axis(2), 1)
        );
        assert_eq!(out[[5, 8, 2]], frame[[5, 6, 2]]);
        // Replicated edge
        assert_eq!(out[[5, 0, 2]], frame[[5, 0, 2]]);
    }

    #[test]
    fn test_non_finite_shake_rejected() {
        let frame = textured_frame(8, 8);
        let shake = ShakeSample {
            dx: f64::NAN,
            ..ShakeSample::IDENTITY
        };
        assert!(camera_shake(&frame, &shake).is_err());
    }
}

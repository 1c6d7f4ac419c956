//! Color-space shifts (HSV, CIELAB) and the gamma lookup table.
//!
//! Conversions use the 8-bit conventions of common vision libraries: hue in
//! `[0, 180)`, saturation and value in `[0, 255]`, `L·255/100` and `a`/`b`
//! offset by 128. With the `opencv` feature the whole-frame conversions and
//! the LUT run through `imgproc`/`core`; otherwise an ndarray port with the
//! same conventions is used.

use serde::{Deserialize, Serialize};

#[cfg(not(feature = "opencv"))]
use super::clamp_u8;
use super::{dims, finite, is_neutral, EffectResult};
use crate::frame::Frame;

/// HSV adjustment for one frame. Hue is in 8-bit units (half degrees).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HsvShift {
    pub hue_shift: f64,
    pub saturation_scale: f64,
    pub saturation_offset: f64,
    pub value_scale: f64,
    pub value_offset: f64,
}

impl HsvShift {
    pub const NEUTRAL: HsvShift = HsvShift {
        hue_shift: 0.0,
        saturation_scale: 1.0,
        saturation_offset: 0.0,
        value_scale: 1.0,
        value_offset: 0.0,
    };

    fn is_neutral(&self) -> bool {
        is_neutral(self.hue_shift.rem_euclid(180.0))
            && is_neutral(self.saturation_scale - 1.0)
            && is_neutral(self.saturation_offset)
            && is_neutral(self.value_scale - 1.0)
            && is_neutral(self.value_offset)
    }
}

/// Additive shift of the LAB chroma channels.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct LabShift {
    pub a: f64,
    pub b: f64,
}

#[cfg(not(feature = "opencv"))]
fn bgr_to_hsv(b: u8, g: u8, r: u8) -> (f32, f32, f32) {
    let (bf, gf, rf) = (b as f32, g as f32, r as f32);
    let v = bf.max(gf).max(rf);
    let min = bf.min(gf).min(rf);
    let diff = v - min;
    let s = if v > 0.0 { 255.0 * diff / v } else { 0.0 };
    let mut h = if diff <= 0.0 {
        0.0
    } else if v == rf {
        60.0 * (gf - bf) / diff
    } else if v == gf {
        120.0 + 60.0 * (bf - rf) / diff
    } else {
        240.0 + 60.0 * (rf - gf) / diff
    };
    if h < 0.0 {
        h += 360.0;
    }
    (h / 2.0, s, v)
}

#[cfg(not(feature = "opencv"))]
fn hsv_to_bgr(h: f32, s: f32, v: f32) -> (f32, f32, f32) {
    let s = s / 255.0;
    if s <= 0.0 {
        return (v, v, v);
    }
    let h = (h * 2.0).rem_euclid(360.0) / 60.0;
    let sector = h.floor();
    let f = h - sector;
    let p = v * (1.0 - s);
    let q = v * (1.0 - s * f);
    let t = v * (1.0 - s * (1.0 - f));
    let (r, g, b) = match sector as i32 {
        0 => (v, t, p),
        1 => (q, v, p),
        2 => (p, v, t),
        3 => (p, q, v),
        4 => (t, p, v),
        _ => (v, p, q),
    };
    (b, g, r)
}

/// 8-bit HSV planes of a BGR frame.
fn to_hsv(frame: &Frame) -> EffectResult {
    #[cfg(feature = "opencv")]
    {
        super::cv::bgr_to_hsv(frame)
    }
    #[cfg(not(feature = "opencv"))]
    {
        let mut out = frame.clone();
        for mut px in out.lanes_mut(ndarray::Axis(2)) {
            let (h, s, v) = bgr_to_hsv(px[0], px[1], px[2]);
            px[0] = (h.round() as i32).rem_euclid(180) as u8;
            px[1] = clamp_u8(s);
            px[2] = clamp_u8(v);
        }
        Ok(out)
    }
}

fn from_hsv(hsv: &Frame) -> EffectResult {
    #[cfg(feature = "opencv")]
    {
        super::cv::hsv_to_bgr(hsv)
    }
    #[cfg(not(feature = "opencv"))]
    {
        let mut out = hsv.clone();
        for mut px in out.lanes_mut(ndarray::Axis(2)) {
            let (b, g, r) = hsv_to_bgr(px[0] as f32, px[1] as f32, px[2] as f32);
            px[0] = clamp_u8(b);
            px[1] = clamp_u8(g);
            px[2] = clamp_u8(r);
        }
        Ok(out)
    }
}

/// Shift hue (wrapping mod 180) and scale/offset saturation and value.
pub fn hsv_shift(frame: &Frame, shift: &HsvShift) -> EffectResult {
    dims(frame)?;
    for (value, name) in [
        (shift.hue_shift, "hsv.hue_shift"),
        (shift.saturation_scale, "hsv.saturation_scale"),
        (shift.saturation_offset, "hsv.saturation_offset"),
        (shift.value_scale, "hsv.value_scale"),
        (shift.value_offset, "hsv.value_offset"),
    ] {
        finite(value, name)?;
    }
    if shift.is_neutral() {
        return Ok(frame.clone());
    }

    let hue = shift.hue_shift as f32;
    let (ss, so) = (shift.saturation_scale as f32, shift.saturation_offset as f32);
    let (vs, vo) = (shift.value_scale as f32, shift.value_offset as f32);

    let mut hsv = to_hsv(frame)?;
    for mut px in hsv.lanes_mut(ndarray::Axis(2)) {
        px[0] = ((px[0] as f32 + hue).round() as i32).rem_euclid(180) as u8;
        px[1] = (px[1] as f32 * ss + so).round().clamp(0.0, 255.0) as u8;
        px[2] = (px[2] as f32 * vs + vo).round().clamp(0.0, 255.0) as u8;
    }
    from_hsv(&hsv)
}

#[cfg(not(feature = "opencv"))]
const WHITE_X: f32 = 0.950456;
#[cfg(not(feature = "opencv"))]
const WHITE_Z: f32 = 1.088754;
#[cfg(not(feature = "opencv"))]
const LAB_EPS: f32 = 0.008856;

#[cfg(not(feature = "opencv"))]
fn srgb_to_linear_table() -> [f32; 256] {
    let mut table = [0.0f32; 256];
    for (i, slot) in table.iter_mut().enumerate() {
        let v = i as f32 / 255.0;
        *slot = if v <= 0.04045 {
            v / 12.92
        } else {
            ((v + 0.055) / 1.055).powf(2.4)
        };
    }
    table
}

#[cfg(not(feature = "opencv"))]
fn linear_to_srgb(v: f32) -> f32 {
    let v = v.clamp(0.0, 1.0);
    let s = if v <= 0.003_130_8 {
        12.92 * v
    } else {
        1.055 * v.powf(1.0 / 2.4) - 0.055
    };
    s * 255.0
}

#[inline]
#[cfg(not(feature = "opencv"))]
fn lab_f(t: f32) -> f32 {
    if t > LAB_EPS {
        t.cbrt()
    } else {
        7.787 * t + 16.0 / 116.0
    }
}

#[inline]
#[cfg(not(feature = "opencv"))]
fn lab_f_inv(f: f32) -> f32 {
    let cube = f * f * f;
    if cube > LAB_EPS {
        cube
    } else {
        (f - 16.0 / 116.0) / 7.787
    }
}

#[cfg(not(feature = "opencv"))]
/// 8-bit LAB from linear RGB.
fn linear_rgb_to_lab8(r: f32, g: f32, b: f32) -> (u8, u8, u8) {
    let x = (0.412_453 * r + 0.357_580 * g + 0.180_423 * b) / WHITE_X;
    let y = 0.212_671 * r + 0.715_160 * g + 0.072_169 * b;
    let z = (0.019_334 * r + 0.119_193 * g + 0.950_227 * b) / WHITE_Z;

    let (fx, fy, fz) = (lab_f(x), lab_f(y), lab_f(z));
    let l = if y > LAB_EPS { 116.0 * fy - 16.0 } else { 903.3 * y };
    (
        clamp_u8(l * 255.0 / 100.0),
        clamp_u8(500.0 * (fx - fy) + 128.0),
        clamp_u8(200.0 * (fy - fz) + 128.0),
    )
}

#[cfg(not(feature = "opencv"))]
/// BGR (0..255 floats) from 8-bit LAB.
fn lab8_to_bgr(l8: u8, a8: u8, b8: u8) -> (f32, f32, f32) {
    let l = l8 as f32 * 100.0 / 255.0;
    let a = a8 as f32 - 128.0;
    let bb = b8 as f32 - 128.0;

    let fy = (l + 16.0) / 116.0;
    let fx = fy + a / 500.0;
    let fz = fy - bb / 200.0;

    let y = if l > 903.3 * LAB_EPS { fy * fy * fy } else { l / 903.3 };
    let x = lab_f_inv(fx) * WHITE_X;
    let z = lab_f_inv(fz) * WHITE_Z;

    let r = 3.240_479 * x - 1.537_150 * y - 0.498_535 * z;
    let g = -0.969_256 * x + 1.875_991 * y + 0.041_556 * z;
    let b = 0.055_648 * x - 0.204_043 * y + 1.057_311 * z;
    (linear_to_srgb(b), linear_to_srgb(g), linear_to_srgb(r))
}

/// 8-bit LAB planes of a BGR frame.
fn to_lab(frame: &Frame) -> EffectResult {
    #[cfg(feature = "opencv")]
    {
        super::cv::bgr_to_lab(frame)
    }
    #[cfg(not(feature = "opencv"))]
    {
        let linear = srgb_to_linear_table();
        let mut out = frame.clone();
        for mut px in out.lanes_mut(ndarray::Axis(2)) {
            let (b, g, r) = (linear[px[0] as usize], linear[px[1] as usize], linear[px[2] as usize]);
            let (l8, a8, b8) = linear_rgb_to_lab8(r, g, b);
            px[0] = l8;
            px[1] = a8;
            px[2] = b8;
        }
        Ok(out)
    }
}

fn from_lab(lab: &Frame) -> EffectResult {
    #[cfg(feature = "opencv")]
    {
        super::cv::lab_to_bgr(lab)
    }
    #[cfg(not(feature = "opencv"))]
    {
        let mut out = lab.clone();
        for mut px in out.lanes_mut(ndarray::Axis(2)) {
            let (b, g, r) = lab8_to_bgr(px[0], px[1], px[2]);
            px[0] = clamp_u8(b);
            px[1] = clamp_u8(g);
            px[2] = clamp_u8(r);
        }
        Ok(out)
    }
}

/// Add integer offsets to the LAB `a`/`b` channels. Lightness is left as decoded.
pub fn lab_shift(frame: &Frame, shift: &LabShift) -> EffectResult {
    dims(frame)?;
    let da = finite(shift.a, "lab.a")?.round() as i16;
    let db = finite(shift.b, "lab.b")?.round() as i16;
    if da == 0 && db == 0 {
        return Ok(frame.clone());
    }

    let mut lab = to_lab(frame)?;
    for mut px in lab.lanes_mut(ndarray::Axis(2)) {
        px[1] = (px[1] as i16 + da).clamp(0, 255) as u8;
        px[2] = (px[2] as i16 + db).clamp(0, 255) as u8;
    }
    from_lab(&lab)
}

/// Precomputed `255·(i/255)^(1/gamma)` table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GammaLut {
    table: [u8; 256],
}

impl GammaLut {
    /// `None` when `gamma` is neutral or unusable, meaning "skip the LUT".
    pub fn new(gamma: f64) -> Option<Self> {
        if !gamma.is_finite() || gamma <= 0.0 || is_neutral(gamma - 1.0) {
            return None;
        }
        let inv = 1.0 / gamma;
        let mut table = [0u8; 256];
        for (i, slot) in table.iter_mut().enumerate() {
            *slot = (255.0 * (i as f64 / 255.0).powf(inv)).round().clamp(0.0, 255.0) as u8;
        }
        Some(Self { table })
    }

    pub fn apply(&self, frame: &Frame) -> EffectResult {
        dims(frame)?;
        #[cfg(feature = "opencv")]
        {
            super::cv::lut(frame, &self.table)
        }
        #[cfg(not(feature = "opencv"))]
        {
            Ok(frame.mapv(|v| self.table[v as usize]))
        }
    }
}

/// Gamma correction. `gamma ≈ 1` returns the frame unchanged.
pub fn gamma(frame: &Frame, gamma: f64) -> EffectResult {
    dims(frame)?;
    finite(gamma, "gamma")?;
    match GammaLut::new(gamma) {
        Some(lut) => lut.apply(frame),
        None => Ok(frame.clone()),
    }
}

//! Convolution helpers: Gaussian blur, Sobel gradient, unsharp mask.
//!
//! With the `opencv` feature the kernels run through `imgproc`; otherwise a
//! separable ndarray implementation with the same border rule and sigma is used.

use ndarray::{Array2, Array3};
use serde::{Deserialize, Serialize};

use super::{clamp_u8, dims, finite, is_neutral, EffectError, EffectResult};
use crate::frame::Frame;

/// Unsharp-mask parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SharpenParams {
    pub amount: f64,
    pub kernel_size: usize,
}

/// Force a kernel size to be odd and at least 3. `None` for zero.
pub fn normalize_kernel(size: usize) -> Option<usize> {
    if size == 0 {
        return None;
    }
    let odd = if size % 2 == 0 { size + 1 } else { size };
    Some(odd.max(3))
}

/// Mirror an out-of-range index back into `[0, n)` without repeating the edge.
#[cfg(not(feature = "opencv"))]
#[inline]
pub(crate) fn reflect101(i: isize, n: usize) -> usize {
    if n == 1 {
        return 0;
    }
    let n = n as isize;
    let period = 2 * (n - 1);
    let mut i = i.rem_euclid(period);
    if i >= n {
        i = period - i;
    }
    i as usize
}

/// Normalized 1-D Gaussian weights; sigma follows the usual `0.3·((k−1)/2 − 1) + 0.8` rule.
#[cfg(not(feature = "opencv"))]
fn gaussian_kernel(size: usize) -> Vec<f32> {
    let sigma = 0.3 * ((size as f64 - 1.0) * 0.5 - 1.0) + 0.8;
    let half = (size / 2) as f64;
    let weights: Vec<f64> = (0..size)
        .map(|i| {
            let x = i as f64 - half;
            (-(x * x) / (2.0 * sigma * sigma)).exp()
        })
        .collect();
    let sum: f64 = weights.iter().sum();
    weights.iter().map(|w| (w / sum) as f32).collect()
}

#[cfg(not(feature = "opencv"))]
fn separable_blur(plane: &Array2<f32>, size: usize) -> Array2<f32> {
    let (h, w) = plane.dim();
    let kernel = gaussian_kernel(size);
    let half = (size / 2) as isize;

    let mut tmp = Array2::<f32>::zeros((h, w));
    for y in 0..h {
        for x in 0..w {
            let mut acc = 0.0;
            for (k, weight) in kernel.iter().enumerate() {
                let sx = reflect101(x as isize + k as isize - half, w);
                acc += weight * plane[[y, sx]];
            }
            tmp[[y, x]] = acc;
        }
    }

    let mut out = Array2::<f32>::zeros((h, w));
    for y in 0..h {
        for x in 0..w {
            let mut acc = 0.0;
            for (k, weight) in kernel.iter().enumerate() {
                let sy = reflect101(y as isize + k as isize - half, h);
                acc += weight * tmp[[sy, x]];
            }
            out[[y, x]] = acc;
        }
    }
    out
}

/// Blur a single float plane with an odd `size` kernel.
pub(crate) fn blur_plane(plane: &Array2<f32>, size: usize) -> Result<Array2<f32>, EffectError> {
    #[cfg(feature = "opencv")]
    {
        super::cv::blur_plane(plane, size)
    }
    #[cfg(not(feature = "opencv"))]
    {
        Ok(separable_blur(plane, size))
    }
}

/// Gaussian blur. Invalid kernel sizes return the input unchanged.
pub fn gaussian_blur(frame: &Frame, kernel_size: usize) -> EffectResult {
    dims(frame)?;
    let Some(size) = normalize_kernel(kernel_size) else {
        return Ok(frame.clone());
    };
    #[cfg(feature = "opencv")]
    {
        super::cv::gaussian_blur(frame, size)
    }
    #[cfg(not(feature = "opencv"))]
    {
        let (h, w, _) = frame.dim();
        let planes: Vec<Array2<f32>> = (0..3)
            .map(|c| separable_blur(&frame.index_axis(ndarray::Axis(2), c).mapv(|v| v as f32), size))
            .collect();
        Ok(Array3::from_shape_fn((h, w, 3), |(y, x, c)| clamp_u8(planes[c][[y, x]])))
    }
}

/// Sobel gradient magnitude of a single plane.
pub(crate) fn sobel_magnitude(plane: &Array2<f32>) -> Result<Array2<f32>, EffectError> {
    #[cfg(feature = "opencv")]
    {
        super::cv::sobel_magnitude(plane)
    }
    #[cfg(not(feature = "opencv"))]
    {
        Ok(sobel_reflect(plane))
    }
}

#[cfg(not(feature = "opencv"))]
fn sobel_reflect(plane: &Array2<f32>) -> Array2<f32> {
    let (h, w) = plane.dim();
    let at = |y: isize, x: isize| plane[[reflect101(y, h), reflect101(x, w)]];
    Array2::from_shape_fn((h, w), |(y, x)| {
        let (y, x) = (y as isize, x as isize);
        let gx = (at(y - 1, x + 1) + 2.0 * at(y, x + 1) + at(y + 1, x + 1))
            - (at(y - 1, x - 1) + 2.0 * at(y, x - 1) + at(y + 1, x - 1));
        let gy = (at(y + 1, x - 1) + 2.0 * at(y + 1, x) + at(y + 1, x + 1))
            - (at(y - 1, x - 1) + 2.0 * at(y - 1, x) + at(y - 1, x + 1));
        (gx * gx + gy * gy).sqrt()
    })
}

/// Unsharp mask: `frame·(1 + amount) − blurred·amount`.
pub fn sharpen(frame: &Frame, params: &SharpenParams) -> EffectResult {
    let (h, w) = dims(frame)?;
    let amount = finite(params.amount, "sharpen.amount")?;
    let Some(size) = normalize_kernel(params.kernel_size) else {
        return Ok(frame.clone());
    };
    if is_neutral(amount) {
        return Ok(frame.clone());
    }

    let amount = amount as f32;
    let blurred = gaussian_blur(frame, size)?;
    Ok(Array3::from_shape_fn((h, w, 3), |(y, x, c)| {
        let original = frame[[y, x, c]] as f32;
        clamp_u8(original * (1.0 + amount) - blurred[[y, x, c]] as f32 * amount)
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effects::test_support::textured_frame;
    use crate::frame::solid_frame;

    #[test]
    fn test_normalize_kernel() {
        assert_eq!(normalize_kernel(0), None);
        assert_eq!(normalize_kernel(1), Some(3));
        assert_eq!(normalize_kernel(4), Some(5));
        assert_eq!(normalize_kernel(7), Some(7));
    }

    #[cfg(not(feature = "opencv"))]
    #[test]
    fn test_reflect101() {
        assert_eq!(reflect101(-1, 5), 1);
        assert_eq!(reflect101(-2, 5), 2);
        assert_eq!(reflect101(5, 5), 3);
        assert_eq!(reflect101(6, 5), 2);
        assert_eq!(reflect101(3, 1), 0);
    }

    #[cfg(not(feature = "opencv"))]
    #[test]
    fn test_kernel_is_normalized_and_symmetric() {
        let k = gaussian_kernel(7);
        let sum: f32 = k.iter().sum();
        assert!((sum - 1.0).abs() < 1e-5);
        assert!((k[0] - k[6]).abs() < 1e-6);
        assert!(k[3] > k[2]);
    }

    #[test]
    fn test_blur_keeps_flat_frame() {
        let frame = solid_frame(20, 12, [40, 120, 200]);
        assert_eq!(gaussian_blur(&frame, 5).unwrap(), frame);
    }

    #[test]
    fn test_sharpen_neutral_amount_is_identity() {
        let frame = textured_frame(32, 24);
        let params = SharpenParams {
            amount: 0.0,
            kernel_size: 5,
        };
        assert_eq!(sharpen(&frame, &params).unwrap(), frame);
    }

    #[test]
    fn test_sharpen_invalid_kernel_is_identity() {
        let frame = textured_frame(16, 16);
        let params = SharpenParams {
            amount: 1.0,
            kernel_size: 0,
        };
        assert_eq!(sharpen(&frame, &params).unwrap(), frame);
    }

    #[test]
    fn test_sharpen_increases_contrast_and_keeps_dims() {
        let frame = textured_frame(32, 24);
        let params = SharpenParams {
            amount: 1.5,
            kernel_size: 4,
        };
        let out = sharpen(&frame, &params).unwrap();
        assert_eq!(out.dim(), frame.dim());
        assert_ne!(out, frame);
    }

    #[test]
    fn test_sobel_flat_plane_is_zero() {
        let plane = Array2::from_elem((8, 8), 100.0f32);
        assert!(sobel_magnitude(&plane).unwrap().iter().all(|v| v.abs() < 1e-4));
    }

    #[test]
    fn test_sobel_responds_to_vertical_edge() {
        let plane = Array2::from_shape_fn((8, 8), |(_, x)| if x < 4 { 0.0f32 } else { 100.0 });
        let magnitude = sobel_magnitude(&plane).unwrap();
        assert!(magnitude[[4, 3]] > 100.0);
        assert!(magnitude[[4, 0]].abs() < 1e-4);
    }

    #[test]
    fn test_blur_plane_spreads_a_spike() {
        let mut plane = Array2::<f32>::zeros((9, 9));
        plane[[4, 4]] = 255.0;
        let blurred = blur_plane(&plane, 5).unwrap();
        assert!(blurred[[4, 4]] < 255.0);
        assert!(blurred[[4, 5]] > 0.0);
        let total: f32 = blurred.iter().sum();
        assert!((total - 255.0).abs() < 1.0);
    }
}

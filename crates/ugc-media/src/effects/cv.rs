//! OpenCV-backed kernels, used when the `opencv` feature is enabled.
//!
//! Frames cross the boundary as packed `CV_8UC3` mats (BGR, the native
//! OpenCV order) and float planes as `CV_32FC1`.

use ndarray::{Array2, Array3};
use opencv::{
    core::{self, Mat, Scalar, Size, CV_32F, CV_32FC1, CV_64FC1, CV_8UC1, CV_8UC3},
    imgproc,
    prelude::*,
};

use super::geometry::{Affine, Border};
use super::EffectError;
use crate::frame::Frame;

fn frame_to_mat(frame: &Frame) -> Result<Mat, EffectError> {
    let (h, w, c) = frame.dim();
    let packed = frame.as_standard_layout();
    let bytes = packed.as_slice().ok_or(EffectError::BadShape((h, w, c)))?;
    let mut mat = Mat::new_rows_cols_with_default(h as i32, w as i32, CV_8UC3, Scalar::all(0.0))?;
    mat.data_bytes_mut()?.copy_from_slice(bytes);
    Ok(mat)
}

fn mat_to_frame(mat: &Mat) -> Result<Frame, EffectError> {
    let (h, w) = (mat.rows() as usize, mat.cols() as usize);
    Array3::from_shape_vec((h, w, 3), mat.data_bytes()?.to_vec()).map_err(|_| EffectError::BadShape((h, w, 3)))
}

fn plane_to_mat(plane: &Array2<f32>) -> Result<Mat, EffectError> {
    let (h, w) = plane.dim();
    let packed = plane.as_standard_layout();
    let values = packed.as_slice().ok_or(EffectError::BadShape((h, w, 1)))?;
    let mut mat = Mat::new_rows_cols_with_default(h as i32, w as i32, CV_32FC1, Scalar::all(0.0))?;
    mat.data_typed_mut::<f32>()?.copy_from_slice(values);
    Ok(mat)
}

fn mat_to_plane(mat: &Mat) -> Result<Array2<f32>, EffectError> {
    let (h, w) = (mat.rows() as usize, mat.cols() as usize);
    Array2::from_shape_vec((h, w), mat.data_typed::<f32>()?.to_vec()).map_err(|_| EffectError::BadShape((h, w, 1)))
}

fn u8_plane_to_mat(plane: &Array2<u8>) -> Result<Mat, EffectError> {
    let (h, w) = plane.dim();
    let packed = plane.as_standard_layout();
    let bytes = packed.as_slice().ok_or(EffectError::BadShape((h, w, 1)))?;
    let mut mat = Mat::new_rows_cols_with_default(h as i32, w as i32, CV_8UC1, Scalar::all(0.0))?;
    mat.data_bytes_mut()?.copy_from_slice(bytes);
    Ok(mat)
}

/// Color conversion with an `imgproc::COLOR_*` code.
pub(crate) fn convert(frame: &Frame, code: i32) -> Result<Frame, EffectError> {
    let src = frame_to_mat(frame)?;
    let mut dst = Mat::default();
    imgproc::cvt_color_def(&src, &mut dst, code)?;
    mat_to_frame(&dst)
}

pub(crate) fn bgr_to_hsv(frame: &Frame) -> Result<Frame, EffectError> {
    convert(frame, imgproc::COLOR_BGR2HSV)
}

pub(crate) fn hsv_to_bgr(hsv: &Frame) -> Result<Frame, EffectError> {
    convert(hsv, imgproc::COLOR_HSV2BGR)
}

pub(crate) fn bgr_to_lab(frame: &Frame) -> Result<Frame, EffectError> {
    convert(frame, imgproc::COLOR_BGR2Lab)
}

pub(crate) fn lab_to_bgr(lab: &Frame) -> Result<Frame, EffectError> {
    convert(lab, imgproc::COLOR_Lab2BGR)
}

/// 256-entry lookup table applied to every channel.
pub(crate) fn lut(frame: &Frame, table: &[u8; 256]) -> Result<Frame, EffectError> {
    let src = frame_to_mat(frame)?;
    let mut table_mat = Mat::new_rows_cols_with_default(1, 256, CV_8UC1, Scalar::all(0.0))?;
    table_mat.data_bytes_mut()?.copy_from_slice(table);
    let mut dst = Mat::default();
    core::lut(&src, &table_mat, &mut dst)?;
    mat_to_frame(&dst)
}

/// Gaussian blur with an odd `size` kernel; sigma follows OpenCV's rule for `sigma = 0`.
pub(crate) fn gaussian_blur(frame: &Frame, size: usize) -> Result<Frame, EffectError> {
    let src = frame_to_mat(frame)?;
    let mut dst = Mat::default();
    imgproc::gaussian_blur_def(&src, &mut dst, Size::new(size as i32, size as i32), 0.0)?;
    mat_to_frame(&dst)
}

pub(crate) fn blur_plane(plane: &Array2<f32>, size: usize) -> Result<Array2<f32>, EffectError> {
    let src = plane_to_mat(plane)?;
    let mut dst = Mat::default();
    imgproc::gaussian_blur_def(&src, &mut dst, Size::new(size as i32, size as i32), 0.0)?;
    mat_to_plane(&dst)
}

/// 3x3 Sobel gradient magnitude.
pub(crate) fn sobel_magnitude(plane: &Array2<f32>) -> Result<Array2<f32>, EffectError> {
    let src = plane_to_mat(plane)?;
    let mut gx = Mat::default();
    let mut gy = Mat::default();
    imgproc::sobel_def(&src, &mut gx, CV_32F, 1, 0)?;
    imgproc::sobel_def(&src, &mut gy, CV_32F, 0, 1)?;
    let mut magnitude = Mat::default();
    core::magnitude(&gx, &gy, &mut magnitude)?;
    mat_to_plane(&magnitude)
}

fn affine_mat(forward: &Affine) -> Result<Mat, EffectError> {
    let mut m = Mat::new_rows_cols_with_default(2, 3, CV_64FC1, Scalar::all(0.0))?;
    m.data_typed_mut::<f64>()?.copy_from_slice(&forward.coefficients());
    Ok(m)
}

fn border_mode(border: Border) -> i32 {
    match border {
        Border::Reflect => core::BORDER_REFLECT_101,
        Border::Replicate => core::BORDER_REPLICATE,
    }
}

fn warp(src: &Mat, forward: &Affine, border: Border) -> Result<Mat, EffectError> {
    let m = affine_mat(forward)?;
    let mut dst = Mat::default();
    imgproc::warp_affine(
        src,
        &mut dst,
        &m,
        Size::new(src.cols(), src.rows()),
        imgproc::INTER_LINEAR,
        border_mode(border),
        Scalar::default(),
    )?;
    Ok(dst)
}

/// Bilinear warp of a whole frame; `forward` maps source to destination.
pub(crate) fn warp_affine(frame: &Frame, forward: &Affine, border: Border) -> Result<Frame, EffectError> {
    let dst = warp(&frame_to_mat(frame)?, forward, border)?;
    mat_to_frame(&dst)
}

/// Bilinear warp of one 8-bit channel.
pub(crate) fn warp_plane(plane: &Array2<u8>, forward: &Affine, border: Border) -> Result<Array2<u8>, EffectError> {
    let dst = warp(&u8_plane_to_mat(plane)?, forward, border)?;
    let (h, w) = (dst.rows() as usize, dst.cols() as usize);
    Array2::from_shape_vec((h, w), dst.data_bytes()?.to_vec()).map_err(|_| EffectError::BadShape((h, w, 1)))
}

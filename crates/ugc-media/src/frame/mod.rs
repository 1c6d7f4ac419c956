//! Raw frame representation and sequential FFmpeg frame I/O.

mod io;

use ndarray::Array3;

pub use io::{FrameReader, FrameWriter, INTERMEDIATE_CRF};

/// A decoded video frame: shape `(height, width, 3)`, BGR channel order.
pub type Frame = Array3<u8>;

/// Bytes in one packed BGR frame.
pub fn frame_len(width: u32, height: u32) -> usize {
    width as usize * height as usize * 3
}

/// `(width, height)` of a frame.
pub fn frame_size(frame: &Frame) -> (u32, u32) {
    let (h, w, _) = frame.dim();
    (w as u32, h as u32)
}

/// A frame filled with one BGR color.
pub fn solid_frame(width: u32, height: u32, bgr: [u8; 3]) -> Frame {
    Array3::from_shape_fn((height as usize, width as usize, 3), |(_, _, c)| bgr[c])
}

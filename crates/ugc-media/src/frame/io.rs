use std::collections::VecDeque;
use std::io::{BufRead, BufReader, ErrorKind, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::thread::JoinHandle;
use tracing::{debug, warn};

use super::{frame_len, Frame};
use crate::command::check_ffmpeg;
use crate::error::{MediaError, MediaResult};

/// Quality of the visual-stage intermediate; the finalizer re-encodes it once more.
pub const INTERMEDIATE_CRF: u8 = 10;

const STDERR_TAIL_LINES: usize = 10;

/// Sequential BGR frame decoder backed by `ffmpeg -f rawvideo`.
///
/// Frames are resampled to a constant `fps`, the same rate the
/// [`FrameWriter`] stamps on its output, so variable-rate sources keep
/// their duration. Blocking; run it on a blocking thread. The child is
/// killed on drop.
pub struct FrameReader {
    child: Child,
    stdout: BufReader<ChildStdout>,
    stderr: Option<JoinHandle<Vec<String>>>,
    width: u32,
    height: u32,
    frames_read: u64,
    finished: bool,
}

impl FrameReader {
    pub fn open(path: &Path, width: u32, height: u32, fps: f64) -> MediaResult<Self> {
        check_ffmpeg()?;
        if width == 0 || height == 0 {
            return Err(MediaError::InvalidDimensions {
                path: path.to_path_buf(),
                width,
                height,
            });
        }
        if !(fps.is_finite() && fps > 0.0) {
            return Err(MediaError::frame_io(format!("Invalid reader frame rate {}", fps)));
        }

        let mut child = Command::new("ffmpeg")
            .args(["-nostdin", "-v", "error", "-i"])
            .arg(path)
            .args(["-map", "0:v:0", "-r", &format!("{:.6}", fps)])
            .args(["-f", "rawvideo", "-pix_fmt", "bgr24", "-"])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| MediaError::frame_io(format!("Failed to spawn frame reader: {}", e)))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| MediaError::frame_io("Frame reader stdout not captured"))?;
        let stderr = child.stderr.take().map(collect_stderr);

        debug!(path = %path.display(), width, height, fps, "Opened frame reader");

        Ok(Self {
            child,
            stdout: BufReader::with_capacity(frame_len(width, height), stdout),
            stderr,
            width,
            height,
            frames_read: 0,
            finished: false,
        })
    }

    /// Next frame, or `None` at end of stream.
    pub fn read_frame(&mut self) -> MediaResult<Option<Frame>> {
        if self.finished {
            return Ok(None);
        }

        let mut buf = vec![0u8; frame_len(self.width, self.height)];
        let mut filled = 0;
        while filled < buf.len() {
            match self.stdout.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(MediaError::frame_io(format!("Frame read failed: {}", e))),
            }
        }

        if filled == 0 {
            self.finished = true;
            return Ok(None);
        }
        if filled < buf.len() {
            self.finished = true;
            warn!(
                frame_index = self.frames_read,
                bytes = filled,
                "Discarding truncated trailing frame"
            );
            return Ok(None);
        }

        let frame = Frame::from_shape_vec((self.height as usize, self.width as usize, 3), buf)
            .map_err(|e| MediaError::frame_io(format!("Bad frame shape: {}", e)))?;
        self.frames_read += 1;
        Ok(Some(frame))
    }

    pub fn frames_read(&self) -> u64 {
        self.frames_read
    }

    /// Wait for the decoder and surface a non-zero exit.
    pub fn finish(mut self) -> MediaResult<u64> {
        let status = self.child.wait()?;
        self.finished = true;
        let tail = self.stderr.take().and_then(|h| h.join().ok()).unwrap_or_default();
        if !status.success() {
            return Err(MediaError::ffmpeg_failed(
                "Frame decoder exited with non-zero status",
                (!tail.is_empty()).then(|| tail.join("\n")),
                status.code(),
            ));
        }
        Ok(self.frames_read)
    }
}

impl Drop for FrameReader {
    fn drop(&mut self) {
        if let Ok(None) = self.child.try_wait() {
            let _ = self.child.kill();
            let _ = self.child.wait();
        }
    }
}

/// Sequential BGR frame encoder backed by `ffmpeg -f rawvideo -i -`.
///
/// Writes a video-only intermediate. Blocking; the child is killed on drop
/// unless [`FrameWriter::finish`] completed.
pub struct FrameWriter {
    child: Child,
    stdin: Option<ChildStdin>,
    stderr: Option<JoinHandle<Vec<String>>>,
    path: PathBuf,
    width: u32,
    height: u32,
    frames_written: u64,
}

impl FrameWriter {
    pub fn open(path: &Path, width: u32, height: u32, fps: f64) -> MediaResult<Self> {
        check_ffmpeg()?;
        if width == 0 || height == 0 {
            return Err(MediaError::InvalidDimensions {
                path: path.to_path_buf(),
                width,
                height,
            });
        }

        let mut child = Command::new("ffmpeg")
            .args(["-y", "-v", "error", "-f", "rawvideo", "-pix_fmt", "bgr24"])
            .args(["-s", &format!("{}x{}", width, height)])
            .args(["-r", &format!("{:.6}", fps)])
            .args(["-i", "-", "-an", "-c:v", "libx264", "-preset", "veryfast"])
            .args(["-crf", &INTERMEDIATE_CRF.to_string(), "-pix_fmt", "yuv444p"])
            .arg(path)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| MediaError::frame_io(format!("Failed to spawn frame writer: {}", e)))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| MediaError::frame_io("Frame writer stdin not captured"))?;
        let stderr = child.stderr.take().map(collect_stderr);

        debug!(path = %path.display(), width, height, fps, "Opened frame writer");

        Ok(Self {
            child,
            stdin: Some(stdin),
            stderr,
            path: path.to_path_buf(),
            width,
            height,
            frames_written: 0,
        })
    }

    pub fn write_frame(&mut self, frame: &Frame) -> MediaResult<()> {
        let (h, w, c) = frame.dim();
        if w != self.width as usize || h != self.height as usize || c != 3 {
            return Err(MediaError::frame_io(format!(
                "Frame is {}x{}x{}, writer expects {}x{}x3",
                w, h, c, self.width, self.height
            )));
        }

        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| MediaError::frame_io("Frame writer already closed"))?;
        let packed = frame.as_standard_layout();
        let bytes = packed
            .as_slice()
            .ok_or_else(|| MediaError::frame_io("Frame is not contiguous"))?;
        stdin
            .write_all(bytes)
            .map_err(|e| MediaError::frame_io(format!("Frame write failed: {}", e)))?;
        self.frames_written += 1;
        Ok(())
    }

    pub fn frames_written(&self) -> u64 {
        self.frames_written
    }

    /// Close the pipe and wait for the encoder to flush.
    pub fn finish(mut self) -> MediaResult<u64> {
        drop(self.stdin.take());
        let status = self.child.wait()?;
        let tail = self.stderr.take().and_then(|h| h.join().ok()).unwrap_or_default();
        if !status.success() {
            return Err(MediaError::ffmpeg_failed(
                format!("Frame encoder failed for {}", self.path.display()),
                (!tail.is_empty()).then(|| tail.join("\n")),
                status.code(),
            ));
        }
        Ok(self.frames_written)
    }
}

impl Drop for FrameWriter {
    fn drop(&mut self) {
        drop(self.stdin.take());
        if let Ok(None) = self.child.try_wait() {
            let _ = self.child.kill();
            let _ = self.child.wait();
        }
    }
}

fn collect_stderr(stderr: std::process::ChildStderr) -> JoinHandle<Vec<String>> {
    std::thread::spawn(move || {
        let mut tail = VecDeque::with_capacity(STDERR_TAIL_LINES);
        for line in BufReader::new(stderr).lines().map_while(Result::ok) {
            if tail.len() == STDERR_TAIL_LINES {
                tail.pop_front();
            }
            tail.push_back(line);
        }
        tail.into_iter().collect()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::solid_frame;
    use crate::test_media::{synth_variable_rate_video, synth_video};

    #[test]
    #[ignore = "requires ffmpeg"]
    fn test_write_then_read_preserves_dimensions() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("frames.mp4");

        let mut writer = FrameWriter::open(&path, 64, 48, 25.0).unwrap();
        for i in 0..10u8 {
            writer.write_frame(&solid_frame(64, 48, [i * 10, 100, 200])).unwrap();
        }
        assert_eq!(writer.finish().unwrap(), 10);

        let mut reader = FrameReader::open(&path, 64, 48, 25.0).unwrap();
        let mut count = 0;
        while let Some(frame) = reader.read_frame().unwrap() {
            assert_eq!(frame.dim(), (48, 64, 3));
            count += 1;
        }
        assert_eq!(count, 10);
        assert_eq!(reader.finish().unwrap(), 10);
    }

    #[test]
    #[ignore = "requires ffmpeg"]
    fn test_writer_rejects_wrong_size() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = FrameWriter::open(&dir.path().join("x.mp4"), 32, 32, 30.0).unwrap();
        let err = writer.write_frame(&solid_frame(16, 16, [0, 0, 0])).unwrap_err();
        assert!(matches!(err, MediaError::FrameIo(_)));
    }

    #[test]
    #[ignore = "requires ffmpeg"]
    fn test_reader_resamples_to_requested_rate() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("twenty.mp4");
        assert!(synth_video(&path, 32, 32, 2.0, 20, false));

        let mut reader = FrameReader::open(&path, 32, 32, 10.0).unwrap();
        while reader.read_frame().unwrap().is_some() {}
        let frames = reader.finish().unwrap();
        assert!((19..=21).contains(&frames), "read {} frames", frames);
    }

    #[test]
    #[ignore = "requires ffmpeg"]
    fn test_variable_rate_source_keeps_its_duration() {
        // 1 s at 20 fps then 2 s at 5 fps: 30 frames over 3 s, nominal rate 20.
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vfr.mp4");
        assert!(synth_variable_rate_video(&path, 32, 32));

        let mut reader = FrameReader::open(&path, 32, 32, 10.0).unwrap();
        while reader.read_frame().unwrap().is_some() {}
        let seconds = reader.finish().unwrap() as f64 / 10.0;
        assert!((seconds - 3.0).abs() <= 0.25, "decoded {} s", seconds);
    }

    #[test]
    fn test_zero_dimensions_rejected() {
        let err = FrameReader::open(Path::new("in.mp4"), 0, 10, 30.0);
        assert!(err.is_err());
    }

    #[test]
    fn test_bad_reader_rate_rejected() {
        for fps in [0.0, -5.0, f64::NAN] {
            assert!(FrameReader::open(Path::new("in.mp4"), 10, 10, fps).is_err());
        }
    }
}

//! WAV reading and writing with planar `f32` channels.

use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use std::path::Path;

use crate::error::{MediaError, MediaResult};

/// Decoded PCM audio, one `Vec` per channel.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    pub sample_rate: u32,
    pub channels: Vec<Vec<f32>>,
}

impl AudioBuffer {
    pub fn channel_count(&self) -> u16 {
        self.channels.len() as u16
    }

    /// Samples per channel.
    pub fn len(&self) -> usize {
        self.channels.first().map(Vec::len).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.len() as f64 / self.sample_rate as f64
    }

    /// Average of all channels.
    pub fn mono(&self) -> Vec<f32> {
        let n = self.channels.len().max(1) as f32;
        (0..self.len())
            .map(|i| self.channels.iter().map(|c| c[i]).sum::<f32>() / n)
            .collect()
    }

    /// Apply `f` to every channel in place.
    pub fn map_channels<F>(&mut self, mut f: F)
    where
        F: FnMut(&[f32]) -> Vec<f32>,
    {
        for channel in self.channels.iter_mut() {
            *channel = f(channel);
        }
    }
}

/// Read any integer or float WAV into `[-1, 1]` floats.
pub fn read_wav(path: &Path) -> MediaResult<AudioBuffer> {
    let mut reader = WavReader::open(path)?;
    let spec = reader.spec();
    let channel_count = spec.channels.max(1) as usize;

    let interleaved: Vec<f32> = match spec.sample_format {
        SampleFormat::Float => reader.samples::<f32>().collect::<Result<_, _>>()?,
        SampleFormat::Int => {
            let scale = (1i64 << (spec.bits_per_sample.clamp(1, 32) - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale))
                .collect::<Result<_, _>>()?
        }
    };

    let mut channels = vec![Vec::with_capacity(interleaved.len() / channel_count); channel_count];
    for (i, sample) in interleaved.into_iter().enumerate() {
        channels[i % channel_count].push(sample);
    }
    // Drop a trailing partial frame so every channel has the same length.
    let len = channels.iter().map(Vec::len).min().unwrap_or(0);
    for channel in channels.iter_mut() {
        channel.truncate(len);
    }

    Ok(AudioBuffer {
        sample_rate: spec.sample_rate,
        channels,
    })
}

/// Write 16-bit PCM, clipping to `[-1, 1]`.
pub fn write_wav_pcm16(path: &Path, audio: &AudioBuffer) -> MediaResult<()> {
    if audio.channels.is_empty() {
        return Err(MediaError::internal("Cannot write WAV without channels"));
    }
    let spec = WavSpec {
        channels: audio.channel_count(),
        sample_rate: audio.sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };
    let mut writer = WavWriter::create(path, spec)?;
    for i in 0..audio.len() {
        for channel in &audio.channels {
            let s = channel.get(i).copied().unwrap_or(0.0).clamp(-1.0, 1.0);
            writer.write_sample((s * i16::MAX as f32).round() as i16)?;
        }
    }
    writer.finalize()?;
    Ok(())
}

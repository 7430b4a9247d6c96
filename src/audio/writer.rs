//! Audio output sinks.
//!
//! The scheduler hands over one interleaved stereo block at a time.

use crate::error::Result;
use hound::{SampleFormat, WavSpec, WavWriter};
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;
use tracing::info;

/// Destination for interleaved stereo blocks.
pub trait AudioWriter {
    /// Appends interleaved `L, R` samples and returns the number of frames
    /// written.
    fn write_frames(&mut self, interleaved: &[f32]) -> Result<u64>;

    /// Flushes and closes the output. Called once, after the last block.
    fn finalize(self) -> Result<()>
    where
        Self: Sized;
}

/// Converts a float sample (-1.0 to 1.0) to 16-bit PCM.
pub fn to_i16(sample: f32) -> i16 {
    (sample * 32767.0).clamp(-32768.0, 32767.0) as i16
}

/// 16-bit PCM stereo WAV file.
pub struct WavFileWriter {
    writer: WavWriter<BufWriter<File>>,
}

impl WavFileWriter {
    /// Creates (or truncates) a stereo 16-bit WAV file.
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be created.
    pub fn create<P: AsRef<Path>>(path: P, sample_rate: u32) -> Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            info!(
                "Output file {} already exists and will be erased.",
                path.display()
            );
        }

        let spec = WavSpec {
            channels: 2,
            sample_rate,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };
        let writer = WavWriter::create(path, spec)?;
        Ok(Self { writer })
    }
}

impl AudioWriter for WavFileWriter {
    fn write_frames(&mut self, interleaved: &[f32]) -> Result<u64> {
        for &sample in interleaved {
            self.writer.write_sample(to_i16(sample))?;
        }
        Ok((interleaved.len() / 2) as u64)
    }

    fn finalize(self) -> Result<()> {
        self.writer.finalize()?;
        Ok(())
    }
}

/// Keeps every sample in memory. Handy for tests and for callers that post
/// process the render themselves.
#[derive(Debug, Default, Clone)]
pub struct MemoryWriter {
    pub samples: Vec<f32>,
}

impl AudioWriter for MemoryWriter {
    fn write_frames(&mut self, interleaved: &[f32]) -> Result<u64> {
        self.samples.extend_from_slice(interleaved);
        Ok((interleaved.len() / 2) as u64)
    }

    fn finalize(self) -> Result<()> {
        Ok(())
    }
}

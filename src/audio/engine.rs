//! Synthesis engine interface and its SoundFont implementation.
//!
//! The scheduler only talks to [`SynthEngine`]. Events carry a frame offset
//! into the block that the next `render_block` call produces, so the engine
//! can place them sample-accurately.

use crate::config::Oversampling;
use crate::error::{RenderError, Result};
use rustysynth::{SoundFont, Synthesizer, SynthesizerSettings};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// Lowest internal sample rate the synthesizer accepts.
pub const MIN_ENGINE_SAMPLE_RATE: u32 = 16_000;

/// Highest internal sample rate the synthesizer accepts.
pub const MAX_ENGINE_SAMPLE_RATE: u32 = 192_000;

/// Internal block length of the synthesizer, the smallest it accepts.
///
/// Messages only take effect at the start of an internal block, so an event
/// sounds up to `ENGINE_BLOCK_SIZE - 1` internal frames after its offset.
pub const ENGINE_BLOCK_SIZE: usize = 8;

/// A block-based synthesizer.
///
/// Event calls are queued against the upcoming block; `delay` is the frame
/// offset in `[0, block length)` at which the event takes effect.
pub trait SynthEngine {
    /// Renders one block of stereo audio into the two planar buffers.
    fn render_block(&mut self, left: &mut [f32], right: &mut [f32]);

    fn note_on(&mut self, delay: usize, channel: u8, key: u8, velocity: u8);

    fn note_off(&mut self, delay: usize, channel: u8, key: u8, velocity: u8);

    fn control_change(&mut self, delay: usize, channel: u8, controller: u8, value: u8);

    /// `value` is the zero-centred 14-bit bend in `[-8192, 8191]`.
    fn pitch_wheel(&mut self, delay: usize, channel: u8, value: i32);
}

/// A channel message waiting for its frame offset.
#[derive(Debug, Clone, Copy)]
struct QueuedMessage {
    delay: usize,
    channel: i32,
    command: i32,
    data1: i32,
    data2: i32,
}

/// SoundFont synthesizer driven block by block.
///
/// Each block is rendered in segments split at the queued event offsets.
/// With oversampling the synthesizer runs at a multiple of the output rate
/// and the result is decimated back down.
///
/// Placement is exact up to [`onset_step`] output frames: the synthesizer
/// applies a message at its next internal block of [`ENGINE_BLOCK_SIZE`]
/// frames.
pub struct SoundFontEngine {
    synth: Synthesizer,
    factor: usize,
    queue: Vec<QueuedMessage>,
    scratch_left: Vec<f32>,
    scratch_right: Vec<f32>,
}

impl SoundFontEngine {
    /// Loads a SoundFont and prepares a synthesizer for offline rendering.
    ///
    /// # Arguments
    ///
    /// * `soundfont_path` - Path to the SoundFont file (.sf2)
    /// * `block_size` - Frames per output block
    /// * `sample_rate` - Output sample rate in Hz
    /// * `oversampling` - Internal oversampling factor
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - The oversampled rate is outside what the synthesizer supports
    /// - The SoundFont file cannot be read or is invalid
    /// - The synthesizer rejects its settings
    pub fn load<P: AsRef<Path>>(
        soundfont_path: P,
        block_size: usize,
        sample_rate: u32,
        oversampling: Oversampling,
    ) -> Result<Self> {
        let factor = oversampling.factor();
        let internal_rate = u64::from(sample_rate) * factor as u64;
        if !(u64::from(MIN_ENGINE_SAMPLE_RATE)..=u64::from(MAX_ENGINE_SAMPLE_RATE))
            .contains(&internal_rate)
        {
            return Err(RenderError::InvalidConfig(format!(
                "sample rate {} with oversampling {} gives {} Hz, outside {}..={} Hz",
                sample_rate,
                oversampling,
                internal_rate,
                MIN_ENGINE_SAMPLE_RATE,
                MAX_ENGINE_SAMPLE_RATE
            )));
        }

        let mut file = BufReader::new(File::open(soundfont_path.as_ref())?);
        let soundfont = Arc::new(
            SoundFont::new(&mut file).map_err(|e| RenderError::SoundFont(format!("{:?}", e)))?,
        );
        info!(
            "{} presets, {} instruments in the SoundFont.",
            soundfont.get_presets().len(),
            soundfont.get_instruments().len()
        );

        let settings = engine_settings(internal_rate as i32);
        let synth = Synthesizer::new(&soundfont, &settings)
            .map_err(|e| RenderError::Synthesizer(format!("{:?}", e)))?;

        Ok(Self {
            synth,
            factor,
            queue: Vec::with_capacity(64),
            scratch_left: vec![0.0; block_size * factor],
            scratch_right: vec![0.0; block_size * factor],
        })
    }

    fn enqueue(&mut self, delay: usize, channel: u8, command: i32, data1: i32, data2: i32) {
        self.queue.push(QueuedMessage {
            delay,
            channel: i32::from(channel),
            command,
            data1,
            data2,
        });
    }
}

impl SynthEngine for SoundFontEngine {
    fn render_block(&mut self, left: &mut [f32], right: &mut [f32]) {
        let frames = left.len().min(right.len());
        let internal = frames * self.factor;
        if self.scratch_left.len() < internal {
            self.scratch_left.resize(internal, 0.0);
            self.scratch_right.resize(internal, 0.0);
        }
        let scratch_left = &mut self.scratch_left[..internal];
        let scratch_right = &mut self.scratch_right[..internal];

        // Stable: events sharing an offset keep their arrival order
        self.queue.sort_by_key(|m| m.delay);

        let mut rendered = 0;
        for message in self.queue.drain(..) {
            let at = message.delay.min(frames.saturating_sub(1)) * self.factor;
            if at > rendered {
                self.synth.render(
                    &mut scratch_left[rendered..at],
                    &mut scratch_right[rendered..at],
                );
                rendered = at;
            }
            self.synth.process_midi_message(
                message.channel,
                message.command,
                message.data1,
                message.data2,
            );
        }
        if rendered < internal {
            self.synth.render(
                &mut scratch_left[rendered..],
                &mut scratch_right[rendered..],
            );
        }

        decimate(scratch_left, &mut left[..frames], self.factor);
        decimate(scratch_right, &mut right[..frames], self.factor);
    }

    fn note_on(&mut self, delay: usize, channel: u8, key: u8, velocity: u8) {
        self.enqueue(delay, channel, 0x90, i32::from(key), i32::from(velocity));
    }

    fn note_off(&mut self, delay: usize, channel: u8, key: u8, velocity: u8) {
        self.enqueue(delay, channel, 0x80, i32::from(key), i32::from(velocity));
    }

    fn control_change(&mut self, delay: usize, channel: u8, controller: u8, value: u8) {
        self.enqueue(delay, channel, 0xB0, i32::from(controller), i32::from(value));
    }

    fn pitch_wheel(&mut self, delay: usize, channel: u8, value: i32) {
        let raw = (value + 8192).clamp(0, 16383);
        self.enqueue(delay, channel, 0xE0, raw & 0x7F, raw >> 7);
    }
}

/// Synthesizer settings for offline rendering at `sample_rate`.
fn engine_settings(sample_rate: i32) -> SynthesizerSettings {
    let mut settings = SynthesizerSettings::new(sample_rate);
    settings.block_size = ENGINE_BLOCK_SIZE;
    settings
}

/// Granularity, in output frames, at which the synthesizer applies messages.
pub fn onset_step(oversampling: Oversampling) -> usize {
    ENGINE_BLOCK_SIZE.div_ceil(oversampling.factor())
}

/// Averages each group of `factor` samples of `src` into one sample of `dest`.
fn decimate(src: &[f32], dest: &mut [f32], factor: usize) {
    if factor <= 1 {
        let n = src.len().min(dest.len());
        dest[..n].copy_from_slice(&src[..n]);
        return;
    }
    let scale = 1.0 / factor as f32;
    for (out, group) in dest.iter_mut().zip(src.chunks_exact(factor)) {
        *out = group.iter().sum::<f32>() * scale;
    }
}

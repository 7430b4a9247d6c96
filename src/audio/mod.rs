//! Offline audio rendering.
//!
//! This module turns a MIDI timeline into audio. It covers:
//! - The synthesis engine interface and its SoundFont implementation
//! - The block scheduler that places events sample-accurately
//! - Planar to interleaved conversion and tail silence detection
//! - WAV output

pub mod engine;
pub mod export;
pub mod interleave;
pub mod scheduler;
pub mod tail;
pub mod writer;

pub use engine::{SoundFontEngine, SynthEngine};
pub use export::{render_midi_to_wav, render_timeline};
pub use scheduler::{BlockClock, RenderReport, RenderScheduler};
pub use tail::TailDetector;
pub use writer::{AudioWriter, MemoryWriter, WavFileWriter};

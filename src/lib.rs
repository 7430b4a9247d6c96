//! midirender - Offline MIDI to WAV rendering through a SoundFont.
//!
//! This library provides the block scheduler and the pieces around it:
//! MIDI timeline reading, the synthesis engine and WAV output.

pub mod audio;
pub mod config;
pub mod error;
pub mod midi;

// Re-export commonly used types
pub use audio::{render_midi_to_wav, RenderReport, RenderScheduler};
pub use config::{ControllerRouting, Oversampling, RenderConfig, TailMode, TrackSelection};
pub use error::RenderError;
pub use midi::{Event, EventKind, Timeline};

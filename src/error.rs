//! Error types shared by the rendering pipeline.
//!
//! Every fatal condition maps to one variant. Per-event anomalies are not
//! errors: the scheduler skips or clamps them and keeps going.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that stop a render before or while it runs.
#[derive(Debug, Error)]
pub enum RenderError {
    /// File could not be read or written.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A required input path was not given.
    #[error("Please specify {what} using {flag}")]
    MissingPath {
        what: &'static str,
        flag: &'static str,
    },

    /// An input path does not point at a regular file.
    #[error("{what} file {} does not exist or is not a regular file", .path.display())]
    NotAFile { what: &'static str, path: PathBuf },

    /// The MIDI file could not be parsed.
    #[error("MIDI parse error: {0}")]
    MidiParse(String),

    /// The requested track is not present in the MIDI file.
    #[error("The track number {requested} requested does not exist in the SMF file ({available} tracks)")]
    TrackOutOfRange { requested: usize, available: usize },

    /// Oversampling factor string was not one of x1, x2, x4, x8.
    #[error("Unknown oversampling factor {0}")]
    UnknownOversampling(String),

    /// Block size, sample rate or another numeric setting is unusable.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The SoundFont could not be loaded.
    #[error("There was an error loading the SoundFont: {0}")]
    SoundFont(String),

    /// The synthesizer rejected its settings.
    #[error("Failed to create synthesizer: {0}")]
    Synthesizer(String),

    /// Writing the WAV container failed.
    #[error("Error writing out the wav file: {0}")]
    Wav(#[from] hound::Error),
}

/// Convenience alias used across the crate.
pub type Result<T> = std::result::Result<T, RenderError>;

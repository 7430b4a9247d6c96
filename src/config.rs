//! Render configuration.
//!
//! Holds every knob the render pipeline reads. The binary fills it from the
//! command line; tests build it directly.

use crate::error::{RenderError, Result};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Default number of frames per synthesizer block.
pub const DEFAULT_BLOCK_SIZE: usize = 1024;

/// Default output sample rate in Hz.
pub const DEFAULT_SAMPLE_RATE: u32 = 48000;

/// Mean squared amplitude at or below which a block counts as silent.
///
/// A plain energy gate, tunable through [`RenderConfig::silence_threshold`].
pub const DEFAULT_SILENCE_THRESHOLD: f64 = 1e-12;

/// Which part of the MIDI file feeds the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TrackSelection {
    /// Join all tracks into one time-ordered stream.
    #[default]
    Merged,
    /// Use a single track, numbered from 1.
    Single(usize),
}

impl TrackSelection {
    /// Maps the CLI convention (`< 1` means merge) onto a selection.
    pub fn from_track_number(number: i64) -> Self {
        if number < 1 {
            TrackSelection::Merged
        } else {
            TrackSelection::Single(number as usize)
        }
    }
}

/// Internal oversampling factor of the synthesizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Oversampling {
    #[default]
    X1,
    X2,
    X4,
    X8,
}

impl Oversampling {
    /// Number of internal samples per output sample.
    pub fn factor(self) -> usize {
        match self {
            Oversampling::X1 => 1,
            Oversampling::X2 => 2,
            Oversampling::X4 => 4,
            Oversampling::X8 => 8,
        }
    }
}

impl FromStr for Oversampling {
    type Err = RenderError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "x1" => Ok(Oversampling::X1),
            "x2" => Ok(Oversampling::X2),
            "x4" => Ok(Oversampling::X4),
            "x8" => Ok(Oversampling::X8),
            other => Err(RenderError::UnknownOversampling(other.to_string())),
        }
    }
}

impl fmt::Display for Oversampling {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "x{}", self.factor())
    }
}

/// What happens once the last event has been delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TailMode {
    /// Keep rendering until the output decays below the silence threshold.
    #[default]
    Decay,
    /// Stop right after the block holding the last event.
    EndOfTrack,
}

/// How Control Change messages reach the engine.
///
/// The long-standing behaviour hands a CC to the engine's note-on entry
/// point with the controller number as key and the value as velocity. It is
/// kept as the default because existing renders depend on it; `Controller`
/// sends a real control-change message instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ControllerRouting {
    #[default]
    NoteOn,
    Controller,
}

/// Complete description of one offline render.
#[derive(Debug, Clone)]
pub struct RenderConfig {
    /// SoundFont (.sf2) used as the instrument.
    pub soundfont: Option<PathBuf>,
    /// Standard MIDI File to render.
    pub midi: Option<PathBuf>,
    /// Output WAV path.
    pub wav: Option<PathBuf>,
    /// Frames per synthesizer block.
    pub block_size: usize,
    /// Output sample rate in Hz.
    pub sample_rate: u32,
    pub track: TrackSelection,
    pub oversampling: Oversampling,
    pub tail_mode: TailMode,
    pub controller_routing: ControllerRouting,
    /// See [`DEFAULT_SILENCE_THRESHOLD`].
    pub silence_threshold: f64,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            soundfont: None,
            midi: None,
            wav: None,
            block_size: DEFAULT_BLOCK_SIZE,
            sample_rate: DEFAULT_SAMPLE_RATE,
            track: TrackSelection::Merged,
            oversampling: Oversampling::X1,
            tail_mode: TailMode::Decay,
            controller_routing: ControllerRouting::NoteOn,
            silence_threshold: DEFAULT_SILENCE_THRESHOLD,
        }
    }
}

impl RenderConfig {
    /// Checks the numeric settings. Path checks happen in the pipeline,
    /// where the filesystem is touched.
    pub fn validate(&self) -> Result<()> {
        if self.block_size == 0 {
            return Err(RenderError::InvalidConfig(
                "block size must be greater than zero".to_string(),
            ));
        }
        if self.sample_rate == 0 {
            return Err(RenderError::InvalidConfig(
                "sample rate must be greater than zero".to_string(),
            ));
        }
        if self.silence_threshold.is_nan() || self.silence_threshold < 0.0 {
            return Err(RenderError::InvalidConfig(format!(
                "silence threshold must be a non-negative number, got {}",
                self.silence_threshold
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_oversampling_parse() {
        assert_eq!("x1".parse::<Oversampling>().unwrap(), Oversampling::X1);
        assert_eq!("x8".parse::<Oversampling>().unwrap(), Oversampling::X8);
        assert_eq!(Oversampling::X4.factor(), 4);
        assert_eq!(Oversampling::X2.to_string(), "x2");

        let err = "x3".parse::<Oversampling>().unwrap_err();
        assert!(matches!(err, RenderError::UnknownOversampling(ref s) if s == "x3"));
    }

    #[test]
    fn test_track_number_convention() {
        assert_eq!(TrackSelection::from_track_number(-1), TrackSelection::Merged);
        assert_eq!(TrackSelection::from_track_number(0), TrackSelection::Merged);
        assert_eq!(TrackSelection::from_track_number(3), TrackSelection::Single(3));
    }

    #[test]
    fn test_validate() {
        assert!(RenderConfig::default().validate().is_ok());

        let config = RenderConfig {
            block_size: 0,
            ..RenderConfig::default()
        };
        assert!(config.validate().is_err());

        let config = RenderConfig {
            silence_threshold: f64::NAN,
            ..RenderConfig::default()
        };
        assert!(config.validate().is_err());
    }
}

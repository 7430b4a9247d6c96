//! Audio export functionality.
//!
//! Renders a MIDI file through a SoundFont into a WAV file. Everything that
//! can fail for configuration reasons is checked before the first block is
//! rendered.

use super::engine::{SoundFontEngine, SynthEngine};
use super::scheduler::{RenderReport, RenderScheduler};
use super::writer::{AudioWriter, WavFileWriter};
use crate::config::{RenderConfig, TrackSelection};
use crate::error::{RenderError, Result};
use crate::midi::Timeline;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Renders `config.midi` through `config.soundfont` into `config.wav`.
///
/// # Errors
///
/// Returns error if:
/// - A path is missing, or an input is not a regular file
/// - The numeric settings or the oversampling factor are unusable
/// - The SoundFont cannot be loaded
/// - The MIDI file cannot be parsed or lacks the requested track
/// - The output file cannot be created or written
pub fn render_midi_to_wav(config: &RenderConfig) -> Result<RenderReport> {
    config.validate()?;

    let soundfont_path = require(&config.soundfont, "a SoundFont file", "--soundfont")?;
    let wav_path = require(&config.wav, "an output file", "--wav")?;
    let midi_path = require(&config.midi, "a MIDI file", "--midi")?;
    ensure_regular_file(soundfont_path, "SoundFont")?;
    ensure_regular_file(midi_path, "MIDI")?;

    info!("SoundFont file: {}", soundfont_path.display());
    info!("MIDI file:      {}", midi_path.display());
    info!("Output file:    {}", wav_path.display());
    info!("Oversampling factor: {}", config.oversampling);
    info!("Block size: {}", config.block_size);
    info!("Sample rate: {}", config.sample_rate);

    let engine = SoundFontEngine::load(
        soundfont_path,
        config.block_size,
        config.sample_rate,
        config.oversampling,
    )?;

    let timeline = Timeline::load(midi_path, config.track)?;
    info!(
        "Last event at {:.3} seconds across {} source tracks",
        timeline.duration_seconds(),
        timeline.track_count()
    );
    if config.track == TrackSelection::Merged {
        info!("Rendering all tracks joined, {} events", timeline.len());
    }

    let writer = WavFileWriter::create(wav_path, config.sample_rate)?;
    let report = render_timeline(engine, writer, &timeline, config)?;

    info!(
        "Wrote {:.3} seconds of sound data in {} ({} frames)",
        report.seconds,
        wav_path.display(),
        report.frames_written
    );
    Ok(report)
}

/// Runs the scheduler over a timeline and finalizes the writer.
///
/// # Errors
///
/// Returns error if the numeric settings are unusable, or if writing or
/// finalizing the output fails.
pub fn render_timeline<E, W>(
    engine: E,
    writer: W,
    timeline: &Timeline,
    config: &RenderConfig,
) -> Result<RenderReport>
where
    E: SynthEngine,
    W: AudioWriter,
{
    let mut scheduler = RenderScheduler::new(engine, writer, config)?;
    if timeline.is_empty() {
        warn!("The timeline has no events, rendering silence");
    }
    let report = scheduler.run(timeline.events())?;
    let (_, writer) = scheduler.into_parts();
    writer.finalize()?;

    if report.events_skipped > 0 {
        info!("{} unhandled events were skipped", report.events_skipped);
    }
    Ok(report)
}

fn require<'a>(
    path: &'a Option<PathBuf>,
    what: &'static str,
    flag: &'static str,
) -> Result<&'a Path> {
    path.as_deref()
        .filter(|p| !p.as_os_str().is_empty())
        .ok_or(RenderError::MissingPath { what, flag })
}

fn ensure_regular_file(path: &Path, what: &'static str) -> Result<()> {
    if path.is_file() {
        Ok(())
    } else {
        Err(RenderError::NotAFile {
            what,
            path: path.to_path_buf(),
        })
    }
}

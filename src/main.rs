//! midirender - Render a MIDI file through a SoundFont into a WAV file.
//!
//! The render runs offline and block by block, then keeps going until the
//! release tail has died out.
//!
//! # Usage
//!
//! ```bash
//! midirender --soundfont piano.sf2 --midi song.mid --wav song.wav
//! midirender --soundfont gm.sf2 --midi song.mid --wav bass.wav --track 3 --use-eot
//! ```

use anyhow::{Context, Result};
use midirender::config::{
    ControllerRouting, Oversampling, RenderConfig, TailMode, TrackSelection,
};
use midirender::error::RenderError;
use midirender::render_midi_to_wav;
use std::path::PathBuf;
use std::str::FromStr;
use tracing_subscriber::EnvFilter;

/// Command-line options for the application.
#[derive(Debug)]
struct CliOptions {
    config: RenderConfig,
    /// Log configuration, progress and per-event anomalies.
    verbose: bool,
    /// Print usage and exit.
    help: bool,
}

impl CliOptions {
    /// Parses command-line arguments (program name excluded).
    ///
    /// Every flag taking a value accepts both `--flag value` and
    /// `--flag=value`.
    fn parse_from<I>(args: I) -> Result<Self, RenderError>
    where
        I: IntoIterator<Item = String>,
    {
        let mut args = args.into_iter();
        let mut config = RenderConfig::default();
        let mut verbose = false;
        let mut help = false;

        while let Some(arg) = args.next() {
            let (flag, inline) = match arg.split_once('=') {
                Some((flag, value)) if flag.starts_with("--") => {
                    (flag.to_string(), Some(value.to_string()))
                }
                _ => (arg.clone(), None),
            };
            let mut value = |name: &str| -> Result<String, RenderError> {
                inline.clone().or_else(|| args.next()).ok_or_else(|| {
                    RenderError::InvalidConfig(format!("{} requires a value", name))
                })
            };

            match flag.as_str() {
                "--soundfont" | "--sfz" | "-sf" => {
                    config.soundfont = Some(PathBuf::from(value(&flag)?));
                }
                "--midi" => config.midi = Some(PathBuf::from(value(&flag)?)),
                "--wav" => config.wav = Some(PathBuf::from(value(&flag)?)),
                "--blocksize" => config.block_size = parse_number(&flag, &value(&flag)?)?,
                "--samplerate" => config.sample_rate = parse_number(&flag, &value(&flag)?)?,
                "--track" => {
                    let number: i64 = parse_number(&flag, &value(&flag)?)?;
                    config.track = TrackSelection::from_track_number(number);
                }
                "--oversampling" => config.oversampling = value(&flag)?.parse::<Oversampling>()?,
                "--silence-threshold" => {
                    config.silence_threshold = parse_number(&flag, &value(&flag)?)?;
                }
                "--use-eot" => config.tail_mode = TailMode::EndOfTrack,
                "--forward-cc" => config.controller_routing = ControllerRouting::Controller,
                "--verbose" | "-v" => verbose = true,
                "--help" | "-h" => help = true,
                other => {
                    return Err(RenderError::InvalidConfig(format!(
                        "Unknown option: {}",
                        other
                    )))
                }
            }
        }

        Ok(Self {
            config,
            verbose,
            help,
        })
    }
}

fn parse_number<T: FromStr>(flag: &str, raw: &str) -> Result<T, RenderError> {
    raw.trim().parse().map_err(|_| {
        RenderError::InvalidConfig(format!("{} expects a number, got '{}'", flag, raw))
    })
}

fn print_help() {
    eprintln!("midirender - Render a MIDI file through a SoundFont into a WAV file");
    eprintln!();
    eprintln!("Usage: midirender --soundfont FILE --midi FILE --wav FILE [OPTIONS]");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --soundfont, --sfz FILE   Instrument SoundFont (.sf2)");
    eprintln!("  --midi FILE               MIDI file to render");
    eprintln!("  --wav FILE                Output WAV file (16-bit stereo)");
    eprintln!("  --blocksize N             Frames per synthesizer block (default 1024)");
    eprintln!("  --samplerate N            Output sample rate (default 48000)");
    eprintln!("  --track N                 Render only track N; < 1 merges all tracks");
    eprintln!("  --oversampling x1|x2|x4|x8  Internal oversampling factor (default x1)");
    eprintln!("  --use-eot                 Stop at the end of the track, without the tail");
    eprintln!("  --forward-cc              Send control changes as controller messages");
    eprintln!("  --silence-threshold P     Mean squared level that ends the tail (default 1e-12)");
    eprintln!("  -v, --verbose             Verbose output");
    eprintln!("  -h, --help                Print this help message");
}

/// Default log filter when `RUST_LOG` is not set.
fn default_log_filter(verbose: bool) -> &'static str {
    if verbose {
        "debug"
    } else {
        "warn"
    }
}

fn init_logging(verbose: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_log_filter(verbose)));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run(config: &RenderConfig) -> Result<()> {
    let report = render_midi_to_wav(config).context("Render failed")?;
    tracing::info!(
        "{} blocks, {} events dispatched, {} skipped, {} delays clamped",
        report.blocks_rendered,
        report.events_dispatched,
        report.events_skipped,
        report.delays_clamped
    );
    Ok(())
}

/// Main entry point.
fn main() {
    let cli = match CliOptions::parse_from(std::env::args().skip(1)) {
        Ok(cli) => cli,
        Err(e) => {
            eprintln!("Error: {}", e);
            eprintln!("Use --help for usage information");
            std::process::exit(-1);
        }
    };

    if cli.help {
        print_help();
        return;
    }

    init_logging(cli.verbose);

    if let Err(e) = run(&cli.config) {
        eprintln!("Error: {:#}", e);
        std::process::exit(-1);
    }
}

//! Standard MIDI File reading and time analysis.
//!
//! Turns a .mid file into the single, time-ordered event list the scheduler
//! walks. Supports SMF Format 0, 1 and 2 with either metrical or SMPTE
//! timecode division.
//!
//! Tick to seconds conversion happens exactly once, while the timeline is
//! built. Set Tempo events from every track feed the tempo map, even when
//! only one track is rendered.

use super::{Event, EventKind};
use crate::config::TrackSelection;
use crate::error::{RenderError, Result};
use midly::{MetaMessage, MidiMessage, Smf, Timing, TrackEventKind};
use std::fs;
use std::path::Path;
use tracing::info;

/// Tempo used until the first Set Tempo event (120 BPM).
pub const DEFAULT_USEC_PER_BEAT: u32 = 500_000;

/// One event of a track before time analysis.
#[derive(Debug, Clone)]
struct TickEvent {
    tick: u64,
    track: usize,
    kind: EventKind,
}

/// A stretch of the song played at a constant tempo.
#[derive(Debug, Clone, Copy)]
struct TempoSegment {
    tick: u64,
    seconds: f64,
    usec_per_beat: u32,
}

/// Maps absolute ticks onto seconds.
#[derive(Debug, Clone)]
enum TempoMap {
    Metrical {
        ticks_per_beat: f64,
        /// Sorted by tick; the first segment always starts at tick 0.
        segments: Vec<TempoSegment>,
    },
    Timecode {
        ticks_per_second: f64,
    },
}

impl TempoMap {
    fn metrical(ticks_per_beat: u16, mut changes: Vec<(u64, u32)>) -> Self {
        let ticks_per_beat = f64::from(ticks_per_beat.max(1));
        changes.sort_by_key(|(tick, _)| *tick);

        let mut segments = vec![TempoSegment {
            tick: 0,
            seconds: 0.0,
            usec_per_beat: DEFAULT_USEC_PER_BEAT,
        }];
        for (tick, usec_per_beat) in changes {
            let Some(last) = segments.last_mut() else {
                continue;
            };
            if tick == last.tick {
                // Later change at the same tick wins
                last.usec_per_beat = usec_per_beat;
                continue;
            }
            let seconds = last.seconds
                + (tick - last.tick) as f64 * f64::from(last.usec_per_beat)
                    / 1_000_000.0
                    / ticks_per_beat;
            segments.push(TempoSegment {
                tick,
                seconds,
                usec_per_beat,
            });
        }

        TempoMap::Metrical {
            ticks_per_beat,
            segments,
        }
    }

    fn seconds_at(&self, tick: u64) -> f64 {
        match self {
            TempoMap::Metrical {
                ticks_per_beat,
                segments,
            } => {
                let idx = segments.partition_point(|s| s.tick <= tick).saturating_sub(1);
                let segment = segments[idx];
                segment.seconds
                    + (tick - segment.tick) as f64 * f64::from(segment.usec_per_beat)
                        / 1_000_000.0
                        / ticks_per_beat
            }
            TempoMap::Timecode { ticks_per_second } => tick as f64 / ticks_per_second,
        }
    }
}

/// The event sequence handed to the scheduler.
#[derive(Debug, Clone)]
pub struct Timeline {
    events: Vec<Event>,
    track_count: usize,
}

impl Timeline {
    /// Reads and analyses a MIDI file from disk.
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read or parsed, or if the
    /// selected track does not exist.
    pub fn load<P: AsRef<Path>>(path: P, selection: TrackSelection) -> Result<Self> {
        let data = fs::read(path.as_ref())?;
        Self::from_bytes(&data, selection)
    }

    /// Parses SMF bytes, selects or joins tracks and converts every
    /// timestamp to seconds.
    pub fn from_bytes(data: &[u8], selection: TrackSelection) -> Result<Self> {
        let smf = Smf::parse(data).map_err(|e| RenderError::MidiParse(e.to_string()))?;
        let track_count = smf.tracks.len();
        info!("{} tracks in the SMF.", track_count);

        let tracks: Vec<Vec<TickEvent>> = smf
            .tracks
            .iter()
            .enumerate()
            .map(|(idx, track)| absolute_track(idx, track))
            .collect();

        let tempo_map = match smf.header.timing {
            Timing::Metrical(tpb) => TempoMap::metrical(tpb.as_int(), tempo_changes(&smf)),
            Timing::Timecode(fps, subframes) => TempoMap::Timecode {
                ticks_per_second: (f64::from(fps.as_f32()) * f64::from(subframes)).max(1.0),
            },
        };

        let selected = match selection {
            TrackSelection::Merged => join_tracks(tracks),
            TrackSelection::Single(number) => {
                if number == 0 || number > track_count {
                    return Err(RenderError::TrackOutOfRange {
                        requested: number,
                        available: track_count,
                    });
                }
                info!("-- Rendering only track number {}", number);
                tracks.into_iter().nth(number - 1).unwrap_or_default()
            }
        };

        let events = selected
            .into_iter()
            .map(|e| Event {
                seconds: tempo_map.seconds_at(e.tick),
                tick: e.tick,
                track: e.track,
                kind: e.kind,
            })
            .collect();

        Ok(Self {
            events,
            track_count,
        })
    }

    /// Builds a timeline from events that already carry seconds.
    ///
    /// Events are put in time order with a stable sort.
    pub fn from_events(mut events: Vec<Event>) -> Self {
        events.sort_by(|a, b| a.seconds.total_cmp(&b.seconds));
        Self {
            events,
            track_count: 1,
        }
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    /// Number of tracks in the source file, whatever the selection was.
    pub fn track_count(&self) -> usize {
        self.track_count
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Time of the last event, or zero for an empty timeline.
    pub fn duration_seconds(&self) -> f64 {
        self.events.last().map_or(0.0, |e| e.seconds)
    }
}

/// Converts delta times into absolute ticks and events into [`EventKind`].
fn absolute_track(track_idx: usize, track: &[midly::TrackEvent]) -> Vec<TickEvent> {
    let mut tick: u64 = 0;
    track
        .iter()
        .map(|event| {
            tick += u64::from(event.delta.as_int());
            TickEvent {
                tick,
                track: track_idx,
                kind: convert_kind(&event.kind),
            }
        })
        .collect()
}

/// Merges all tracks into one stream. The sort is stable, so events sharing
/// a tick keep their track order.
fn join_tracks(tracks: Vec<Vec<TickEvent>>) -> Vec<TickEvent> {
    let mut joined: Vec<TickEvent> = tracks.into_iter().flatten().collect();
    joined.sort_by_key(|e| e.tick);
    joined
}

/// Collects (absolute tick, µs per beat) for every Set Tempo event.
fn tempo_changes(smf: &Smf) -> Vec<(u64, u32)> {
    let mut changes = Vec::new();
    for track in &smf.tracks {
        let mut tick: u64 = 0;
        for event in track {
            tick += u64::from(event.delta.as_int());
            if let TrackEventKind::Meta(MetaMessage::Tempo(usec)) = event.kind {
                if usec.as_int() > 0 {
                    changes.push((tick, usec.as_int()));
                }
            }
        }
    }
    changes
}

fn convert_kind(kind: &TrackEventKind) -> EventKind {
    match *kind {
        TrackEventKind::Midi { channel, message } => {
            let channel = channel.as_int();
            match message {
                MidiMessage::NoteOn { key, vel } => EventKind::NoteOn {
                    channel,
                    key: key.as_int(),
                    velocity: vel.as_int(),
                },
                MidiMessage::NoteOff { key, vel } => EventKind::NoteOff {
                    channel,
                    key: key.as_int(),
                    velocity: vel.as_int(),
                },
                MidiMessage::Controller { controller, value } => EventKind::ControlChange {
                    channel,
                    controller: controller.as_int(),
                    value: value.as_int(),
                },
                MidiMessage::PitchBend { bend } => {
                    let raw = bend.0.as_int();
                    EventKind::PitchBend {
                        channel,
                        lsb: (raw & 0x7F) as u8,
                        msb: (raw >> 7) as u8,
                    }
                }
                MidiMessage::Aftertouch { key, vel } => {
                    EventKind::Other(vec![0xA0 | channel, key.as_int(), vel.as_int()])
                }
                MidiMessage::ProgramChange { program } => {
                    EventKind::Other(vec![0xC0 | channel, program.as_int()])
                }
                MidiMessage::ChannelAftertouch { vel } => {
                    EventKind::Other(vec![0xD0 | channel, vel.as_int()])
                }
            }
        }
        TrackEventKind::SysEx(data) => {
            let mut bytes = Vec::with_capacity(data.len() + 1);
            bytes.push(0xF0);
            bytes.extend_from_slice(data);
            EventKind::Other(bytes)
        }
        TrackEventKind::Escape(data) => {
            let mut bytes = Vec::with_capacity(data.len() + 1);
            bytes.push(0xF7);
            bytes.extend_from_slice(data);
            EventKind::Other(bytes)
        }
        TrackEventKind::Meta(meta) => EventKind::Other(meta_bytes(&meta)),
    }
}

/// Meta events as `FF <type> <payload>`, without the length prefix.
fn meta_bytes(meta: &MetaMessage) -> Vec<u8> {
    let (meta_type, payload): (u8, Vec<u8>) = match *meta {
        MetaMessage::TrackNumber(number) => {
            (0x00, number.map(|n| n.to_be_bytes().to_vec()).unwrap_or_default())
        }
        MetaMessage::Text(text) => (0x01, text.to_vec()),
        MetaMessage::Copyright(text) => (0x02, text.to_vec()),
        MetaMessage::TrackName(text) => (0x03, text.to_vec()),
        MetaMessage::InstrumentName(text) => (0x04, text.to_vec()),
        MetaMessage::Lyric(text) => (0x05, text.to_vec()),
        MetaMessage::Marker(text) => (0x06, text.to_vec()),
        MetaMessage::CuePoint(text) => (0x07, text.to_vec()),
        MetaMessage::ProgramName(text) => (0x08, text.to_vec()),
        MetaMessage::DeviceName(text) => (0x09, text.to_vec()),
        MetaMessage::MidiChannel(channel) => (0x20, vec![channel.as_int()]),
        MetaMessage::MidiPort(port) => (0x21, vec![port.as_int()]),
        MetaMessage::EndOfTrack => (0x2F, Vec::new()),
        MetaMessage::Tempo(usec) => (0x51, usec.as_int().to_be_bytes()[1..].to_vec()),
        MetaMessage::SmpteOffset(_) => (0x54, Vec::new()),
        MetaMessage::TimeSignature(num, denom, clocks, notes) => {
            (0x58, vec![num, denom, clocks, notes])
        }
        MetaMessage::KeySignature(sharps, minor) => (0x59, vec![sharps as u8, minor as u8]),
        MetaMessage::SequencerSpecific(data) => (0x7F, data.to_vec()),
        MetaMessage::Unknown(meta_type, data) => (meta_type, data.to_vec()),
    };
    let mut bytes = Vec::with_capacity(payload.len() + 2);
    bytes.push(0xFF);
    bytes.push(meta_type);
    bytes.extend(payload);
    bytes
}

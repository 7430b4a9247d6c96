//! Timestamped MIDI events as seen by the render scheduler.

/// A single event of the performance, already placed in time.
///
/// Immutable once the timeline is built.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    /// Absolute time of the event in seconds.
    pub seconds: f64,
    /// Absolute position in MIDI ticks, kept for diagnostics.
    pub tick: u64,
    /// Index (0-based) of the track the event came from.
    pub track: usize,
    pub kind: EventKind,
}

/// What an event asks the synthesizer to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    /// Note-on. A velocity of zero means note-off (running status convention).
    NoteOn { channel: u8, key: u8, velocity: u8 },
    NoteOff { channel: u8, key: u8, velocity: u8 },
    ControlChange {
        channel: u8,
        controller: u8,
        value: u8,
    },
    /// Pitch wheel with its two raw 7-bit data bytes, LSB first.
    PitchBend { channel: u8, lsb: u8, msb: u8 },
    /// Anything the scheduler does not forward: program changes, aftertouch,
    /// meta events, SysEx. Holds the status byte followed by the data bytes.
    Other(Vec<u8>),
}

impl EventKind {
    /// First byte of the wire representation.
    pub fn status(&self) -> u8 {
        match self {
            EventKind::NoteOff { channel, .. } => 0x80 | channel,
            EventKind::NoteOn { channel, .. } => 0x90 | channel,
            EventKind::ControlChange { channel, .. } => 0xB0 | channel,
            EventKind::PitchBend { channel, .. } => 0xE0 | channel,
            EventKind::Other(bytes) => bytes.first().copied().unwrap_or(0),
        }
    }
}

/// Rebuilds a signed, zero-centred 14-bit pitch wheel value from its two
/// 7-bit data bytes.
///
/// # Examples
///
/// ```
/// use midirender::midi::build_and_center_pitch;
///
/// assert_eq!(build_and_center_pitch(0, 64), 0);
/// assert_eq!(build_and_center_pitch(127, 127), 8191);
/// assert_eq!(build_and_center_pitch(0, 0), -8192);
/// ```
pub fn build_and_center_pitch(first_byte: u8, second_byte: u8) -> i32 {
    (((second_byte as u32) << 7) + first_byte as u32) as i32 - 8192
}

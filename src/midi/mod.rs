//! MIDI side of the renderer: events and the timeline built from a file.
//!
//! The timeline is read once, converted to seconds, and then only walked
//! forward by the scheduler.

mod event;
mod timeline;

pub use event::{build_and_center_pitch, Event, EventKind};
pub use timeline::{Timeline, DEFAULT_USEC_PER_BEAT};

/// Standard MIDI note names for display purposes.
/// Maps MIDI note number (0-127) to note name within an octave.
pub const NOTE_NAMES: [&str; 12] = [
    "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
];

/// Converts a MIDI note number to a human-readable note name with octave.
///
/// Used when logging dispatched notes.
///
/// # Examples
///
/// ```
/// use midirender::midi::note_to_name;
///
/// let name = note_to_name(60); // Middle C
/// assert_eq!(name, "C4");
/// ```
pub fn note_to_name(note: u8) -> String {
    let octave = (note / 12) as i8 - 1; // MIDI octave convention
    let note_index = (note % 12) as usize;
    format!("{}{}", NOTE_NAMES[note_index], octave)
}

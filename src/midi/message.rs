/// MIDI channel that General MIDI reserves for percussion (0-indexed).
pub const PERCUSSION_CHANNEL: u8 = 9;

/// A channel message decoded from a single datagram
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MidiEvent {
    /// Note On message with note number and velocity
    NoteOn { channel: u8, note: u8, velocity: u8 },
    /// Note Off message with note number and velocity
    NoteOff { channel: u8, note: u8, velocity: u8 },
    /// Control Change message with controller number and value
    ControlChange {
        channel: u8,
        controller: u8,
        value: u8,
    },
    /// Program Change message with program number
    ProgramChange { channel: u8, program: u8 },
    /// Pitch wheel with the raw 14-bit value as composed from the two data bytes
    PitchWheel { channel: u8, raw: u16 },
}

impl MidiEvent {
    pub fn channel(&self) -> u8 {
        match *self {
            MidiEvent::NoteOn { channel, .. }
            | MidiEvent::NoteOff { channel, .. }
            | MidiEvent::ControlChange { channel, .. }
            | MidiEvent::ProgramChange { channel, .. }
            | MidiEvent::PitchWheel { channel, .. } => channel,
        }
    }

    /// True for a note-off, including the velocity-0 note-on form.
    pub fn is_note_release(&self) -> bool {
        matches!(
            self,
            MidiEvent::NoteOff { .. } | MidiEvent::NoteOn { velocity: 0, .. }
        )
    }
}

/// How the 14-bit pitch wheel value is presented to the serializer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PitchConvention {
    /// Raw values at or above 0x4000 wrap into the negative range.
    #[default]
    Signed,
    /// Raw value untouched, centered at 0x2000.
    Unsigned,
}

impl PitchConvention {
    pub fn apply(self, raw: u16) -> i32 {
        let value = i32::from(raw);
        match self {
            PitchConvention::Signed if value >= 0x4000 => value - 0x8000,
            _ => value,
        }
    }
}

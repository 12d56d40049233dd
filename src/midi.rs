use crate::note::Note;

#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum MidiEvent {
    NoteOn { channel: u8, note: Note, velocity: u8 },
    NoteOff { channel: u8, note: Note },
    Invalid,
}

impl MidiEvent {
    /// Parses a raw MIDI message. Messages other than note on/off are reported as `Invalid`.
    pub fn from_raw(data: &[u8]) -> Self {
        match *data {
            [a @ 0x80..=0x8f, note, _] => MidiEvent::NoteOff {
                channel: a & 0x0f,
                note: note.into(),
            },
            // Running-status devices send note-off as note-on with zero velocity
            [a @ 0x90..=0x9f, note, 0] => MidiEvent::NoteOff {
                channel: a & 0x0f,
                note: note.into(),
            },
            [a @ 0x90..=0x9f, note, velocity] => MidiEvent::NoteOn {
                channel: a & 0x0f,
                note: note.into(),
                velocity,
            },
            _ => MidiEvent::Invalid,
        }
    }

    pub fn is_invalid(&self) -> bool {
        matches!(self, MidiEvent::Invalid)
    }
}

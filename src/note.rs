use crate::util::hz_from_note;

const NOTE_NAMES: [&str; 12] = ["C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B"];

/// A MIDI note number.
#[derive(Copy, Clone, Eq, PartialEq, Hash)]
pub struct Note(pub u8);

impl From<u8> for Note {
    fn from(value: u8) -> Self {
        Self(value & 0x7f)
    }
}

impl Default for Note {
    fn default() -> Self {
        Self::middle_c()
    }
}

impl std::fmt::Display for Note {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let octave = (self.0 / 12) as i8 - 1;
        write!(f, "{}{}", NOTE_NAMES[(self.0 % 12) as usize], octave)
    }
}

impl std::fmt::Debug for Note {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Display::fmt(self, f)
    }
}

impl Note {
    pub fn middle_c() -> Self {
        Self(60)
    }

    pub fn frequency(&self) -> f32 {
        hz_from_note(self.0)
    }

    /// Transposes by `offset` semitones, saturating at the ends of the MIDI range.
    pub fn transpose(&self, offset: i8) -> Self {
        Self(self.0.saturating_add_signed(offset).min(127))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_note_names() {
        assert_eq!(Note::middle_c().to_string(), "C4");
        assert_eq!(Note(69).to_string(), "A4");
        assert_eq!(Note(0).to_string(), "C-1");
        assert_eq!(Note(61).to_string(), "C#4");
    }

    #[test]
    fn test_transpose_saturates() {
        assert_eq!(Note(60).transpose(7), Note(67));
        assert_eq!(Note(2).transpose(-5), Note(0));
        assert_eq!(Note(125).transpose(12), Note(127));
    }
}

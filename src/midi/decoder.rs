use super::MidiEvent;

/// Decodes one datagram into a channel message.
///
/// Returns `None` for anything the recorder does not keep: empty payloads,
/// data bytes without a status byte, system messages, aftertouch, and
/// messages shorter than their status requires.
pub fn decode(data: &[u8]) -> Option<MidiEvent> {
    let status = *data.first()?;
    let channel = status & 0x0F;

    match status & 0xF0 {
        0x90 if data.len() >= 3 => Some(MidiEvent::NoteOn {
            channel,
            note: data[1],
            velocity: data[2],
        }),
        0x80 if data.len() >= 3 => Some(MidiEvent::NoteOff {
            channel,
            note: data[1],
            velocity: data[2],
        }),
        0xB0 if data.len() >= 3 => Some(MidiEvent::ControlChange {
            channel,
            controller: data[1],
            value: data[2],
        }),
        0xC0 if data.len() >= 2 => Some(MidiEvent::ProgramChange {
            channel,
            program: data[1],
        }),
        0xE0 if data.len() >= 3 => Some(MidiEvent::PitchWheel {
            channel,
            raw: (u16::from(data[1]) << 7) | u16::from(data[2]),
        }),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_messages() {
        assert_eq!(
            decode(&[0x90, 60, 100]),
            Some(MidiEvent::NoteOn {
                channel: 0,
                note: 60,
                velocity: 100
            })
        );
        assert_eq!(
            decode(&[0x83, 61, 20]),
            Some(MidiEvent::NoteOff {
                channel: 3,
                note: 61,
                velocity: 20
            })
        );
        assert_eq!(
            decode(&[0xB0, 7, 64]),
            Some(MidiEvent::ControlChange {
                channel: 0,
                controller: 7,
                value: 64
            })
        );
        assert_eq!(
            decode(&[0xCF, 42]),
            Some(MidiEvent::ProgramChange {
                channel: 15,
                program: 42
            })
        );
    }

    #[test]
    fn test_pitch_wheel_composition() {
        assert_eq!(
            decode(&[0xE1, 0x40, 0x00]),
            Some(MidiEvent::PitchWheel {
                channel: 1,
                raw: 0x2000
            })
        );
        assert_eq!(
            decode(&[0xE0, 0x7F, 0x7F]),
            Some(MidiEvent::PitchWheel {
                channel: 0,
                raw: 0x3FFF
            })
        );
    }

    #[test]
    fn test_ignored_payloads() {
        assert_eq!(decode(&[]), None);
        // data byte without status
        assert_eq!(decode(&[0x40, 1, 2]), None);
        // too short for the status
        assert_eq!(decode(&[0x90, 60]), None);
        assert_eq!(decode(&[0xB0, 7]), None);
        assert_eq!(decode(&[0xC0]), None);
        assert_eq!(decode(&[0xE0, 0]), None);
        // aftertouch and system messages are not recorded
        assert_eq!(decode(&[0xA0, 60, 10]), None);
        assert_eq!(decode(&[0xD0, 10]), None);
        assert_eq!(decode(&[0xF8]), None);
    }

    #[test]
    fn test_trailing_bytes_are_ignored() {
        let mut datagram = [0u8; 16];
        datagram[..3].copy_from_slice(&[0x99, 36, 127]);
        assert_eq!(
            decode(&datagram),
            Some(MidiEvent::NoteOn {
                channel: 9,
                note: 36,
                velocity: 127
            })
        );
    }
}

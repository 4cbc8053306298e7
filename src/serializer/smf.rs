use super::{Serializer, SerializerError, SerializerFactory, FILE_EXTENSION};
use crate::clock::Resolution;
use crate::midi::PitchConvention;
use crate::session::{NoteMode, SessionConfig, TickReference};
use log::debug;
use midly::num::{u14, u4, u7};
use midly::{
    Format, Header, MetaMessage, MidiMessage, PitchBend, Smf, Timing, TrackEvent, TrackEventKind,
};
use std::fs;
use std::io;
use std::path::Path;

/// File division used when the session counts in fractional beats.
pub const BEAT_FRACTION_DIVISION: u16 = 960;

const MAX_TEMPO_MICROS: u32 = 0x00FF_FFFF;
const PITCH_CENTER: i32 = 0x2000;
const PITCH_MAX: i32 = 0x3FFF;

#[derive(Debug, Clone, Copy)]
struct Placed {
    tick: u64,
    channel: u8,
    message: MidiMessage,
}

/// Writes a single-track Standard MIDI File.
///
/// Events are placed on an absolute timeline and sorted stably before
/// encoding, so paired notes reported at release time land at their onset.
#[derive(Debug)]
pub struct SmfSerializer {
    resolution: Resolution,
    reference: TickReference,
    pitch: PitchConvention,
    tempo_micros: Option<u32>,
    copyright: Option<String>,
    cursor: u64,
    events: Vec<Placed>,
}

impl SmfSerializer {
    pub fn new(resolution: Resolution, reference: TickReference, pitch: PitchConvention) -> Self {
        SmfSerializer {
            resolution,
            reference,
            pitch,
            tempo_micros: None,
            copyright: None,
            cursor: 0,
            events: Vec::new(),
        }
    }

    fn division(&self) -> u16 {
        match self.resolution {
            Resolution::Ppqn(ppqn) => ppqn,
            Resolution::BeatFraction => BEAT_FRACTION_DIVISION,
        }
    }

    fn file_ticks(&self, ticks: f64) -> u64 {
        let ticks = match self.resolution {
            Resolution::Ppqn(_) => ticks,
            Resolution::BeatFraction => ticks * f64::from(BEAT_FRACTION_DIVISION),
        };
        ticks.max(0.0) as u64
    }

    /// Position of an offset reported with the configured tick reference.
    fn place_offset(&mut self, ticks: f64) -> u64 {
        let ticks = self.file_ticks(ticks);
        match self.reference {
            TickReference::Absolute => ticks,
            TickReference::Delta => {
                self.cursor += ticks;
                self.cursor
            }
        }
    }

    fn push(&mut self, tick: u64, channel: u8, message: MidiMessage) {
        self.events.push(Placed {
            tick,
            channel,
            message,
        });
    }

    /// Raw 14-bit bend for a value produced by the session's pitch convention.
    ///
    /// Signed values in `0..=0x3FFF` are already raw; only the wrapped
    /// negative range is shifted back below the center.
    fn pitch_bend(&self, value: i32) -> PitchBend {
        let raw = match self.pitch {
            PitchConvention::Signed if value < 0 => value + PITCH_CENTER,
            _ => value,
        };
        PitchBend(u14::from(raw.clamp(0, PITCH_MAX) as u16))
    }

    /// Encodes the accumulated track into SMF bytes.
    pub fn encode(&self) -> Result<Vec<u8>, SerializerError> {
        let mut placed = self.events.clone();
        placed.sort_by_key(|event| event.tick);

        let mut track = Vec::with_capacity(placed.len() + 3);
        if let Some(text) = &self.copyright {
            track.push(TrackEvent {
                delta: 0.into(),
                kind: TrackEventKind::Meta(MetaMessage::Copyright(text.as_bytes())),
            });
        }
        if let Some(micros) = self.tempo_micros {
            track.push(TrackEvent {
                delta: 0.into(),
                kind: TrackEventKind::Meta(MetaMessage::Tempo(micros.into())),
            });
        }

        let mut previous = 0u64;
        for event in &placed {
            let delta = event.tick.saturating_sub(previous).min(u64::from(u32::MAX >> 4)) as u32;
            track.push(TrackEvent {
                delta: delta.into(),
                kind: TrackEventKind::Midi {
                    channel: u4::from(event.channel & 0x0F),
                    message: event.message,
                },
            });
            previous = event.tick;
        }

        track.push(TrackEvent {
            delta: 0.into(),
            kind: TrackEventKind::Meta(MetaMessage::EndOfTrack),
        });

        let smf = Smf {
            header: Header::new(Format::SingleTrack, Timing::Metrical(self.division().into())),
            tracks: vec![track],
        };

        let mut out = Vec::new();
        smf.write(&mut out)
            .map_err(|e| SerializerError::Encode(e.to_string()))?;
        Ok(out)
    }
}

fn data(byte: u8) -> u7 {
    u7::from(byte & 0x7F)
}

impl Serializer for SmfSerializer {
    fn set_tempo(&mut self, bpm: f64) {
        let micros = (60_000_000.0 / bpm).round();
        self.tempo_micros = Some(micros.clamp(1.0, f64::from(MAX_TEMPO_MICROS)) as u32);
    }

    fn set_copyright(&mut self, text: &str) {
        self.copyright = Some(text.to_string());
    }

    fn add_note(&mut self, channel: u8, note: u8, onset: f64, duration: f64, velocity: u8) {
        let start = self.file_ticks(onset);
        let end = start + self.file_ticks(duration);
        self.push(
            start,
            channel,
            MidiMessage::NoteOn {
                key: data(note),
                vel: data(velocity),
            },
        );
        self.push(
            end,
            channel,
            MidiMessage::NoteOff {
                key: data(note),
                vel: 0.into(),
            },
        );
    }

    fn add_note_on(&mut self, channel: u8, ticks: f64, note: u8, velocity: u8) {
        let tick = self.place_offset(ticks);
        self.push(
            tick,
            channel,
            MidiMessage::NoteOn {
                key: data(note),
                vel: data(velocity),
            },
        );
    }

    fn add_note_off(&mut self, channel: u8, ticks: f64, note: u8, velocity: u8) {
        let tick = self.place_offset(ticks);
        self.push(
            tick,
            channel,
            MidiMessage::NoteOff {
                key: data(note),
                vel: data(velocity),
            },
        );
    }

    fn add_control_change(&mut self, channel: u8, ticks: f64, controller: u8, value: u8) {
        let tick = self.place_offset(ticks);
        self.push(
            tick,
            channel,
            MidiMessage::Controller {
                controller: data(controller),
                value: data(value),
            },
        );
    }

    fn add_program_change(&mut self, channel: u8, ticks: f64, program: u8) {
        let tick = self.place_offset(ticks);
        self.push(
            tick,
            channel,
            MidiMessage::ProgramChange {
                program: data(program),
            },
        );
    }

    fn add_pitch_wheel(&mut self, channel: u8, ticks: f64, value: i32) {
        let tick = self.place_offset(ticks);
        let bend = self.pitch_bend(value);
        self.push(tick, channel, MidiMessage::PitchBend { bend });
    }

    fn save(&mut self, path: &Path) -> Result<(), SerializerError> {
        let bytes = self.encode()?;

        // write next to the target and rename so a file is either complete or absent
        let partial = path.with_extension(format!("{}.part", FILE_EXTENSION));
        fs::write(&partial, &bytes)?;
        if path.exists() {
            let _ = fs::remove_file(&partial);
            return Err(io::Error::new(
                io::ErrorKind::AlreadyExists,
                format!("{} already exists", path.display()),
            )
            .into());
        }
        if let Err(e) = fs::rename(&partial, path) {
            let _ = fs::remove_file(&partial);
            return Err(e.into());
        }

        debug!(
            "Wrote {} events ({} bytes) to {}",
            self.events.len(),
            bytes.len(),
            path.display()
        );
        Ok(())
    }
}

/// Creates [`SmfSerializer`]s sharing one timing configuration.
#[derive(Debug, Clone, Copy)]
pub struct SmfSerializerFactory {
    pub resolution: Resolution,
    pub reference: TickReference,
    pub pitch: PitchConvention,
}

impl SmfSerializerFactory {
    /// Factory matching a session configuration.
    ///
    /// Paired notes are placed at absolute onsets, which cannot share one
    /// track with offsets counted from the previous message.
    pub fn for_session(config: &SessionConfig) -> Result<Self, SerializerError> {
        if config.note_mode == NoteMode::Paired && config.tick_reference == TickReference::Delta {
            return Err(SerializerError::Unsupported(
                "paired notes with delta tick offsets (use --tick-reference absolute or --note-mode independent)"
                    .to_string(),
            ));
        }
        Ok(SmfSerializerFactory {
            resolution: config.resolution,
            reference: config.tick_reference,
            pitch: config.pitch,
        })
    }
}

impl SerializerFactory for SmfSerializerFactory {
    type Output = SmfSerializer;

    fn create(&self) -> SmfSerializer {
        SmfSerializer::new(self.resolution, self.reference, self.pitch)
    }
}

//! Per-originator recording state
//!
//! A [`Session`] collects the events of one sender between first contact and
//! finalization: it pairs note-ons with their note-offs to recover durations,
//! converts arrival times into ticks, and tracks inactivity so it can close
//! itself.

use crate::clock::{Resolution, TickClock};
use crate::midi::{MidiEvent, PitchConvention, PERCUSSION_CHANNEL};
use crate::serializer::{Serializer, SerializerError, SerializerFactory, FILE_EXTENSION};
use chrono::{DateTime, Local};
use log::{debug, info, trace};
use serde::Deserialize;
use std::collections::HashMap;
use std::fmt;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use thiserror::Error;

/// How note messages become recorded events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NoteMode {
    /// A note-on is held until its note-off and recorded once with a duration.
    #[default]
    Paired,
    /// Note-on and note-off are recorded as they arrive.
    Independent,
}

/// What tick offsets of non-paired events are measured from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TickReference {
    /// Since the start of the session.
    #[default]
    Absolute,
    /// Since the previous message of the session.
    Delta,
}

/// Who a session records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Originator {
    Sender(SocketAddr),
    /// All senders share one session.
    Merged,
}

impl fmt::Display for Originator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Originator::Sender(addr) => write!(f, "{}", addr),
            Originator::Merged => write!(f, "all senders"),
        }
    }
}

/// Settings shared by every session of the process
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub bpm: f64,
    pub resolution: Resolution,
    pub inactivity_timeout: Duration,
    /// Sessions with fewer emitted events are discarded.
    pub min_events: usize,
    pub note_mode: NoteMode,
    pub tick_reference: TickReference,
    pub pitch: PitchConvention,
    pub output_dir: PathBuf,
    pub file_prefix: String,
    pub copyright: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            bpm: 960.0,
            resolution: Resolution::default(),
            inactivity_timeout: Duration::from_secs(60),
            min_events: 0,
            note_mode: NoteMode::default(),
            tick_reference: TickReference::default(),
            pitch: PitchConvention::default(),
            output_dir: PathBuf::from("."),
            file_prefix: "recording".to_string(),
            copyright: "netmidirec".to_string(),
        }
    }
}

impl SessionConfig {
    pub fn clock(&self) -> TickClock {
        TickClock::new(self.bpm, self.resolution)
    }

    /// Filename for a session opened at `opened_at`.
    pub fn file_name(&self, originator: &Originator, opened_at: &DateTime<Local>) -> String {
        let stamp = opened_at.format("%Y-%m-%d_%H-%M-%S");
        match originator {
            Originator::Sender(addr) => format!(
                "{}_{}-{}_{}.{}",
                self.file_prefix,
                addr.ip(),
                addr.port(),
                stamp,
                FILE_EXTENSION
            ),
            Originator::Merged => format!("{}_{}.{}", self.file_prefix, stamp, FILE_EXTENSION),
        }
    }

    /// Path for `file_name` in the output directory that no recording uses
    /// yet. Sessions opened in the same second get `-2`, `-3`, ... appended.
    pub fn free_path(&self, file_name: &str) -> PathBuf {
        let path = self.output_dir.join(file_name);
        if !path.exists() {
            return path;
        }
        let stem = file_name
            .strip_suffix(&format!(".{}", FILE_EXTENSION))
            .unwrap_or(file_name);
        (2u32..)
            .map(|n| {
                self.output_dir
                    .join(format!("{}-{}.{}", stem, n, FILE_EXTENSION))
            })
            .find(|candidate| !candidate.exists())
            .unwrap_or(path)
    }
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("session for {0} is already finalized")]
    Finalized(Originator),
    #[error("session for {0} was finalized twice")]
    AlreadyFinalized(Originator),
    #[error("could not persist session for {originator}: {source}")]
    Serializer {
        originator: Originator,
        #[source]
        source: SerializerError,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Created, nothing ingested yet.
    New,
    Active,
    Finalized,
}

/// Result of a successful finalize
#[derive(Debug, Clone, PartialEq)]
pub enum FinalizeOutcome {
    Saved { path: PathBuf, events: usize },
    Discarded { events: usize },
}

/// A note that is sounding and waiting for its release
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct NoteKey {
    channel: u8,
    note: u8,
}

#[derive(Debug, Clone, Copy)]
struct PendingNote {
    started: Instant,
    velocity: u8,
}

/// What an emitted event carries besides its tick offset
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EventKind {
    Note {
        channel: u8,
        note: u8,
        velocity: u8,
        duration: f64,
    },
    NoteOn {
        channel: u8,
        note: u8,
        velocity: u8,
    },
    NoteOff {
        channel: u8,
        note: u8,
        velocity: u8,
    },
    ControlChange {
        channel: u8,
        controller: u8,
        value: u8,
    },
    ProgramChange {
        channel: u8,
        program: u8,
    },
    PitchWheel {
        channel: u8,
        value: i32,
    },
}

/// An emitted event. For paired notes `ticks` is the onset since session start.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimedEvent {
    pub ticks: f64,
    pub kind: EventKind,
}

impl TimedEvent {
    fn replay<S: Serializer>(&self, serializer: &mut S) {
        let ticks = self.ticks;
        match self.kind {
            EventKind::Note {
                channel,
                note,
                velocity,
                duration,
            } => serializer.add_note(channel, note, ticks, duration, velocity),
            EventKind::NoteOn {
                channel,
                note,
                velocity,
            } => serializer.add_note_on(channel, ticks, note, velocity),
            EventKind::NoteOff {
                channel,
                note,
                velocity,
            } => serializer.add_note_off(channel, ticks, note, velocity),
            EventKind::ControlChange {
                channel,
                controller,
                value,
            } => serializer.add_control_change(channel, ticks, controller, value),
            EventKind::ProgramChange { channel, program } => {
                serializer.add_program_change(channel, ticks, program)
            }
            EventKind::PitchWheel { channel, value } => {
                serializer.add_pitch_wheel(channel, ticks, value)
            }
        }
    }
}

pub struct Session {
    originator: Originator,
    config: SessionConfig,
    clock: TickClock,
    opened_at: DateTime<Local>,
    started_at: Option<Instant>,
    last_activity_at: Option<Instant>,
    pending: HashMap<NoteKey, PendingNote>,
    events: Vec<TimedEvent>,
    state: SessionState,
}

impl Session {
    pub fn new(originator: Originator, config: SessionConfig, opened_at: DateTime<Local>) -> Self {
        Session {
            originator,
            clock: config.clock(),
            config,
            opened_at,
            started_at: None,
            last_activity_at: None,
            pending: HashMap::new(),
            events: Vec::new(),
            state: SessionState::New,
        }
    }

    pub fn originator(&self) -> Originator {
        self.originator
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn events(&self) -> &[TimedEvent] {
        &self.events
    }

    pub fn pending_notes(&self) -> usize {
        self.pending.len()
    }

    pub fn last_activity_at(&self) -> Option<Instant> {
        self.last_activity_at
    }

    pub fn file_name(&self) -> String {
        self.config.file_name(&self.originator, &self.opened_at)
    }

    /// Records one decoded message that arrived at `now`.
    pub fn ingest(&mut self, event: MidiEvent, now: Instant) -> Result<(), SessionError> {
        match self.state {
            SessionState::Finalized => return Err(SessionError::Finalized(self.originator)),
            SessionState::New => {
                self.started_at = Some(now);
                self.last_activity_at = Some(now);
                self.state = SessionState::Active;
                info!(
                    "{} started recording to {}",
                    self.originator,
                    self.file_name()
                );
            }
            SessionState::Active => {}
        }

        match (self.config.note_mode, event) {
            (NoteMode::Paired, MidiEvent::NoteOn { .. } | MidiEvent::NoteOff { .. }) => {
                self.pair_note(event, now)
            }
            (
                NoteMode::Independent,
                MidiEvent::NoteOn {
                    channel,
                    note,
                    velocity,
                },
            ) => self.emit_offset(
                now,
                EventKind::NoteOn {
                    channel,
                    note,
                    velocity,
                },
            ),
            (
                NoteMode::Independent,
                MidiEvent::NoteOff {
                    channel,
                    note,
                    velocity,
                },
            ) => self.emit_offset(
                now,
                EventKind::NoteOff {
                    channel,
                    note,
                    velocity,
                },
            ),
            (
                _,
                MidiEvent::ControlChange {
                    channel,
                    controller,
                    value,
                },
            ) => {
                debug!(
                    "{} channel {} controller {} change to {}",
                    self.originator, channel, controller, value
                );
                self.emit_offset(
                    now,
                    EventKind::ControlChange {
                        channel,
                        controller,
                        value,
                    },
                )
            }
            (_, MidiEvent::ProgramChange { channel, program }) => {
                debug!(
                    "{} channel {} program change to {}",
                    self.originator, channel, program
                );
                self.emit_offset(now, EventKind::ProgramChange { channel, program })
            }
            (_, MidiEvent::PitchWheel { channel, raw }) => {
                let value = self.config.pitch.apply(raw);
                self.emit_offset(now, EventKind::PitchWheel { channel, value })
            }
        }

        self.last_activity_at = self.last_activity_at.max(Some(now));
        Ok(())
    }

    fn pair_note(&mut self, event: MidiEvent, now: Instant) {
        let (channel, note, velocity) = match event {
            MidiEvent::NoteOn {
                channel,
                note,
                velocity,
            }
            | MidiEvent::NoteOff {
                channel,
                note,
                velocity,
            } => (channel, note, velocity),
            _ => return,
        };
        let key = NoteKey { channel, note };

        if event.is_note_release() {
            if !self.release(key, now) {
                debug!(
                    "{} dropped note-off for {} on channel {} without a note-on",
                    self.originator, note, channel
                );
            }
            return;
        }

        // a second note-on closes the one still sounding
        if self.release(key, now) {
            debug!(
                "{} retriggered {} on channel {} before its note-off",
                self.originator, note, channel
            );
        }
        self.pending.insert(
            key,
            PendingNote {
                started: now,
                velocity,
            },
        );
        trace!(
            "{} holding {} (velocity {}) on channel {}",
            self.originator,
            note,
            velocity,
            channel
        );
    }

    /// Emits the pending note for `key`, if any.
    fn release(&mut self, key: NoteKey, now: Instant) -> bool {
        let Some(pending) = self.pending.remove(&key) else {
            return false;
        };
        let started_at = self.started_at.unwrap_or(pending.started);
        let onset = self
            .clock
            .ticks(pending.started.saturating_duration_since(started_at));
        let duration = if key.channel == PERCUSSION_CHANNEL {
            self.clock.unit()
        } else {
            self.clock.ticks(now.saturating_duration_since(pending.started))
        };

        debug!(
            "{} played {} (velocity {}) at {} for {}",
            self.originator, key.note, pending.velocity, onset, duration
        );
        self.events.push(TimedEvent {
            ticks: onset,
            kind: EventKind::Note {
                channel: key.channel,
                note: key.note,
                velocity: pending.velocity,
                duration,
            },
        });
        true
    }

    fn emit_offset(&mut self, now: Instant, kind: EventKind) {
        let reference = match self.config.tick_reference {
            TickReference::Absolute => self.started_at,
            TickReference::Delta => self.last_activity_at,
        }
        .unwrap_or(now);
        let ticks = self.clock.ticks(now.saturating_duration_since(reference));
        trace!("{} {:?} at {}", self.originator, kind, ticks);
        self.events.push(TimedEvent { ticks, kind });
    }

    /// True once an active session has been quiet for the inactivity timeout.
    pub fn is_idle(&self, now: Instant) -> bool {
        match (self.state, self.last_activity_at) {
            (SessionState::Active, Some(last)) => {
                now.saturating_duration_since(last) >= self.config.inactivity_timeout
            }
            _ => false,
        }
    }

    /// Finalizes the session if it has been idle long enough.
    pub fn check_idle<F: SerializerFactory + ?Sized>(
        &mut self,
        now: Instant,
        factory: &F,
    ) -> Option<Result<FinalizeOutcome, SessionError>> {
        if !self.is_idle(now) {
            return None;
        }
        debug!("{} idle, closing session", self.originator);
        Some(self.finalize(factory))
    }

    /// Persists the session, or discards it when it is too short.
    ///
    /// The session is finalized even when the serializer fails.
    pub fn finalize<F: SerializerFactory + ?Sized>(
        &mut self,
        factory: &F,
    ) -> Result<FinalizeOutcome, SessionError> {
        let previous = std::mem::replace(&mut self.state, SessionState::Finalized);
        if previous == SessionState::Finalized {
            return Err(SessionError::AlreadyFinalized(self.originator));
        }

        if !self.pending.is_empty() {
            debug!(
                "{} dropping {} notes still sounding",
                self.originator,
                self.pending.len()
            );
            self.pending.clear();
        }

        let events = std::mem::take(&mut self.events);
        if previous == SessionState::New || events.len() < self.config.min_events {
            info!(
                "{} not storing {}: {} events recorded, {} required",
                self.originator,
                self.file_name(),
                events.len(),
                self.config.min_events
            );
            return Ok(FinalizeOutcome::Discarded {
                events: events.len(),
            });
        }

        let mut serializer = factory.create();
        serializer.set_copyright(&self.config.copyright);
        serializer.set_tempo(self.config.bpm);
        for event in &events {
            event.replay(&mut serializer);
        }

        let path = self.config.free_path(&self.file_name());
        serializer
            .save(&path)
            .map_err(|source| SessionError::Serializer {
                originator: self.originator,
                source,
            })?;

        info!(
            "{} stored {} events in {}",
            self.originator,
            events.len(),
            path.display()
        );
        Ok(FinalizeOutcome::Saved {
            path,
            events: events.len(),
        })
    }
}

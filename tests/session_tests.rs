use netmidirec::clock::Resolution;
use netmidirec::midi::{MidiEvent, PitchConvention};
use netmidirec::serializer::{MemoryStore, Recorded};
use netmidirec::session::{
    EventKind, FinalizeOutcome, NoteMode, Originator, Session, SessionConfig, SessionError,
    SessionState, TickReference,
};
use chrono::Local;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

fn address() -> SocketAddr {
    "127.0.0.1:5000".parse().unwrap()
}

fn config() -> SessionConfig {
    SessionConfig {
        bpm: 120.0,
        resolution: Resolution::Ppqn(480),
        inactivity_timeout: Duration::from_secs(60),
        ..SessionConfig::default()
    }
}

fn session(config: SessionConfig) -> Session {
    Session::new(Originator::Sender(address()), config, Local::now())
}

fn note_on(channel: u8, note: u8, velocity: u8) -> MidiEvent {
    MidiEvent::NoteOn {
        channel,
        note,
        velocity,
    }
}

fn note_off(channel: u8, note: u8) -> MidiEvent {
    MidiEvent::NoteOff {
        channel,
        note,
        velocity: 0,
    }
}

fn secs(s: f64) -> Duration {
    Duration::from_secs_f64(s)
}

#[test]
fn test_note_pairing_produces_duration() {
    let t0 = Instant::now();
    let mut session = session(config());

    session.ingest(note_on(0, 60, 100), t0).unwrap();
    assert_eq!(session.pending_notes(), 1);
    assert!(session.events().is_empty());

    session.ingest(note_off(0, 60), t0 + secs(2.0)).unwrap();
    assert_eq!(session.pending_notes(), 0);
    assert_eq!(session.events().len(), 1);

    let event = session.events()[0];
    assert_eq!(event.ticks, 0.0);
    assert_eq!(
        event.kind,
        EventKind::Note {
            channel: 0,
            note: 60,
            velocity: 100,
            duration: 1920.0
        }
    );
}

#[test]
fn test_onset_is_measured_from_session_start() {
    let t0 = Instant::now();
    let mut session = session(config());

    session
        .ingest(
            MidiEvent::ControlChange {
                channel: 0,
                controller: 64,
                value: 127,
            },
            t0,
        )
        .unwrap();
    session.ingest(note_on(1, 62, 80), t0 + secs(0.5)).unwrap();
    session.ingest(note_off(1, 62), t0 + secs(0.75)).unwrap();

    let note = session.events()[1];
    assert_eq!(note.ticks, 480.0);
    assert_eq!(
        note.kind,
        EventKind::Note {
            channel: 1,
            note: 62,
            velocity: 80,
            duration: 240.0
        }
    );
}

#[test]
fn test_velocity_zero_note_on_releases() {
    let t0 = Instant::now();
    let mut session = session(config());

    session.ingest(note_on(0, 64, 90), t0).unwrap();
    session.ingest(note_on(0, 64, 0), t0 + secs(1.0)).unwrap();

    assert_eq!(session.pending_notes(), 0);
    assert_eq!(
        session.events()[0].kind,
        EventKind::Note {
            channel: 0,
            note: 64,
            velocity: 90,
            duration: 960.0
        }
    );
}

#[test]
fn test_percussion_has_fixed_duration() {
    let t0 = Instant::now();
    let mut session = session(config());

    session.ingest(note_on(9, 36, 127), t0).unwrap();
    session.ingest(note_off(9, 36), t0 + secs(3.0)).unwrap();

    assert_eq!(
        session.events()[0].kind,
        EventKind::Note {
            channel: 9,
            note: 36,
            velocity: 127,
            duration: 1.0
        }
    );
}

#[test]
fn test_unmatched_note_off_emits_nothing() {
    let t0 = Instant::now();
    let mut session = session(config());

    session.ingest(note_off(0, 60), t0).unwrap();
    assert!(session.events().is_empty());
    assert_eq!(session.state(), SessionState::Active);

    // a release on another channel does not match
    session.ingest(note_on(0, 60, 100), t0 + secs(1.0)).unwrap();
    session.ingest(note_off(1, 60), t0 + secs(2.0)).unwrap();
    assert!(session.events().is_empty());
    assert_eq!(session.pending_notes(), 1);
}

#[test]
fn test_retrigger_closes_sounding_note() {
    let t0 = Instant::now();
    let mut session = session(config());

    session.ingest(note_on(0, 60, 100), t0).unwrap();
    session.ingest(note_on(0, 60, 50), t0 + secs(1.0)).unwrap();
    assert_eq!(session.pending_notes(), 1);
    assert_eq!(session.events().len(), 1);
    assert_eq!(
        session.events()[0].kind,
        EventKind::Note {
            channel: 0,
            note: 60,
            velocity: 100,
            duration: 960.0
        }
    );

    session.ingest(note_off(0, 60), t0 + secs(1.5)).unwrap();
    assert_eq!(session.events()[1].ticks, 960.0);
    assert_eq!(
        session.events()[1].kind,
        EventKind::Note {
            channel: 0,
            note: 60,
            velocity: 50,
            duration: 480.0
        }
    );
}

#[test]
fn test_lone_control_change_at_offset_zero() {
    let t0 = Instant::now();
    let mut session = session(config());

    session
        .ingest(
            MidiEvent::ControlChange {
                channel: 0,
                controller: 7,
                value: 64,
            },
            t0,
        )
        .unwrap();

    assert_eq!(session.state(), SessionState::Active);
    assert_eq!(session.events().len(), 1);
    assert_eq!(session.events()[0].ticks, 0.0);
    assert_eq!(
        session.events()[0].kind,
        EventKind::ControlChange {
            channel: 0,
            controller: 7,
            value: 64
        }
    );
}

#[test]
fn test_delta_reference_measures_from_previous_message() {
    let t0 = Instant::now();
    let mut session = session(SessionConfig {
        note_mode: NoteMode::Independent,
        tick_reference: TickReference::Delta,
        ..config()
    });

    session.ingest(note_on(0, 60, 100), t0).unwrap();
    session
        .ingest(
            MidiEvent::ProgramChange {
                channel: 0,
                program: 5,
            },
            t0 + secs(1.0),
        )
        .unwrap();
    session.ingest(note_off(0, 60), t0 + secs(1.5)).unwrap();

    let ticks: Vec<f64> = session.events().iter().map(|e| e.ticks).collect();
    assert_eq!(ticks, vec![0.0, 960.0, 480.0]);
    assert_eq!(
        session.events()[2].kind,
        EventKind::NoteOff {
            channel: 0,
            note: 60,
            velocity: 0
        }
    );
}

#[test]
fn test_paired_notes_with_delta_offsets() {
    let t0 = Instant::now();
    let mut session = session(SessionConfig {
        tick_reference: TickReference::Delta,
        ..config()
    });

    session.ingest(note_on(0, 60, 100), t0).unwrap();
    session
        .ingest(
            MidiEvent::ProgramChange {
                channel: 0,
                program: 5,
            },
            t0 + secs(1.0),
        )
        .unwrap();
    session
        .ingest(
            MidiEvent::ControlChange {
                channel: 0,
                controller: 1,
                value: 9,
            },
            t0 + secs(1.5),
        )
        .unwrap();
    session.ingest(note_off(0, 60), t0 + secs(2.0)).unwrap();

    // offsets count from the previous message, the note keeps its onset
    let ticks: Vec<f64> = session.events().iter().map(|e| e.ticks).collect();
    assert_eq!(ticks, vec![960.0, 480.0, 0.0]);
    assert_eq!(
        session.events()[2].kind,
        EventKind::Note {
            channel: 0,
            note: 60,
            velocity: 100,
            duration: 1920.0
        }
    );
}

#[test]
fn test_independent_mode_keeps_velocity_zero_note_on() {
    let t0 = Instant::now();
    let mut session = session(SessionConfig {
        note_mode: NoteMode::Independent,
        ..config()
    });

    session.ingest(note_on(0, 60, 100), t0).unwrap();
    session.ingest(note_on(0, 60, 0), t0 + secs(1.0)).unwrap();

    assert_eq!(session.pending_notes(), 0);
    assert_eq!(
        session.events()[1],
        netmidirec::session::TimedEvent {
            ticks: 960.0,
            kind: EventKind::NoteOn {
                channel: 0,
                note: 60,
                velocity: 0
            }
        }
    );
}

#[test]
fn test_out_of_order_arrival_clamps_to_zero() {
    let t0 = Instant::now() + secs(10.0);
    let mut session = session(SessionConfig {
        note_mode: NoteMode::Independent,
        tick_reference: TickReference::Delta,
        ..config()
    });

    session.ingest(note_on(0, 60, 100), t0).unwrap();
    session.ingest(note_off(0, 60), t0 - secs(1.0)).unwrap();

    assert_eq!(session.events()[1].ticks, 0.0);
    // activity time never moves backwards
    assert_eq!(session.last_activity_at(), Some(t0));
}

#[test]
fn test_pitch_wheel_convention() {
    let t0 = Instant::now();
    let mut signed = session(config());
    signed
        .ingest(
            MidiEvent::PitchWheel {
                channel: 2,
                raw: 0x7F7F,
            },
            t0,
        )
        .unwrap();
    assert_eq!(
        signed.events()[0].kind,
        EventKind::PitchWheel {
            channel: 2,
            value: 0x7F7F - 0x8000
        }
    );

    let mut unsigned = session(SessionConfig {
        pitch: PitchConvention::Unsigned,
        ..config()
    });
    unsigned
        .ingest(
            MidiEvent::PitchWheel {
                channel: 2,
                raw: 0x2000,
            },
            t0,
        )
        .unwrap();
    assert_eq!(
        unsigned.events()[0].kind,
        EventKind::PitchWheel {
            channel: 2,
            value: 0x2000
        }
    );
}

#[test]
fn test_idle_detection() {
    let t0 = Instant::now();
    let store = MemoryStore::new();
    let mut session = session(config());

    // a session that never received anything is never idle
    assert!(!session.is_idle(t0 + secs(120.0)));

    session.ingest(note_on(0, 60, 100), t0).unwrap();
    assert!(session.check_idle(t0 + secs(59.9), &store).is_none());
    assert_eq!(session.state(), SessionState::Active);

    let outcome = session.check_idle(t0 + secs(60.0), &store).unwrap();
    assert!(matches!(outcome, Ok(FinalizeOutcome::Saved { events: 0, .. })));
    assert_eq!(session.state(), SessionState::Finalized);
}

#[test]
fn test_unterminated_note_is_not_persisted() {
    let t0 = Instant::now();
    let store = MemoryStore::new();
    let mut session = session(config());

    session.ingest(note_on(0, 60, 100), t0).unwrap();
    session.check_idle(t0 + secs(61.0), &store).unwrap().unwrap();

    let recordings = store.recordings();
    assert_eq!(recordings.len(), 1);
    assert!(recordings[0].events().is_empty());
}

#[test]
fn test_finalize_replays_metadata_then_events() {
    let t0 = Instant::now();
    let store = MemoryStore::new();
    let mut session = session(SessionConfig {
        copyright: "(c) test".to_string(),
        ..config()
    });

    session.ingest(note_on(0, 60, 100), t0).unwrap();
    session.ingest(note_off(0, 60), t0 + secs(2.0)).unwrap();
    session
        .ingest(
            MidiEvent::ProgramChange {
                channel: 3,
                program: 12,
            },
            t0 + secs(2.5),
        )
        .unwrap();

    let outcome = session.finalize(&store).unwrap();
    let path = match outcome {
        FinalizeOutcome::Saved { path, events } => {
            assert_eq!(events, 2);
            path
        }
        other => panic!("expected a saved recording, got {:?}", other),
    };

    let recordings = store.recordings();
    assert_eq!(recordings.len(), 1);
    assert_eq!(recordings[0].path, path);
    assert_eq!(
        recordings[0].calls,
        vec![
            Recorded::Copyright("(c) test".to_string()),
            Recorded::Tempo(120.0),
            Recorded::Note {
                channel: 0,
                note: 60,
                onset: 0.0,
                duration: 1920.0,
                velocity: 100
            },
            Recorded::ProgramChange {
                channel: 3,
                ticks: 2400.0,
                program: 12
            },
        ]
    );

    let name = path.file_name().unwrap().to_str().unwrap();
    assert!(name.starts_with("recording_127.0.0.1-5000_"), "{}", name);
    assert!(name.ends_with(".mid"), "{}", name);
}

#[test]
fn test_short_sessions_are_discarded() {
    let t0 = Instant::now();
    let store = MemoryStore::new();
    let mut session = session(SessionConfig {
        min_events: 2,
        ..config()
    });

    session
        .ingest(
            MidiEvent::ControlChange {
                channel: 0,
                controller: 7,
                value: 64,
            },
            t0,
        )
        .unwrap();

    let outcome = session.finalize(&store).unwrap();
    assert_eq!(outcome, FinalizeOutcome::Discarded { events: 1 });
    assert!(store.recordings().is_empty());
    assert_eq!(session.state(), SessionState::Finalized);
}

#[test]
fn test_session_finalizes_once() {
    let t0 = Instant::now();
    let store = MemoryStore::new();
    let mut session = session(config());

    session.ingest(note_on(0, 60, 100), t0).unwrap();
    session.finalize(&store).unwrap();

    assert!(matches!(
        session.finalize(&store),
        Err(SessionError::AlreadyFinalized(_))
    ));
    assert!(matches!(
        session.ingest(note_off(0, 60), t0),
        Err(SessionError::Finalized(_))
    ));
    assert!(session.check_idle(t0 + secs(600.0), &store).is_none());
    assert_eq!(store.recordings().len(), 1);
}

#[test]
fn test_serializer_failure_still_finalizes() {
    let t0 = Instant::now();
    let store = MemoryStore::failing();
    let mut session = session(config());

    session.ingest(note_on(0, 60, 100), t0).unwrap();
    session.ingest(note_off(0, 60), t0 + secs(1.0)).unwrap();

    assert!(matches!(
        session.finalize(&store),
        Err(SessionError::Serializer { .. })
    ));
    assert_eq!(session.state(), SessionState::Finalized);
}

#[test]
fn test_merged_file_name_has_no_host() {
    let config = config();
    let opened = Local::now();
    let name = config.file_name(&Originator::Merged, &opened);
    assert_eq!(
        name,
        format!("recording_{}.mid", opened.format("%Y-%m-%d_%H-%M-%S"))
    );
}

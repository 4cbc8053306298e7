use super::{Serializer, SerializerError, SerializerFactory};
use std::io::{Error, ErrorKind};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// One call made on a [`MemorySerializer`]
#[derive(Debug, Clone, PartialEq)]
pub enum Recorded {
    Tempo(f64),
    Copyright(String),
    Note {
        channel: u8,
        note: u8,
        onset: f64,
        duration: f64,
        velocity: u8,
    },
    NoteOn {
        channel: u8,
        ticks: f64,
        note: u8,
        velocity: u8,
    },
    NoteOff {
        channel: u8,
        ticks: f64,
        note: u8,
        velocity: u8,
    },
    ControlChange {
        channel: u8,
        ticks: f64,
        controller: u8,
        value: u8,
    },
    ProgramChange {
        channel: u8,
        ticks: f64,
        program: u8,
    },
    PitchWheel {
        channel: u8,
        ticks: f64,
        value: i32,
    },
}

/// Everything a serializer received before `save` was called
#[derive(Debug, Clone, PartialEq)]
pub struct SavedRecording {
    pub path: PathBuf,
    pub calls: Vec<Recorded>,
}

impl SavedRecording {
    /// Calls other than the tempo and copyright metadata.
    pub fn events(&self) -> Vec<&Recorded> {
        self.calls
            .iter()
            .filter(|call| !matches!(call, Recorded::Tempo(_) | Recorded::Copyright(_)))
            .collect()
    }
}

/// Shared sink for saved recordings; doubles as the serializer factory.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    saved: Arc<Mutex<Vec<SavedRecording>>>,
    fail_saves: bool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store whose serializers refuse to save.
    pub fn failing() -> Self {
        MemoryStore {
            saved: Arc::default(),
            fail_saves: true,
        }
    }

    pub fn recordings(&self) -> Vec<SavedRecording> {
        self.saved.lock().map(|saved| saved.clone()).unwrap_or_default()
    }
}

impl SerializerFactory for MemoryStore {
    type Output = MemorySerializer;

    fn create(&self) -> MemorySerializer {
        MemorySerializer {
            calls: Vec::new(),
            store: self.clone(),
        }
    }
}

#[derive(Debug)]
pub struct MemorySerializer {
    calls: Vec<Recorded>,
    store: MemoryStore,
}

impl Serializer for MemorySerializer {
    fn set_tempo(&mut self, bpm: f64) {
        self.calls.push(Recorded::Tempo(bpm));
    }

    fn set_copyright(&mut self, text: &str) {
        self.calls.push(Recorded::Copyright(text.to_string()));
    }

    fn add_note(&mut self, channel: u8, note: u8, onset: f64, duration: f64, velocity: u8) {
        self.calls.push(Recorded::Note {
            channel,
            note,
            onset,
            duration,
            velocity,
        });
    }

    fn add_note_on(&mut self, channel: u8, ticks: f64, note: u8, velocity: u8) {
        self.calls.push(Recorded::NoteOn {
            channel,
            ticks,
            note,
            velocity,
        });
    }

    fn add_note_off(&mut self, channel: u8, ticks: f64, note: u8, velocity: u8) {
        self.calls.push(Recorded::NoteOff {
            channel,
            ticks,
            note,
            velocity,
        });
    }

    fn add_control_change(&mut self, channel: u8, ticks: f64, controller: u8, value: u8) {
        self.calls.push(Recorded::ControlChange {
            channel,
            ticks,
            controller,
            value,
        });
    }

    fn add_program_change(&mut self, channel: u8, ticks: f64, program: u8) {
        self.calls.push(Recorded::ProgramChange {
            channel,
            ticks,
            program,
        });
    }

    fn add_pitch_wheel(&mut self, channel: u8, ticks: f64, value: i32) {
        self.calls.push(Recorded::PitchWheel {
            channel,
            ticks,
            value,
        });
    }

    fn save(&mut self, path: &Path) -> Result<(), SerializerError> {
        if self.store.fail_saves {
            return Err(Error::new(ErrorKind::PermissionDenied, "saving is disabled").into());
        }

        let recording = SavedRecording {
            path: path.to_path_buf(),
            calls: std::mem::take(&mut self.calls),
        };
        self.store
            .saved
            .lock()
            .map_err(|_| SerializerError::Encode("recording store poisoned".to_string()))?
            .push(recording);
        Ok(())
    }
}

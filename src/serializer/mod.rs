//! Persistence of finished sessions
//!
//! A session never encodes bytes itself. On finalize it creates a
//! [`Serializer`] through a [`SerializerFactory`] and replays its events as
//! semantic calls, then asks the serializer to save under a derived filename.
//!
//! - [`SmfSerializer`] writes a Standard MIDI File
//! - [`MemorySerializer`] keeps the calls in memory for inspection
//!
pub mod memory;
pub mod smf;

pub use memory::{MemorySerializer, MemoryStore, Recorded, SavedRecording};
pub use smf::{SmfSerializer, SmfSerializerFactory};

use std::path::Path;
use thiserror::Error;

/// Extension of recordings written by the recorder
pub const FILE_EXTENSION: &str = "mid";

#[derive(Debug, Error)]
pub enum SerializerError {
    #[error("failed to write recording: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to encode recording: {0}")]
    Encode(String),
    #[error("recording format does not support {0}")]
    Unsupported(String),
}

/// Receives one call per emitted event. Tick values follow the session's
/// tick reference; note onsets are always measured from session start.
pub trait Serializer {
    fn set_tempo(&mut self, bpm: f64);
    fn set_copyright(&mut self, text: &str);
    fn add_note(&mut self, channel: u8, note: u8, onset: f64, duration: f64, velocity: u8);
    fn add_note_on(&mut self, channel: u8, ticks: f64, note: u8, velocity: u8);
    fn add_note_off(&mut self, channel: u8, ticks: f64, note: u8, velocity: u8);
    fn add_control_change(&mut self, channel: u8, ticks: f64, controller: u8, value: u8);
    fn add_program_change(&mut self, channel: u8, ticks: f64, program: u8);
    fn add_pitch_wheel(&mut self, channel: u8, ticks: f64, value: i32);
    fn save(&mut self, path: &Path) -> Result<(), SerializerError>;
}

/// Builds a fresh serializer for each session that gets persisted.
pub trait SerializerFactory: Send + Sync + 'static {
    type Output: Serializer;

    fn create(&self) -> Self::Output;
}

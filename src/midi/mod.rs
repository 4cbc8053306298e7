//! MIDI wire handling for the recorder
//!
//! This module provides:
//! - [`MidiEvent`], the channel messages a session records
//! - [`decode`], turning one datagram into a [`MidiEvent`]
//! - [`PitchConvention`] for presenting pitch wheel values
//!
mod decoder;
mod message;

pub use decoder::decode;
pub use message::{MidiEvent, PitchConvention, PERCUSSION_CHANNEL};

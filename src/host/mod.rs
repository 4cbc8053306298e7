//! Where sessions run
//!
//! The dispatcher decides *which* session a message belongs to; a
//! [`SessionHost`] decides *how* that session is executed.
//!
//! - [`WorkerPool`] gives every session its own thread and mailbox
//! - [`InlineHost`] runs every session on the caller's thread
//!
mod inline;
mod worker;

pub use inline::InlineHost;
pub use worker::{WorkerPool, WORKER_POLL_INTERVAL};

use crate::midi::MidiEvent;
use crate::session::{FinalizeOutcome, Originator, SessionError};
use log::{debug, error};
use std::time::Instant;

pub trait SessionHost {
    /// Hands `event` to the session of `originator`, opening one if needed.
    fn deliver(&mut self, originator: Originator, event: MidiEvent, now: Instant);

    /// Lets sessions close on inactivity and forgets the finished ones.
    fn tick(&mut self, now: Instant);

    /// Finalizes every live session and empties the host.
    fn shutdown(&mut self, now: Instant);

    fn live_sessions(&self) -> usize;
}

/// Logs how a session ended. Failures stop here and never reach other sessions.
pub(crate) fn report(originator: Originator, result: Result<FinalizeOutcome, SessionError>) {
    match result {
        Ok(FinalizeOutcome::Saved { path, events }) => {
            debug!(
                "{} finalized: {} events in {}",
                originator,
                events,
                path.display()
            )
        }
        Ok(FinalizeOutcome::Discarded { events }) => {
            debug!("{} finalized without saving ({} events)", originator, events)
        }
        Err(e) => error!("{}", e),
    }
}

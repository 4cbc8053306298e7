use super::{report, SessionHost};
use crate::midi::MidiEvent;
use crate::serializer::SerializerFactory;
use crate::session::{Originator, Session, SessionConfig, SessionState};
use chrono::Local;
use log::{error, info};
use std::collections::HashMap;
use std::time::Instant;

/// Runs all sessions on the dispatching thread.
pub struct InlineHost<F: SerializerFactory> {
    config: SessionConfig,
    factory: F,
    sessions: HashMap<Originator, Session>,
}

impl<F: SerializerFactory> InlineHost<F> {
    pub fn new(config: SessionConfig, factory: F) -> Self {
        InlineHost {
            config,
            factory,
            sessions: HashMap::new(),
        }
    }

    pub fn session(&self, originator: &Originator) -> Option<&Session> {
        self.sessions.get(originator)
    }
}

impl<F: SerializerFactory> SessionHost for InlineHost<F> {
    fn deliver(&mut self, originator: Originator, event: MidiEvent, now: Instant) {
        let config = &self.config;
        let session = self.sessions.entry(originator).or_insert_with(|| {
            info!("Opening session for {}", originator);
            Session::new(originator, config.clone(), Local::now())
        });
        if let Err(e) = session.ingest(event, now) {
            error!("{}", e);
        }
    }

    fn tick(&mut self, now: Instant) {
        for session in self.sessions.values_mut() {
            if let Some(result) = session.check_idle(now, &self.factory) {
                report(session.originator(), result);
            }
        }
        self.sessions
            .retain(|_, session| session.state() != SessionState::Finalized);
    }

    fn shutdown(&mut self, _now: Instant) {
        for (originator, mut session) in self.sessions.drain() {
            let result = session.finalize(&self.factory);
            report(originator, result);
        }
    }

    fn live_sessions(&self) -> usize {
        self.sessions.len()
    }
}

// dispatcher.rs

use crate::host::SessionHost;
use crate::midi::decode;
use crate::session::Originator;
use log::{info, trace, warn};
use std::net::SocketAddr;
use std::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatcherState {
    Running,
    ShutDown,
}

/// Routes decoded datagrams to per-originator sessions.
///
/// The registry of live sessions lives in the host; every change to it goes
/// through the methods here.
pub struct Dispatcher<H: SessionHost> {
    host: H,
    split_by_sender: bool,
    state: DispatcherState,
}

impl<H: SessionHost> Dispatcher<H> {
    pub fn new(host: H, split_by_sender: bool) -> Self {
        info!(
            "Dispatcher started ({})",
            if split_by_sender {
                "one recording per sender"
            } else {
                "all senders in one recording"
            }
        );
        Dispatcher {
            host,
            split_by_sender,
            state: DispatcherState::Running,
        }
    }

    pub fn state(&self) -> DispatcherState {
        self.state
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn live_sessions(&self) -> usize {
        self.host.live_sessions()
    }

    fn originator(&self, address: SocketAddr) -> Originator {
        if self.split_by_sender {
            Originator::Sender(address)
        } else {
            Originator::Merged
        }
    }

    /// Returns whether the datagram reached a session.
    pub fn on_datagram(&mut self, address: SocketAddr, data: &[u8], now: Instant) -> bool {
        if self.state == DispatcherState::ShutDown {
            warn!("Dropping datagram from {} received after shutdown", address);
            return false;
        }

        let Some(event) = decode(data) else {
            trace!("Ignoring {:02X?} from {}", data, address);
            return false;
        };

        let originator = self.originator(address);
        self.host.deliver(originator, event, now);
        true
    }

    pub fn tick(&mut self, now: Instant) {
        if self.state == DispatcherState::Running {
            self.host.tick(now);
        }
    }

    /// Finalizes every live session. Later datagrams are dropped.
    pub fn shutdown_all(&mut self, now: Instant) {
        if self.state == DispatcherState::ShutDown {
            return;
        }
        info!(
            "Shutting down, finalizing {} sessions",
            self.host.live_sessions()
        );
        self.host.shutdown(now);
        self.state = DispatcherState::ShutDown;
    }
}

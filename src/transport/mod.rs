//! Network input
//!
//! The receiver owns the socket and is the only thread that touches the
//! dispatcher. It wakes at least once per [`RECEIVE_POLL_INTERVAL`] so idle
//! sessions get closed even when nothing arrives.

mod udp;

pub use udp::{UdpReceiver, MAX_DATAGRAM, RECEIVE_POLL_INTERVAL};

pub mod cli;
pub mod clock;
pub mod config;
pub mod dispatcher;
pub mod host;
pub mod logging;
pub mod midi;
pub mod serializer;
pub mod session;
pub mod transport;

pub use cli::Args;
pub use clock::{Resolution, TickClock};
pub use config::{ConfigError, RecorderConfig};
pub use dispatcher::Dispatcher;
pub use host::{InlineHost, SessionHost, WorkerPool};
pub use session::{Originator, Session, SessionConfig};

use super::{report, SessionHost};
use crate::midi::MidiEvent;
use crate::serializer::SerializerFactory;
use crate::session::{Originator, Session, SessionConfig};
use chrono::{DateTime, Local};
use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender};
use log::{debug, error, info, warn};
use std::collections::HashMap;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// How long a worker waits on its mailbox before re-checking inactivity.
pub const WORKER_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// What the dispatcher posts to a session worker
#[derive(Debug, Clone, Copy)]
enum Mail {
    Event {
        event: MidiEvent,
        at: Instant,
        /// Wall-clock arrival, names the recording if this event opens one.
        received: DateTime<Local>,
    },
    Shutdown,
}

impl Mail {
    fn received(&self) -> Option<DateTime<Local>> {
        match self {
            Mail::Event { received, .. } => Some(*received),
            Mail::Shutdown => None,
        }
    }
}

struct Worker {
    mailbox: Sender<Mail>,
    /// Lets the pool collect mail that reached a worker after it exited.
    leftovers: Receiver<Mail>,
    handle: JoinHandle<()>,
}

/// One thread and mailbox per session.
///
/// Workers own their sessions outright; the pool only keeps the mailboxes
/// and join handles, and is itself owned by the dispatching thread.
pub struct WorkerPool<F: SerializerFactory> {
    config: SessionConfig,
    factory: Arc<F>,
    poll_interval: Duration,
    workers: HashMap<Originator, Worker>,
}

impl<F: SerializerFactory> WorkerPool<F> {
    pub fn new(config: SessionConfig, factory: F) -> Self {
        Self::with_poll_interval(config, factory, WORKER_POLL_INTERVAL)
    }

    pub fn with_poll_interval(config: SessionConfig, factory: F, poll_interval: Duration) -> Self {
        WorkerPool {
            config,
            factory: Arc::new(factory),
            poll_interval,
            workers: HashMap::new(),
        }
    }

    fn spawn(&mut self, originator: Originator, opened_at: DateTime<Local>) -> Option<&Worker> {
        let (mailbox, inbox) = channel::unbounded();
        let leftovers = inbox.clone();
        let session = Session::new(originator, self.config.clone(), opened_at);
        let factory = Arc::clone(&self.factory);
        let poll_interval = self.poll_interval;

        let spawned = thread::Builder::new()
            .name(format!("session {}", originator))
            .spawn(move || run_session(session, inbox, factory, poll_interval));
        let handle = match spawned {
            Ok(handle) => handle,
            Err(e) => {
                error!("Could not start thread for {}: {}", originator, e);
                return None;
            }
        };

        info!("Thread for {} started", originator);
        self.workers.insert(
            originator,
            Worker {
                mailbox,
                leftovers,
                handle,
            },
        );
        self.workers.get(&originator)
    }

    /// Joins a finished worker. Mail it never read goes to a fresh worker,
    /// in the order it was posted.
    fn reap(&mut self, originator: Originator) {
        let Some(worker) = self.workers.remove(&originator) else {
            return;
        };
        join(originator, worker.handle);

        let pending: Vec<Mail> = worker.leftovers.try_iter().collect();
        let Some(opened_at) = pending.iter().find_map(Mail::received) else {
            return;
        };
        debug!(
            "{} closed with {} messages queued, starting a new session",
            originator,
            pending.len()
        );
        if let Some(worker) = self.spawn(originator, opened_at) {
            for mail in pending {
                let _ = worker.mailbox.send(mail);
            }
        }
    }

    fn post(&mut self, originator: Originator, mail: Mail) {
        let finished = self
            .workers
            .get(&originator)
            .is_some_and(|worker| worker.handle.is_finished());
        if finished {
            self.reap(originator);
        }

        let worker = if self.workers.contains_key(&originator) {
            self.workers.get(&originator)
        } else {
            let opened_at = mail.received().unwrap_or_else(Local::now);
            self.spawn(originator, opened_at)
        };
        if let Some(worker) = worker {
            // never fails: the pool holds a receiver for every mailbox
            let _ = worker.mailbox.send(mail);
        }
    }
}

fn join(originator: Originator, handle: JoinHandle<()>) {
    if handle.join().is_err() {
        error!("Thread for {} panicked", originator);
    }
}

/// Worker loop: apply mail in arrival order, and between messages let the
/// session close itself once it has been quiet long enough.
fn run_session<F: SerializerFactory>(
    mut session: Session,
    inbox: Receiver<Mail>,
    factory: Arc<F>,
    poll_interval: Duration,
) {
    let originator = session.originator();

    loop {
        if let Some(result) = session.check_idle(Instant::now(), factory.as_ref()) {
            report(originator, result);
            break;
        }

        match inbox.recv_timeout(poll_interval) {
            Ok(Mail::Event { event, at, .. }) => {
                if let Err(e) = session.ingest(event, at) {
                    error!("{}", e);
                }
            }
            Ok(Mail::Shutdown) => {
                report(originator, session.finalize(factory.as_ref()));
                break;
            }
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => {
                warn!("Mailbox for {} disconnected, closing session", originator);
                report(originator, session.finalize(factory.as_ref()));
                break;
            }
        }
    }

    info!("Thread for {} terminating", originator);
}

impl<F: SerializerFactory> SessionHost for WorkerPool<F> {
    fn deliver(&mut self, originator: Originator, event: MidiEvent, now: Instant) {
        self.post(
            originator,
            Mail::Event {
                event,
                at: now,
                received: Local::now(),
            },
        );
    }

    fn tick(&mut self, _now: Instant) {
        let finished: Vec<Originator> = self
            .workers
            .iter()
            .filter(|(_, worker)| worker.handle.is_finished())
            .map(|(originator, _)| *originator)
            .collect();

        for originator in finished {
            self.reap(originator);
        }
    }

    fn shutdown(&mut self, _now: Instant) {
        // a worker that closed on its own right before the shutdown mail leaves
        // it queued; reaping hands it to a new worker, which then finalizes
        while !self.workers.is_empty() {
            for worker in self.workers.values() {
                let _ = worker.mailbox.send(Mail::Shutdown);
            }
            let originators: Vec<Originator> = self.workers.keys().copied().collect();
            for originator in originators {
                self.reap(originator);
            }
        }
    }

    fn live_sessions(&self) -> usize {
        self.workers.len()
    }
}

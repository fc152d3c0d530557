// src/device/stream.rs

//! Device streams: FIFO queues of asynchronous operations.

use std::fmt;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

use crate::engine::Completion;
use crate::errors::{BackendFailure, Result};

/// One operation executed in stream order.
pub type StreamOp = Box<dyn FnOnce() -> std::result::Result<(), BackendFailure> + Send + 'static>;

/// Contract a device backend fulfils.
///
/// Operations run in enqueue order. An event recorded after an operation
/// fires once every operation enqueued before it has finished.
pub trait DeviceStream: Send + Sync {
    fn name(&self) -> &str;

    fn enqueue(&self, op: StreamOp) -> std::result::Result<(), BackendFailure>;

    fn record_event(&self) -> std::result::Result<StreamEvent, BackendFailure>;

    /// Block until everything enqueued so far has finished.
    fn synchronize(&self) -> std::result::Result<(), BackendFailure> {
        self.record_event()?.wait()
    }
}

pub type SharedStream = Arc<dyn DeviceStream>;

#[derive(Debug, Clone, PartialEq, Eq)]
enum EventState {
    Pending,
    Complete,
    Failed(BackendFailure),
}

#[derive(Debug)]
struct EventInner {
    state: Mutex<EventState>,
    fired: Condvar,
}

/// Marker in a stream. Cheap to clone; all clones observe the same firing.
#[derive(Debug, Clone)]
pub struct StreamEvent {
    inner: Arc<EventInner>,
}

impl StreamEvent {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(EventInner {
                state: Mutex::new(EventState::Pending),
                fired: Condvar::new(),
            }),
        }
    }

    /// An event that has already fired.
    pub fn completed() -> Self {
        let ev = Self::new();
        ev.fire(Ok(()));
        ev
    }

    pub fn fire(&self, outcome: std::result::Result<(), BackendFailure>) {
        let mut state = lock(&self.inner.state);
        if *state != EventState::Pending {
            return;
        }
        *state = match outcome {
            Ok(()) => EventState::Complete,
            Err(e) => EventState::Failed(e),
        };
        self.inner.fired.notify_all();
    }

    /// Non-blocking: `Ok(true)` once fired, the failure if an earlier
    /// operation failed.
    pub fn query(&self) -> std::result::Result<bool, BackendFailure> {
        match &*lock(&self.inner.state) {
            EventState::Pending => Ok(false),
            EventState::Complete => Ok(true),
            EventState::Failed(e) => Err(e.clone()),
        }
    }

    pub fn wait(&self) -> std::result::Result<(), BackendFailure> {
        let mut state = lock(&self.inner.state);
        loop {
            match &*state {
                EventState::Pending => {
                    state = self
                        .inner
                        .fired
                        .wait(state)
                        .unwrap_or_else(PoisonError::into_inner);
                }
                EventState::Complete => return Ok(()),
                EventState::Failed(e) => return Err(e.clone()),
            }
        }
    }
}

impl Default for StreamEvent {
    fn default() -> Self {
        Self::new()
    }
}

impl Completion for StreamEvent {
    fn poll(&mut self) -> std::result::Result<bool, BackendFailure> {
        self.query()
    }
}

enum StreamCommand {
    Op(StreamOp),
    Event(StreamEvent),
}

/// Stream backed by a dedicated thread.
///
/// Every operation is delayed by `latency` before it runs, which makes
/// missing completion waits show up as wrong data in tests. A failed
/// operation poisons the stream: every event recorded after it reports the
/// failure, so the task that enqueued the operation always sees it even when
/// other tasks record events on the same stream in between.
pub struct SimStream {
    name: String,
    tx: Option<mpsc::UnboundedSender<StreamCommand>>,
    thread: Option<JoinHandle<()>>,
}

impl SimStream {
    pub fn new(name: impl Into<String>, latency: Duration) -> Result<Self> {
        let name = name.into();
        let (tx, mut rx) = mpsc::unbounded_channel::<StreamCommand>();

        let thread_name = format!("stream-{name}");
        let log_name = name.clone();
        let thread = thread::Builder::new().name(thread_name).spawn(move || {
            let mut failure: Option<BackendFailure> = None;
            let mut executed = 0u64;
            while let Some(cmd) = rx.blocking_recv() {
                match cmd {
                    StreamCommand::Op(op) => {
                        if !latency.is_zero() {
                            thread::sleep(latency);
                        }
                        executed += 1;
                        if let Err(e) = op() {
                            warn!(stream = %log_name, error = %e, "stream operation failed");
                            failure.get_or_insert(e);
                        }
                    }
                    StreamCommand::Event(ev) => match &failure {
                        Some(e) => ev.fire(Err(e.clone())),
                        None => ev.fire(Ok(())),
                    },
                }
            }
            debug!(stream = %log_name, executed, "stream thread finished");
        })?;

        Ok(Self {
            name,
            tx: Some(tx),
            thread: Some(thread),
        })
    }

    pub fn shared(name: impl Into<String>, latency: Duration) -> Result<SharedStream> {
        Ok(Arc::new(Self::new(name, latency)?))
    }

    fn send(&self, cmd: StreamCommand) -> std::result::Result<(), BackendFailure> {
        let closed = || BackendFailure::Device(format!("stream '{}' is closed", self.name));
        let tx = self.tx.as_ref().ok_or_else(closed)?;
        tx.send(cmd).map_err(|_| closed())
    }
}

impl DeviceStream for SimStream {
    fn name(&self) -> &str {
        &self.name
    }

    fn enqueue(&self, op: StreamOp) -> std::result::Result<(), BackendFailure> {
        trace!(stream = %self.name, "enqueue");
        self.send(StreamCommand::Op(op))
    }

    fn record_event(&self) -> std::result::Result<StreamEvent, BackendFailure> {
        let ev = StreamEvent::new();
        self.send(StreamCommand::Event(ev.clone()))?;
        Ok(ev)
    }
}

impl Drop for SimStream {
    fn drop(&mut self) {
        // Closing the channel lets the thread drain and exit.
        self.tx.take();
        let Some(thread) = self.thread.take() else {
            return;
        };
        if thread.thread().id() == thread::current().id() {
            return;
        }
        if thread.join().is_err() {
            warn!(stream = %self.name, "stream thread panicked");
        }
    }
}

impl fmt::Debug for SimStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SimStream")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

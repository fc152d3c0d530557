// src/comm/transport.rs

//! Non-blocking point-to-point messaging.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

use crate::engine::Completion;
use crate::errors::{BackendFailure, Result, SchedError};

pub type Rank = usize;
pub type Tag = u32;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("rank {rank} is outside a world of {size}")]
    NoSuchRank { rank: Rank, size: usize },

    #[error("transport is shut down")]
    Closed,

    #[error("receive completed without a payload")]
    MissingPayload,
}

impl From<TransportError> for BackendFailure {
    fn from(e: TransportError) -> Self {
        BackendFailure::Transport(e.to_string())
    }
}

impl From<TransportError> for SchedError {
    fn from(e: TransportError) -> Self {
        SchedError::Backend(e.into())
    }
}

/// Contract a message-passing backend fulfils.
///
/// Messages between the same pair of ranks with the same tag are matched in
/// the order they were sent.
pub trait Transport: Send + Sync {
    fn rank(&self) -> Rank;

    fn world_size(&self) -> usize;

    fn isend(
        &self,
        dst: Rank,
        tag: Tag,
        payload: Vec<u8>,
    ) -> std::result::Result<Request, TransportError>;

    fn irecv(&self, src: Rank, tag: Tag) -> std::result::Result<Request, TransportError>;
}

pub type SharedTransport = Arc<dyn Transport>;

#[derive(Debug)]
enum RequestState {
    Pending,
    Complete(Option<Vec<u8>>),
    Failed(TransportError),
}

#[derive(Debug)]
struct RequestInner {
    state: Mutex<RequestState>,
    done: Condvar,
}

/// Handle to an outstanding send or receive. Clones share the outcome.
#[derive(Debug, Clone)]
pub struct Request {
    inner: Arc<RequestInner>,
}

impl Request {
    fn pending() -> Self {
        Self {
            inner: Arc::new(RequestInner {
                state: Mutex::new(RequestState::Pending),
                done: Condvar::new(),
            }),
        }
    }

    fn complete(&self, outcome: std::result::Result<Option<Vec<u8>>, TransportError>) {
        let mut state = lock(&self.inner.state);
        if !matches!(*state, RequestState::Pending) {
            return;
        }
        *state = match outcome {
            Ok(payload) => RequestState::Complete(payload),
            Err(e) => RequestState::Failed(e),
        };
        self.inner.done.notify_all();
    }

    /// Non-blocking completion check.
    pub fn test(&self) -> std::result::Result<bool, TransportError> {
        match &*lock(&self.inner.state) {
            RequestState::Pending => Ok(false),
            RequestState::Complete(_) => Ok(true),
            RequestState::Failed(e) => Err(e.clone()),
        }
    }

    pub fn wait(&self) -> std::result::Result<(), TransportError> {
        let mut state = lock(&self.inner.state);
        loop {
            match &*state {
                RequestState::Pending => {
                    state = self
                        .inner
                        .done
                        .wait(state)
                        .unwrap_or_else(PoisonError::into_inner);
                }
                RequestState::Complete(_) => return Ok(()),
                RequestState::Failed(e) => return Err(e.clone()),
            }
        }
    }

    /// Received bytes of a completed receive. Yields them once.
    pub fn take_payload(&self) -> Option<Vec<u8>> {
        match &mut *lock(&self.inner.state) {
            RequestState::Complete(payload) => payload.take(),
            _ => None,
        }
    }
}

impl Completion for Request {
    fn poll(&mut self) -> std::result::Result<bool, BackendFailure> {
        Ok(self.test()?)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct Envelope {
    src: Rank,
    dst: Rank,
    tag: Tag,
}

#[derive(Debug, Default)]
struct Slot {
    arrived: VecDeque<Vec<u8>>,
    posted: VecDeque<Request>,
}

#[derive(Debug, Default)]
struct Fabric {
    slots: Mutex<HashMap<Envelope, Slot>>,
}

impl Fabric {
    fn deliver(&self, env: Envelope, payload: Vec<u8>) {
        let mut slots = lock(&self.slots);
        let slot = slots.entry(env).or_default();
        match slot.posted.pop_front() {
            Some(recv) => recv.complete(Ok(Some(payload))),
            None => slot.arrived.push_back(payload),
        }
    }

    fn post(&self, env: Envelope, recv: &Request) {
        let mut slots = lock(&self.slots);
        let slot = slots.entry(env).or_default();
        match slot.arrived.pop_front() {
            Some(payload) => recv.complete(Ok(Some(payload))),
            None => slot.posted.push_back(recv.clone()),
        }
    }
}

struct Delivery {
    env: Envelope,
    payload: Vec<u8>,
    send: Request,
}

/// Joins the delivery thread once the last rank handle is gone.
struct DeliveryThread {
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl Drop for DeliveryThread {
    fn drop(&mut self) {
        let handle = lock(&self.handle).take();
        if let Some(handle) = handle
            && handle.join().is_err()
        {
            warn!("loopback delivery thread panicked");
        }
    }
}

/// In-process transport connecting the ranks of one simulated world.
///
/// Sends are handed to a delivery thread which holds every message for
/// `latency` before matching it against posted receives. A send completes
/// once its message is delivered; a receive once a message is matched.
pub struct LoopbackTransport {
    rank: Rank,
    size: usize,
    fabric: Arc<Fabric>,
    // Field order matters: the sender closes before the last handle joins
    // the delivery thread.
    tx: mpsc::UnboundedSender<Delivery>,
    _delivery: Arc<DeliveryThread>,
}

impl LoopbackTransport {
    /// One handle per rank of a world of `size` ranks.
    pub fn world(size: usize, latency: Duration) -> Result<Vec<LoopbackTransport>> {
        let fabric = Arc::new(Fabric::default());
        let (tx, mut rx) = mpsc::unbounded_channel::<Delivery>();

        let thread_fabric = Arc::clone(&fabric);
        let handle = thread::Builder::new()
            .name("loopback-delivery".to_string())
            .spawn(move || {
                let mut delivered = 0u64;
                while let Some(msg) = rx.blocking_recv() {
                    if !latency.is_zero() {
                        thread::sleep(latency);
                    }
                    trace!(
                        src = msg.env.src,
                        dst = msg.env.dst,
                        tag = msg.env.tag,
                        bytes = msg.payload.len(),
                        "deliver"
                    );
                    thread_fabric.deliver(msg.env, msg.payload);
                    msg.send.complete(Ok(None));
                    delivered += 1;
                }
                debug!(delivered, "loopback delivery thread finished");
            })?;

        let delivery = Arc::new(DeliveryThread {
            handle: Mutex::new(Some(handle)),
        });

        Ok((0..size)
            .map(|rank| LoopbackTransport {
                rank,
                size,
                fabric: Arc::clone(&fabric),
                tx: tx.clone(),
                _delivery: Arc::clone(&delivery),
            })
            .collect())
    }

    fn check_rank(&self, rank: Rank) -> std::result::Result<(), TransportError> {
        if rank < self.size {
            Ok(())
        } else {
            Err(TransportError::NoSuchRank {
                rank,
                size: self.size,
            })
        }
    }
}

impl Transport for LoopbackTransport {
    fn rank(&self) -> Rank {
        self.rank
    }

    fn world_size(&self) -> usize {
        self.size
    }

    fn isend(
        &self,
        dst: Rank,
        tag: Tag,
        payload: Vec<u8>,
    ) -> std::result::Result<Request, TransportError> {
        self.check_rank(dst)?;
        let send = Request::pending();
        let env = Envelope {
            src: self.rank,
            dst,
            tag,
        };
        self.tx
            .send(Delivery {
                env,
                payload,
                send: send.clone(),
            })
            .map_err(|_| TransportError::Closed)?;
        Ok(send)
    }

    fn irecv(&self, src: Rank, tag: Tag) -> std::result::Result<Request, TransportError> {
        self.check_rank(src)?;
        let recv = Request::pending();
        let env = Envelope {
            src,
            dst: self.rank,
            tag,
        };
        self.fabric.post(env, &recv);
        Ok(recv)
    }
}

impl fmt::Debug for LoopbackTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoopbackTransport")
            .field("rank", &self.rank)
            .field("size", &self.size)
            .finish_non_exhaustive()
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

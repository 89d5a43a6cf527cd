//! Thread-safe ingress for native callbacks.
//!
//! The native library may invoke its callback re-entrantly inside `call`
//! or from a worker thread it owns. Neither may touch correlator state, so
//! every delivery is copied into a [`CallbackEvent`] and pushed onto a
//! channel. The owning thread drains the [`CallbackQueue`] and is the only
//! place callbacks are applied.
//!
//! Deliveries from foreign threads go through a bounded lane and block while
//! it is full. Deliveries made on the owning thread itself (re-entrant
//! callbacks inside `call`) go through an unbounded lane: the owner cannot
//! drain the queue while it is producing into it.

use callbridge_types::RequestId;
use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender};
use std::thread::{self, ThreadId};
use std::time::Duration;
use tracing::trace;

/// One raw notification from the native library.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallbackEvent {
    /// Request the notification belongs to.
    pub request_id: RequestId,
    /// Serialized JSON payload, possibly empty.
    pub payload: Vec<u8>,
    /// Raw response kind code.
    pub kind: u32,
    /// Whether the native side considers the request finished.
    pub finished: bool,
}

impl CallbackEvent {
    /// Create an event from raw callback arguments.
    pub fn new(request_id: RequestId, payload: impl Into<Vec<u8>>, kind: u32, finished: bool) -> Self {
        Self {
            request_id,
            payload: payload.into(),
            kind,
            finished,
        }
    }
}

/// Producer half handed to the native gateway.
///
/// Cheap to clone and safe to move onto foreign threads.
#[derive(Debug, Clone)]
pub struct CallbackSink {
    owner: ThreadId,
    /// Re-entrant deliveries from the owning thread.
    local: Sender<CallbackEvent>,
    /// Deliveries from foreign threads.
    tx: Sender<CallbackEvent>,
}

impl CallbackSink {
    /// Queue a callback delivery.
    ///
    /// On a foreign thread this blocks while the bounded lane is full. On the
    /// owning thread it never blocks. Returns `false` if the owning client
    /// has been dropped, in which case the delivery is discarded.
    pub fn deliver(
        &self,
        request_id: u32,
        params_json: &[u8],
        response_kind: u32,
        finished: bool,
    ) -> bool {
        let event = CallbackEvent::new(
            RequestId(request_id),
            params_json.to_vec(),
            response_kind,
            finished,
        );
        let lane = if thread::current().id() == self.owner {
            &self.local
        } else {
            &self.tx
        };
        match lane.send(event) {
            Ok(()) => true,
            Err(_) => {
                trace!(request_id, "Callback queue closed, dropping delivery");
                false
            }
        }
    }
}

/// Consumer half, owned by the client thread.
#[derive(Debug)]
pub struct CallbackQueue {
    local: Receiver<CallbackEvent>,
    rx: Receiver<CallbackEvent>,
}

impl CallbackQueue {
    /// Take every event queued so far without blocking.
    ///
    /// Re-entrant deliveries come first, then foreign ones; each lane keeps
    /// arrival order.
    pub fn drain(&self) -> impl Iterator<Item = CallbackEvent> + '_ {
        self.local.try_iter().chain(self.rx.try_iter())
    }

    /// Wait up to `timeout` for the next event.
    ///
    /// Returns `Ok(None)` on timeout.
    pub fn wait(&self, timeout: Duration) -> Result<Option<CallbackEvent>, Disconnected> {
        // Only the owner fills the local lane, and it is not producing while it waits.
        if let Ok(event) = self.local.try_recv() {
            return Ok(Some(event));
        }
        match self.rx.recv_timeout(timeout) {
            Ok(event) => Ok(Some(event)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => Err(Disconnected),
        }
    }

    /// Number of events waiting to be applied.
    pub fn len(&self) -> usize {
        self.local.len() + self.rx.len()
    }

    /// Check if nothing is waiting.
    pub fn is_empty(&self) -> bool {
        self.local.is_empty() && self.rx.is_empty()
    }
}

/// Every sink has been dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Disconnected;

/// Create a callback channel owned by the calling thread.
///
/// `capacity` bounds the foreign-thread lane. A capacity of zero is raised
/// to one; a rendezvous channel would block the native library on every
/// delivery.
pub fn callback_channel(capacity: usize) -> (CallbackSink, CallbackQueue) {
    let (local_tx, local_rx) = channel::unbounded();
    let (tx, rx) = channel::bounded(capacity.max(1));
    let sink = CallbackSink {
        owner: thread::current().id(),
        local: local_tx,
        tx,
    };
    (sink, CallbackQueue { local: local_rx, rx })
}

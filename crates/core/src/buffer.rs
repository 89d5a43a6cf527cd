//! Accumulated result state for one request.

use callbridge_types::{ClientError, Payload, ProtocolViolation, RequestId};
use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

/// Result state for one request identifier.
///
/// Holds either a single final payload (replaced on every write) or an
/// ordered queue of streamed events, plus the `finished` flag. Once finished
/// the buffer rejects every further mutation.
#[derive(Debug)]
pub struct ResultBuffer {
    request_id: RequestId,
    payload: Payload,
    events: VecDeque<Payload>,
    finished: bool,
    /// Terminal error for a stream that was already handed to a consumer.
    failure: Option<ClientError>,
}

impl ResultBuffer {
    /// Create a buffer holding a full payload.
    pub fn with_payload(request_id: RequestId, payload: Payload, finished: bool) -> Self {
        Self {
            request_id,
            payload,
            events: VecDeque::new(),
            finished,
            failure: None,
        }
    }

    /// Create an empty, unfinished buffer for streamed events.
    pub fn streaming(request_id: RequestId) -> Self {
        Self::with_payload(request_id, Payload::Null, false)
    }

    /// Create an empty buffer that is already finished.
    pub fn empty_finished(request_id: RequestId) -> Self {
        Self::with_payload(request_id, Payload::Null, true)
    }

    /// Request this buffer belongs to.
    pub fn request_id(&self) -> RequestId {
        self.request_id
    }

    /// Last known full payload.
    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    /// Check if the buffer accepts no further mutation.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Number of queued events not yet pulled.
    pub fn queued_events(&self) -> usize {
        self.events.len()
    }

    /// Replace the full payload.
    pub fn replace_payload(&mut self, payload: Payload) -> Result<(), ProtocolViolation> {
        self.ensure_open()?;
        self.payload = payload;
        Ok(())
    }

    /// Append a streamed event.
    pub fn push_event(&mut self, event: Payload) -> Result<(), ProtocolViolation> {
        self.ensure_open()?;
        self.events.push_back(event);
        Ok(())
    }

    /// Mark the buffer finished. Idempotent.
    pub fn finish(&mut self) {
        self.finished = true;
    }

    /// Store a terminal error and finish the buffer.
    ///
    /// Returns `false` without storing anything if the buffer is already
    /// finished: its consumer has seen (or will see) a clean end.
    pub fn fail(&mut self, error: ClientError) -> bool {
        if self.finished {
            return false;
        }
        self.failure = Some(error);
        self.finished = true;
        true
    }

    /// Pull the next item for a stream consumer.
    ///
    /// Queued events are delivered in arrival order before a stored failure;
    /// the failure is handed out once.
    pub fn pull(&mut self) -> Pull {
        if let Some(event) = self.events.pop_front() {
            return Pull::Event(event);
        }
        if let Some(error) = self.failure.take() {
            return Pull::Failed(error);
        }
        if self.finished {
            Pull::Exhausted
        } else {
            Pull::Empty
        }
    }

    fn ensure_open(&self) -> Result<(), ProtocolViolation> {
        if self.finished {
            Err(ProtocolViolation::BufferFinished(self.request_id))
        } else {
            Ok(())
        }
    }
}

/// Result of pulling from a [`ResultBuffer`].
#[derive(Debug, Clone, PartialEq)]
pub enum Pull {
    /// Next event in arrival order.
    Event(Payload),
    /// The stream failed; reported once.
    Failed(ClientError),
    /// Finished and fully drained.
    Exhausted,
    /// Nothing queued yet, more may arrive.
    Empty,
}

/// Shared handle to a [`ResultBuffer`].
///
/// The correlator writes through one handle while the consumer reads
/// through another. Both live on the owning thread, so the handle is
/// deliberately `!Send`.
#[derive(Debug, Clone)]
pub struct BufferHandle {
    inner: Rc<RefCell<ResultBuffer>>,
}

impl BufferHandle {
    /// Wrap a buffer for sharing.
    pub fn new(buffer: ResultBuffer) -> Self {
        Self {
            inner: Rc::new(RefCell::new(buffer)),
        }
    }

    /// Request this buffer belongs to.
    pub fn request_id(&self) -> RequestId {
        self.inner.borrow().request_id()
    }

    /// Clone of the last known full payload.
    pub fn payload(&self) -> Payload {
        self.inner.borrow().payload().clone()
    }

    /// Check if the buffer is finished.
    pub fn is_finished(&self) -> bool {
        self.inner.borrow().is_finished()
    }

    /// Number of queued events not yet pulled.
    pub fn queued_events(&self) -> usize {
        self.inner.borrow().queued_events()
    }

    /// Pull the next item. See [`ResultBuffer::pull`].
    pub fn pull(&self) -> Pull {
        self.inner.borrow_mut().pull()
    }

    pub(crate) fn replace_payload(&self, payload: Payload) -> Result<(), ProtocolViolation> {
        self.inner.borrow_mut().replace_payload(payload)
    }

    pub(crate) fn push_event(&self, event: Payload) -> Result<(), ProtocolViolation> {
        self.inner.borrow_mut().push_event(event)
    }

    pub(crate) fn finish(&self) {
        self.inner.borrow_mut().finish();
    }

    pub(crate) fn fail(&self, error: ClientError) -> bool {
        self.inner.borrow_mut().fail(error)
    }
}

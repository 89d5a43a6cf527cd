//! Live event streams.
//!
//! A [`StreamHandle`] is returned by [`Client::subscribe`]. Its
//! [`EventStream`] yields streamed events in arrival order, blocking with
//! adaptive backoff while the native side is quiet, and ends once the
//! request is finished and every queued event has been read.

use crate::Client;
use callbridge_core::{FutureState, PendingFuture, PollScheduler, Pull};
use callbridge_types::{ClientError, Payload, RequestId};
use std::cell::Cell;
use std::rc::Rc;
use std::task::Poll;
use tracing::trace;

/// Handle to a streaming request.
#[derive(Debug)]
pub struct StreamHandle<'c> {
    client: &'c Client,
    future: PendingFuture,
    /// Set once any of this handle's streams reached the end.
    exhausted: Rc<Cell<bool>>,
}

impl<'c> StreamHandle<'c> {
    pub(crate) fn new(client: &'c Client, future: PendingFuture) -> Self {
        Self {
            client,
            future,
            exhausted: Rc::new(Cell::new(false)),
        }
    }

    /// Identifier of the underlying request.
    pub fn request_id(&self) -> RequestId {
        self.future.request_id()
    }

    /// Check if the stream has been read to the end.
    pub fn is_exhausted(&self) -> bool {
        self.exhausted.get()
    }

    /// Stop the stream. See [`Client::unsubscribe`].
    pub fn unsubscribe(&self) -> bool {
        self.client.unsubscribe(self.request_id())
    }

    /// Iterate over the events.
    ///
    /// Every call continues where the previous stream left off; once the
    /// end was reached, new streams are empty.
    pub fn events(&self) -> EventStream<'c> {
        let state = if self.exhausted.get() {
            StreamState::Finished
        } else {
            StreamState::Open
        };
        EventStream {
            client: self.client,
            future: self.future.clone(),
            exhausted: Rc::clone(&self.exhausted),
            scheduler: self.client.poll_scheduler(),
            state,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StreamState {
    Open,
    Finished,
}

/// Blocking iterator over a request's streamed events.
///
/// Yields `Ok(payload)` per event. A failure of the request is yielded once
/// as `Err`, after which the stream ends.
#[derive(Debug)]
pub struct EventStream<'c> {
    client: &'c Client,
    future: PendingFuture,
    exhausted: Rc<Cell<bool>>,
    scheduler: PollScheduler,
    state: StreamState,
}

impl EventStream<'_> {
    /// Try to take the next item without blocking.
    ///
    /// `Poll::Pending` means nothing is available yet and the stream is
    /// still open. `Poll::Ready(None)` means the stream has ended.
    pub fn poll_next(&mut self) -> Poll<Option<Result<Payload, ClientError>>> {
        if self.state == StreamState::Finished {
            return Poll::Ready(None);
        }
        self.client.pump();

        match self.future.state() {
            FutureState::Pending => Poll::Pending,
            FutureState::Rejected(error) => self.fail(error),
            FutureState::Resolved(buffer) => match buffer.pull() {
                Pull::Event(event) => Poll::Ready(Some(Ok(event))),
                Pull::Failed(error) => self.fail(error),
                Pull::Exhausted => {
                    self.finish();
                    Poll::Ready(None)
                }
                Pull::Empty => Poll::Pending,
            },
        }
    }

    fn fail(&mut self, error: ClientError) -> Poll<Option<Result<Payload, ClientError>>> {
        self.finish();
        Poll::Ready(Some(Err(error)))
    }

    fn finish(&mut self) {
        self.state = StreamState::Finished;
        self.exhausted.set(true);
    }
}

impl Iterator for EventStream<'_> {
    type Item = Result<Payload, ClientError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            match self.poll_next() {
                Poll::Ready(item) => {
                    self.scheduler.on_data();
                    return item;
                }
                Poll::Pending => {
                    let delay = self.scheduler.on_empty();
                    trace!(
                        request_id = %self.future.request_id(),
                        ?delay,
                        empty_polls = self.scheduler.empty_polls(),
                        "Waiting for stream events"
                    );
                    self.client.wait_for_callbacks(delay);
                }
            }
        }
    }
}

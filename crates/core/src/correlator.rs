//! Request correlator.
//!
//! Owns the `RequestId` -> (pending future, result buffer) mapping and is
//! the single place native callbacks are applied. The correlator is a
//! synchronous state machine: it never blocks, sleeps or performs I/O, and
//! it is only ever driven from the client's owning thread.
//!
//! # Callback dispatch
//!
//! | Kind       | Effect                                                          |
//! |------------|-----------------------------------------------------------------|
//! | `Success`  | Create or replace the payload; terminal when `finished`         |
//! | `Error`    | Reject with the native error; always terminal                   |
//! | `Custom(_)`| Queue a streamed event; first one resolves the future           |
//! | `Nop`      | Terminal when `finished`, otherwise nothing                     |
//! | other code | Protocol violation; request rejected and released               |

use crate::{BufferHandle, CallbackEvent, PendingFuture, RequestIdAllocator, ResultBuffer};
use callbridge_types::{ClientError, NativeError, Payload, ProtocolViolation, RequestId, ResponseKind};
use indexmap::IndexMap;
use std::fmt;
use tracing::{debug, error, trace, warn};

/// How the caller intends to consume a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallMode {
    /// Await one settled result.
    SingleShot,
    /// Consume a live event stream; may be unsubscribed.
    Streaming,
}

impl fmt::Display for CallMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallMode::SingleShot => write!(f, "single-shot"),
            CallMode::Streaming => write!(f, "streaming"),
        }
    }
}

/// Effect of applying one callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackOutcome {
    /// Buffer updated, request still in flight.
    Progress,
    /// Streamed event queued.
    Streamed,
    /// Terminal success; slot released.
    Resolved,
    /// Terminal failure; slot released.
    Rejected,
    /// No registered request; tolerated no-op.
    Ignored,
}

/// Diagnostic counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CorrelatorStats {
    /// Requests registered.
    pub dispatched: u64,
    /// Requests released after a successful terminal callback.
    pub resolved: u64,
    /// Requests released with an error.
    pub rejected: u64,
    /// Streaming requests released by the consumer.
    pub unsubscribed: u64,
    /// Callbacks for unknown or already released requests.
    pub late_callbacks: u64,
    /// Protocol violations observed.
    pub protocol_violations: u64,
}

/// Registered in-flight request.
#[derive(Debug)]
struct PendingRequest {
    function: String,
    mode: CallMode,
    future: PendingFuture,
    /// Created lazily by the first payload-bearing callback.
    buffer: Option<BufferHandle>,
}

/// Correlates dispatched calls with their callbacks.
#[derive(Debug, Default)]
pub struct Correlator {
    allocator: RequestIdAllocator,
    /// In-flight requests in dispatch order.
    pending: IndexMap<RequestId, PendingRequest>,
    stats: CorrelatorStats,
}

impl Correlator {
    /// Create an empty correlator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a correlator with a custom identifier allocator.
    pub fn with_allocator(allocator: RequestIdAllocator) -> Self {
        Self {
            allocator,
            ..Default::default()
        }
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Registration
    // ═══════════════════════════════════════════════════════════════════════

    /// Allocate an identifier and register a pending request.
    ///
    /// Must complete before the native call is issued so that no callback
    /// can observe an unregistered identifier.
    pub fn register(&mut self, function: &str, mode: CallMode) -> PendingFuture {
        let pending = &self.pending;
        let request_id = self.allocator.allocate(|id| pending.contains_key(&id));
        let future = PendingFuture::new(request_id);

        self.pending.insert(
            request_id,
            PendingRequest {
                function: function.to_owned(),
                mode,
                future: future.clone(),
                buffer: None,
            },
        );
        self.stats.dispatched += 1;

        debug!(request_id = %request_id, function, %mode, "Registered request");
        future
    }

    /// Release a streaming request before it finishes.
    ///
    /// Already queued events stay readable; the stream then ends. Later
    /// callbacks for the identifier become no-ops. Returns `false` if the
    /// request is unknown or single-shot.
    pub fn unsubscribe(&mut self, request_id: RequestId) -> bool {
        match self.pending.get(&request_id) {
            None => {
                debug!(request_id = %request_id, "Unsubscribe for unknown request ignored");
                return false;
            }
            Some(entry) if entry.mode == CallMode::SingleShot => {
                warn!(
                    request_id = %request_id,
                    function = %entry.function,
                    "Single-shot requests cannot be unsubscribed"
                );
                return false;
            }
            Some(_) => {}
        }

        let Some(entry) = self.pending.shift_remove(&request_id) else {
            return false;
        };
        let buffer = entry
            .buffer
            .unwrap_or_else(|| BufferHandle::new(ResultBuffer::streaming(request_id)));
        buffer.finish();
        if entry.future.is_pending() {
            self.settle(&entry.future, Ok(buffer));
        }
        self.stats.unsubscribed += 1;

        debug!(request_id = %request_id, function = %entry.function, "Unsubscribed");
        true
    }

    /// Reject every in-flight request with `error` and release them all.
    ///
    /// Returns the number of requests released.
    pub fn fail_all(&mut self, error: ClientError) -> usize {
        let entries: Vec<_> = self.pending.drain(..).collect();
        let released = entries.len();
        for (request_id, entry) in entries {
            debug!(request_id = %request_id, function = %entry.function, %error, "Releasing in-flight request");
            if self.settle_failure(entry, error.clone()).is_some() {
                trace!(request_id = %request_id, "Stream already finished");
            }
        }
        released
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Callback ingress
    // ═══════════════════════════════════════════════════════════════════════

    /// Apply one native callback.
    ///
    /// Callbacks for unknown or released identifiers are tolerated no-ops.
    /// An unknown response kind rejects and releases the request, then
    /// returns the violation.
    pub fn on_callback(&mut self, event: CallbackEvent) -> Result<CallbackOutcome, ProtocolViolation> {
        let CallbackEvent {
            request_id,
            payload,
            kind,
            finished,
        } = event;

        if !self.pending.contains_key(&request_id) {
            self.stats.late_callbacks += 1;
            debug!(
                request_id = %request_id,
                kind,
                finished,
                "Callback for unknown or released request ignored"
            );
            return Ok(CallbackOutcome::Ignored);
        }

        let Some(kind) = ResponseKind::from_code(kind) else {
            let violation = ProtocolViolation::UnknownResponseKind { request_id, kind };
            self.release_with_error(request_id, ClientError::Protocol(violation.clone()));
            return Err(self.violation(violation));
        };

        trace!(request_id = %request_id, %kind, finished, bytes = payload.len(), "Callback");

        let payload = match kind {
            ResponseKind::Nop => Payload::Null,
            _ => match decode_payload(&payload) {
                Ok(payload) => payload,
                Err(reason) => {
                    warn!(request_id = %request_id, %kind, %reason, "Malformed callback payload");
                    self.release_with_error(request_id, ClientError::Transport { request_id, reason });
                    return Ok(CallbackOutcome::Rejected);
                }
            },
        };

        match kind {
            ResponseKind::Success => self.on_success(request_id, payload, finished),
            ResponseKind::Error => Ok(self.on_error(request_id, payload)),
            ResponseKind::Nop => Ok(self.on_nop(request_id, finished)),
            ResponseKind::Custom(_) => self.on_custom(request_id, payload, finished),
        }
    }

    fn on_success(
        &mut self,
        request_id: RequestId,
        payload: Payload,
        finished: bool,
    ) -> Result<CallbackOutcome, ProtocolViolation> {
        let Some(entry) = self.pending.get_mut(&request_id) else {
            return Ok(CallbackOutcome::Ignored);
        };

        let replaced = match &entry.buffer {
            Some(buffer) => buffer.replace_payload(payload),
            None => {
                entry.buffer = Some(BufferHandle::new(ResultBuffer::with_payload(
                    request_id, payload, false,
                )));
                Ok(())
            }
        };

        let outcome = if finished {
            self.complete(request_id);
            CallbackOutcome::Resolved
        } else {
            CallbackOutcome::Progress
        };

        replaced.map(|_| outcome).map_err(|v| self.violation(v))
    }

    fn on_error(&mut self, request_id: RequestId, payload: Payload) -> CallbackOutcome {
        let error = NativeError::from_payload(&payload);
        debug!(
            request_id = %request_id,
            code = error.code,
            message = %error.message,
            "Request failed with native error"
        );
        self.release_with_error(request_id, ClientError::Native(error));
        CallbackOutcome::Rejected
    }

    fn on_nop(&mut self, request_id: RequestId, finished: bool) -> CallbackOutcome {
        if finished {
            self.complete(request_id);
            CallbackOutcome::Resolved
        } else {
            CallbackOutcome::Progress
        }
    }

    fn on_custom(
        &mut self,
        request_id: RequestId,
        payload: Payload,
        finished: bool,
    ) -> Result<CallbackOutcome, ProtocolViolation> {
        let Some(entry) = self.pending.get_mut(&request_id) else {
            return Ok(CallbackOutcome::Ignored);
        };

        let buffer = entry
            .buffer
            .get_or_insert_with(|| BufferHandle::new(ResultBuffer::streaming(request_id)))
            .clone();
        let future = entry.future.clone();

        let pushed = buffer.push_event(payload);
        if future.is_pending() {
            // The first streamed event turns the future into a live handle.
            self.settle(&future, Ok(buffer.clone()));
        }
        if finished {
            buffer.finish();
        }

        pushed
            .map(|_| CallbackOutcome::Streamed)
            .map_err(|v| self.violation(v))
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Settlement
    // ═══════════════════════════════════════════════════════════════════════

    /// Finish the buffer, resolve the future if still pending and release.
    fn complete(&mut self, request_id: RequestId) {
        let Some(entry) = self.pending.shift_remove(&request_id) else {
            return;
        };
        let buffer = entry
            .buffer
            .unwrap_or_else(|| BufferHandle::new(ResultBuffer::empty_finished(request_id)));
        buffer.finish();
        if entry.future.is_pending() {
            self.settle(&entry.future, Ok(buffer));
        }
        self.stats.resolved += 1;

        debug!(request_id = %request_id, function = %entry.function, "Request resolved");
    }

    fn release_with_error(&mut self, request_id: RequestId, error: ClientError) {
        let Some(entry) = self.pending.shift_remove(&request_id) else {
            return;
        };
        let function = entry.function.clone();
        if let Some(error) = self.settle_failure(entry, error) {
            // A finished stream has nowhere to report the error.
            if !matches!(error, ClientError::Protocol(_)) {
                // Protocol errors are counted where they are raised.
                self.stats.protocol_violations += 1;
            }
            warn!(
                request_id = %request_id,
                %function,
                %error,
                "Failure after stream finished dropped"
            );
        }
    }

    /// Deliver a failure to whoever observes the request.
    ///
    /// A pending future is rejected; a stream that was already handed out
    /// gets the error through its buffer. Returns the error if the stream
    /// was already finished and could not take it.
    fn settle_failure(&mut self, entry: PendingRequest, error: ClientError) -> Option<ClientError> {
        self.stats.rejected += 1;
        if entry.future.is_pending() {
            self.settle(&entry.future, Err(error));
            return None;
        }
        match &entry.buffer {
            Some(buffer) if buffer.is_finished() => Some(error),
            Some(buffer) => {
                buffer.fail(error);
                None
            }
            None => None,
        }
    }

    fn settle(&mut self, future: &PendingFuture, result: Result<BufferHandle, ClientError>) {
        let settled = match result {
            Ok(buffer) => future.resolve(buffer),
            Err(error) => future.reject(error),
        };
        if let Err(violation) = settled {
            self.violation(violation);
        }
    }

    fn violation(&mut self, violation: ProtocolViolation) -> ProtocolViolation {
        self.stats.protocol_violations += 1;
        error!(%violation, "Correlation protocol violation");
        violation
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Queries
    // ═══════════════════════════════════════════════════════════════════════

    /// Check if a request is still registered.
    pub fn is_registered(&self, request_id: RequestId) -> bool {
        self.pending.contains_key(&request_id)
    }

    /// Number of in-flight requests.
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// In-flight request identifiers in dispatch order.
    pub fn pending_ids(&self) -> Vec<RequestId> {
        self.pending.keys().copied().collect()
    }

    /// Consumption mode of an in-flight request.
    pub fn mode(&self, request_id: RequestId) -> Option<CallMode> {
        self.pending.get(&request_id).map(|entry| entry.mode)
    }

    /// Diagnostic counters.
    pub fn stats(&self) -> CorrelatorStats {
        self.stats
    }
}

/// Decode a callback payload. Empty input is `Null`.
fn decode_payload(bytes: &[u8]) -> Result<Payload, String> {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(Payload::Null);
    }
    serde_json::from_slice(bytes).map_err(|e| e.to_string())
}

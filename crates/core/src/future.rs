//! Settle-once handle for a dispatched request.

use crate::BufferHandle;
use callbridge_types::{ClientError, ProtocolViolation, RequestId};
use std::cell::RefCell;
use std::rc::Rc;

/// Settlement state of a [`PendingFuture`].
#[derive(Debug, Clone)]
pub enum FutureState {
    /// No terminal (or first streamed) callback yet.
    Pending,
    /// Resolved with the request's result buffer.
    Resolved(BufferHandle),
    /// Rejected with a structured error.
    Rejected(ClientError),
}

/// Handle returned to the caller immediately after dispatch.
///
/// Resolved or rejected at most once by the correlator. Clones observe the
/// same settlement.
#[derive(Debug, Clone)]
pub struct PendingFuture {
    request_id: RequestId,
    state: Rc<RefCell<FutureState>>,
}

impl PendingFuture {
    pub(crate) fn new(request_id: RequestId) -> Self {
        Self {
            request_id,
            state: Rc::new(RefCell::new(FutureState::Pending)),
        }
    }

    /// Request this future belongs to.
    pub fn request_id(&self) -> RequestId {
        self.request_id
    }

    /// Check if the future is still unsettled.
    pub fn is_pending(&self) -> bool {
        matches!(*self.state.borrow(), FutureState::Pending)
    }

    /// Snapshot of the current state.
    pub fn state(&self) -> FutureState {
        self.state.borrow().clone()
    }

    /// Settlement outcome, or `None` while pending.
    pub fn outcome(&self) -> Option<Result<BufferHandle, ClientError>> {
        match &*self.state.borrow() {
            FutureState::Pending => None,
            FutureState::Resolved(buffer) => Some(Ok(buffer.clone())),
            FutureState::Rejected(error) => Some(Err(error.clone())),
        }
    }

    pub(crate) fn resolve(&self, buffer: BufferHandle) -> Result<(), ProtocolViolation> {
        self.settle(FutureState::Resolved(buffer))
    }

    pub(crate) fn reject(&self, error: ClientError) -> Result<(), ProtocolViolation> {
        self.settle(FutureState::Rejected(error))
    }

    fn settle(&self, next: FutureState) -> Result<(), ProtocolViolation> {
        let mut state = self.state.borrow_mut();
        if !matches!(*state, FutureState::Pending) {
            return Err(ProtocolViolation::DoubleSettlement(self.request_id));
        }
        *state = next;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ResultBuffer;
    use serde_json::json;

    #[test]
    fn test_resolve_once() {
        let future = PendingFuture::new(RequestId(1));
        assert!(future.is_pending());
        assert!(future.outcome().is_none());

        let buffer = BufferHandle::new(ResultBuffer::with_payload(
            RequestId(1),
            json!({"hash": "abc"}),
            true,
        ));
        future.resolve(buffer).unwrap();

        let observer = future.clone();
        let resolved = observer.outcome().unwrap().unwrap();
        assert_eq!(resolved.payload(), json!({"hash": "abc"}));
    }

    #[test]
    fn test_second_settlement_is_refused() {
        let future = PendingFuture::new(RequestId(7));
        future.reject(ClientError::ContextDestroyed).unwrap();

        let again = future.resolve(BufferHandle::new(ResultBuffer::empty_finished(RequestId(7))));
        assert_eq!(again, Err(ProtocolViolation::DoubleSettlement(RequestId(7))));

        // First settlement wins.
        assert_eq!(future.outcome().unwrap().unwrap_err(), ClientError::ContextDestroyed);
    }
}

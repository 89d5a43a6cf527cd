//! Domain-specific identifier types.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier correlating one outbound call with its callbacks.
///
/// Unique within one execution context while the request is in flight.
/// Zero is reserved and never allocated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(pub u32);

impl RequestId {
    /// First identifier handed out by a fresh context.
    pub const FIRST: Self = RequestId(1);

    /// Create a new request ID.
    pub fn new(id: u32) -> Self {
        Self(id)
    }

    /// Get the raw ID value, as passed across the native boundary.
    pub fn as_u32(&self) -> u32 {
        self.0
    }

    /// Get the following identifier, wrapping past `u32::MAX` back to 1.
    pub fn next(self) -> Self {
        match self.0.checked_add(1) {
            Some(next) => RequestId(next),
            None => Self::FIRST,
        }
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "req-{}", self.0)
    }
}

/// Opaque handle to a native execution context.
///
/// Returned once by the native library at initialization. Only positive
/// values are valid handles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContextHandle(u32);

impl ContextHandle {
    /// Validate a raw handle returned by the native library.
    ///
    /// Returns `None` for zero, negative values and anything that does not
    /// fit the native `u32` handle.
    pub fn from_raw(raw: i64) -> Option<Self> {
        u32::try_from(raw)
            .ok()
            .filter(|handle| *handle > 0)
            .map(ContextHandle)
    }

    /// Get the raw handle value.
    pub fn as_u32(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for ContextHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ctx-{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_id_wraps_past_max() {
        assert_eq!(RequestId(7).next(), RequestId(8));
        assert_eq!(RequestId(u32::MAX).next(), RequestId::FIRST);
    }

    #[test]
    fn test_context_handle_rejects_non_positive() {
        assert_eq!(ContextHandle::from_raw(0), None);
        assert_eq!(ContextHandle::from_raw(-3), None);
        assert_eq!(ContextHandle::from_raw(i64::from(u32::MAX) + 1), None);
        assert_eq!(ContextHandle::from_raw(5).map(|c| c.as_u32()), Some(5));
    }

    #[test]
    fn test_display() {
        assert_eq!(RequestId(12).to_string(), "req-12");
        assert_eq!(ContextHandle::from_raw(3).unwrap().to_string(), "ctx-3");
    }
}

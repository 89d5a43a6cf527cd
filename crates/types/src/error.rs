//! Error types for the correlation engine.

use crate::{Payload, RequestId};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error reported by the native library through an `Error` callback.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Error)]
#[error("Native error {code}: {message}")]
pub struct NativeError {
    /// Application error code.
    pub code: i64,
    /// Human readable message.
    pub message: String,
    /// Auxiliary structured data, `Null` when absent.
    #[serde(default)]
    pub data: Payload,
}

impl NativeError {
    /// Create a native error without auxiliary data.
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: Payload::Null,
        }
    }

    /// Extract an error from a callback payload.
    ///
    /// Missing fields fall back to code 0 and the raw payload text, so a
    /// malformed error is still reported rather than lost.
    pub fn from_payload(payload: &Payload) -> Self {
        let code = payload
            .get("code")
            .and_then(Payload::as_i64)
            .unwrap_or_default();
        let message = payload
            .get("message")
            .and_then(Payload::as_str)
            .map(str::to_owned)
            .unwrap_or_else(|| payload.to_string());
        let data = payload.get("data").cloned().unwrap_or(Payload::Null);

        Self {
            code,
            message,
            data,
        }
    }
}

/// Broken correlation invariant.
///
/// These indicate a bug in the native library or in this crate and are
/// always logged; they are never silently discarded.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolViolation {
    /// Callback carried a response code outside the known classification.
    #[error("Unknown response kind {kind} for {request_id}")]
    UnknownResponseKind { request_id: RequestId, kind: u32 },

    /// A finished result buffer was mutated.
    #[error("Result buffer for {0} is already finished")]
    BufferFinished(RequestId),

    /// A pending future was settled a second time.
    #[error("Pending result for {0} was settled twice")]
    DoubleSettlement(RequestId),
}

/// Errors surfaced to callers of the client API.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ClientError {
    /// The native library refused to create an execution context.
    #[error("Context creation failed: {0}")]
    ContextCreation(String),

    /// The execution context was destroyed.
    #[error("Execution context destroyed")]
    ContextDestroyed,

    /// A callback for this request could not be decoded.
    #[error("Transport fault for {request_id}: {reason}")]
    Transport { request_id: RequestId, reason: String },

    /// The native library reported an error.
    #[error(transparent)]
    Native(#[from] NativeError),

    /// A correlation invariant was violated.
    #[error("Protocol violation: {0}")]
    Protocol(#[from] ProtocolViolation),

    /// Call parameters could not be serialized.
    #[error("Failed to encode params for {function}: {reason}")]
    Encode { function: String, reason: String },

    /// A settled payload did not match the expected result type.
    #[error("Failed to decode result: {0}")]
    Decode(String),

    /// A bounded wait elapsed before the request settled.
    #[error("Timed out waiting for {0}")]
    Timeout(RequestId),
}

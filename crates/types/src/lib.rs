//! Core types for the callbridge correlation engine.
//!
//! These types are shared by the synchronous correlator, the client runner
//! and the simulated native library. They carry no behaviour beyond
//! conversions and formatting.

mod error;
mod identifiers;
mod response;

pub use error::{ClientError, NativeError, ProtocolViolation};
pub use identifiers::{ContextHandle, RequestId};
pub use response::{ResponseKind, CUSTOM_KIND_BASE};

/// JSON payload carried by a native callback.
pub type Payload = serde_json::Value;

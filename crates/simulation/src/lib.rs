//! Deterministic simulated native library.
//!
//! [`SimulatedNative`] implements [`NativeGateway`](callbridge_core::NativeGateway)
//! entirely in process. Each function is backed by a handler that turns the
//! call's parameters into a [`Script`] of callbacks; the library then
//! delivers them either inline (before `call` returns) or from a worker
//! thread, with seeded jitter.
//!
//! ```text
//! call(ctx, id, "fn", params) ──► handler(params) ──► Script
//!                                                       │ + jitter (ChaCha8)
//!                                                       ▼
//!                                       Inline: deliver inside call
//!                                       Threaded: deliver from worker
//! ```

pub mod catalog;
mod native;
mod script;

pub use native::{
    DeliveryMode, Handler, RecordedCall, SimulatedNative, INVALID_CONTEXT_CODE,
    UNKNOWN_FUNCTION_CODE,
};
pub use script::{Script, ScriptedCallback};

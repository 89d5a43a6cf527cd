//! Request/response correlation engine.
//!
//! This crate turns a native library that reports results only through
//! asynchronous callbacks into settle-once futures and pull-based event
//! streams. Everything here is synchronous and free of I/O; the client
//! runner owns a [`Correlator`] and drives it from a single thread.
//!
//! # Architecture
//!
//! ```text
//!  caller                          owning thread                  foreign thread
//!    │                                                                  │
//!    │ register()      ┌──────────────────────────────┐                 │
//!    ├────────────────►│ Correlator                   │                 │
//!    │ PendingFuture   │  RequestId -> (future, buf)  │                 │
//!    │◄────────────────┤                              │                 │
//!    │                 └──────────────▲───────────────┘                 │
//!    │ NativeGateway::call            │ on_callback()                   │
//!    ├───────────────────────────────────────────────────────────────►  │
//!    │                                │                                 │
//!    │                 ┌──────────────┴───────────────┐   deliver()     │
//!    │                 │ CallbackQueue                │◄────────────────┤
//!    │                 └──────────────────────────────┘   CallbackSink  │
//! ```
//!
//! # Components
//!
//! - [`Correlator`] - Identifier -> pending result mapping, callback dispatch
//! - [`ResultBuffer`] / [`BufferHandle`] - Final payload or queued stream events
//! - [`PendingFuture`] - Settle-once handle returned at dispatch
//! - [`PollScheduler`] - Exponential backoff for waiting consumers
//! - [`NativeGateway`] - Seam to the native library
//! - [`callback_channel`] - Thread-safe hand-off from foreign callbacks

mod buffer;
mod callback;
mod correlator;
mod future;
mod request;
mod scheduler;
mod traits;

pub use buffer::{BufferHandle, Pull, ResultBuffer};
pub use callback::{callback_channel, CallbackEvent, CallbackQueue, CallbackSink, Disconnected};
pub use correlator::{CallMode, CallbackOutcome, Correlator, CorrelatorStats};
pub use future::{FutureState, PendingFuture};
pub use request::RequestIdAllocator;
pub use scheduler::{PollScheduler, DEFAULT_POLL_CEILING, DEFAULT_POLL_FLOOR, DEFAULT_SPIN_FACTOR};
pub use traits::NativeGateway;

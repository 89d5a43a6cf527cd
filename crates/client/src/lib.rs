//! Synchronous client over a callback-driven native library.
//!
//! The native library accepts calls tagged with a request identifier and
//! reports results later through a callback, possibly from a thread it owns.
//! [`Client`] hides that behind blocking calls:
//!
//! ```text
//! Client::request ──► PendingFuture ──► Client::await_result ──► Payload
//! Client::subscribe ─► StreamHandle ──► events() ──────────────► Iterator
//! ```
//!
//! Callbacks are queued by a thread-safe sink and applied to correlation
//! state only on the thread that owns the client, which is why the client is
//! `!Send`.
//!
//! # Example
//!
//! ```ignore
//! let client = Client::new(ClientConfig::default(), gateway)?;
//! let hash: String = client.call("crypto.blake3", &json!({"data": "abc"}))?;
//!
//! let stream = client.subscribe("net.subscribe_counter", &json!({"count": 3}))?;
//! for event in stream.events() {
//!     println!("{}", event?);
//! }
//! ```

mod client;
mod config;
mod stream;

pub use client::Client;
pub use config::{ClientConfig, ConfigError, PollSettings};
pub use stream::{EventStream, StreamHandle};

pub use callbridge_core::{CorrelatorStats, NativeGateway, PendingFuture};
pub use callbridge_types::{ClientError, NativeError, Payload, RequestId};

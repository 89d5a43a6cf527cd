//! Stock handlers for the simulated library.
//!
//! | Function                | Callbacks                                         |
//! |-------------------------|---------------------------------------------------|
//! | `client.version`        | `Success {"version"}`                             |
//! | `utils.echo`            | `Success` with the params                         |
//! | `crypto.blake3`         | `Success {"hash"}` of `data`, or `Error`          |
//! | `net.subscribe_counter` | `count` custom events, then a finished `Nop`      |
//! | `test.fail`             | `Error` with the requested code and message       |

use crate::native::Handler;
use crate::script::Script;
use callbridge_types::{Payload, CUSTOM_KIND_BASE};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

/// Error code for malformed parameters.
pub const INVALID_PARAMS_CODE: i64 = 3;

/// Custom kind used by counter subscription events.
pub const COUNTER_EVENT_KIND: u32 = CUSTOM_KIND_BASE;

/// Every stock handler with its function name.
pub fn stock_handlers() -> Vec<(&'static str, Handler)> {
    vec![
        ("client.version", Arc::new(version) as Handler),
        ("utils.echo", Arc::new(echo) as Handler),
        ("crypto.blake3", Arc::new(blake3_hash) as Handler),
        ("net.subscribe_counter", Arc::new(subscribe_counter) as Handler),
        ("test.fail", Arc::new(fail) as Handler),
    ]
}

pub fn version(_params: &Payload) -> Script {
    Script::success(json!({ "version": env!("CARGO_PKG_VERSION") }))
}

pub fn echo(params: &Payload) -> Script {
    Script::success(params.clone())
}

/// Hash `params.data` (a string) with BLAKE3.
pub fn blake3_hash(params: &Payload) -> Script {
    match params.get("data").and_then(Payload::as_str) {
        Some(data) => {
            let hash = blake3::hash(data.as_bytes());
            Script::success(json!({ "hash": hex::encode(hash.as_bytes()) }))
        }
        None => Script::error(INVALID_PARAMS_CODE, "missing string field `data`"),
    }
}

/// Emit `count` events (default 3) `interval_ms` apart, then finish.
pub fn subscribe_counter(params: &Payload) -> Script {
    let count = params.get("count").and_then(Payload::as_u64).unwrap_or(3);
    let interval = Duration::from_millis(
        params
            .get("interval_ms")
            .and_then(Payload::as_u64)
            .unwrap_or(0),
    );

    let mut script = Script::new();
    for seq in 0..count {
        script = script
            .pause(interval)
            .then_custom(COUNTER_EVENT_KIND, json!({ "seq": seq }), false);
    }
    script.then_nop(true)
}

pub fn fail(params: &Payload) -> Script {
    let code = params.get("code").and_then(Payload::as_i64).unwrap_or(500);
    let message = params
        .get("message")
        .and_then(Payload::as_str)
        .unwrap_or("requested failure");
    Script::error(code, message)
}

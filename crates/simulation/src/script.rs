//! Scripted callback sequences.

use callbridge_types::{NativeError, Payload, ResponseKind};
use std::time::Duration;

/// One callback the simulated library will deliver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptedCallback {
    /// Wait before delivering, on top of any jitter.
    pub delay: Duration,
    /// Raw payload bytes, normally JSON.
    pub payload: Vec<u8>,
    /// Raw response kind code.
    pub kind: u32,
    pub finished: bool,
}

impl ScriptedCallback {
    /// Callback with a JSON payload.
    pub fn new(kind: ResponseKind, payload: &Payload, finished: bool) -> Self {
        Self::raw(kind.code(), payload.to_string().into_bytes(), finished)
    }

    /// Callback with arbitrary bytes and kind code.
    ///
    /// Used to simulate misbehaving libraries.
    pub fn raw(kind: u32, payload: impl Into<Vec<u8>>, finished: bool) -> Self {
        Self {
            delay: Duration::ZERO,
            payload: payload.into(),
            kind,
            finished,
        }
    }

    /// Set the delivery delay.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

/// Ordered callbacks produced for one call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Script {
    callbacks: Vec<ScriptedCallback>,
    /// Delay applied to the next pushed callback.
    pause: Duration,
}

impl Script {
    /// Empty script: the call never gets a callback.
    pub fn new() -> Self {
        Self::default()
    }

    /// Single finished `Success` callback.
    pub fn success(payload: Payload) -> Self {
        Self::new().then_success(payload, true)
    }

    /// Single `Error` callback.
    pub fn error(code: i64, message: impl Into<String>) -> Self {
        Self::new().then_error(NativeError::new(code, message))
    }

    /// Wait before the next callback.
    pub fn pause(mut self, delay: Duration) -> Self {
        self.pause += delay;
        self
    }

    /// Append a callback.
    pub fn then(mut self, callback: ScriptedCallback) -> Self {
        let delay = callback.delay + std::mem::take(&mut self.pause);
        self.callbacks.push(callback.with_delay(delay));
        self
    }

    pub fn then_success(self, payload: Payload, finished: bool) -> Self {
        self.then(ScriptedCallback::new(ResponseKind::Success, &payload, finished))
    }

    pub fn then_error(self, error: NativeError) -> Self {
        let payload = serde_json::json!({
            "code": error.code,
            "message": error.message,
            "data": error.data,
        });
        self.then(ScriptedCallback::new(ResponseKind::Error, &payload, true))
    }

    /// Append a streamed event with the given custom kind.
    pub fn then_custom(self, kind: u32, payload: Payload, finished: bool) -> Self {
        self.then(ScriptedCallback::raw(
            kind,
            payload.to_string().into_bytes(),
            finished,
        ))
    }

    pub fn then_nop(self, finished: bool) -> Self {
        self.then(ScriptedCallback::raw(
            ResponseKind::Nop.code(),
            Vec::new(),
            finished,
        ))
    }

    /// Callbacks in delivery order.
    pub fn callbacks(&self) -> &[ScriptedCallback] {
        &self.callbacks
    }

    pub fn len(&self) -> usize {
        self.callbacks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.callbacks.is_empty()
    }
}

impl IntoIterator for Script {
    type Item = ScriptedCallback;
    type IntoIter = std::vec::IntoIter<ScriptedCallback>;

    fn into_iter(self) -> Self::IntoIter {
        self.callbacks.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_pause_applies_to_next_callback_only() {
        let script = Script::new()
            .then_custom(100, json!({}), false)
            .pause(Duration::from_millis(20))
            .then_custom(101, json!({"id": 1}), false)
            .then_nop(true);

        let delays: Vec<_> = script.callbacks().iter().map(|cb| cb.delay).collect();
        assert_eq!(
            delays,
            vec![Duration::ZERO, Duration::from_millis(20), Duration::ZERO]
        );
        assert_eq!(script.callbacks()[2].kind, 2);
        assert!(script.callbacks()[2].payload.is_empty());
    }

    #[test]
    fn test_error_payload_round_trips_through_native_error() {
        let script = Script::error(7, "boom");
        let callback = &script.callbacks()[0];
        assert_eq!(callback.kind, 1);
        assert!(callback.finished);

        let payload: Payload = serde_json::from_slice(&callback.payload).unwrap();
        assert_eq!(NativeError::from_payload(&payload), NativeError::new(7, "boom"));
    }
}

//! In-process stand-in for the native library.

use crate::catalog;
use crate::script::{Script, ScriptedCallback};
use callbridge_core::{CallbackSink, NativeGateway};
use callbridge_types::{ContextHandle, Payload, RequestId};
use parking_lot::{Mutex, RwLock};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::collections::HashMap;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, trace, warn};

/// Error code delivered for calls to unregistered functions.
pub const UNKNOWN_FUNCTION_CODE: i64 = 1;

/// Error code delivered for calls on a context that does not exist.
pub const INVALID_CONTEXT_CODE: i64 = 2;

/// Maps a call's parameters to the callbacks it produces.
pub type Handler = Arc<dyn Fn(&Payload) -> Script + Send + Sync>;

/// Where scripted callbacks are delivered from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DeliveryMode {
    /// Synchronously inside `call`, before it returns.
    Inline,
    /// From a worker thread spawned per call.
    #[default]
    Threaded,
}

/// A call as seen by the simulated library.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    pub context: ContextHandle,
    pub request_id: RequestId,
    pub function: String,
    /// Parsed parameters, `Null` if they were not valid JSON.
    pub params: Payload,
}

#[derive(Debug, Default)]
struct Recorder {
    configs: Vec<String>,
    created: Vec<ContextHandle>,
    destroyed: Vec<ContextHandle>,
    calls: Vec<RecordedCall>,
}

/// Simulated native library.
///
/// Handlers are registered per function name. Delivery timing is
/// deterministic for a given seed: jitter is drawn from a ChaCha RNG in
/// call order.
pub struct SimulatedNative {
    mode: DeliveryMode,
    handlers: RwLock<HashMap<String, Handler>>,
    max_jitter: Duration,
    rng: Mutex<ChaCha8Rng>,
    /// Forced result for the next context creations.
    context_result: Mutex<Option<Result<i64, String>>>,
    next_context: Mutex<i64>,
    recorder: Mutex<Recorder>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl SimulatedNative {
    /// Create a library with no handlers.
    pub fn new(mode: DeliveryMode) -> Self {
        Self {
            mode,
            handlers: RwLock::new(HashMap::new()),
            max_jitter: Duration::ZERO,
            rng: Mutex::new(ChaCha8Rng::seed_from_u64(0)),
            context_result: Mutex::new(None),
            next_context: Mutex::new(1),
            recorder: Mutex::new(Recorder::default()),
            workers: Mutex::new(Vec::new()),
        }
    }

    /// Create a library with the stock handlers installed.
    pub fn with_catalog(mode: DeliveryMode) -> Self {
        let native = Self::new(mode);
        for (name, handler) in catalog::stock_handlers() {
            native.register(name, handler);
        }
        native
    }

    /// Seed the jitter RNG.
    pub fn with_seed(self, seed: u64) -> Self {
        *self.rng.lock() = ChaCha8Rng::seed_from_u64(seed);
        self
    }

    /// Add up to `max_jitter` of random delay before every callback.
    pub fn with_max_jitter(mut self, max_jitter: Duration) -> Self {
        self.max_jitter = max_jitter;
        self
    }

    /// Force the result of context creation.
    pub fn with_context_result(self, result: Result<i64, String>) -> Self {
        *self.context_result.lock() = Some(result);
        self
    }

    /// Register a handler.
    pub fn with_handler<F>(self, function: &str, handler: F) -> Self
    where
        F: Fn(&Payload) -> Script + Send + Sync + 'static,
    {
        self.register(function, Arc::new(handler));
        self
    }

    /// Register (or replace) a handler on a shared library.
    pub fn register(&self, function: &str, handler: Handler) {
        self.handlers.write().insert(function.to_owned(), handler);
    }

    pub fn delivery_mode(&self) -> DeliveryMode {
        self.mode
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Recording
    // ═══════════════════════════════════════════════════════════════════════

    /// Calls received so far, in order.
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.recorder.lock().calls.clone()
    }

    /// Configurations passed to context creation.
    pub fn context_configs(&self) -> Vec<String> {
        self.recorder.lock().configs.clone()
    }

    pub fn created_contexts(&self) -> Vec<ContextHandle> {
        self.recorder.lock().created.clone()
    }

    pub fn destroyed_contexts(&self) -> Vec<ContextHandle> {
        self.recorder.lock().destroyed.clone()
    }

    /// Wait for every worker thread spawned so far.
    pub fn join(&self) {
        let workers: Vec<_> = self.workers.lock().drain(..).collect();
        for worker in workers {
            if worker.join().is_err() {
                warn!("Simulated delivery worker panicked");
            }
        }
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Delivery
    // ═══════════════════════════════════════════════════════════════════════

    fn script_for(&self, context: ContextHandle, function: &str, params: &Payload) -> Script {
        let live = {
            let recorder = self.recorder.lock();
            recorder.created.contains(&context) && !recorder.destroyed.contains(&context)
        };
        if !live {
            return Script::error(INVALID_CONTEXT_CODE, format!("invalid context {}", context));
        }

        let handler = self.handlers.read().get(function).cloned();
        match handler {
            Some(handler) => handler(params),
            None => Script::error(
                UNKNOWN_FUNCTION_CODE,
                format!("unknown function: {}", function),
            ),
        }
    }

    /// Fold jitter into each callback's delay.
    fn schedule(&self, script: Script) -> Vec<ScriptedCallback> {
        if self.max_jitter.is_zero() {
            return script.into_iter().collect();
        }
        let max_nanos = self.max_jitter.as_nanos() as u64;
        let mut rng = self.rng.lock();
        script
            .into_iter()
            .map(|callback| {
                let jitter = Duration::from_nanos(rng.gen_range(0..=max_nanos));
                let delay = callback.delay + jitter;
                callback.with_delay(delay)
            })
            .collect()
    }
}

fn deliver_all(request_id: RequestId, callbacks: Vec<ScriptedCallback>, sink: &CallbackSink) {
    for callback in callbacks {
        if !callback.delay.is_zero() {
            std::thread::sleep(callback.delay);
        }
        trace!(
            request_id = %request_id,
            kind = callback.kind,
            finished = callback.finished,
            "Simulated callback"
        );
        if !sink.deliver(
            request_id.as_u32(),
            &callback.payload,
            callback.kind,
            callback.finished,
        ) {
            // Client is gone; nobody will read the rest.
            return;
        }
    }
}

impl NativeGateway for SimulatedNative {
    fn create_context(&self, config_json: &str) -> Result<i64, String> {
        let forced = self.context_result.lock().clone();
        let raw = match forced {
            Some(result) => result?,
            None => {
                let mut next = self.next_context.lock();
                let raw = *next;
                *next += 1;
                raw
            }
        };

        let mut recorder = self.recorder.lock();
        recorder.configs.push(config_json.to_owned());
        if let Some(handle) = ContextHandle::from_raw(raw) {
            recorder.created.push(handle);
        }
        debug!(raw, "Simulated context created");
        Ok(raw)
    }

    fn destroy_context(&self, context: ContextHandle) {
        self.recorder.lock().destroyed.push(context);
        debug!(context = %context, "Simulated context destroyed");
    }

    fn call(
        &self,
        context: ContextHandle,
        request_id: RequestId,
        function_name: &str,
        params_json: &str,
        callback: &CallbackSink,
    ) {
        let params = serde_json::from_str(params_json).unwrap_or(Payload::Null);
        let script = self.script_for(context, function_name, &params);
        self.recorder.lock().calls.push(RecordedCall {
            context,
            request_id,
            function: function_name.to_owned(),
            params,
        });

        let callbacks = self.schedule(script);
        debug!(
            request_id = %request_id,
            function = function_name,
            callbacks = callbacks.len(),
            mode = ?self.mode,
            "Simulated call"
        );

        match self.mode {
            DeliveryMode::Inline => deliver_all(request_id, callbacks, callback),
            DeliveryMode::Threaded => {
                let sink = callback.clone();
                let worker = std::thread::spawn(move || deliver_all(request_id, callbacks, &sink));
                self.workers.lock().push(worker);
            }
        }
    }
}

impl std::fmt::Debug for SimulatedNative {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimulatedNative")
            .field("mode", &self.mode)
            .field("functions", &self.handlers.read().len())
            .field("max_jitter", &self.max_jitter)
            .finish()
    }
}

impl Drop for SimulatedNative {
    fn drop(&mut self) {
        self.join();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use callbridge_core::{callback_channel, CallbackEvent};
    use callbridge_types::NativeError;
    use serde_json::json;
    use tracing_test::traced_test;

    fn context(native: &SimulatedNative) -> ContextHandle {
        let raw = native.create_context("{}").unwrap();
        ContextHandle::from_raw(raw).unwrap()
    }

    #[test]
    fn test_inline_delivery_happens_before_call_returns() {
        let native = SimulatedNative::new(DeliveryMode::Inline)
            .with_handler("utils.echo", |params| Script::success(params.clone()));
        let ctx = context(&native);
        let (sink, queue) = callback_channel(8);

        native.call(ctx, RequestId(1), "utils.echo", r#"{"a":1}"#, &sink);

        let events: Vec<_> = queue.drain().collect();
        assert_eq!(
            events,
            vec![CallbackEvent::new(RequestId(1), br#"{"a":1}"#.to_vec(), 0, true)]
        );
        assert_eq!(native.calls()[0].params, json!({"a": 1}));
    }

    #[traced_test]
    #[test]
    fn test_threaded_delivery_preserves_order() {
        let native = SimulatedNative::new(DeliveryMode::Threaded).with_handler("stream", |_| {
            Script::new()
                .then_custom(100, json!(1), false)
                .then_custom(100, json!(2), false)
                .then_nop(true)
        });
        let ctx = context(&native);
        let (sink, queue) = callback_channel(8);

        native.call(ctx, RequestId(4), "stream", "{}", &sink);
        native.join();

        let kinds: Vec<_> = queue.drain().map(|e| (e.kind, e.finished)).collect();
        assert_eq!(kinds, vec![(100, false), (100, false), (2, true)]);
        assert!(logs_contain("Simulated call"));
    }

    #[test]
    fn test_unknown_function_reports_error() {
        let native = SimulatedNative::new(DeliveryMode::Inline);
        let ctx = context(&native);
        let (sink, queue) = callback_channel(8);

        native.call(ctx, RequestId(2), "no.such.fn", "{}", &sink);

        let event = queue.drain().next().unwrap();
        assert_eq!(event.kind, 1);
        let payload: Payload = serde_json::from_slice(&event.payload).unwrap();
        let error = NativeError::from_payload(&payload);
        assert_eq!(error.code, UNKNOWN_FUNCTION_CODE);
        assert!(error.message.contains("no.such.fn"));
    }

    #[test]
    fn test_destroyed_context_rejects_calls() {
        let native = SimulatedNative::with_catalog(DeliveryMode::Inline);
        let ctx = context(&native);
        native.destroy_context(ctx);
        let (sink, queue) = callback_channel(8);

        native.call(ctx, RequestId(3), "client.version", "{}", &sink);

        let payload: Payload = serde_json::from_slice(&queue.drain().next().unwrap().payload).unwrap();
        assert_eq!(NativeError::from_payload(&payload).code, INVALID_CONTEXT_CODE);
        assert_eq!(native.destroyed_contexts(), vec![ctx]);
    }

    #[test]
    fn test_forced_context_result() {
        let failing = SimulatedNative::new(DeliveryMode::Inline)
            .with_context_result(Err("no network".to_string()));
        assert_eq!(failing.create_context("{}"), Err("no network".to_string()));
        assert!(failing.created_contexts().is_empty());

        let invalid = SimulatedNative::new(DeliveryMode::Inline).with_context_result(Ok(-1));
        assert_eq!(invalid.create_context("{}"), Ok(-1));
        assert!(invalid.created_contexts().is_empty());
    }

    #[test]
    fn test_jitter_is_deterministic_per_seed() {
        let delays = |seed| {
            let native = SimulatedNative::new(DeliveryMode::Inline)
                .with_seed(seed)
                .with_max_jitter(Duration::from_millis(3));
            let script = Script::new()
                .then_custom(100, json!(1), false)
                .then_custom(100, json!(2), false);
            native
                .schedule(script)
                .into_iter()
                .map(|cb| cb.delay)
                .collect::<Vec<_>>()
        };

        assert_eq!(delays(42), delays(42));
        assert!(delays(42).iter().all(|d| *d <= Duration::from_millis(3)));
    }
}

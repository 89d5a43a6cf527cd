//! Client runner.
//!
//! The [`Client`] owns the execution context, the [`Correlator`] and the
//! consumer half of the callback queue. Native callbacks only ever reach the
//! queue; they are applied to correlator state when the owning thread pumps
//! it, which happens on every dispatch, await and stream poll.

use crate::config::{ClientConfig, ConfigError};
use crate::stream::StreamHandle;
use callbridge_core::{
    callback_channel, CallMode, CallbackEvent, CallbackQueue, CallbackSink, Correlator,
    CorrelatorStats, Disconnected, NativeGateway, PendingFuture, PollScheduler,
};
use callbridge_types::{ClientError, ContextHandle, Payload, RequestId};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::cell::{Cell, RefCell};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, trace, warn};

/// Lifecycle of the native execution context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ContextState {
    /// Not created yet; created on first use.
    Uninitialized,
    Ready(ContextHandle),
    Destroyed,
}

/// Synchronous client over a callback-driven native library.
///
/// All methods take `&self` so that live event streams can borrow the
/// client while the caller keeps dispatching. The client is `!Send`:
/// correlator state never leaves the thread that created it.
pub struct Client {
    /// Dropped first so foreign producers blocked on a full queue are
    /// released before the gateway is torn down.
    queue: CallbackQueue,
    sink: CallbackSink,
    correlator: RefCell<Correlator>,
    context: Cell<ContextState>,
    config: ClientConfig,
    gateway: Arc<dyn NativeGateway>,
}

impl Client {
    /// Create a client. The execution context is created lazily.
    pub fn new(config: ClientConfig, gateway: Arc<dyn NativeGateway>) -> Result<Self, ConfigError> {
        config.validate()?;
        let (sink, queue) = callback_channel(config.callback_queue_capacity);
        Ok(Self {
            queue,
            sink,
            correlator: RefCell::new(Correlator::new()),
            context: Cell::new(ContextState::Uninitialized),
            config,
            gateway,
        })
    }

    /// Client configuration.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Execution context handle, creating the context on first use.
    pub fn context(&self) -> Result<ContextHandle, ClientError> {
        match self.context.get() {
            ContextState::Ready(handle) => Ok(handle),
            ContextState::Destroyed => Err(ClientError::ContextDestroyed),
            ContextState::Uninitialized => {
                let config_json = self.config.native.to_string();
                let raw = self
                    .gateway
                    .create_context(&config_json)
                    .map_err(ClientError::ContextCreation)?;
                let handle = ContextHandle::from_raw(raw).ok_or_else(|| {
                    ClientError::ContextCreation(format!("invalid context handle {}", raw))
                })?;
                self.context.set(ContextState::Ready(handle));
                info!(context = %handle, "Created execution context");
                Ok(handle)
            }
        }
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Dispatch
    // ═══════════════════════════════════════════════════════════════════════

    /// Dispatch a single-shot call.
    ///
    /// Returns as soon as the native call has been issued.
    pub fn request<P: Serialize + ?Sized>(
        &self,
        function: &str,
        params: &P,
    ) -> Result<PendingFuture, ClientError> {
        self.dispatch(function, params, CallMode::SingleShot)
    }

    /// Dispatch a call whose native counterpart emits events.
    pub fn subscribe<P: Serialize + ?Sized>(
        &self,
        function: &str,
        params: &P,
    ) -> Result<StreamHandle<'_>, ClientError> {
        let future = self.dispatch(function, params, CallMode::Streaming)?;
        Ok(StreamHandle::new(self, future))
    }

    /// Dispatch, await and decode a single-shot call.
    pub fn call<P: Serialize + ?Sized, R: DeserializeOwned>(
        &self,
        function: &str,
        params: &P,
    ) -> Result<R, ClientError> {
        let future = self.request(function, params)?;
        let payload = self.await_result(&future)?;
        serde_json::from_value(payload).map_err(|e| ClientError::Decode(e.to_string()))
    }

    fn dispatch<P: Serialize + ?Sized>(
        &self,
        function: &str,
        params: &P,
        mode: CallMode,
    ) -> Result<PendingFuture, ClientError> {
        let context = self.context()?;
        let params_json = serde_json::to_string(params).map_err(|e| ClientError::Encode {
            function: function.to_owned(),
            reason: e.to_string(),
        })?;

        // Register before the native call so no callback can precede it.
        let future = self.correlator.borrow_mut().register(function, mode);
        self.gateway.call(
            context,
            future.request_id(),
            function,
            &params_json,
            &self.sink,
        );

        let pause = self.config.dispatch_yield();
        if !pause.is_zero() {
            std::thread::sleep(pause);
        }
        self.pump();

        Ok(future)
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Awaiting
    // ═══════════════════════════════════════════════════════════════════════

    /// Block until the future settles and return its payload.
    ///
    /// Waits cooperatively: the callback queue is drained between short
    /// waits so the native side can make progress.
    pub fn await_result(&self, future: &PendingFuture) -> Result<Payload, ClientError> {
        loop {
            if let Some(result) = self.settled(future) {
                return result;
            }
            self.wait_for_callbacks(self.config.await_poll_interval());
        }
    }

    /// Like [`Client::await_result`] but gives up after `timeout`.
    ///
    /// On timeout the request stays registered and can be awaited again.
    pub fn await_result_timeout(
        &self,
        future: &PendingFuture,
        timeout: Duration,
    ) -> Result<Payload, ClientError> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(result) = self.settled(future) {
                return result;
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                debug!(request_id = %future.request_id(), ?timeout, "Await timed out");
                return Err(ClientError::Timeout(future.request_id()));
            }
            self.wait_for_callbacks(remaining.min(self.config.await_poll_interval()));
        }
    }

    fn settled(&self, future: &PendingFuture) -> Option<Result<Payload, ClientError>> {
        self.pump();
        future
            .outcome()
            .map(|outcome| outcome.map(|buffer| buffer.payload()))
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Callback pumping
    // ═══════════════════════════════════════════════════════════════════════

    /// Apply every queued callback. Returns how many were applied.
    pub fn pump(&self) -> usize {
        let mut applied = 0;
        for event in self.queue.drain() {
            self.apply(event);
            applied += 1;
        }
        applied
    }

    /// Wait up to `timeout` for callbacks to arrive, then apply them.
    pub(crate) fn wait_for_callbacks(&self, timeout: Duration) -> usize {
        match self.queue.wait(timeout) {
            Ok(Some(event)) => {
                self.apply(event);
                1 + self.pump()
            }
            // The client holds a sink for as long as it owns the queue.
            Ok(None) | Err(Disconnected) => 0,
        }
    }

    fn apply(&self, event: CallbackEvent) {
        let request_id = event.request_id;
        if let Err(violation) = self.correlator.borrow_mut().on_callback(event) {
            // Already delivered to the owning request and logged by the correlator.
            trace!(request_id = %request_id, %violation, "Callback raised a protocol violation");
        }
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Cancellation and teardown
    // ═══════════════════════════════════════════════════════════════════════

    /// Stop a streaming request and release its identifier immediately.
    ///
    /// Events already received stay readable. Returns `false` if the
    /// request is unknown or single-shot.
    pub fn unsubscribe(&self, request_id: RequestId) -> bool {
        self.correlator.borrow_mut().unsubscribe(request_id)
    }

    /// Reject every in-flight request and destroy the native context.
    ///
    /// Idempotent. Every later dispatch fails with
    /// [`ClientError::ContextDestroyed`].
    pub fn destroy(&self) {
        let state = self.context.replace(ContextState::Destroyed);
        let released = self
            .correlator
            .borrow_mut()
            .fail_all(ClientError::ContextDestroyed);
        if released > 0 {
            warn!(released, "Destroying context with requests in flight");
        }
        if let ContextState::Ready(handle) = state {
            self.gateway.destroy_context(handle);
            info!(context = %handle, "Destroyed execution context");
        }
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Queries
    // ═══════════════════════════════════════════════════════════════════════

    /// Number of in-flight requests.
    pub fn pending_requests(&self) -> usize {
        self.correlator.borrow().pending_count()
    }

    /// Check if a request is still registered.
    pub fn is_registered(&self, request_id: RequestId) -> bool {
        self.correlator.borrow().is_registered(request_id)
    }

    /// Correlator diagnostic counters.
    pub fn stats(&self) -> CorrelatorStats {
        self.correlator.borrow().stats()
    }

    /// Fresh backoff scheduler for a stream consumer.
    pub(crate) fn poll_scheduler(&self) -> PollScheduler {
        self.config.poll.scheduler()
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        self.destroy();
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("context", &self.context.get())
            .field("pending_requests", &self.pending_requests())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use callbridge_simulation::{DeliveryMode, Script, ScriptedCallback, SimulatedNative};
    use callbridge_types::{NativeError, ProtocolViolation};
    use serde::Deserialize;
    use serde_json::json;
    use std::collections::HashMap;
    use tracing_test::traced_test;

    fn client_with(native: SimulatedNative) -> (Client, Arc<SimulatedNative>) {
        let native = Arc::new(native);
        let client = Client::new(ClientConfig::default(), native.clone()).unwrap();
        (client, native)
    }

    fn silent() -> SimulatedNative {
        SimulatedNative::new(DeliveryMode::Inline).with_handler("silent", |_| Script::new())
    }

    #[traced_test]
    #[test]
    fn test_call_resolves_and_releases() {
        let (client, _native) = client_with(SimulatedNative::with_catalog(DeliveryMode::Inline));

        let future = client.request("crypto.blake3", &json!({"data": "abc"})).unwrap();
        let payload = client.await_result(&future).unwrap();

        let expected = hex::encode(blake3::hash(b"abc").as_bytes());
        assert_eq!(payload, json!({ "hash": expected }));
        assert!(!client.is_registered(future.request_id()));
        assert_eq!(client.pending_requests(), 0);
        assert_eq!(client.stats().resolved, 1);
        assert!(logs_contain("Created execution context"));
    }

    #[test]
    fn test_typed_call_from_worker_thread() {
        #[derive(Deserialize)]
        struct Echo {
            name: String,
            n: u32,
        }

        let (client, _native) = client_with(SimulatedNative::with_catalog(DeliveryMode::Threaded));
        let echo: Echo = client
            .call("utils.echo", &json!({"name": "alice", "n": 7}))
            .unwrap();
        assert_eq!(echo.name, "alice");
        assert_eq!(echo.n, 7);
    }

    #[test]
    fn test_context_created_lazily_with_native_config() {
        let native = Arc::new(SimulatedNative::with_catalog(DeliveryMode::Inline));
        let config = ClientConfig::default().with_native(json!({"network": "sim"}));
        let client = Client::new(config, native.clone()).unwrap();
        assert!(native.created_contexts().is_empty());

        client.call::<_, Payload>("client.version", &json!({})).unwrap();
        client.call::<_, Payload>("client.version", &json!({})).unwrap();

        assert_eq!(native.created_contexts().len(), 1);
        assert_eq!(native.context_configs(), vec![r#"{"network":"sim"}"#.to_string()]);
    }

    #[test]
    fn test_context_creation_failure() {
        let (client, _native) = client_with(
            SimulatedNative::with_catalog(DeliveryMode::Inline)
                .with_context_result(Err("no network".to_string())),
        );
        let err = client.request("client.version", &json!({})).unwrap_err();
        assert_eq!(err, ClientError::ContextCreation("no network".to_string()));

        let (client, _native) =
            client_with(SimulatedNative::with_catalog(DeliveryMode::Inline).with_context_result(Ok(0)));
        let err = client.request("client.version", &json!({})).unwrap_err();
        assert!(matches!(err, ClientError::ContextCreation(_)));
        assert_eq!(client.pending_requests(), 0);
    }

    #[test]
    fn test_native_error_rejects() {
        let (client, _native) = client_with(SimulatedNative::with_catalog(DeliveryMode::Threaded));

        let future = client
            .request("test.fail", &json!({"code": 42, "message": "nope"}))
            .unwrap();
        let err = client.await_result(&future).unwrap_err();
        assert_eq!(err, ClientError::Native(NativeError::new(42, "nope")));

        let err = client.request("no.such.fn", &json!({})).and_then(|f| client.await_result(&f));
        assert!(matches!(err, Err(ClientError::Native(NativeError { code: 1, .. }))));
        assert_eq!(client.stats().rejected, 2);
    }

    #[test]
    fn test_callbacks_after_error_are_ignored() {
        let (client, _native) = client_with(SimulatedNative::new(DeliveryMode::Inline).with_handler(
            "flaky",
            |_| {
                Script::error(9, "failed")
                    .then_success(json!({"late": true}), true)
                    .then_custom(100, json!({}), false)
            },
        ));

        let future = client.request("flaky", &json!({})).unwrap();
        let err = client.await_result(&future).unwrap_err();

        assert_eq!(err, ClientError::Native(NativeError::new(9, "failed")));
        assert_eq!(client.stats().late_callbacks, 2);
        assert_eq!(client.stats().protocol_violations, 0);
    }

    #[test]
    fn test_progress_then_terminal() {
        let (client, _native) = client_with(
            SimulatedNative::new(DeliveryMode::Threaded)
                .with_handler("replace", |_| {
                    Script::new()
                        .then_success(json!({"step": 1}), false)
                        .then_success(json!({"step": 2}), true)
                })
                .with_handler("keep", |_| {
                    Script::new()
                        .then_success(json!({"kept": true}), false)
                        .then_nop(false)
                        .then_nop(true)
                }),
        );

        assert_eq!(client.call::<_, Payload>("replace", &()).unwrap(), json!({"step": 2}));
        assert_eq!(client.call::<_, Payload>("keep", &()).unwrap(), json!({"kept": true}));
    }

    #[test]
    fn test_nop_only_resolves_to_null() {
        let (client, _native) = client_with(
            SimulatedNative::new(DeliveryMode::Inline)
                .with_handler("fire", |_| Script::new().then_nop(true)),
        );
        assert_eq!(client.call::<_, Payload>("fire", &()).unwrap(), Payload::Null);
    }

    #[test]
    fn test_unknown_response_kind_is_protocol_violation() {
        let (client, _native) = client_with(
            SimulatedNative::new(DeliveryMode::Inline)
                .with_handler("odd", |_| Script::new().then(ScriptedCallback::raw(7, "{}", true))),
        );

        let future = client.request("odd", &()).unwrap();
        let err = client.await_result(&future).unwrap_err();

        assert_eq!(
            err,
            ClientError::Protocol(ProtocolViolation::UnknownResponseKind {
                request_id: future.request_id(),
                kind: 7,
            })
        );
        assert_eq!(client.stats().protocol_violations, 1);
    }

    #[test]
    fn test_malformed_payload_is_transport_error() {
        let (client, _native) = client_with(
            SimulatedNative::new(DeliveryMode::Inline)
                .with_handler("garbled", |_| Script::new().then(ScriptedCallback::raw(0, "{not json", true))),
        );

        let future = client.request("garbled", &()).unwrap();
        let err = client.await_result(&future).unwrap_err();
        assert!(matches!(
            err,
            ClientError::Transport { request_id, .. } if request_id == future.request_id()
        ));
    }

    #[test]
    fn test_encode_and_decode_failures() {
        let (client, native) = client_with(SimulatedNative::with_catalog(DeliveryMode::Inline));

        let mut params = HashMap::new();
        params.insert(vec![1u8], 1);
        let err = client.request("utils.echo", &params).unwrap_err();
        assert!(matches!(err, ClientError::Encode { ref function, .. } if function == "utils.echo"));
        assert_eq!(client.pending_requests(), 0);
        assert!(native.calls().is_empty());

        let err = client.call::<_, u64>("client.version", &()).unwrap_err();
        assert!(matches!(err, ClientError::Decode(_)));
    }

    #[test]
    fn test_await_timeout_keeps_request() {
        let (client, _native) = client_with(silent());

        let future = client.request("silent", &()).unwrap();
        let err = client
            .await_result_timeout(&future, Duration::from_millis(10))
            .unwrap_err();

        assert_eq!(err, ClientError::Timeout(future.request_id()));
        assert!(client.is_registered(future.request_id()));
        assert!(future.is_pending());
    }

    #[test]
    fn test_single_shot_cannot_unsubscribe() {
        let (client, _native) = client_with(silent());
        let future = client.request("silent", &()).unwrap();
        assert!(!client.unsubscribe(future.request_id()));
        assert!(client.is_registered(future.request_id()));
    }

    #[traced_test]
    #[test]
    fn test_destroy_rejects_in_flight_and_later_calls() {
        let (client, native) = client_with(silent());

        let future = client.request("silent", &()).unwrap();
        client.destroy();

        assert_eq!(client.await_result(&future), Err(ClientError::ContextDestroyed));
        assert_eq!(
            client.request("silent", &()).unwrap_err(),
            ClientError::ContextDestroyed
        );
        assert_eq!(client.pending_requests(), 0);

        client.destroy();
        drop(client);
        assert_eq!(native.destroyed_contexts().len(), 1);
        assert!(logs_contain("Destroying context with requests in flight"));
    }

    #[test]
    fn test_drop_destroys_context() {
        let native = Arc::new(SimulatedNative::with_catalog(DeliveryMode::Inline));
        {
            let client = Client::new(ClientConfig::default(), native.clone()).unwrap();
            client.context().unwrap();
        }
        assert_eq!(native.destroyed_contexts(), native.created_contexts());
    }

    #[test]
    fn test_concurrent_requests_correlate() {
        let (client, _native) = client_with(
            SimulatedNative::with_catalog(DeliveryMode::Threaded)
                .with_seed(7)
                .with_max_jitter(Duration::from_millis(5)),
        );

        let futures: Vec<_> = (0..20)
            .map(|i| client.request("utils.echo", &json!({ "i": i })).unwrap())
            .collect();
        assert_eq!(client.stats().dispatched, 20);

        for (i, future) in futures.iter().enumerate().rev() {
            assert_eq!(client.await_result(future).unwrap(), json!({ "i": i }));
        }
        assert_eq!(client.pending_requests(), 0);
    }

    #[test]
    fn test_inline_burst_larger_than_queue_capacity() {
        let native = Arc::new(SimulatedNative::new(DeliveryMode::Inline).with_handler(
            "burst",
            |_| {
                (0..3)
                    .fold(Script::new(), |script, i| script.then_custom(100, json!(i), false))
                    .then_nop(true)
            },
        ));
        let config = ClientConfig::default().with_callback_queue_capacity(2);
        let client = Client::new(config, native).unwrap();

        let stream = client.subscribe("burst", &()).unwrap();
        assert!(!client.is_registered(stream.request_id()));

        let events: Vec<_> = stream.events().map(Result::unwrap).collect();
        assert_eq!(events, vec![json!(0), json!(1), json!(2)]);
        assert_eq!(client.stats().resolved, 1);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let native: Arc<dyn NativeGateway> = Arc::new(SimulatedNative::new(DeliveryMode::Inline));
        let config = ClientConfig::default().with_callback_queue_capacity(0);
        assert!(matches!(
            Client::new(config, native),
            Err(ConfigError::Invalid(_))
        ));
    }
}

//! Core traits at the native boundary.

use crate::CallbackSink;
use callbridge_types::{ContextHandle, RequestId};

/// Gateway into the native library.
///
/// This is the only seam between the correlation engine and foreign code.
/// Implementations translate each method into the corresponding native
/// entry point:
///
/// - **Non-blocking**: `call` returns immediately; completion is signaled
///   only through the callback sink
/// - **Foreign delivery**: the sink may be invoked inside `call` or later
///   from a thread the library manages
/// - **No correlator access**: implementations never see correlator state,
///   only the [`CallbackSink`]
///
/// # Example
///
/// ```ignore
/// impl NativeGateway for DylibGateway {
///     fn call(&self, context, request_id, function_name, params_json, callback) {
///         let sink = callback.clone();
///         self.lib.request(context.as_u32(), function_name, params_json, request_id.as_u32(),
///             move |id, json, kind, finished| { sink.deliver(id, json, kind, finished); });
///     }
///     // ...
/// }
/// ```
pub trait NativeGateway {
    /// Create an execution context from the serialized client configuration.
    ///
    /// Returns the raw handle reported by the library. Validation of the
    /// handle is left to the caller.
    fn create_context(&self, config_json: &str) -> Result<i64, String>;

    /// Release an execution context created by [`NativeGateway::create_context`].
    fn destroy_context(&self, context: ContextHandle);

    /// Issue a call. Fire-and-forget.
    ///
    /// # Arguments
    ///
    /// * `context` - Execution context the request is scoped to
    /// * `request_id` - Identifier every callback for this call must carry
    /// * `function_name` - Native function, e.g. `crypto.sha256`
    /// * `params_json` - Serialized parameters
    /// * `callback` - Sink for zero or more callback deliveries
    fn call(
        &self,
        context: ContextHandle,
        request_id: RequestId,
        function_name: &str,
        params_json: &str,
        callback: &CallbackSink,
    );
}

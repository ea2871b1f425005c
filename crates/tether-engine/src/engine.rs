use std::sync::Arc;

use crate::{ExternId, ScriptException};

/// Argument list of one native invocation plus the engine's exception
/// channel.
///
/// Script dispatch is single-threaded and non-reentrant, so a scope is only
/// ever used from the engine's owner thread and only for the duration of one
/// call.
pub trait Invocation<E: ScriptEngine> {
    /// The engine dispatching this invocation.
    fn engine(&self) -> &E;

    /// The arguments of this invocation, in call order.
    fn args(&self) -> &[E::Value];

    /// Record an exception to be thrown back into script once the native
    /// callable returns. The first recorded message wins.
    fn throw_error(&mut self, message: &str);
}

/// A native callback exposed to the engine through a callable template.
pub type NativeCallback<E> = Arc<dyn Fn(&mut dyn Invocation<E>) + Send + Sync>;

/// Callback run by the engine when a weakly-referenced value is collected.
///
/// The engine decides when (and on which of its threads) this runs; native
/// code must not depend on the timing.
pub type Finalizer = Box<dyn FnOnce() + Send>;

/// Capability surface of an embedded scripting engine.
///
/// All methods are called on the engine's owner thread. Values are cheap
/// handles into the engine's garbage-collected heap; cloning a value never
/// clones the heap cell behind it.
pub trait ScriptEngine: Sized + 'static {
    /// Engine-heap value handle.
    ///
    /// `Send + Sync` because native code may carry values to worker threads
    /// inside a `ThreadAffineRefHandle`; only their destruction and use are
    /// thread-affine, the handle bits themselves are plain data.
    type Value: Clone + Send + Sync + 'static;

    /// Create an opaque external value carrying `id`.
    fn new_external(&self, id: ExternId) -> Self::Value;

    /// Read back the id of an external value; `None` for any other kind.
    fn external_id(&self, value: &Self::Value) -> Option<ExternId>;

    /// Demote the native handle on `value` to a weak reference and arrange
    /// for `finalizer` to run when the engine collects the cell.
    ///
    /// `value` must be an external created by [`new_external`]; anything else
    /// is a broken embedding and may panic.
    ///
    /// [`new_external`]: ScriptEngine::new_external
    fn set_weak(&self, value: &Self::Value, finalizer: Finalizer);

    /// Create an empty record value.
    fn new_record(&self) -> Self::Value;

    /// Whether `record` carries `flag`. Absent flags read as false.
    fn record_flag(&self, record: &Self::Value, flag: &str) -> bool;

    /// Set `flag` on `record`.
    fn set_record_flag(&self, record: &Self::Value, flag: &str);

    /// Expose `callback` to script as a callable value.
    fn new_function(&self, callback: NativeCallback<Self>) -> Self::Value;

    /// Partial application: produce a callable that invokes `target` with
    /// `extras` prepended to the caller's own arguments.
    ///
    /// Returns `None` when `target` is not callable or the engine has no bind
    /// facility for it.
    fn bind(&self, target: &Self::Value, extras: &[Self::Value]) -> Option<Self::Value>;

    /// Invoke a callable value with `args`.
    ///
    /// A script-side throw surfaces as `Err`; the error does not cross back
    /// into the engine.
    fn call(
        &self,
        target: &Self::Value,
        args: &[Self::Value],
    ) -> Result<Self::Value, ScriptException>;
}

use std::fmt;
use std::sync::Arc;

use tether_engine::{Invocation, ScriptEngine};

/// Type-erased native callable invoked when a bridged value is called from
/// script.
///
/// A translater carries whatever closure state the native caller supplied and
/// no lifetime of its own; the holder that owns it decides when that state is
/// released. Clones share the underlying closure.
pub struct Translater<E: ScriptEngine> {
    run: Arc<dyn Fn(&mut dyn Invocation<E>) + Send + Sync>,
}

impl<E: ScriptEngine> Translater<E> {
    pub fn new(run: impl Fn(&mut dyn Invocation<E>) + Send + Sync + 'static) -> Self {
        Translater { run: Arc::new(run) }
    }

    /// Perform the native call. Errors travel through the scope's exception
    /// channel; there is no return value at this layer.
    ///
    /// Safe to run any number of times; one-time enforcement lives in the
    /// dispatcher, not here.
    pub fn run(&self, scope: &mut dyn Invocation<E>) {
        (self.run)(scope);
    }
}

impl<E: ScriptEngine> Clone for Translater<E> {
    fn clone(&self) -> Self {
        Translater {
            run: Arc::clone(&self.run),
        }
    }
}

impl<E: ScriptEngine> fmt::Debug for Translater<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Translater")
    }
}

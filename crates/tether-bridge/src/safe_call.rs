use std::sync::Arc;

use tether_engine::{Scheduler, ScriptEngine};

use crate::ThreadAffineRefHandle;

/// A script function retained by native code, invocable from any thread.
///
/// Calls are fire-and-forget: they run on the engine's owner thread (inline
/// when already there), a dead handle is skipped, and a script-side throw is
/// logged rather than propagated. The retained function itself is released
/// through the thread-affine handle, so it is destroyed on the owner thread
/// no matter which thread drops the last clone.
pub struct SafeCallable<E: ScriptEngine + Send + Sync> {
    engine: Arc<E>,
    scheduler: Arc<dyn Scheduler>,
    handle: ThreadAffineRefHandle<E::Value>,
}

impl<E: ScriptEngine + Send + Sync> SafeCallable<E> {
    pub fn new(engine: Arc<E>, scheduler: Arc<dyn Scheduler>, function: E::Value) -> Self {
        let handle = ThreadAffineRefHandle::new(function, Arc::clone(&scheduler));
        SafeCallable {
            engine,
            scheduler,
            handle,
        }
    }

    /// Whether the retained function is still held.
    pub fn is_alive(&self) -> bool {
        self.handle.is_alive()
    }

    /// Invoke the retained function with `args` on the owner thread.
    ///
    /// The deferred task watches the handle rather than holding it, so a
    /// pending call never keeps a released function alive; it is skipped
    /// when it finds the handle dead.
    pub fn call(&self, args: Vec<E::Value>) {
        let engine = Arc::clone(&self.engine);
        let handle = self.handle.watch();
        self.scheduler.run_on_owner_thread(Box::new(move || {
            let Ok(function) = handle.current_handle() else {
                log::warn!("dropping a call through a dead function handle");
                return;
            };
            if let Err(err) = engine.call(&function, &args) {
                log::warn!("retained script function threw: {}", err);
            }
        }));
    }
}

impl<E: ScriptEngine + Send + Sync> Clone for SafeCallable<E> {
    fn clone(&self) -> Self {
        SafeCallable {
            engine: Arc::clone(&self.engine),
            scheduler: Arc::clone(&self.scheduler),
            handle: self.handle.clone(),
        }
    }
}

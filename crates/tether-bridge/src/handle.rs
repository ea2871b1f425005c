use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use tether_engine::Scheduler;

use crate::BridgeError;

/// Shared-ownership wrapper over an engine value whose destruction must
/// happen on the engine's owner thread.
///
/// Clones may travel to any thread and count against one shared atomic
/// reference count. Whichever thread drops the last clone flips the handle
/// dead and either destroys the value inline (owner thread) or posts a
/// destruction task through the scheduler and returns without blocking. The
/// wrapped value is therefore never destroyed off the owner thread and never
/// while a clone is outstanding.
pub struct ThreadAffineRefHandle<V: Send + 'static> {
    shared: Arc<Shared<V>>,
}

struct Shared<V> {
    value: Mutex<Option<V>>,
    refs: AtomicUsize,
    alive: AtomicBool,
    scheduler: Arc<dyn Scheduler>,
}

impl<V: Clone + Send + 'static> ThreadAffineRefHandle<V> {
    pub fn new(value: V, scheduler: Arc<dyn Scheduler>) -> Self {
        ThreadAffineRefHandle {
            shared: Arc::new(Shared {
                value: Mutex::new(Some(value)),
                refs: AtomicUsize::new(1),
                alive: AtomicBool::new(true),
                scheduler,
            }),
        }
    }

    /// Whether the wrapped value has not been released yet.
    pub fn is_alive(&self) -> bool {
        self.shared.alive.load(Ordering::Acquire)
    }

    /// A fresh handle to the wrapped value.
    ///
    /// Fails once the value has been released, guarding callers that cached
    /// the wrapper past its lifetime.
    pub fn current_handle(&self) -> Result<V, BridgeError> {
        self.shared.snapshot()
    }

    /// A non-owning view of this handle.
    ///
    /// A watch does not count against the reference count, so the value can
    /// die while a watch is outstanding. Deferred work holds a watch instead
    /// of a clone when it should skip, rather than prolong, a released value.
    pub fn watch(&self) -> HandleWatch<V> {
        HandleWatch {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<V: Clone> Shared<V> {
    fn snapshot(&self) -> Result<V, BridgeError> {
        if !self.alive.load(Ordering::Acquire) {
            return Err(BridgeError::DanglingHandle);
        }
        self.value.lock().clone().ok_or(BridgeError::DanglingHandle)
    }
}

/// Non-owning observer of a [`ThreadAffineRefHandle`].
pub struct HandleWatch<V: Send + 'static> {
    shared: Arc<Shared<V>>,
}

impl<V: Clone + Send + 'static> HandleWatch<V> {
    /// Whether the watched value has not been released yet.
    pub fn is_alive(&self) -> bool {
        self.shared.alive.load(Ordering::Acquire)
    }

    /// The watched value, if it is still held.
    pub fn current_handle(&self) -> Result<V, BridgeError> {
        self.shared.snapshot()
    }
}

impl<V: Send + 'static> Clone for HandleWatch<V> {
    fn clone(&self) -> Self {
        HandleWatch {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<V: Send + 'static> Clone for ThreadAffineRefHandle<V> {
    fn clone(&self) -> Self {
        self.shared.refs.fetch_add(1, Ordering::Relaxed);
        ThreadAffineRefHandle {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<V: Send + 'static> Drop for ThreadAffineRefHandle<V> {
    fn drop(&mut self) {
        if self.shared.refs.fetch_sub(1, Ordering::AcqRel) != 1 {
            return;
        }
        // Last reference: the handle reads dead before the value goes away,
        // so no thread can observe a half-released handle as alive.
        self.shared.alive.store(false, Ordering::Release);
        let value = self.shared.value.lock().take();
        if let Some(value) = value {
            if self.shared.scheduler.on_owner_thread() {
                drop(value);
            } else {
                log::trace!("posting thread-affine destruction to the owner thread");
                self.shared.scheduler.post(Box::new(move || drop(value)));
            }
        }
    }
}

//! Bridges native callables into an embedded scripting engine.
//!
//! The core primitive turns "a native callable plus a liveness policy" into a
//! value the engine can call. A [`CallbackRegistry`] keeps an id-addressed
//! holder arena and one lazily-built dispatcher template per engine instance;
//! every bridged callable is the dispatcher partially applied to an opaque
//! external and a small state record. The engine's weak-finalizer machinery
//! and one-time consumption race for each holder, and an atomic guard lets
//! exactly one of them destroy it.
//!
//! Cross-thread concerns live in [`ThreadAffineRefHandle`] (destroy an engine
//! value only on its owner thread, no matter who drops the last reference)
//! and [`SafeCallable`] (invoke a retained script function from any thread).

mod bind;
mod error;
mod handle;
mod holder;
mod registry;
mod safe_call;
mod translater;

pub use bind::bind_with_state;
pub use error::BridgeError;
pub use handle::{HandleWatch, ThreadAffineRefHandle};
pub use registry::CallbackRegistry;
pub use safe_call::SafeCallable;
pub use translater::Translater;

//! Engine-facing capability vocabulary for the tether callback bridge.
//!
//! This crate defines the collaborator surface an embedding host must provide
//! before native callables can be bridged into its scripting engine: opaque
//! external values, weak-reference registration with a finalizer, callable
//! templates, partial application, and a post-to-owner-thread scheduler. The
//! bridge itself lives in `tether-bridge`; a deterministic reference engine
//! for tests lives in `tether-sandbox`.

pub mod engine;
pub mod scheduler;

pub use engine::{Finalizer, Invocation, NativeCallback, ScriptEngine};
pub use scheduler::{Scheduler, Task};

use thiserror::Error;

/// Opaque identifier carried by an engine external value.
///
/// The native side chooses the id; the engine only stores it. Resolving an id
/// back to a native object is the native side's job, so a stale id is a
/// defined "not found" lookup rather than a dangling pointer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ExternId(pub u64);

/// A script-side thrown error surfaced to native callers of
/// [`ScriptEngine::call`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("script exception: {message}")]
pub struct ScriptException {
    pub message: String,
}

impl ScriptException {
    pub fn new(message: impl Into<String>) -> Self {
        ScriptException {
            message: message.into(),
        }
    }
}

//! A deterministic, single-threaded reference engine for the tether bridge.
//!
//! Real embeddings hand the bridge a live scripting engine whose collection
//! timing is opaque. The sandbox supplies the same capability surface with an
//! explicit heap: values live in one slab, natively-created cells start with
//! one native root, [`SandboxEngine::release`] drops that root, and
//! [`SandboxEngine::collect`] traces from the remaining roots, frees whatever
//! is unreachable and runs the weak finalizers of collected externals. That
//! makes GC-driven behavior testable without relying on host-specific
//! weak-reference timing.

mod engine;
mod scheduler;
mod value;

pub use engine::SandboxEngine;
pub use scheduler::QueueScheduler;
pub use value::SandboxValue;

use std::sync::atomic::{AtomicBool, Ordering};

use tether_engine::ScriptEngine;

use crate::Translater;

/// Exclusive owner of one [`Translater`], bridged to an engine external.
///
/// A holder dies through exactly one of two paths: the engine's weak
/// finalizer, or explicit consumption by the dispatcher after a one-time
/// call. Disposal is intentionally decoupled from handle liveness, so the
/// `disposed` flag arbitrates between the paths; whichever loses the
/// check-and-set backs off.
pub(crate) struct Holder<E: ScriptEngine> {
    translater: Translater<E>,
    disposed: AtomicBool,
}

impl<E: ScriptEngine> Holder<E> {
    pub(crate) fn new(translater: Translater<E>) -> Self {
        Holder {
            translater,
            disposed: AtomicBool::new(false),
        }
    }

    pub(crate) fn translater(&self) -> &Translater<E> {
        &self.translater
    }

    /// Claim the right to destroy this holder. Only the first caller wins.
    pub(crate) fn retire(&self) -> bool {
        !self.disposed.swap(true, Ordering::AcqRel)
    }
}

use thiserror::Error;

/// Recoverable errors surfaced by the bridge.
///
/// Broken bridge invariants (a missing bind facility, an unresolvable
/// external reaching the dispatcher) are deliberately not represented here.
/// They mean the native/engine contract itself is broken, so they panic
/// instead of propagating.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BridgeError {
    /// A one-time bridged callable was invoked after consumption.
    ///
    /// The message text is part of the script-visible contract.
    #[error("callback can only be called for once")]
    ReuseViolation,

    /// A [`ThreadAffineRefHandle`](crate::ThreadAffineRefHandle) was read
    /// after its wrapped value was released.
    #[error("function handle is no longer alive")]
    DanglingHandle,
}

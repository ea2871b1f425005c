/// A unit of deferred work posted to the engine's owner thread.
pub type Task = Box<dyn FnOnce() + Send>;

/// Post-to-owner-thread capability supplied by the embedding host.
///
/// The bridge uses this for exactly one thing: making sure engine values are
/// only destroyed (and script functions only invoked) on the thread the
/// engine designates. Nothing here blocks; posted tasks are fire-and-forget.
pub trait Scheduler: Send + Sync + 'static {
    /// True when the calling thread is the designated owner thread.
    fn on_owner_thread(&self) -> bool;

    /// Queue `task` for execution on the owner thread. Must not block and
    /// must be callable from any thread.
    fn post(&self, task: Task);

    /// Run `task` on the owner thread, inline when already there.
    fn run_on_owner_thread(&self, task: Task) {
        if self.on_owner_thread() {
            task();
        } else {
            self.post(task);
        }
    }
}

use std::thread::{self, ThreadId};

use crossbeam_queue::SegQueue;

use tether_engine::{Scheduler, Task};

/// Queue-backed scheduler owned by the thread that created it.
///
/// `post` may be called from any thread; queued tasks run when the owner
/// thread calls [`drain`]. This stands in for the embedding application's
/// real task queue and makes deferred destruction observable in tests.
///
/// [`drain`]: QueueScheduler::drain
pub struct QueueScheduler {
    owner: ThreadId,
    tasks: SegQueue<Task>,
}

impl QueueScheduler {
    pub fn new() -> Self {
        QueueScheduler {
            owner: thread::current().id(),
            tasks: SegQueue::new(),
        }
    }

    /// Number of tasks waiting for the owner thread.
    pub fn pending(&self) -> usize {
        self.tasks.len()
    }

    /// Run every queued task, returning how many ran.
    ///
    /// Panics off the owner thread; draining elsewhere would defeat the
    /// thread-affinity the scheduler exists to provide.
    pub fn drain(&self) -> usize {
        assert!(
            self.on_owner_thread(),
            "drain must run on the owner thread"
        );
        let mut ran = 0;
        while let Some(task) = self.tasks.pop() {
            task();
            ran += 1;
        }
        ran
    }
}

impl Default for QueueScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler for QueueScheduler {
    fn on_owner_thread(&self) -> bool {
        thread::current().id() == self.owner
    }

    fn post(&self, task: Task) {
        self.tasks.push(task);
    }
}

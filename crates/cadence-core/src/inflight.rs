//! Count of scheduled-but-unfinished cycle tasks.
//!
//! Every node the world submits is counted from the moment it is wired
//! into a chain until its done hooks fire. The counter gates
//! [`World::start_ticking`] (a new chain may only start from zero) and
//! lets shutdown block on a condition variable until the last node
//! finishes.
//!
//! [`World::start_ticking`]: crate::world::World::start_ticking

use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// In-flight task counter with a drain wait.
#[derive(Debug, Default)]
pub struct InFlight {
    count: Mutex<usize>,
    idle: Condvar,
}

impl InFlight {
    /// Create a counter at zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current count.
    pub fn load(&self) -> usize {
        *self.lock()
    }

    /// Count one more task.
    pub fn begin(&self) {
        let mut count = self.lock();
        *count = count.saturating_add(1);
    }

    /// Count one finished task, waking drain waiters at zero.
    pub fn end(&self) {
        let mut count = self.lock();
        *count = count.saturating_sub(1);
        if *count == 0 {
            self.idle.notify_all();
        }
    }

    /// Atomically go from zero to one. Returns `false` (and changes
    /// nothing) if anything is already in flight.
    pub fn try_claim_idle(&self) -> bool {
        let mut count = self.lock();
        if *count == 0 {
            *count = 1;
            true
        } else {
            false
        }
    }

    /// Block until the count reaches zero or `timeout` elapses. `None`
    /// waits indefinitely. Returns whether the counter drained.
    pub fn wait_idle(&self, timeout: Option<Duration>) -> bool {
        let guard = self.lock();
        match timeout {
            None => {
                let guard = self
                    .idle
                    .wait_while(guard, |count| *count > 0)
                    .unwrap_or_else(PoisonError::into_inner);
                *guard == 0
            }
            Some(limit) => {
                let (guard, _timeout) = self
                    .idle
                    .wait_timeout_while(guard, limit, |count| *count > 0)
                    .unwrap_or_else(PoisonError::into_inner);
                *guard == 0
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, usize> {
        self.count.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

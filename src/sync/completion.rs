//! One-shot, resettable completion signal.
//!
//! Used for "has the async grant or pipe transition finished yet" and for
//! metering request/response pairs. Waiters block with a timeout; the
//! signalling side never blocks.

use core::time::Duration;
use parking_lot::{Condvar, Mutex};

/// One-shot completion with timed wait
#[derive(Debug, Default)]
pub struct Completion {
    done: Mutex<bool>,
    cond: Condvar,
}

impl Completion {
    /// Create an unsignalled completion
    pub fn new() -> Self {
        Self {
            done: Mutex::new(false),
            cond: Condvar::new(),
        }
    }

    /// Signal completion and wake every waiter
    pub fn complete(&self) {
        let mut done = self.done.lock();
        *done = true;
        self.cond.notify_all();
    }

    /// Clear the signal so the next transition can be awaited
    pub fn reset(&self) {
        *self.done.lock() = false;
    }

    /// Whether the completion is currently signalled
    pub fn is_done(&self) -> bool {
        *self.done.lock()
    }

    /// Wait up to `timeout` for the signal.
    ///
    /// Returns `true` if signalled, `false` on timeout. The signal is left
    /// set so late waiters on the same transition see it.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let mut done = self.done.lock();
        if *done {
            return true;
        }
        let _ = self
            .cond
            .wait_while_for(&mut done, |done| !*done, timeout);
        *done
    }
}

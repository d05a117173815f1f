//! Per-task non-blocking execution guard

use std::sync::atomic::{AtomicBool, Ordering};

/// Try-lock that decides whether a tick may run a task's work.
///
/// Acquisition never waits: a tick that finds the guard held is dropped
/// instead of queued. The guard is released when the returned
/// [`GuardPermit`] goes out of scope, including when the holder unwinds.
#[derive(Debug, Default)]
pub struct ExecutionGuard {
    held: AtomicBool,
}

/// Proof of exclusive access to a task's work. Releases the guard on drop.
#[derive(Debug)]
pub struct GuardPermit<'a> {
    guard: &'a ExecutionGuard,
}

impl ExecutionGuard {
    pub fn new() -> Self {
        Self {
            held: AtomicBool::new(false),
        }
    }

    /// Acquire the guard if nobody holds it, otherwise return `None` immediately.
    pub fn try_acquire(&self) -> Option<GuardPermit<'_>> {
        self.held
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .ok()
            .map(|_| GuardPermit { guard: self })
    }

    pub fn is_held(&self) -> bool {
        self.held.load(Ordering::Acquire)
    }
}

impl Drop for GuardPermit<'_> {
    fn drop(&mut self) {
        self.guard.held.store(false, Ordering::Release);
    }
}

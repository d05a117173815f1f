//! Scheduler module for periodic task management

pub mod clock;
pub mod gauge;
pub mod guard;
pub mod periodic_scheduler;
pub mod task;
mod tick;

use std::sync::{Mutex, MutexGuard, PoisonError};

pub use clock::{TickCallback, TickClock};
pub use gauge::{ConcurrencyGauge, GaugeTicket};
pub use guard::{ExecutionGuard, GuardPermit};
pub use periodic_scheduler::PeriodicScheduler;
pub use task::{TaskId, TaskMetrics, TaskSnapshot, WorkFn, WorkFuture};

/// Lock a mutex, carrying on with the data if a previous holder panicked.
/// None of the scheduler's critical sections leave state half-updated.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

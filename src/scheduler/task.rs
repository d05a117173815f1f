//! Task entries, their lifecycle flags and run metrics

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Local};
use tokio_util::sync::CancellationToken;

use super::clock::TickClock;
use super::guard::ExecutionGuard;
use super::lock;

pub type TaskId = i64;

pub type WorkFuture = Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send>>;

/// One unit of polling work. Receives the task's cancellation token.
pub type WorkFn = Arc<dyn Fn(CancellationToken) -> WorkFuture + Send + Sync>;

/// Durations of a task's most recent runs.
#[derive(Debug, Clone)]
pub struct TaskMetrics {
    durations: VecDeque<Duration>,
    capacity: usize,
}

impl TaskMetrics {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            durations: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn record(&mut self, duration: Duration) {
        if self.durations.len() == self.capacity {
            self.durations.pop_front();
        }
        self.durations.push_back(duration);
    }

    pub fn len(&self) -> usize {
        self.durations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.durations.is_empty()
    }

    /// True when the window is full and every run in it took longer than `budget`.
    pub fn is_consistently_slow(&self, budget: Duration) -> bool {
        self.durations.len() == self.capacity && self.durations.iter().all(|&d| d > budget)
    }

    pub fn average(&self) -> Duration {
        match u32::try_from(self.durations.len()) {
            Ok(0) | Err(_) => Duration::ZERO,
            Ok(count) => self.durations.iter().sum::<Duration>() / count,
        }
    }
}

#[derive(Debug, Clone)]
struct TaskStats {
    last_run_at: Option<DateTime<Local>>,
    total_runs: u64,
    failed_runs: u64,
    skipped_ticks: u64,
    metrics: TaskMetrics,
}

/// Everything that decides whether the clock may be armed, kept under one lock
/// so a re-arm can never race a stop, a removal or an interval change.
#[derive(Debug, Clone, Copy)]
struct Control {
    interval: Duration,
    stopped: bool,
    removed: bool,
    host_running: bool,
}

impl Control {
    fn may_fire(&self) -> bool {
        self.host_running && !self.stopped && !self.removed
    }
}

/// Point-in-time view of a task, for diagnostics.
#[derive(Debug, Clone)]
pub struct TaskSnapshot {
    pub id: TaskId,
    pub interval: Duration,
    pub last_run_at: Option<DateTime<Local>>,
    pub is_running: bool,
    pub is_stopped: bool,
    pub total_runs: u64,
    pub failed_runs: u64,
    pub skipped_ticks: u64,
    pub average_duration: Duration,
    pub consistently_slow: bool,
}

pub(crate) struct TaskEntry {
    id: TaskId,
    work: WorkFn,
    guard: ExecutionGuard,
    clock: TickClock,
    control: Mutex<Control>,
    cancel: Mutex<CancellationToken>,
    stats: Mutex<TaskStats>,
    slow_threshold: Duration,
}

impl TaskEntry {
    pub(crate) fn new(
        id: TaskId,
        interval: Duration,
        work: WorkFn,
        clock: TickClock,
        cancel: CancellationToken,
        metrics: TaskMetrics,
        slow_threshold: Duration,
        host_running: bool,
    ) -> Self {
        Self {
            id,
            work,
            guard: ExecutionGuard::new(),
            clock,
            control: Mutex::new(Control {
                interval,
                stopped: false,
                removed: false,
                host_running,
            }),
            cancel: Mutex::new(cancel),
            stats: Mutex::new(TaskStats {
                last_run_at: None,
                total_runs: 0,
                failed_runs: 0,
                skipped_ticks: 0,
                metrics,
            }),
            slow_threshold,
        }
    }

    pub(crate) fn id(&self) -> TaskId {
        self.id
    }

    pub(crate) fn work(&self) -> &WorkFn {
        &self.work
    }

    pub(crate) fn guard(&self) -> &ExecutionGuard {
        &self.guard
    }

    pub(crate) fn interval(&self) -> Duration {
        lock(&self.control).interval
    }

    pub(crate) fn cancellation_token(&self) -> CancellationToken {
        lock(&self.cancel).clone()
    }

    pub(crate) fn replace_cancellation_token(&self, token: CancellationToken) {
        *lock(&self.cancel) = token;
    }

    /// Arm with zero delay, as a freshly registered or freshly started task does.
    pub(crate) fn arm_immediately(&self) {
        let control = lock(&self.control);
        if control.may_fire() {
            self.clock.change(Duration::ZERO, control.interval);
        }
    }

    /// Arm one interval out, unless the task has been stopped or removed or
    /// its scheduler shut down meanwhile.
    pub(crate) fn rearm(&self) {
        let control = lock(&self.control);
        if control.may_fire() {
            self.clock.change(control.interval, control.interval);
        }
    }

    /// Claim a fired tick for a run. Pauses the clock and returns `true` unless
    /// the task was stopped or removed or its scheduler shut down after the
    /// clock fired.
    pub(crate) fn begin_run(&self) -> bool {
        let control = lock(&self.control);
        self.clock.pause();
        control.may_fire()
    }

    pub(crate) fn stop(&self) {
        let mut control = lock(&self.control);
        control.stopped = true;
        self.clock.pause();
    }

    pub(crate) fn restart(&self) {
        let mut control = lock(&self.control);
        control.stopped = false;
        if control.may_fire() {
            self.clock.change(control.interval, control.interval);
        }
    }

    pub(crate) fn set_interval(&self, interval: Duration) {
        let mut control = lock(&self.control);
        self.clock.pause();
        control.interval = interval;
        if control.may_fire() {
            self.clock.change(interval, interval);
        }
    }

    /// Host-level start: arm immediately unless individually stopped.
    pub(crate) fn resume_host(&self) {
        let mut control = lock(&self.control);
        control.host_running = true;
        if control.may_fire() {
            self.clock.change(Duration::ZERO, control.interval);
        }
    }

    pub(crate) fn suspend_host(&self) {
        let mut control = lock(&self.control);
        control.host_running = false;
        self.clock.pause();
    }

    /// Dispose the clock and signal cancellation to any in-flight work.
    pub(crate) fn retire(&self) {
        let mut control = lock(&self.control);
        control.removed = true;
        self.clock.dispose();
        lock(&self.cancel).cancel();
    }

    pub(crate) fn record_skip(&self) {
        lock(&self.stats).skipped_ticks += 1;
    }

    pub(crate) fn record_run(&self, started_at: DateTime<Local>, duration: Duration, succeeded: bool) {
        let mut stats = lock(&self.stats);
        stats.total_runs += 1;
        stats.metrics.record(duration);
        if succeeded {
            stats.last_run_at = Some(started_at);
        } else {
            stats.failed_runs += 1;
        }
    }

    /// A run is slow when it outlasts the task's interval or the configured
    /// threshold, whichever is shorter.
    fn slow_budget(&self, interval: Duration) -> Duration {
        interval.min(self.slow_threshold)
    }

    pub(crate) fn is_consistently_slow(&self) -> bool {
        let budget = self.slow_budget(self.interval());
        lock(&self.stats).metrics.is_consistently_slow(budget)
    }

    pub(crate) fn snapshot(&self) -> TaskSnapshot {
        let control = *lock(&self.control);
        let stats = lock(&self.stats).clone();
        TaskSnapshot {
            id: self.id,
            interval: control.interval,
            last_run_at: stats.last_run_at,
            is_running: self.guard.is_held(),
            is_stopped: control.stopped,
            total_runs: stats.total_runs,
            failed_runs: stats.failed_runs,
            skipped_ticks: stats.skipped_ticks,
            average_duration: stats.metrics.average(),
            consistently_slow: stats
                .metrics
                .is_consistently_slow(self.slow_budget(control.interval)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(millis: u64) -> Duration {
        Duration::from_millis(millis)
    }

    #[test]
    fn test_metrics_keep_the_latest_runs() {
        let mut metrics = TaskMetrics::new(3);
        for millis in [10, 20, 30, 40] {
            metrics.record(ms(millis));
        }
        assert_eq!(metrics.len(), 3);
        assert_eq!(metrics.average(), ms(30));
    }

    #[test]
    fn test_average_of_empty_window_is_zero() {
        let metrics = TaskMetrics::new(10);
        assert!(metrics.is_empty());
        assert_eq!(metrics.average(), Duration::ZERO);
    }

    #[test]
    fn test_slow_needs_a_full_window_over_budget() {
        let mut metrics = TaskMetrics::new(3);
        metrics.record(ms(150));
        metrics.record(ms(150));
        assert!(!metrics.is_consistently_slow(ms(100)));

        metrics.record(ms(150));
        assert!(metrics.is_consistently_slow(ms(100)));
        assert!(!metrics.is_consistently_slow(ms(150)));

        metrics.record(ms(50));
        assert!(!metrics.is_consistently_slow(ms(100)));
    }

    #[test]
    fn test_zero_capacity_is_clamped() {
        let mut metrics = TaskMetrics::new(0);
        metrics.record(ms(5));
        metrics.record(ms(7));
        assert_eq!(metrics.len(), 1);
        assert_eq!(metrics.average(), ms(7));
    }
}

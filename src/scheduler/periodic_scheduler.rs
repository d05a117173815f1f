//! Periodic task scheduler with per-task skip-if-busy guards

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use log::{debug, info, warn};
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;

use super::clock::{TickCallback, TickClock};
use super::gauge::ConcurrencyGauge;
use super::lock;
use super::task::{TaskEntry, TaskId, TaskMetrics, TaskSnapshot, WorkFn, WorkFuture};
use super::tick::run_tick;
use crate::config::SchedulerConfig;
use crate::error::SchedulerError;

struct Registry {
    tasks: HashMap<TaskId, Arc<TaskEntry>>,
    running: bool,
    root_token: CancellationToken,
}

/// Runs independently configured recurring tasks, never overlapping a task
/// with itself.
///
/// Every task gets its own clock and execution guard. Clock signals are handled
/// on the runtime's worker pool, so tasks never wait on each other. The public
/// operations report failure as `false` and log the reason.
pub struct PeriodicScheduler {
    registry: Mutex<Registry>,
    gauge: Arc<ConcurrencyGauge>,
    config: SchedulerConfig,
    runtime: Handle,
}

impl PeriodicScheduler {
    /// Create a scheduler on the current tokio runtime. Clocks stay paused until [`start`].
    ///
    /// [`start`]: PeriodicScheduler::start
    pub fn new(config: SchedulerConfig) -> Result<Self, SchedulerError> {
        let runtime = Handle::try_current().map_err(|_| SchedulerError::NoRuntime)?;
        Ok(Self::with_runtime(config, runtime))
    }

    pub fn with_runtime(config: SchedulerConfig, runtime: Handle) -> Self {
        Self {
            registry: Mutex::new(Registry {
                tasks: HashMap::new(),
                running: false,
                root_token: CancellationToken::new(),
            }),
            gauge: Arc::new(ConcurrencyGauge::new()),
            config,
            runtime,
        }
    }

    /// Register a task. It fires immediately if the scheduler is running, then
    /// every `interval`.
    ///
    /// A task added before [`start`](PeriodicScheduler::start) is registered
    /// with its clock paused and fires for the first time when `start` runs.
    pub fn add_task<F, Fut>(&self, id: TaskId, interval: Duration, work: F) -> bool
    where
        F: Fn(CancellationToken) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let work: WorkFn = Arc::new(move |token| -> WorkFuture { Box::pin(work(token)) });
        report(self.try_add_task(id, interval, work))
    }

    fn try_add_task(
        &self,
        id: TaskId,
        interval: Duration,
        work: WorkFn,
    ) -> Result<(), SchedulerError> {
        validate_interval(id, interval)?;

        let mut registry = lock(&self.registry);
        if registry.tasks.contains_key(&id) {
            return Err(SchedulerError::RegistrationConflict(id));
        }

        let running = registry.running;
        let cancel = registry.root_token.child_token();
        let entry = Arc::new_cyclic(|weak: &Weak<TaskEntry>| {
            let clock = TickClock::new(&self.runtime, self.tick_callback(weak.clone()));
            TaskEntry::new(
                id,
                interval,
                work,
                clock,
                cancel,
                TaskMetrics::new(self.config.metrics_window),
                self.config.slow_threshold,
                running,
            )
        });
        entry.arm_immediately();
        registry.tasks.insert(id, entry);

        info!("Task {} added (interval {:?})", id, interval);
        Ok(())
    }

    /// Dispose the task's clock and drop the entry. In-flight work is told to
    /// cancel through its token but is not awaited.
    pub fn remove_task(&self, id: TaskId) -> bool {
        report(self.try_remove_task(id))
    }

    fn try_remove_task(&self, id: TaskId) -> Result<(), SchedulerError> {
        let entry = lock(&self.registry)
            .tasks
            .remove(&id)
            .ok_or(SchedulerError::UnknownTask(id))?;
        entry.retire();

        info!("Task {} removed", id);
        Ok(())
    }

    /// Pause the task's clock. In-flight work finishes, no further ticks fire.
    pub fn stop_task(&self, id: TaskId) -> bool {
        report(self.find(id).map(|entry| {
            entry.stop();
            info!("Task {} stopped", id);
        }))
    }

    /// Re-arm a stopped task one interval out.
    pub fn restart_task(&self, id: TaskId) -> bool {
        report(self.find(id).map(|entry| {
            entry.restart();
            info!("Task {} restarted", id);
        }))
    }

    /// Change a task's interval. The next tick fires one new interval from now.
    pub fn reschedule_task(&self, id: TaskId, interval: Duration) -> bool {
        report(self.try_reschedule_task(id, interval))
    }

    fn try_reschedule_task(&self, id: TaskId, interval: Duration) -> Result<(), SchedulerError> {
        validate_interval(id, interval)?;

        let registry = lock(&self.registry);
        let entry = registry
            .tasks
            .get(&id)
            .ok_or(SchedulerError::UnknownTask(id))?;
        entry.set_interval(interval);

        info!("Task {} rescheduled (interval {:?})", id, interval);
        Ok(())
    }

    /// Arm every registered task that is not individually stopped.
    pub fn start(&self) {
        let mut registry = lock(&self.registry);
        if registry.root_token.is_cancelled() {
            registry.root_token = CancellationToken::new();
            for entry in registry.tasks.values() {
                entry.replace_cancellation_token(registry.root_token.child_token());
            }
        }
        registry.running = true;
        for entry in registry.tasks.values() {
            entry.resume_host();
        }

        info!("Periodic scheduler started with {} task(s)", registry.tasks.len());
    }

    /// Pause every clock. Entries are kept and in-flight work is not awaited;
    /// see [`drain`](PeriodicScheduler::drain).
    pub fn shutdown(&self) {
        let mut registry = lock(&self.registry);
        registry.running = false;
        for entry in registry.tasks.values() {
            entry.suspend_host();
        }
        if self.config.cancel_on_shutdown {
            registry.root_token.cancel();
        }

        info!(
            "Periodic scheduler stopped ({} tick(s) still in flight)",
            self.gauge.current()
        );
    }

    /// Wait until no tick is in flight. Returns `false` if `timeout` elapsed first.
    pub async fn drain(&self, timeout: Duration) -> bool {
        match tokio::time::timeout(timeout, self.gauge.wait_idle()).await {
            Ok(()) => true,
            Err(_) => {
                warn!(
                    "Gave up waiting for {} in-flight tick(s) after {:?}",
                    self.gauge.current(),
                    timeout
                );
                false
            }
        }
    }

    pub fn snapshot(&self, id: TaskId) -> Option<TaskSnapshot> {
        lock(&self.registry).tasks.get(&id).map(|entry| entry.snapshot())
    }

    pub fn task_ids(&self) -> Vec<TaskId> {
        let mut ids: Vec<_> = lock(&self.registry).tasks.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub fn len(&self) -> usize {
        lock(&self.registry).tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_running(&self) -> bool {
        lock(&self.registry).running
    }

    /// Tick attempts currently in flight across all tasks.
    pub fn in_flight(&self) -> usize {
        self.gauge.current()
    }

    fn find(&self, id: TaskId) -> Result<Arc<TaskEntry>, SchedulerError> {
        lock(&self.registry)
            .tasks
            .get(&id)
            .cloned()
            .ok_or(SchedulerError::UnknownTask(id))
    }

    /// The clock only holds a weak reference so a removed entry is freed even
    /// while its driver is still winding down.
    fn tick_callback(&self, entry: Weak<TaskEntry>) -> TickCallback {
        let gauge = self.gauge.clone();
        let runtime = self.runtime.clone();
        let policy = self.config.failure_policy;
        Box::new(move || {
            let Some(entry) = entry.upgrade() else {
                debug!("Clock fired for a dropped task, ignoring");
                return;
            };
            runtime.spawn(run_tick(entry, gauge.clone(), policy));
        })
    }
}

impl Drop for PeriodicScheduler {
    fn drop(&mut self) {
        let registry = lock(&self.registry);
        for entry in registry.tasks.values() {
            entry.retire();
        }
    }
}

fn validate_interval(id: TaskId, interval: Duration) -> Result<(), SchedulerError> {
    if interval.is_zero() {
        return Err(SchedulerError::InvalidInterval { id, interval });
    }
    Ok(())
}

fn report(result: Result<(), SchedulerError>) -> bool {
    match result {
        Ok(()) => true,
        Err(e) => {
            warn!("{}", e);
            false
        }
    }
}

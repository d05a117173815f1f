//! Repeating per-task timer that can be paused and re-armed at runtime

use std::sync::{Arc, Mutex};
use std::time::Duration;

use log::trace;
use tokio::runtime::Handle;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep_until};

use super::lock;

/// Invoked by the clock driver every time the clock fires.
pub type TickCallback = Box<dyn Fn() + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Schedule {
    Paused,
    Armed { next: Instant, period: Duration },
}

impl Schedule {
    fn after(from: Instant, delay: Duration, period: Duration) -> Self {
        match from.checked_add(delay) {
            Some(next) => Schedule::Armed { next, period },
            None => Schedule::Paused,
        }
    }
}

#[derive(Debug)]
struct ClockState {
    schedule: Schedule,
    /// Bumped by every external change so the driver never overwrites a newer schedule.
    revision: u64,
}

#[derive(Debug)]
struct Shared {
    state: Mutex<ClockState>,
    changed: Notify,
}

/// A timer that signals with a due time followed by a fixed period.
///
/// Each clock owns a small driver task on the runtime it was created on. The
/// driver only signals; whatever the callback does runs elsewhere, so a slow
/// callback never delays the clock itself. A new clock starts paused.
pub struct TickClock {
    shared: Arc<Shared>,
    driver: JoinHandle<()>,
}

impl TickClock {
    pub fn new(runtime: &Handle, on_tick: TickCallback) -> Self {
        let shared = Arc::new(Shared {
            state: Mutex::new(ClockState {
                schedule: Schedule::Paused,
                revision: 0,
            }),
            changed: Notify::new(),
        });
        let driver = runtime.spawn(drive(shared.clone(), on_tick));
        Self { shared, driver }
    }

    /// Fire after `due`, then every `period` until changed again. A due time
    /// too far out to represent is never reached, so the clock stays paused.
    pub fn change(&self, due: Duration, period: Duration) {
        self.set(Schedule::after(Instant::now(), due, period));
    }

    /// Stop signalling. Nothing is replayed when the clock is armed again.
    pub fn pause(&self) {
        self.set(Schedule::Paused);
    }

    pub fn is_armed(&self) -> bool {
        matches!(lock(&self.shared.state).schedule, Schedule::Armed { .. })
    }

    /// Pause for good and tear the driver down.
    pub fn dispose(&self) {
        self.pause();
        self.driver.abort();
    }

    fn set(&self, schedule: Schedule) {
        {
            let mut state = lock(&self.shared.state);
            state.schedule = schedule;
            state.revision = state.revision.wrapping_add(1);
        }
        self.shared.changed.notify_one();
    }
}

impl Drop for TickClock {
    fn drop(&mut self) {
        self.driver.abort();
    }
}

async fn drive(shared: Arc<Shared>, on_tick: TickCallback) {
    loop {
        let (schedule, revision) = {
            let state = lock(&shared.state);
            (state.schedule, state.revision)
        };

        match schedule {
            Schedule::Paused => shared.changed.notified().await,
            Schedule::Armed { next, period } => {
                tokio::select! {
                    _ = sleep_until(next) => {
                        let fire = {
                            let mut state = lock(&shared.state);
                            if state.revision == revision {
                                state.schedule = match next.checked_add(period) {
                                    Some(following) => Schedule::Armed {
                                        next: following.max(Instant::now()),
                                        period,
                                    },
                                    None => Schedule::Paused,
                                };
                                true
                            } else {
                                false
                            }
                        };
                        if fire {
                            trace!("Clock fired (period {:?})", period);
                            on_tick();
                        }
                    }
                    _ = shared.changed.notified() => {}
                }
            }
        }
    }
}

//! What happens every time a task's clock fires

use std::any::Any;
use std::sync::Arc;

use chrono::Local;
use log::{debug, error, warn};
use tokio::time::Instant;

use super::gauge::ConcurrencyGauge;
use super::task::TaskEntry;
use crate::config::WorkFailurePolicy;
use crate::error::SchedulerError;

/// Handle one tick of `entry`.
///
/// A tick that finds the task still running is dropped. Otherwise the clock is
/// paused for the duration of the work and re-armed one interval after it ends,
/// so slow work drifts the cadence instead of overlapping itself.
pub(crate) async fn run_tick(
    entry: Arc<TaskEntry>,
    gauge: Arc<ConcurrencyGauge>,
    policy: WorkFailurePolicy,
) {
    let ticket = gauge.enter();

    match entry.guard().try_acquire() {
        None => {
            entry.record_skip();
            warn!(
                "Task {} is still running, skipping tick (in-flight ticks: {})",
                entry.id(),
                ticket.level()
            );
        }
        Some(_permit) if !entry.begin_run() => {
            entry.record_skip();
            debug!("Task {} was stopped after its clock fired, skipping tick", entry.id());
        }
        Some(_permit) => {
            let started_at = Local::now();
            let started = Instant::now();
            let outcome = invoke(&entry).await;
            let elapsed = started.elapsed();
            entry.record_run(started_at, elapsed, outcome.is_ok());

            let interval = entry.interval();
            if elapsed > interval {
                warn!(
                    "Task {} took {:?} (longer than interval {:?})",
                    entry.id(),
                    elapsed,
                    interval
                );
            } else {
                debug!("Task {} completed in {:?}", entry.id(), elapsed);
            }
            if entry.is_consistently_slow() {
                warn!("Task {} has been consistently slow", entry.id());
            }

            if let Err(e) = outcome {
                error!("{}", e);
                if policy == WorkFailurePolicy::StopTask {
                    warn!("Stopping task {} after failed run", entry.id());
                    entry.stop();
                }
            }
        }
    }

    entry.rearm();
    drop(ticket);
}

/// Run the work on its own tokio task so a panic is reported as a failure
/// instead of tearing down the tick handler.
async fn invoke(entry: &TaskEntry) -> Result<(), SchedulerError> {
    let id = entry.id();
    let work = entry.work().clone();
    let token = entry.cancellation_token();

    match tokio::spawn(async move { work(token).await }).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(source)) => Err(SchedulerError::WorkFailed { id, source }),
        Err(join_error) if join_error.is_panic() => Err(SchedulerError::WorkPanicked {
            id,
            message: panic_message(join_error.into_panic()),
        }),
        Err(_) => Err(SchedulerError::WorkAborted { id }),
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#![allow(dead_code)]
use pollwheel::scheduler::WorkFuture;
use pollwheel::{PeriodicScheduler, SchedulerConfig};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// A scheduler on the current runtime that is already running.
pub fn running_scheduler(config: SchedulerConfig) -> PeriodicScheduler {
    init_logging();
    let scheduler = PeriodicScheduler::new(config).expect("test runs inside a tokio runtime");
    scheduler.start();
    scheduler
}

#[derive(Default)]
struct Inner {
    runs: AtomicUsize,
    active: AtomicUsize,
    max_active: AtomicUsize,
    spans: Mutex<Vec<(Instant, Instant)>>,
}

/// Records every invocation of the work it hands out.
#[derive(Clone, Default)]
pub struct RunRecorder {
    inner: Arc<Inner>,
}

impl RunRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Work that takes `duration` of (virtual) time and succeeds.
    pub fn work(
        &self,
        duration: Duration,
    ) -> impl Fn(CancellationToken) -> WorkFuture + Send + Sync + use<> {
        let recorder = self.clone();
        move |_token| -> WorkFuture {
            let recorder = recorder.clone();
            Box::pin(async move {
                let started = recorder.enter();
                if !duration.is_zero() {
                    tokio::time::sleep(duration).await;
                }
                recorder.exit(started);
                anyhow::Ok(())
            })
        }
    }

    pub fn instant_work(&self) -> impl Fn(CancellationToken) -> WorkFuture + Send + Sync + use<> {
        self.work(Duration::ZERO)
    }

    pub fn runs(&self) -> usize {
        self.inner.runs.load(Ordering::SeqCst)
    }

    pub fn max_active(&self) -> usize {
        self.inner.max_active.load(Ordering::SeqCst)
    }

    /// Completed invocations as (entry, exit) pairs, ordered by entry.
    pub fn spans(&self) -> Vec<(Instant, Instant)> {
        let mut spans = self.inner.spans.lock().unwrap().clone();
        spans.sort_by_key(|(start, _)| *start);
        spans
    }

    fn enter(&self) -> Instant {
        self.inner.runs.fetch_add(1, Ordering::SeqCst);
        let active = self.inner.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.inner.max_active.fetch_max(active, Ordering::SeqCst);
        Instant::now()
    }

    fn exit(&self, started: Instant) {
        self.inner.active.fetch_sub(1, Ordering::SeqCst);
        self.inner
            .spans
            .lock()
            .unwrap()
            .push((started, Instant::now()));
    }
}

//! Process-wide counter of in-flight tick attempts

use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::Notify;

/// Counts tick handlers currently between entering and leaving, across all
/// tasks of one scheduler. Diagnostic only; scheduling never reads it.
#[derive(Debug, Default)]
pub struct ConcurrencyGauge {
    in_flight: AtomicUsize,
    idle: Notify,
}

/// Held for the lifetime of one tick attempt. Leaving the gauge happens on drop.
#[derive(Debug)]
pub struct GaugeTicket<'a> {
    gauge: &'a ConcurrencyGauge,
    level: usize,
}

impl ConcurrencyGauge {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enter(&self) -> GaugeTicket<'_> {
        let level = self.in_flight.fetch_add(1, Ordering::AcqRel) + 1;
        GaugeTicket { gauge: self, level }
    }

    pub fn current(&self) -> usize {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Resolves once no tick attempt is in flight.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.idle.notified();
            if self.current() == 0 {
                return;
            }
            notified.await;
        }
    }
}

impl GaugeTicket<'_> {
    /// Gauge value observed right after this ticket entered.
    pub fn level(&self) -> usize {
        self.level
    }
}

impl Drop for GaugeTicket<'_> {
    fn drop(&mut self) {
        if self.gauge.in_flight.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.gauge.idle.notify_waiters();
        }
    }
}

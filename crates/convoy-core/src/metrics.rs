//! Process-wide event bus counters.
//!
//! The emitter and the emit modules bump [`METRICS`] as they go. A run
//! takes a [`MetricsSnapshot`] before it starts and reports the delta,
//! logged as one `tracing::info!` event by [`MetricsSnapshot::log`].

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Global metrics singleton.
pub static METRICS: Metrics = Metrics::new();

pub struct Metrics {
    events_dispatched: AtomicU64,
    handler_failures: AtomicU64,
    assets_emitted: AtomicU64,
}

/// Counter values at one point in time, or the difference of two.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    /// Emissions of any kind, including ones nobody listened to.
    pub events_dispatched: u64,
    /// Non-blocking handlers that returned an error.
    pub handler_failures: u64,
    pub assets_emitted: u64,
}

impl MetricsSnapshot {
    /// Counts accumulated between `earlier` and `self`.
    pub fn since(self, earlier: MetricsSnapshot) -> MetricsSnapshot {
        MetricsSnapshot {
            events_dispatched: self.events_dispatched.saturating_sub(earlier.events_dispatched),
            handler_failures: self.handler_failures.saturating_sub(earlier.handler_failures),
            assets_emitted: self.assets_emitted.saturating_sub(earlier.assets_emitted),
        }
    }

    pub fn log(&self) {
        tracing::info!(
            metric = "pipeline",
            events_dispatched = self.events_dispatched,
            handler_failures = self.handler_failures,
            assets_emitted = self.assets_emitted,
        );
    }
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            events_dispatched: AtomicU64::new(0),
            handler_failures: AtomicU64::new(0),
            assets_emitted: AtomicU64::new(0),
        }
    }

    pub fn inc_events_dispatched(&self) {
        self.events_dispatched.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_handler_failures(&self) {
        self.handler_failures.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "handler_failures", "counter incremented");
    }

    pub fn inc_assets_emitted(&self) {
        self.assets_emitted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            events_dispatched: self.events_dispatched.load(Ordering::Relaxed),
            handler_failures: self.handler_failures.load(Ordering::Relaxed),
            assets_emitted: self.assets_emitted.load(Ordering::Relaxed),
        }
    }
}

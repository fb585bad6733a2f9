//! Global atomic counters for scan observability.
//!
//! Counters are incremented silently at the call site. Call
//! [`Metrics::flush`] to emit current values as a single
//! `tracing::info!` event (e.g. when a batch of scans finishes).

use std::sync::atomic::{AtomicU64, Ordering};

/// Global metrics singleton.
pub static METRICS: Metrics = Metrics::new();

/// Lightweight atomic counters.
pub struct Metrics {
    scans_started: AtomicU64,
    scans_completed: AtomicU64,
    scans_failed: AtomicU64,
    navigation_fallbacks: AtomicU64,
    heatmap_nodes_dropped: AtomicU64,
    secondary_degraded: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            scans_started: AtomicU64::new(0),
            scans_completed: AtomicU64::new(0),
            scans_failed: AtomicU64::new(0),
            navigation_fallbacks: AtomicU64::new(0),
            heatmap_nodes_dropped: AtomicU64::new(0),
            secondary_degraded: AtomicU64::new(0),
        }
    }

    pub fn inc_scans_started(&self) {
        self.scans_started.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "scans_started", "counter incremented");
    }

    pub fn inc_scans_completed(&self) {
        self.scans_completed.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "scans_completed", "counter incremented");
    }

    pub fn inc_scans_failed(&self) {
        self.scans_failed.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "scans_failed", "counter incremented");
    }

    pub fn inc_navigation_fallbacks(&self) {
        self.navigation_fallbacks.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "navigation_fallbacks", "counter incremented");
    }

    /// Add `n` stale-selector drops from one correlation pass.
    pub fn add_heatmap_nodes_dropped(&self, n: u64) {
        if n == 0 {
            return;
        }
        self.heatmap_nodes_dropped.fetch_add(n, Ordering::Relaxed);
        tracing::trace!(metric = "heatmap_nodes_dropped", n, "counter incremented");
    }

    pub fn inc_secondary_degraded(&self) {
        self.secondary_degraded.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "secondary_degraded", "counter incremented");
    }

    /// Emit all current counter values as a single `info!` event.
    pub fn flush(&self) {
        tracing::info!(
            metric = "flush",
            scans_started = self.scans_started(),
            scans_completed = self.scans_completed(),
            scans_failed = self.scans_failed(),
            navigation_fallbacks = self.navigation_fallbacks(),
            heatmap_nodes_dropped = self.heatmap_nodes_dropped(),
            secondary_degraded = self.secondary_degraded(),
        );
    }

    pub fn scans_started(&self) -> u64 {
        self.scans_started.load(Ordering::Relaxed)
    }

    pub fn scans_completed(&self) -> u64 {
        self.scans_completed.load(Ordering::Relaxed)
    }

    pub fn scans_failed(&self) -> u64 {
        self.scans_failed.load(Ordering::Relaxed)
    }

    pub fn navigation_fallbacks(&self) -> u64 {
        self.navigation_fallbacks.load(Ordering::Relaxed)
    }

    pub fn heatmap_nodes_dropped(&self) -> u64 {
        self.heatmap_nodes_dropped.load(Ordering::Relaxed)
    }

    pub fn secondary_degraded(&self) -> u64 {
        self.secondary_degraded.load(Ordering::Relaxed)
    }

    /// Reset all counters to zero (useful in tests).
    pub fn reset(&self) {
        self.scans_started.store(0, Ordering::Relaxed);
        self.scans_completed.store(0, Ordering::Relaxed);
        self.scans_failed.store(0, Ordering::Relaxed);
        self.navigation_fallbacks.store(0, Ordering::Relaxed);
        self.heatmap_nodes_dropped.store(0, Ordering::Relaxed);
        self.secondary_degraded.store(0, Ordering::Relaxed);
    }
}

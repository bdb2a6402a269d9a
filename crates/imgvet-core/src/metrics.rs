//! Global atomic counters for vetting observability.
//!
//! Counters are incremented silently at the call site. Call
//! [`Metrics::flush`] to emit current values as a single
//! `tracing::info!` event (e.g. at the end of a batch).

use std::sync::atomic::{AtomicU64, Ordering};

/// Global metrics singleton.
pub static METRICS: Metrics = Metrics::new();

/// Process-wide vetting counters.
pub struct Metrics {
    vets_started: AtomicU64,
    vets_passed: AtomicU64,
    vets_failed: AtomicU64,
    vets_errored: AtomicU64,
    checks_evaluated: AtomicU64,
    occurrences_published: AtomicU64,
    publish_failures: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            vets_started: AtomicU64::new(0),
            vets_passed: AtomicU64::new(0),
            vets_failed: AtomicU64::new(0),
            vets_errored: AtomicU64::new(0),
            checks_evaluated: AtomicU64::new(0),
            occurrences_published: AtomicU64::new(0),
            publish_failures: AtomicU64::new(0),
        }
    }

    pub fn inc_vets_started(&self) {
        self.vets_started.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "vets_started", "counter incremented");
    }

    pub fn inc_vets_passed(&self) {
        self.vets_passed.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "vets_passed", "counter incremented");
    }

    pub fn inc_vets_failed(&self) {
        self.vets_failed.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "vets_failed", "counter incremented");
    }

    pub fn inc_vets_errored(&self) {
        self.vets_errored.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "vets_errored", "counter incremented");
    }

    pub fn inc_checks_evaluated(&self) {
        self.checks_evaluated.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "checks_evaluated", "counter incremented");
    }

    pub fn inc_occurrences_published(&self) {
        self.occurrences_published.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "occurrences_published", "counter incremented");
    }

    pub fn inc_publish_failures(&self) {
        self.publish_failures.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "publish_failures", "counter incremented");
    }

    /// Emit all current counter values as a single `info!` event.
    ///
    /// Call this at natural boundaries (end of a batch, daemon tick, etc.)
    /// rather than on every increment.
    pub fn flush(&self) {
        tracing::info!(
            metric = "flush",
            vets_started = self.vets_started(),
            vets_passed = self.vets_passed(),
            vets_failed = self.vets_failed(),
            vets_errored = self.vets_errored(),
            checks_evaluated = self.checks_evaluated(),
            occurrences_published = self.occurrences_published(),
            publish_failures = self.publish_failures(),
        );
    }

    pub fn vets_started(&self) -> u64 {
        self.vets_started.load(Ordering::Relaxed)
    }

    pub fn vets_passed(&self) -> u64 {
        self.vets_passed.load(Ordering::Relaxed)
    }

    pub fn vets_failed(&self) -> u64 {
        self.vets_failed.load(Ordering::Relaxed)
    }

    pub fn vets_errored(&self) -> u64 {
        self.vets_errored.load(Ordering::Relaxed)
    }

    pub fn checks_evaluated(&self) -> u64 {
        self.checks_evaluated.load(Ordering::Relaxed)
    }

    pub fn occurrences_published(&self) -> u64 {
        self.occurrences_published.load(Ordering::Relaxed)
    }

    pub fn publish_failures(&self) -> u64 {
        self.publish_failures.load(Ordering::Relaxed)
    }

    /// Reset all counters to zero (useful in tests).
    pub fn reset(&self) {
        for counter in [
            &self.vets_started,
            &self.vets_passed,
            &self.vets_failed,
            &self.vets_errored,
            &self.checks_evaluated,
            &self.occurrences_published,
            &self.publish_failures,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_increment() {
        let m = Metrics::new();
        m.inc_vets_started();
        m.inc_vets_started();
        assert_eq!(m.vets_started(), 2);

        m.inc_checks_evaluated();
        m.inc_occurrences_published();
        m.inc_publish_failures();
        assert_eq!(m.checks_evaluated(), 1);
        assert_eq!(m.occurrences_published(), 1);
        assert_eq!(m.publish_failures(), 1);
    }

    #[test]
    fn reset_zeroes_all() {
        let m = Metrics::new();
        m.inc_vets_passed();
        m.inc_vets_failed();
        m.inc_vets_errored();
        m.reset();
        assert_eq!(m.vets_passed(), 0);
        assert_eq!(m.vets_failed(), 0);
        assert_eq!(m.vets_errored(), 0);
    }
}

//! Pool counters.

use std::sync::atomic::{AtomicU64, Ordering};

/// Snapshot of pool counters since creation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolMetrics {
    /// Physical connections successfully dialed.
    pub connections_created: u64,
    /// Physical connections closed by the pool (expired, over idle
    /// capacity, failed validation, discarded, or closed at shutdown).
    pub connections_closed: u64,
    /// `acquire` calls that returned a connection.
    pub checkouts_successful: u64,
    /// `acquire` calls that returned an error.
    pub checkouts_failed: u64,
    /// Idle connections that failed the borrow-time role check.
    pub validation_failures: u64,
    /// Idle connections dropped for exceeding the idle timeout.
    pub idle_expired: u64,
}

impl PoolMetrics {
    /// Fraction of `acquire` calls that succeeded, 1.0 when none were made.
    #[must_use]
    pub fn checkout_success_rate(&self) -> f64 {
        let total = self.checkouts_successful + self.checkouts_failed;
        if total == 0 {
            1.0
        } else {
            self.checkouts_successful as f64 / total as f64
        }
    }
}

#[derive(Debug, Default)]
pub(crate) struct PoolCounters {
    connections_created: AtomicU64,
    connections_closed: AtomicU64,
    checkouts_successful: AtomicU64,
    checkouts_failed: AtomicU64,
    validation_failures: AtomicU64,
    idle_expired: AtomicU64,
}

impl PoolCounters {
    pub(crate) fn connection_created(&self) {
        self.connections_created.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn connections_closed(&self, n: usize) {
        self.connections_closed.fetch_add(n as u64, Ordering::Relaxed);
    }

    pub(crate) fn checkout(&self, ok: bool) {
        let counter = if ok {
            &self.checkouts_successful
        } else {
            &self.checkouts_failed
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn validation_failed(&self) {
        self.validation_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn idle_expired(&self, n: usize) {
        self.idle_expired.fetch_add(n as u64, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> PoolMetrics {
        PoolMetrics {
            connections_created: self.connections_created.load(Ordering::Relaxed),
            connections_closed: self.connections_closed.load(Ordering::Relaxed),
            checkouts_successful: self.checkouts_successful.load(Ordering::Relaxed),
            checkouts_failed: self.checkouts_failed.load(Ordering::Relaxed),
            validation_failures: self.validation_failures.load(Ordering::Relaxed),
            idle_expired: self.idle_expired.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_rate() {
        assert!((PoolMetrics::default().checkout_success_rate() - 1.0).abs() < f64::EPSILON);

        let counters = PoolCounters::default();
        counters.checkout(true);
        counters.checkout(true);
        counters.checkout(true);
        counters.checkout(false);
        let metrics = counters.snapshot();
        assert_eq!(metrics.checkouts_successful, 3);
        assert_eq!(metrics.checkouts_failed, 1);
        assert!((metrics.checkout_success_rate() - 0.75).abs() < f64::EPSILON);
    }
}

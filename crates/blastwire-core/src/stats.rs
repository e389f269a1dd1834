//! Call statistics.
//!
//! Lock-free counters updated by the host-facing clients after every call.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::Serialize;

/// How a finished call is classified.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Decoded result that passed the acceptability check.
    Valid,
    /// Decoded result that failed the acceptability check.
    Invalid,
    /// The peer answered with an error value.
    RpcError,
    /// The call never produced a result (transport, codec, timeout).
    TransportError,
}

#[derive(Debug, Default)]
pub struct CallStats {
    requests: AtomicU64,
    valid: AtomicU64,
    invalid: AtomicU64,
    rpc_errors: AtomicU64,
    transport_errors: AtomicU64,
    /// Total call duration in microseconds.
    duration_us: AtomicU64,
}

/// Point-in-time copy of [`CallStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub requests: u64,
    pub valid: u64,
    pub invalid: u64,
    pub rpc_errors: u64,
    pub transport_errors: u64,
    pub total_duration_us: u64,
}

impl StatsSnapshot {
    /// Mean call duration, zero when nothing was recorded.
    pub fn mean_duration(&self) -> Duration {
        match self.total_duration_us.checked_div(self.requests) {
            Some(us) => Duration::from_micros(us),
            None => Duration::ZERO,
        }
    }
}

impl CallStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one finished call.
    pub fn record(&self, outcome: Outcome, elapsed: Duration) {
        self.requests.fetch_add(1, Ordering::Relaxed);
        let counter = match outcome {
            Outcome::Valid => &self.valid,
            Outcome::Invalid => &self.invalid,
            Outcome::RpcError => &self.rpc_errors,
            Outcome::TransportError => &self.transport_errors,
        };
        counter.fetch_add(1, Ordering::Relaxed);
        let us = u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX);
        self.duration_us.fetch_add(us, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            requests: self.requests.load(Ordering::Relaxed),
            valid: self.valid.load(Ordering::Relaxed),
            invalid: self.invalid.load(Ordering::Relaxed),
            rpc_errors: self.rpc_errors.load(Ordering::Relaxed),
            transport_errors: self.transport_errors.load(Ordering::Relaxed),
            total_duration_us: self.duration_us.load(Ordering::Relaxed),
        }
    }

    /// Reset every counter for a new window.
    pub fn reset(&self) {
        for counter in [
            &self.requests,
            &self.valid,
            &self.invalid,
            &self.rpc_errors,
            &self.transport_errors,
            &self.duration_us,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcomes_land_in_their_counters() {
        let stats = CallStats::new();
        stats.record(Outcome::Valid, Duration::from_millis(10));
        stats.record(Outcome::Invalid, Duration::from_millis(20));
        stats.record(Outcome::RpcError, Duration::from_millis(30));
        stats.record(Outcome::TransportError, Duration::from_millis(40));

        let snap = stats.snapshot();
        assert_eq!(snap.requests, 4);
        assert_eq!(
            (snap.valid, snap.invalid, snap.rpc_errors, snap.transport_errors),
            (1, 1, 1, 1)
        );
        assert_eq!(snap.mean_duration(), Duration::from_millis(25));
    }

    #[test]
    fn reset_clears_everything() {
        let stats = CallStats::new();
        stats.record(Outcome::Valid, Duration::from_secs(1));
        stats.reset();
        assert_eq!(stats.snapshot(), StatsSnapshot::default());
        assert_eq!(stats.snapshot().mean_duration(), Duration::ZERO);
    }
}

//! Per-server statistics recorder.
//!
//! Response time is tracked as an exponentially weighted moving average so the
//! weighted rule sees recent latency without keeping a sample window. Failure
//! and in-flight counts are plain atomics.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use super::ServerStats;

/// Default decay for the response time average.
pub const DEFAULT_DECAY_ALPHA: f64 = 0.8;

/// Rolling statistics for a single server.
#[derive(Debug)]
pub struct ServerStatsRecorder {
    /// The moving average in milliseconds.
    /// Stored as bits of an f64 to allow lock-free atomic updates.
    avg_response_ms: AtomicU64,

    /// The decay rate. A higher alpha (e.g. 0.9) means older samples decay slower.
    /// A lower alpha (e.g. 0.1) means the average favors recent data heavily.
    decay_alpha: f64,

    /// Number of samples folded into the average.
    samples: AtomicU64,

    /// Failures observed since the last window reset.
    failures: AtomicU64,

    /// The number of active, in-flight requests to this server.
    active_requests: AtomicU64,
}

impl ServerStatsRecorder {
    /// Create a recorder with a specified decay alpha.
    pub fn new(decay_alpha: f64) -> Self {
        Self {
            avg_response_ms: AtomicU64::new(0f64.to_bits()),
            decay_alpha: decay_alpha.clamp(0.0, 1.0),
            samples: AtomicU64::new(0),
            failures: AtomicU64::new(0),
            active_requests: AtomicU64::new(0),
        }
    }

    /// Read the current moving average in milliseconds.
    pub fn avg_response_ms(&self) -> f64 {
        f64::from_bits(self.avg_response_ms.load(Ordering::Relaxed))
    }

    /// Fold a completed call into the statistics.
    pub fn record_response(&self, elapsed: Duration, success: bool) {
        if !success {
            self.failures.fetch_add(1, Ordering::Relaxed);
        }
        self.observe_latency(elapsed.as_secs_f64() * 1000.0);
    }

    /// Update the moving average with a newly observed latency sample.
    pub fn observe_latency(&self, rtt_ms: f64) {
        // The first sample seeds the average instead of decaying from zero.
        let first = self.samples.fetch_add(1, Ordering::AcqRel) == 0;
        let mut current_bits = self.avg_response_ms.load(Ordering::Acquire);

        loop {
            let current = f64::from_bits(current_bits);
            let next = if first {
                rtt_ms
            } else {
                (rtt_ms * (1.0 - self.decay_alpha)) + (current * self.decay_alpha)
            };

            match self.avg_response_ms.compare_exchange_weak(
                current_bits,
                next.to_bits(),
                Ordering::Release,
                Ordering::Relaxed,
            ) {
                Ok(_) => break,
                Err(updated_bits) => current_bits = updated_bits,
            }
        }
    }

    /// Record a failure that did not produce a latency sample (e.g. connect refused).
    pub fn record_failure(&self) {
        self.failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Start a new failure window.
    pub fn reset_failures(&self) {
        self.failures.store(0, Ordering::Relaxed);
    }

    /// Increment the active request counter and return a guard
    /// that will decrement it when dropped.
    pub fn increment_active(&self) -> ActiveRequestGuard<'_> {
        self.active_requests.fetch_add(1, Ordering::Relaxed);
        ActiveRequestGuard { recorder: self }
    }

    /// Read a snapshot of the current values.
    pub fn snapshot(&self) -> ServerStats {
        ServerStats {
            avg_response_time_ms: self.avg_response_ms(),
            failure_count: self.failures.load(Ordering::Relaxed),
            active_requests: self.active_requests.load(Ordering::Relaxed),
        }
    }
}

impl Default for ServerStatsRecorder {
    fn default() -> Self {
        Self::new(DEFAULT_DECAY_ALPHA)
    }
}

/// A RAII guard that decrements the in-flight count for a server
/// when the request finishes and drops the guard.
pub struct ActiveRequestGuard<'a> {
    recorder: &'a ServerStatsRecorder,
}

impl<'a> Drop for ActiveRequestGuard<'a> {
    fn drop(&mut self) {
        self.recorder.active_requests.fetch_sub(1, Ordering::Relaxed);
    }
}

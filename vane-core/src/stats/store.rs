//! In-process statistics store keyed by server identity.

use std::sync::Arc;

use dashmap::DashMap;
use serde::Serialize;

use super::{ServerStats, ServerStatsRecorder, StatsProvider};
use crate::domain::Server;
use crate::error::Result;

/// Aggregate view across every tracked server.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct StatsSummary {
    /// Number of servers with a recorder.
    pub servers: usize,
    /// Sum of in-flight calls.
    pub active_requests: u64,
    /// Sum of windowed failures.
    pub failure_count: u64,
    /// Mean of per-server average response times.
    pub mean_response_time_ms: f64,
}

/// Statistics for every server a balancer has talked to.
///
/// Recorders are created on first access, so reading stats for an unseen
/// server yields zeros instead of an error.
#[derive(Debug)]
pub struct LoadBalancerStats {
    name: String,
    decay_alpha: f64,
    recorders: DashMap<String, Arc<ServerStatsRecorder>>,
}

impl LoadBalancerStats {
    /// Create an empty store for the named balancer.
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_decay(name, super::recorder::DEFAULT_DECAY_ALPHA)
    }

    /// Create an empty store whose recorders use the given decay alpha.
    pub fn with_decay(name: impl Into<String>, decay_alpha: f64) -> Self {
        Self {
            name: name.into(),
            decay_alpha,
            recorders: DashMap::new(),
        }
    }

    /// Name of the owning balancer.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Recorder for a server, created on first use.
    pub fn recorder(&self, server: &Server) -> Arc<ServerStatsRecorder> {
        self.recorders
            .entry(server.host_port())
            .or_insert_with(|| Arc::new(ServerStatsRecorder::new(self.decay_alpha)))
            .value()
            .clone()
    }

    /// Drop the recorder for a server that left the pool.
    pub fn remove(&self, server: &Server) {
        self.recorders.remove(&server.host_port());
    }

    /// Aggregate the current values of every recorder.
    pub fn summary(&self) -> StatsSummary {
        let mut summary = StatsSummary::default();
        let mut total_response = 0.0;

        for entry in self.recorders.iter() {
            let snap = entry.value().snapshot();
            summary.servers += 1;
            summary.active_requests += snap.active_requests;
            summary.failure_count += snap.failure_count;
            total_response += snap.avg_response_time_ms;
        }

        if summary.servers > 0 {
            summary.mean_response_time_ms = total_response / summary.servers as f64;
        }
        summary
    }
}

impl StatsProvider for LoadBalancerStats {
    fn stats_for(&self, server: &Server) -> Result<ServerStats> {
        Ok(self.recorder(server).snapshot())
    }
}

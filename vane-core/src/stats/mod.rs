//! Server statistics: the read view rules and filters consume, and the
//! in-process store that backs it.

pub mod recorder;
pub mod store;

use std::sync::Arc;

use serde::Serialize;

use crate::domain::Server;
use crate::error::Result;

pub use recorder::{ActiveRequestGuard, ServerStatsRecorder};
pub use store::{LoadBalancerStats, StatsSummary};

/// A consistent snapshot of one server's statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct ServerStats {
    /// Rolling average response time in milliseconds.
    pub avg_response_time_ms: f64,
    /// Failures in the current window.
    pub failure_count: u64,
    /// Calls currently in flight.
    pub active_requests: u64,
}

/// Read access to per-server statistics.
pub trait StatsProvider: Send + Sync {
    /// Snapshot the statistics for a server.
    fn stats_for(&self, server: &Server) -> Result<ServerStats>;
}

/// A shared reference to a stats provider.
pub type SharedStats = Arc<dyn StatsProvider>;

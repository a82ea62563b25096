//! Round-robin rotation over alive servers.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwapOption;
use tracing::warn;

use super::rule::{BalancerHandle, Rule};
use crate::domain::SharedServer;
use crate::error::Result;

/// Round-robin rule.
///
/// Each call advances a shared cursor and skips servers that are not alive,
/// visiting every position at most once.
#[derive(Debug, Default)]
pub struct RoundRobinRule {
    balancer: ArcSwapOption<BalancerHandle>,
    next: AtomicUsize,
}

impl RoundRobinRule {
    /// Create an unbound round-robin rule.
    pub fn new() -> Self {
        Self::default()
    }

    /// Rotate over the given list.
    pub fn choose_from(&self, servers: &[SharedServer]) -> Option<SharedServer> {
        if servers.is_empty() {
            return None;
        }

        for _ in 0..servers.len() {
            let idx = self.next.fetch_add(1, Ordering::Relaxed) % servers.len();
            let server = &servers[idx];
            if server.is_alive() {
                return Some(server.clone());
            }
        }

        warn!(servers = servers.len(), "No alive servers available for round robin");
        None
    }
}

impl Rule for RoundRobinRule {
    fn initialize(&self, balancer: BalancerHandle) -> Result<()> {
        self.balancer.store(Some(Arc::new(balancer)));
        Ok(())
    }

    fn choose(&self, _key: Option<&str>) -> Option<SharedServer> {
        let balancer = self.balancer.load_full()?;
        let servers = balancer.servers().all_servers();
        self.choose_from(&servers)
    }
}

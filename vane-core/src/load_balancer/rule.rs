//! The selection rule contract and the handle rules are bound to.

use std::fmt;
use std::sync::Arc;

use crate::domain::{ServerSource, SharedServer};
use crate::error::Result;
use crate::stats::SharedStats;

/// What a rule needs from its load balancer: the servers to pick from and
/// their statistics.
#[derive(Clone)]
pub struct BalancerHandle {
    name: Arc<str>,
    servers: Arc<dyn ServerSource>,
    stats: SharedStats,
}

impl BalancerHandle {
    /// Bundle a server source and a stats provider under a balancer name.
    pub fn new(name: impl Into<Arc<str>>, servers: Arc<dyn ServerSource>, stats: SharedStats) -> Self {
        Self {
            name: name.into(),
            servers,
            stats,
        }
    }

    /// Name of the balancer, used in log fields.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The server source.
    pub fn servers(&self) -> &dyn ServerSource {
        self.servers.as_ref()
    }

    /// The stats provider.
    pub fn stats(&self) -> &SharedStats {
        &self.stats
    }
}

impl fmt::Debug for BalancerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BalancerHandle").field("name", &self.name).finish_non_exhaustive()
    }
}

/// Picks one server per call.
pub trait Rule: Send + Sync {
    /// Bind the rule to a balancer and start any background work.
    fn initialize(&self, balancer: BalancerHandle) -> Result<()>;

    /// Choose a server. `key` is an opaque hint for hash based rules.
    ///
    /// `None` means no candidate is available right now; callers decide
    /// whether to retry or fail fast.
    fn choose(&self, key: Option<&str>) -> Option<SharedServer>;

    /// Stop background work. Safe to call more than once.
    fn shutdown(&self) {}
}

/// A shared reference to a rule.
pub type SharedRule = Arc<dyn Rule>;

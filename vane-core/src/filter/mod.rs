//! Server list filters.
//!
//! A filter narrows a candidate list. Filters compose into a [`FilterChain`]
//! where each stage sees the previous stage's output; the balancer typically
//! chains a locality stage supplied by the caller ahead of a [`SubsetFilter`].

pub mod subset;

use std::fmt;
use std::sync::Arc;

use crate::domain::SharedServer;

pub use subset::SubsetFilter;

/// Narrows a list of servers.
pub trait ServerListFilter: Send + Sync {
    /// Return the servers that pass this stage.
    fn filter(&self, servers: &[SharedServer]) -> Vec<SharedServer>;
}

impl<F> ServerListFilter for F
where
    F: Fn(&[SharedServer]) -> Vec<SharedServer> + Send + Sync,
{
    fn filter(&self, servers: &[SharedServer]) -> Vec<SharedServer> {
        self(servers)
    }
}

/// Filters applied in order.
#[derive(Clone, Default)]
pub struct FilterChain {
    stages: Vec<Arc<dyn ServerListFilter>>,
}

impl FilterChain {
    /// An empty chain passes every server through.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a stage.
    #[must_use]
    pub fn then(mut self, stage: Arc<dyn ServerListFilter>) -> Self {
        self.stages.push(stage);
        self
    }

    /// Number of stages.
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    /// Whether the chain has no stages.
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }
}

impl ServerListFilter for FilterChain {
    fn filter(&self, servers: &[SharedServer]) -> Vec<SharedServer> {
        let mut current = servers.to_vec();
        for stage in &self.stages {
            current = stage.filter(&current);
        }
        current
    }
}

impl fmt::Debug for FilterChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FilterChain").field("stages", &self.stages.len()).finish()
    }
}

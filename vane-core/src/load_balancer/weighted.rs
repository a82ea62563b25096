//! Response time weighted selection.
//!
//! Servers are weighted by how much faster they are than the cluster as a
//! whole, and one is drawn at random in proportion to its weight. A background
//! task recomputes the weights from the stats provider on a fixed interval and
//! publishes them with a single pointer swap, so `choose()` never waits on it.
//! Until any latency has been recorded every weight is zero and the rule
//! rotates round-robin instead.

use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use arc_swap::{ArcSwap, ArcSwapOption};
use parking_lot::Mutex;
use rand::Rng;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, error, info};

use super::round_robin::RoundRobinRule;
use super::rule::{BalancerHandle, Rule};
use super::weight_table::WeightTable;
use crate::config::WeightedRuleConfig;
use crate::domain::SharedServer;
use crate::error::{LbError, Result};
use crate::sync::InProgress;

/// Upper bound on selection attempts when picks land on dead or vanished servers.
pub const MAX_SELECTION_ATTEMPTS: usize = 10;

/// What a recomputation request did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recompute {
    /// A new table was published.
    Updated,
    /// Another recomputation held the guard, or the rule is unbound.
    Skipped,
    /// Stats could not be read; the previous table stays in place.
    Failed,
}

/// State shared between callers and the background task.
#[derive(Debug, Default)]
struct WeightState {
    balancer: ArcSwapOption<BalancerHandle>,
    weights: ArcSwap<WeightTable>,
    in_progress: AtomicBool,
    round_robin: RoundRobinRule,
}

impl WeightState {
    fn maintain_weights(&self) -> Recompute {
        let Some(balancer) = self.balancer.load_full() else {
            return Recompute::Skipped;
        };

        let Some(_guard) = InProgress::acquire(&self.in_progress) else {
            debug!(balancer = balancer.name(), "Weight adjustment already in progress");
            return Recompute::Skipped;
        };

        debug!(balancer = balancer.name(), "Weight adjusting job started");
        match Self::compute(&balancer) {
            Ok(table) => {
                debug!(
                    balancer = balancer.name(),
                    servers = table.len(),
                    total_weight = table.total(),
                    "Server weights updated"
                );
                self.weights.store(Arc::new(table));
                Recompute::Updated
            }
            Err(e) => {
                error!(balancer = balancer.name(), error = %e, "Error calculating server weights");
                Recompute::Failed
            }
        }
    }

    fn compute(balancer: &BalancerHandle) -> Result<WeightTable> {
        // One snapshot for both passes keeps the table aligned with a single list.
        let servers = balancer.servers().all_servers();
        let averages = servers
            .iter()
            .map(|s| balancer.stats().stats_for(s).map(|st| st.avg_response_time_ms))
            .collect::<Result<Vec<_>>>()?;
        Ok(WeightTable::from_response_times(&averages))
    }
}

/// Rule that weights servers by their average response time.
#[derive(Debug)]
pub struct ResponseTimeWeightedRule {
    state: Arc<WeightState>,
    interval: Duration,
    timer: Mutex<Option<JoinHandle<()>>>,
}

impl ResponseTimeWeightedRule {
    /// Create an unbound rule.
    pub fn new(config: &WeightedRuleConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            state: Arc::new(WeightState::default()),
            interval: config.interval(),
            timer: Mutex::new(None),
        })
    }

    /// The recomputation interval.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// The table currently used for selection.
    pub fn weights(&self) -> Arc<WeightTable> {
        self.state.weights.load_full()
    }

    /// Recompute weights now unless a recomputation is already running.
    pub fn maintain_weights(&self) -> Recompute {
        self.state.maintain_weights()
    }

    /// Whether the periodic task is scheduled.
    pub fn is_running(&self) -> bool {
        self.timer.lock().as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Map a draw onto a server. `draw` receives the total weight and returns
    /// a value in `[0, total)`.
    fn pick(
        &self,
        weights: &WeightTable,
        servers: &[SharedServer],
        draw: impl FnOnce(f64) -> f64,
    ) -> Option<SharedServer> {
        if weights.is_degenerate() {
            return self.state.round_robin.choose_from(servers);
        }
        let r = draw(weights.total());
        // A stale table may be longer than the current list.
        servers.get(weights.index_for(r)).cloned()
    }

    fn start_timer(&self, runtime: &Handle, name: &str) {
        let state = self.state.clone();
        let period = self.interval;
        let task = runtime.spawn(async move {
            let mut ticker = time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            // The first tick completes immediately; initialize() already ran once.
            ticker.tick().await;

            loop {
                ticker.tick().await;
                state.maintain_weights();
            }
        });

        if let Some(previous) = self.timer.lock().replace(task) {
            previous.abort();
        }
        info!(balancer = name, interval_ms = period.as_millis() as u64, "Started server weight timer");
    }
}

impl Rule for ResponseTimeWeightedRule {
    fn initialize(&self, balancer: BalancerHandle) -> Result<()> {
        let runtime = Handle::try_current().map_err(|_| LbError::RuntimeUnavailable)?;
        let name = balancer.name().to_string();

        self.state.balancer.store(Some(Arc::new(balancer)));
        self.state.maintain_weights();
        self.start_timer(&runtime, &name);
        Ok(())
    }

    fn choose(&self, _key: Option<&str>) -> Option<SharedServer> {
        let balancer = self.state.balancer.load_full()?;
        let mut rng = rand::thread_rng();

        for _ in 0..MAX_SELECTION_ATTEMPTS {
            let weights = self.state.weights.load();
            let servers = balancer.servers().all_servers();
            if servers.is_empty() {
                return None;
            }

            match self.pick(&weights, &servers, |total| rng.gen::<f64>() * total) {
                Some(server) if server.is_alive() => return Some(server),
                _ => thread::yield_now(),
            }
        }

        // Weighted draws kept landing on dead servers; rotate to any alive one.
        debug!(
            balancer = balancer.name(),
            attempts = MAX_SELECTION_ATTEMPTS,
            "Weighted selection exhausted, rotating"
        );
        let servers = balancer.servers().all_servers();
        self.state.round_robin.choose_from(&servers)
    }

    fn shutdown(&self) {
        if let Some(task) = self.timer.lock().take() {
            let name = self
                .state
                .balancer
                .load()
                .as_ref()
                .map(|b| b.name().to_string())
                .unwrap_or_default();
            info!(balancer = %name, "Stopping server weight timer");
            task.abort();
        }
    }
}

impl Drop for ResponseTimeWeightedRule {
    fn drop(&mut self) {
        self.shutdown();
    }
}

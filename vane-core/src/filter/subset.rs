//! Bounded subset filter.
//!
//! Large pools are narrowed to a stable working set so connection pools and
//! caches stay warm. Each pass keeps the previous subset except for:
//!
//! - servers that left the input list,
//! - servers over the failure or in-flight thresholds,
//! - a forced eviction of the unhealthiest members, so that at least
//!   `size * force_eliminate_fraction` servers rotate out per pass.
//!
//! Vacated slots are refilled at random from healthy candidates, or from the
//! whole input when too few healthy ones remain.

use std::cmp::Ordering;
use std::collections::HashSet;
use std::fmt;

use parking_lot::Mutex;
use rand::seq::SliceRandom;
use tracing::debug;

use super::ServerListFilter;
use crate::config::{SubsetParams, SubsetPolicy};
use crate::domain::{Server, SharedServer};
use crate::stats::{ServerStats, SharedStats};

/// Keeps a bounded, sticky subset of the input servers.
///
/// A pass reads and replaces the previous subset under one lock, so
/// concurrent callers are serialized.
pub struct SubsetFilter {
    policy: SubsetPolicy,
    stats: SharedStats,
    current: Mutex<HashSet<SharedServer>>,
}

impl fmt::Debug for SubsetFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubsetFilter")
            .field("policy", &self.policy)
            .field("subset_size", &self.current.lock().len())
            .finish()
    }
}

impl SubsetFilter {
    /// Create a filter with an empty initial subset.
    pub fn new(policy: SubsetPolicy, stats: SharedStats) -> Self {
        Self {
            policy,
            stats,
            current: Mutex::new(HashSet::new()),
        }
    }

    /// The subset produced by the last pass.
    pub fn current_subset(&self) -> Vec<SharedServer> {
        self.current.lock().iter().cloned().collect()
    }

    fn stats_of(&self, server: &Server) -> ServerStats {
        self.stats.stats_for(server).unwrap_or_else(|e| {
            debug!(server = %server, error = %e, "Stats unavailable, treating as healthy");
            ServerStats::default()
        })
    }

    fn is_unhealthy(stats: &ServerStats, params: &SubsetParams) -> bool {
        stats.active_requests > params.connection_threshold
            || stats.failure_count > params.failure_threshold
    }

    /// Worst health first: more failures, then more in-flight calls.
    fn worst_first(a: &ServerStats, b: &ServerStats) -> Ordering {
        b.failure_count
            .cmp(&a.failure_count)
            .then_with(|| b.active_requests.cmp(&a.active_requests))
    }

    /// How many servers to evict beyond the organic evictions.
    fn forced_quota(params: &SubsetParams, previous: usize, remaining: usize) -> usize {
        let eliminated = previous.saturating_sub(remaining);
        let min_elimination = (params.size as f64 * params.force_eliminate_fraction).floor() as usize;

        let quota = if remaining > params.size {
            remaining - params.size
        } else {
            min_elimination.saturating_sub(eliminated)
        };
        quota.min(remaining)
    }
}

impl ServerListFilter for SubsetFilter {
    fn filter(&self, servers: &[SharedServer]) -> Vec<SharedServer> {
        let params = self.policy.resolve();
        let mut current = self.current.lock();

        let mut candidates: HashSet<SharedServer> = servers.iter().cloned().collect();
        let mut subset = current.clone();

        // Prune members that left the pool or crossed a threshold.
        for server in current.iter() {
            if !candidates.contains(server) {
                subset.remove(server);
            } else if Self::is_unhealthy(&self.stats_of(server), &params) {
                subset.remove(server);
                candidates.remove(server);
            }
        }
        let organic = current.len() - subset.len();

        let quota = Self::forced_quota(&params, current.len(), subset.len());
        if quota > 0 {
            let mut ranked: Vec<(SharedServer, ServerStats)> =
                subset.iter().map(|s| (s.clone(), self.stats_of(s))).collect();
            ranked.sort_by(|a, b| Self::worst_first(&a.1, &b.1));

            for (server, _) in ranked.into_iter().take(quota) {
                subset.remove(&server);
                candidates.remove(&server);
            }
        }

        let mut replenished = 0;
        if subset.len() < params.size {
            let needed = params.size - subset.len();
            let mut pool: Vec<SharedServer> =
                candidates.into_iter().filter(|s| !subset.contains(s)).collect();

            if pool.len() < needed {
                // Not enough healthy servers; draw from the whole input instead.
                let widened: HashSet<SharedServer> =
                    servers.iter().filter(|s| !subset.contains(*s)).cloned().collect();
                pool = widened.into_iter().collect();
            }

            let chosen: Vec<SharedServer> = pool
                .choose_multiple(&mut rand::thread_rng(), needed)
                .cloned()
                .collect();
            replenished = chosen.len();
            subset.extend(chosen);
        }

        debug!(
            input = servers.len(),
            previous = current.len(),
            organic_evictions = organic,
            forced_evictions = quota,
            replenished,
            subset = subset.len(),
            "Subset filter pass complete"
        );

        *current = subset;
        current.iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{StaticProperty, SubsetFilterConfig};
    use crate::stats::LoadBalancerStats;
    use proptest::prelude::*;
    use std::sync::Arc;

    fn pool(n: u16) -> Vec<SharedServer> {
        (0..n).map(|i| Arc::new(Server::new("10.2.0.1", 7000 + i))).collect()
    }

    fn filter_with(config: SubsetFilterConfig, stats: Arc<LoadBalancerStats>) -> SubsetFilter {
        SubsetFilter::new(SubsetPolicy::from_config(&config).unwrap(), stats)
    }

    fn as_set(servers: &[SharedServer]) -> HashSet<SharedServer> {
        servers.iter().cloned().collect()
    }

    fn lenient(size: usize, fraction: f64) -> SubsetFilterConfig {
        SubsetFilterConfig {
            size,
            force_eliminate_percent: fraction,
            elimination_failure_threshold: 100,
            elimination_connection_threshold: 100,
        }
    }

    #[test]
    fn test_first_pass_fills_to_target() {
        let stats = Arc::new(LoadBalancerStats::new("test"));
        let filter = filter_with(SubsetFilterConfig::default(), stats);
        let servers = pool(50);

        let subset = filter.filter(&servers);
        assert_eq!(subset.len(), 20);
        assert!(as_set(&subset).is_subset(&as_set(&servers)));
    }

    #[test]
    fn test_repeated_pass_is_stable_without_forced_rotation() {
        let stats = Arc::new(LoadBalancerStats::new("test"));
        let filter = filter_with(lenient(20, 0.0), stats);
        let servers = pool(60);

        let first = as_set(&filter.filter(&servers));
        let second = as_set(&filter.filter(&servers));
        assert_eq!(first, second);
    }

    #[test]
    fn test_repeated_pass_is_stable_when_pool_fits() {
        // Forced evictions have nowhere else to go and are drawn straight back.
        let stats = Arc::new(LoadBalancerStats::new("test"));
        let filter = filter_with(SubsetFilterConfig::default(), stats);
        let servers = pool(12);

        let first = as_set(&filter.filter(&servers));
        let second = as_set(&filter.filter(&servers));
        assert_eq!(first.len(), 12);
        assert_eq!(first, second);
    }

    #[test]
    fn test_forced_eviction_removes_two_worst() {
        let stats = Arc::new(LoadBalancerStats::new("test"));
        let filter = filter_with(lenient(20, 0.1), stats.clone());
        let servers = pool(40);

        let first = filter.filter(&servers);
        // Below the thresholds, so only the forced quota applies.
        let worst = first[3].clone();
        let second_worst = first[11].clone();
        for _ in 0..5 {
            stats.recorder(&worst).record_failure();
        }
        for _ in 0..2 {
            stats.recorder(&second_worst).record_failure();
        }
        let busy = stats.recorder(&first[0]);
        let _in_flight = busy.increment_active();

        let second = as_set(&filter.filter(&servers));
        let first = as_set(&first);

        assert_eq!(second.len(), 20);
        assert!(!second.contains(&worst));
        assert!(!second.contains(&second_worst));
        assert_eq!(first.intersection(&second).count(), 18);
    }

    #[test]
    fn test_active_requests_break_failure_ties() {
        let stats = Arc::new(LoadBalancerStats::new("test"));
        let filter = filter_with(lenient(10, 0.1), stats.clone());
        let servers = pool(30);

        let first = filter.filter(&servers);
        let busy = stats.recorder(&first[4]);
        let _a = busy.increment_active();
        let _b = busy.increment_active();

        let second = as_set(&filter.filter(&servers));
        assert!(!second.contains(&first[4]));
        assert_eq!(as_set(&first).intersection(&second).count(), 9);
    }

    #[test]
    fn test_threshold_eviction_counts_toward_quota() {
        let stats = Arc::new(LoadBalancerStats::new("test"));
        let config = SubsetFilterConfig {
            size: 20,
            force_eliminate_percent: 0.1,
            elimination_failure_threshold: 0,
            elimination_connection_threshold: 100,
        };
        let filter = filter_with(config, stats.clone());
        let servers = pool(40);

        let first = filter.filter(&servers);
        for server in &first[..3] {
            stats.recorder(server).record_failure();
        }

        let second = as_set(&filter.filter(&servers));
        assert_eq!(second.len(), 20);
        for server in &first[..3] {
            assert!(!second.contains(server));
        }
        // Three organic evictions exceed the quota of two; nothing else rotates.
        assert_eq!(as_set(&first).intersection(&second).count(), 17);
    }

    #[test]
    fn test_replenish_falls_back_to_full_pool() {
        let stats = Arc::new(LoadBalancerStats::new("test"));
        let config = SubsetFilterConfig { size: 8, ..Default::default() };
        let filter = filter_with(config, stats.clone());
        let servers = pool(10);

        let first = filter.filter(&servers);
        assert_eq!(first.len(), 8);
        for server in &first[..5] {
            stats.recorder(server).record_failure();
        }

        // Only two healthy outsiders remain for five open slots.
        let second = filter.filter(&servers);
        assert_eq!(second.len(), 8);
        assert!(as_set(&second).is_subset(&as_set(&servers)));
    }

    #[test]
    fn test_small_pool_returns_everything() {
        let stats = Arc::new(LoadBalancerStats::new("test"));
        let filter = filter_with(SubsetFilterConfig::default(), stats);
        let servers = pool(5);

        assert_eq!(as_set(&filter.filter(&servers)), as_set(&servers));
    }

    #[test]
    fn test_departed_servers_are_dropped() {
        let stats = Arc::new(LoadBalancerStats::new("test"));
        let filter = filter_with(lenient(5, 0.0), stats);
        let servers = pool(10);

        let first = filter.filter(&servers);
        let gone = first[0].clone();
        let remaining: Vec<SharedServer> = servers.iter().filter(|s| **s != gone).cloned().collect();

        let second = as_set(&filter.filter(&remaining));
        assert_eq!(second.len(), 5);
        assert!(!second.contains(&gone));
        assert_eq!(as_set(&first).intersection(&second).count(), 4);
    }

    #[test]
    fn test_target_shrinks_on_reload() {
        let stats = Arc::new(LoadBalancerStats::new("test"));
        let size = Arc::new(crate::config::DynamicProperty::new(10usize));
        let policy = SubsetPolicy::new(
            size.clone(),
            Arc::new(StaticProperty::new(0.0)),
            Arc::new(StaticProperty::new(100u64)),
            Arc::new(StaticProperty::new(100u64)),
        )
        .unwrap();
        let filter = SubsetFilter::new(policy, stats);
        let servers = pool(30);

        let first = as_set(&filter.filter(&servers));
        size.set(6);
        let second = as_set(&filter.filter(&servers));

        assert_eq!(second.len(), 6);
        assert!(second.is_subset(&first));
        assert_eq!(filter.current_subset().len(), 6);
    }

    #[test]
    fn test_empty_input() {
        let stats = Arc::new(LoadBalancerStats::new("test"));
        let filter = filter_with(SubsetFilterConfig::default(), stats);
        filter.filter(&pool(5));
        assert!(filter.filter(&[]).is_empty());
    }

    proptest! {
        #[test]
        fn prop_subset_size_and_membership(
            passes in prop::collection::vec((1u16..60, prop::collection::vec(0u64..3, 60)), 1..6),
            size in 1usize..30,
            fraction in 0.0f64..0.5,
        ) {
            let stats = Arc::new(LoadBalancerStats::new("prop"));
            let config = SubsetFilterConfig {
                size,
                force_eliminate_percent: fraction,
                elimination_failure_threshold: 1,
                elimination_connection_threshold: 0,
            };
            let filter = filter_with(config, stats.clone());
            let all = pool(60);

            for (pool_size, failures) in passes {
                let input = &all[..pool_size as usize];
                for (server, count) in all.iter().zip(&failures) {
                    let recorder = stats.recorder(server);
                    recorder.reset_failures();
                    for _ in 0..*count {
                        recorder.record_failure();
                    }
                }

                let out = filter.filter(input);
                let out_set = as_set(&out);
                prop_assert_eq!(out_set.len(), out.len());
                prop_assert_eq!(out.len(), size.min(input.len()));
                prop_assert!(out_set.is_subset(&as_set(input)));
            }
        }
    }
}

//! The load balancer façade.
//!
//! Composes the pieces from `vane-core`: the full pool runs through the
//! filter chain into the exposed server list, the rule picks from that list,
//! and probing passes flip alive flags and notify listeners.

use std::collections::HashSet;
use std::fmt;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use vane_core::domain::{ServerGroup, ServerList, ServerSource, SharedServer, SharedServerList};
use vane_core::filter::{FilterChain, ServerListFilter};
use vane_core::health::{
    ConcurrentPingStrategy, NoOpPing, Ping, PingStrategy, SerialPingStrategy,
    ServerStatusChangeListener,
};
use vane_core::load_balancer::{BalancerHandle, RoundRobinRule, SharedRule};
use vane_core::stats::{LoadBalancerStats, StatsSummary};
use vane_core::sync::InProgress;
use vane_core::{LbError, Result};

use crate::config::BalancerConfig;
use crate::discovery::{spawn_server_list_refresher, ServerListSource};
use crate::health_check::prober::spawn_health_checker;

/// Client-side load balancer.
pub struct LoadBalancer {
    name: Arc<str>,
    config: BalancerConfig,
    /// Every known server, before filtering.
    pool: SharedServerList,
    /// The filtered servers the rule chooses from.
    servers: SharedServerList,
    filters: FilterChain,
    rule: SharedRule,
    stats: Arc<LoadBalancerStats>,
    ping: Arc<dyn Ping>,
    ping_strategy: Arc<dyn PingStrategy>,
    source: Option<Arc<dyn ServerListSource>>,
    listeners: RwLock<Vec<Arc<dyn ServerStatusChangeListener>>>,
    ping_in_progress: AtomicBool,
    /// Serializes filtering and publishing of the pool and exposed list.
    publish: Mutex<()>,
    rule_stopped: AtomicBool,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl fmt::Debug for LoadBalancer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadBalancer")
            .field("name", &self.name)
            .field("pool", &self.pool.len())
            .field("servers", &self.servers.len())
            .field("filters", &self.filters)
            .finish_non_exhaustive()
    }
}

impl LoadBalancer {
    /// Start building a balancer.
    pub fn builder(name: impl Into<String>) -> LoadBalancerBuilder {
        LoadBalancerBuilder::new(name)
    }

    /// The balancer's name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The configuration the balancer was built with.
    pub fn config(&self) -> &BalancerConfig {
        &self.config
    }

    fn handle(&self) -> BalancerHandle {
        BalancerHandle::new(self.name.clone(), self.servers.clone(), self.stats.clone())
    }

    /// Choose a server for the next call.
    ///
    /// `None` means no server is available right now.
    pub fn choose_server(&self, key: Option<&str>) -> Option<SharedServer> {
        let server = self.rule.choose(key);
        if server.is_none() {
            debug!(balancer = %self.name, "No server available");
        }
        server
    }

    /// Every exposed server, alive or not.
    pub fn all_servers(&self) -> Arc<Vec<SharedServer>> {
        self.servers.all_servers()
    }

    /// Exposed servers whose last probe succeeded.
    pub fn reachable_servers(&self) -> Vec<SharedServer> {
        self.servers.server_list(ServerGroup::StatusUp)
    }

    /// Exposed servers in the given status group.
    pub fn server_list(&self, group: ServerGroup) -> Vec<SharedServer> {
        self.servers.server_list(group)
    }

    /// The unfiltered pool.
    pub fn pool(&self) -> Arc<Vec<SharedServer>> {
        self.pool.all_servers()
    }

    /// Per-server statistics.
    pub fn load_balancer_stats(&self) -> &Arc<LoadBalancerStats> {
        &self.stats
    }

    /// Aggregate statistics across every tracked server.
    pub fn stats_summary(&self) -> StatsSummary {
        self.stats.summary()
    }

    /// Replace the pool and run it through the filter chain.
    ///
    /// Returns the number of servers exposed afterwards. Statistics of
    /// servers that left the pool are dropped.
    pub fn set_servers(&self, servers: Vec<SharedServer>) -> usize {
        let _publish = self.publish.lock();
        self.publish_servers(servers)
    }

    /// Re-run the filter chain over the current pool.
    pub fn update_filtered_list(&self) -> usize {
        let _publish = self.publish.lock();
        let pool = self.pool.all_servers();
        self.publish_servers(pool.as_ref().clone())
    }

    /// Caller holds `publish`.
    fn publish_servers(&self, servers: Vec<SharedServer>) -> usize {
        let filtered = self.filters.filter(&servers);
        let previous = self.servers.len();
        let exposed = filtered.len();

        let old_pool = self.pool.all_servers();
        let kept: HashSet<&SharedServer> = servers.iter().collect();
        let mut departed = 0;
        for server in old_pool.iter().filter(|s| !kept.contains(s)) {
            self.stats.remove(server);
            departed += 1;
        }

        self.pool.update(servers);
        self.servers.update(filtered);

        if departed > 0 {
            debug!(balancer = %self.name, departed, "Dropped stats of departed servers");
        }

        if previous != exposed {
            info!(
                balancer = %self.name,
                pool = self.pool.len(),
                previous,
                exposed,
                "Server list updated"
            );
        }
        exposed
    }

    /// Pull a fresh pool from the configured source.
    ///
    /// Without a source the current pool is filtered again. On error the
    /// exposed list is left untouched.
    pub fn refresh(&self) -> Result<usize> {
        match &self.source {
            Some(source) => {
                let servers = source.fetch()?;
                Ok(self.set_servers(servers))
            }
            None => Ok(self.update_filtered_list()),
        }
    }

    /// Register a listener for status changes.
    pub fn add_listener(&self, listener: Arc<dyn ServerStatusChangeListener>) {
        self.listeners.write().push(listener);
    }

    /// Mark a server down outside a probing pass, e.g. after a connect failure.
    pub fn mark_server_down(&self, server: &SharedServer) {
        if server.set_alive(false) {
            warn!(balancer = %self.name, server = %server, "Server marked down");
            self.notify(&[server.clone()]);
        }
    }

    /// Probe every exposed server and update alive flags.
    ///
    /// Returns the servers whose status changed. A pass that overlaps with one
    /// already running returns immediately with no changes.
    pub fn ping_pass(&self) -> Vec<SharedServer> {
        let Some(guard) = InProgress::acquire(&self.ping_in_progress) else {
            debug!(balancer = %self.name, "Ping pass already in progress");
            return Vec::new();
        };

        let servers = self.servers.all_servers();
        let results = self.ping_strategy.ping_servers(self.ping.as_ref(), &servers);

        let mut changed = Vec::new();
        for (server, alive) in servers.iter().zip(results) {
            let was_alive = server.set_alive(alive);
            if was_alive != alive {
                info!(
                    balancer = %self.name,
                    server = %server,
                    was_alive,
                    alive,
                    "Server state changed"
                );
                changed.push(server.clone());
            }
        }
        drop(guard);

        if !changed.is_empty() {
            self.notify(&changed);
        }
        changed
    }

    fn notify(&self, changed: &[SharedServer]) {
        let listeners = self.listeners.read().clone();
        for listener in listeners {
            listener.server_status_changed(changed);
        }
    }

    /// Start the periodic ping pass and, when a source is configured, the
    /// periodic refresh.
    pub fn start(self: &Arc<Self>) -> Result<()> {
        let runtime = Handle::try_current().map_err(|_| LbError::RuntimeUnavailable)?;
        let mut tasks = self.tasks.lock();
        if !tasks.is_empty() {
            return Err(LbError::AlreadyRunning);
        }

        if self.rule_stopped.swap(false, Ordering::AcqRel) {
            self.rule.initialize(self.handle())?;
        }

        tasks.push(spawn_health_checker(
            &runtime,
            Arc::downgrade(self),
            self.config.ping_interval(),
        ));
        if self.source.is_some() {
            tasks.push(spawn_server_list_refresher(
                &runtime,
                Arc::downgrade(self),
                self.config.refresh_interval(),
            ));
        }

        info!(balancer = %self.name, tasks = tasks.len(), "Load balancer started");
        Ok(())
    }

    /// Stop background tasks and the rule's background work. Idempotent.
    pub fn stop(&self) {
        let tasks: Vec<_> = self.tasks.lock().drain(..).collect();
        let was_running = !tasks.is_empty();
        for task in tasks {
            task.abort();
        }

        if !self.rule_stopped.swap(true, Ordering::AcqRel) {
            self.rule.shutdown();
        }
        if was_running {
            info!(balancer = %self.name, "Load balancer stopped");
        }
    }
}

impl Drop for LoadBalancer {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Builder for [`LoadBalancer`].
pub struct LoadBalancerBuilder {
    name: String,
    config: BalancerConfig,
    filters: FilterChain,
    rule: Option<SharedRule>,
    stats: Option<Arc<LoadBalancerStats>>,
    ping: Option<Arc<dyn Ping>>,
    ping_strategy: Option<Arc<dyn PingStrategy>>,
    source: Option<Arc<dyn ServerListSource>>,
    listeners: Vec<Arc<dyn ServerStatusChangeListener>>,
}

impl LoadBalancerBuilder {
    fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            config: BalancerConfig::default(),
            filters: FilterChain::new(),
            rule: None,
            stats: None,
            ping: None,
            ping_strategy: None,
            source: None,
            listeners: Vec::new(),
        }
    }

    /// Use the given configuration.
    #[must_use]
    pub fn config(mut self, config: BalancerConfig) -> Self {
        self.config = config;
        self
    }

    /// Append a filter stage.
    #[must_use]
    pub fn filter(mut self, stage: Arc<dyn ServerListFilter>) -> Self {
        self.filters = self.filters.then(stage);
        self
    }

    /// Use the given selection rule. Defaults to round-robin.
    #[must_use]
    pub fn rule(mut self, rule: SharedRule) -> Self {
        self.rule = Some(rule);
        self
    }

    /// Share an existing stats store, e.g. one a subset filter also reads.
    #[must_use]
    pub fn stats(mut self, stats: Arc<LoadBalancerStats>) -> Self {
        self.stats = Some(stats);
        self
    }

    /// Probe used by ping passes. Defaults to a probe that always succeeds.
    #[must_use]
    pub fn ping(mut self, ping: Arc<dyn Ping>) -> Self {
        self.ping = Some(ping);
        self
    }

    /// Strategy for applying the probe. Defaults from `max_ping_concurrency`.
    #[must_use]
    pub fn ping_strategy(mut self, strategy: Arc<dyn PingStrategy>) -> Self {
        self.ping_strategy = Some(strategy);
        self
    }

    /// Source polled by the periodic refresh.
    #[must_use]
    pub fn source(mut self, source: Arc<dyn ServerListSource>) -> Self {
        self.source = Some(source);
        self
    }

    /// Register a status change listener.
    #[must_use]
    pub fn listener(mut self, listener: Arc<dyn ServerStatusChangeListener>) -> Self {
        self.listeners.push(listener);
        self
    }

    /// Validate the configuration, bind the rule, and load the static pool.
    pub fn build(self) -> Result<Arc<LoadBalancer>> {
        self.config.validate()?;
        let initial = self.config.parse_servers()?;

        let ping_strategy: Arc<dyn PingStrategy> = match self.ping_strategy {
            Some(strategy) => strategy,
            None => match NonZeroUsize::new(self.config.max_ping_concurrency) {
                Some(n) if n.get() > 1 => Arc::new(ConcurrentPingStrategy::new(n)),
                _ => Arc::new(SerialPingStrategy),
            },
        };
        let rule: SharedRule = match self.rule {
            Some(rule) => rule,
            None => Arc::new(RoundRobinRule::new()),
        };
        let ping: Arc<dyn Ping> = match self.ping {
            Some(ping) => ping,
            None => Arc::new(NoOpPing),
        };
        let stats = match self.stats {
            Some(stats) => stats,
            None => Arc::new(LoadBalancerStats::new(self.name.clone())),
        };

        let balancer = Arc::new(LoadBalancer {
            name: Arc::from(self.name),
            config: self.config,
            pool: Arc::new(ServerList::default()),
            servers: Arc::new(ServerList::default()),
            filters: self.filters,
            rule,
            stats,
            ping,
            ping_strategy,
            source: self.source,
            listeners: RwLock::new(self.listeners),
            ping_in_progress: AtomicBool::new(false),
            publish: Mutex::new(()),
            rule_stopped: AtomicBool::new(false),
            tasks: Mutex::new(Vec::new()),
        });

        if !initial.is_empty() {
            balancer.set_servers(initial);
        }
        balancer.rule.initialize(balancer.handle())?;

        info!(
            balancer = %balancer.name,
            servers = balancer.servers.len(),
            filters = balancer.filters.len(),
            "Load balancer initialized"
        );
        Ok(balancer)
    }
}

//! Server list sources and the periodic refresh task.

use std::sync::Weak;
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, error, warn};
use vane_core::domain::SharedServer;
use vane_core::Result;

use crate::balancer::LoadBalancer;

/// Produces the full pool of candidate servers, e.g. from a registry.
pub trait ServerListSource: Send + Sync {
    /// Fetch the current pool.
    fn fetch(&self) -> Result<Vec<SharedServer>>;
}

impl<F> ServerListSource for F
where
    F: Fn() -> Result<Vec<SharedServer>> + Send + Sync,
{
    fn fetch(&self) -> Result<Vec<SharedServer>> {
        self()
    }
}

/// Spawns a task that refreshes the balancer's pool every `interval`.
///
/// A failed fetch is logged and the exposed list stays as it was.
pub fn spawn_server_list_refresher(
    runtime: &Handle,
    balancer: Weak<LoadBalancer>,
    interval: Duration,
) -> JoinHandle<()> {
    runtime.spawn(async move {
        let mut ticker = time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;

        loop {
            ticker.tick().await;

            let Some(lb) = balancer.upgrade() else {
                debug!("Load balancer dropped, stopping refresher");
                break;
            };

            let name = lb.name().to_string();
            match tokio::task::spawn_blocking(move || lb.refresh()).await {
                Ok(Ok(exposed)) => debug!(balancer = %name, exposed, "Server list refreshed"),
                Ok(Err(e)) => warn!(balancer = %name, error = %e, "Server list refresh failed"),
                Err(e) => error!(balancer = %name, error = %e, "Server list refresh panicked"),
            }
        }
    })
}

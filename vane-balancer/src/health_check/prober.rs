//! Background prober that runs periodic ping passes.

use std::sync::Weak;
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, error};

use crate::balancer::LoadBalancer;

/// Spawns a background Tokio task that runs a ping pass every `interval`.
///
/// Probes are blocking, so each pass runs on the blocking pool. The task ends
/// on its own once the balancer is dropped.
pub fn spawn_health_checker(
    runtime: &Handle,
    balancer: Weak<LoadBalancer>,
    interval: Duration,
) -> JoinHandle<()> {
    runtime.spawn(async move {
        let mut ticker = time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        // Skip the immediate first tick
        ticker.tick().await;

        loop {
            ticker.tick().await;

            let Some(lb) = balancer.upgrade() else {
                debug!("Load balancer dropped, stopping health checker");
                break;
            };

            match tokio::task::spawn_blocking(move || lb.ping_pass().len()).await {
                Ok(changed) if changed > 0 => debug!(changed, "Ping pass finished"),
                Ok(_) => {}
                Err(e) => error!(error = %e, "Ping pass panicked"),
            }
        }
    })
}

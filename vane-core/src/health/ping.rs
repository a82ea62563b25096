//! Liveness probe contract and strategies for applying it to a server list.

use std::num::NonZeroUsize;
use std::thread;

use tracing::debug;

use crate::domain::{Server, SharedServer};

/// Decides whether a server is alive.
///
/// Implementations may be called repeatedly and concurrently for different
/// servers; no ordering between calls is assumed.
pub trait Ping: Send + Sync {
    /// Probe a single server.
    fn is_alive(&self, server: &Server) -> bool;
}

/// A probe that reports every server alive.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOpPing;

impl Ping for NoOpPing {
    fn is_alive(&self, _server: &Server) -> bool {
        true
    }
}

/// Applies a probe across many servers.
pub trait PingStrategy: Send + Sync {
    /// Probe every server. The result is aligned positionally with `servers`.
    fn ping_servers(&self, ping: &dyn Ping, servers: &[SharedServer]) -> Vec<bool>;
}

/// Probes servers one after another on the calling thread.
#[derive(Debug, Default, Clone, Copy)]
pub struct SerialPingStrategy;

impl PingStrategy for SerialPingStrategy {
    fn ping_servers(&self, ping: &dyn Ping, servers: &[SharedServer]) -> Vec<bool> {
        servers.iter().map(|s| ping.is_alive(s)).collect()
    }
}

/// Probes servers on scoped worker threads.
///
/// The list is split into at most `max_parallelism` contiguous chunks, one
/// thread per chunk, and results are stitched back in input order.
#[derive(Debug, Clone, Copy)]
pub struct ConcurrentPingStrategy {
    max_parallelism: NonZeroUsize,
}

impl ConcurrentPingStrategy {
    /// Create a strategy running at most `max_parallelism` probes at once.
    pub fn new(max_parallelism: NonZeroUsize) -> Self {
        Self { max_parallelism }
    }
}

impl Default for ConcurrentPingStrategy {
    fn default() -> Self {
        let parallelism = thread::available_parallelism().unwrap_or(NonZeroUsize::MIN);
        Self::new(parallelism)
    }
}

impl PingStrategy for ConcurrentPingStrategy {
    fn ping_servers(&self, ping: &dyn Ping, servers: &[SharedServer]) -> Vec<bool> {
        if servers.len() <= 1 {
            return SerialPingStrategy.ping_servers(ping, servers);
        }

        let workers = self.max_parallelism.get().min(servers.len());
        let chunk_size = servers.len().div_ceil(workers);
        debug!(servers = servers.len(), workers, "Pinging servers concurrently");

        thread::scope(|scope| {
            let handles: Vec<_> = servers
                .chunks(chunk_size)
                .map(|chunk| scope.spawn(move || SerialPingStrategy.ping_servers(ping, chunk)))
                .collect();

            handles
                .into_iter()
                .zip(servers.chunks(chunk_size))
                .flat_map(|(handle, chunk)| {
                    // A panicking probe counts as a failed probe for its chunk.
                    handle.join().unwrap_or_else(|_| vec![false; chunk.len()])
                })
                .collect()
        })
    }
}

//! TCP connect probe.

use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

use tracing::trace;
use vane_core::domain::Server;
use vane_core::health::Ping;

/// Default connect timeout for [`TcpPing`].
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_millis(1500);

/// Considers a server alive when a TCP connection to it succeeds in time.
#[derive(Debug, Clone, Copy)]
pub struct TcpPing {
    timeout: Duration,
}

impl TcpPing {
    /// Create a probe with the given connect timeout.
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl Default for TcpPing {
    fn default() -> Self {
        Self::new(DEFAULT_CONNECT_TIMEOUT)
    }
}

impl Ping for TcpPing {
    fn is_alive(&self, server: &Server) -> bool {
        let addrs = match (server.host(), server.port()).to_socket_addrs() {
            Ok(addrs) => addrs,
            Err(e) => {
                trace!(server = %server, error = %e, "Address did not resolve");
                return false;
            }
        };
        // Any resolved address that accepts counts.
        addrs
            .into_iter()
            .any(|addr| TcpStream::connect_timeout(&addr, self.timeout).is_ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;

    #[test]
    fn test_listening_port_is_alive() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let ping = TcpPing::new(Duration::from_millis(500));

        assert!(ping.is_alive(&Server::new("127.0.0.1", port)));

        drop(listener);
        assert!(!ping.is_alive(&Server::new("127.0.0.1", port)));
    }

    #[test]
    fn test_unresolvable_host_is_down() {
        let ping = TcpPing::default();
        assert!(!ping.is_alive(&Server::new("host.invalid", 80)));
    }
}

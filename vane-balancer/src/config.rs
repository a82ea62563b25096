//! Balancer configuration.

use std::time::Duration;

use serde::Deserialize;
use vane_core::domain::{Server, SharedServer};
use vane_core::{LbError, Result};

/// Settings for a [`LoadBalancer`](crate::LoadBalancer).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct BalancerConfig {
    /// How often every exposed server is probed, in milliseconds.
    pub ping_interval_ms: u64,
    /// How often the server list source is polled, in milliseconds.
    pub refresh_interval_ms: u64,
    /// Probes run at once during a ping pass; 1 probes serially.
    pub max_ping_concurrency: usize,
    /// Static `host:port` entries used as the initial pool.
    pub list_of_servers: Vec<String>,
}

impl Default for BalancerConfig {
    fn default() -> Self {
        Self {
            ping_interval_ms: 10_000,
            refresh_interval_ms: 30_000,
            max_ping_concurrency: 1,
            list_of_servers: Vec::new(),
        }
    }
}

impl BalancerConfig {
    /// Reject values the balancer cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.ping_interval_ms == 0 {
            return Err(LbError::Config("ping interval must be positive".to_string()));
        }
        if self.refresh_interval_ms == 0 {
            return Err(LbError::Config("refresh interval must be positive".to_string()));
        }
        if self.max_ping_concurrency == 0 {
            return Err(LbError::Config("ping concurrency must be at least 1".to_string()));
        }
        Ok(())
    }

    /// Ping interval.
    pub fn ping_interval(&self) -> Duration {
        Duration::from_millis(self.ping_interval_ms)
    }

    /// Refresh interval.
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_millis(self.refresh_interval_ms)
    }

    /// Parse the static server list.
    pub fn parse_servers(&self) -> Result<Vec<SharedServer>> {
        self.list_of_servers
            .iter()
            .map(|entry| entry.parse::<Server>().map(SharedServer::new))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_empty_document() {
        let config: BalancerConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, BalancerConfig::default());
        assert_eq!(config.ping_interval(), Duration::from_secs(10));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_servers() {
        let config: BalancerConfig = serde_json::from_str(
            r#"{ "list_of_servers": ["10.0.0.1:8080", "10.0.0.2:8080"], "max_ping_concurrency": 4 }"#,
        )
        .unwrap();

        let servers = config.parse_servers().unwrap();
        assert_eq!(servers.len(), 2);
        assert_eq!(servers[1].host(), "10.0.0.2");
        assert_eq!(config.max_ping_concurrency, 4);
    }

    #[test]
    fn test_invalid_values() {
        let config = BalancerConfig { ping_interval_ms: 0, ..Default::default() };
        assert!(matches!(config.validate(), Err(LbError::Config(_))));

        let config = BalancerConfig { max_ping_concurrency: 0, ..Default::default() };
        assert!(config.validate().is_err());

        let config = BalancerConfig { list_of_servers: vec!["bad".to_string()], ..Default::default() };
        assert!(matches!(config.parse_servers(), Err(LbError::InvalidAddress(_))));
    }
}

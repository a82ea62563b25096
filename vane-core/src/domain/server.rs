//! Backend server models.

use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::LbError;

/// Represents a single upstream backend instance.
///
/// Identity is the `host:port` pair. Zone and metadata are descriptive and do
/// not take part in equality, so a rediscovered instance with fresh metadata
/// still matches the one already tracked.
#[derive(Debug)]
pub struct Server {
    host: String,
    port: u16,
    zone: Option<String>,
    metadata: BTreeMap<String, String>,
    /// Whether the last probe found the server alive.
    alive: AtomicBool,
}

impl Server {
    /// Create a server that is assumed alive until probed.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            zone: None,
            metadata: BTreeMap::new(),
            alive: AtomicBool::new(true),
        }
    }

    /// Attach the availability zone the instance runs in.
    #[must_use]
    pub fn with_zone(mut self, zone: impl Into<String>) -> Self {
        self.zone = Some(zone.into());
        self
    }

    /// Attach a metadata entry.
    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Host name or IP.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Port.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// The `host:port` identity string.
    pub fn host_port(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Availability zone, if known.
    pub fn zone(&self) -> Option<&str> {
        self.zone.as_deref()
    }

    /// Free-form metadata published with the instance.
    pub fn metadata(&self) -> &BTreeMap<String, String> {
        &self.metadata
    }

    /// Check if the server is marked alive.
    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    /// Update the alive flag, returning the previous value.
    pub fn set_alive(&self, alive: bool) -> bool {
        self.alive.swap(alive, Ordering::AcqRel)
    }
}

impl PartialEq for Server {
    fn eq(&self, other: &Self) -> bool {
        self.port == other.port && self.host == other.host
    }
}

impl Eq for Server {}

impl Hash for Server {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.host.hash(state);
        self.port.hash(state);
    }
}

impl fmt::Display for Server {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Parses `host:port`, including bracketed IPv6 hosts such as `[::1]:8080`.
impl FromStr for Server {
    type Err = LbError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || LbError::InvalidAddress(s.to_string());
        let (host, port) = s.trim().rsplit_once(':').ok_or_else(invalid)?;
        let host = host.strip_prefix('[').and_then(|h| h.strip_suffix(']')).unwrap_or(host);
        if host.is_empty() {
            return Err(invalid());
        }
        let port = port.parse::<u16>().map_err(|_| invalid())?;
        Ok(Self::new(host, port))
    }
}

/// A thread-safe reference to a Server.
pub type SharedServer = Arc<Server>;

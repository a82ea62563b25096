//! Error types for Vane.
//!
//! Selection never fails with an error: an empty candidate list is reported as
//! `None`. Errors surface only when a component is misconfigured at
//! construction or when a background job cannot read what it needs.

use thiserror::Error;

/// Errors raised by load balancing components.
#[derive(Debug, Error)]
pub enum LbError {
    /// A configuration value is out of range.
    #[error("configuration error: {0}")]
    Config(String),

    /// Statistics for a server could not be read.
    #[error("stats unavailable for {server}: {reason}")]
    Stats {
        /// The `host:port` of the server.
        server: String,
        /// Why the read failed.
        reason: String,
    },

    /// Background work was requested outside a tokio runtime.
    #[error("no tokio runtime available to schedule background work")]
    RuntimeUnavailable,

    /// Background work is already running.
    #[error("background tasks already running")]
    AlreadyRunning,

    /// The server list source failed to produce a list.
    #[error("server list source failed: {0}")]
    Discovery(String),

    /// A server address could not be parsed.
    #[error("invalid server address '{0}'")]
    InvalidAddress(String),
}

/// Result type for load balancing operations.
pub type Result<T> = std::result::Result<T, LbError>;

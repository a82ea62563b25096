//! Health contracts: probing servers and reporting status changes.

pub mod listener;
pub mod ping;

pub use listener::ServerStatusChangeListener;
pub use ping::{ConcurrentPingStrategy, NoOpPing, Ping, PingStrategy, SerialPingStrategy};

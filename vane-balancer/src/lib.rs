//! Vane Balancer
//!
//! The client-facing load balancer. It keeps the full server pool, runs it
//! through a filter chain into the list the selection rule picks from, and
//! drives background ping passes and server list refreshes on Tokio.

pub mod balancer;
pub mod config;
pub mod discovery;
pub mod health_check;

pub use balancer::{LoadBalancer, LoadBalancerBuilder};
pub use config::BalancerConfig;
pub use discovery::ServerListSource;
pub use health_check::TcpPing;

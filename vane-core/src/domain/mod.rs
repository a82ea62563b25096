//! Domain models: servers and the list the balancer exposes.

pub mod server;
pub mod server_list;

pub use server::{Server, SharedServer};
pub use server_list::{ServerGroup, ServerList, ServerSource, SharedServerList};

//! Active health checking.

pub mod prober;
pub mod tcp;

pub use tcp::TcpPing;

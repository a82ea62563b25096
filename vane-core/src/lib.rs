//! Vane Core functionality.
//!
//! This crate contains the server model, statistics, selection rules, server
//! list filters and health contracts that power the Vane client-side load
//! balancer.

pub mod config;
pub mod domain;
pub mod error;
pub mod filter;
pub mod health;
pub mod load_balancer;
pub mod stats;
pub mod sync;

pub use error::{LbError, Result};

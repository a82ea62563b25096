//! Selection rules.

pub mod round_robin;
pub mod rule;
pub mod weight_table;
pub mod weighted;

pub use round_robin::RoundRobinRule;
pub use rule::{BalancerHandle, Rule, SharedRule};
pub use weight_table::{WeightTable, MIN_TOTAL_WEIGHT};
pub use weighted::{Recompute, ResponseTimeWeightedRule, MAX_SELECTION_ATTEMPTS};

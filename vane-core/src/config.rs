//! Configuration values and the accessors components read them through.
//!
//! Components never talk to a configuration backend. They receive
//! [`Property`] handles at construction and read the current value whenever
//! they need it, so a hot reload in the backend shows up on the next pass.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use serde::Deserialize;
use tracing::warn;

use crate::error::{LbError, Result};

/// A configuration value that may change between reads.
pub trait Property<T>: Send + Sync {
    /// The value as of now.
    fn current(&self) -> T;
}

/// A value fixed at construction.
#[derive(Debug, Clone)]
pub struct StaticProperty<T>(T);

impl<T> StaticProperty<T> {
    /// Wrap a fixed value.
    pub fn new(value: T) -> Self {
        Self(value)
    }
}

impl<T: Clone + Send + Sync> Property<T> for StaticProperty<T> {
    fn current(&self) -> T {
        self.0.clone()
    }
}

/// A value that can be replaced at runtime.
#[derive(Debug)]
pub struct DynamicProperty<T> {
    value: ArcSwap<T>,
}

impl<T> DynamicProperty<T> {
    /// Create a property holding an initial value.
    pub fn new(initial: T) -> Self {
        Self {
            value: ArcSwap::from_pointee(initial),
        }
    }

    /// Replace the value; subsequent reads observe it.
    pub fn set(&self, value: T) {
        self.value.store(Arc::new(value));
    }
}

impl<T: Clone + Send + Sync> Property<T> for DynamicProperty<T> {
    fn current(&self) -> T {
        self.value.load().as_ref().clone()
    }
}

/// Closures bridge to any external configuration system.
impl<T, F> Property<T> for F
where
    F: Fn() -> T + Send + Sync,
{
    fn current(&self) -> T {
        self()
    }
}

fn default_subset_size() -> usize {
    20
}

fn default_force_eliminate_percent() -> f64 {
    0.1
}

/// Settings for the bounded subset filter.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct SubsetFilterConfig {
    /// Target number of servers in the subset.
    #[serde(default = "default_subset_size")]
    pub size: usize,
    /// Fraction of the target size evicted on every pass, at minimum.
    #[serde(default = "default_force_eliminate_percent")]
    pub force_eliminate_percent: f64,
    /// Servers with more failures than this are evicted.
    pub elimination_failure_threshold: u64,
    /// Servers with more in-flight calls than this are evicted.
    pub elimination_connection_threshold: u64,
}

impl Default for SubsetFilterConfig {
    fn default() -> Self {
        Self {
            size: default_subset_size(),
            force_eliminate_percent: default_force_eliminate_percent(),
            elimination_failure_threshold: 0,
            elimination_connection_threshold: 0,
        }
    }
}

impl SubsetFilterConfig {
    /// Reject values the filter cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.size == 0 {
            return Err(LbError::Config("subset size must be at least 1".to_string()));
        }
        validate_fraction(self.force_eliminate_percent)
    }
}

fn validate_fraction(fraction: f64) -> Result<()> {
    if !fraction.is_finite() || !(0.0..=1.0).contains(&fraction) {
        return Err(LbError::Config(format!(
            "force eliminate percent must be within [0, 1], got {fraction}"
        )));
    }
    Ok(())
}

/// Values the subset filter uses for a single pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SubsetParams {
    /// Target subset size.
    pub size: usize,
    /// Minimum eviction fraction.
    pub force_eliminate_fraction: f64,
    /// Failure count above which a server is evicted.
    pub failure_threshold: u64,
    /// In-flight count above which a server is evicted.
    pub connection_threshold: u64,
}

/// Live accessors for the subset filter settings.
#[derive(Clone)]
pub struct SubsetPolicy {
    /// Target subset size.
    pub size: Arc<dyn Property<usize>>,
    /// Minimum eviction fraction.
    pub force_eliminate_fraction: Arc<dyn Property<f64>>,
    /// Failure threshold.
    pub failure_threshold: Arc<dyn Property<u64>>,
    /// Connection threshold.
    pub connection_threshold: Arc<dyn Property<u64>>,
}

impl fmt::Debug for SubsetPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubsetPolicy").field("current", &self.resolve()).finish()
    }
}

impl SubsetPolicy {
    /// Build a policy with fixed values taken from a config.
    pub fn from_config(config: &SubsetFilterConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            size: Arc::new(StaticProperty::new(config.size)),
            force_eliminate_fraction: Arc::new(StaticProperty::new(config.force_eliminate_percent)),
            failure_threshold: Arc::new(StaticProperty::new(config.elimination_failure_threshold)),
            connection_threshold: Arc::new(StaticProperty::new(
                config.elimination_connection_threshold,
            )),
        })
    }

    /// Build a policy from caller supplied accessors.
    ///
    /// The values read at construction must be valid; later values are
    /// clamped into range on each pass.
    pub fn new(
        size: Arc<dyn Property<usize>>,
        force_eliminate_fraction: Arc<dyn Property<f64>>,
        failure_threshold: Arc<dyn Property<u64>>,
        connection_threshold: Arc<dyn Property<u64>>,
    ) -> Result<Self> {
        let policy = Self {
            size,
            force_eliminate_fraction,
            failure_threshold,
            connection_threshold,
        };
        SubsetFilterConfig {
            size: policy.size.current(),
            force_eliminate_percent: policy.force_eliminate_fraction.current(),
            elimination_failure_threshold: policy.failure_threshold.current(),
            elimination_connection_threshold: policy.connection_threshold.current(),
        }
        .validate()?;
        Ok(policy)
    }

    /// Read every value once for a filter pass.
    pub fn resolve(&self) -> SubsetParams {
        let mut fraction = self.force_eliminate_fraction.current();
        if validate_fraction(fraction).is_err() {
            let clamped = if fraction.is_nan() { 0.0 } else { fraction.clamp(0.0, 1.0) };
            warn!(value = fraction, clamped, "force eliminate percent out of range");
            fraction = clamped;
        }
        let mut size = self.size.current();
        if size == 0 {
            warn!(value = size, clamped = 1, "subset size out of range");
            size = 1;
        }
        SubsetParams {
            size,
            force_eliminate_fraction: fraction,
            failure_threshold: self.failure_threshold.current(),
            connection_threshold: self.connection_threshold.current(),
        }
    }
}

fn default_weight_update_interval_ms() -> u64 {
    30_000
}

/// Settings for the response time weighted rule.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct WeightedRuleConfig {
    /// How often weights are recomputed, in milliseconds.
    #[serde(default = "default_weight_update_interval_ms")]
    pub weight_update_interval_ms: u64,
}

impl Default for WeightedRuleConfig {
    fn default() -> Self {
        Self {
            weight_update_interval_ms: default_weight_update_interval_ms(),
        }
    }
}

impl WeightedRuleConfig {
    /// Reject a zero interval.
    pub fn validate(&self) -> Result<()> {
        if self.weight_update_interval_ms == 0 {
            return Err(LbError::Config(
                "weight update interval must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// The recomputation interval.
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.weight_update_interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subset_defaults() {
        let config: SubsetFilterConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, SubsetFilterConfig::default());
        assert_eq!(config.size, 20);
        assert_eq!(config.force_eliminate_percent, 0.1);
    }

    #[test]
    fn test_subset_validation() {
        let config = SubsetFilterConfig { size: 0, ..Default::default() };
        assert!(matches!(config.validate(), Err(LbError::Config(_))));

        let config = SubsetFilterConfig { force_eliminate_percent: 1.5, ..Default::default() };
        assert!(config.validate().is_err());

        let config = SubsetFilterConfig { force_eliminate_percent: f64::NAN, ..Default::default() };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_dynamic_property_reload() {
        let size = Arc::new(DynamicProperty::new(20usize));
        let policy = SubsetPolicy::new(
            size.clone(),
            Arc::new(StaticProperty::new(0.1)),
            Arc::new(StaticProperty::new(0u64)),
            Arc::new(|| 3u64),
        )
        .unwrap();

        assert_eq!(policy.resolve().size, 20);
        assert_eq!(policy.resolve().connection_threshold, 3);
        size.set(5);
        assert_eq!(policy.resolve().size, 5);
        size.set(0);
        assert_eq!(policy.resolve().size, 1);
    }

    #[test]
    fn test_runtime_fraction_is_clamped() {
        let fraction = Arc::new(DynamicProperty::new(0.2));
        let policy = SubsetPolicy::new(
            Arc::new(StaticProperty::new(10usize)),
            fraction.clone(),
            Arc::new(StaticProperty::new(0u64)),
            Arc::new(StaticProperty::new(0u64)),
        )
        .unwrap();

        fraction.set(4.0);
        assert_eq!(policy.resolve().force_eliminate_fraction, 1.0);
        fraction.set(f64::NAN);
        assert_eq!(policy.resolve().force_eliminate_fraction, 0.0);
    }

    #[test]
    fn test_weighted_rule_interval() {
        let config: WeightedRuleConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.interval(), Duration::from_secs(30));

        let config = WeightedRuleConfig { weight_update_interval_ms: 0 };
        assert!(config.validate().is_err());
    }
}

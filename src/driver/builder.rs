//! Builder pattern for Driver construction

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;

use super::executor::Driver;
use super::PoolSelector;
use crate::admission::AdmissionStrategy;
use crate::config::{ConfigError, DriverConfig};
use crate::error::Result;
use crate::pool::Pool;

/// Builder for creating a [`Driver`] with validated configuration
///
/// # Example
/// ```ignore
/// let driver = DriverBuilder::new()
///     .attempts(500)
///     .workers(64)
///     .strategy(strategy)
///     .pools(pools)
///     .build()?;
/// ```
pub struct DriverBuilder {
    config: DriverConfig,
    strategy: Option<Arc<dyn AdmissionStrategy>>,
    pools: Vec<Pool>,
    selector: Option<PoolSelector>,
}

impl DriverBuilder {
    /// Create a new builder with default configuration
    pub fn new() -> Self {
        Self {
            config: DriverConfig::default(),
            strategy: None,
            pools: Vec::new(),
            selector: None,
        }
    }

    /// Set the full driver configuration
    pub fn config(mut self, config: DriverConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the total attempt count
    pub fn attempts(mut self, attempts: usize) -> Self {
        self.config.attempts = attempts;
        self
    }

    /// Set the worker count
    pub fn workers(mut self, workers: usize) -> Self {
        self.config.workers = workers;
        self
    }

    /// Set the run deadline
    pub fn deadline(mut self, deadline: Duration) -> Self {
        self.config.deadline = Some(deadline);
        self
    }

    /// Set the strategy under test
    pub fn strategy(mut self, strategy: Arc<dyn AdmissionStrategy>) -> Self {
        self.strategy = Some(strategy);
        self
    }

    /// Set the pools attempts are distributed over
    pub fn pools(mut self, pools: Vec<Pool>) -> Self {
        self.pools = pools;
        self
    }

    /// Set the pool selector; defaults to uniform random selection
    pub fn selector(mut self, selector: PoolSelector) -> Self {
        self.selector = Some(selector);
        self
    }

    /// Build the driver
    ///
    /// # Errors
    ///
    /// Returns an error if the strategy is missing, the pool list is
    /// empty, or configuration validation fails.
    pub fn build(self) -> Result<Driver> {
        let strategy = self.strategy.ok_or(ConfigError::Missing("strategy"))?;

        if self.pools.is_empty() {
            return Err(ConfigError::Missing("pools").into());
        }

        self.config.validate()?;

        let pool_count = self.pools.len();
        let selector = self
            .selector
            .unwrap_or_else(|| Arc::new(move |_| rand::thread_rng().gen_range(0..pool_count)));

        Ok(Driver::new(
            self.config,
            strategy,
            Arc::new(self.pools),
            selector,
        ))
    }
}

impl Default for DriverBuilder {
    fn default() -> Self {
        Self::new()
    }
}

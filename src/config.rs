//! Pool configuration and its builder.

use std::time::Duration;

/// Immutable pool configuration, validated at construction time.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Lower bound on idle count the reconciler maintains.
    pub min_idle: usize,

    /// Upper bound on idle count; surplus idle resources are disposed.
    pub max_idle: usize,

    /// Hard upper bound on total resources (idle + inuse + in-flight create).
    pub capacity: usize,

    /// Reconciler wake interval, coalesced with the explicit wake signal
    /// fired after every `Release` and after startup reconstruction.
    pub reconcile_interval: Duration,

    /// Minimum gap between reconciler create attempts after a factory
    /// failure, so a down factory isn't hammered every tick.
    pub create_retry_backoff: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            min_idle: 2,
            max_idle: 10,
            capacity: 32,
            reconcile_interval: Duration::from_secs(30),
            create_retry_backoff: Duration::from_secs(5),
        }
    }
}

impl PoolConfig {
    /// Validate `0 ≤ min_idle ≤ max_idle ≤ capacity`.
    pub fn validate(&self) -> Result<(), String> {
        if self.min_idle > self.max_idle {
            return Err(format!(
                "min_idle ({}) > max_idle ({})",
                self.min_idle, self.max_idle
            ));
        }
        if self.max_idle > self.capacity {
            return Err(format!(
                "max_idle ({}) > capacity ({})",
                self.max_idle, self.capacity
            ));
        }
        Ok(())
    }

    pub fn builder() -> PoolConfigBuilder {
        PoolConfigBuilder::default()
    }
}

/// Builder for [`PoolConfig`].
#[derive(Default)]
pub struct PoolConfigBuilder {
    config: PoolConfig,
}

impl PoolConfigBuilder {
    pub fn min_idle(mut self, n: usize) -> Self {
        self.config.min_idle = n;
        self
    }

    pub fn max_idle(mut self, n: usize) -> Self {
        self.config.max_idle = n;
        self
    }

    pub fn capacity(mut self, n: usize) -> Self {
        self.config.capacity = n;
        self
    }

    pub fn reconcile_interval(mut self, d: Duration) -> Self {
        self.config.reconcile_interval = d;
        self
    }

    pub fn create_retry_backoff(mut self, d: Duration) -> Self {
        self.config.create_retry_backoff = d;
        self
    }

    pub fn build(self) -> Result<PoolConfig, String> {
        self.config.validate()?;
        Ok(self.config)
    }
}

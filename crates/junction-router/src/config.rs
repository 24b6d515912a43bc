//! Router and target configuration
//!
//! Configuration *types* only; loading them from files or the environment
//! is the embedding application's job.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use junction_core::{JunctionError, Result, Target, TargetRole};

use crate::pool::PoolConfig;

fn default_health_interval_ms() -> u64 {
    30_000
}

/// Configuration for one database target
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetConfig {
    /// Role in the topology
    role: TargetRole,

    /// Endpoint address (host:port or a DSN-style string)
    address: String,

    /// Reference to externally managed credentials
    credentials: Option<String>,

    /// Pool sizing and timeouts for this target
    #[serde(default)]
    pool: PoolConfig,

    /// Interval between periodic health sweeps, in milliseconds
    #[serde(default = "default_health_interval_ms")]
    health_check_interval_ms: u64,
}

impl TargetConfig {
    /// Create a primary target configuration.
    pub fn primary(address: impl Into<String>) -> Self {
        Self::new(TargetRole::Primary, address)
    }

    /// Create a replica target configuration.
    pub fn replica(address: impl Into<String>) -> Self {
        Self::new(TargetRole::Replica, address)
    }

    fn new(role: TargetRole, address: impl Into<String>) -> Self {
        Self {
            role,
            address: address.into(),
            credentials: None,
            pool: PoolConfig::default(),
            health_check_interval_ms: default_health_interval_ms(),
        }
    }

    /// Set the credentials reference.
    pub fn with_credentials(mut self, reference: impl Into<String>) -> Self {
        self.credentials = Some(reference.into());
        self
    }

    /// Set the pool configuration.
    pub fn with_pool(mut self, pool: PoolConfig) -> Self {
        self.pool = pool;
        self
    }

    /// Set the health sweep interval in milliseconds.
    pub fn with_health_check_interval_ms(mut self, interval_ms: u64) -> Self {
        self.health_check_interval_ms = interval_ms;
        self
    }

    /// Role in the topology
    pub fn role(&self) -> TargetRole {
        self.role
    }

    /// Endpoint address
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Credentials reference, if any
    pub fn credentials(&self) -> Option<&str> {
        self.credentials.as_deref()
    }

    /// Pool configuration
    pub fn pool(&self) -> &PoolConfig {
        &self.pool
    }

    /// Health sweep interval
    pub fn health_check_interval(&self) -> Duration {
        Duration::from_millis(self.health_check_interval_ms)
    }

    /// Build the immutable target identity this configuration describes.
    pub fn to_target(&self) -> Target {
        let target = Target::new(self.role, self.address.clone());
        match &self.credentials {
            Some(reference) => target.with_credentials(reference.clone()),
            None => target,
        }
    }
}

/// Configuration enumerating every target of a router
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RouterConfig {
    targets: Vec<TargetConfig>,
}

impl RouterConfig {
    /// Create an empty configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a target.
    pub fn with_target(mut self, target: TargetConfig) -> Self {
        self.targets.push(target);
        self
    }

    /// The configured targets
    pub fn targets(&self) -> &[TargetConfig] {
        &self.targets
    }

    /// Consume the configuration, yielding its targets.
    pub fn into_targets(self) -> Vec<TargetConfig> {
        self.targets
    }

    /// Check the topology: exactly one primary, sane pool sizes.
    pub fn validate(&self) -> Result<()> {
        validate_targets(self.targets.iter())
    }
}

/// Topology validation shared by `RouterConfig` and the router builder.
pub(crate) fn validate_targets<'a, I>(targets: I) -> Result<()>
where
    I: IntoIterator<Item = &'a TargetConfig>,
{
    let mut primaries = 0usize;
    let mut total = 0usize;

    for target in targets {
        total += 1;
        if target.role().is_primary() {
            primaries += 1;
        }
        let pool = target.pool();
        if pool.max_size() == 0 {
            return Err(JunctionError::Configuration(format!(
                "target {}: max_size must be greater than 0",
                target.address()
            )));
        }
        if pool.min_size() > pool.max_size() {
            return Err(JunctionError::Configuration(format!(
                "target {}: min_size ({}) cannot exceed max_size ({})",
                target.address(),
                pool.min_size(),
                pool.max_size()
            )));
        }
    }

    if total == 0 {
        return Err(JunctionError::Configuration(
            "no targets configured".into(),
        ));
    }
    if primaries != 1 {
        return Err(JunctionError::Configuration(format!(
            "expected exactly one primary target, got {}",
            primaries
        )));
    }
    Ok(())
}

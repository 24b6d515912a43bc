//! Read/write-splitting router

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use junction_core::{Connection, JunctionError, Result, Target, TargetRole};

use super::policy::{ReplicaPolicy, RoundRobin};
use crate::config::{RouterConfig, TargetConfig, validate_targets};
use crate::factory::ConnectionFactory;
use crate::health::{HealthCheck, HealthMonitor, HealthMonitorConfig, MonitorMember, TargetHealth, TargetStatus};
use crate::pool::{Pool, PooledConnection};

/// Caller's declared need for a connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Intent {
    /// A read-only operation, routable to a replica
    Read,
    /// A mutating operation, always served by the primary
    Write,
}

/// One routed target: its identity, pool, and health cell.
pub(crate) struct TargetState {
    pub(crate) target: Arc<Target>,
    pub(crate) pool: Arc<Pool>,
    pub(crate) health: Arc<TargetHealth>,
}

/// Routes operations to the primary or a replica and manages a bounded
/// connection pool per target.
///
/// Writes always go to the single primary. Reads go to a healthy replica
/// chosen by the configured [`ReplicaPolicy`], falling back to the primary
/// when no replica is healthy or none is configured.
///
/// A `Router` is an explicitly constructed value, typically wrapped in an
/// `Arc` and handed to callers; there is no process-wide instance.
///
/// # Example
///
/// ```ignore
/// use junction_router::{Intent, Router, TargetConfig};
///
/// let router = Router::builder()
///     .target(TargetConfig::primary("primary.db:5432"), primary_factory)
///     .target(TargetConfig::replica("replica-a.db:5432"), replica_factory)
///     .build()?;
///
/// let report = router
///     .with_connection(Intent::Read, |conn| async move {
///         // run the query through the caller's own execution layer
///         Ok(())
///     })
///     .await?;
/// ```
pub struct Router {
    primary: TargetState,
    replicas: Vec<TargetState>,
    policy: Arc<dyn ReplicaPolicy>,
    monitor: HealthMonitor,
    closed: AtomicBool,
}

impl Router {
    /// Start building a router.
    pub fn builder() -> RouterBuilder {
        RouterBuilder::new()
    }

    /// Select the pool serving the given intent.
    ///
    /// Writes select the primary. Reads select among healthy replicas via
    /// the replica policy, or the primary when none is healthy.
    pub fn route(&self, intent: Intent) -> Result<&Pool> {
        self.route_with_affinity(intent, None)
    }

    /// Select a pool, pinning reads with an affinity key where the policy
    /// supports it.
    pub fn route_with_affinity(&self, intent: Intent, affinity: Option<u64>) -> Result<&Pool> {
        if self.is_closed() {
            return Err(JunctionError::Closed);
        }

        match intent {
            Intent::Write => Ok(&self.primary.pool),
            Intent::Read => {
                let readable: Vec<&TargetState> = self
                    .replicas
                    .iter()
                    .filter(|state| state.health.is_readable())
                    .collect();

                if readable.is_empty() {
                    if !self.replicas.is_empty() {
                        tracing::debug!("no healthy replica, read falls back to primary");
                    }
                    return Ok(&self.primary.pool);
                }

                let index = self.policy.select(readable.len(), affinity) % readable.len();
                Ok(&readable[index].pool)
            }
        }
    }

    /// Acquire a connection for the given intent.
    pub async fn acquire(&self, intent: Intent) -> Result<PooledConnection<'_>> {
        self.acquire_with_affinity(intent, None).await
    }

    /// Acquire a connection, pinning reads with an affinity key.
    #[tracing::instrument(skip(self), level = "debug")]
    pub async fn acquire_with_affinity(
        &self,
        intent: Intent,
        affinity: Option<u64>,
    ) -> Result<PooledConnection<'_>> {
        self.route_with_affinity(intent, affinity)?.acquire().await
    }

    /// Run an operation on a routed connection, releasing it on every exit
    /// path.
    ///
    /// The connection is returned as healthy when the operation succeeds and
    /// as unhealthy when it fails; if the operation panics or the future is
    /// dropped, the guard still returns the connection.
    pub async fn with_connection<F, Fut, T>(&self, intent: Intent, op: F) -> Result<T>
    where
        F: FnOnce(Arc<dyn Connection>) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.with_connection_affinity(intent, None, op).await
    }

    /// [`with_connection`](Router::with_connection) with an affinity key.
    pub async fn with_connection_affinity<F, Fut, T>(
        &self,
        intent: Intent,
        affinity: Option<u64>,
        op: F,
    ) -> Result<T>
    where
        F: FnOnce(Arc<dyn Connection>) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let conn = self.acquire_with_affinity(intent, affinity).await?;
        let session = conn.session();
        match op(session).await {
            Ok(value) => {
                conn.release(true);
                Ok(value)
            }
            Err(err) => {
                conn.release(false);
                Err(err)
            }
        }
    }

    /// The primary target's pool
    pub fn primary_pool(&self) -> &Pool {
        &self.primary.pool
    }

    /// The replica pools, in configuration order
    pub fn replica_pools(&self) -> impl Iterator<Item = &Pool> {
        self.replicas.iter().map(|state| state.pool.as_ref())
    }

    /// Current status of every target, primary first
    pub fn statuses(&self) -> Vec<(Arc<Target>, TargetStatus)> {
        self.states()
            .map(|state| (state.target.clone(), state.health.status()))
            .collect()
    }

    /// Whether `close` has been called
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Shut the router down: stop health monitoring and drain every pool,
    /// each bounded by `timeout`.
    ///
    /// Returns `ShutdownTimeout` if any pool still had outstanding
    /// connections when its budget elapsed; those sessions are force-closed.
    /// Terminal: the router rejects all traffic afterwards. A second call
    /// is a no-op.
    #[tracing::instrument(skip(self))]
    pub async fn close(&self, timeout: Duration) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        tracing::info!("shutting down router");
        self.monitor.stop();

        let mut drains = tokio::task::JoinSet::new();
        for state in self.states() {
            state.health.mark_closed();
            let pool = state.pool.clone();
            drains.spawn(async move { pool.drain(timeout).await });
        }

        let mut outstanding = 0usize;
        while let Some(joined) = drains.join_next().await {
            match joined {
                Ok(Ok(())) => {}
                Ok(Err(JunctionError::ShutdownTimeout { outstanding: n })) => outstanding += n,
                Ok(Err(err)) => tracing::warn!(error = %err, "pool drain failed"),
                Err(err) => tracing::error!(error = %err, "pool drain task panicked"),
            }
        }

        if outstanding == 0 {
            tracing::info!("router shut down");
            Ok(())
        } else {
            Err(JunctionError::ShutdownTimeout { outstanding })
        }
    }

    fn states(&self) -> impl Iterator<Item = &TargetState> {
        std::iter::once(&self.primary).chain(self.replicas.iter())
    }

    #[cfg(test)]
    pub(crate) fn replica_state(&self, index: usize) -> &TargetState {
        &self.replicas[index]
    }
}

impl std::fmt::Debug for Router {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Router")
            .field("primary", &self.primary.target.address())
            .field("replicas", &self.replicas.len())
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Builder assembling a [`Router`] from target configurations and their
/// connection factories.
pub struct RouterBuilder {
    targets: Vec<(TargetConfig, Arc<dyn ConnectionFactory>)>,
    policy: Arc<dyn ReplicaPolicy>,
    check: Option<Arc<dyn HealthCheck>>,
    health_config: HealthMonitorConfig,
}

impl RouterBuilder {
    fn new() -> Self {
        Self {
            targets: Vec::new(),
            policy: Arc::new(RoundRobin::new()),
            check: None,
            health_config: HealthMonitorConfig::default(),
        }
    }

    /// Add one target with its connection factory.
    pub fn target<F: ConnectionFactory>(mut self, config: TargetConfig, factory: F) -> Self {
        self.targets.push((config, Arc::new(factory)));
        self
    }

    /// Add every target from a configuration, resolving each one's factory
    /// through `factory_for`.
    pub fn targets_with<F>(mut self, config: RouterConfig, factory_for: F) -> Self
    where
        F: Fn(&TargetConfig) -> Arc<dyn ConnectionFactory>,
    {
        for target in config.into_targets() {
            let factory = factory_for(&target);
            self.targets.push((target, factory));
        }
        self
    }

    /// Replace the default round-robin replica policy.
    pub fn replica_policy<P: ReplicaPolicy>(mut self, policy: P) -> Self {
        self.policy = Arc::new(policy);
        self
    }

    /// Install a custom health-check hook, used both for lazy revalidation
    /// and the periodic sweep. Defaults to the factory's `validate`.
    pub fn health_check<H: HealthCheck>(mut self, check: H) -> Self {
        self.check = Some(Arc::new(check));
        self
    }

    /// Replace the default health monitor configuration.
    pub fn health_config(mut self, config: HealthMonitorConfig) -> Self {
        self.health_config = config;
        self
    }

    /// Validate the topology and construct the router.
    ///
    /// Requires exactly one primary target. Must be called within a tokio
    /// runtime; the health monitor task is spawned here.
    pub fn build(self) -> Result<Router> {
        validate_targets(self.targets.iter().map(|(config, _)| config))?;

        let mut primary = None;
        let mut replicas = Vec::new();
        let mut members = Vec::new();

        for (config, factory) in self.targets {
            let target = Arc::new(config.to_target());
            let pool = Arc::new(Pool::with_shared(
                target.clone(),
                config.pool().clone(),
                factory,
                self.check.clone(),
            ));
            let health = Arc::new(TargetHealth::new(self.health_config.failure_threshold));
            members.push(MonitorMember {
                pool: pool.clone(),
                health: health.clone(),
                interval: config.health_check_interval(),
            });

            let state = TargetState {
                target,
                pool,
                health,
            };
            match config.role() {
                TargetRole::Primary => primary = Some(state),
                TargetRole::Replica => replicas.push(state),
            }
        }

        // validate_targets guarantees exactly one primary.
        let primary = primary.expect("validated primary target");

        tracing::info!(
            primary = %primary.target.address(),
            replicas = replicas.len(),
            "router constructed"
        );

        Ok(Router {
            primary,
            replicas,
            policy: self.policy,
            monitor: HealthMonitor::spawn(self.health_config, members),
            closed: AtomicBool::new(false),
        })
    }
}

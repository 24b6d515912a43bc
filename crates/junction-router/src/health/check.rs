//! Pluggable health-check hook

use std::sync::Arc;

use async_trait::async_trait;
use junction_core::Connection;

use crate::factory::ConnectionFactory;

/// Hook deciding whether a connection is still healthy.
///
/// Junction deliberately implements no replica-lag detection protocol of its
/// own; embedders that need one plug it in here (e.g. a probe query against
/// a lag table). The default implementation delegates to the factory's
/// `validate`.
#[async_trait]
pub trait HealthCheck: Send + Sync + 'static {
    /// Check a single connection. `true` means healthy.
    async fn check(&self, conn: &dyn Connection) -> bool;
}

#[async_trait]
impl<T: HealthCheck> HealthCheck for Arc<T> {
    async fn check(&self, conn: &dyn Connection) -> bool {
        (**self).check(conn).await
    }
}

/// Default health check: the factory's own `validate` hook.
pub struct FactoryValidation {
    factory: Arc<dyn ConnectionFactory>,
}

impl FactoryValidation {
    /// Wrap a factory's `validate` as a health check.
    pub fn new(factory: Arc<dyn ConnectionFactory>) -> Self {
        Self { factory }
    }
}

#[async_trait]
impl HealthCheck for FactoryValidation {
    async fn check(&self, conn: &dyn Connection) -> bool {
        self.factory.validate(conn).await
    }
}

//! Connection factory trait

use std::sync::Arc;

use async_trait::async_trait;
use junction_core::{Connection, Result};

/// Factory for opening physical sessions to one target.
///
/// One factory serves one logical target (the primary or a single replica).
/// The factory performs no retries of its own; retry policy belongs to the
/// pool and to the caller.
#[async_trait]
pub trait ConnectionFactory: Send + Sync + 'static {
    /// Open a new physical session.
    ///
    /// Fails with [`JunctionError::Connect`](junction_core::JunctionError::Connect)
    /// on network, authentication, or timeout errors.
    async fn open(&self) -> Result<Arc<dyn Connection>>;

    /// Validate that a connection is still usable
    ///
    /// Default implementation only checks the closed flag.
    async fn validate(&self, conn: &dyn Connection) -> bool {
        !conn.is_closed()
    }
}

#[async_trait]
impl<T: ConnectionFactory> ConnectionFactory for Arc<T> {
    async fn open(&self) -> Result<Arc<dyn Connection>> {
        (**self).open().await
    }

    async fn validate(&self, conn: &dyn Connection) -> bool {
        (**self).validate(conn).await
    }
}

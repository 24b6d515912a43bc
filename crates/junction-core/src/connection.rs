//! Connection trait

use crate::{Result, Target};
use async_trait::async_trait;

/// A live session to a database target.
///
/// Junction does not interpret SQL; query execution belongs to the caller's
/// own layer. This trait covers only the lifecycle surface the pool and
/// health checks need. Implementations are provided by the embedding
/// application's `ConnectionFactory`.
#[async_trait]
pub trait Connection: Send + Sync {
    /// The target this session was opened against
    fn target(&self) -> &Target;

    /// Close the underlying session.
    ///
    /// Closing an already-closed session is a no-op.
    async fn close(&self) -> Result<()>;

    /// Whether the session has been closed (locally or by the server)
    fn is_closed(&self) -> bool;
}

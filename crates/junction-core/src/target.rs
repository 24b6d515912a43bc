//! Target identification

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Role of a target in the replication topology
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetRole {
    /// The single writable instance
    Primary,
    /// A read-only replica
    Replica,
}

impl TargetRole {
    /// Check if this role accepts writes.
    pub fn is_primary(&self) -> bool {
        matches!(self, TargetRole::Primary)
    }
}

/// One database endpoint (primary or replica).
///
/// Immutable after creation. Credentials are carried as an opaque reference
/// name; resolving it to actual secrets is the embedding application's job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Target {
    /// Unique identifier
    id: Uuid,

    /// Role in the topology
    role: TargetRole,

    /// Endpoint address (host:port or a DSN-style string)
    address: String,

    /// Reference to externally managed credentials
    credentials: Option<String>,
}

impl Target {
    /// Create a new target for the given role and address.
    pub fn new(role: TargetRole, address: impl Into<String>) -> Self {
        let address = address.into();
        tracing::debug!(role = ?role, address = %address, "creating target");
        Self {
            id: Uuid::new_v4(),
            role,
            address,
            credentials: None,
        }
    }

    /// Attach a credentials reference.
    pub fn with_credentials(mut self, reference: impl Into<String>) -> Self {
        self.credentials = Some(reference.into());
        self
    }

    /// Unique identifier of this target
    pub fn id(&self) -> Uuid {
        self.id
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
}

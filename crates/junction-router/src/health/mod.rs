//! Health checking for targets and their connections
//!
//! Connections are validated lazily (before a stale one is handed out) and
//! periodically (a background sweep over a sample of each pool's idle set).
//! Repeated failures flip a target to `Degraded`, which removes it from
//! read routing until a check succeeds again.

mod check;
mod monitor;
mod status;

#[cfg(test)]
mod tests;

pub use check::{FactoryValidation, HealthCheck};
pub use monitor::{HealthMonitor, HealthMonitorConfig};
pub use status::{TargetHealth, TargetStatus};

pub(crate) use monitor::MonitorMember;

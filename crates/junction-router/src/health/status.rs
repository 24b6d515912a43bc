//! Per-target health state

use std::sync::atomic::{AtomicU32, Ordering};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// Routing status of a target
///
/// `Healthy -> Degraded -> Healthy` as health checks fail and recover;
/// `Closed` only during shutdown, terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetStatus {
    /// Target is serving traffic normally
    Healthy,
    /// Target is excluded from read routing until a check succeeds
    Degraded,
    /// Target has been shut down
    Closed,
}

impl TargetStatus {
    /// Check if the target may serve reads.
    pub fn is_readable(&self) -> bool {
        matches!(self, TargetStatus::Healthy)
    }
}

/// Shared health cell for one target.
///
/// Written by the health monitor, read by the router on every routing
/// decision. Consecutive failed sweeps flip the status to `Degraded` once
/// they reach the failure threshold; a single success flips it back.
pub struct TargetHealth {
    status: Mutex<TargetStatus>,
    consecutive_failures: AtomicU32,
    failure_threshold: u32,
}

impl TargetHealth {
    /// Create a healthy cell with the given failure threshold.
    pub fn new(failure_threshold: u32) -> Self {
        Self {
            status: Mutex::new(TargetStatus::Healthy),
            consecutive_failures: AtomicU32::new(0),
            failure_threshold: failure_threshold.max(1),
        }
    }

    /// Current status
    pub fn status(&self) -> TargetStatus {
        *self.status.lock()
    }

    /// Whether the target may serve reads right now
    pub fn is_readable(&self) -> bool {
        self.status().is_readable()
    }

    /// Number of consecutive failed checks
    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures.load(Ordering::SeqCst)
    }

    /// Record one failed sweep. Returns true if this failure flipped the
    /// target from `Healthy` to `Degraded`.
    pub(crate) fn record_failure(&self) -> bool {
        let failures = self.consecutive_failures.fetch_add(1, Ordering::SeqCst) + 1;
        if failures < self.failure_threshold {
            return false;
        }
        let mut status = self.status.lock();
        if *status == TargetStatus::Healthy {
            *status = TargetStatus::Degraded;
            true
        } else {
            false
        }
    }

    /// Record a successful check. Returns true if the target recovered
    /// from `Degraded`.
    pub(crate) fn record_success(&self) -> bool {
        self.consecutive_failures.store(0, Ordering::SeqCst);
        let mut status = self.status.lock();
        if *status == TargetStatus::Degraded {
            *status = TargetStatus::Healthy;
            true
        } else {
            false
        }
    }

    /// Mark the target closed. Terminal.
    pub(crate) fn mark_closed(&self) {
        *self.status.lock() = TargetStatus::Closed;
    }
}

impl std::fmt::Debug for TargetHealth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TargetHealth")
            .field("status", &self.status())
            .field("consecutive_failures", &self.consecutive_failures())
            .finish()
    }
}

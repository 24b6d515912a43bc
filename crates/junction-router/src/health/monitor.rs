//! Periodic health monitoring
//!
//! A single background task sweeps every target's pool on its configured
//! cadence: idle connections are sampled and validated, failures are
//! invalidated, and per-target status flips to `Degraded` after enough
//! consecutive all-failed sweeps. Sweep outcomes never surface as errors to
//! callers; they only change routing decisions.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::task::JoinHandle;

use super::status::{TargetHealth, TargetStatus};
use crate::pool::Pool;

/// Configuration for the health monitor
#[derive(Debug, Clone)]
pub struct HealthMonitorConfig {
    /// Maximum idle connections inspected per target per sweep
    pub sample_size: usize,
    /// Consecutive all-failed sweeps before a target is degraded
    pub failure_threshold: u32,
    /// Timeout for each individual check
    pub check_timeout: Duration,
}

impl HealthMonitorConfig {
    /// Set the per-sweep sample size.
    pub fn with_sample_size(mut self, sample_size: usize) -> Self {
        self.sample_size = sample_size.max(1);
        self
    }

    /// Set the consecutive-failure threshold.
    pub fn with_failure_threshold(mut self, threshold: u32) -> Self {
        self.failure_threshold = threshold.max(1);
        self
    }

    /// Set the per-check timeout.
    pub fn with_check_timeout(mut self, timeout: Duration) -> Self {
        self.check_timeout = timeout;
        self
    }
}

impl Default for HealthMonitorConfig {
    /// Defaults: sample 3 connections per sweep, degrade after 3
    /// consecutive failures, 5 second check timeout.
    fn default() -> Self {
        Self {
            sample_size: 3,
            failure_threshold: 3,
            check_timeout: Duration::from_secs(5),
        }
    }
}

/// One monitored target: its pool, its shared health cell, and its cadence.
pub(crate) struct MonitorMember {
    pub(crate) pool: Arc<Pool>,
    pub(crate) health: Arc<TargetHealth>,
    pub(crate) interval: Duration,
}

/// Handle to the background sweep task.
pub struct HealthMonitor {
    running: Arc<AtomicBool>,
    shutdown: Arc<Notify>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl HealthMonitor {
    /// Spawn the sweep task. Must be called within a tokio runtime.
    pub(crate) fn spawn(config: HealthMonitorConfig, members: Vec<MonitorMember>) -> Self {
        let running = Arc::new(AtomicBool::new(true));
        let shutdown = Arc::new(Notify::new());
        let handle = tokio::spawn(run_loop(
            config,
            members,
            running.clone(),
            shutdown.clone(),
        ));
        Self {
            running,
            shutdown,
            handle: Mutex::new(Some(handle)),
        }
    }

    /// Whether the sweep task is still running
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Stop the sweep task. The current sweep finishes first; connections
    /// sampled out of a pool are always returned or destroyed, never lost.
    pub(crate) fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        self.shutdown.notify_waiters();
        // Detach rather than abort so an in-flight sweep completes.
        self.handle.lock().take();
    }
}

impl Drop for HealthMonitor {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn run_loop(
    config: HealthMonitorConfig,
    members: Vec<MonitorMember>,
    running: Arc<AtomicBool>,
    shutdown: Arc<Notify>,
) {
    if members.is_empty() {
        return;
    }

    // Tick at the fastest target cadence; each target sweeps only when its
    // own interval has elapsed.
    let tick = members
        .iter()
        .map(|m| m.interval)
        .min()
        .unwrap_or(Duration::from_secs(30))
        .max(Duration::from_millis(10));
    let mut last_sweep: Vec<Option<Instant>> = vec![None; members.len()];

    loop {
        tokio::select! {
            _ = tokio::time::sleep(tick) => {}
            _ = shutdown.notified() => break,
        }
        if !running.load(Ordering::SeqCst) {
            break;
        }

        for (member, last) in members.iter().zip(last_sweep.iter_mut()) {
            let due = last.is_none_or(|at| at.elapsed() >= member.interval);
            if due {
                sweep(&config, member).await;
                *last = Some(Instant::now());
            }
        }
    }
}

/// Inspect one target: validate a sample of its idle connections, record
/// the outcome against its health cell, and keep the pool at its floor.
async fn sweep(config: &HealthMonitorConfig, member: &MonitorMember) {
    let pool = &member.pool;
    if pool.is_closed() {
        return;
    }

    let entries = pool.take_idle_sample(config.sample_size);
    let mut checked = 0u32;
    let mut passed = 0u32;

    for entry in entries {
        // Aged-out connections are destroyed without counting as a health
        // signal; TTL expiry is lifecycle, not target failure.
        if pool.entry_expired(&entry) {
            pool.discard_idle(entry);
            continue;
        }
        checked += 1;
        let healthy = tokio::time::timeout(config.check_timeout, pool.run_check(&entry))
            .await
            .unwrap_or(false);
        if healthy {
            passed += 1;
            pool.return_idle(entry);
        } else {
            pool.discard_idle(entry);
        }
    }

    if checked > 0 {
        record_outcome(member, passed > 0);
    } else if member.health.status() == TargetStatus::Degraded {
        // Nothing idle to observe on a degraded target: probe with a
        // throwaway session so it can recover.
        let healthy = tokio::time::timeout(config.check_timeout, pool.probe())
            .await
            .unwrap_or(false);
        record_outcome(member, healthy);
    }

    // Replenish toward min size so the next sweep has connections to
    // observe and callers find warm capacity.
    if let Err(err) = pool.warmup().await {
        tracing::debug!(
            target = %pool.target().address(),
            error = %err,
            "pool replenish failed"
        );
    }
}

fn record_outcome(member: &MonitorMember, healthy: bool) {
    if healthy {
        if member.health.record_success() {
            tracing::info!(
                target = %member.pool.target().address(),
                "target recovered, resuming read routing"
            );
        }
    } else {
        let degraded_now = member.health.record_failure();
        if degraded_now {
            tracing::warn!(
                target = %member.pool.target().address(),
                failures = member.health.consecutive_failures(),
                "target degraded, excluded from read routing"
            );
        } else {
            tracing::debug!(
                target = %member.pool.target().address(),
                failures = member.health.consecutive_failures(),
                "health check sweep failed"
            );
        }
    }
}

//! Tests for the health module

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use junction_core::{Connection, Result, Target, TargetRole};

use super::check::HealthCheck;
use super::monitor::{HealthMonitor, HealthMonitorConfig, MonitorMember};
use super::status::{TargetHealth, TargetStatus};
use crate::factory::ConnectionFactory;
use crate::pool::{Pool, PoolConfig};

// =============================================================================
// TargetStatus tests
// =============================================================================

#[test]
fn test_status_readability() {
    assert!(TargetStatus::Healthy.is_readable());
    assert!(!TargetStatus::Degraded.is_readable());
    assert!(!TargetStatus::Closed.is_readable());
}

#[test]
fn test_status_serialization() {
    assert_eq!(
        serde_json::to_string(&TargetStatus::Healthy).unwrap(),
        "\"healthy\""
    );
    assert_eq!(
        serde_json::to_string(&TargetStatus::Degraded).unwrap(),
        "\"degraded\""
    );

    let status: TargetStatus = serde_json::from_str("\"degraded\"").unwrap();
    assert_eq!(status, TargetStatus::Degraded);
}

// =============================================================================
// TargetHealth tests
// =============================================================================

#[test]
fn test_health_degrades_at_threshold() {
    let health = TargetHealth::new(3);
    assert_eq!(health.status(), TargetStatus::Healthy);

    assert!(!health.record_failure());
    assert!(!health.record_failure());
    assert_eq!(health.status(), TargetStatus::Healthy);
    assert_eq!(health.consecutive_failures(), 2);

    // Third consecutive failure flips the status
    assert!(health.record_failure());
    assert_eq!(health.status(), TargetStatus::Degraded);
}

#[test]
fn test_health_single_success_recovers() {
    let health = TargetHealth::new(3);
    for _ in 0..3 {
        health.record_failure();
    }
    assert_eq!(health.status(), TargetStatus::Degraded);

    assert!(health.record_success());
    assert_eq!(health.status(), TargetStatus::Healthy);
    assert_eq!(health.consecutive_failures(), 0);
}

#[test]
fn test_health_success_resets_failure_streak() {
    let health = TargetHealth::new(3);
    health.record_failure();
    health.record_failure();
    health.record_success();

    // The streak starts over; two more failures stay healthy
    health.record_failure();
    health.record_failure();
    assert_eq!(health.status(), TargetStatus::Healthy);
}

#[test]
fn test_health_closed_is_terminal() {
    let health = TargetHealth::new(1);
    health.mark_closed();

    health.record_failure();
    assert_eq!(health.status(), TargetStatus::Closed);
    health.record_success();
    assert_eq!(health.status(), TargetStatus::Closed);
}

// =============================================================================
// HealthMonitorConfig tests
// =============================================================================

#[test]
fn test_monitor_config_defaults() {
    let config = HealthMonitorConfig::default();
    assert_eq!(config.sample_size, 3);
    assert_eq!(config.failure_threshold, 3);
    assert_eq!(config.check_timeout, Duration::from_secs(5));
}

#[test]
fn test_monitor_config_builders() {
    let config = HealthMonitorConfig::default()
        .with_sample_size(5)
        .with_failure_threshold(2)
        .with_check_timeout(Duration::from_secs(1));

    assert_eq!(config.sample_size, 5);
    assert_eq!(config.failure_threshold, 2);
    assert_eq!(config.check_timeout, Duration::from_secs(1));

    // Zero values are clamped to sane minimums
    let clamped = HealthMonitorConfig::default()
        .with_sample_size(0)
        .with_failure_threshold(0);
    assert_eq!(clamped.sample_size, 1);
    assert_eq!(clamped.failure_threshold, 1);
}

// =============================================================================
// Monitor sweep tests
// =============================================================================

struct MockConnection {
    target: Target,
    closed: AtomicBool,
}

#[async_trait]
impl Connection for MockConnection {
    fn target(&self) -> &Target {
        &self.target
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

struct MockFactory {
    target: Target,
    opened: AtomicUsize,
}

impl MockFactory {
    fn new() -> Self {
        Self {
            target: Target::new(TargetRole::Replica, "replica-a.db:5432"),
            opened: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl ConnectionFactory for MockFactory {
    async fn open(&self) -> Result<Arc<dyn Connection>> {
        self.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(MockConnection {
            target: self.target.clone(),
            closed: AtomicBool::new(false),
        }))
    }
}

/// Health check controlled by a shared flag
struct FlagCheck {
    healthy: Arc<AtomicBool>,
}

#[async_trait]
impl HealthCheck for FlagCheck {
    async fn check(&self, _conn: &dyn Connection) -> bool {
        self.healthy.load(Ordering::SeqCst)
    }
}

fn monitored_pool(
    config: PoolConfig,
    healthy: Arc<AtomicBool>,
) -> (Arc<Pool>, Arc<MockFactory>) {
    let factory = Arc::new(MockFactory::new());
    let target = Arc::new(Target::new(TargetRole::Replica, "replica-a.db:5432"));
    let pool = Arc::new(Pool::with_shared(
        target,
        config,
        factory.clone(),
        Some(Arc::new(FlagCheck { healthy })),
    ));
    (pool, factory)
}

#[tokio::test]
async fn test_sweep_degrades_after_three_failures_and_recovers() {
    let healthy = Arc::new(AtomicBool::new(true));
    let (pool, _factory) = monitored_pool(PoolConfig::new(1, 5), healthy.clone());
    let health = Arc::new(TargetHealth::new(3));

    // Seed one idle connection for the sweep to observe
    {
        let _conn = pool.acquire().await.expect("acquire");
    }
    assert_eq!(pool.stats().idle(), 1);

    let monitor = HealthMonitor::spawn(
        HealthMonitorConfig::default(),
        vec![MonitorMember {
            pool: pool.clone(),
            health: health.clone(),
            interval: Duration::from_millis(20),
        }],
    );

    // Checks fail: each sweep invalidates the idle connection, the
    // replenish opens a fresh one, and the failure streak grows.
    healthy.store(false, Ordering::SeqCst);
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(health.status(), TargetStatus::Degraded);
    assert!(health.consecutive_failures() >= 3);

    // One passing sweep brings the target back
    healthy.store(true, Ordering::SeqCst);
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(health.status(), TargetStatus::Healthy);

    monitor.stop();
    assert!(!monitor.is_running());
}

#[tokio::test]
async fn test_degraded_target_recovers_via_probe() {
    let healthy = Arc::new(AtomicBool::new(false));
    // min_size 0: after the failed sweep destroys the only idle
    // connection there is nothing left to observe, so recovery has to go
    // through the probe path.
    let (pool, factory) = monitored_pool(PoolConfig::new(0, 5), healthy.clone());
    let health = Arc::new(TargetHealth::new(1));

    {
        let _conn = pool.acquire().await.expect("acquire");
    }
    let opened_before = factory.opened.load(Ordering::SeqCst);

    let monitor = HealthMonitor::spawn(
        HealthMonitorConfig::default().with_failure_threshold(1),
        vec![MonitorMember {
            pool: pool.clone(),
            health: health.clone(),
            interval: Duration::from_millis(20),
        }],
    );

    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(health.status(), TargetStatus::Degraded);
    assert_eq!(pool.stats().idle(), 0);

    healthy.store(true, Ordering::SeqCst);
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(health.status(), TargetStatus::Healthy);
    // Recovery was observed through a throwaway probe session
    assert!(factory.opened.load(Ordering::SeqCst) > opened_before);

    monitor.stop();
}

#[tokio::test]
async fn test_sweep_leaves_healthy_connections_idle() {
    let healthy = Arc::new(AtomicBool::new(true));
    let (pool, factory) = monitored_pool(PoolConfig::new(1, 5), healthy.clone());
    let health = Arc::new(TargetHealth::new(3));

    {
        let _conn = pool.acquire().await.expect("acquire");
    }

    let monitor = HealthMonitor::spawn(
        HealthMonitorConfig::default(),
        vec![MonitorMember {
            pool: pool.clone(),
            health: health.clone(),
            interval: Duration::from_millis(20),
        }],
    );

    tokio::time::sleep(Duration::from_millis(150)).await;

    // Passing checks keep the connection pooled and the target healthy
    assert_eq!(health.status(), TargetStatus::Healthy);
    assert_eq!(health.consecutive_failures(), 0);
    assert_eq!(pool.stats().idle(), 1);
    assert_eq!(factory.opened.load(Ordering::SeqCst), 1);

    monitor.stop();
}

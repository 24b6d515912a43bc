//! Junction Router - Read/write splitting and connection pooling
//!
//! This crate routes database operations between a primary and its read
//! replicas: writes always reach the primary, reads spread across healthy
//! replicas, and every target sits behind a bounded pool of reusable
//! connections. SQL never passes through here: callers bring their own
//! execution layer and junction hands them live connections.

mod config;
mod factory;
pub mod health;
pub mod pool;
pub mod router;

pub use config::{RouterConfig, TargetConfig};
pub use factory::ConnectionFactory;
pub use health::{
    FactoryValidation, HealthCheck, HealthMonitor, HealthMonitorConfig, TargetHealth, TargetStatus,
};
pub use pool::{Pool, PoolConfig, PoolStats, PooledConnection};
pub use router::{Intent, KeyAffinity, ReplicaPolicy, RoundRobin, Router, RouterBuilder};

pub use junction_core::{Connection, JunctionError, Result, Target, TargetRole};

//! Connection pooling for one database target
//!
//! This module provides a bounded, concurrency-safe connection pool with
//! timeout-based acquisition, health-aware release, and orderly drain.
//!
//! # Example
//!
//! ```ignore
//! use junction_router::pool::{Pool, PoolConfig};
//!
//! let config = PoolConfig::new(1, 20)
//!     .with_acquire_timeout_ms(5000)
//!     .with_idle_timeout_ms(300000);
//!
//! let pool = Pool::new(target, config, connection_factory);
//! let conn = pool.acquire().await?;
//! // Use connection...
//! // Returned to the pool on drop, or report the outcome:
//! conn.release(true);
//! ```

mod config;
mod pool;
mod stats;


pub use config::PoolConfig;
pub use pool::{Pool, PooledConnection};
pub use stats::PoolStats;

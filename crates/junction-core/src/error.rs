//! Error types for junction

use std::time::Duration;

use thiserror::Error;

/// Core error type for junction operations
#[derive(Error, Debug)]
pub enum JunctionError {
    /// A physical session could not be established. Surfaced to the caller
    /// immediately; the pool does not retry on its own.
    #[error("Connect error: {0}")]
    Connect(String),

    /// No connection became available within the acquire timeout.
    #[error("Pool exhausted: no connection available within {waited:?}")]
    PoolExhausted { waited: Duration },

    /// A connection was released more than once. Programming error on the
    /// caller side; pool counters are left untouched.
    #[error("Connection released twice")]
    DoubleRelease,

    /// Drain did not complete within the shutdown timeout. Outstanding
    /// connections are force-closed.
    #[error("Shutdown timed out with {outstanding} connection(s) outstanding")]
    ShutdownTimeout { outstanding: usize },

    /// The pool or router has been closed.
    #[error("Closed")]
    Closed,

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type alias for junction operations
pub type Result<T> = std::result::Result<T, JunctionError>;

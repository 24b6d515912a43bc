//! Junction Core - Core abstractions for the connection router
//!
//! This crate provides the fundamental traits and types the junction
//! crates depend on. It defines:
//!
//! - `Connection` - Trait for live database sessions
//! - `Target` - One database endpoint (primary or replica)
//! - `JunctionError` - Common error taxonomy

mod connection;
mod error;
mod target;

pub use connection::*;
pub use error::*;
pub use target::*;

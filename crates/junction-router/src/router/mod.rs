//! Routing of operations to the primary or a replica
//!
//! The router owns one pool per target and decides, from the caller's
//! declared intent, which pool serves an operation. Replica selection is a
//! pluggable strategy; round-robin is the default.

mod policy;
mod router;


pub use policy::{KeyAffinity, ReplicaPolicy, RoundRobin};
pub use router::{Intent, Router, RouterBuilder};

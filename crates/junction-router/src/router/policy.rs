//! Replica selection strategies

use std::sync::atomic::{AtomicUsize, Ordering};

/// Strategy choosing which healthy replica serves a read.
///
/// The router filters out degraded replicas first; `select` only ever sees
/// the currently-readable subset.
pub trait ReplicaPolicy: Send + Sync + 'static {
    /// Pick an index in `0..candidates`.
    ///
    /// `candidates` is always at least 1. `affinity` carries the caller's
    /// optional session-affinity key.
    fn select(&self, candidates: usize, affinity: Option<u64>) -> usize;
}

/// Rotate through replicas in order. The default policy.
pub struct RoundRobin {
    next: AtomicUsize,
}

impl RoundRobin {
    /// Create a new round-robin policy.
    pub fn new() -> Self {
        Self {
            next: AtomicUsize::new(0),
        }
    }
}

impl Default for RoundRobin {
    fn default() -> Self {
        Self::new()
    }
}

impl ReplicaPolicy for RoundRobin {
    fn select(&self, candidates: usize, _affinity: Option<u64>) -> usize {
        self.next.fetch_add(1, Ordering::Relaxed) % candidates
    }
}

/// Pin a caller-supplied key to a stable replica.
///
/// The same key maps to the same replica for as long as the healthy set is
/// unchanged; affinity is best-effort and remaps when replicas degrade or
/// recover. Requests without a key fall back to round-robin.
pub struct KeyAffinity {
    fallback: RoundRobin,
}

impl KeyAffinity {
    /// Create a new key-affinity policy.
    pub fn new() -> Self {
        Self {
            fallback: RoundRobin::new(),
        }
    }
}

impl Default for KeyAffinity {
    fn default() -> Self {
        Self::new()
    }
}

impl ReplicaPolicy for KeyAffinity {
    fn select(&self, candidates: usize, affinity: Option<u64>) -> usize {
        match affinity {
            Some(key) => (key % candidates as u64) as usize,
            None => self.fallback.select(candidates, None),
        }
    }
}

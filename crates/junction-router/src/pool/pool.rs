//! Connection pool implementation

use std::collections::{HashMap, VecDeque};
use std::ops::Deref;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use junction_core::{Connection, JunctionError, Result, Target};

use super::config::PoolConfig;
use super::stats::PoolStats;
use crate::factory::ConnectionFactory;
use crate::health::{FactoryValidation, HealthCheck};

/// An idle connection with the metadata the lifecycle rules need
pub(crate) struct IdleEntry {
    pub(crate) conn: Arc<dyn Connection>,
    pub(crate) id: u64,
    pub(crate) created_at: Instant,
    pub(crate) idle_since: Instant,
}

/// A connection currently held by a caller
pub(crate) struct Handed {
    pub(crate) conn: Arc<dyn Connection>,
    pub(crate) id: u64,
    pub(crate) created_at: Instant,
}

/// An idle connection checked out by the health monitor for inspection.
/// Holds a capacity permit until it is returned or discarded.
pub(crate) struct SampledEntry {
    entry: IdleEntry,
    _permit: OwnedSemaphorePermit,
}

/// Mutable pool state. Everything behind one mutex so no acquire can
/// observe a torn size check.
struct PoolState {
    /// Idle connections, oldest at the front
    idle: VecDeque<IdleEntry>,
    /// Ledger of handed-out connections, keyed by connection id.
    /// Doubles as the outstanding count and lets drain force-close.
    outstanding: HashMap<u64, Arc<dyn Connection>>,
}

/// A bounded pool of reusable connections to one target.
///
/// Acquisition reuses an idle connection when one is live, opens a new
/// session while capacity remains, and otherwise suspends the caller until
/// a release frees capacity or the timeout elapses. Connections are handed
/// out as [`PooledConnection`] guards that return themselves on drop.
pub struct Pool {
    /// The endpoint this pool serves
    target: Arc<Target>,
    /// Pool configuration
    config: PoolConfig,
    /// Opens physical sessions
    factory: Arc<dyn ConnectionFactory>,
    /// Health hook for stale-connection validation
    check: Arc<dyn HealthCheck>,
    /// Idle set and outstanding ledger
    state: Mutex<PoolState>,
    /// Bounds idle + outstanding at max_size
    semaphore: Arc<Semaphore>,
    /// Number of callers waiting for a connection
    waiting: AtomicUsize,
    /// Next connection id
    next_id: AtomicU64,
    /// Set once drain starts; terminal
    closed: AtomicBool,
}

impl Pool {
    /// Create a new pool for the given target.
    pub fn new<F: ConnectionFactory>(target: Arc<Target>, config: PoolConfig, factory: F) -> Self {
        Self::with_shared(target, config, Arc::new(factory), None)
    }

    pub(crate) fn with_shared(
        target: Arc<Target>,
        config: PoolConfig,
        factory: Arc<dyn ConnectionFactory>,
        check: Option<Arc<dyn HealthCheck>>,
    ) -> Self {
        let semaphore = Arc::new(Semaphore::new(config.max_size()));
        let check = check.unwrap_or_else(|| Arc::new(FactoryValidation::new(factory.clone())));
        Self {
            target,
            config,
            factory,
            check,
            state: Mutex::new(PoolState {
                idle: VecDeque::new(),
                outstanding: HashMap::new(),
            }),
            semaphore,
            waiting: AtomicUsize::new(0),
            next_id: AtomicU64::new(1),
            closed: AtomicBool::new(false),
        }
    }

    /// The target this pool serves
    pub fn target(&self) -> &Target {
        &self.target
    }

    /// The pool configuration
    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Whether drain has started
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Acquire a connection using the configured acquire timeout.
    pub async fn acquire(&self) -> Result<PooledConnection<'_>> {
        self.acquire_timeout(self.config.acquire_timeout()).await
    }

    /// Acquire a connection, waiting at most `timeout`.
    ///
    /// This will:
    /// 1. Take a capacity permit (suspending if the pool is exhausted)
    /// 2. Reuse an idle connection if a live one is available
    /// 3. Otherwise open a new session through the factory
    ///
    /// Fails with `PoolExhausted` once the timeout elapses, with `Connect`
    /// if a new session cannot be opened, and with `Closed` after drain.
    pub async fn acquire_timeout(&self, timeout: Duration) -> Result<PooledConnection<'_>> {
        if self.is_closed() {
            return Err(JunctionError::Closed);
        }

        // Guard so an abandoned wait (timeout or caller cancellation)
        // never leaks a queue slot.
        let _waiting = WaitingGuard::enter(&self.waiting);
        let started = Instant::now();

        match tokio::time::timeout(timeout, self.acquire_inner()).await {
            Ok(result) => result,
            Err(_) => Err(JunctionError::PoolExhausted {
                waited: started.elapsed(),
            }),
        }
    }

    async fn acquire_inner(&self) -> Result<PooledConnection<'_>> {
        // The semaphore is the single capacity bound: every handed-out
        // connection holds one permit, so waiting here is exactly waiting
        // for a release. Tokio's semaphore queue is FIFO.
        let permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| JunctionError::Closed)?;

        // Drain may have started while we were queued.
        if self.is_closed() {
            return Err(JunctionError::Closed);
        }

        if let Some(entry) = self.checkout_idle().await {
            return Ok(self.hand_out(entry.conn, entry.id, entry.created_at, permit));
        }

        // Nothing idle was usable: open a fresh session. The open runs
        // outside the state lock; only the ledger insert below takes it.
        let (conn, id, created_at) = self.open_connection().await?;
        Ok(self.hand_out(conn, id, created_at, permit))
    }

    /// Pop idle connections until one passes the lifecycle and staleness
    /// rules. Invalid ones are destroyed and the caller opens a
    /// replacement, so an invalidated connection is never handed out.
    async fn checkout_idle(&self) -> Option<IdleEntry> {
        loop {
            let entry = self.state.lock().idle.pop_front()?;

            if entry.conn.is_closed() || self.idle_expired(&entry) {
                tracing::debug!(
                    target = %self.target.address(),
                    connection_id = entry.id,
                    "discarding expired idle connection"
                );
                close_detached(entry.conn);
                continue;
            }

            // Re-validate connections that sat idle past the staleness
            // threshold before handing them out.
            if entry.idle_since.elapsed() >= self.config.stale_after()
                && !self.check.check(&*entry.conn).await
            {
                tracing::debug!(
                    target = %self.target.address(),
                    connection_id = entry.id,
                    "stale idle connection failed validation"
                );
                close_detached(entry.conn);
                continue;
            }

            return Some(entry);
        }
    }

    async fn open_connection(&self) -> Result<(Arc<dyn Connection>, u64, Instant)> {
        let conn = self.open_raw().await?;
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(
            target = %self.target.address(),
            connection_id = id,
            "opened new connection"
        );
        Ok((conn, id, Instant::now()))
    }

    /// Open a session through the factory, bounded by the connect timeout.
    /// The session is not yet registered with the pool.
    async fn open_raw(&self) -> Result<Arc<dyn Connection>> {
        tokio::time::timeout(self.config.connect_timeout(), self.factory.open())
            .await
            .map_err(|_| {
                JunctionError::Connect(format!(
                    "connect to {} timed out after {:?}",
                    self.target.address(),
                    self.config.connect_timeout()
                ))
            })?
    }

    fn hand_out<'a>(
        &'a self,
        conn: Arc<dyn Connection>,
        id: u64,
        created_at: Instant,
        permit: OwnedSemaphorePermit,
    ) -> PooledConnection<'a> {
        self.state.lock().outstanding.insert(id, conn.clone());
        PooledConnection {
            pool: self,
            handed: Some(Handed {
                conn,
                id,
                created_at,
            }),
            _permit: permit,
        }
    }

    /// Settle a returned connection: healthy ones go back to the idle set,
    /// everything else is destroyed. The outstanding ledger entry is removed
    /// first; a return for an id not in the ledger is a double release and
    /// leaves all counters untouched.
    pub(crate) fn finish(&self, handed: Handed, healthy: bool) -> Result<()> {
        let Handed {
            conn,
            id,
            created_at,
        } = handed;

        let mut state = self.state.lock();
        if state.outstanding.remove(&id).is_none() {
            drop(state);
            tracing::error!(
                target = %self.target.address(),
                connection_id = id,
                "connection released twice"
            );
            return Err(JunctionError::DoubleRelease);
        }

        if healthy && !self.is_closed() && !conn.is_closed() {
            state.idle.push_back(IdleEntry {
                conn,
                id,
                created_at,
                idle_since: Instant::now(),
            });
            return Ok(());
        }
        drop(state);

        tracing::debug!(
            target = %self.target.address(),
            connection_id = id,
            healthy,
            "discarding returned connection"
        );
        close_detached(conn);
        Ok(())
    }

    /// Open connections until the pool holds at least `min_size`, without
    /// exceeding capacity. Each new connection briefly holds a permit so the
    /// size bound holds even against concurrent acquires.
    pub async fn warmup(&self) -> Result<usize> {
        let mut opened = 0usize;
        loop {
            if self.is_closed() || self.stats().total() >= self.config.min_size() {
                break;
            }
            let Ok(permit) = self.semaphore.clone().try_acquire_owned() else {
                break;
            };
            match self.open_connection().await {
                Ok((conn, id, created_at)) => {
                    self.state.lock().idle.push_back(IdleEntry {
                        conn,
                        id,
                        created_at,
                        idle_since: Instant::now(),
                    });
                    drop(permit);
                    opened += 1;
                }
                Err(err) => {
                    drop(permit);
                    if opened == 0 {
                        return Err(err);
                    }
                    tracing::warn!(
                        target = %self.target.address(),
                        error = %err,
                        "warmup connect failed"
                    );
                    break;
                }
            }
        }
        Ok(opened)
    }

    /// Prevent new acquisitions, wait for outstanding connections to return
    /// (bounded by `shutdown_timeout`), then close all idle connections.
    ///
    /// On timeout the remaining outstanding sessions are force-closed and
    /// `ShutdownTimeout` is returned; idle connections are closed either way.
    pub async fn drain(&self, shutdown_timeout: Duration) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            self.close_idle().await;
            return Ok(());
        }
        tracing::debug!(target = %self.target.address(), "draining pool");

        let capacity = self.config.max_size() as u32;
        let result = match tokio::time::timeout(
            shutdown_timeout,
            self.semaphore.acquire_many(capacity),
        )
        .await
        {
            // Holding every permit means outstanding reached zero. Forget
            // them so capacity never comes back.
            Ok(Ok(permits)) => {
                permits.forget();
                Ok(())
            }
            Ok(Err(_)) => Ok(()),
            Err(_) => {
                let held: Vec<Arc<dyn Connection>> =
                    self.state.lock().outstanding.values().cloned().collect();
                tracing::warn!(
                    target = %self.target.address(),
                    outstanding = held.len(),
                    "drain timed out, force-closing outstanding connections"
                );
                let outstanding = held.len();
                for conn in held {
                    close_detached(conn);
                }
                Err(JunctionError::ShutdownTimeout { outstanding })
            }
        };

        self.close_idle().await;
        result
    }

    /// Close and drop all idle connections.
    pub async fn close_idle(&self) {
        let drained: Vec<IdleEntry> = {
            let mut state = self.state.lock();
            state.idle.drain(..).collect()
        };
        for entry in drained {
            let _ = entry.conn.close().await;
        }
    }

    /// Get current pool statistics
    pub fn stats(&self) -> PoolStats {
        let (idle, outstanding) = {
            let state = self.state.lock();
            (state.idle.len(), state.outstanding.len())
        };
        PoolStats::new(
            idle + outstanding,
            idle,
            outstanding,
            self.waiting.load(Ordering::SeqCst),
        )
    }

    // --- helpers for the health monitor ---

    /// Pop up to `n` of the oldest idle connections for inspection. Each
    /// sampled connection holds a capacity permit for the duration of the
    /// inspection, so concurrent acquires cannot open replacements that
    /// would push the pool past its maximum once the sample returns.
    pub(crate) fn take_idle_sample(&self, n: usize) -> Vec<SampledEntry> {
        let mut sampled = Vec::new();
        for _ in 0..n {
            let Ok(permit) = self.semaphore.clone().try_acquire_owned() else {
                break;
            };
            let Some(entry) = self.state.lock().idle.pop_front() else {
                break;
            };
            sampled.push(SampledEntry {
                entry,
                _permit: permit,
            });
        }
        sampled
    }

    /// Return an inspected connection to the idle set, staleness clock
    /// reset. The permit frees only after the push, same as a release.
    pub(crate) fn return_idle(&self, sampled: SampledEntry) {
        let SampledEntry {
            mut entry,
            _permit,
        } = sampled;
        entry.idle_since = Instant::now();
        self.state.lock().idle.push_back(entry);
        drop(_permit);
    }

    /// Destroy an idle connection that failed inspection or aged out.
    pub(crate) fn discard_idle(&self, sampled: SampledEntry) {
        tracing::debug!(
            target = %self.target.address(),
            connection_id = sampled.entry.id,
            "invalidating idle connection"
        );
        close_detached(sampled.entry.conn);
    }

    /// Whether a sampled connection aged past its lifetime or idle TTL.
    pub(crate) fn entry_expired(&self, sampled: &SampledEntry) -> bool {
        self.idle_expired(&sampled.entry)
    }

    /// Whether an idle connection aged past its lifetime or idle TTL.
    pub(crate) fn idle_expired(&self, entry: &IdleEntry) -> bool {
        if let Some(max_lifetime) = self.config.max_lifetime()
            && entry.created_at.elapsed() > max_lifetime
        {
            return true;
        }
        entry.idle_since.elapsed() > self.config.idle_timeout()
    }

    /// Run the health hook against a sampled connection.
    pub(crate) async fn run_check(&self, sampled: &SampledEntry) -> bool {
        self.check.check(&*sampled.entry.conn).await
    }

    /// Open a throwaway session, check it, close it. Used by the monitor to
    /// probe a target that has no idle connections to observe.
    pub(crate) async fn probe(&self) -> bool {
        match self.open_raw().await {
            Ok(conn) => {
                let healthy = self.check.check(&*conn).await;
                let _ = conn.close().await;
                healthy
            }
            Err(err) => {
                tracing::debug!(
                    target = %self.target.address(),
                    error = %err,
                    "probe connect failed"
                );
                false
            }
        }
    }
}

impl std::fmt::Debug for Pool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let stats = self.stats();
        f.debug_struct("Pool")
            .field("target", &self.target.address())
            .field("idle", &stats.idle())
            .field("outstanding", &stats.outstanding())
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Close a connection without blocking the current (possibly synchronous)
/// caller. Outside a runtime the session is torn down when the last Arc
/// drops.
fn close_detached(conn: Arc<dyn Connection>) {
    if let Ok(handle) = tokio::runtime::Handle::try_current() {
        handle.spawn(async move {
            let _ = conn.close().await;
        });
    }
}

/// Decrements the waiting counter on drop, whatever path leaves the wait.
struct WaitingGuard<'a> {
    counter: &'a AtomicUsize,
}

impl<'a> WaitingGuard<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self { counter }
    }
}

impl Drop for WaitingGuard<'_> {
    fn drop(&mut self) {
        self.counter.fetch_sub(1, Ordering::SeqCst);
    }
}

/// A connection borrowed from the pool.
///
/// Dropping the guard returns the connection as healthy; use
/// [`release`](PooledConnection::release) to report the outcome explicitly.
/// Capacity is freed only after the connection is back in the idle set, so
/// `idle + outstanding` never exceeds the configured maximum.
pub struct PooledConnection<'a> {
    pool: &'a Pool,
    handed: Option<Handed>,
    _permit: OwnedSemaphorePermit,
}

impl<'a> Deref for PooledConnection<'a> {
    type Target = dyn Connection;

    fn deref(&self) -> &Self::Target {
        self.handed.as_ref().expect("connection taken").conn.as_ref()
    }
}

impl<'a> PooledConnection<'a> {
    /// The underlying session as a shared handle
    pub fn session(&self) -> Arc<dyn Connection> {
        self.handed.as_ref().expect("connection taken").conn.clone()
    }

    /// Pool-local id of this connection
    pub fn id(&self) -> u64 {
        self.handed.as_ref().expect("connection taken").id
    }

    /// The target this connection belongs to
    pub fn target(&self) -> &Target {
        self.pool.target()
    }

    /// Return the connection, reporting whether it is still healthy.
    ///
    /// An unhealthy return destroys the connection: outstanding drops
    /// immediately and the idle set is left unchanged.
    pub fn release(mut self, healthy: bool) {
        if let Some(handed) = self.handed.take() {
            let _ = self.pool.finish(handed, healthy);
        }
    }
}

impl Drop for PooledConnection<'_> {
    fn drop(&mut self) {
        // Dropping without an explicit release counts as healthy. The permit
        // field drops after this body, so capacity frees only once the
        // connection is back in the idle set.
        if let Some(handed) = self.handed.take() {
            let _ = self.pool.finish(handed, true);
        }
    }
}

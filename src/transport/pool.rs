//! Bounded per-key connection pool.
//!
//! Connections are keyed by `(host, port, use_tls)`. Each key owns an idle
//! LIFO sequence and a counting permit initialised to `max_size`, so at most
//! `max_size` connections per key are checked out or being opened at once.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────┐
//! │                  PoolCore                     │
//! │  Mutex<FxHashMap<PoolKey, KeySlot>>           │
//! │  ┌─────────────────────────────────────────┐  │
//! │  │ http://a:80   → idle [c1, c2]  gate(8)  │  │
//! │  │ https://b:443 → idle [c3]      gate(10) │  │
//! │  └─────────────────────────────────────────┘  │
//! └──────────────┬───────────────────┬────────────┘
//!                │                   │
//!       ConnectionPool      AsyncConnectionPool
//!       (BlockingGate)       (AsyncGate)
//! ```
//!
//! The bookkeeping in [`PoolCore`] is shared by both pools; only the permit
//! gate and the connection type differ.
//!
//! # Permit Discipline
//!
//! Every successful `get_connection` must be paired with exactly one
//! `put_connection` or `discard_connection`. [`PooledConnection`] enforces
//! this by discarding on drop.

// ============================================================================
// Imports
// ============================================================================

use std::collections::VecDeque;
use std::fmt;
use std::mem;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use rustc_hash::FxHashMap;
use tracing::{debug, trace};

use crate::error::Result;
use crate::transport::Connection;
use crate::transport::timeout::Timeout;

// ============================================================================
// Constants
// ============================================================================

/// Default maximum connections per key.
pub const DEFAULT_MAX_SIZE: usize = 10;

/// Default time an idle connection may sit in the pool.
pub const DEFAULT_MAX_IDLE_TIME: Duration = Duration::from_secs(30);

// ============================================================================
// PoolKey
// ============================================================================

/// Identifies the endpoint a connection is bound to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PoolKey {
    /// Host name or IP address.
    pub host: String,

    /// TCP port.
    pub port: u16,

    /// Whether the connection is TLS.
    pub use_tls: bool,
}

impl PoolKey {
    /// Creates a new pool key.
    #[inline]
    #[must_use]
    pub fn new(host: impl Into<String>, port: u16, use_tls: bool) -> Self {
        Self {
            host: host.into(),
            port,
            use_tls,
        }
    }
}

impl fmt::Display for PoolKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let scheme = if self.use_tls { "https" } else { "http" };
        write!(f, "{scheme}://{}:{}", self.host, self.port)
    }
}

// ============================================================================
// PoolConfig
// ============================================================================

/// Pool sizing and expiry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolConfig {
    /// Maximum connections per key (checked out plus idle).
    pub max_size: usize,

    /// Idle connections older than this are closed on the next checkout.
    pub max_idle_time: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_size: DEFAULT_MAX_SIZE,
            max_idle_time: DEFAULT_MAX_IDLE_TIME,
        }
    }
}

impl PoolConfig {
    /// Sets the maximum connections per key (at least one).
    #[inline]
    #[must_use]
    pub fn with_max_size(mut self, max_size: usize) -> Self {
        self.max_size = max_size.max(1);
        self
    }

    /// Sets the maximum idle time.
    #[inline]
    #[must_use]
    pub fn with_max_idle_time(mut self, max_idle_time: Duration) -> Self {
        self.max_idle_time = max_idle_time;
        self
    }
}

// ============================================================================
// Traits
// ============================================================================

/// A connection the pool can hold.
pub trait Poolable {
    /// Key this connection belongs to.
    fn pool_key(&self) -> PoolKey;

    /// Returns `true` if the connection can carry another request.
    fn is_usable(&self) -> bool;

    /// Closes the connection. Must be idempotent.
    fn close(&mut self);
}

/// Counting permit for one pool key.
///
/// Acquisition is not part of the trait: the blocking gate blocks the
/// thread, the async gate suspends the task.
pub trait PermitGate: Send + Sync {
    /// Creates a gate with `capacity` permits available.
    fn with_capacity(capacity: usize) -> Self;

    /// Returns one permit. Never grows beyond the initial capacity.
    fn release(&self);

    /// Restores the initial capacity.
    fn reset(&self);

    /// Returns the number of permits currently available.
    fn available(&self) -> usize;
}

// ============================================================================
// BlockingGate
// ============================================================================

/// Permit gate that blocks the calling thread.
#[derive(Debug)]
pub struct BlockingGate {
    capacity: usize,
    available: Mutex<usize>,
    freed: Condvar,
}

impl BlockingGate {
    /// Takes a permit, blocking until one is free.
    pub fn acquire(&self) {
        let mut available = self.available.lock();
        while *available == 0 {
            self.freed.wait(&mut available);
        }
        *available -= 1;
    }

    /// Takes a permit if one is free.
    #[cfg(test)]
    pub(crate) fn try_acquire(&self) -> bool {
        let mut available = self.available.lock();
        if *available == 0 {
            return false;
        }
        *available -= 1;
        true
    }
}

impl PermitGate for BlockingGate {
    fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity,
            available: Mutex::new(capacity),
            freed: Condvar::new(),
        }
    }

    fn release(&self) {
        let mut available = self.available.lock();
        if *available < self.capacity {
            *available += 1;
            self.freed.notify_one();
        }
    }

    fn reset(&self) {
        *self.available.lock() = self.capacity;
        self.freed.notify_all();
    }

    fn available(&self) -> usize {
        *self.available.lock()
    }
}

// ============================================================================
// PoolCore
// ============================================================================

struct PoolEntry<C> {
    connection: C,
    last_used: Instant,
}

struct KeySlot<C, G> {
    idle: VecDeque<PoolEntry<C>>,
    gate: Arc<G>,
}

/// Bookkeeping shared by the blocking and async pools.
///
/// The map lock guards bookkeeping only; liveness checks and closes run
/// unlocked.
pub(crate) struct PoolCore<C, G> {
    config: PoolConfig,
    slots: Mutex<FxHashMap<PoolKey, KeySlot<C, G>>>,
}

impl<C: Poolable, G: PermitGate> PoolCore<C, G> {
    pub(crate) fn new(config: PoolConfig) -> Self {
        Self {
            config,
            slots: Mutex::new(FxHashMap::default()),
        }
    }

    pub(crate) fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Returns the permit gate of `key`, creating the slot if needed.
    pub(crate) fn gate(&self, key: &PoolKey) -> Arc<G> {
        let mut slots = self.slots.lock();
        let slot = slots.entry(key.clone()).or_insert_with(|| KeySlot {
            idle: VecDeque::new(),
            gate: Arc::new(G::with_capacity(self.config.max_size)),
        });
        Arc::clone(&slot.gate)
    }

    /// Sweeps expired and unusable idle connections, then pops the most
    /// recently returned usable one. The caller must hold a permit.
    ///
    /// The idle sequence is taken out of the map for the sweep, so liveness
    /// checks and closes never run under the map lock.
    pub(crate) fn checkout(&self, key: &PoolKey) -> Option<C> {
        let mut idle = {
            let mut slots = self.slots.lock();
            mem::take(&mut slots.get_mut(key)?.idle)
        };

        let max_idle_time = self.config.max_idle_time;
        idle.retain_mut(|entry| {
            let keep =
                entry.last_used.elapsed() <= max_idle_time && entry.connection.is_usable();
            if !keep {
                entry.connection.close();
                trace!(key = %key, "Swept idle connection");
            }
            keep
        });

        let found = idle.pop_back().map(|entry| entry.connection);
        if !idle.is_empty() {
            self.restore_idle(key, idle);
        }
        found
    }

    /// Puts swept survivors back behind connections returned meanwhile.
    fn restore_idle(&self, key: &PoolKey, mut survivors: VecDeque<PoolEntry<C>>) {
        let mut evicted = Vec::new();
        {
            let mut slots = self.slots.lock();
            match slots.get_mut(key) {
                Some(slot) => {
                    survivors.append(&mut slot.idle);
                    while survivors.len() > self.config.max_size {
                        evicted.extend(survivors.pop_front());
                    }
                    slot.idle = survivors;
                }
                None => evicted.extend(survivors),
            }
        }

        for mut entry in evicted {
            entry.connection.close();
        }
    }

    /// Returns a connection and its permit.
    pub(crate) fn checkin(&self, mut connection: C) {
        let key = connection.pool_key();
        let usable = connection.is_usable();

        let mut slots = self.slots.lock();
        let Some(slot) = slots.get_mut(&key) else {
            drop(slots);
            connection.close();
            return;
        };
        let gate = Arc::clone(&slot.gate);

        let to_close = if usable {
            let evicted = if slot.idle.len() >= self.config.max_size {
                slot.idle.pop_front().map(|entry| entry.connection)
            } else {
                None
            };
            slot.idle.push_back(PoolEntry {
                connection,
                last_used: Instant::now(),
            });
            trace!(key = %key, idle = slot.idle.len(), "Connection returned to pool");
            evicted
        } else {
            debug!(key = %key, "Unusable connection closed on return");
            Some(connection)
        };
        drop(slots);

        if let Some(mut connection) = to_close {
            connection.close();
        }
        gate.release();
    }

    /// Closes a connection and returns its permit.
    pub(crate) fn discard(&self, mut connection: C) {
        connection.close();
        self.release_permit(&connection.pool_key());
    }

    /// Returns a permit without a connection (failed open).
    pub(crate) fn release_permit(&self, key: &PoolKey) {
        let slots = self.slots.lock();
        if let Some(slot) = slots.get(key) {
            slot.gate.release();
        }
    }

    /// Closes every idle connection of `key`.
    pub(crate) fn close_idle(&self, key: &PoolKey) {
        let idle = self
            .slots
            .lock()
            .get_mut(key)
            .map(|slot| mem::take(&mut slot.idle))
            .unwrap_or_default();

        for mut entry in idle {
            entry.connection.close();
        }
    }

    /// Closes every idle connection and resets every permit.
    pub(crate) fn close_all(&self) {
        let mut idle = Vec::new();
        {
            let mut slots = self.slots.lock();
            for slot in slots.values_mut() {
                idle.extend(slot.idle.drain(..));
                slot.gate.reset();
            }
        }

        for mut entry in idle {
            entry.connection.close();
        }
    }

    pub(crate) fn idle_count(&self, key: &PoolKey) -> usize {
        self.slots.lock().get(key).map_or(0, |slot| slot.idle.len())
    }

    pub(crate) fn available_permits(&self, key: &PoolKey) -> usize {
        self.slots
            .lock()
            .get(key)
            .map_or(self.config.max_size, |slot| slot.gate.available())
    }
}

// ============================================================================
// ConnectionPool
// ============================================================================

/// Blocking connection pool.
///
/// # Example
///
/// ```ignore
/// let pool = ConnectionPool::new(PoolConfig::default());
/// let conn = pool.get_connection("example.com", 443, true, Timeout::default())?;
/// // ... exchange ...
/// pool.put_connection(conn);
/// ```
pub struct ConnectionPool {
    core: PoolCore<Connection, BlockingGate>,
}

impl Default for ConnectionPool {
    fn default() -> Self {
        Self::new(PoolConfig::default())
    }
}

impl fmt::Debug for ConnectionPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionPool")
            .field("config", self.core.config())
            .finish_non_exhaustive()
    }
}

impl ConnectionPool {
    /// Creates an empty pool.
    #[must_use]
    pub fn new(config: PoolConfig) -> Self {
        Self {
            core: PoolCore::new(config),
        }
    }

    /// Returns the pool configuration.
    #[inline]
    #[must_use]
    pub fn config(&self) -> &PoolConfig {
        self.core.config()
    }

    /// Checks out a connection, reusing an idle one when possible.
    ///
    /// Blocks the thread while `max_size` connections of this key are out.
    ///
    /// # Errors
    ///
    /// Any error of [`Connection::open`]; the permit is released first.
    pub fn get_connection(
        &self,
        host: &str,
        port: u16,
        use_tls: bool,
        timeout: Timeout,
    ) -> Result<Connection> {
        let key = PoolKey::new(host, port, use_tls);
        self.core.gate(&key).acquire();

        while let Some(mut conn) = self.core.checkout(&key) {
            match conn.set_timeout(timeout) {
                Ok(()) => {
                    debug!(key = %key, "Reusing pooled connection");
                    return Ok(conn);
                }
                Err(_) => conn.close(),
            }
        }

        let mut conn = Connection::new(host, port, use_tls, timeout);
        if let Err(e) = conn.open() {
            self.core.release_permit(&key);
            return Err(e);
        }

        debug!(key = %key, "Opened new connection");
        Ok(conn)
    }

    /// Checks out a connection wrapped in a guard that discards it on drop.
    ///
    /// # Errors
    ///
    /// Same as [`get_connection`](Self::get_connection).
    pub fn get(
        &self,
        host: &str,
        port: u16,
        use_tls: bool,
        timeout: Timeout,
    ) -> Result<PooledConnection<'_>> {
        let conn = self.get_connection(host, port, use_tls, timeout)?;
        Ok(PooledConnection {
            pool: self,
            conn: Some(conn),
        })
    }

    /// Returns a connection to the pool.
    ///
    /// Unusable connections are closed instead. The permit is released
    /// either way.
    pub fn put_connection(&self, conn: Connection) {
        self.core.checkin(conn);
    }

    /// Closes a connection and releases its permit.
    pub fn discard_connection(&self, conn: Connection) {
        self.core.discard(conn);
    }

    /// Closes every idle connection to one endpoint.
    pub fn release_connection(&self, host: &str, port: u16, use_tls: bool) {
        self.core.close_idle(&PoolKey::new(host, port, use_tls));
    }

    /// Closes every idle connection and resets every permit.
    pub fn close_all(&self) {
        self.core.close_all();
        debug!("Connection pool closed");
    }

    /// Returns the number of idle connections for one endpoint.
    #[must_use]
    pub fn idle_count(&self, host: &str, port: u16, use_tls: bool) -> usize {
        self.core.idle_count(&PoolKey::new(host, port, use_tls))
    }

    /// Returns the number of free permits for one endpoint.
    #[must_use]
    pub fn available_permits(&self, host: &str, port: u16, use_tls: bool) -> usize {
        self.core
            .available_permits(&PoolKey::new(host, port, use_tls))
    }
}

// ============================================================================
// PooledConnection
// ============================================================================

/// A checked-out connection that goes back to its pool exactly once.
///
/// Dropping the guard discards the connection; call
/// [`put`](Self::put) to return it for reuse.
pub struct PooledConnection<'a> {
    pool: &'a ConnectionPool,
    conn: Option<Connection>,
}

impl PooledConnection<'_> {
    /// Returns the connection to the pool.
    pub fn put(mut self) {
        if let Some(conn) = self.conn.take() {
            self.pool.put_connection(conn);
        }
    }

    /// Closes the connection and releases its permit.
    pub fn discard(mut self) {
        if let Some(conn) = self.conn.take() {
            self.pool.discard_connection(conn);
        }
    }

    /// Detaches the connection from the pool, releasing its permit.
    ///
    /// Used when the connection is upgraded to another protocol.
    #[must_use]
    pub fn detach(mut self) -> Option<Connection> {
        let conn = self.conn.take()?;
        self.pool.core.release_permit(&conn.pool_key());
        Some(conn)
    }
}

impl Deref for PooledConnection<'_> {
    type Target = Connection;

    fn deref(&self) -> &Connection {
        self.conn.as_ref().unwrap_or_else(|| unreachable!("connection taken"))
    }
}

impl DerefMut for PooledConnection<'_> {
    fn deref_mut(&mut self) -> &mut Connection {
        self.conn.as_mut().unwrap_or_else(|| unreachable!("connection taken"))
    }
}

impl Drop for PooledConnection<'_> {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            self.pool.discard_connection(conn);
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

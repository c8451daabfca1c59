//! Async connection pool.
//!
//! Shares all bookkeeping with the blocking pool through `PoolCore`; the
//! per-key gate is a tokio [`Semaphore`] so waiting for a permit suspends
//! the task instead of blocking the thread.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::ops::{Deref, DerefMut};

use tokio::sync::Semaphore;
use tracing::debug;

use crate::error::Result;
use crate::transport::async_connection::AsyncConnection;
use crate::transport::pool::{PermitGate, PoolConfig, PoolCore, PoolKey, Poolable};
use crate::transport::timeout::Timeout;

// ============================================================================
// AsyncGate
// ============================================================================

/// Permit gate that suspends the calling task.
///
/// Permits are forgotten on acquisition and added back on release, so the
/// count survives the pool handing connections between tasks.
#[derive(Debug)]
pub struct AsyncGate {
    capacity: usize,
    semaphore: Semaphore,
}

impl AsyncGate {
    /// Takes a permit, waiting until one is free.
    ///
    /// Cancel-safe: dropping the future before it completes takes nothing.
    pub async fn acquire(&self) {
        // The semaphore is never closed, so acquisition cannot fail.
        if let Ok(permit) = self.semaphore.acquire().await {
            permit.forget();
        }
    }
}

impl PermitGate for AsyncGate {
    fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity,
            semaphore: Semaphore::new(capacity),
        }
    }

    fn release(&self) {
        if self.semaphore.available_permits() < self.capacity {
            self.semaphore.add_permits(1);
        }
    }

    fn reset(&self) {
        let available = self.semaphore.available_permits();
        if available < self.capacity {
            self.semaphore.add_permits(self.capacity - available);
        }
    }

    fn available(&self) -> usize {
        self.semaphore.available_permits()
    }
}

// ============================================================================
// AsyncConnectionPool
// ============================================================================

/// Async connection pool.
pub struct AsyncConnectionPool {
    core: PoolCore<AsyncConnection, AsyncGate>,
}

impl Default for AsyncConnectionPool {
    fn default() -> Self {
        Self::new(PoolConfig::default())
    }
}

impl fmt::Debug for AsyncConnectionPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncConnectionPool")
            .field("config", self.core.config())
            .finish_non_exhaustive()
    }
}

impl AsyncConnectionPool {
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
    /// Suspends while `max_size` connections of this key are out.
    ///
    /// # Errors
    ///
    /// Any error of [`AsyncConnection::open`]; the permit is released first.
    pub async fn get_connection(
        &self,
        host: &str,
        port: u16,
        use_tls: bool,
        timeout: Timeout,
    ) -> Result<AsyncConnection> {
        let key = PoolKey::new(host, port, use_tls);
        let gate = self.core.gate(&key);
        gate.acquire().await;

        // From here on the permit is held; release it if this future is
        // dropped before a connection is handed out.
        let mut permit = PermitGuard {
            core: &self.core,
            key: &key,
            armed: true,
        };

        if let Some(mut conn) = self.core.checkout(&key) {
            conn.set_timeout(timeout);
            permit.armed = false;
            debug!(key = %key, "Reusing pooled connection");
            return Ok(conn);
        }

        let mut conn = AsyncConnection::new(host, port, use_tls, timeout);
        conn.open().await?;

        permit.armed = false;
        debug!(key = %key, "Opened new connection");
        Ok(conn)
    }

    /// Checks out a connection wrapped in a guard that discards it on drop.
    ///
    /// # Errors
    ///
    /// Same as [`get_connection`](Self::get_connection).
    pub async fn get(
        &self,
        host: &str,
        port: u16,
        use_tls: bool,
        timeout: Timeout,
    ) -> Result<AsyncPooledConnection<'_>> {
        let conn = self.get_connection(host, port, use_tls, timeout).await?;
        Ok(AsyncPooledConnection {
            pool: self,
            conn: Some(conn),
        })
    }

    /// Returns a connection to the pool, closing it if unusable.
    pub fn put_connection(&self, conn: AsyncConnection) {
        self.core.checkin(conn);
    }

    /// Closes a connection and releases its permit.
    pub fn discard_connection(&self, conn: AsyncConnection) {
        self.core.discard(conn);
    }

    /// Closes every idle connection to one endpoint.
    pub fn release_connection(&self, host: &str, port: u16, use_tls: bool) {
        self.core.close_idle(&PoolKey::new(host, port, use_tls));
    }

    /// Closes every idle connection and resets every permit.
    pub fn close_all(&self) {
        self.core.close_all();
        debug!("Async connection pool closed");
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

/// Releases a held permit unless disarmed.
struct PermitGuard<'a> {
    core: &'a PoolCore<AsyncConnection, AsyncGate>,
    key: &'a PoolKey,
    armed: bool,
}

impl Drop for PermitGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.core.release_permit(self.key);
        }
    }
}

// ============================================================================
// AsyncPooledConnection
// ============================================================================

/// A checked-out async connection that goes back to its pool exactly once.
///
/// Dropping the guard discards the connection.
pub struct AsyncPooledConnection<'a> {
    pool: &'a AsyncConnectionPool,
    conn: Option<AsyncConnection>,
}

impl AsyncPooledConnection<'_> {
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
    #[must_use]
    pub fn detach(mut self) -> Option<AsyncConnection> {
        let conn = self.conn.take()?;
        self.pool.core.release_permit(&conn.pool_key());
        Some(conn)
    }
}

impl Deref for AsyncPooledConnection<'_> {
    type Target = AsyncConnection;

    fn deref(&self) -> &AsyncConnection {
        self.conn.as_ref().unwrap_or_else(|| unreachable!("connection taken"))
    }
}

impl DerefMut for AsyncPooledConnection<'_> {
    fn deref_mut(&mut self) -> &mut AsyncConnection {
        self.conn.as_mut().unwrap_or_else(|| unreachable!("connection taken"))
    }
}

impl Drop for AsyncPooledConnection<'_> {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            self.pool.discard_connection(conn);
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Arc;
    use std::time::Duration;

    use tokio::net::TcpListener;

    use crate::transport::pool::tests::FakeConn;

    async fn listener() -> (TcpListener, u16) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        (listener, port)
    }

    /// Accepts `n` connections and holds them for a while.
    fn hold_connections(listener: TcpListener, n: usize) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut held = Vec::new();
            for _ in 0..n {
                held.push(listener.accept().await.unwrap().0);
            }
            tokio::time::sleep(Duration::from_millis(500)).await;
        })
    }

    #[test]
    fn test_async_gate_release_is_capped() {
        let gate = AsyncGate::with_capacity(2);
        gate.release();
        assert_eq!(gate.available(), 2);
    }

    #[tokio::test]
    async fn test_async_gate_reset() {
        let gate = AsyncGate::with_capacity(3);
        gate.acquire().await;
        gate.acquire().await;
        assert_eq!(gate.available(), 1);

        gate.reset();
        assert_eq!(gate.available(), 3);
    }

    #[tokio::test]
    async fn test_core_works_with_async_gate() {
        let core: PoolCore<FakeConn, AsyncGate> = PoolCore::new(PoolConfig::default().with_max_size(1));
        let key = PoolKey::new("example.com", 443, true);
        let gate = core.gate(&key);

        gate.acquire().await;
        core.checkin(FakeConn::new(&key));
        assert_eq!(core.available_permits(&key), 1);
        assert_eq!(core.idle_count(&key), 1);
    }

    #[tokio::test]
    async fn test_pool_lifo_reuse() {
        let (listener, port) = listener().await;
        let server = hold_connections(listener, 2);

        let pool = AsyncConnectionPool::new(PoolConfig::default().with_max_size(2));
        let c1 = pool.get_connection("127.0.0.1", port, false, Timeout::default()).await.unwrap();
        let c2 = pool.get_connection("127.0.0.1", port, false, Timeout::default()).await.unwrap();
        let c2_addr = c2.local_addr().unwrap();

        pool.put_connection(c1);
        pool.put_connection(c2);

        let reused = pool.get_connection("127.0.0.1", port, false, Timeout::default()).await.unwrap();
        assert_eq!(reused.local_addr().unwrap(), c2_addr);
        pool.discard_connection(reused);

        pool.close_all();
        assert_eq!(pool.idle_count("127.0.0.1", port, false), 0);
        assert_eq!(pool.available_permits("127.0.0.1", port, false), 2);
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_third_get_suspends_until_put() {
        let (listener, port) = listener().await;
        let server = hold_connections(listener, 2);

        let pool = Arc::new(AsyncConnectionPool::new(PoolConfig::default().with_max_size(2)));
        let c1 = pool.get_connection("127.0.0.1", port, false, Timeout::default()).await.unwrap();
        let c2 = pool.get_connection("127.0.0.1", port, false, Timeout::default()).await.unwrap();

        let pending = tokio::time::timeout(
            Duration::from_millis(100),
            pool.get_connection("127.0.0.1", port, false, Timeout::default()),
        )
        .await;
        assert!(pending.is_err());
        // The cancelled waiter took nothing.
        assert_eq!(pool.available_permits("127.0.0.1", port, false), 0);

        let getter = {
            let pool = Arc::clone(&pool);
            tokio::spawn(async move {
                pool.get_connection("127.0.0.1", port, false, Timeout::default())
                    .await
                    .map(|c| c.local_addr().unwrap())
            })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!getter.is_finished());

        let c1_addr = c1.local_addr().unwrap();
        pool.put_connection(c1);
        assert_eq!(getter.await.unwrap().unwrap(), c1_addr);

        pool.discard_connection(c2);
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_failed_open_releases_permit() {
        let (listener, port) = listener().await;
        drop(listener);

        let pool = AsyncConnectionPool::new(PoolConfig::default().with_max_size(1));
        let timeout = Timeout::from(Duration::from_secs(2));

        assert!(pool.get_connection("127.0.0.1", port, false, timeout).await.is_err());
        assert_eq!(pool.available_permits("127.0.0.1", port, false), 1);
    }

    #[tokio::test]
    async fn test_guard_put_returns_connection() {
        let (listener, port) = listener().await;
        let server = hold_connections(listener, 1);

        let pool = AsyncConnectionPool::new(PoolConfig::default());
        let guard = pool.get("127.0.0.1", port, false, Timeout::default()).await.unwrap();
        guard.put();

        assert_eq!(pool.idle_count("127.0.0.1", port, false), 1);
        assert_eq!(pool.available_permits("127.0.0.1", port, false), 10);
        pool.close_all();
        server.await.unwrap();
    }
}

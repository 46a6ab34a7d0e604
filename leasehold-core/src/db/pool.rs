//! Bounded connection pool
//!
//! A fixed number of checkout permits (`max_size`) guards the physical
//! connections. Callers that find no free permit join a bounded wait queue
//! (`queue_limit`); a full queue fails immediately with `QueueFull`, a wait
//! that outlives its timeout fails with `Timeout`. Released connections go
//! back to an idle set capped at `max_idle` and are closed once they have
//! been idle longer than `idle_timeout`.
//!
//! Checkout is scoped: [`PooledConnection`] returns its connection on drop,
//! so early returns, `?` and cancelled futures never leak a connection.

use std::collections::VecDeque;
use std::ops::{Deref, DerefMut};
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqliteSynchronous};
use sqlx::{ConnectOptions, Connection, SqliteConnection};
use tokio::sync::{OwnedSemaphorePermit, Semaphore, TryAcquireError};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::PoolConfig;
use crate::error::{Error, Result};

/// Opens and closes the physical connections a pool hands out.
#[async_trait]
pub trait ManageConnection: Send + Sync + 'static {
    type Connection: Send + 'static;

    /// Open a new physical connection.
    async fn connect(&self) -> Result<Self::Connection>;

    /// Close a connection that is leaving the pool.
    async fn close(&self, conn: Self::Connection);
}

/// SQLite connection factory.
#[derive(Debug, Clone)]
pub struct SqliteConnector {
    options: SqliteConnectOptions,
}

impl SqliteConnector {
    /// Build a connector from a `sqlite://` URL.
    ///
    /// Connections use WAL journaling, a busy timeout so concurrent writers
    /// wait instead of failing, and enforced foreign keys (cascade deletes
    /// depend on it).
    pub fn from_url(database_url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5))
            .synchronous(SqliteSynchronous::Normal)
            .foreign_keys(true);
        Ok(Self { options })
    }
}

#[async_trait]
impl ManageConnection for SqliteConnector {
    type Connection = SqliteConnection;

    async fn connect(&self) -> Result<SqliteConnection> {
        let conn = self.options.connect().await?;
        debug!("opened sqlite connection");
        Ok(conn)
    }

    async fn close(&self, conn: SqliteConnection) {
        if let Err(err) = conn.close().await {
            warn!(error = %err, "failed to close sqlite connection cleanly");
        }
    }
}

/// Point-in-time pool counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PoolState {
    pub max_size: usize,
    /// Connections currently checked out
    pub active: usize,
    pub idle: usize,
    /// Callers queued for a connection
    pub waiting: usize,
}

struct IdleConn<C> {
    conn: C,
    since: Instant,
}

struct Shared<M: ManageConnection> {
    manager: M,
    config: PoolConfig,
    permits: Arc<Semaphore>,
    idle: Mutex<VecDeque<IdleConn<M::Connection>>>,
    active: AtomicUsize,
    waiting: AtomicUsize,
    closed: AtomicBool,
}

impl<M: ManageConnection> Shared<M> {
    fn idle(&self) -> MutexGuard<'_, VecDeque<IdleConn<M::Connection>>> {
        self.idle.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Pop the most recently returned connection, splitting off any that
    /// have outlived the idle timeout.
    fn take_idle(&self) -> (Option<M::Connection>, Vec<M::Connection>) {
        let timeout = self.config.idle_timeout();
        let mut idle = self.idle();
        let mut expired = Vec::new();
        while let Some(entry) = idle.pop_back() {
            if entry.since.elapsed() >= timeout {
                expired.push(entry.conn);
            } else {
                return (Some(entry.conn), expired);
            }
        }
        (None, expired)
    }

    fn put_back(self: &Arc<Self>, conn: M::Connection, broken: bool) {
        if broken || self.closed.load(Ordering::SeqCst) {
            self.retire(conn);
            return;
        }
        let overflow = {
            let mut idle = self.idle();
            if idle.len() < self.config.max_idle() {
                idle.push_back(IdleConn {
                    conn,
                    since: Instant::now(),
                });
                None
            } else {
                Some(conn)
            }
        };
        if let Some(conn) = overflow {
            self.retire(conn);
        }
    }

    /// Close a connection from a synchronous context.
    fn retire(self: &Arc<Self>, conn: M::Connection) {
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let shared = Arc::clone(self);
                handle.spawn(async move { shared.manager.close(conn).await });
            }
            Err(_) => drop(conn),
        }
    }
}

/// Decrements the waiter count when a queued acquire finishes or is cancelled.
struct QueueSlot<'a>(&'a AtomicUsize);

impl Drop for QueueSlot<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Shared handle to a bounded connection pool.
pub struct ConnectionPool<M: ManageConnection> {
    shared: Arc<Shared<M>>,
}

impl<M: ManageConnection> Clone for ConnectionPool<M> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<M: ManageConnection> std::fmt::Debug for ConnectionPool<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionPool")
            .field("state", &self.state())
            .finish()
    }
}

impl<M: ManageConnection> ConnectionPool<M> {
    /// Create a pool. Connections are opened lazily on first demand.
    pub fn new(manager: M, config: PoolConfig) -> Self {
        let permits = Arc::new(Semaphore::new(config.max_size));
        Self {
            shared: Arc::new(Shared {
                manager,
                config,
                permits,
                idle: Mutex::new(VecDeque::new()),
                active: AtomicUsize::new(0),
                waiting: AtomicUsize::new(0),
                closed: AtomicBool::new(false),
            }),
        }
    }

    pub fn config(&self) -> &PoolConfig {
        &self.shared.config
    }

    /// Check out a connection, waiting at most `timeout` for one to free up.
    ///
    /// # Errors
    ///
    /// - `QueueFull` when `queue_limit` callers are already waiting
    /// - `Timeout` when no connection frees up in time
    /// - `Closed` after [`ConnectionPool::close`]
    /// - whatever the manager returns when opening a new connection fails
    pub async fn acquire(&self, timeout: Duration) -> Result<PooledConnection<M>> {
        if self.shared.closed.load(Ordering::SeqCst) {
            return Err(Error::Closed);
        }

        let permit = match Arc::clone(&self.shared.permits).try_acquire_owned() {
            Ok(permit) => permit,
            Err(TryAcquireError::Closed) => return Err(Error::Closed),
            Err(TryAcquireError::NoPermits) => self.wait_for_permit(timeout).await?,
        };

        let (reused, expired) = self.shared.take_idle();
        for conn in expired {
            debug!("closing connection past idle timeout");
            self.shared.manager.close(conn).await;
        }
        // On connect failure the permit drops here and frees the slot.
        let conn = match reused {
            Some(conn) => conn,
            None => self.shared.manager.connect().await?,
        };

        self.shared.active.fetch_add(1, Ordering::SeqCst);
        Ok(PooledConnection {
            conn: Some(conn),
            broken: false,
            shared: Arc::clone(&self.shared),
            _permit: permit,
        })
    }

    /// Check out a connection using the configured acquire timeout.
    pub async fn acquire_default(&self) -> Result<PooledConnection<M>> {
        self.acquire(self.shared.config.acquire_timeout()).await
    }

    async fn wait_for_permit(&self, timeout: Duration) -> Result<OwnedSemaphorePermit> {
        let limit = self.shared.config.queue_limit;
        let joined = self
            .shared
            .waiting
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                (n < limit).then_some(n + 1)
            });
        if joined.is_err() {
            warn!(limit, "connection wait queue is full");
            return Err(Error::QueueFull { limit });
        }
        let _slot = QueueSlot(&self.shared.waiting);

        match tokio::time::timeout(timeout, Arc::clone(&self.shared.permits).acquire_owned()).await
        {
            Ok(Ok(permit)) => Ok(permit),
            Ok(Err(_)) => Err(Error::Closed),
            Err(_) => {
                warn!(?timeout, "timed out waiting for a connection");
                Err(Error::Timeout)
            }
        }
    }

    /// Return a connection to the pool. Equivalent to dropping it.
    pub fn release(&self, conn: PooledConnection<M>) {
        drop(conn);
    }

    pub fn state(&self) -> PoolState {
        PoolState {
            max_size: self.shared.config.max_size,
            active: self.shared.active.load(Ordering::SeqCst),
            idle: self.shared.idle().len(),
            waiting: self.shared.waiting.load(Ordering::SeqCst),
        }
    }

    /// Number of connections currently checked out.
    pub fn active_connections(&self) -> usize {
        self.shared.active.load(Ordering::SeqCst)
    }

    /// Close idle connections older than the idle timeout. Returns how many
    /// were closed.
    pub async fn evict_idle(&self) -> usize {
        let timeout = self.shared.config.idle_timeout();
        let expired: Vec<_> = {
            let mut idle = self.shared.idle();
            let (old, fresh): (VecDeque<_>, VecDeque<_>) =
                idle.drain(..).partition(|entry| entry.since.elapsed() >= timeout);
            *idle = fresh;
            old.into_iter().map(|entry| entry.conn).collect()
        };
        let count = expired.len();
        for conn in expired {
            self.shared.manager.close(conn).await;
        }
        if count > 0 {
            debug!(count, "evicted idle connections");
        }
        count
    }

    /// Shut the pool down: reject new acquires, wake queued waiters with
    /// `Closed`, and close every idle connection. Connections still checked
    /// out are closed as they are released.
    pub async fn close(&self) {
        self.shared.closed.store(true, Ordering::SeqCst);
        self.shared.permits.close();
        let drained: Vec<_> = self.shared.idle().drain(..).map(|e| e.conn).collect();
        let count = drained.len();
        for conn in drained {
            self.shared.manager.close(conn).await;
        }
        info!(closed = count, "connection pool shut down");
    }

    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::SeqCst)
    }
}

/// A checked-out connection. Returned to the pool when dropped.
pub struct PooledConnection<M: ManageConnection> {
    conn: Option<M::Connection>,
    broken: bool,
    shared: Arc<Shared<M>>,
    // Dropped after `Drop::drop` has put the connection back.
    _permit: OwnedSemaphorePermit,
}

impl<M: ManageConnection> PooledConnection<M> {
    /// Close this connection on release instead of keeping it idle.
    pub fn mark_broken(&mut self) {
        self.broken = true;
    }
}

impl<M: ManageConnection> Deref for PooledConnection<M> {
    type Target = M::Connection;

    fn deref(&self) -> &Self::Target {
        self.conn.as_ref().expect("connection is only taken on drop")
    }
}

impl<M: ManageConnection> DerefMut for PooledConnection<M> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.conn.as_mut().expect("connection is only taken on drop")
    }
}

impl<M: ManageConnection> Drop for PooledConnection<M> {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            self.shared.active.fetch_sub(1, Ordering::SeqCst);
            self.shared.put_back(conn, self.broken);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[derive(Default)]
    struct FakeManager {
        next_id: AtomicUsize,
        opened: AtomicUsize,
        closed: AtomicUsize,
        refuse: AtomicBool,
    }

    #[derive(Debug)]
    struct FakeConn {
        id: usize,
    }

    #[async_trait]
    impl ManageConnection for Arc<FakeManager> {
        type Connection = FakeConn;

        async fn connect(&self) -> Result<FakeConn> {
            if self.refuse.load(Ordering::SeqCst) {
                return Err(Error::Database(sqlx::Error::Io(std::io::Error::new(
                    std::io::ErrorKind::ConnectionRefused,
                    "refused",
                ))));
            }
            self.opened.fetch_add(1, Ordering::SeqCst);
            Ok(FakeConn {
                id: self.next_id.fetch_add(1, Ordering::SeqCst),
            })
        }

        async fn close(&self, _conn: FakeConn) {
            self.closed.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn pool(config: PoolConfig) -> (Arc<FakeManager>, ConnectionPool<Arc<FakeManager>>) {
        let manager = Arc::new(FakeManager::default());
        (Arc::clone(&manager), ConnectionPool::new(manager, config))
    }

    const WAIT: Duration = Duration::from_secs(5);

    #[tokio::test]
    async fn released_connection_is_reused() {
        let (manager, pool) = pool(PoolConfig::default());

        let conn = pool.acquire(WAIT).await.unwrap();
        let first = conn.id;
        assert_eq!(pool.active_connections(), 1);
        pool.release(conn);

        let conn = pool.acquire(WAIT).await.unwrap();
        assert_eq!(conn.id, first);
        assert_eq!(manager.opened.load(Ordering::SeqCst), 1);
        drop(conn);

        let state = pool.state();
        assert_eq!(state.active, 0);
        assert_eq!(state.idle, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_callers_never_share_a_connection() {
        let (manager, pool) = pool(
            PoolConfig::default()
                .with_max_size(3)
                .with_queue_limit(64),
        );
        let held = Arc::new(Mutex::new(HashSet::new()));

        let handles: Vec<_> = (0..40)
            .map(|_| {
                let pool = pool.clone();
                let held = Arc::clone(&held);
                tokio::spawn(async move {
                    let conn = pool.acquire(WAIT).await.expect("acquire");
                    assert!(
                        held.lock().unwrap().insert(conn.id),
                        "connection {} handed out twice",
                        conn.id
                    );
                    tokio::time::sleep(Duration::from_millis(2)).await;
                    held.lock().unwrap().remove(&conn.id);
                })
            })
            .collect();

        for handle in handles {
            handle.await.expect("task panicked");
        }

        let state = pool.state();
        assert_eq!(state.active, 0);
        assert_eq!(state.waiting, 0);
        assert!(manager.opened.load(Ordering::SeqCst) <= 3);
    }

    #[tokio::test]
    async fn full_queue_fails_immediately() {
        let (_, pool) = pool(PoolConfig::default().with_max_size(1).with_queue_limit(0));
        let _held = pool.acquire(WAIT).await.unwrap();

        let err = pool.acquire(WAIT).await.err().expect("queue should be full");
        assert!(matches!(err, Error::QueueFull { limit: 0 }));
    }

    #[tokio::test(start_paused = true)]
    async fn waiting_past_timeout_fails_and_leaves_queue() {
        let (_, pool) = pool(PoolConfig::default().with_max_size(1).with_queue_limit(4));
        let _held = pool.acquire(WAIT).await.unwrap();

        let err = pool
            .acquire(Duration::from_millis(50))
            .await
            .err()
            .expect("acquire should time out");
        assert!(matches!(err, Error::Timeout));
        assert_eq!(pool.state().waiting, 0);
    }

    #[tokio::test]
    async fn waiter_gets_connection_when_released() {
        let (_, pool) = pool(PoolConfig::default().with_max_size(1));
        let held = pool.acquire(WAIT).await.unwrap();
        let id = held.id;

        let waiter = {
            let pool = pool.clone();
            tokio::spawn(async move { pool.acquire(WAIT).await.map(|c| c.id) })
        };
        tokio::task::yield_now().await;
        drop(held);

        assert_eq!(waiter.await.unwrap().unwrap(), id);
    }

    #[tokio::test(start_paused = true)]
    async fn idle_connections_are_evicted_after_timeout() {
        let (manager, pool) = pool(
            PoolConfig::default()
                .with_max_size(2)
                .with_idle_timeout(Duration::from_secs(1)),
        );
        let a = pool.acquire(WAIT).await.unwrap();
        let b = pool.acquire(WAIT).await.unwrap();
        drop(a);
        drop(b);
        assert_eq!(pool.state().idle, 2);

        assert_eq!(pool.evict_idle().await, 0);
        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(pool.evict_idle().await, 2);
        assert_eq!(pool.state().idle, 0);
        assert_eq!(manager.closed.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn stale_idle_connection_is_replaced_on_acquire() {
        let (manager, pool) = pool(PoolConfig::default().with_idle_timeout(Duration::from_secs(1)));
        let first = pool.acquire(WAIT).await.unwrap().id;
        tokio::time::advance(Duration::from_secs(2)).await;

        let conn = pool.acquire(WAIT).await.unwrap();
        assert_ne!(conn.id, first);
        assert_eq!(manager.closed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn idle_set_is_capped() {
        let (_, pool) = pool(PoolConfig::default().with_max_size(3).with_max_idle(1));
        let conns = vec![
            pool.acquire(WAIT).await.unwrap(),
            pool.acquire(WAIT).await.unwrap(),
            pool.acquire(WAIT).await.unwrap(),
        ];
        drop(conns);

        let state = pool.state();
        assert_eq!(state.idle, 1);
        assert_eq!(state.active, 0);
    }

    #[tokio::test]
    async fn broken_connection_is_not_reused() {
        let (_, pool) = pool(PoolConfig::default());
        let mut conn = pool.acquire(WAIT).await.unwrap();
        let first = conn.id;
        conn.mark_broken();
        drop(conn);

        assert_eq!(pool.state().idle, 0);
        assert_ne!(pool.acquire(WAIT).await.unwrap().id, first);
    }

    #[tokio::test]
    async fn connect_failure_frees_the_slot() {
        let (manager, pool) = pool(PoolConfig::default().with_max_size(1).with_queue_limit(0));
        manager.refuse.store(true, Ordering::SeqCst);
        assert!(matches!(
            pool.acquire(WAIT).await,
            Err(Error::Database(_))
        ));
        assert_eq!(pool.active_connections(), 0);

        manager.refuse.store(false, Ordering::SeqCst);
        assert!(pool.acquire(WAIT).await.is_ok());
    }

    #[tokio::test]
    async fn closed_pool_rejects_and_drains() {
        let (manager, pool) = pool(PoolConfig::default());
        drop(pool.acquire(WAIT).await.unwrap());

        pool.close().await;
        assert!(pool.is_closed());
        assert_eq!(manager.closed.load(Ordering::SeqCst), 1);
        assert!(matches!(pool.acquire(WAIT).await, Err(Error::Closed)));
    }
}

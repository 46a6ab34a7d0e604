//! Query executor: the single path every statement takes to the store.
//!
//! Connection checkout is wrapped in [`RetryPolicy`], so pool exhaustion
//! (`QueueFull`, `Timeout`) is retried with linear backoff in one place.
//! Statement failures are never retried. The pooled connection is a scoped
//! guard and goes back to the pool on every exit path.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use serde::Serialize;
use sqlx::query::Query;
use sqlx::sqlite::{Sqlite, SqliteArguments, SqliteRow};
use sqlx::{Connection, SqliteConnection};
use tracing::{debug, warn};

use super::pool::{ConnectionPool, PoolState, PooledConnection, SqliteConnector};
use crate::config::{CatalogConfig, RetryConfig};
use crate::error::{Error, Result};

/// A bound statement parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Bool(bool),
    Timestamp(DateTime<Utc>),
}

impl From<&str> for SqlValue {
    fn from(v: &str) -> Self {
        Self::Text(v.to_owned())
    }
}

impl From<String> for SqlValue {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl From<&String> for SqlValue {
    fn from(v: &String) -> Self {
        Self::Text(v.clone())
    }
}

impl From<i64> for SqlValue {
    fn from(v: i64) -> Self {
        Self::Integer(v)
    }
}

impl From<f64> for SqlValue {
    fn from(v: f64) -> Self {
        Self::Real(v)
    }
}

impl From<bool> for SqlValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<DateTime<Utc>> for SqlValue {
    fn from(v: DateTime<Utc>) -> Self {
        Self::Timestamp(v)
    }
}

impl<T: Into<SqlValue>> From<Option<T>> for SqlValue {
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::Null, Into::into)
    }
}

/// SQL text plus its ordered parameters. Values are always bound, never
/// spliced into the SQL.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    sql: String,
    params: Vec<SqlValue>,
}

impl Statement {
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            params: Vec::new(),
        }
    }

    pub fn bind(mut self, value: impl Into<SqlValue>) -> Self {
        self.params.push(value.into());
        self
    }

    pub fn bind_all(mut self, values: impl IntoIterator<Item = SqlValue>) -> Self {
        self.params.extend(values);
        self
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn params(&self) -> &[SqlValue] {
        &self.params
    }

    /// Build the sqlx query with every parameter bound in order.
    pub fn query(&self) -> Query<'_, Sqlite, SqliteArguments<'_>> {
        self.params
            .iter()
            .fold(sqlx::query(&self.sql), |query, param| match param {
                SqlValue::Null => query.bind(None::<&str>),
                SqlValue::Integer(v) => query.bind(*v),
                SqlValue::Real(v) => query.bind(*v),
                SqlValue::Text(v) => query.bind(v.as_str()),
                SqlValue::Bool(v) => query.bind(*v),
                SqlValue::Timestamp(v) => query.bind(*v),
            })
    }
}

/// `?, ?, ?` for an `IN (…)` list of `n` parameters.
pub fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}

/// Bounded retry with linear backoff for transient pool errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delay after failed attempt `attempt` (1-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.base_delay * attempt
    }

    /// Run `op` until it succeeds, fails with a non-transient error, or
    /// `max_attempts` attempts have been made. `op` receives the 1-based
    /// attempt number.
    pub async fn run<T, F, Fut>(&self, mut op: F) -> Result<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 1;
        loop {
            match op(attempt).await {
                Err(err) if err.is_transient() && attempt < self.max_attempts => {
                    let delay = self.backoff(attempt);
                    warn!(
                        attempt,
                        max_attempts = self.max_attempts,
                        ?delay,
                        error = %err,
                        "connection pool exhausted, backing off"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                outcome => return outcome,
            }
        }
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self::new(config.max_attempts, config.base_delay())
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}

/// Abort `fut` once `deadline` elapses.
///
/// Anything `fut` holds, including a pooled connection, is dropped and
/// therefore released when the deadline fires.
pub async fn with_deadline<T, Fut>(deadline: Duration, fut: Fut) -> Result<T>
where
    Fut: Future<Output = Result<T>>,
{
    match tokio::time::timeout(deadline, fut).await {
        Ok(outcome) => outcome,
        Err(_) => {
            warn!(?deadline, "caller deadline elapsed");
            Err(Error::Timeout)
        }
    }
}

#[derive(Debug, Default)]
struct ExecutorStats {
    statements: AtomicU64,
    attempts: AtomicU64,
    retries: AtomicU64,
}

/// Counters since the executor was created.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    /// Statements sent to the store (a batch counts each statement)
    pub statements: u64,
    /// Connection checkout attempts
    pub attempts: u64,
    /// Checkout attempts after the first for the same call
    pub retries: u64,
}

type Checkout = PooledConnection<SqliteConnector>;

/// Runs statements against pooled SQLite connections.
#[derive(Debug)]
pub struct QueryExecutor {
    pool: ConnectionPool<SqliteConnector>,
    retry: RetryPolicy,
    acquire_timeout: Duration,
    stats: ExecutorStats,
}

impl QueryExecutor {
    pub fn new(pool: ConnectionPool<SqliteConnector>, retry: RetryPolicy) -> Self {
        let acquire_timeout = pool.config().acquire_timeout();
        Self {
            pool,
            retry,
            acquire_timeout,
            stats: ExecutorStats::default(),
        }
    }

    /// Build the pool and retry policy described by `config`.
    pub fn from_config(config: &CatalogConfig) -> Result<Self> {
        let connector = SqliteConnector::from_url(&config.database_url)?;
        let pool = ConnectionPool::new(connector, config.pool.clone());
        Ok(Self::new(pool, RetryPolicy::from(&config.retry)))
    }

    pub fn pool(&self) -> &ConnectionPool<SqliteConnector> {
        &self.pool
    }

    pub fn pool_state(&self) -> PoolState {
        self.pool.state()
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    pub fn stats(&self) -> StatsSnapshot {
        StatsSnapshot {
            statements: self.stats.statements.load(Ordering::Relaxed),
            attempts: self.stats.attempts.load(Ordering::Relaxed),
            retries: self.stats.retries.load(Ordering::Relaxed),
        }
    }

    async fn checkout(&self) -> Result<Checkout> {
        self.retry
            .run(|attempt| async move {
                self.stats.attempts.fetch_add(1, Ordering::Relaxed);
                if attempt > 1 {
                    self.stats.retries.fetch_add(1, Ordering::Relaxed);
                }
                self.pool.acquire(self.acquire_timeout).await
            })
            .await
    }

    fn record(&self, stmt: &Statement) {
        self.stats.statements.fetch_add(1, Ordering::Relaxed);
        debug!(sql = %stmt.sql().trim(), params = stmt.params().len(), "executing statement");
    }

    /// Connections that failed at the I/O level are dropped, not reused.
    fn settle<T>(conn: &mut Checkout, outcome: Result<T>) -> Result<T> {
        if let Err(err) = &outcome {
            if err.is_connection_broken() {
                conn.mark_broken();
            }
        }
        outcome
    }

    pub async fn fetch_all(&self, stmt: &Statement) -> Result<Vec<SqliteRow>> {
        let mut conn = self.checkout().await?;
        self.record(stmt);
        let outcome = stmt.query().fetch_all(&mut *conn).await.map_err(Error::from);
        Self::settle(&mut conn, outcome)
    }

    pub async fn fetch_optional(&self, stmt: &Statement) -> Result<Option<SqliteRow>> {
        let mut conn = self.checkout().await?;
        self.record(stmt);
        let outcome = stmt
            .query()
            .fetch_optional(&mut *conn)
            .await
            .map_err(Error::from);
        Self::settle(&mut conn, outcome)
    }

    /// Run a write and return the number of rows it affected.
    pub async fn execute(&self, stmt: &Statement) -> Result<u64> {
        let mut conn = self.checkout().await?;
        self.record(stmt);
        let outcome = stmt
            .query()
            .execute(&mut *conn)
            .await
            .map(|done| done.rows_affected())
            .map_err(Error::from);
        Self::settle(&mut conn, outcome)
    }

    /// Run several writes in one transaction. Any failure rolls all of them
    /// back. Returns rows affected per statement.
    pub async fn execute_batch(&self, stmts: &[Statement]) -> Result<Vec<u64>> {
        let mut conn = self.checkout().await?;
        for stmt in stmts {
            self.record(stmt);
        }
        let outcome = Self::run_batch(&mut conn, stmts).await;
        Self::settle(&mut conn, outcome)
    }

    async fn run_batch(conn: &mut SqliteConnection, stmts: &[Statement]) -> Result<Vec<u64>> {
        let mut tx = conn.begin().await?;
        let mut affected = Vec::with_capacity(stmts.len());
        for stmt in stmts {
            match stmt.query().execute(&mut *tx).await {
                Ok(done) => affected.push(done.rows_affected()),
                Err(err) => {
                    tx.rollback().await?;
                    return Err(err.into());
                }
            }
        }
        tx.commit().await?;
        Ok(affected)
    }

    /// Run `f` inside a transaction on one pooled connection.
    ///
    /// Commits when `f` returns `Ok`; an `Err` (or a cancelled future) rolls
    /// back.
    pub async fn transaction<T, F>(&self, f: F) -> Result<T>
    where
        T: Send,
        F: for<'c> FnOnce(&'c mut SqliteConnection) -> BoxFuture<'c, Result<T>> + Send,
    {
        let mut conn = self.checkout().await?;
        self.stats.statements.fetch_add(1, Ordering::Relaxed);
        let outcome = Self::run_transaction(&mut conn, f).await;
        Self::settle(&mut conn, outcome)
    }

    async fn run_transaction<T, F>(conn: &mut SqliteConnection, f: F) -> Result<T>
    where
        F: for<'c> FnOnce(&'c mut SqliteConnection) -> BoxFuture<'c, Result<T>>,
    {
        let mut tx = conn.begin().await?;
        match f(&mut *tx).await {
            Ok(value) => {
                tx.commit().await?;
                Ok(value)
            }
            Err(err) => {
                tx.rollback().await?;
                Err(err)
            }
        }
    }

    /// Execute a multi-statement script (schema setup).
    pub async fn execute_script(&self, script: &str) -> Result<()> {
        let mut conn = self.checkout().await?;
        self.stats.statements.fetch_add(1, Ordering::Relaxed);
        let outcome = sqlx::raw_sql(script)
            .execute(&mut *conn)
            .await
            .map(|_| ())
            .map_err(Error::from);
        Self::settle(&mut conn, outcome)
    }

    /// Drain and close the pool.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

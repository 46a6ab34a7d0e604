//! Database layer - connection pool, executor and schema
//!
//! # Design Principles
//!
//! - Bounded pool with a bounded wait queue; no unbounded waiting
//! - Every statement goes through `QueryExecutor`, which owns retry policy
//! - Child rows are fetched in bulk with `IN (…)`; no N+1 queries
//! - Rely on DB constraints, handle conflicts - no check-then-insert
//! - Transactions for multi-step writes

pub mod executor;
pub mod monitor;
pub mod pool;
pub mod schema;

pub use executor::{placeholders, with_deadline, QueryExecutor, RetryPolicy, SqlValue, Statement, StatsSnapshot};
pub use monitor::{spawn_monitor, MonitorHandle};
pub use pool::{ConnectionPool, ManageConnection, PoolState, PooledConnection, SqliteConnector};

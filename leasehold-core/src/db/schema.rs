//! Schema bootstrap

use tracing::info;

use super::executor::QueryExecutor;
use crate::error::Result;

/// Idempotent DDL for every catalog table.
pub const SCHEMA: &str = include_str!("schema.sql");

/// Create any missing tables and indexes.
pub async fn apply(exec: &QueryExecutor) -> Result<()> {
    exec.execute_script(SCHEMA).await?;
    info!("catalog schema ready");
    Ok(())
}

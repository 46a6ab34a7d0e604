//! Tenant favorites
//!
//! The composite key makes a second add a uniqueness rejection
//! (`AlreadyExists`); removing twice simply affects zero rows.

use chrono::Utc;

use super::{decode_all, PropertyRow, PROPERTY_COLUMNS};
use crate::db::{QueryExecutor, Statement};
use crate::error::Result;
use crate::models::Property;

/// Favorite repository
pub struct FavoriteRepo<'a> {
    exec: &'a QueryExecutor,
}

impl<'a> FavoriteRepo<'a> {
    pub fn new(exec: &'a QueryExecutor) -> Self {
        Self { exec }
    }

    pub async fn add(&self, tenant_id: &str, property_id: &str) -> Result<()> {
        let stmt = Statement::new(
            "INSERT INTO favorites (tenant_id, property_id, created_at) VALUES (?, ?, ?)",
        )
        .bind(tenant_id)
        .bind(property_id)
        .bind(Utc::now());
        self.exec
            .execute(&stmt)
            .await
            .map_err(|e| e.on_write("favorite", format!("{tenant_id}/{property_id}")))?;
        Ok(())
    }

    /// Returns rows removed; zero is not an error.
    pub async fn remove(&self, tenant_id: &str, property_id: &str) -> Result<u64> {
        let stmt = Statement::new("DELETE FROM favorites WHERE tenant_id = ? AND property_id = ?")
            .bind(tenant_id)
            .bind(property_id);
        self.exec.execute(&stmt).await
    }

    pub async fn is_favorite(&self, tenant_id: &str, property_id: &str) -> Result<bool> {
        let stmt = Statement::new("SELECT 1 FROM favorites WHERE tenant_id = ? AND property_id = ?")
            .bind(tenant_id)
            .bind(property_id);
        Ok(self.exec.fetch_optional(&stmt).await?.is_some())
    }

    /// A tenant's favorite properties, most recently favorited first.
    pub async fn list_for_tenant(&self, tenant_id: &str) -> Result<Vec<Property>> {
        let stmt = Statement::new(format!(
            "SELECT {PROPERTY_COLUMNS} FROM favorites fav \
             JOIN properties p ON p.id = fav.property_id \
             WHERE fav.tenant_id = ? \
             ORDER BY fav.created_at DESC, fav.rowid DESC"
        ))
        .bind(tenant_id);
        let rows = self.exec.fetch_all(&stmt).await?;
        decode_all::<PropertyRow, Property>(&rows)
    }
}

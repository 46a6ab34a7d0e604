//! Feature catalog and property ↔ feature links
//!
//! Feature names are unique. Links are a plain junction; replacing a
//! property's features is clear-then-insert inside one transaction.

use futures::FutureExt;
use sqlx::SqliteConnection;

use super::properties::feature_links_statement;
use super::{decode_all, FeatureRow};
use crate::db::{QueryExecutor, Statement};
use crate::error::{Error, Result};
use crate::models::{new_id, Feature};

/// Feature repository
pub struct FeatureRepo<'a> {
    exec: &'a QueryExecutor,
}

fn clear_statement(property_id: &str) -> Statement {
    Statement::new("DELETE FROM property_features WHERE property_id = ?").bind(property_id)
}

async fn replace_links(
    conn: &mut SqliteConnection,
    property_id: String,
    feature_ids: Vec<String>,
) -> Result<u64> {
    clear_statement(&property_id)
        .query()
        .execute(&mut *conn)
        .await?;

    let Some(links) = feature_links_statement(&property_id, &feature_ids) else {
        return Ok(0);
    };
    let done = links
        .query()
        .execute(&mut *conn)
        .await
        .map_err(|e| Error::from(e).on_write("feature link", feature_ids.join(",")))?;
    Ok(done.rows_affected())
}

impl<'a> FeatureRepo<'a> {
    pub fn new(exec: &'a QueryExecutor) -> Self {
        Self { exec }
    }

    /// Add a feature to the shared catalog. Duplicate names are rejected.
    pub async fn create(&self, name: &str, icon_name: &str) -> Result<Feature> {
        let name = name.trim();
        if name.is_empty() {
            return Err(Error::validation("name", "must not be empty"));
        }
        let feature = Feature {
            id: new_id(),
            name: name.to_owned(),
            icon_name: icon_name.to_owned(),
        };
        let stmt = Statement::new("INSERT INTO features (id, name, icon_name) VALUES (?, ?, ?)")
            .bind(&feature.id)
            .bind(&feature.name)
            .bind(&feature.icon_name);
        self.exec
            .execute(&stmt)
            .await
            .map_err(|e| e.on_write("feature", &feature.name))?;
        Ok(feature)
    }

    pub async fn list_all(&self) -> Result<Vec<Feature>> {
        let stmt = Statement::new("SELECT id, name, icon_name FROM features ORDER BY name");
        let rows = self.exec.fetch_all(&stmt).await?;
        decode_all::<FeatureRow, Feature>(&rows)
    }

    /// Features linked to one property, by name.
    pub async fn for_property(&self, property_id: &str) -> Result<Vec<Feature>> {
        let stmt = Statement::new(
            "SELECT f.id, f.name, f.icon_name FROM property_features pf \
             JOIN features f ON f.id = pf.feature_id \
             WHERE pf.property_id = ? ORDER BY f.name",
        )
        .bind(property_id);
        let rows = self.exec.fetch_all(&stmt).await?;
        decode_all::<FeatureRow, Feature>(&rows)
    }

    pub async fn add_to_property(&self, property_id: &str, feature_id: &str) -> Result<()> {
        let stmt = Statement::new(
            "INSERT INTO property_features (property_id, feature_id) VALUES (?, ?)",
        )
        .bind(property_id)
        .bind(feature_id);
        self.exec
            .execute(&stmt)
            .await
            .map_err(|e| e.on_write("feature link", format!("{property_id}/{feature_id}")))?;
        Ok(())
    }

    /// Link several features in one multi-row insert. Returns links created.
    pub async fn add_many_to_property(&self, property_id: &str, feature_ids: &[String]) -> Result<u64> {
        let Some(stmt) = feature_links_statement(property_id, feature_ids) else {
            return Ok(0);
        };
        self.exec
            .execute(&stmt)
            .await
            .map_err(|e| e.on_write("feature link", format!("{property_id}/{}", feature_ids.join(","))))
    }

    /// Remove every feature link of a property. Returns links removed.
    pub async fn clear_for_property(&self, property_id: &str) -> Result<u64> {
        self.exec.execute(&clear_statement(property_id)).await
    }

    /// Replace a property's features with `feature_ids` (atomic).
    pub async fn replace_for_property(&self, property_id: &str, feature_ids: Vec<String>) -> Result<u64> {
        let property_id = property_id.to_owned();
        self.exec
            .transaction(move |conn| replace_links(conn, property_id, feature_ids).boxed())
            .await
    }
}

//! Visit requests
//!
//! Reads join tenant contact details and property fields in a single query
//! so a landlord's visit list is one round trip.

use chrono::{DateTime, Utc};
use sqlx::FromRow;

use super::{decode, decode_all};
use crate::db::{QueryExecutor, Statement};
use crate::error::{Error, Result};
use crate::models::{new_id, NewVisit, VisitDetails, VisitStatus};

/// Message stored when the tenant leaves none.
pub const DEFAULT_VISIT_MESSAGE: &str = "No additional message";

const VISIT_SELECT: &str = "SELECT v.id, v.tenant_id, u.name AS tenant_name, \
     u.email AS tenant_email, u.phone AS tenant_phone, v.property_id, \
     p.title AS property_title, p.location AS property_location, p.landlord_id, \
     v.visit_date, v.message, v.status, v.created_at \
     FROM visits v \
     JOIN users u ON u.id = v.tenant_id \
     JOIN properties p ON p.id = v.property_id";

#[derive(Debug, FromRow)]
struct VisitRow {
    id: String,
    tenant_id: String,
    tenant_name: String,
    tenant_email: String,
    tenant_phone: Option<String>,
    property_id: String,
    property_title: String,
    property_location: String,
    landlord_id: String,
    visit_date: String,
    message: String,
    status: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<VisitRow> for VisitDetails {
    type Error = Error;

    fn try_from(row: VisitRow) -> Result<Self> {
        Ok(Self {
            status: row.status.parse()?,
            id: row.id,
            tenant_id: row.tenant_id,
            tenant_name: row.tenant_name,
            tenant_email: row.tenant_email,
            tenant_phone: row.tenant_phone,
            property_id: row.property_id,
            property_title: row.property_title,
            property_location: row.property_location,
            landlord_id: row.landlord_id,
            visit_date: row.visit_date,
            message: row.message,
            created_at: row.created_at,
        })
    }
}

/// Visit repository
pub struct VisitRepo<'a> {
    exec: &'a QueryExecutor,
}

impl<'a> VisitRepo<'a> {
    pub fn new(exec: &'a QueryExecutor) -> Self {
        Self { exec }
    }

    /// Record a PENDING visit request and return it with its joined details.
    pub async fn schedule(&self, visit: NewVisit) -> Result<VisitDetails> {
        if visit.visit_date.trim().is_empty() {
            return Err(Error::validation("visit_date", "must not be empty"));
        }
        let id = new_id();
        let message = visit
            .message
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_VISIT_MESSAGE.to_owned());

        let stmt = Statement::new(
            "INSERT INTO visits (id, tenant_id, property_id, visit_date, message, status, created_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(&visit.tenant_id)
        .bind(&visit.property_id)
        .bind(visit.visit_date.trim())
        .bind(message)
        .bind(VisitStatus::Pending.as_str())
        .bind(Utc::now());
        self.exec
            .execute(&stmt)
            .await
            .map_err(|e| e.on_write("visit", &id))?;

        self.get(&id).await
    }

    pub async fn get(&self, id: &str) -> Result<VisitDetails> {
        let stmt = Statement::new(format!("{VISIT_SELECT} WHERE v.id = ?")).bind(id);
        let row = self
            .exec
            .fetch_optional(&stmt)
            .await?
            .ok_or_else(|| Error::not_found("visit", id))?;
        decode::<VisitRow, VisitDetails>(&row)
    }

    /// Visit requests for every property the landlord owns, newest first.
    pub async fn list_for_landlord(&self, landlord_id: &str) -> Result<Vec<VisitDetails>> {
        let stmt = Statement::new(format!(
            "{VISIT_SELECT} WHERE p.landlord_id = ? ORDER BY v.created_at DESC, v.rowid DESC"
        ))
        .bind(landlord_id);
        let rows = self.exec.fetch_all(&stmt).await?;
        decode_all::<VisitRow, VisitDetails>(&rows)
    }

    pub async fn list_for_tenant(&self, tenant_id: &str) -> Result<Vec<VisitDetails>> {
        let stmt = Statement::new(format!(
            "{VISIT_SELECT} WHERE v.tenant_id = ? ORDER BY v.created_at DESC, v.rowid DESC"
        ))
        .bind(tenant_id);
        let rows = self.exec.fetch_all(&stmt).await?;
        decode_all::<VisitRow, VisitDetails>(&rows)
    }

    pub async fn set_status(&self, id: &str, status: VisitStatus) -> Result<()> {
        let stmt = Statement::new("UPDATE visits SET status = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(id);
        if self.exec.execute(&stmt).await? == 0 {
            return Err(Error::not_found("visit", id));
        }
        Ok(())
    }
}

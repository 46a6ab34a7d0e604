//! Rental allocation.
//!
//! The only guarded status transition is AVAILABLE → RENTED. The guard is
//! the store itself: a conditional `UPDATE … WHERE status = 'AVAILABLE'`
//! inside a transaction. Of any number of concurrent callers for the same
//! property exactly one sees a changed row; the rest see zero rows and are
//! told the property is no longer available. No status is read beforehand
//! and nothing is cached.

use chrono::Utc;
use futures::FutureExt;
use sqlx::{Row, SqliteConnection};
use tracing::{debug, info};

use crate::db::{QueryExecutor, Statement};
use crate::error::{Error, Result};
use crate::models::{new_id, PropertyStatus, RentalReceipt};

/// Performs the AVAILABLE → RENTED transition.
pub struct RentalAllocator<'a> {
    exec: &'a QueryExecutor,
}

async fn claim(
    conn: &mut SqliteConnection,
    property_id: String,
    tenant_id: String,
) -> Result<RentalReceipt> {
    let rented_at = Utc::now();

    let claimed = Statement::new(
        "UPDATE properties SET status = ?, updated_at = ? \
         WHERE id = ? AND status = ? RETURNING title, price",
    )
    .bind(PropertyStatus::Rented.as_str())
    .bind(rented_at)
    .bind(&property_id)
    .bind(PropertyStatus::Available.as_str())
    .query()
    .fetch_optional(&mut *conn)
    .await?;

    let Some(row) = claimed else {
        let current = Statement::new("SELECT status FROM properties WHERE id = ?")
            .bind(&property_id)
            .query()
            .fetch_optional(&mut *conn)
            .await?;
        return Err(match current {
            None => Error::not_found("property", property_id),
            Some(row) => {
                let status: String = row.try_get("status")?;
                Error::NotAvailable {
                    property_id,
                    status: status.parse()?,
                }
            }
        });
    };

    let property_title: String = row.try_get("title")?;
    let rent_amount: f64 = row.try_get("price")?;
    let rental_id = new_id();

    Statement::new(
        "INSERT INTO rentals (id, property_id, tenant_id, rent_amount, created_at) \
         VALUES (?, ?, ?, ?, ?)",
    )
    .bind(&rental_id)
    .bind(&property_id)
    .bind(&tenant_id)
    .bind(rent_amount)
    .bind(rented_at)
    .query()
    .execute(&mut *conn)
    .await
    .map_err(|e| Error::from(e).on_write("rental", &rental_id))?;

    Ok(RentalReceipt {
        rental_id,
        property_id,
        tenant_id,
        property_title,
        rent_amount,
        rented_at,
    })
}

impl<'a> RentalAllocator<'a> {
    pub fn new(exec: &'a QueryExecutor) -> Self {
        Self { exec }
    }

    /// Rent `property_id` to `tenant_id`.
    ///
    /// Fails with `NotFound` when the property does not exist and
    /// `NotAvailable` when it exists but was not AVAILABLE at the moment of
    /// the write. The ledger row is written in the same transaction, so a
    /// rejected tenant id leaves the property AVAILABLE.
    pub async fn rent(&self, property_id: &str, tenant_id: &str) -> Result<RentalReceipt> {
        let (pid, tid) = (property_id.to_owned(), tenant_id.to_owned());
        let outcome = self
            .exec
            .transaction(move |conn| claim(conn, pid, tid).boxed())
            .await;

        match &outcome {
            Ok(receipt) => info!(
                property_id,
                tenant_id,
                rental_id = %receipt.rental_id,
                "property rented"
            ),
            Err(err) => debug!(property_id, tenant_id, error = %err, "rental rejected"),
        }
        outcome
    }
}

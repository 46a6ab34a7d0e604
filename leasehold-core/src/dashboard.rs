//! Landlord dashboard and featured listings.

use serde::Serialize;
use sqlx::Row;

use crate::aggregate::Aggregator;
use crate::db::{QueryExecutor, Statement};
use crate::error::Result;
use crate::filter::{Pagination, PropertyFilter, SortOrder};
use crate::models::{PropertyCard, PropertyStatus};

/// Listings shown on the featured strip when no limit is given.
pub const DEFAULT_FEATURED_LIMIT: u32 = 8;

/// Recent listings shown on a landlord dashboard.
const RECENT_LIMIT: u32 = 5;

/// Portfolio summary for one landlord.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LandlordDashboard {
    pub landlord_id: String,
    pub total_properties: i64,
    pub rented: i64,
    pub available: i64,
    pub maintenance: i64,
    /// Sum of prices of RENTED listings
    pub monthly_revenue: f64,
    pub recent: Vec<PropertyCard>,
}

pub struct Dashboards<'a> {
    exec: &'a QueryExecutor,
}

impl<'a> Dashboards<'a> {
    pub fn new(exec: &'a QueryExecutor) -> Self {
        Self { exec }
    }

    /// Status counts and revenue in one aggregate query, plus the five
    /// newest listings as cards.
    pub async fn landlord(&self, landlord_id: &str) -> Result<LandlordDashboard> {
        let stmt = Statement::new(
            "SELECT \
                 CAST(COUNT(*) AS INTEGER) AS total, \
                 CAST(COALESCE(SUM(CASE WHEN status = ? THEN 1 ELSE 0 END), 0) AS INTEGER) AS rented, \
                 CAST(COALESCE(SUM(CASE WHEN status = ? THEN 1 ELSE 0 END), 0) AS INTEGER) AS available, \
                 CAST(COALESCE(SUM(CASE WHEN status = ? THEN 1 ELSE 0 END), 0) AS INTEGER) AS maintenance, \
                 CAST(COALESCE(SUM(CASE WHEN status = ? THEN price END), 0) AS REAL) AS revenue \
             FROM properties WHERE landlord_id = ?",
        )
        .bind(PropertyStatus::Rented.as_str())
        .bind(PropertyStatus::Available.as_str())
        .bind(PropertyStatus::Maintenance.as_str())
        .bind(PropertyStatus::Rented.as_str())
        .bind(landlord_id);

        let recent_filter = PropertyFilter::new()
            .with_landlord(landlord_id)
            .paginate(Pagination::new(1, RECENT_LIMIT));
        let aggregator = Aggregator::new(self.exec);

        let (counts, recent) = tokio::try_join!(
            self.exec.fetch_all(&stmt),
            aggregator.search_with_details(&recent_filter)
        )?;

        let (total, rented, available, maintenance, revenue) = match counts.first() {
            Some(row) => (
                row.try_get("total")?,
                row.try_get("rented")?,
                row.try_get("available")?,
                row.try_get("maintenance")?,
                row.try_get("revenue")?,
            ),
            None => (0, 0, 0, 0, 0.0),
        };

        Ok(LandlordDashboard {
            landlord_id: landlord_id.to_owned(),
            total_properties: total,
            rented,
            available,
            maintenance,
            monthly_revenue: revenue,
            recent: recent.into_iter().map(PropertyCard::from).collect(),
        })
    }

    /// Highest-priced AVAILABLE listings as cards.
    pub async fn featured(&self, limit: Option<u32>) -> Result<Vec<PropertyCard>> {
        let filter = PropertyFilter::new()
            .with_status(PropertyStatus::Available)
            .sorted_by(SortOrder::PriceHighToLow)
            .paginate(Pagination::new(1, limit.unwrap_or(DEFAULT_FEATURED_LIMIT)));
        let details = Aggregator::new(self.exec).search_with_details(&filter).await?;
        Ok(details.into_iter().map(PropertyCard::from).collect())
    }
}

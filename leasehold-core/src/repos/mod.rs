//! Repository implementations for catalog access
//!
//! Each repository follows these patterns:
//! - Borrows the shared `QueryExecutor`; never touches the pool directly
//! - Relies on store constraints and classifies rejections (no check-then-insert)
//! - Uses transactions for multi-step writes
//! - Returns plain domain values; row structs stay private to this module

pub mod favorites;
pub mod features;
pub mod images;
pub mod properties;
pub mod users;
pub mod visits;

pub use favorites::FavoriteRepo;
pub use features::FeatureRepo;
pub use images::ImageRepo;
pub use properties::PropertyRepo;
pub use users::UserRepo;
pub use visits::VisitRepo;

use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::FromRow;

use crate::error::{Error, Result};
use crate::models::{Feature, Property, PropertyImage};

/// Property columns under the `p` alias, in `PropertyRow` order.
pub(crate) const PROPERTY_COLUMNS: &str = "p.id, p.landlord_id, p.title, p.description, \
     p.location, p.price, p.bedrooms, p.bathrooms, p.area, p.status, p.created_at, p.updated_at";

#[derive(Debug, FromRow)]
pub(crate) struct PropertyRow {
    id: String,
    landlord_id: String,
    title: String,
    description: Option<String>,
    location: String,
    price: f64,
    bedrooms: i64,
    bathrooms: f64,
    area: Option<f64>,
    status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<PropertyRow> for Property {
    type Error = Error;

    fn try_from(row: PropertyRow) -> Result<Self> {
        Ok(Self {
            status: row.status.parse()?,
            id: row.id,
            landlord_id: row.landlord_id,
            title: row.title,
            description: row.description,
            location: row.location,
            price: row.price,
            bedrooms: row.bedrooms,
            bathrooms: row.bathrooms,
            area: row.area,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, FromRow)]
pub(crate) struct ImageRow {
    id: String,
    property_id: String,
    image_url: String,
    is_featured: bool,
    created_at: DateTime<Utc>,
}

impl TryFrom<ImageRow> for PropertyImage {
    type Error = Error;

    fn try_from(row: ImageRow) -> Result<Self> {
        Ok(Self {
            id: row.id,
            property_id: row.property_id,
            image_url: row.image_url,
            is_featured: row.is_featured,
            created_at: row.created_at,
        })
    }
}

#[derive(Debug, FromRow)]
pub(crate) struct FeatureRow {
    id: String,
    name: String,
    icon_name: String,
}

impl TryFrom<FeatureRow> for Feature {
    type Error = Error;

    fn try_from(row: FeatureRow) -> Result<Self> {
        Ok(Self {
            id: row.id,
            name: row.name,
            icon_name: row.icon_name,
        })
    }
}

/// Decode one row through its row struct.
pub(crate) fn decode<R, T>(row: &SqliteRow) -> Result<T>
where
    R: for<'r> FromRow<'r, SqliteRow>,
    T: TryFrom<R, Error = Error>,
{
    T::try_from(R::from_row(row)?)
}

/// Decode every row through its row struct.
pub(crate) fn decode_all<R, T>(rows: &[SqliteRow]) -> Result<Vec<T>>
where
    R: for<'r> FromRow<'r, SqliteRow>,
    T: TryFrom<R, Error = Error>,
{
    rows.iter().map(decode::<R, T>).collect()
}

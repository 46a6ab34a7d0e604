//! Property repository
//!
//! Handles listing CRUD with:
//! - Atomic creation together with images and feature links (transaction)
//! - Single-statement update that never touches child rows
//! - Single-statement delete; the store cascades to dependents

use chrono::Utc;
use futures::FutureExt;
use sqlx::SqliteConnection;

use super::{decode, decode_all, FeatureRow, PropertyRow, PROPERTY_COLUMNS};
use crate::db::{placeholders, QueryExecutor, SqlValue, Statement};
use crate::error::{Error, Result};
use crate::filter::PropertyFilter;
use crate::models::{
    new_id, Feature, NewImage, Property, PropertyDraft, PropertyImage, PropertyStatus,
    PropertyWithDetails,
};

/// Property repository
pub struct PropertyRepo<'a> {
    exec: &'a QueryExecutor,
}

fn insert_statement(property: &Property) -> Statement {
    Statement::new(
        "INSERT INTO properties (id, landlord_id, title, description, location, price, \
         bedrooms, bathrooms, area, status, created_at, updated_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&property.id)
    .bind(&property.landlord_id)
    .bind(&property.title)
    .bind(property.description.clone())
    .bind(&property.location)
    .bind(property.price)
    .bind(property.bedrooms)
    .bind(property.bathrooms)
    .bind(property.area)
    .bind(property.status.as_str())
    .bind(property.created_at)
    .bind(property.updated_at)
}

fn draft_into_property(landlord_id: &str, draft: PropertyDraft) -> Property {
    let now = Utc::now();
    Property {
        id: new_id(),
        landlord_id: landlord_id.to_owned(),
        title: draft.title,
        description: draft.description,
        location: draft.location,
        price: draft.price,
        bedrooms: draft.bedrooms,
        bathrooms: draft.bathrooms,
        area: draft.area,
        status: draft.status,
        created_at: now,
        updated_at: now,
    }
}

/// Images to store for a new listing. When none is flagged, the first one
/// becomes the featured image.
fn stage_images(property_id: &str, images: Vec<NewImage>) -> Vec<PropertyImage> {
    let any_featured = images.iter().any(|img| img.is_featured);
    images
        .into_iter()
        .enumerate()
        .map(|(i, img)| PropertyImage {
            id: new_id(),
            property_id: property_id.to_owned(),
            image_url: img.image_url,
            is_featured: img.is_featured || (!any_featured && i == 0),
            created_at: Utc::now(),
        })
        .collect()
}

pub(crate) fn image_insert_statement(image: &PropertyImage) -> Statement {
    Statement::new(
        "INSERT INTO property_images (id, property_id, image_url, is_featured, created_at) \
         VALUES (?, ?, ?, ?, ?)",
    )
    .bind(&image.id)
    .bind(&image.property_id)
    .bind(&image.image_url)
    .bind(image.is_featured)
    .bind(image.created_at)
}

/// One multi-row insert linking `feature_ids` to a property, or `None` when
/// there is nothing to link.
pub(crate) fn feature_links_statement(property_id: &str, feature_ids: &[String]) -> Option<Statement> {
    if feature_ids.is_empty() {
        return None;
    }
    let values = vec!["(?, ?)"; feature_ids.len()].join(", ");
    let params = feature_ids
        .iter()
        .flat_map(|fid| [SqlValue::from(property_id), SqlValue::from(fid)]);
    Some(
        Statement::new(format!(
            "INSERT INTO property_features (property_id, feature_id) VALUES {values}"
        ))
        .bind_all(params),
    )
}

async fn insert_with_children(
    conn: &mut SqliteConnection,
    property: Property,
    images: Vec<PropertyImage>,
    feature_ids: Vec<String>,
) -> Result<PropertyWithDetails> {
    insert_statement(&property)
        .query()
        .execute(&mut *conn)
        .await
        .map_err(|e| Error::from(e).on_write("property", &property.id))?;

    for image in &images {
        image_insert_statement(image)
            .query()
            .execute(&mut *conn)
            .await
            .map_err(|e| Error::from(e).on_write("image", &image.image_url))?;
    }

    let Some(links) = feature_links_statement(&property.id, &feature_ids) else {
        return Ok(PropertyWithDetails {
            property,
            images,
            features: Vec::new(),
        });
    };
    links
        .query()
        .execute(&mut *conn)
        .await
        .map_err(|e| Error::from(e).on_write("feature link", feature_ids.join(",")))?;

    let rows = Statement::new(
        "SELECT f.id, f.name, f.icon_name FROM property_features pf \
         JOIN features f ON f.id = pf.feature_id \
         WHERE pf.property_id = ? ORDER BY f.name",
    )
    .bind(&property.id)
    .query()
    .fetch_all(&mut *conn)
    .await?;

    Ok(PropertyWithDetails {
        property,
        images,
        features: decode_all::<FeatureRow, Feature>(&rows)?,
    })
}

impl<'a> PropertyRepo<'a> {
    pub fn new(exec: &'a QueryExecutor) -> Self {
        Self { exec }
    }

    /// Insert a listing owned by `landlord_id`.
    pub async fn create(&self, landlord_id: &str, draft: PropertyDraft) -> Result<Property> {
        draft.validate()?;
        let property = draft_into_property(landlord_id, draft);
        self.exec
            .execute(&insert_statement(&property))
            .await
            .map_err(|e| e.on_write("property", &property.id))?;
        Ok(property)
    }

    /// Create a listing together with its images and feature links (atomic).
    ///
    /// Any failed child insert rolls the property back, so a listing is never
    /// left half-created.
    pub async fn create_with_children(
        &self,
        landlord_id: &str,
        draft: PropertyDraft,
        images: Vec<NewImage>,
        feature_ids: Vec<String>,
    ) -> Result<PropertyWithDetails> {
        draft.validate()?;
        let property = draft_into_property(landlord_id, draft);
        let images = stage_images(&property.id, images);

        self.exec
            .transaction(move |conn| {
                insert_with_children(conn, property, images, feature_ids).boxed()
            })
            .await
    }

    pub async fn get(&self, id: &str) -> Result<Property> {
        let stmt = Statement::new(format!(
            "SELECT {PROPERTY_COLUMNS} FROM properties p WHERE p.id = ?"
        ))
        .bind(id);
        let row = self
            .exec
            .fetch_optional(&stmt)
            .await?
            .ok_or_else(|| Error::not_found("property", id))?;
        decode::<PropertyRow, Property>(&row)
    }

    /// Fetch a listing, failing with `Forbidden` unless `landlord_id` owns it.
    pub async fn ensure_owned_by(&self, id: &str, landlord_id: &str) -> Result<Property> {
        let property = self.get(id).await?;
        if property.landlord_id != landlord_id {
            return Err(Error::forbidden("property", id));
        }
        Ok(property)
    }

    /// Overwrite the listing fields and stamp `updated_at`.
    ///
    /// Images, features and favorites are left exactly as they were.
    pub async fn update(&self, id: &str, draft: PropertyDraft) -> Result<Property> {
        draft.validate()?;
        let stmt = Statement::new(
            "UPDATE properties SET title = ?, description = ?, location = ?, price = ?, \
             bedrooms = ?, bathrooms = ?, area = ?, status = ?, updated_at = ? WHERE id = ?",
        )
        .bind(draft.title)
        .bind(draft.description)
        .bind(draft.location)
        .bind(draft.price)
        .bind(draft.bedrooms)
        .bind(draft.bathrooms)
        .bind(draft.area)
        .bind(draft.status.as_str())
        .bind(Utc::now())
        .bind(id);

        let affected = self
            .exec
            .execute(&stmt)
            .await
            .map_err(|e| e.on_write("property", id))?;
        if affected == 0 {
            return Err(Error::not_found("property", id));
        }
        self.get(id).await
    }

    /// Unconditional status change (landlord edits). Renting goes through
    /// [`crate::rental::RentalAllocator`] instead.
    pub async fn set_status(&self, id: &str, status: PropertyStatus) -> Result<()> {
        let stmt = Statement::new("UPDATE properties SET status = ?, updated_at = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(Utc::now())
            .bind(id);
        if self.exec.execute(&stmt).await? == 0 {
            return Err(Error::not_found("property", id));
        }
        Ok(())
    }

    /// Delete a listing. Images, feature links, favorites, visits and
    /// rentals go with it through the store's cascades.
    pub async fn delete(&self, id: &str) -> Result<()> {
        let stmt = Statement::new("DELETE FROM properties WHERE id = ?").bind(id);
        let affected = self
            .exec
            .execute(&stmt)
            .await
            .map_err(|e| e.on_write("property", id))?;
        if affected == 0 {
            return Err(Error::not_found("property", id));
        }
        Ok(())
    }

    /// Listings matching `filter`, in the filter's sort order.
    pub async fn search(&self, filter: &PropertyFilter) -> Result<Vec<Property>> {
        let rows = self.exec.fetch_all(&filter.to_statement(PROPERTY_COLUMNS)).await?;
        decode_all::<PropertyRow, Property>(&rows)
    }

    /// Listings whose id is in `ids`, newest first. Unknown ids are skipped.
    pub async fn list_by_ids(&self, ids: &[String]) -> Result<Vec<Property>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let stmt = Statement::new(format!(
            "SELECT {PROPERTY_COLUMNS} FROM properties p WHERE p.id IN ({}) \
             ORDER BY p.created_at DESC, p.rowid DESC",
            placeholders(ids.len())
        ))
        .bind_all(ids.iter().map(SqlValue::from));
        let rows = self.exec.fetch_all(&stmt).await?;
        decode_all::<PropertyRow, Property>(&rows)
    }
}

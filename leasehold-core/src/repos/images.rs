//! Property image repository
//!
//! Image bytes live elsewhere; only the URL and the featured flag are stored.

use chrono::Utc;
use futures::FutureExt;
use sqlx::SqliteConnection;

use super::properties::image_insert_statement;
use super::{decode_all, ImageRow};
use crate::db::{QueryExecutor, Statement};
use crate::error::{Error, Result};
use crate::models::{new_id, NewImage, PropertyImage};

const IMAGE_COLUMNS: &str = "id, property_id, image_url, is_featured, created_at";

/// Image repository
pub struct ImageRepo<'a> {
    exec: &'a QueryExecutor,
}

impl<'a> ImageRepo<'a> {
    pub fn new(exec: &'a QueryExecutor) -> Self {
        Self { exec }
    }

    /// Attach an image to an existing property.
    pub async fn add(&self, property_id: &str, image: NewImage) -> Result<PropertyImage> {
        if image.image_url.trim().is_empty() {
            return Err(Error::validation("image_url", "must not be empty"));
        }
        let image = PropertyImage {
            id: new_id(),
            property_id: property_id.to_owned(),
            image_url: image.image_url,
            is_featured: image.is_featured,
            created_at: Utc::now(),
        };
        self.exec
            .execute(&image_insert_statement(&image))
            .await
            .map_err(|e| e.on_write("image", &image.image_url))?;
        Ok(image)
    }

    /// Images of one property in upload order.
    pub async fn list_for_property(&self, property_id: &str) -> Result<Vec<PropertyImage>> {
        let stmt = Statement::new(format!(
            "SELECT {IMAGE_COLUMNS} FROM property_images WHERE property_id = ? \
             ORDER BY created_at ASC, rowid ASC"
        ))
        .bind(property_id);
        let rows = self.exec.fetch_all(&stmt).await?;
        decode_all::<ImageRow, PropertyImage>(&rows)
    }

    pub async fn delete(&self, image_id: &str) -> Result<()> {
        let stmt = Statement::new("DELETE FROM property_images WHERE id = ?").bind(image_id);
        if self.exec.execute(&stmt).await? == 0 {
            return Err(Error::not_found("image", image_id));
        }
        Ok(())
    }

    /// Make `image_id` the only featured image of its property (atomic).
    pub async fn set_featured(&self, property_id: &str, image_id: &str) -> Result<()> {
        let (property_id, image_id) = (property_id.to_owned(), image_id.to_owned());
        self.exec
            .transaction(move |conn| feature_exclusively(conn, property_id, image_id).boxed())
            .await
    }
}

async fn feature_exclusively(
    conn: &mut SqliteConnection,
    property_id: String,
    image_id: String,
) -> Result<()> {
    let marked = Statement::new(
        "UPDATE property_images SET is_featured = 1 WHERE id = ? AND property_id = ?",
    )
    .bind(&image_id)
    .bind(&property_id)
    .query()
    .execute(&mut *conn)
    .await?
    .rows_affected();
    if marked == 0 {
        return Err(Error::not_found("image", image_id));
    }

    Statement::new("UPDATE property_images SET is_featured = 0 WHERE property_id = ? AND id <> ?")
        .bind(&property_id)
        .bind(&image_id)
        .query()
        .execute(&mut *conn)
        .await?;
    Ok(())
}

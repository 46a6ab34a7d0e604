//! Bulk aggregation of property children.
//!
//! Composite reads fetch the parent properties first, then every image and
//! every feature link for the whole parent set with one `IN (…)` query per
//! child type, and join in memory. A page of `n` properties therefore costs
//! three statements, never `2n + 1`.

use std::collections::HashMap;

use sqlx::FromRow;

use crate::db::{placeholders, QueryExecutor, SqlValue, Statement};
use crate::error::{Error, Result};
use crate::filter::PropertyFilter;
use crate::models::{Feature, Property, PropertyFeature, PropertyImage, PropertyWithDetails};
use crate::repos::{decode_all, ImageRow, PropertyRepo};

#[derive(Debug, FromRow)]
struct PropertyFeatureRow {
    property_id: String,
    id: String,
    name: String,
    icon_name: String,
}

impl TryFrom<PropertyFeatureRow> for PropertyFeature {
    type Error = Error;

    fn try_from(row: PropertyFeatureRow) -> Result<Self> {
        Ok(Self {
            property_id: row.property_id,
            feature: Feature {
                id: row.id,
                name: row.name,
                icon_name: row.icon_name,
            },
        })
    }
}

/// Distinct ids in first-seen order.
fn distinct(ids: &[String]) -> Vec<&String> {
    let mut seen = std::collections::HashSet::with_capacity(ids.len());
    ids.iter().filter(|id| seen.insert(id.as_str())).collect()
}

/// Group flat child sets onto their parents, preserving parent order.
///
/// Parent ids are expected to be unique, as they are when read back from the
/// store. Children whose parent is not in `parents` are ignored; parents without
/// children get empty lists.
pub fn attach(
    parents: Vec<Property>,
    images: Vec<PropertyImage>,
    features: Vec<PropertyFeature>,
) -> Vec<PropertyWithDetails> {
    let mut images_by_parent: HashMap<String, Vec<PropertyImage>> = HashMap::new();
    for image in images {
        images_by_parent
            .entry(image.property_id.clone())
            .or_default()
            .push(image);
    }

    let mut features_by_parent: HashMap<String, Vec<Feature>> = HashMap::new();
    for link in features {
        features_by_parent
            .entry(link.property_id)
            .or_default()
            .push(link.feature);
    }

    parents
        .into_iter()
        .map(|property| PropertyWithDetails {
            images: images_by_parent.remove(&property.id).unwrap_or_default(),
            features: features_by_parent.remove(&property.id).unwrap_or_default(),
            property,
        })
        .collect()
}

/// Composes properties with their images and features.
pub struct Aggregator<'a> {
    exec: &'a QueryExecutor,
}

impl<'a> Aggregator<'a> {
    pub fn new(exec: &'a QueryExecutor) -> Self {
        Self { exec }
    }

    /// Every image of every property in `property_ids`, in one query.
    ///
    /// An empty id set returns immediately without touching the store.
    pub async fn bulk_fetch_images(&self, property_ids: &[String]) -> Result<Vec<PropertyImage>> {
        let ids = distinct(property_ids);
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let stmt = Statement::new(format!(
            "SELECT id, property_id, image_url, is_featured, created_at \
             FROM property_images WHERE property_id IN ({}) \
             ORDER BY created_at ASC, rowid ASC",
            placeholders(ids.len())
        ))
        .bind_all(ids.into_iter().map(SqlValue::from));
        let rows = self.exec.fetch_all(&stmt).await?;
        decode_all::<ImageRow, PropertyImage>(&rows)
    }

    /// Every feature link of every property in `property_ids`, in one query.
    pub async fn bulk_fetch_features(&self, property_ids: &[String]) -> Result<Vec<PropertyFeature>> {
        let ids = distinct(property_ids);
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let stmt = Statement::new(format!(
            "SELECT pf.property_id, f.id, f.name, f.icon_name \
             FROM property_features pf JOIN features f ON f.id = pf.feature_id \
             WHERE pf.property_id IN ({}) ORDER BY f.name",
            placeholders(ids.len())
        ))
        .bind_all(ids.into_iter().map(SqlValue::from));
        let rows = self.exec.fetch_all(&stmt).await?;
        decode_all::<PropertyFeatureRow, PropertyFeature>(&rows)
    }

    /// Attach children to already-fetched parents. Both child queries run
    /// concurrently; if either fails the whole call fails.
    pub async fn with_details(&self, parents: Vec<Property>) -> Result<Vec<PropertyWithDetails>> {
        let ids: Vec<String> = parents.iter().map(|p| p.id.clone()).collect();
        let (images, features) =
            tokio::try_join!(self.bulk_fetch_images(&ids), self.bulk_fetch_features(&ids))?;
        Ok(attach(parents, images, features))
    }

    pub async fn search_with_details(&self, filter: &PropertyFilter) -> Result<Vec<PropertyWithDetails>> {
        let parents = PropertyRepo::new(self.exec).search(filter).await?;
        self.with_details(parents).await
    }

    pub async fn get_with_details(&self, property_id: &str) -> Result<PropertyWithDetails> {
        let parent = PropertyRepo::new(self.exec).get(property_id).await?;
        self.with_details(vec![parent])
            .await?
            .pop()
            .ok_or_else(|| Error::not_found("property", property_id))
    }

    /// A tenant's favorites with their children, most recent first.
    pub async fn favorites_with_details(&self, tenant_id: &str) -> Result<Vec<PropertyWithDetails>> {
        let parents = crate::repos::FavoriteRepo::new(self.exec)
            .list_for_tenant(tenant_id)
            .await?;
        self.with_details(parents).await
    }
}

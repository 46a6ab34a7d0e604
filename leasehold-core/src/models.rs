//! Domain records handed to callers.
//!
//! These are plain values: no row handles or driver types leak out of the
//! repositories. Row structs live next to the queries that produce them.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Image URL returned when a property has no featured image.
pub const PLACEHOLDER_IMAGE: &str = "/placeholder.svg";

/// Mint a fresh entity id before insert.
pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

macro_rules! text_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "UPPERCASE")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $text),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = Error;

            fn from_str(s: &str) -> Result<Self> {
                match s.trim().to_ascii_uppercase().as_str() {
                    $($text => Ok(Self::$variant),)+
                    other => Err(Error::validation(
                        stringify!($name),
                        format!("unknown value '{other}'"),
                    )),
                }
            }
        }
    };
}

text_enum! {
    /// Account role
    Role {
        Landlord => "LANDLORD",
        Tenant => "TENANT",
    }
}

text_enum! {
    /// Listing status. Only AVAILABLE → RENTED is guarded (see `rental`).
    PropertyStatus {
        Available => "AVAILABLE",
        Rented => "RENTED",
        Maintenance => "MAINTENANCE",
    }
}

text_enum! {
    VisitStatus {
        Pending => "PENDING",
        Confirmed => "CONFIRMED",
        Completed => "COMPLETED",
        Cancelled => "CANCELLED",
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub email: String,
    pub role: Role,
    pub name: String,
    pub phone: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewUser {
    pub email: String,
    pub role: Role,
    pub name: String,
    pub phone: Option<String>,
}

/// Profile fields a user may change. `None` leaves the column untouched;
/// `phone: Some(None)` clears the phone number.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileUpdate {
    pub name: Option<String>,
    pub phone: Option<Option<String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Property {
    pub id: String,
    pub landlord_id: String,
    pub title: String,
    pub description: Option<String>,
    pub location: String,
    pub price: f64,
    pub bedrooms: i64,
    pub bathrooms: f64,
    pub area: Option<f64>,
    pub status: PropertyStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Mutable listing fields, shared by create and update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyDraft {
    pub title: String,
    pub description: Option<String>,
    pub location: String,
    pub price: f64,
    pub bedrooms: i64,
    pub bathrooms: f64,
    pub area: Option<f64>,
    pub status: PropertyStatus,
}

impl PropertyDraft {
    /// Check listing invariants before they reach the store.
    pub fn validate(&self) -> Result<()> {
        if self.title.trim().is_empty() {
            return Err(Error::validation("title", "must not be empty"));
        }
        if self.location.trim().is_empty() {
            return Err(Error::validation("location", "must not be empty"));
        }
        if !(self.price.is_finite() && self.price > 0.0) {
            return Err(Error::validation("price", "must be positive"));
        }
        if self.bedrooms < 0 {
            return Err(Error::validation("bedrooms", "must not be negative"));
        }
        if !(self.bathrooms.is_finite() && self.bathrooms >= 0.0) {
            return Err(Error::validation("bathrooms", "must not be negative"));
        }
        if (self.bathrooms * 2.0).fract() != 0.0 {
            return Err(Error::validation("bathrooms", "must be a multiple of 0.5"));
        }
        if let Some(area) = self.area {
            if !(area.is_finite() && area > 0.0) {
                return Err(Error::validation("area", "must be positive when present"));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyImage {
    pub id: String,
    pub property_id: String,
    pub image_url: String,
    pub is_featured: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewImage {
    pub image_url: String,
    pub is_featured: bool,
}

/// Shared amenity catalog entry
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Feature {
    pub id: String,
    pub name: String,
    pub icon_name: String,
}

/// A feature together with the property it was fetched for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyFeature {
    pub property_id: String,
    pub feature: Feature,
}

/// Property with its images and features attached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyWithDetails {
    #[serde(flatten)]
    pub property: Property,
    pub images: Vec<PropertyImage>,
    pub features: Vec<Feature>,
}

impl PropertyWithDetails {
    /// First featured image, or the placeholder when none is featured.
    pub fn primary_image(&self) -> &str {
        primary_image_url(&self.images)
    }
}

/// First featured image URL, or [`PLACEHOLDER_IMAGE`].
///
/// Position in the slice is not meaningful; only the flag is.
pub fn primary_image_url(images: &[PropertyImage]) -> &str {
    images
        .iter()
        .find(|img| img.is_featured)
        .map(|img| img.image_url.as_str())
        .unwrap_or(PLACEHOLDER_IMAGE)
}

/// Listing summary used by dashboards and featured listings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyCard {
    pub id: String,
    pub title: String,
    pub location: String,
    pub price: f64,
    pub bedrooms: i64,
    pub bathrooms: f64,
    pub area: Option<f64>,
    pub status: PropertyStatus,
    pub image: String,
    pub features: Vec<Feature>,
}

impl From<PropertyWithDetails> for PropertyCard {
    fn from(details: PropertyWithDetails) -> Self {
        let image = details.primary_image().to_owned();
        let p = details.property;
        Self {
            id: p.id,
            title: p.title,
            location: p.location,
            price: p.price,
            bedrooms: p.bedrooms,
            bathrooms: p.bathrooms,
            area: p.area,
            status: p.status,
            image,
            features: details.features,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewVisit {
    pub tenant_id: String,
    pub property_id: String,
    pub visit_date: String,
    pub message: Option<String>,
}

/// Visit request joined with tenant contact and property fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VisitDetails {
    pub id: String,
    pub tenant_id: String,
    pub tenant_name: String,
    pub tenant_email: String,
    pub tenant_phone: Option<String>,
    pub property_id: String,
    pub property_title: String,
    pub property_location: String,
    pub landlord_id: String,
    pub visit_date: String,
    pub message: String,
    pub status: VisitStatus,
    pub created_at: DateTime<Utc>,
}

/// Outcome of a successful AVAILABLE → RENTED transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RentalReceipt {
    pub rental_id: String,
    pub property_id: String,
    pub tenant_id: String,
    pub property_title: String,
    pub rent_amount: f64,
    pub rented_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft() -> PropertyDraft {
        PropertyDraft {
            title: "Loft".into(),
            description: None,
            location: "Downtown".into(),
            price: 1800.0,
            bedrooms: 1,
            bathrooms: 1.5,
            area: Some(70.0),
            status: PropertyStatus::Available,
        }
    }

    fn image(url: &str, featured: bool) -> PropertyImage {
        PropertyImage {
            id: new_id(),
            property_id: "p".into(),
            image_url: url.into(),
            is_featured: featured,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn status_round_trips_through_text() {
        for status in [
            PropertyStatus::Available,
            PropertyStatus::Rented,
            PropertyStatus::Maintenance,
        ] {
            assert_eq!(status.as_str().parse::<PropertyStatus>().unwrap(), status);
        }
        assert_eq!("rented".parse::<PropertyStatus>().unwrap(), PropertyStatus::Rented);
        assert!("SOLD".parse::<PropertyStatus>().is_err());
    }

    #[test]
    fn draft_validation() {
        assert!(draft().validate().is_ok());

        let mut bad = draft();
        bad.price = 0.0;
        assert!(matches!(bad.validate(), Err(Error::Validation { field: "price", .. })));

        let mut bad = draft();
        bad.bathrooms = 1.25;
        assert!(matches!(bad.validate(), Err(Error::Validation { field: "bathrooms", .. })));

        let mut bad = draft();
        bad.area = Some(-3.0);
        assert!(bad.validate().is_err());

        let mut ok = draft();
        ok.bedrooms = 0;
        ok.area = None;
        assert!(ok.validate().is_ok());
    }

    #[test]
    fn primary_image_prefers_featured_flag_over_position() {
        let images = vec![image("/a.jpg", false), image("/b.jpg", true), image("/c.jpg", true)];
        assert_eq!(primary_image_url(&images), "/b.jpg");
    }

    #[test]
    fn primary_image_falls_back_to_placeholder() {
        assert_eq!(primary_image_url(&[]), PLACEHOLDER_IMAGE);
        assert_eq!(primary_image_url(&[image("/a.jpg", false)]), PLACEHOLDER_IMAGE);
    }
}

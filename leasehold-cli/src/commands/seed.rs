//! Demo data seeding
//!
//! Re-running is safe: existing users and features are reused, and listings
//! are only added for a landlord that has none yet.

use anyhow::{Context, Result};
use leasehold_core::{
    Catalog, Error, NewImage, NewUser, PropertyDraft, PropertyFilter, PropertyStatus, Role, User,
};
use serde::Serialize;
use tracing::info;

use super::print_json;

const DEMO_FEATURES: &[(&str, &str)] = &[
    ("Pool", "waves"),
    ("Parking", "car"),
    ("Gym", "dumbbell"),
    ("Balcony", "sun"),
];

/// (title, location, price, bedrooms, bathrooms, status)
const DEMO_LISTINGS: &[(&str, &str, f64, i64, f64, PropertyStatus)] = &[
    ("Sunny Downtown Loft", "Downtown", 2500.0, 2, 1.5, PropertyStatus::Available),
    ("Harbor View Studio", "Harbor District", 1400.0, 0, 1.0, PropertyStatus::Available),
    ("Family House", "Maple Grove", 3200.0, 4, 2.5, PropertyStatus::Available),
    ("Garden Flat", "Old Town", 1750.0, 1, 1.0, PropertyStatus::Maintenance),
    ("Downtown Penthouse", "Downtown", 5400.0, 3, 2.0, PropertyStatus::Available),
];

#[derive(Debug, Serialize)]
struct SeedSummary {
    landlord_id: String,
    tenant_id: String,
    features: usize,
    listings_created: usize,
}

async fn ensure_user(catalog: &Catalog, new: NewUser) -> Result<User> {
    let email = new.email.clone();
    match catalog.users().create(new).await {
        Ok(user) => Ok(user),
        Err(Error::AlreadyExists { .. }) => catalog
            .users()
            .find_by_email(&email)
            .await?
            .with_context(|| format!("user {email} vanished during seeding")),
        Err(err) => Err(err.into()),
    }
}

pub async fn run_seed_demo(catalog: &Catalog) -> Result<()> {
    let landlord = ensure_user(
        catalog,
        NewUser {
            email: "landlord@leasehold.test".into(),
            role: Role::Landlord,
            name: "Demo Landlord".into(),
            phone: Some("555-0100".into()),
        },
    )
    .await?;
    let tenant = ensure_user(
        catalog,
        NewUser {
            email: "tenant@leasehold.test".into(),
            role: Role::Tenant,
            name: "Demo Tenant".into(),
            phone: None,
        },
    )
    .await?;

    for (name, icon) in DEMO_FEATURES {
        match catalog.features().create(name, icon).await {
            Ok(_) | Err(Error::AlreadyExists { .. }) => {}
            Err(err) => return Err(err).context("failed to seed features"),
        }
    }
    let features = catalog.features().list_all().await?;

    let existing = catalog
        .properties()
        .search(&PropertyFilter::new().with_landlord(&landlord.id))
        .await?;

    let mut listings_created = 0;
    if existing.is_empty() {
        for (i, (title, location, price, bedrooms, bathrooms, status)) in
            DEMO_LISTINGS.iter().enumerate()
        {
            let draft = PropertyDraft {
                title: (*title).to_string(),
                description: Some(format!("{title} in {location}")),
                location: (*location).to_string(),
                price: *price,
                bedrooms: *bedrooms,
                bathrooms: *bathrooms,
                area: Some(45.0 + 20.0 * *bedrooms as f64),
                status: *status,
            };
            let images = vec![
                NewImage {
                    image_url: format!("/images/demo-{i}-front.jpg"),
                    is_featured: true,
                },
                NewImage {
                    image_url: format!("/images/demo-{i}-kitchen.jpg"),
                    is_featured: false,
                },
            ];
            // Each listing gets a rotating pair of features
            let feature_ids = features
                .iter()
                .cycle()
                .skip(i)
                .take(2.min(features.len()))
                .map(|f| f.id.clone())
                .collect();

            catalog
                .properties()
                .create_with_children(&landlord.id, draft, images, feature_ids)
                .await
                .with_context(|| format!("failed to seed listing {title}"))?;
            listings_created += 1;
        }
    }

    info!(listings_created, "demo data ready");
    print_json(&SeedSummary {
        landlord_id: landlord.id,
        tenant_id: tenant.id,
        features: features.len(),
        listings_created,
    })
}

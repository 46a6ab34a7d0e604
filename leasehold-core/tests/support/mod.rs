//! Shared fixtures for catalog integration tests.
#![allow(dead_code)]

use std::ops::Deref;

use leasehold_core::{
    Catalog, CatalogConfig, NewUser, PropertyDraft, PropertyStatus, Role, User,
};
use tempfile::TempDir;

/// A catalog backed by a throwaway SQLite file.
pub struct TestCatalog {
    catalog: Catalog,
    _dir: TempDir,
}

impl Deref for TestCatalog {
    type Target = Catalog;

    fn deref(&self) -> &Catalog {
        &self.catalog
    }
}

impl TestCatalog {
    pub fn handle(&self) -> Catalog {
        self.catalog.clone()
    }
}

pub async fn open() -> TestCatalog {
    open_with(|config| config).await
}

pub async fn open_with(tweak: impl FnOnce(CatalogConfig) -> CatalogConfig) -> TestCatalog {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("leasehold_core=debug")
        .with_test_writer()
        .try_init();

    let dir = tempfile::tempdir().unwrap();
    let url = format!("sqlite://{}", dir.path().join("catalog.db").display());
    let catalog = Catalog::open(tweak(CatalogConfig::new(url))).await.unwrap();
    TestCatalog {
        catalog,
        _dir: dir,
    }
}

pub async fn user(catalog: &Catalog, name: &str, role: Role) -> User {
    catalog
        .users()
        .create(NewUser {
            email: format!("{}@example.com", name.to_lowercase()),
            role,
            name: name.to_string(),
            phone: None,
        })
        .await
        .unwrap()
}

pub async fn landlord(catalog: &Catalog) -> User {
    user(catalog, "Lena", Role::Landlord).await
}

pub async fn tenant(catalog: &Catalog, name: &str) -> User {
    user(catalog, name, Role::Tenant).await
}

pub fn draft(title: &str, location: &str, price: f64, bedrooms: i64, bathrooms: f64) -> PropertyDraft {
    PropertyDraft {
        title: title.to_string(),
        description: Some(format!("{title} in {location}")),
        location: location.to_string(),
        price,
        bedrooms,
        bathrooms,
        area: Some(80.0),
        status: PropertyStatus::Available,
    }
}

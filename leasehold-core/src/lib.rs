//! Catalog data-access layer for a property-rental application.
//!
//! Handlers get plain domain values back from a bounded, retrying
//! connection pool. Composite reads are assembled with bulk child fetches,
//! and renting a property is a single guarded state transition.

pub mod aggregate;
pub mod catalog;
pub mod config;
pub mod dashboard;
pub mod db;
pub mod error;
pub mod filter;
pub mod models;
pub mod rental;
pub mod repos;

pub use aggregate::{attach, Aggregator};
pub use catalog::Catalog;
pub use config::{CatalogConfig, MonitorConfig, PoolConfig, RetryConfig};
pub use dashboard::{Dashboards, LandlordDashboard, DEFAULT_FEATURED_LIMIT};
pub use error::{Error, Result};
pub use filter::{BedroomsFilter, Pagination, Predicate, PropertyFilter, RawFilterParams, SortOrder};
pub use models::{
    Feature, NewImage, NewUser, NewVisit, ProfileUpdate, Property, PropertyCard, PropertyDraft,
    PropertyFeature, PropertyImage, PropertyStatus, PropertyWithDetails, RentalReceipt, Role, User,
    VisitDetails, VisitStatus, PLACEHOLDER_IMAGE,
};
pub use rental::RentalAllocator;

//! Catalog read commands and the rent transition
//!
//! Filter flags are taken as raw strings and parsed leniently by the
//! library, so a malformed value is ignored rather than rejected.

use anyhow::{Context, Result};
use clap::Parser;
use leasehold_core::{Catalog, PropertyFilter, RawFilterParams};

use super::print_json;

#[derive(Parser, Debug)]
pub struct SearchArgs {
    /// AVAILABLE, RENTED or MAINTENANCE
    #[arg(long)]
    pub status: Option<String>,

    /// Only listings owned by this landlord id
    #[arg(long)]
    pub landlord: Option<String>,

    /// Case-insensitive location substring
    #[arg(long)]
    pub location: Option<String>,

    #[arg(long)]
    pub min_price: Option<String>,

    #[arg(long)]
    pub max_price: Option<String>,

    /// Exact count, or "4+" for four or more
    #[arg(long)]
    pub bedrooms: Option<String>,

    /// Minimum bathrooms (half steps allowed)
    #[arg(long)]
    pub bathrooms: Option<String>,

    /// newest, price_desc or price_asc
    #[arg(long)]
    pub sort: Option<String>,

    #[arg(long)]
    pub page: Option<String>,

    #[arg(long)]
    pub per_page: Option<String>,
}

impl From<SearchArgs> for RawFilterParams {
    fn from(args: SearchArgs) -> Self {
        Self {
            status: args.status,
            landlord_id: args.landlord,
            location: args.location,
            min_price: args.min_price,
            max_price: args.max_price,
            bedrooms: args.bedrooms,
            bathrooms: args.bathrooms,
            sort: args.sort,
            page: args.page,
            per_page: args.per_page,
        }
    }
}

#[derive(Parser, Debug)]
pub struct ShowArgs {
    /// Property id
    pub id: String,
}

#[derive(Parser, Debug)]
pub struct RentArgs {
    /// Property id
    pub property_id: String,

    /// Tenant user id
    #[arg(long)]
    pub tenant: String,
}

#[derive(Parser, Debug)]
pub struct DashboardArgs {
    /// Landlord user id
    pub landlord_id: String,
}

#[derive(Parser, Debug)]
pub struct FeaturedArgs {
    /// Number of listings (default 8)
    #[arg(long)]
    pub limit: Option<u32>,
}

pub async fn run_search(catalog: &Catalog, args: SearchArgs) -> Result<()> {
    let filter = PropertyFilter::from_raw(&args.into());
    let results = catalog
        .aggregator()
        .search_with_details(&filter)
        .await
        .context("search failed")?;
    print_json(&results)
}

pub async fn run_show(catalog: &Catalog, args: ShowArgs) -> Result<()> {
    let details = catalog
        .aggregator()
        .get_with_details(&args.id)
        .await
        .with_context(|| format!("failed to load property {}", args.id))?;
    print_json(&details)
}

pub async fn run_rent(catalog: &Catalog, args: RentArgs) -> Result<()> {
    let receipt = catalog
        .rentals()
        .rent(&args.property_id, &args.tenant)
        .await
        .with_context(|| format!("failed to rent property {}", args.property_id))?;
    print_json(&receipt)
}

pub async fn run_dashboard(catalog: &Catalog, args: DashboardArgs) -> Result<()> {
    let dashboard = catalog
        .dashboards()
        .landlord(&args.landlord_id)
        .await
        .context("failed to build dashboard")?;
    print_json(&dashboard)
}

pub async fn run_featured(catalog: &Catalog, args: FeaturedArgs) -> Result<()> {
    let cards = catalog
        .dashboards()
        .featured(args.limit)
        .await
        .context("failed to load featured listings")?;
    print_json(&cards)
}

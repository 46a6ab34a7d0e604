//! Property search filters.
//!
//! [`PropertyFilter`] is a sparse set of optional criteria. Building the
//! predicate folds over the present fields only; every value becomes a bound
//! parameter and the SQL text is assembled from fixed fragments.

use serde::{Deserialize, Serialize};

use crate::db::{SqlValue, Statement};
use crate::models::PropertyStatus;

/// Maximum items per page
const MAX_PER_PAGE: u32 = 100;

/// Default items per page
const DEFAULT_PER_PAGE: u32 = 20;

/// Pagination parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    /// Page number (1-indexed)
    pub page: u32,
    /// Items per page (max 100)
    pub per_page: u32,
}

impl Pagination {
    /// Create pagination with validation.
    ///
    /// - Page is clamped to minimum of 1
    /// - Per page is clamped to 1..=100
    pub fn new(page: u32, per_page: u32) -> Self {
        Self {
            page: page.max(1),
            per_page: per_page.clamp(1, MAX_PER_PAGE),
        }
    }

    /// Calculate SQL OFFSET value.
    pub fn offset(&self) -> i64 {
        i64::from(self.page - 1) * i64::from(self.per_page)
    }

    /// Get LIMIT value.
    pub fn limit(&self) -> i64 {
        i64::from(self.per_page)
    }
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            page: 1,
            per_page: DEFAULT_PER_PAGE,
        }
    }
}

/// Bedroom criterion. `"4+"` means four or more; a bare integer is exact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BedroomsFilter {
    Exactly(i64),
    AtLeast(i64),
}

impl BedroomsFilter {
    /// Parse a raw criterion. Non-numeric or negative input yields `None`.
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        if let Some(n) = raw.strip_suffix('+') {
            let n: i64 = n.trim().parse().ok()?;
            return (n >= 0).then_some(Self::AtLeast(n));
        }
        let n: i64 = raw.parse().ok()?;
        (n >= 0).then_some(Self::Exactly(n))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    /// Creation time, newest first
    #[default]
    Newest,
    PriceHighToLow,
    PriceLowToHigh,
}

impl SortOrder {
    /// Lenient parse; unknown values fall back to `Newest`.
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "price_desc" | "price_high_to_low" => Self::PriceHighToLow,
            "price_asc" | "price_low_to_high" => Self::PriceLowToHigh,
            _ => Self::Newest,
        }
    }

    /// ORDER BY clause for the `p` alias. Insertion order breaks ties so
    /// results stay deterministic.
    pub fn order_by(&self) -> &'static str {
        match self {
            Self::Newest => "p.created_at DESC, p.rowid DESC",
            Self::PriceHighToLow => "p.price DESC, p.created_at DESC, p.rowid DESC",
            Self::PriceLowToHigh => "p.price ASC, p.created_at DESC, p.rowid DESC",
        }
    }
}

/// Search criteria exactly as they arrive from a query string.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RawFilterParams {
    pub status: Option<String>,
    pub landlord_id: Option<String>,
    pub location: Option<String>,
    pub min_price: Option<String>,
    pub max_price: Option<String>,
    pub bedrooms: Option<String>,
    pub bathrooms: Option<String>,
    pub sort: Option<String>,
    pub page: Option<String>,
    pub per_page: Option<String>,
}

/// A built `WHERE` clause and its parameters, in placeholder order.
#[derive(Debug, Clone, PartialEq)]
pub struct Predicate {
    pub clause: String,
    pub params: Vec<SqlValue>,
}

impl Predicate {
    /// Clause used when no criterion is present.
    pub const ALWAYS: &'static str = "1 = 1";

    pub fn is_unconditional(&self) -> bool {
        self.params.is_empty()
    }
}

/// Optional property search criteria. Absent fields do not constrain.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PropertyFilter {
    pub status: Option<PropertyStatus>,
    pub landlord_id: Option<String>,
    /// Case-insensitive substring of the location
    pub location: Option<String>,
    pub min_price: Option<f64>,
    pub max_price: Option<f64>,
    pub bedrooms: Option<BedroomsFilter>,
    /// Lower bound; half steps allowed
    pub bathrooms: Option<f64>,
    pub sort: SortOrder,
    pub page: Option<Pagination>,
}

impl PropertyFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_status(mut self, status: PropertyStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_landlord(mut self, landlord_id: impl Into<String>) -> Self {
        self.landlord_id = Some(landlord_id.into());
        self
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    pub fn with_price_range(mut self, min: Option<f64>, max: Option<f64>) -> Self {
        self.min_price = min;
        self.max_price = max;
        self
    }

    pub fn with_bedrooms(mut self, bedrooms: BedroomsFilter) -> Self {
        self.bedrooms = Some(bedrooms);
        self
    }

    pub fn with_bathrooms(mut self, at_least: f64) -> Self {
        self.bathrooms = Some(at_least);
        self
    }

    pub fn sorted_by(mut self, sort: SortOrder) -> Self {
        self.sort = sort;
        self
    }

    pub fn paginate(mut self, page: Pagination) -> Self {
        self.page = Some(page);
        self
    }

    /// Build a filter from untrusted strings. Malformed, negative or
    /// non-finite values are treated as absent rather than rejected.
    pub fn from_raw(raw: &RawFilterParams) -> Self {
        let text = |v: &Option<String>| {
            v.as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_owned)
        };
        let amount = |v: &Option<String>| {
            v.as_deref()
                .and_then(|s| s.trim().parse::<f64>().ok())
                .filter(|n| n.is_finite() && *n >= 0.0)
        };
        let count = |v: &Option<String>| v.as_deref().and_then(|s| s.trim().parse::<u32>().ok());

        let page = match (count(&raw.page), count(&raw.per_page)) {
            (None, None) => None,
            (page, per_page) => Some(Pagination::new(
                page.unwrap_or(1),
                per_page.unwrap_or(DEFAULT_PER_PAGE),
            )),
        };

        Self {
            status: raw.status.as_deref().and_then(|s| s.parse().ok()),
            landlord_id: text(&raw.landlord_id),
            location: text(&raw.location),
            min_price: amount(&raw.min_price),
            max_price: amount(&raw.max_price),
            bedrooms: raw.bedrooms.as_deref().and_then(BedroomsFilter::parse),
            bathrooms: amount(&raw.bathrooms),
            sort: raw.sort.as_deref().map(SortOrder::parse).unwrap_or_default(),
            page,
        }
    }

    /// Fold the present criteria into a predicate over the `p` alias.
    pub fn predicate(&self) -> Predicate {
        let terms: Vec<(&'static str, SqlValue)> = [
            self.status.map(|s| ("p.status = ?", SqlValue::from(s.as_str()))),
            self.landlord_id
                .as_ref()
                .map(|id| ("p.landlord_id = ?", SqlValue::from(id))),
            self.location
                .as_deref()
                .map(str::trim)
                .filter(|loc| !loc.is_empty())
                .map(|loc| {
                    (
                        "p.location LIKE ? ESCAPE '\\'",
                        SqlValue::Text(format!("%{}%", escape_like(loc))),
                    )
                }),
            self.min_price.map(|v| ("p.price >= ?", SqlValue::Real(v))),
            self.max_price.map(|v| ("p.price <= ?", SqlValue::Real(v))),
            self.bedrooms.map(|b| match b {
                BedroomsFilter::Exactly(n) => ("p.bedrooms = ?", SqlValue::Integer(n)),
                BedroomsFilter::AtLeast(n) => ("p.bedrooms >= ?", SqlValue::Integer(n)),
            }),
            self.bathrooms.map(|v| ("p.bathrooms >= ?", SqlValue::Real(v))),
        ]
        .into_iter()
        .flatten()
        .collect();

        if terms.is_empty() {
            return Predicate {
                clause: Predicate::ALWAYS.to_string(),
                params: Vec::new(),
            };
        }

        let (fragments, params): (Vec<&str>, Vec<SqlValue>) = terms.into_iter().unzip();
        Predicate {
            clause: fragments.join(" AND "),
            params,
        }
    }

    /// `SELECT {columns} FROM properties p WHERE … ORDER BY … [LIMIT … OFFSET …]`
    pub fn to_statement(&self, columns: &str) -> Statement {
        let Predicate { clause, params } = self.predicate();
        let mut sql = format!(
            "SELECT {columns} FROM properties p WHERE {clause} ORDER BY {}",
            self.sort.order_by()
        );
        let mut stmt_params = params;
        if let Some(page) = self.page {
            sql.push_str(" LIMIT ? OFFSET ?");
            stmt_params.push(SqlValue::Integer(page.limit()));
            stmt_params.push(SqlValue::Integer(page.offset()));
        }
        Statement::new(sql).bind_all(stmt_params)
    }
}

/// Escape `LIKE` wildcards so user text matches literally.
fn escape_like(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        if matches!(c, '\\' | '%' | '_') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn empty_filter_is_unconditional() {
        let predicate = PropertyFilter::new().predicate();
        assert_eq!(predicate.clause, Predicate::ALWAYS);
        assert!(predicate.is_unconditional());
    }

    #[test]
    fn bedrooms_four_plus_is_lower_bound() {
        assert_eq!(BedroomsFilter::parse("4+"), Some(BedroomsFilter::AtLeast(4)));
        assert_eq!(BedroomsFilter::parse(" 3 "), Some(BedroomsFilter::Exactly(3)));
        assert_eq!(BedroomsFilter::parse("many"), None);
        assert_eq!(BedroomsFilter::parse("-1"), None);

        let predicate = PropertyFilter::new()
            .with_bedrooms(BedroomsFilter::AtLeast(4))
            .predicate();
        assert_eq!(predicate.clause, "p.bedrooms >= ?");
        assert_eq!(predicate.params, vec![SqlValue::Integer(4)]);

        let predicate = PropertyFilter::new()
            .with_bedrooms(BedroomsFilter::Exactly(2))
            .predicate();
        assert_eq!(predicate.clause, "p.bedrooms = ?");
    }

    #[test]
    fn terms_follow_field_order() {
        let predicate = PropertyFilter::new()
            .with_bathrooms(1.5)
            .with_location("Downtown")
            .with_status(PropertyStatus::Available)
            .with_price_range(Some(1000.0), Some(3000.0))
            .predicate();

        assert_eq!(
            predicate.clause,
            "p.status = ? AND p.location LIKE ? ESCAPE '\\' AND p.price >= ? AND p.price <= ? AND p.bathrooms >= ?"
        );
        assert_eq!(
            predicate.params,
            vec![
                SqlValue::Text("AVAILABLE".into()),
                SqlValue::Text("%Downtown%".into()),
                SqlValue::Real(1000.0),
                SqlValue::Real(3000.0),
                SqlValue::Real(1.5),
            ]
        );
    }

    #[test]
    fn location_wildcards_are_escaped() {
        let predicate = PropertyFilter::new().with_location("50%_off\\").predicate();
        assert_eq!(
            predicate.params,
            vec![SqlValue::Text("%50\\%\\_off\\\\%".into())]
        );

        let blank = PropertyFilter::new().with_location("   ").predicate();
        assert!(blank.is_unconditional());
    }

    #[test]
    fn malformed_raw_values_are_absent() {
        let raw = RawFilterParams {
            status: Some("sold".into()),
            location: Some("  ".into()),
            min_price: Some("cheap".into()),
            max_price: Some("-5".into()),
            bedrooms: Some("lots".into()),
            bathrooms: Some("NaN".into()),
            sort: Some("random".into()),
            ..Default::default()
        };
        let filter = PropertyFilter::from_raw(&raw);
        assert_eq!(filter, PropertyFilter::default());
    }

    #[test]
    fn raw_values_parse() {
        let raw = RawFilterParams {
            status: Some("available".into()),
            landlord_id: Some("u-1".into()),
            location: Some("Downtown".into()),
            min_price: Some("1000".into()),
            bedrooms: Some("4+".into()),
            bathrooms: Some("2.5".into()),
            sort: Some("price_desc".into()),
            per_page: Some("500".into()),
            ..Default::default()
        };
        let filter = PropertyFilter::from_raw(&raw);
        assert_eq!(filter.status, Some(PropertyStatus::Available));
        assert_eq!(filter.landlord_id.as_deref(), Some("u-1"));
        assert_eq!(filter.min_price, Some(1000.0));
        assert_eq!(filter.max_price, None);
        assert_eq!(filter.bedrooms, Some(BedroomsFilter::AtLeast(4)));
        assert_eq!(filter.bathrooms, Some(2.5));
        assert_eq!(filter.sort, SortOrder::PriceHighToLow);
        assert_eq!(filter.page, Some(Pagination::new(1, 100)));
    }

    #[test]
    fn raw_params_deserialize_from_camel_case() {
        let raw: RawFilterParams =
            serde_json::from_str(r#"{"minPrice":"900","landlordId":"u-9"}"#).unwrap();
        assert_eq!(raw.min_price.as_deref(), Some("900"));
        assert_eq!(raw.landlord_id.as_deref(), Some("u-9"));
    }

    #[test]
    fn statement_appends_order_and_page() {
        let stmt = PropertyFilter::new()
            .with_status(PropertyStatus::Available)
            .sorted_by(SortOrder::PriceHighToLow)
            .paginate(Pagination::new(3, 10))
            .to_statement("p.id");
        assert_eq!(
            stmt.sql(),
            "SELECT p.id FROM properties p WHERE p.status = ? ORDER BY p.price DESC, p.created_at DESC, p.rowid DESC LIMIT ? OFFSET ?"
        );
        assert_eq!(
            stmt.params(),
            &[
                SqlValue::Text("AVAILABLE".into()),
                SqlValue::Integer(10),
                SqlValue::Integer(20)
            ]
        );
    }

    #[test]
    fn pagination_clamps() {
        let page = Pagination::new(0, 0);
        assert_eq!(page.page, 1);
        assert_eq!(page.per_page, 1);
        assert_eq!(page.offset(), 0);
    }

    const FRAGMENTS: &[&str] = &[
        "p.status = ?",
        "p.landlord_id = ?",
        "p.location LIKE ? ESCAPE '\\'",
        "p.price >= ?",
        "p.price <= ?",
        "p.bedrooms = ?",
        "p.bedrooms >= ?",
        "p.bathrooms >= ?",
    ];

    fn arb_filter() -> impl Strategy<Value = PropertyFilter> {
        (
            proptest::option::of(prop_oneof![
                Just(PropertyStatus::Available),
                Just(PropertyStatus::Rented),
                Just(PropertyStatus::Maintenance),
            ]),
            proptest::option::of(".*"),
            proptest::option::of(".*"),
            proptest::option::of(0.0f64..1e7),
            proptest::option::of(0.0f64..1e7),
            proptest::option::of(prop_oneof![
                (0i64..10).prop_map(BedroomsFilter::Exactly),
                (0i64..10).prop_map(BedroomsFilter::AtLeast),
            ]),
            proptest::option::of((0u32..12).prop_map(|half| f64::from(half) / 2.0)),
        )
            .prop_map(
                |(status, landlord_id, location, min_price, max_price, bedrooms, bathrooms)| {
                    PropertyFilter {
                        status,
                        landlord_id,
                        location,
                        min_price,
                        max_price,
                        bedrooms,
                        bathrooms,
                        ..Default::default()
                    }
                },
            )
    }

    proptest! {
        /// Property: the clause is built only from fixed fragments and
        /// carries one placeholder per bound value.
        #[test]
        fn prop_predicate_never_interpolates(filter in arb_filter()) {
            let predicate = filter.predicate();
            let placeholders = predicate.clause.matches('?').count();
            prop_assert_eq!(placeholders, predicate.params.len());

            if predicate.params.is_empty() {
                prop_assert_eq!(predicate.clause.as_str(), Predicate::ALWAYS);
            } else {
                for fragment in predicate.clause.split(" AND ") {
                    prop_assert!(FRAGMENTS.contains(&fragment), "unexpected fragment {:?}", fragment);
                }
            }
        }

        /// Property: raw parsing never panics and never yields negative bounds
        #[test]
        fn prop_from_raw_is_total(min in ".*", beds in ".*", baths in ".*") {
            let raw = RawFilterParams {
                min_price: Some(min),
                bedrooms: Some(beds),
                bathrooms: Some(baths),
                ..Default::default()
            };
            let filter = PropertyFilter::from_raw(&raw);
            prop_assert!(filter.min_price.map_or(true, |v| v >= 0.0));
            prop_assert!(filter.bathrooms.map_or(true, |v| v >= 0.0));
        }
    }
}

//! Enrichment join

use crate::error::Result;
use crate::execution::{broadcast, DataFrame};
use crate::planner::{col, JoinType};

/// Columns of the enriched sales table, in output order
pub const ENRICHED_COLUMNS: [&str; 4] = ["sale_id", "amount", "country_name", "region"];

/// `sales LEFT JOIN countries USING (country_code)`
///
/// With `broadcast_hint` the country table is marked for broadcast; without
/// it the planner decides from the table size.
pub fn enrich(sales: &DataFrame, countries: &DataFrame, broadcast_hint: bool) -> Result<DataFrame> {
    let countries = if broadcast_hint {
        broadcast(countries)
    } else {
        countries.clone()
    };

    sales
        .join(&countries, &["country_code"], JoinType::Left)?
        .select(ENRICHED_COLUMNS.iter().map(|c| col(*c)).collect())
}

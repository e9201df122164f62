//! Fact-data builder

use crate::error::Result;
use crate::execution::{DataFrame, ExecutionContext};
use crate::pipeline::PipelineConfig;
use crate::planner::{col, round, JoinType};
use crate::sources::{
    carts_schema, carts_to_batch, fetch_carts, fetch_users, users_schema, users_to_batch,
    JsonSource,
};
use std::collections::HashSet;
use std::hash::Hash;

pub const USERS_TABLE: &str = "users";
pub const CARTS_TABLE: &str = "carts";

/// Fetch users and carts and build the `(sale_id, country_code, amount)` fact table
///
/// Both lists are deduplicated by primary key so a repeated page cannot
/// multiply rows through the user lookup.
pub async fn build_sales(
    ctx: &ExecutionContext,
    source: &dyn JsonSource,
    config: &PipelineConfig,
) -> Result<DataFrame> {
    let users = fetch_users(source, &config.dummyjson_url, config.max_pages, config.page_size).await?;
    let users = dedup_by_key(users, |u| u.user_id, USERS_TABLE);
    ctx.register_table(USERS_TABLE, users_schema(), vec![users_to_batch(&users)?]);

    let carts = fetch_carts(source, &config.dummyjson_url, config.max_pages, config.page_size).await?;
    let carts = dedup_by_key(carts, |c| c.sale_id.clone(), CARTS_TABLE);
    ctx.register_table(CARTS_TABLE, carts_schema(), vec![carts_to_batch(&carts)?]);

    sales_from(&ctx.table(CARTS_TABLE)?, &ctx.table(USERS_TABLE)?)
}

/// `carts LEFT JOIN users USING (user_id)` with the amount rounded to cents
pub fn sales_from(carts: &DataFrame, users: &DataFrame) -> Result<DataFrame> {
    carts
        .join(users, &["user_id"], JoinType::Left)?
        .select(vec![col("sale_id"), col("country_code"), col("amount")])?
        .with_column("amount", round(col("amount"), 2))
}

/// Keep the first record per key
pub fn dedup_by_key<T, K, F>(records: Vec<T>, key: F, what: &str) -> Vec<T>
where
    K: Eq + Hash,
    F: Fn(&T) -> K,
{
    let before = records.len();
    let mut seen = HashSet::with_capacity(before);
    let kept: Vec<T> = records.into_iter().filter(|r| seen.insert(key(r))).collect();

    let dropped = before - kept.len();
    if dropped > 0 {
        tracing::warn!(records = what, dropped, "Dropped duplicate records");
    }
    kept
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dedup_keeps_first() {
        let records = vec![(1, "a"), (2, "b"), (1, "c"), (3, "d"), (2, "e")];
        let kept = dedup_by_key(records, |r| r.0, "pairs");
        assert_eq!(kept, vec![(1, "a"), (2, "b"), (3, "d")]);
    }
}

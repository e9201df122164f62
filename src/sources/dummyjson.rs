//! E-commerce sample data (DummyJSON users and carts)

use crate::error::{BroadcastJoinError, Result};
use crate::sources::JsonSource;
use arrow::array::{Float64Array, Int64Array, StringArray};
use arrow::datatypes::{DataType, Field, Schema, SchemaRef};
use arrow::record_batch::RecordBatch;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;

/// Country code used when a user has no country
pub const UNKNOWN_COUNTRY: &str = "XX";

/// Page size of the paginated endpoints
pub const DEFAULT_PAGE_SIZE: usize = 100;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserRecord {
    pub user_id: i64,
    pub country_code: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CartRecord {
    pub sale_id: String,
    pub user_id: i64,
    pub amount: f64,
}

#[derive(Debug, Deserialize)]
struct RawUser {
    id: i64,
    #[serde(default)]
    address: Option<RawAddress>,
}

#[derive(Debug, Deserialize)]
struct RawAddress {
    #[serde(default)]
    country: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawCart {
    id: i64,
    #[serde(rename = "userId")]
    user_id: i64,
    total: f64,
}

/// First two characters upper-cased, or `XX` when absent or empty
pub fn normalize_country_code(country: Option<&str>) -> String {
    match country {
        Some(c) if !c.is_empty() => c.chars().take(2).collect::<String>().to_uppercase(),
        _ => UNKNOWN_COUNTRY.to_string(),
    }
}

pub async fn fetch_users(
    source: &dyn JsonSource,
    base_url: &str,
    max_pages: usize,
    page_size: usize,
) -> Result<Vec<UserRecord>> {
    let raw: Vec<RawUser> = fetch_pages(source, base_url, "users", max_pages, page_size).await?;
    Ok(raw
        .into_iter()
        .map(|u| UserRecord {
            user_id: u.id,
            country_code: normalize_country_code(
                u.address.as_ref().and_then(|a| a.country.as_deref()),
            ),
        })
        .collect())
}

pub async fn fetch_carts(
    source: &dyn JsonSource,
    base_url: &str,
    max_pages: usize,
    page_size: usize,
) -> Result<Vec<CartRecord>> {
    let raw: Vec<RawCart> = fetch_pages(source, base_url, "carts", max_pages, page_size).await?;
    Ok(raw
        .into_iter()
        .map(|c| CartRecord {
            sale_id: c.id.to_string(),
            user_id: c.user_id,
            amount: c.total,
        })
        .collect())
}

/// Serial limit/skip pagination over `{base_url}/{resource}`
///
/// Reads up to `max_pages` pages, stopping early once the reported
/// `total` is reached or a page comes back empty.
async fn fetch_pages<T: DeserializeOwned>(
    source: &dyn JsonSource,
    base_url: &str,
    resource: &str,
    max_pages: usize,
    page_size: usize,
) -> Result<Vec<T>> {
    if page_size == 0 {
        return Err(BroadcastJoinError::InvalidArgument(
            "Page size must be positive".to_string(),
        ));
    }
    let url = format!("{}/{}", base_url.trim_end_matches('/'), resource);

    let mut records = Vec::new();
    for page in 0..max_pages {
        let skip = page * page_size;
        let body = source
            .get_json(
                &url,
                &[("limit", page_size.to_string()), ("skip", skip.to_string())],
            )
            .await?;

        let entries = body
            .get(resource)
            .and_then(Value::as_array)
            .ok_or_else(|| {
                BroadcastJoinError::Decode(format!("{}: missing '{}' array", url, resource))
            })?;
        for entry in entries {
            let record = T::deserialize(entry).map_err(|e| {
                BroadcastJoinError::Decode(format!("{}: malformed entry: {}", url, e))
            })?;
            records.push(record);
        }

        let total = body.get("total").and_then(Value::as_u64);
        tracing::debug!(resource, page, rows = entries.len(), ?total, "Fetched page");

        let exhausted = total.is_some_and(|t| (skip + page_size) as u64 >= t);
        if entries.is_empty() || exhausted {
            break;
        }
    }

    tracing::info!(resource, count = records.len(), "Fetched records");
    Ok(records)
}

pub fn users_schema() -> SchemaRef {
    Arc::new(Schema::new(vec![
        Field::new("user_id", DataType::Int64, false),
        Field::new("country_code", DataType::Utf8, false),
    ]))
}

pub fn carts_schema() -> SchemaRef {
    Arc::new(Schema::new(vec![
        Field::new("sale_id", DataType::Utf8, false),
        Field::new("user_id", DataType::Int64, false),
        Field::new("amount", DataType::Float64, false),
    ]))
}

pub fn users_to_batch(users: &[UserRecord]) -> Result<RecordBatch> {
    let ids: Int64Array = users.iter().map(|u| Some(u.user_id)).collect();
    let codes: StringArray = users.iter().map(|u| Some(u.country_code.as_str())).collect();
    Ok(RecordBatch::try_new(
        users_schema(),
        vec![Arc::new(ids), Arc::new(codes)],
    )?)
}

pub fn carts_to_batch(carts: &[CartRecord]) -> Result<RecordBatch> {
    let sale_ids: StringArray = carts.iter().map(|c| Some(c.sale_id.as_str())).collect();
    let user_ids: Int64Array = carts.iter().map(|c| Some(c.user_id)).collect();
    let amounts: Float64Array = carts.iter().map(|c| Some(c.amount)).collect();
    Ok(RecordBatch::try_new(
        carts_schema(),
        vec![Arc::new(sale_ids), Arc::new(user_ids), Arc::new(amounts)],
    )?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use serde_json::json;

    /// Serves `total` sequential users or carts and records the skips asked for
    struct PagedSource {
        total: usize,
        requests: Mutex<Vec<usize>>,
    }

    #[async_trait]
    impl JsonSource for PagedSource {
        async fn get_json(&self, url: &str, query: &[(&str, String)]) -> Result<Value> {
            let param = |name: &str| -> usize {
                query.iter().find(|(k, _)| *k == name).unwrap().1.parse().unwrap()
            };
            let (limit, skip) = (param("limit"), param("skip"));
            self.requests.lock().push(skip);

            let ids = (skip..(skip + limit).min(self.total)).map(|i| i as i64 + 1);
            if url.ends_with("/users") {
                let users: Vec<Value> = ids
                    .map(|id| json!({"id": id, "address": {"country": "United States"}}))
                    .collect();
                Ok(json!({"users": users, "total": self.total, "skip": skip, "limit": limit}))
            } else {
                let carts: Vec<Value> = ids
                    .map(|id| json!({"id": id, "userId": id, "total": 10}))
                    .collect();
                Ok(json!({"carts": carts, "total": self.total, "skip": skip, "limit": limit}))
            }
        }
    }

    fn source(total: usize) -> PagedSource {
        PagedSource {
            total,
            requests: Mutex::new(Vec::new()),
        }
    }

    #[test]
    fn test_normalize_country_code() {
        assert_eq!(normalize_country_code(Some("United States")), "UN");
        assert_eq!(normalize_country_code(Some("fr")), "FR");
        assert_eq!(normalize_country_code(Some("j")), "J");
        assert_eq!(normalize_country_code(Some("")), "XX");
        assert_eq!(normalize_country_code(None), "XX");
    }

    #[tokio::test]
    async fn test_pagination_stops_at_total() {
        let source = source(250);
        let users = fetch_users(&source, "https://dummyjson.test/", 20, 100)
            .await
            .unwrap();

        assert_eq!(users.len(), 250);
        assert_eq!(*source.requests.lock(), vec![0, 100, 200]);
        assert_eq!(users[0].country_code, "UN");
    }

    #[tokio::test]
    async fn test_pagination_respects_max_pages() {
        let source = source(1000);
        let carts = fetch_carts(&source, "https://dummyjson.test", 2, 100)
            .await
            .unwrap();

        assert_eq!(carts.len(), 200);
        assert_eq!(carts[0].sale_id, "1");
        assert_eq!(carts[0].amount, 10.0);
    }

    #[test]
    fn test_missing_address_defaults() {
        let raw: RawUser = serde_json::from_value(json!({"id": 7})).unwrap();
        assert!(raw.address.is_none());
        let raw: RawUser =
            serde_json::from_value(json!({"id": 8, "address": {"city": "Paris"}})).unwrap();
        assert!(raw.address.unwrap().country.is_none());
    }

    #[tokio::test]
    async fn test_malformed_page_is_decode_error() {
        struct Broken;

        #[async_trait]
        impl JsonSource for Broken {
            async fn get_json(&self, _url: &str, _query: &[(&str, String)]) -> Result<Value> {
                Ok(json!({"message": "rate limited"}))
            }
        }

        assert!(matches!(
            fetch_users(&Broken, "https://dummyjson.test", 1, 100).await,
            Err(BroadcastJoinError::Decode(_))
        ));
    }

    #[test]
    fn test_batches() {
        let batch = carts_to_batch(&[CartRecord {
            sale_id: "1".into(),
            user_id: 5,
            amount: 12.345,
        }])
        .unwrap();
        assert_eq!(batch.schema(), carts_schema());

        let batch = users_to_batch(&[]).unwrap();
        assert_eq!(batch.num_rows(), 0);
    }
}

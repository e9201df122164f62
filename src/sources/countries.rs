//! Country reference data (REST Countries)

use crate::error::{BroadcastJoinError, Result};
use crate::sources::JsonSource;
use arrow::array::StringArray;
use arrow::datatypes::{DataType, Field, Schema, SchemaRef};
use arrow::record_batch::RecordBatch;
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;

/// Field filter requested from the countries endpoint
pub const COUNTRY_FIELDS: &str = "cca2,name,region";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CountryRecord {
    pub country_code: String,
    pub country_name: String,
    pub region: Option<String>,
}

/// Fetch and parse the full country list
pub async fn fetch_countries(source: &dyn JsonSource, url: &str) -> Result<Vec<CountryRecord>> {
    let body = source
        .get_json(url, &[("fields", COUNTRY_FIELDS.to_string())])
        .await?;
    let countries = parse_countries(&body)?;
    tracing::info!(count = countries.len(), "Fetched countries");
    Ok(countries)
}

/// Map the countries response to records
///
/// Entries without a two-letter `cca2` or without `name.common` are
/// dropped. Only a response that is not an array is an error.
pub fn parse_countries(body: &Value) -> Result<Vec<CountryRecord>> {
    let entries = body.as_array().ok_or_else(|| {
        BroadcastJoinError::Decode("Countries response is not a JSON array".to_string())
    })?;

    let mut seen = HashSet::new();
    let mut countries = Vec::with_capacity(entries.len());
    for entry in entries {
        let Some(code) = entry.get("cca2").and_then(Value::as_str) else {
            tracing::debug!(%entry, "Dropping country without cca2");
            continue;
        };
        if code.len() != 2 || !code.chars().all(|c| c.is_ascii_alphabetic()) {
            tracing::debug!(code, "Dropping country with invalid cca2");
            continue;
        }
        let Some(name) = entry
            .get("name")
            .and_then(|n| n.get("common"))
            .and_then(Value::as_str)
        else {
            tracing::debug!(code, "Dropping country without a common name");
            continue;
        };

        let country_code = code.to_ascii_uppercase();
        if !seen.insert(country_code.clone()) {
            tracing::warn!(code = %country_code, "Duplicate country code, keeping the first");
            continue;
        }

        // Free text, kept verbatim; only a missing region is null
        let region = entry
            .get("region")
            .and_then(Value::as_str)
            .map(str::to_string);

        countries.push(CountryRecord {
            country_code,
            country_name: name.to_string(),
            region,
        });
    }
    Ok(countries)
}

pub fn countries_schema() -> SchemaRef {
    Arc::new(Schema::new(vec![
        Field::new("country_code", DataType::Utf8, false),
        Field::new("country_name", DataType::Utf8, false),
        Field::new("region", DataType::Utf8, true),
    ]))
}

pub fn countries_to_batch(countries: &[CountryRecord]) -> Result<RecordBatch> {
    let codes: StringArray = countries.iter().map(|c| Some(c.country_code.as_str())).collect();
    let names: StringArray = countries.iter().map(|c| Some(c.country_name.as_str())).collect();
    let regions: StringArray = countries.iter().map(|c| c.region.as_deref()).collect();

    Ok(RecordBatch::try_new(
        countries_schema(),
        vec![Arc::new(codes), Arc::new(names), Arc::new(regions)],
    )?)
}

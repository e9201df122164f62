//! Reference-data loader

use crate::error::Result;
use crate::execution::{DataFrame, ExecutionContext};
use crate::pipeline::PipelineConfig;
use crate::sources::{countries_schema, countries_to_batch, fetch_countries, JsonSource};

pub const COUNTRIES_TABLE: &str = "countries";

/// Fetch the country list and register it as the `countries` table
pub async fn load_countries(
    ctx: &ExecutionContext,
    source: &dyn JsonSource,
    config: &PipelineConfig,
) -> Result<DataFrame> {
    let countries = fetch_countries(source, &config.countries_url).await?;
    let batch = countries_to_batch(&countries)?;
    ctx.register_table(COUNTRIES_TABLE, countries_schema(), vec![batch]);
    ctx.table(COUNTRIES_TABLE)
}

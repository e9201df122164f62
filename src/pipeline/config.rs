//! Pipeline configuration

use crate::sources::{DEFAULT_PAGE_SIZE, DEFAULT_TIMEOUT};
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_COUNTRIES_URL: &str = "https://restcountries.com/v3.1/all";
pub const DEFAULT_DUMMYJSON_URL: &str = "https://dummyjson.com";
pub const DEFAULT_OUTPUT_PATH: &str = "/tmp/broadcast_join_demo/sales_enriched";
pub const DEFAULT_MAX_PAGES: usize = 20;

/// Settings for one enrichment run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Full country list endpoint
    pub countries_url: String,
    /// Base URL serving `/users` and `/carts`
    pub dummyjson_url: String,
    /// Pages fetched per paginated endpoint
    pub max_pages: usize,
    pub page_size: usize,
    /// Per-request HTTP timeout
    pub timeout: Duration,
    /// Location of the enriched output table
    pub output_path: PathBuf,
    /// Mark the country table for broadcast
    pub broadcast_hint: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            countries_url: DEFAULT_COUNTRIES_URL.to_string(),
            dummyjson_url: DEFAULT_DUMMYJSON_URL.to_string(),
            max_pages: DEFAULT_MAX_PAGES,
            page_size: DEFAULT_PAGE_SIZE,
            timeout: DEFAULT_TIMEOUT,
            output_path: PathBuf::from(DEFAULT_OUTPUT_PATH),
            broadcast_hint: true,
        }
    }
}

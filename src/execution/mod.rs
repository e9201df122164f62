//! Query execution module
//!
//! The session (`ExecutionContext`), its configuration and the DataFrame API.

mod config;
mod context;
mod dataframe;

pub use config::*;
pub use context::{collect_partitions, print_results, ExecutionContext, QueryMetrics, QueryResult};
pub use dataframe::*;

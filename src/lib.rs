//! Broadcast hash join enrichment pipeline
//!
//! Fetches country reference data and e-commerce sample data from two
//! public REST APIs, joins them on a small partitioned Arrow engine with a
//! broadcast hash join, and writes the enriched sales as a transactional
//! Parquet table.

pub mod error;
pub mod execution;
pub mod physical;
pub mod pipeline;
pub mod planner;
pub mod sources;
pub mod storage;

// Re-export main types
pub use error::{BroadcastJoinError, Result};
pub use execution::{broadcast, DataFrame, ExecutionContext, QueryResult, SessionConfig};
pub use pipeline::{run, PipelineConfig, RunSummary};
pub use planner::{col, lit, round, JoinType};
pub use sources::{HttpJsonSource, JsonSource};
pub use storage::{DeltaTable, SaveMode};

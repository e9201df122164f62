//! Physical operators

mod expressions;
mod hash_join;
pub(crate) mod join_key;
mod project;
mod repartition;
mod scan;

pub use expressions::{evaluate_expr, round_half_up};
pub use hash_join::{HashJoinExec, PartitionMode};
pub use project::ProjectExec;
pub use repartition::RepartitionExec;
pub use scan::{MemoryTable, TableProvider, TableScanExec, TableStatistics};

//! Physical planner - converts logical plans to physical plans
//!
//! Join strategy selection happens here. The right input of a join is the
//! build side; it is broadcast when it carries a broadcast hint or when its
//! estimated size is within the configured threshold. Otherwise both inputs
//! are hash-partitioned on the join keys.

use crate::error::{BroadcastJoinError, Result};
use crate::execution::SessionConfig;
use crate::physical::operators::{
    HashJoinExec, PartitionMode, ProjectExec, RepartitionExec, TableProvider, TableScanExec,
};
use crate::physical::PhysicalOperator;
use crate::planner::{JoinNode, LogicalPlan, PlanHint};
use arrow::datatypes::Schema;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

/// Join strategy chosen for a logical join
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinStrategy {
    /// Replicate the right input to every partition
    Broadcast,
    /// Hash-partition both inputs on the join keys
    Shuffle,
}

impl fmt::Display for JoinStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JoinStrategy::Broadcast => write!(f, "broadcast"),
            JoinStrategy::Shuffle => write!(f, "shuffle"),
        }
    }
}

/// Physical planner that converts logical plans to physical execution plans
pub struct PhysicalPlanner {
    /// Table providers for accessing table data
    tables: HashMap<String, Arc<dyn TableProvider>>,
    config: SessionConfig,
}

impl PhysicalPlanner {
    pub fn new(config: SessionConfig) -> Self {
        Self {
            tables: HashMap::new(),
            config,
        }
    }

    /// Register a table provider
    pub fn register_table(&mut self, name: impl Into<String>, provider: Arc<dyn TableProvider>) {
        self.tables.insert(name.into(), provider);
    }

    /// Convert a logical plan to a physical plan
    pub fn create_physical_plan(&self, logical: &LogicalPlan) -> Result<Arc<dyn PhysicalOperator>> {
        self.plan_node(logical, None)
    }

    /// `required` holds the columns the parent reads, None for all of them
    fn plan_node(
        &self,
        logical: &LogicalPlan,
        required: Option<&HashSet<String>>,
    ) -> Result<Arc<dyn PhysicalOperator>> {
        match logical {
            LogicalPlan::Scan(node) => {
                let provider = self
                    .tables
                    .get(&node.table_name)
                    .ok_or_else(|| BroadcastJoinError::TableNotFound(node.table_name.clone()))?;

                let projection =
                    required.and_then(|columns| scan_projection(&provider.schema(), columns));
                let exec = TableScanExec::try_new(&node.table_name, provider.clone(), projection)?
                    .with_target_partitions(self.config.target_partitions);
                Ok(Arc::new(exec))
            }
            LogicalPlan::Project(node) => {
                let mut columns = HashSet::new();
                for expr in &node.exprs {
                    expr.collect_columns(&mut columns);
                }
                let input = self.plan_node(&node.input, Some(&columns))?;
                Ok(Arc::new(ProjectExec::try_new(input, node.exprs.clone())?))
            }
            // Hints only steer join planning
            LogicalPlan::Hint(node) => self.plan_node(&node.input, required),
            LogicalPlan::Join(node) => self.create_join(node, required),
        }
    }

    fn create_join(
        &self,
        node: &JoinNode,
        required: Option<&HashSet<String>>,
    ) -> Result<Arc<dyn PhysicalOperator>> {
        let required = required.map(|columns| {
            let mut columns = columns.clone();
            columns.extend(node.using.iter().cloned());
            columns
        });
        let left = self.plan_node(&node.left, required.as_ref())?;
        let right = self.plan_node(&node.right, required.as_ref())?;

        let left_schema = left.schema();
        let right_schema = right.schema();
        let on = node
            .using
            .iter()
            .map(|key| {
                let l = left_schema
                    .index_of(key)
                    .map_err(|_| BroadcastJoinError::ColumnNotFound(key.clone()))?;
                let r = right_schema
                    .index_of(key)
                    .map_err(|_| BroadcastJoinError::ColumnNotFound(key.clone()))?;
                Ok((l, r))
            })
            .collect::<Result<Vec<_>>>()?;

        let strategy = self.select_join_strategy(node);
        tracing::info!(
            strategy = %strategy,
            join_type = %node.join_type,
            keys = ?node.using,
            "Planned join"
        );

        let join = match strategy {
            JoinStrategy::Broadcast => {
                HashJoinExec::try_new(left, right, on, node.join_type, PartitionMode::CollectRight)?
            }
            JoinStrategy::Shuffle => {
                let partitions = self.config.target_partitions;
                let left_keys = on.iter().map(|&(l, _)| l).collect();
                let right_keys = on.iter().map(|&(_, r)| r).collect();
                let left = Arc::new(RepartitionExec::try_new(left, left_keys, partitions)?);
                let right = Arc::new(RepartitionExec::try_new(right, right_keys, partitions)?);
                HashJoinExec::try_new(left, right, on, node.join_type, PartitionMode::Partitioned)?
            }
        };
        Ok(Arc::new(join))
    }

    /// Pick the join strategy; never affects the result, only data movement
    pub fn select_join_strategy(&self, node: &JoinNode) -> JoinStrategy {
        if node.right.has_hint(PlanHint::Broadcast) {
            return JoinStrategy::Broadcast;
        }

        if node.left.has_hint(PlanHint::Broadcast) {
            // The left input is always probed; for a left join it is also the preserved side
            tracing::warn!(
                join_type = %node.join_type,
                "Broadcast hint on the left input ignored; only the right input can be broadcast"
            );
        }

        if self.config.broadcast_threshold > 0 {
            if let Some(size) = self.estimate_size(&node.right) {
                if size <= self.config.broadcast_threshold {
                    tracing::debug!(
                        size,
                        threshold = self.config.broadcast_threshold,
                        "Right input below broadcast threshold"
                    );
                    return JoinStrategy::Broadcast;
                }
            }
        }

        JoinStrategy::Shuffle
    }

    /// Estimated output size in bytes, None when unknown
    pub fn estimate_size(&self, plan: &LogicalPlan) -> Option<u64> {
        match plan {
            LogicalPlan::Scan(node) => self
                .tables
                .get(&node.table_name)
                .and_then(|t| t.statistics())
                .map(|s| s.total_byte_size),
            LogicalPlan::Project(node) => self.estimate_size(&node.input),
            LogicalPlan::Hint(node) => self.estimate_size(&node.input),
            LogicalPlan::Join(node) => self
                .estimate_size(&node.left)?
                .checked_add(self.estimate_size(&node.right)?),
        }
    }
}

/// Column indices of `schema` that appear in `required`, None when all or none do
fn scan_projection(schema: &Schema, required: &HashSet<String>) -> Option<Vec<usize>> {
    let indices: Vec<usize> = schema
        .fields()
        .iter()
        .enumerate()
        .filter(|(_, field)| required.contains(field.name()))
        .map(|(i, _)| i)
        .collect();

    // An empty projection would lose the row count
    if indices.is_empty() || indices.len() == schema.fields().len() {
        None
    } else {
        Some(indices)
    }
}

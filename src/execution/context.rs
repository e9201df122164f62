//! Execution context - the session that owns registered tables

use crate::error::{BroadcastJoinError, Result};
use crate::execution::{DataFrame, SessionConfig};
use crate::physical::operators::{MemoryTable, TableProvider};
use crate::physical::{PhysicalOperator, PhysicalPlanner};
use crate::planner::{LogicalPlanBuilder, PlanSchema};
use crate::storage::DeltaTable;
use arrow::datatypes::SchemaRef;
use arrow::record_batch::RecordBatch;
use futures::TryStreamExt;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Query execution result
#[derive(Debug)]
pub struct QueryResult {
    /// Output schema
    pub schema: SchemaRef,
    /// Result batches
    pub batches: Vec<RecordBatch>,
    /// Total row count
    pub row_count: usize,
    /// Execution metrics
    pub metrics: QueryMetrics,
}

/// Query execution metrics
#[derive(Debug, Default)]
pub struct QueryMetrics {
    /// Time spent creating the physical plan
    pub plan_time: Duration,
    /// Time spent executing
    pub execute_time: Duration,
    /// Total time
    pub total_time: Duration,
}

/// State shared between a context and the DataFrames it hands out
#[derive(Debug)]
pub(crate) struct SessionState {
    config: SessionConfig,
    tables: RwLock<HashMap<String, Arc<dyn TableProvider>>>,
}

impl SessionState {
    pub(crate) fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Planner seeded with every table registered so far
    pub(crate) fn physical_planner(&self) -> PhysicalPlanner {
        let mut planner = PhysicalPlanner::new(self.config.clone());
        for (name, provider) in self.tables.read().iter() {
            planner.register_table(name.clone(), provider.clone());
        }
        planner
    }
}

/// Execution context - manages tables and creates DataFrames
pub struct ExecutionContext {
    state: Arc<SessionState>,
}

impl Default for ExecutionContext {
    fn default() -> Self {
        Self::new()
    }
}

impl ExecutionContext {
    pub fn new() -> Self {
        Self::with_config(SessionConfig::default())
    }

    pub fn with_config(config: SessionConfig) -> Self {
        Self {
            state: Arc::new(SessionState {
                config,
                tables: RwLock::new(HashMap::new()),
            }),
        }
    }

    pub fn config(&self) -> &SessionConfig {
        self.state.config()
    }

    /// Register a table from record batches
    ///
    /// Batches longer than the configured batch size are sliced so the
    /// scan can spread them over partitions.
    pub fn register_table(
        &self,
        name: impl Into<String>,
        schema: SchemaRef,
        batches: Vec<RecordBatch>,
    ) {
        let batch_size = self.state.config.batch_size;
        let batches = batches
            .into_iter()
            .flat_map(|batch| slice_batch(batch, batch_size))
            .collect();
        self.register_table_provider(name, Arc::new(MemoryTable::new(schema, batches)));
    }

    /// Register a table from a single batch
    pub fn register_batch(&self, name: impl Into<String>, batch: RecordBatch) {
        let schema = batch.schema();
        self.register_table(name, schema, vec![batch]);
    }

    /// Register a custom table provider, replacing any table with that name
    pub fn register_table_provider(
        &self,
        name: impl Into<String>,
        provider: Arc<dyn TableProvider>,
    ) {
        let name = name.into();
        tracing::debug!(table = %name, "Registered table");
        self.state.tables.write().insert(name, provider);
    }

    /// Register the latest snapshot of a transactional table
    pub fn register_delta(&self, name: impl Into<String>, path: impl AsRef<Path>) -> Result<()> {
        let table = DeltaTable::open(path)?;
        self.register_table_provider(name, Arc::new(table));
        Ok(())
    }

    /// DataFrame scanning a registered table
    pub fn table(&self, name: &str) -> Result<DataFrame> {
        let provider = self
            .state
            .tables
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| BroadcastJoinError::TableNotFound(name.to_string()))?;

        let schema = PlanSchema::try_from(provider.schema().as_ref())?;
        let plan = LogicalPlanBuilder::scan(name, schema).build();
        Ok(DataFrame::new(self.state.clone(), plan))
    }

    /// Names of all registered tables, sorted
    pub fn table_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.state.tables.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Schema of a registered table
    pub fn table_schema(&self, name: &str) -> Option<SchemaRef> {
        self.state.tables.read().get(name).map(|t| t.schema())
    }

    /// Row count of a registered table, when its provider knows it
    pub fn table_row_count(&self, name: &str) -> Option<usize> {
        self.state
            .tables
            .read()
            .get(name)
            .and_then(|t| t.statistics())
            .map(|s| s.row_count)
    }
}

fn slice_batch(batch: RecordBatch, batch_size: usize) -> Vec<RecordBatch> {
    let rows = batch.num_rows();
    if rows <= batch_size {
        return vec![batch];
    }
    (0..rows)
        .step_by(batch_size)
        .map(|offset| batch.slice(offset, batch_size.min(rows - offset)))
        .collect()
}

/// Execute every partition of a physical plan concurrently and gather the batches
pub async fn collect_partitions(physical: Arc<dyn PhysicalOperator>) -> Result<Vec<RecordBatch>> {
    let num_partitions = physical.output_partitions().max(1);

    let partition_futures: Vec<_> = (0..num_partitions)
        .map(|partition_id| {
            let physical = physical.clone();
            async move {
                let stream = physical.execute(partition_id).await.map_err(|e| {
                    BroadcastJoinError::Execution(format!(
                        "Partition {} execution failed: {}",
                        partition_id, e
                    ))
                })?;
                stream.try_collect::<Vec<RecordBatch>>().await.map_err(|e| {
                    BroadcastJoinError::Execution(format!(
                        "Partition {} collection failed: {}",
                        partition_id, e
                    ))
                })
            }
        })
        .collect();

    let partition_results = futures::future::join_all(partition_futures).await;

    let mut batches = Vec::new();
    for result in partition_results {
        batches.extend(result?.into_iter().filter(|b| b.num_rows() > 0));
    }
    Ok(batches)
}

/// Print query results to stdout
pub fn print_results(result: &QueryResult) {
    use arrow::util::pretty::print_batches;

    println!("Row count: {}", result.row_count);
    println!(
        "Timing: plan={:?}, exec={:?}, total={:?}",
        result.metrics.plan_time, result.metrics.execute_time, result.metrics.total_time
    );
    println!();

    if !result.batches.is_empty() {
        let _ = print_batches(&result.batches);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::{Int64Array, StringArray};
    use arrow::datatypes::{DataType, Field, Schema};

    fn users_batch(rows: i64) -> RecordBatch {
        let schema = Arc::new(Schema::new(vec![
            Field::new("user_id", DataType::Int64, false),
            Field::new("country_code", DataType::Utf8, false),
        ]));
        RecordBatch::try_new(
            schema,
            vec![
                Arc::new(Int64Array::from((0..rows).collect::<Vec<_>>())),
                Arc::new(StringArray::from(
                    (0..rows).map(|_| "US").collect::<Vec<_>>(),
                )),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_register_and_lookup() {
        let ctx = ExecutionContext::new();
        ctx.register_batch("users", users_batch(3));

        assert_eq!(ctx.table_names(), vec!["users".to_string()]);
        assert_eq!(ctx.table_schema("users").unwrap().fields().len(), 2);
        assert_eq!(ctx.table_row_count("users"), Some(3));
        assert!(ctx.table("users").is_ok());
        assert!(matches!(
            ctx.table("carts"),
            Err(BroadcastJoinError::TableNotFound(_))
        ));
    }

    #[test]
    fn test_large_batches_are_sliced() {
        let ctx = ExecutionContext::with_config(SessionConfig::new().with_batch_size(4));
        ctx.register_batch("users", users_batch(10));

        let provider = ctx.state.tables.read().get("users").cloned().unwrap();
        let batches = provider.scan(None).unwrap();
        let sizes: Vec<usize> = batches.iter().map(|b| b.num_rows()).collect();
        assert_eq!(sizes, vec![4, 4, 2]);
    }

    #[tokio::test]
    async fn test_collect_all_partitions() {
        let ctx = ExecutionContext::with_config(
            SessionConfig::new()
                .with_batch_size(3)
                .with_target_partitions(3),
        );
        ctx.register_batch("users", users_batch(10));

        let df = ctx.table("users").unwrap();
        let physical = df.physical_plan().unwrap();
        assert_eq!(physical.output_partitions(), 3);

        let batches = collect_partitions(physical).await.unwrap();
        assert_eq!(batches.iter().map(|b| b.num_rows()).sum::<usize>(), 10);
    }
}

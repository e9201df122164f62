//! DataFrame API over logical plans

use crate::error::{BroadcastJoinError, Result};
use crate::execution::context::{collect_partitions, QueryMetrics, QueryResult, SessionState};
use crate::physical::{display_plan, PhysicalOperator};
use crate::planner::{col, Expr, JoinType, LogicalPlan, PlanHint, PlanSchema};
use crate::storage::{self, CommitResult, SaveMode};
use arrow::record_batch::RecordBatch;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

/// A lazily evaluated table: a logical plan bound to the session that
/// registered its inputs
#[derive(Clone)]
pub struct DataFrame {
    state: Arc<SessionState>,
    plan: LogicalPlan,
}

impl fmt::Debug for DataFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataFrame").field("plan", &self.plan).finish()
    }
}

impl DataFrame {
    pub(crate) fn new(state: Arc<SessionState>, plan: LogicalPlan) -> Self {
        Self { state, plan }
    }

    fn with_plan(&self, plan: LogicalPlan) -> Self {
        Self::new(self.state.clone(), plan)
    }

    pub fn schema(&self) -> &PlanSchema {
        self.plan.schema()
    }

    pub fn logical_plan(&self) -> &LogicalPlan {
        &self.plan
    }

    /// Project the given expressions
    pub fn select(&self, exprs: Vec<Expr>) -> Result<DataFrame> {
        Ok(self.with_plan(self.plan.clone().project(exprs)?))
    }

    /// Project the given columns by name
    pub fn select_columns(&self, columns: &[&str]) -> Result<DataFrame> {
        self.select(columns.iter().map(|c| col(*c)).collect())
    }

    /// Add a column, or replace the column of the same name in place
    pub fn with_column(&self, name: &str, expr: Expr) -> Result<DataFrame> {
        let mut replaced = false;
        let mut exprs: Vec<Expr> = self
            .schema()
            .fields()
            .iter()
            .map(|f| {
                if f.name == name {
                    replaced = true;
                    expr.clone().alias(name)
                } else {
                    col(f.name.as_str())
                }
            })
            .collect();
        if !replaced {
            exprs.push(expr.alias(name));
        }
        self.select(exprs)
    }

    /// Equi-join with `right` on columns present on both sides
    ///
    /// The right input is the build side.
    pub fn join(&self, right: &DataFrame, using: &[&str], join_type: JoinType) -> Result<DataFrame> {
        if !Arc::ptr_eq(&self.state, &right.state) {
            return Err(BroadcastJoinError::InvalidArgument(
                "Cannot join DataFrames from different sessions".to_string(),
            ));
        }
        let using = using.iter().map(|c| c.to_string()).collect();
        let plan = self
            .plan
            .clone()
            .join_using(right.plan.clone(), using, join_type)?;
        Ok(self.with_plan(plan))
    }

    /// Mark this DataFrame as small enough to replicate to every partition
    pub fn hint(&self, hint: PlanHint) -> DataFrame {
        self.with_plan(self.plan.clone().hint(hint))
    }

    /// Create the physical plan against the tables registered right now
    pub fn physical_plan(&self) -> Result<Arc<dyn PhysicalOperator>> {
        self.state.physical_planner().create_physical_plan(&self.plan)
    }

    /// Render the physical plan tree
    pub fn explain(&self) -> Result<String> {
        Ok(display_plan(self.physical_plan()?.as_ref(), 0))
    }

    /// Execute and return batches with timing metrics
    pub async fn execute(&self) -> Result<QueryResult> {
        let start = Instant::now();
        let mut metrics = QueryMetrics::default();

        let plan_start = Instant::now();
        let physical = self.physical_plan()?;
        metrics.plan_time = plan_start.elapsed();

        let execute_start = Instant::now();
        let schema = physical.schema();
        let batches = collect_partitions(physical).await?;
        metrics.execute_time = execute_start.elapsed();
        metrics.total_time = start.elapsed();

        let row_count = batches.iter().map(|b| b.num_rows()).sum();
        Ok(QueryResult {
            schema,
            batches,
            row_count,
            metrics,
        })
    }

    pub async fn collect(&self) -> Result<Vec<RecordBatch>> {
        Ok(self.execute().await?.batches)
    }

    pub async fn count(&self) -> Result<usize> {
        Ok(self.execute().await?.row_count)
    }

    /// Execute and commit the result to a transactional table at `path`
    pub async fn write_delta(&self, path: impl AsRef<Path>, mode: SaveMode) -> Result<CommitResult> {
        let result = self.execute().await?;
        storage::write_table(
            path,
            result.schema,
            &result.batches,
            mode,
            self.state.config().max_rows_per_file,
        )
    }
}

/// Wrap a DataFrame in a broadcast hint
pub fn broadcast(df: &DataFrame) -> DataFrame {
    df.hint(PlanHint::Broadcast)
}

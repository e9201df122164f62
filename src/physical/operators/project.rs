//! Projection operator

use crate::error::Result;
use crate::physical::operators::expressions::evaluate_expr;
use crate::physical::{PhysicalOperator, RecordBatchStream};
use crate::planner::{Expr, PlanSchema};
use arrow::datatypes::{Schema, SchemaRef};
use arrow::record_batch::RecordBatch;
use async_trait::async_trait;
use futures::stream::TryStreamExt;
use std::fmt;
use std::sync::Arc;

/// Projection execution operator
#[derive(Debug)]
pub struct ProjectExec {
    input: Arc<dyn PhysicalOperator>,
    exprs: Vec<Expr>,
    schema: SchemaRef,
}

impl ProjectExec {
    pub fn try_new(input: Arc<dyn PhysicalOperator>, exprs: Vec<Expr>) -> Result<Self> {
        let input_schema = PlanSchema::try_from(input.schema().as_ref())?;

        let fields = exprs
            .iter()
            .map(|e| Ok(e.to_field(&input_schema)?.to_arrow_field()))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            input,
            exprs,
            schema: Arc::new(Schema::new(fields)),
        })
    }
}

#[async_trait]
impl PhysicalOperator for ProjectExec {
    fn schema(&self) -> SchemaRef {
        self.schema.clone()
    }

    fn children(&self) -> Vec<Arc<dyn PhysicalOperator>> {
        vec![self.input.clone()]
    }

    async fn execute(&self, partition: usize) -> Result<RecordBatchStream> {
        let input_stream = self.input.execute(partition).await?;
        let exprs = self.exprs.clone();
        let schema = self.schema.clone();

        let projected = input_stream.and_then(move |batch| {
            let result = project_batch(&batch, &exprs, &schema);
            async move { result }
        });

        Ok(Box::pin(projected))
    }

    fn output_partitions(&self) -> usize {
        // Projection preserves partitioning
        self.input.output_partitions()
    }

    fn name(&self) -> &str {
        "Project"
    }

    fn describe(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for ProjectExec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let exprs: Vec<String> = self.exprs.iter().map(|e| e.to_string()).collect();
        write!(f, "Project [{}]", exprs.join(", "))
    }
}

fn project_batch(batch: &RecordBatch, exprs: &[Expr], schema: &SchemaRef) -> Result<RecordBatch> {
    let columns = exprs
        .iter()
        .map(|expr| evaluate_expr(batch, expr))
        .collect::<Result<Vec<_>>>()?;

    RecordBatch::try_new(schema.clone(), columns).map_err(Into::into)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::physical::TableScanExec;
    use crate::planner::{col, round};
    use arrow::array::{Float64Array, Int64Array, StringArray};
    use arrow::datatypes::{DataType, Field};
    use futures::TryStreamExt;

    fn create_test_batch() -> RecordBatch {
        let schema = Arc::new(Schema::new(vec![
            Field::new("sale_id", DataType::Utf8, false),
            Field::new("user_id", DataType::Int64, false),
            Field::new("amount", DataType::Float64, false),
        ]));

        RecordBatch::try_new(
            schema,
            vec![
                Arc::new(StringArray::from(vec!["1", "2", "3"])),
                Arc::new(Int64Array::from(vec![10, 20, 30])),
                Arc::new(Float64Array::from(vec![1.005, 99.999, 12.345])),
            ],
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_project_columns() {
        let batch = create_test_batch();
        let scan = Arc::new(TableScanExec::from_batches("carts", vec![batch]));

        let project = ProjectExec::try_new(scan, vec![col("sale_id"), col("amount")]).unwrap();

        let stream = project.execute(0).await.unwrap();
        let results: Vec<RecordBatch> = stream.try_collect().await.unwrap();

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].num_columns(), 2);
        assert_eq!(results[0].num_rows(), 3);
        assert!(!project.schema().field(0).is_nullable());
    }

    #[tokio::test]
    async fn test_project_round_expression() {
        let batch = create_test_batch();
        let scan = Arc::new(TableScanExec::from_batches("carts", vec![batch]));

        let project =
            ProjectExec::try_new(scan, vec![round(col("amount"), 2).alias("amount")]).unwrap();
        assert_eq!(project.schema().field(0).name(), "amount");

        let stream = project.execute(0).await.unwrap();
        let results: Vec<RecordBatch> = stream.try_collect().await.unwrap();

        let values = results[0]
            .column(0)
            .as_any()
            .downcast_ref::<Float64Array>()
            .unwrap();
        assert_eq!(values.value(0), 1.01);
        assert_eq!(values.value(1), 100.0);
        assert_eq!(values.value(2), 12.35);
    }

    #[test]
    fn test_project_unknown_column() {
        let batch = create_test_batch();
        let scan = Arc::new(TableScanExec::from_batches("carts", vec![batch]));
        assert!(ProjectExec::try_new(scan, vec![col("region")]).is_err());
    }
}

//! Table providers and the scan operator

use crate::error::Result;
use crate::physical::{PhysicalOperator, RecordBatchStream};
use arrow::array::RecordBatch;
use arrow::datatypes::SchemaRef;
use async_trait::async_trait;
use futures::stream;
use std::fmt;
use std::sync::Arc;
use tokio::sync::OnceCell;

/// Table statistics from a data source
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableStatistics {
    /// Exact row count
    pub row_count: usize,
    /// Total size in bytes (approximate)
    pub total_byte_size: u64,
}

/// Table provider trait for accessing table data
pub trait TableProvider: Send + Sync + fmt::Debug {
    /// Get the schema of the table
    fn schema(&self) -> SchemaRef;

    /// Read the table, keeping only the `projection` columns when given
    fn scan(&self, projection: Option<&[usize]>) -> Result<Vec<RecordBatch>>;

    /// Get table-level statistics (row count, byte size).
    /// Returns None if statistics are not available.
    fn statistics(&self) -> Option<TableStatistics> {
        None
    }

    /// Number of batches a scan is expected to produce, if known without reading
    fn batch_count(&self) -> Option<usize> {
        None
    }
}

/// In-memory table provider
#[derive(Debug, Clone)]
pub struct MemoryTable {
    schema: SchemaRef,
    batches: Vec<RecordBatch>,
}

impl MemoryTable {
    pub fn new(schema: SchemaRef, batches: Vec<RecordBatch>) -> Self {
        Self { schema, batches }
    }
}

impl TableProvider for MemoryTable {
    fn schema(&self) -> SchemaRef {
        self.schema.clone()
    }

    fn scan(&self, projection: Option<&[usize]>) -> Result<Vec<RecordBatch>> {
        match projection {
            Some(indices) => self
                .batches
                .iter()
                .map(|batch| batch.project(indices).map_err(Into::into))
                .collect(),
            None => Ok(self.batches.clone()),
        }
    }

    fn statistics(&self) -> Option<TableStatistics> {
        Some(TableStatistics {
            row_count: self.batches.iter().map(|b| b.num_rows()).sum(),
            total_byte_size: self
                .batches
                .iter()
                .map(|b| b.get_array_memory_size() as u64)
                .sum(),
        })
    }

    fn batch_count(&self) -> Option<usize> {
        Some(self.batches.len())
    }
}

/// Table scan operator
///
/// The provider is read on first execution, not at planning time, so
/// rendering a plan never touches the data. Batches are dealt round-robin
/// across partitions.
pub struct TableScanExec {
    table_name: String,
    provider: Arc<dyn TableProvider>,
    /// Column indices in the provider schema, None for all columns
    projection: Option<Vec<usize>>,
    schema: SchemaRef,
    partitions: usize,
    batches: OnceCell<Vec<RecordBatch>>,
}

impl fmt::Debug for TableScanExec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TableScanExec")
            .field("table_name", &self.table_name)
            .field("projection", &self.projection)
            .field("partitions", &self.partitions)
            .finish()
    }
}

impl TableScanExec {
    pub fn try_new(
        table_name: impl Into<String>,
        provider: Arc<dyn TableProvider>,
        projection: Option<Vec<usize>>,
    ) -> Result<Self> {
        let schema = match &projection {
            Some(indices) => Arc::new(provider.schema().project(indices)?),
            None => provider.schema(),
        };

        Ok(Self {
            table_name: table_name.into(),
            provider,
            projection,
            schema,
            partitions: 1,
            batches: OnceCell::new(),
        })
    }

    /// Scan over batches already in memory
    pub fn from_batches(table_name: impl Into<String>, batches: Vec<RecordBatch>) -> Self {
        let schema = match batches.first() {
            Some(batch) => batch.schema(),
            None => Arc::new(arrow::datatypes::Schema::empty()),
        };
        Self {
            table_name: table_name.into(),
            provider: Arc::new(MemoryTable::new(schema.clone(), batches)),
            projection: None,
            schema,
            partitions: 1,
            batches: OnceCell::new(),
        }
    }

    /// Spread the batches over at most `target` partitions
    pub fn with_target_partitions(mut self, target: usize) -> Self {
        let target = match self.provider.batch_count() {
            Some(count) => target.min(count),
            None => target,
        };
        self.partitions = target.max(1);
        self
    }

    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    pub fn projection(&self) -> Option<&[usize]> {
        self.projection.as_deref()
    }

    async fn batches(&self) -> Result<&Vec<RecordBatch>> {
        self.batches
            .get_or_try_init(|| async {
                let batches = self.provider.scan(self.projection.as_deref())?;
                tracing::debug!(
                    table = %self.table_name,
                    batches = batches.len(),
                    "Scanned table"
                );
                Ok(batches)
            })
            .await
    }
}

#[async_trait]
impl PhysicalOperator for TableScanExec {
    fn schema(&self) -> SchemaRef {
        self.schema.clone()
    }

    fn children(&self) -> Vec<Arc<dyn PhysicalOperator>> {
        vec![]
    }

    async fn execute(&self, partition: usize) -> Result<RecordBatchStream> {
        let num_partitions = self.partitions;

        let batches: Vec<RecordBatch> = self
            .batches()
            .await?
            .iter()
            .enumerate()
            .filter(|(i, _)| i % num_partitions == partition)
            .map(|(_, batch)| batch.clone())
            .collect();

        Ok(Box::pin(stream::iter(batches.into_iter().map(Ok))))
    }

    fn output_partitions(&self) -> usize {
        self.partitions
    }

    fn name(&self) -> &str {
        "Scan"
    }

    fn describe(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for TableScanExec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let columns: Vec<&str> = self
            .schema
            .fields()
            .iter()
            .map(|f| f.name().as_str())
            .collect();
        write!(f, "Scan {} [{}]", self.table_name, columns.join(", "))?;
        if self.partitions > 1 {
            write!(f, " partitions={}", self.partitions)?;
        }
        Ok(())
    }
}

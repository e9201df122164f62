//! Hash repartitioning (shuffle exchange)

use crate::error::{BroadcastJoinError, Result};
use crate::physical::operators::join_key::extract_join_key;
use crate::physical::{PhysicalOperator, RecordBatchStream};
use arrow::array::{ArrayRef, UInt32Array};
use arrow::compute;
use arrow::datatypes::SchemaRef;
use arrow::record_batch::RecordBatch;
use async_trait::async_trait;
use futures::stream::{self, TryStreamExt};
use std::fmt;
use std::sync::Arc;
use tokio::sync::OnceCell;

/// Redistributes rows so that equal keys land in the same output partition
pub struct RepartitionExec {
    input: Arc<dyn PhysicalOperator>,
    /// Key column indices in the input schema
    keys: Vec<usize>,
    partitions: usize,
    /// Input drained once, then served per output partition
    buckets: OnceCell<Vec<Vec<RecordBatch>>>,
}

impl fmt::Debug for RepartitionExec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RepartitionExec")
            .field("input", &self.input)
            .field("keys", &self.keys)
            .field("partitions", &self.partitions)
            .finish()
    }
}

impl RepartitionExec {
    pub fn try_new(
        input: Arc<dyn PhysicalOperator>,
        keys: Vec<usize>,
        partitions: usize,
    ) -> Result<Self> {
        let width = input.schema().fields().len();
        if let Some(bad) = keys.iter().find(|&&k| k >= width) {
            return Err(BroadcastJoinError::Plan(format!(
                "Repartition key index {} out of range for {} columns",
                bad, width
            )));
        }
        Ok(Self {
            input,
            keys,
            partitions: partitions.max(1),
            buckets: OnceCell::new(),
        })
    }

    async fn shuffle(&self) -> Result<Vec<Vec<RecordBatch>>> {
        let input_partitions = self.input.output_partitions().max(1);
        let futures: Vec<_> = (0..input_partitions)
            .map(|p| async move {
                let stream = self.input.execute(p).await?;
                stream.try_collect::<Vec<RecordBatch>>().await
            })
            .collect();

        let mut buckets: Vec<Vec<RecordBatch>> = vec![Vec::new(); self.partitions];
        for input in futures::future::join_all(futures).await {
            for batch in input? {
                for (p, part) in split_batch(&batch, &self.keys, self.partitions)?
                    .into_iter()
                    .enumerate()
                {
                    if let Some(part) = part {
                        buckets[p].push(part);
                    }
                }
            }
        }

        tracing::debug!(
            partitions = self.partitions,
            rows = buckets
                .iter()
                .flatten()
                .map(|b| b.num_rows())
                .sum::<usize>(),
            "Shuffled input"
        );
        Ok(buckets)
    }
}

/// Split one batch into per-partition batches by key hash
fn split_batch(
    batch: &RecordBatch,
    keys: &[usize],
    partitions: usize,
) -> Result<Vec<Option<RecordBatch>>> {
    let key_arrays: Vec<ArrayRef> = keys.iter().map(|&k| batch.column(k).clone()).collect();

    let mut indices: Vec<Vec<u32>> = vec![Vec::new(); partitions];
    for row in 0..batch.num_rows() {
        let p = extract_join_key(&key_arrays, row).partition(partitions);
        indices[p].push(row as u32);
    }

    indices
        .into_iter()
        .map(|rows| {
            if rows.is_empty() {
                return Ok(None);
            }
            let take = UInt32Array::from(rows);
            let columns = batch
                .columns()
                .iter()
                .map(|c| compute::take(c.as_ref(), &take, None))
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(Some(RecordBatch::try_new(batch.schema(), columns)?))
        })
        .collect()
}

#[async_trait]
impl PhysicalOperator for RepartitionExec {
    fn schema(&self) -> SchemaRef {
        self.input.schema()
    }

    fn children(&self) -> Vec<Arc<dyn PhysicalOperator>> {
        vec![self.input.clone()]
    }

    async fn execute(&self, partition: usize) -> Result<RecordBatchStream> {
        let buckets = self.buckets.get_or_try_init(|| self.shuffle()).await?;
        let batches = buckets.get(partition).cloned().unwrap_or_default();
        Ok(Box::pin(stream::iter(batches.into_iter().map(Ok))))
    }

    fn output_partitions(&self) -> usize {
        self.partitions
    }

    fn name(&self) -> &str {
        "Exchange"
    }

    fn describe(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for RepartitionExec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let schema = self.input.schema();
        let keys: Vec<&str> = self
            .keys
            .iter()
            .map(|&k| schema.field(k).name().as_str())
            .collect();
        write!(
            f,
            "Exchange hashpartitioning({}, {})",
            keys.join(", "),
            self.partitions
        )
    }
}

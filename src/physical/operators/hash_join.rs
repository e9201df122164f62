//! Hash join operator
//!
//! The right input is the build side and the left input is probed. In
//! `CollectRight` mode (broadcast) the whole right input is collected and
//! hashed once, then shared by every probe partition. In `Partitioned` mode
//! both inputs are expected to be hash-partitioned on the join keys and each
//! partition builds its own table.

use crate::error::{BroadcastJoinError, Result};
use crate::physical::operators::join_key::{extract_join_key, JoinKey};
use crate::physical::{PhysicalOperator, RecordBatchStream};
use crate::planner::JoinType;
use arrow::array::{new_null_array, ArrayRef, UInt32Array};
use arrow::compute;
use arrow::datatypes::{Field, Schema, SchemaRef};
use arrow::record_batch::RecordBatch;
use async_trait::async_trait;
use futures::stream::TryStreamExt;
use hashbrown::HashMap;
use rayon::prelude::*;
use std::fmt;
use std::sync::Arc;
use tokio::sync::OnceCell;

/// How the build side is distributed across probe partitions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartitionMode {
    /// Replicate the entire build side to every probe partition
    CollectRight,
    /// Build and probe inputs are co-partitioned on the join keys
    Partitioned,
}

/// Upper bound on a broadcast build side
const MAX_BROADCAST_ROWS: usize = 50_000_000;
const MAX_BROADCAST_BYTES: u64 = 4 * 1024 * 1024 * 1024; // 4GB

/// Threshold for parallel build (use parallel for larger datasets)
const PARALLEL_BUILD_THRESHOLD: usize = 10_000;

/// Hashed build side: all rows in one batch plus key -> row indices
#[derive(Debug)]
struct BuildSide {
    batch: RecordBatch,
    table: HashMap<JoinKey, Vec<u32>>,
}

/// Hash join execution operator
pub struct HashJoinExec {
    left: Arc<dyn PhysicalOperator>,
    right: Arc<dyn PhysicalOperator>,
    /// Equi-join key pairs as (left index, right index)
    on: Vec<(usize, usize)>,
    join_type: JoinType,
    mode: PartitionMode,
    /// Right columns that appear in the output (keys are emitted once, from the left)
    right_output: Vec<usize>,
    schema: SchemaRef,
    /// Broadcast build side, computed once and shared by all partitions
    build_cache: OnceCell<Arc<BuildSide>>,
}

impl fmt::Debug for HashJoinExec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HashJoinExec")
            .field("left", &self.left)
            .field("right", &self.right)
            .field("on", &self.on)
            .field("join_type", &self.join_type)
            .field("mode", &self.mode)
            .finish()
    }
}

impl HashJoinExec {
    pub fn try_new(
        left: Arc<dyn PhysicalOperator>,
        right: Arc<dyn PhysicalOperator>,
        on: Vec<(usize, usize)>,
        join_type: JoinType,
        mode: PartitionMode,
    ) -> Result<Self> {
        let left_schema = left.schema();
        let right_schema = right.schema();

        if on.is_empty() {
            return Err(BroadcastJoinError::Plan(
                "Hash join requires at least one key pair".to_string(),
            ));
        }
        for &(l, r) in &on {
            if l >= left_schema.fields().len() || r >= right_schema.fields().len() {
                return Err(BroadcastJoinError::Plan(format!(
                    "Join key ({}, {}) out of range",
                    l, r
                )));
            }
            let (lt, rt) = (
                left_schema.field(l).data_type(),
                right_schema.field(r).data_type(),
            );
            if lt != rt {
                return Err(BroadcastJoinError::Plan(format!(
                    "Join key types differ: {} vs {}",
                    lt, rt
                )));
            }
        }

        if mode == PartitionMode::Partitioned
            && left.output_partitions() != right.output_partitions()
        {
            return Err(BroadcastJoinError::Plan(format!(
                "Partitioned join needs co-partitioned inputs, got {} and {}",
                left.output_partitions(),
                right.output_partitions()
            )));
        }

        let right_output: Vec<usize> = (0..right_schema.fields().len())
            .filter(|i| !on.iter().any(|&(_, r)| r == *i))
            .collect();

        // Unmatched left rows carry nulls on the right
        let right_nullable = matches!(join_type, JoinType::Left);
        let fields: Vec<Arc<Field>> = left_schema
            .fields()
            .iter()
            .cloned()
            .chain(right_output.iter().map(|&i| {
                let f = right_schema.field(i);
                Arc::new(f.clone().with_nullable(f.is_nullable() || right_nullable))
            }))
            .collect();

        Ok(Self {
            left,
            right,
            on,
            join_type,
            mode,
            right_output,
            schema: Arc::new(Schema::new(fields)),
            build_cache: OnceCell::new(),
        })
    }

    pub fn mode(&self) -> PartitionMode {
        self.mode
    }

    pub fn join_type(&self) -> JoinType {
        self.join_type
    }

    async fn collect_build_side(&self, partitions: Vec<usize>) -> Result<BuildSide> {
        let mut batches = Vec::new();
        let mut rows = 0usize;
        let mut bytes = 0u64;
        for p in partitions {
            let stream = self.right.execute(p).await?;
            let collected: Vec<RecordBatch> = stream.try_collect().await?;
            for b in &collected {
                rows += b.num_rows();
                bytes += b.get_array_memory_size() as u64;
            }
            batches.extend(collected);

            if self.mode == PartitionMode::CollectRight
                && (rows > MAX_BROADCAST_ROWS || bytes > MAX_BROADCAST_BYTES)
            {
                return Err(BroadcastJoinError::Execution(format!(
                    "Broadcast build side too large ({} rows, {} bytes); \
                     disable the broadcast hint or lower the broadcast threshold",
                    rows, bytes
                )));
            }
        }

        let batch = compute::concat_batches(&self.right.schema(), &batches)?;
        let right_keys: Vec<usize> = self.on.iter().map(|&(_, r)| r).collect();
        let table = build_hash_table(&batch, &right_keys);

        Ok(BuildSide { batch, table })
    }
}

#[async_trait]
impl PhysicalOperator for HashJoinExec {
    fn schema(&self) -> SchemaRef {
        self.schema.clone()
    }

    fn children(&self) -> Vec<Arc<dyn PhysicalOperator>> {
        vec![self.left.clone(), self.right.clone()]
    }

    async fn execute(&self, partition: usize) -> Result<RecordBatchStream> {
        let build = match self.mode {
            PartitionMode::CollectRight => self
                .build_cache
                .get_or_try_init(|| async {
                    let all = (0..self.right.output_partitions().max(1)).collect();
                    let build = self.collect_build_side(all).await?;
                    tracing::debug!(
                        rows = build.batch.num_rows(),
                        keys = build.table.len(),
                        "Broadcast build side ready"
                    );
                    Ok::<_, BroadcastJoinError>(Arc::new(build))
                })
                .await?
                .clone(),
            PartitionMode::Partitioned => {
                Arc::new(self.collect_build_side(vec![partition]).await?)
            }
        };

        let probe_stream = self.left.execute(partition).await?;
        let left_keys: Vec<usize> = self.on.iter().map(|&(l, _)| l).collect();
        let right_output = self.right_output.clone();
        let join_type = self.join_type;
        let schema = self.schema.clone();

        let joined = probe_stream.and_then(move |probe| {
            let result = probe_batch(
                &probe,
                &build,
                &left_keys,
                &right_output,
                join_type,
                &schema,
            );
            async move { result }
        });

        Ok(Box::pin(joined))
    }

    fn output_partitions(&self) -> usize {
        // The probe side drives partitioning; the build side is replicated or co-partitioned
        self.left.output_partitions().max(1)
    }

    fn name(&self) -> &str {
        match self.mode {
            PartitionMode::CollectRight => "BroadcastHashJoin",
            PartitionMode::Partitioned => "ShuffledHashJoin",
        }
    }

    fn describe(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for HashJoinExec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let left_schema = self.left.schema();
        let right_schema = self.right.schema();
        let left_keys: Vec<&str> = self
            .on
            .iter()
            .map(|&(l, _)| left_schema.field(l).name().as_str())
            .collect();
        let right_keys: Vec<&str> = self
            .on
            .iter()
            .map(|&(_, r)| right_schema.field(r).name().as_str())
            .collect();
        write!(
            f,
            "{} [{}], [{}], {}, BuildRight",
            self.name(),
            left_keys.join(", "),
            right_keys.join(", "),
            self.join_type.physical_name()
        )
    }
}

fn build_hash_table(batch: &RecordBatch, keys: &[usize]) -> HashMap<JoinKey, Vec<u32>> {
    let key_arrays: Vec<ArrayRef> = keys.iter().map(|&k| batch.column(k).clone()).collect();
    let rows = batch.num_rows();

    let insert_range = |range: std::ops::Range<usize>| {
        let mut partial: HashMap<JoinKey, Vec<u32>> = HashMap::new();
        for row in range {
            let key = extract_join_key(&key_arrays, row);
            // Skip null keys (null != null in SQL)
            if key.has_null() {
                continue;
            }
            partial.entry(key).or_default().push(row as u32);
        }
        partial
    };

    if rows < PARALLEL_BUILD_THRESHOLD {
        return insert_range(0..rows);
    }

    // Build partial tables over row chunks in parallel, then merge in chunk order
    let chunk = rows.div_ceil(rayon::current_num_threads().max(1));
    let partials: Vec<HashMap<JoinKey, Vec<u32>>> = (0..rows)
        .step_by(chunk)
        .collect::<Vec<_>>()
        .into_par_iter()
        .map(|start| insert_range(start..(start + chunk).min(rows)))
        .collect();

    let mut table: HashMap<JoinKey, Vec<u32>> = HashMap::new();
    for partial in partials {
        for (key, entries) in partial {
            table.entry(key).or_default().extend(entries);
        }
    }
    table
}

fn probe_batch(
    probe: &RecordBatch,
    build: &BuildSide,
    left_keys: &[usize],
    right_output: &[usize],
    join_type: JoinType,
    schema: &SchemaRef,
) -> Result<RecordBatch> {
    let key_arrays: Vec<ArrayRef> = left_keys.iter().map(|&k| probe.column(k).clone()).collect();

    let mut probe_indices: Vec<u32> = Vec::with_capacity(probe.num_rows());
    let mut build_indices: Vec<Option<u32>> = Vec::with_capacity(probe.num_rows());

    for row in 0..probe.num_rows() {
        let key = extract_join_key(&key_arrays, row);
        let matches = if key.has_null() {
            None
        } else {
            build.table.get(&key)
        };

        match matches {
            Some(rows) => {
                for &b in rows {
                    probe_indices.push(row as u32);
                    build_indices.push(Some(b));
                }
            }
            None if join_type == JoinType::Left => {
                probe_indices.push(row as u32);
                build_indices.push(None);
            }
            None => {}
        }
    }

    let probe_take = UInt32Array::from(probe_indices);
    let mut columns: Vec<ArrayRef> = probe
        .columns()
        .iter()
        .map(|c| compute::take(c.as_ref(), &probe_take, None))
        .collect::<std::result::Result<Vec<_>, _>>()?;

    let all_unmatched = build_indices.iter().all(Option::is_none);
    let build_take = UInt32Array::from(build_indices);
    for &i in right_output {
        let column = build.batch.column(i);
        if all_unmatched {
            columns.push(new_null_array(column.data_type(), build_take.len()));
        } else {
            columns.push(compute::take(column.as_ref(), &build_take, None)?);
        }
    }

    RecordBatch::try_new(schema.clone(), columns).map_err(Into::into)
}

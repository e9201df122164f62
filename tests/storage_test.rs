//! Transactional table writes through the DataFrame API

use arrow::array::{Float64Array, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use broadcast_join::execution::{ExecutionContext, SessionConfig};
use broadcast_join::planner::col;
use broadcast_join::storage::{log, DeltaTable, SaveMode};
use broadcast_join::BroadcastJoinError;
use std::sync::Arc;

fn context_with_sales(ids: &[&str]) -> ExecutionContext {
    let ctx = ExecutionContext::with_config(
        SessionConfig::new()
            .with_target_partitions(2)
            .with_max_rows_per_file(3),
    );
    let schema = Arc::new(Schema::new(vec![
        Field::new("sale_id", DataType::Utf8, false),
        Field::new("amount", DataType::Float64, false),
    ]));
    let amounts: Vec<f64> = (0..ids.len()).map(|i| i as f64).collect();
    let batch = RecordBatch::try_new(
        schema,
        vec![
            Arc::new(StringArray::from(ids.to_vec())),
            Arc::new(Float64Array::from(amounts)),
        ],
    )
    .unwrap();
    ctx.register_batch("sales", batch);
    ctx
}

#[tokio::test]
async fn test_overwrite_replaces_active_files() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("sales");

    let first = context_with_sales(&["1", "2", "3", "4", "5"]);
    let commit = first
        .table("sales")
        .unwrap()
        .write_delta(&path, SaveMode::Overwrite)
        .await
        .unwrap();
    assert_eq!(commit.version, 0);
    assert_eq!(commit.rows_written, 5);
    assert_eq!(commit.files_added, 2);

    let first_files: Vec<String> = DeltaTable::open(&path)
        .unwrap()
        .snapshot()
        .files()
        .iter()
        .map(|f| f.path.clone())
        .collect();

    let second = context_with_sales(&["6", "7"]);
    let commit = second
        .table("sales")
        .unwrap()
        .write_delta(&path, SaveMode::Overwrite)
        .await
        .unwrap();
    assert_eq!(commit.version, 1);
    assert_eq!(commit.files_removed, 2);

    let table = DeltaTable::open(&path).unwrap();
    assert_eq!(table.version(), 1);
    assert!(table
        .snapshot()
        .files()
        .iter()
        .all(|f| !first_files.contains(&f.path)));

    let reader = ExecutionContext::new();
    reader.register_delta("sales", &path).unwrap();
    assert_eq!(reader.table("sales").unwrap().count().await.unwrap(), 2);

    // old data files stay on disk until vacuumed
    for file in &first_files {
        assert!(path.join(file).exists());
    }
}

#[tokio::test]
async fn test_append_accumulates() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("sales");
    let ctx = context_with_sales(&["1", "2"]);
    let df = ctx.table("sales").unwrap();

    df.write_delta(&path, SaveMode::Append).await.unwrap();
    let commit = df.write_delta(&path, SaveMode::Append).await.unwrap();
    assert_eq!(commit.version, 1);
    assert_eq!(commit.files_removed, 0);

    let table = DeltaTable::open(&path).unwrap();
    assert_eq!(table.snapshot().num_records(), Some(4));
}

#[tokio::test]
async fn test_error_if_exists() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("sales");
    let df = context_with_sales(&["1"]).table("sales").unwrap();

    df.write_delta(&path, SaveMode::ErrorIfExists).await.unwrap();
    let err = df.write_delta(&path, SaveMode::ErrorIfExists).await;
    assert!(matches!(err, Err(BroadcastJoinError::TableExists(_))));

    let ignored = df.write_delta(&path, SaveMode::Ignore).await.unwrap();
    assert!(!ignored.committed);
}

#[tokio::test]
async fn test_history_newest_first() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("sales");
    let df = context_with_sales(&["1", "2"]).table("sales").unwrap();

    df.write_delta(&path, SaveMode::Overwrite).await.unwrap();
    df.write_delta(&path, SaveMode::Append).await.unwrap();
    df.write_delta(&path, SaveMode::Overwrite).await.unwrap();

    let history = DeltaTable::history(&path).unwrap();
    let versions: Vec<u64> = history.iter().map(|h| h.version).collect();
    assert_eq!(versions, vec![2, 1, 0]);

    let info = history[1].info.as_ref().unwrap();
    assert_eq!(info.operation, "WRITE");
    assert_eq!(info.operation_parameters["mode"], "Append");
    assert_eq!(info.operation_metrics["numOutputRows"], "2");
}

#[tokio::test]
async fn test_commit_log_layout() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("sales");
    let df = context_with_sales(&["1"]).table("sales").unwrap();
    df.write_delta(&path, SaveMode::Overwrite).await.unwrap();

    assert!(path
        .join("_delta_log")
        .join("00000000000000000000.json")
        .is_file());

    let actions = log::read_commit(&path, 0).unwrap();
    assert!(matches!(actions[0], log::Action::CommitInfo(_)));
    assert!(actions
        .iter()
        .any(|a| matches!(a, log::Action::Protocol(_))));
    assert!(actions
        .iter()
        .any(|a| matches!(a, log::Action::MetaData(_))));

    let adds: Vec<&log::AddFile> = actions
        .iter()
        .filter_map(|a| match a {
            log::Action::Add(add) => Some(add),
            _ => None,
        })
        .collect();
    assert_eq!(adds.len(), 1);
    assert!(adds[0].path.ends_with(".snappy.parquet"));
    assert_eq!(adds[0].num_records(), Some(1));
}

#[tokio::test]
async fn test_projected_read_defers_file_access() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("sales");
    context_with_sales(&["1", "2", "3", "4"])
        .table("sales")
        .unwrap()
        .write_delta(&path, SaveMode::Overwrite)
        .await
        .unwrap();

    let reader = ExecutionContext::new();
    reader.register_delta("sales", &path).unwrap();
    let amounts = reader
        .table("sales")
        .unwrap()
        .select(vec![col("amount")])
        .unwrap();
    let plan = amounts.explain().unwrap();
    assert!(plan.contains("Scan sales [amount]"), "{}", plan);

    let mut values: Vec<f64> = amounts
        .collect()
        .await
        .unwrap()
        .iter()
        .flat_map(|b| {
            b.column(0)
                .as_any()
                .downcast_ref::<Float64Array>()
                .unwrap()
                .values()
                .to_vec()
        })
        .collect();
    values.sort_by(|a, b| a.partial_cmp(b).unwrap());
    assert_eq!(values, vec![0.0, 1.0, 2.0, 3.0]);

    // the plan renders from the log alone; data is only read on execution
    for file in DeltaTable::open(&path).unwrap().snapshot().files() {
        std::fs::remove_file(path.join(&file.path)).unwrap();
    }
    assert!(amounts.explain().is_ok());
    assert!(amounts.collect().await.is_err());
}

//! Transactional Parquet table
//!
//! A table is a directory of immutable Parquet data files plus a commit
//! log. Replaying the log yields a `Snapshot`: the latest version, the
//! schema and the set of active files. Writers stage data files first and
//! then publish a single commit, so readers only ever see whole commits.

use crate::error::{BroadcastJoinError, Result};
use crate::physical::operators::{TableProvider, TableStatistics};
use crate::storage::log::{
    self, Action, AddFile, CommitInfo, FileStats, Metadata, Protocol, RemoveFile,
};
use crate::storage::parquet::{read_parquet_file, write_parquet_file};
use arrow::datatypes::SchemaRef;
use arrow::record_batch::RecordBatch;
use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// What to do when the target table already exists
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveMode {
    /// Replace every active file in one commit
    Overwrite,
    /// Add files alongside the existing ones
    Append,
    /// Fail when the table exists
    ErrorIfExists,
    /// Leave an existing table untouched
    Ignore,
}

impl fmt::Display for SaveMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SaveMode::Overwrite => "Overwrite",
            SaveMode::Append => "Append",
            SaveMode::ErrorIfExists => "ErrorIfExists",
            SaveMode::Ignore => "Ignore",
        };
        f.write_str(name)
    }
}

impl FromStr for SaveMode {
    type Err = BroadcastJoinError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "overwrite" => Ok(SaveMode::Overwrite),
            "append" => Ok(SaveMode::Append),
            "errorifexists" | "error" => Ok(SaveMode::ErrorIfExists),
            "ignore" => Ok(SaveMode::Ignore),
            other => Err(BroadcastJoinError::InvalidArgument(format!(
                "Unknown save mode: {}",
                other
            ))),
        }
    }
}

/// State of a table at one version
#[derive(Debug, Clone)]
pub struct Snapshot {
    version: u64,
    protocol: Protocol,
    metadata: Metadata,
    schema: SchemaRef,
    /// Active files in the order they were added
    files: Vec<AddFile>,
}

impl Snapshot {
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn protocol(&self) -> &Protocol {
        &self.protocol
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    pub fn schema(&self) -> SchemaRef {
        self.schema.clone()
    }

    pub fn files(&self) -> &[AddFile] {
        &self.files
    }

    /// Row count from file statistics; None if any file lacks them
    pub fn num_records(&self) -> Option<u64> {
        self.files.iter().map(|f| f.num_records()).sum()
    }

    fn replay(root: &Path, versions: &[u64]) -> Result<Self> {
        let mut protocol = None;
        let mut metadata = None;
        let mut files: Vec<AddFile> = Vec::new();

        for (expected, &version) in versions.iter().enumerate() {
            if version != expected as u64 {
                return Err(BroadcastJoinError::Storage(format!(
                    "Commit log of {} is missing version {}",
                    root.display(),
                    expected
                )));
            }
            for action in log::read_commit(root, version)? {
                match action {
                    Action::Protocol(p) => protocol = Some(p),
                    Action::MetaData(m) => metadata = Some(m),
                    Action::Add(add) => {
                        files.retain(|f| f.path != add.path);
                        files.push(add);
                    }
                    Action::Remove(remove) => files.retain(|f| f.path != remove.path),
                    Action::CommitInfo(_) => {}
                }
            }
        }

        let version = versions.last().copied().ok_or_else(|| {
            BroadcastJoinError::TableNotFound(root.display().to_string())
        })?;
        let metadata = metadata.ok_or_else(|| {
            BroadcastJoinError::Storage(format!("No table metadata in {}", root.display()))
        })?;
        let schema = metadata.schema()?;

        Ok(Self {
            version,
            protocol: protocol.unwrap_or_default(),
            metadata,
            schema,
            files,
        })
    }
}

/// One entry of the commit history
#[derive(Debug, Clone, PartialEq)]
pub struct CommitRecord {
    pub version: u64,
    pub info: Option<CommitInfo>,
}

/// Outcome of a write
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitResult {
    /// Version committed, or the existing version when nothing was written
    pub version: u64,
    pub mode: SaveMode,
    pub files_added: usize,
    pub files_removed: usize,
    pub rows_written: usize,
    /// False when `Ignore` found an existing table
    pub committed: bool,
}

/// A transactional Parquet table opened at its latest version
#[derive(Debug, Clone)]
pub struct DeltaTable {
    root: PathBuf,
    snapshot: Snapshot,
}

impl DeltaTable {
    /// Open the latest version of the table at `path`
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let root = path.as_ref();
        Self::try_open(root)?
            .ok_or_else(|| BroadcastJoinError::TableNotFound(root.display().to_string()))
    }

    /// Open the table if a commit log exists at `path`
    pub fn try_open(path: impl AsRef<Path>) -> Result<Option<Self>> {
        let root = path.as_ref();
        let versions = log::list_versions(root)?;
        if versions.is_empty() {
            return Ok(None);
        }

        let snapshot = Snapshot::replay(root, &versions)?;
        tracing::debug!(
            path = %root.display(),
            version = snapshot.version,
            files = snapshot.files.len(),
            "Opened table"
        );
        Ok(Some(Self {
            root: root.to_path_buf(),
            snapshot,
        }))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn version(&self) -> u64 {
        self.snapshot.version
    }

    pub fn snapshot(&self) -> &Snapshot {
        &self.snapshot
    }

    /// Commit history of the table at `path`, newest first
    pub fn history(path: impl AsRef<Path>) -> Result<Vec<CommitRecord>> {
        let root = path.as_ref();
        let versions = log::list_versions(root)?;
        if versions.is_empty() {
            return Err(BroadcastJoinError::TableNotFound(root.display().to_string()));
        }

        let mut history = Vec::with_capacity(versions.len());
        for &version in versions.iter().rev() {
            let info = log::read_commit(root, version)?
                .into_iter()
                .find_map(|action| match action {
                    Action::CommitInfo(info) => Some(info),
                    _ => None,
                });
            history.push(CommitRecord { version, info });
        }
        Ok(history)
    }
}

impl TableProvider for DeltaTable {
    fn schema(&self) -> SchemaRef {
        self.snapshot.schema()
    }

    fn scan(&self, projection: Option<&[usize]>) -> Result<Vec<RecordBatch>> {
        let mut all_batches = Vec::new();
        for file in &self.snapshot.files {
            let batches = read_parquet_file(&self.root.join(&file.path), projection)?;
            all_batches.extend(batches);
        }
        Ok(all_batches)
    }

    fn statistics(&self) -> Option<TableStatistics> {
        Some(TableStatistics {
            row_count: self.snapshot.num_records()? as usize,
            total_byte_size: self.snapshot.files.iter().map(|f| f.size).sum(),
        })
    }

    fn batch_count(&self) -> Option<usize> {
        Some(self.snapshot.files.len())
    }
}

/// Write `batches` to the table at `path` and publish one commit
pub fn write_table(
    path: impl AsRef<Path>,
    schema: SchemaRef,
    batches: &[RecordBatch],
    mode: SaveMode,
    max_rows_per_file: usize,
) -> Result<CommitResult> {
    let root = path.as_ref();
    let existing = DeltaTable::try_open(root)?;

    if let Some(table) = &existing {
        match mode {
            SaveMode::ErrorIfExists => {
                return Err(BroadcastJoinError::TableExists(root.display().to_string()))
            }
            SaveMode::Ignore => {
                tracing::info!(path = %root.display(), version = table.version(), "Table exists, write ignored");
                return Ok(CommitResult {
                    version: table.version(),
                    mode,
                    files_added: 0,
                    files_removed: 0,
                    rows_written: 0,
                    committed: false,
                });
            }
            SaveMode::Append => {
                if !same_columns(&table.schema(), &schema) {
                    return Err(BroadcastJoinError::Storage(format!(
                        "Cannot append to {}: schema differs from the table schema",
                        root.display()
                    )));
                }
            }
            SaveMode::Overwrite => {}
        }
    }

    fs::create_dir_all(root)?;
    let now = chrono::Utc::now().timestamp_millis();

    let mut actions = Vec::new();
    let version = match &existing {
        Some(table) => table.version() + 1,
        None => 0,
    };

    // Data files go down before the commit that references them
    let added = write_data_files(root, &schema, batches, max_rows_per_file, now)?;
    let rows_written: usize = batches.iter().map(|b| b.num_rows()).sum();

    let removed: Vec<RemoveFile> = match (&existing, mode) {
        (Some(table), SaveMode::Overwrite) => table
            .snapshot
            .files
            .iter()
            .map(|f| RemoveFile {
                path: f.path.clone(),
                deletion_timestamp: Some(now),
                data_change: true,
            })
            .collect(),
        _ => Vec::new(),
    };

    actions.push(Action::CommitInfo(commit_info(
        now,
        mode,
        added.len(),
        removed.len(),
        rows_written,
    )));
    match &existing {
        None => {
            actions.push(Action::Protocol(Protocol::default()));
            let id = uuid::Uuid::new_v4().to_string();
            actions.push(Action::MetaData(Metadata::new(id, &schema, now)?));
        }
        Some(table) if mode == SaveMode::Overwrite => {
            // Overwrite may change the schema; the table keeps its identity
            let id = table.snapshot.metadata.id.clone();
            let created = table.snapshot.metadata.created_time.unwrap_or(now);
            actions.push(Action::MetaData(Metadata::new(id, &schema, created)?));
        }
        Some(_) => {}
    }

    let files_added = added.len();
    let files_removed = removed.len();
    actions.extend(removed.into_iter().map(Action::Remove));
    actions.extend(added.into_iter().map(Action::Add));

    log::write_commit(root, version, &actions)?;
    tracing::info!(
        path = %root.display(),
        version,
        mode = %mode,
        files_added,
        files_removed,
        rows = rows_written,
        "Committed table version"
    );

    Ok(CommitResult {
        version,
        mode,
        files_added,
        files_removed,
        rows_written,
        committed: true,
    })
}

fn same_columns(a: &SchemaRef, b: &SchemaRef) -> bool {
    a.fields().len() == b.fields().len()
        && a
            .fields()
            .iter()
            .zip(b.fields().iter())
            .all(|(x, y)| x.name() == y.name() && x.data_type() == y.data_type())
}

fn commit_info(
    timestamp: i64,
    mode: SaveMode,
    files_added: usize,
    files_removed: usize,
    rows: usize,
) -> CommitInfo {
    let operation_parameters = HashMap::from([("mode".to_string(), mode.to_string())]);
    let operation_metrics = HashMap::from([
        ("numFiles".to_string(), files_added.to_string()),
        ("numRemovedFiles".to_string(), files_removed.to_string()),
        ("numOutputRows".to_string(), rows.to_string()),
    ]);
    CommitInfo {
        timestamp,
        operation: "WRITE".to_string(),
        operation_parameters,
        operation_metrics,
        engine_info: Some(format!("broadcast-join/{}", env!("CARGO_PKG_VERSION"))),
    }
}

/// Roll batches into data files of at most `max_rows_per_file` rows
fn write_data_files(
    root: &Path,
    schema: &SchemaRef,
    batches: &[RecordBatch],
    max_rows_per_file: usize,
    now: i64,
) -> Result<Vec<AddFile>> {
    let max_rows = max_rows_per_file.max(1);

    let mut groups: Vec<Vec<RecordBatch>> = Vec::new();
    let mut current: Vec<RecordBatch> = Vec::new();
    let mut current_rows = 0;
    for batch in batches.iter().filter(|b| b.num_rows() > 0) {
        let mut offset = 0;
        while offset < batch.num_rows() {
            let take = (max_rows - current_rows).min(batch.num_rows() - offset);
            current.push(batch.slice(offset, take));
            current_rows += take;
            offset += take;
            if current_rows == max_rows {
                groups.push(std::mem::take(&mut current));
                current_rows = 0;
            }
        }
    }
    if !current.is_empty() {
        groups.push(current);
    }

    groups
        .into_iter()
        .enumerate()
        .map(|(index, group)| {
            let name = format!("part-{:05}-{}.snappy.parquet", index, uuid::Uuid::new_v4());
            let size = write_parquet_file(&root.join(&name), schema.clone(), &group)?;
            let stats = FileStats {
                num_records: group.iter().map(|b| b.num_rows() as u64).sum(),
            };
            Ok(AddFile {
                path: name,
                partition_values: HashMap::new(),
                size,
                modification_time: now,
                data_change: true,
                stats: Some(serde_json::to_string(&stats)?),
            })
        })
        .collect()
}

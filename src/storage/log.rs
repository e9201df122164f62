//! Commit log actions and their on-disk encoding
//!
//! Each commit is `_delta_log/<20-digit version>.json` holding one JSON
//! action per line. Field names follow the Delta Lake protocol so other
//! readers can open the table.

use crate::error::{BroadcastJoinError, Result};
use arrow::datatypes::{DataType, Field, Schema, SchemaRef};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub const LOG_DIR: &str = "_delta_log";

/// One line of a commit file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Action {
    CommitInfo(CommitInfo),
    Protocol(Protocol),
    MetaData(Metadata),
    Add(AddFile),
    Remove(RemoveFile),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Protocol {
    pub min_reader_version: u32,
    pub min_writer_version: u32,
}

impl Default for Protocol {
    fn default() -> Self {
        Self {
            min_reader_version: 1,
            min_writer_version: 2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Format {
    pub provider: String,
    #[serde(default)]
    pub options: HashMap<String, String>,
}

/// Table metadata: identity and schema
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Metadata {
    pub id: String,
    pub format: Format,
    /// Schema as a JSON-encoded struct type
    pub schema_string: String,
    #[serde(default)]
    pub partition_columns: Vec<String>,
    #[serde(default)]
    pub configuration: HashMap<String, String>,
    #[serde(default)]
    pub created_time: Option<i64>,
}

impl Metadata {
    pub fn new(id: String, schema: &Schema, created_time: i64) -> Result<Self> {
        Ok(Self {
            id,
            format: Format {
                provider: "parquet".to_string(),
                options: HashMap::new(),
            },
            schema_string: schema_to_json(schema)?,
            partition_columns: Vec::new(),
            configuration: HashMap::new(),
            created_time: Some(created_time),
        })
    }

    pub fn schema(&self) -> Result<SchemaRef> {
        schema_from_json(&self.schema_string)
    }
}

/// A data file that becomes part of the table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddFile {
    /// Path relative to the table root
    pub path: String,
    #[serde(default)]
    pub partition_values: HashMap<String, Option<String>>,
    pub size: u64,
    pub modification_time: i64,
    pub data_change: bool,
    /// JSON-encoded file statistics
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stats: Option<String>,
}

impl AddFile {
    /// Record count from the file statistics, when present
    pub fn num_records(&self) -> Option<u64> {
        let stats: FileStats = serde_json::from_str(self.stats.as_deref()?).ok()?;
        Some(stats.num_records)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileStats {
    pub num_records: u64,
}

/// A data file that leaves the table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoveFile {
    pub path: String,
    #[serde(default)]
    pub deletion_timestamp: Option<i64>,
    pub data_change: bool,
}

/// Provenance of a commit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitInfo {
    pub timestamp: i64,
    pub operation: String,
    #[serde(default)]
    pub operation_parameters: HashMap<String, String>,
    #[serde(default)]
    pub operation_metrics: HashMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub engine_info: Option<String>,
}

/// Spark-style struct type used in `schemaString`
#[derive(Debug, Serialize, Deserialize)]
struct StructType {
    #[serde(rename = "type")]
    type_name: String,
    fields: Vec<StructField>,
}

#[derive(Debug, Serialize, Deserialize)]
struct StructField {
    name: String,
    #[serde(rename = "type")]
    data_type: String,
    nullable: bool,
    #[serde(default)]
    metadata: serde_json::Map<String, serde_json::Value>,
}

fn type_name(data_type: &DataType) -> Result<&'static str> {
    Ok(match data_type {
        DataType::Utf8 => "string",
        DataType::Int64 => "long",
        DataType::Int32 => "integer",
        DataType::Float64 => "double",
        DataType::Float32 => "float",
        DataType::Boolean => "boolean",
        DataType::Date32 => "date",
        other => {
            return Err(BroadcastJoinError::Storage(format!(
                "Unsupported column type for table schema: {}",
                other
            )))
        }
    })
}

fn parse_type_name(name: &str) -> Result<DataType> {
    Ok(match name {
        "string" => DataType::Utf8,
        "long" => DataType::Int64,
        "integer" => DataType::Int32,
        "double" => DataType::Float64,
        "float" => DataType::Float32,
        "boolean" => DataType::Boolean,
        "date" => DataType::Date32,
        other => {
            return Err(BroadcastJoinError::Storage(format!(
                "Unsupported type in table schema: {}",
                other
            )))
        }
    })
}

pub fn schema_to_json(schema: &Schema) -> Result<String> {
    let fields = schema
        .fields()
        .iter()
        .map(|f| {
            Ok(StructField {
                name: f.name().clone(),
                data_type: type_name(f.data_type())?.to_string(),
                nullable: f.is_nullable(),
                metadata: serde_json::Map::new(),
            })
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(serde_json::to_string(&StructType {
        type_name: "struct".to_string(),
        fields,
    })?)
}

pub fn schema_from_json(json: &str) -> Result<SchemaRef> {
    let st: StructType = serde_json::from_str(json)?;
    if st.type_name != "struct" {
        return Err(BroadcastJoinError::Storage(format!(
            "Table schema must be a struct, got {}",
            st.type_name
        )));
    }
    let fields = st
        .fields
        .iter()
        .map(|f| Ok(Field::new(&f.name, parse_type_name(&f.data_type)?, f.nullable)))
        .collect::<Result<Vec<_>>>()?;
    Ok(Arc::new(Schema::new(fields)))
}

pub fn log_dir(root: &Path) -> PathBuf {
    root.join(LOG_DIR)
}

pub fn commit_path(root: &Path, version: u64) -> PathBuf {
    log_dir(root).join(format!("{:020}.json", version))
}

/// Versions present in the log, ascending
pub fn list_versions(root: &Path) -> Result<Vec<u64>> {
    let dir = log_dir(root);
    if !dir.is_dir() {
        return Ok(Vec::new());
    }

    let mut versions = Vec::new();
    for entry in fs::read_dir(&dir)? {
        let path = entry?.path();
        let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        if path.extension().is_some_and(|e| e == "json") && stem.len() == 20 {
            if let Ok(version) = stem.parse::<u64>() {
                versions.push(version);
            }
        }
    }
    versions.sort_unstable();
    Ok(versions)
}

pub fn read_commit(root: &Path, version: u64) -> Result<Vec<Action>> {
    let file = fs::File::open(commit_path(root, version))?;
    let mut actions = Vec::new();
    for line in BufReader::new(file).lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        actions.push(serde_json::from_str(&line)?);
    }
    Ok(actions)
}

/// Publish a commit atomically
///
/// The actions are staged in a temp file and hard-linked into place, which
/// fails if another writer already published this version.
pub fn write_commit(root: &Path, version: u64, actions: &[Action]) -> Result<()> {
    let dir = log_dir(root);
    fs::create_dir_all(&dir)?;

    let tmp = dir.join(format!(".{:020}.json.{}.tmp", version, uuid::Uuid::new_v4()));
    let staged = stage_commit(&tmp, actions).and_then(|_| {
        fs::hard_link(&tmp, commit_path(root, version)).map_err(|e| {
            if e.kind() == std::io::ErrorKind::AlreadyExists {
                BroadcastJoinError::CommitConflict(version)
            } else {
                e.into()
            }
        })
    });
    let _ = fs::remove_file(&tmp);
    staged
}

fn stage_commit(tmp: &Path, actions: &[Action]) -> Result<()> {
    let mut file = fs::File::create(tmp)?;
    for action in actions {
        serde_json::to_writer(&mut file, action)?;
        file.write_all(b"\n")?;
    }
    file.sync_all()?;
    Ok(())
}

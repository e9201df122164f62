//! Table storage
//!
//! Transactional Parquet tables: immutable data files plus a JSON commit
//! log in the Delta Lake layout.

pub mod log;
mod parquet;
mod table;

pub use parquet::{read_parquet_file, write_parquet_file};
pub use table::{write_table, CommitRecord, CommitResult, DeltaTable, SaveMode, Snapshot};

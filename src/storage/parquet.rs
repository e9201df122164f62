//! Parquet data file reading and writing

use crate::error::{BroadcastJoinError, Result};
use arrow::datatypes::SchemaRef;
use arrow::record_batch::RecordBatch;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::{ArrowWriter, ProjectionMask};
use parquet::basic::Compression;
use parquet::file::properties::WriterProperties;
use std::fs::File;
use std::path::Path;

/// Write batches to a new snappy-compressed Parquet file, returning its size in bytes
pub fn write_parquet_file(path: &Path, schema: SchemaRef, batches: &[RecordBatch]) -> Result<u64> {
    let file = File::create(path).map_err(|e| {
        BroadcastJoinError::Storage(format!(
            "Failed to create parquet file {}: {}",
            path.display(),
            e
        ))
    })?;

    let props = WriterProperties::builder()
        .set_compression(Compression::SNAPPY)
        .build();

    let mut writer = ArrowWriter::try_new(file, schema, Some(props))?;
    for batch in batches {
        writer.write(batch)?;
    }
    writer.close()?;

    Ok(std::fs::metadata(path)?.len())
}

/// Read all batches from a single Parquet file
pub fn read_parquet_file(path: &Path, projection: Option<&[usize]>) -> Result<Vec<RecordBatch>> {
    let file = File::open(path)?;
    let builder = ParquetRecordBatchReaderBuilder::try_new(file)?;

    let reader = if let Some(indices) = projection {
        let mask = ProjectionMask::roots(builder.parquet_schema(), indices.iter().copied());
        builder.with_projection(mask).build()?
    } else {
        builder.build()?
    };

    let batches: Vec<RecordBatch> = reader.collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(batches)
}

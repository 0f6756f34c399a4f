// src/store/mod.rs

//! Parquet persistence for the pipeline tables.

pub mod clusters;
pub mod households;

use anyhow::{anyhow, Context, Result};
use arrow::{
    array::{Array, ArrayRef},
    datatypes::Schema as ArrowSchema,
    record_batch::RecordBatch,
};
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::ArrowWriter;
use parquet::basic::Compression;
use parquet::file::properties::WriterProperties;
use std::{
    fs::{self, File},
    io::BufWriter,
    path::Path,
    sync::Arc,
};
use tracing::info;

/// A row type with a fixed Arrow layout.
pub trait TableRow: Sized {
    /// Arrow schema for this row type
    fn schema() -> ArrowSchema;
    /// Column arrays for a slice of rows, matching `schema()`
    fn to_arrays(rows: &[Self]) -> Vec<ArrayRef>;
    /// Rebuild rows from a batch written with `schema()`
    fn from_batch(batch: &RecordBatch) -> Result<Vec<Self>>;
}

/// Write all rows to a single SNAPPY parquet file, via a tmp file + rename.
pub fn write_rows<R: TableRow>(path: &Path, rows: &[R]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).with_context(|| format!("creating {}", parent.display()))?;
    }
    let schema = Arc::new(R::schema());
    let batch = RecordBatch::try_new(schema.clone(), R::to_arrays(rows))
        .context("building record batch")?;

    let tmp = path.with_extension("parquet.tmp");
    let file = File::create(&tmp).with_context(|| format!("creating {}", tmp.display()))?;
    let props = WriterProperties::builder()
        .set_compression(Compression::SNAPPY)
        .build();
    let mut writer = ArrowWriter::try_new(BufWriter::new(file), schema, Some(props))
        .context("creating Arrow writer")?;
    writer.write(&batch).context("writing batch")?;
    writer.close().context("closing writer")?;
    fs::rename(&tmp, path)
        .with_context(|| format!("renaming {} -> {}", tmp.display(), path.display()))?;

    info!(path = %path.display(), rows = rows.len(), "wrote parquet");
    Ok(())
}

pub fn read_rows<R: TableRow>(path: &Path) -> Result<Vec<R>> {
    let file = File::open(path).with_context(|| format!("failed to open `{}`", path.display()))?;
    let reader = ParquetRecordBatchReaderBuilder::try_new(file)
        .with_context(|| format!("reading parquet metadata of {}", path.display()))?
        .with_batch_size(8192)
        .build()?;
    let mut out = Vec::new();
    for batch in reader {
        let batch = batch?;
        out.extend(R::from_batch(&batch)?);
    }
    Ok(out)
}

/// Downcast a named column, failing with the column name.
pub(crate) fn column<'a, A: Array + 'static>(batch: &'a RecordBatch, name: &str) -> Result<&'a A> {
    batch
        .column_by_name(name)
        .ok_or_else(|| anyhow!("column {} not found", name))?
        .as_any()
        .downcast_ref::<A>()
        .ok_or_else(|| anyhow!("column {} has unexpected type", name))
}

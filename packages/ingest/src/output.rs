//! Atomic CSV output.
//!
//! Each table is written in full to `<path>.tmp` and renamed over the
//! destination, so readers only ever see the previous complete file or the
//! new complete file.

use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::IngestError;

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".tmp");
    PathBuf::from(name)
}

fn prepare_parent(path: &Path) -> Result<(), IngestError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    Ok(())
}

fn commit(tmp: &Path, path: &Path, rows: usize) -> Result<(), IngestError> {
    std::fs::rename(tmp, path)?;
    log::info!("Wrote {rows} rows to {}", path.display());
    Ok(())
}

/// Serializes `rows` (header from the first row's field names) to `path`.
///
/// An empty slice produces an empty file, since `csv` derives the header
/// from the first record.
///
/// # Errors
///
/// Returns an error if the file cannot be created, written or renamed.
pub fn write_csv_atomic<T: Serialize>(path: &Path, rows: &[T]) -> Result<(), IngestError> {
    prepare_parent(path)?;
    let tmp = tmp_path(path);
    {
        let mut writer = csv::Writer::from_path(&tmp)?;
        for row in rows {
            writer.serialize(row)?;
        }
        writer.flush()?;
    }
    commit(&tmp, path, rows.len())
}

/// Writes an explicit header and string records to `path`.
///
/// # Errors
///
/// Returns an error if the file cannot be created, written or renamed.
pub fn write_records_atomic(
    path: &Path,
    headers: &[String],
    records: &[Vec<String>],
) -> Result<(), IngestError> {
    prepare_parent(path)?;
    let tmp = tmp_path(path);
    {
        let mut writer = csv::Writer::from_path(&tmp)?;
        writer.write_record(headers)?;
        for record in records {
            writer.write_record(record)?;
        }
        writer.flush()?;
    }
    commit(&tmp, path, records.len())
}

//! CSV export of feature records.
//!
//! The first record fixes the column set for the whole file. Later records
//! are written by key lookup against that header. Files are written to a
//! sibling temporary file and renamed into place, so a failed export never
//! leaves a partial CSV behind.

use crate::record::{FeatureRecord, Field, LabeledRecord};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::info;

const LOST_COLUMN: &str = "lost";

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("nothing to export to {0}")]
    Empty(PathBuf),

    #[error("record {index} has column {field} that is not in the header")]
    SchemaMismatch { index: usize, field: Field },

    #[error("failed to write CSV {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("failed to replace {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

fn row(header: &[Field], record: &FeatureRecord, index: usize) -> Result<Vec<String>, ExportError> {
    if let Some(field) = record.keys().find(|f| !header.contains(f)) {
        return Err(ExportError::SchemaMismatch { index, field });
    }
    Ok(header
        .iter()
        .map(|f| record.get(*f).map(|v| v.to_string()).unwrap_or_default())
        .collect())
}

/// Write `rows` to a temporary file next to `path`, then rename it over `path`.
fn write_atomically(path: &Path, rows: &[Vec<String>]) -> Result<(), ExportError> {
    let io_err = |source| ExportError::Io {
        path: path.to_path_buf(),
        source,
    };
    let csv_err = |source| ExportError::Csv {
        path: path.to_path_buf(),
        source,
    };

    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let mut temp = NamedTempFile::new_in(dir).map_err(io_err)?;
    {
        let mut writer = csv::Writer::from_writer(temp.as_file_mut());
        for cells in rows {
            writer.write_record(cells).map_err(csv_err)?;
        }
        writer.flush().map_err(|e| csv_err(csv::Error::from(e)))?;
    }
    temp.persist(path).map_err(|e| io_err(e.error))?;
    Ok(())
}

/// Write a labeled dataset. The `lost` column is written as `True`/`False`.
///
/// Every record is checked against the header before anything touches
/// `path`. Returns the number of rows written.
pub fn write_dataset_csv(path: &Path, records: &[LabeledRecord]) -> Result<usize, ExportError> {
    let first = records
        .first()
        .ok_or_else(|| ExportError::Empty(path.to_path_buf()))?;
    let header: Vec<Field> = first.record.keys().collect();

    let mut names: Vec<String> = header.iter().map(|f| f.name().to_string()).collect();
    names.push(LOST_COLUMN.to_string());
    let columns = names.len();

    let mut rows = Vec::with_capacity(records.len() + 1);
    rows.push(names);
    for (index, labeled) in records.iter().enumerate() {
        let mut cells = row(&header, &labeled.record, index)?;
        cells.push(if labeled.lost { "True" } else { "False" }.to_string());
        rows.push(cells);
    }
    write_atomically(path, &rows)?;

    info!(path = %path.display(), rows = records.len(), columns, "Wrote dataset");
    Ok(records.len())
}

/// Replace `path` with a header and a single row for `record`.
pub fn write_record_csv(path: &Path, record: &FeatureRecord) -> Result<(), ExportError> {
    if record.is_empty() {
        return Err(ExportError::Empty(path.to_path_buf()));
    }
    let header: Vec<Field> = record.keys().collect();
    let names: Vec<String> = header.iter().map(|f| f.name().to_string()).collect();
    let cells = row(&header, record, 0)?;
    write_atomically(path, &[names, cells])
}

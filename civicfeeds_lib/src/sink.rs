//! Persistence of finished record sets as delimited files.

use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::config::{DataDirs, OutputTarget};
use crate::record::{Record, RecordSet};

#[derive(Error, Debug)]
pub enum SinkError {
    #[error("failed to create {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
}

/// Accepts a finished record set and a destination descriptor.
pub trait Sink: Send + Sync {
    /// Writes `records` and returns the path actually written.
    fn write(&self, records: &RecordSet, target: &OutputTarget) -> Result<PathBuf, SinkError>;
}

/// Project root plus logical data-directory mapping.
#[derive(Debug, Clone)]
pub struct ProjectLayout {
    pub root: PathBuf,
    pub dirs: DataDirs,
}

impl ProjectLayout {
    pub fn new(root: impl Into<PathBuf>, dirs: DataDirs) -> Self {
        Self {
            root: root.into(),
            dirs,
        }
    }

    /// Absolute location of a logical data directory.
    pub fn data_dir(&self, dir: &str) -> PathBuf {
        self.root.join(self.dirs.relative(dir))
    }

    pub fn resolve(&self, target: &OutputTarget) -> PathBuf {
        self.data_dir(&target.dir).join(&target.file)
    }
}

/// Writes comma-separated files with a header row matching the record set schema.
#[derive(Debug, Clone)]
pub struct CsvSink {
    layout: ProjectLayout,
}

impl CsvSink {
    pub fn new(layout: ProjectLayout) -> Self {
        Self { layout }
    }
}

impl Sink for CsvSink {
    fn write(&self, records: &RecordSet, target: &OutputTarget) -> Result<PathBuf, SinkError> {
        let path = self.layout.resolve(target);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| SinkError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        write_csv(records, &path)?;
        tracing::debug!("Wrote {} rows to {}", records.len(), path.display());
        Ok(path)
    }
}

fn write_csv(records: &RecordSet, path: &Path) -> Result<(), SinkError> {
    let mut wtr = csv::Writer::from_path(path)?;
    wtr.write_record(records.columns())?;
    for row in records.rows() {
        wtr.write_record(&row)?;
    }
    wtr.flush().map_err(|source| SinkError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(())
}

/// Reads a delimited file written by [`CsvSink`] back into a record set.
///
/// Every cell is text; empty cells are kept as empty strings.
pub fn read_record_set(path: &Path) -> Result<RecordSet, SinkError> {
    let mut rdr = csv::Reader::from_path(path)?;
    let headers = rdr.headers()?.clone();
    let columns: Vec<&str> = headers.iter().collect();
    let mut set = RecordSet::with_columns(&columns);
    for row in rdr.records() {
        let row = row?;
        let mut record = Record::new();
        for (name, value) in headers.iter().zip(row.iter()) {
            record.insert(name, value);
        }
        set.push(record);
    }
    Ok(set)
}

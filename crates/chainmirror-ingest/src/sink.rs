//! Combined output sink
//!
//! Appends decoded tables to one comma-delimited file. The header is written
//! by the first append against a missing or empty file; every later append
//! must carry the same columns in the same order.

use csv::StringRecord;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("Remote schema changed: combined output has columns {expected:?}, file has {found:?}")]
    SchemaMismatch {
        expected: Vec<String>,
        found: Vec<String>,
    },

    #[error("I/O error on combined output {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("CSV error on combined output {}: {source}", path.display())]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
}

#[derive(Debug)]
pub struct AppendSink {
    path: PathBuf,
    header: Option<Vec<String>>,
}

impl AppendSink {
    /// Open the sink, learning the established header if the file exists
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, SinkError> {
        let path = path.into();
        let header = read_header(&path)?;

        if let Some(ref columns) = header {
            debug!(
                path = %path.display(),
                columns = columns.len(),
                "Combined output exists, appending"
            );
        }

        Ok(Self { path, header })
    }

    /// Append one table; returns the number of data rows written
    pub fn append(&mut self, header: &[String], rows: &[StringRecord]) -> Result<usize, SinkError> {
        let write_header = match &self.header {
            Some(expected) if expected.as_slice() != header => {
                return Err(SinkError::SchemaMismatch {
                    expected: expected.clone(),
                    found: header.to_vec(),
                });
            },
            Some(_) => false,
            None => true,
        };

        // Encode the whole batch before touching the file
        let mut writer = csv::Writer::from_writer(Vec::new());
        if write_header {
            writer.write_record(header).map_err(|source| self.csv_error(source))?;
        }
        for row in rows {
            writer.write_record(row).map_err(|source| self.csv_error(source))?;
        }
        let encoded = writer
            .into_inner()
            .map_err(|e| self.io_error(e.into_error()))?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| self.io_error(e))?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| self.io_error(e))?;
        file.write_all(&encoded).map_err(|e| self.io_error(e))?;
        file.sync_all().map_err(|e| self.io_error(e))?;

        if write_header {
            info!(path = %self.path.display(), columns = header.len(), "Created combined output");
            self.header = Some(header.to_vec());
        }

        Ok(rows.len())
    }

    pub fn header(&self) -> Option<&[String]> {
        self.header.as_deref()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current size of the combined output in bytes
    pub fn size_bytes(&self) -> Result<u64, SinkError> {
        match fs::metadata(&self.path) {
            Ok(meta) => Ok(meta.len()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(0),
            Err(e) => Err(self.io_error(e)),
        }
    }

    fn io_error(&self, source: std::io::Error) -> SinkError {
        SinkError::Io {
            path: self.path.clone(),
            source,
        }
    }

    fn csv_error(&self, source: csv::Error) -> SinkError {
        SinkError::Csv {
            path: self.path.clone(),
            source,
        }
    }
}

fn read_header(path: &Path) -> Result<Option<Vec<String>>, SinkError> {
    let io_error = |source| SinkError::Io {
        path: path.to_path_buf(),
        source,
    };

    match fs::metadata(path) {
        Ok(meta) if meta.len() > 0 => {},
        Ok(_) => return Ok(None),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(io_error(e)),
    }

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_path(path)
        .map_err(|source| SinkError::Csv {
            path: path.to_path_buf(),
            source,
        })?;
    let header = reader
        .headers()
        .map_err(|source| SinkError::Csv {
            path: path.to_path_buf(),
            source,
        })?
        .iter()
        .map(str::to_string)
        .collect();

    Ok(Some(header))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn header(cols: &[&str]) -> Vec<String> {
        cols.iter().map(|c| c.to_string()).collect()
    }

    fn rows(data: &[&[&str]]) -> Vec<StringRecord> {
        data.iter().map(|r| StringRecord::from(r.to_vec())).collect()
    }

    #[test]
    fn test_first_append_writes_header_once() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out").join("combined.csv");
        let cols = header(&["block_id", "hash"]);

        let mut sink = AppendSink::open(&path).unwrap();
        assert!(sink.header().is_none());

        assert_eq!(sink.append(&cols, &rows(&[&["1", "aa"]])).unwrap(), 1);
        assert_eq!(sink.append(&cols, &rows(&[&["2", "bb"], &["3", "cc"]])).unwrap(), 2);

        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "block_id,hash\n1,aa\n2,bb\n3,cc\n"
        );
    }

    #[test]
    fn test_reopen_learns_existing_header() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("combined.csv");
        let cols = header(&["block_id", "hash"]);

        AppendSink::open(&path).unwrap().append(&cols, &rows(&[&["1", "aa"]])).unwrap();

        let mut sink = AppendSink::open(&path).unwrap();
        assert_eq!(sink.header(), Some(cols.as_slice()));
        sink.append(&cols, &rows(&[&["2", "bb"]])).unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "block_id,hash\n1,aa\n2,bb\n");
    }

    #[test]
    fn test_schema_mismatch_rejected_without_writing() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("combined.csv");

        let mut sink = AppendSink::open(&path).unwrap();
        sink.append(&header(&["a", "b"]), &rows(&[&["1", "2"]])).unwrap();
        let before = fs::read_to_string(&path).unwrap();

        let err = sink
            .append(&header(&["b", "a"]), &rows(&[&["2", "1"]]))
            .unwrap_err();
        assert!(matches!(err, SinkError::SchemaMismatch { .. }));
        assert_eq!(fs::read_to_string(&path).unwrap(), before);
    }

    #[test]
    fn test_empty_existing_file_gets_header() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("combined.csv");
        fs::write(&path, "").unwrap();

        let mut sink = AppendSink::open(&path).unwrap();
        assert!(sink.header().is_none());
        sink.append(&header(&["a"]), &rows(&[&["1"]])).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "a\n1\n");
    }

    #[test]
    fn test_fields_needing_quotes_round_trip_header() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("combined.csv");
        let cols = header(&["name", "note, with comma"]);

        AppendSink::open(&path)
            .unwrap()
            .append(&cols, &rows(&[&["x", "y,z"]]))
            .unwrap();

        let sink = AppendSink::open(&path).unwrap();
        assert_eq!(sink.header(), Some(cols.as_slice()));
    }

    #[test]
    fn test_size_bytes() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("combined.csv");
        let mut sink = AppendSink::open(&path).unwrap();
        assert_eq!(sink.size_bytes().unwrap(), 0);

        sink.append(&header(&["a"]), &rows(&[&["1"]])).unwrap();
        assert_eq!(sink.size_bytes().unwrap(), 4);
    }
}

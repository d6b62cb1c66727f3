//! Resume ledger
//!
//! A newline-delimited list of filenames whose rows have been durably
//! appended to the combined output. The file is only ever appended to;
//! operators delete it to force a full re-download.

use std::collections::HashSet;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

#[derive(Debug)]
pub struct ResumeLedger {
    path: PathBuf,
    done: HashSet<String>,
}

impl ResumeLedger {
    /// Load the ledger at `path`; a missing file is an empty ledger
    pub fn load(path: impl Into<PathBuf>) -> io::Result<Self> {
        let path = path.into();

        let done = match fs::read_to_string(&path) {
            Ok(text) => text
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty())
                .map(str::to_string)
                .collect(),
            Err(e) if e.kind() == io::ErrorKind::NotFound => HashSet::new(),
            Err(e) => return Err(e),
        };

        if !done.is_empty() {
            info!(
                path = %path.display(),
                count = done.len(),
                "Loaded resume ledger"
            );
        }

        Ok(Self { path, done })
    }

    pub fn contains(&self, filename: &str) -> bool {
        self.done.contains(filename)
    }

    /// Record `filename` as done
    ///
    /// The line is synced to disk before this returns; the in-memory set is
    /// only updated after the write succeeds.
    pub fn commit(&mut self, filename: &str) -> io::Result<()> {
        if self.done.contains(filename) {
            return Ok(());
        }

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let mut file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        file.write_all(format!("{}\n", filename).as_bytes())?;
        file.sync_all()?;

        self.done.insert(filename.to_string());
        debug!(filename = %filename, "Committed to resume ledger");
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.done.len()
    }

    pub fn is_empty(&self) -> bool {
        self.done.is_empty()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

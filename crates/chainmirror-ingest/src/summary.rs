//! End-of-run report

use serde::Serialize;
use std::fmt;
use std::path::PathBuf;

use crate::fetch::{FailureKind, FetchError};

/// One file that could not be mirrored in this run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailureRecord {
    pub filename: String,
    pub kind: FailureKind,
    pub reason: String,
}

impl FailureRecord {
    pub fn from_error(filename: &str, err: &FetchError) -> Self {
        Self {
            filename: filename.to_string(),
            kind: err.kind(),
            reason: err.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RunSummary {
    /// Entries recognized in the listing
    pub listed: usize,
    /// Entries inside the date range
    pub targeted: usize,
    /// Targeted entries skipped because the ledger already had them
    pub already_done: usize,
    /// Files appended and committed in this run
    pub succeeded: usize,
    pub rows_appended: u64,
    pub failures: Vec<FailureRecord>,
    pub output_path: PathBuf,
    pub ledger_path: PathBuf,
}

impl RunSummary {
    pub fn failed(&self) -> usize {
        self.failures.len()
    }

    /// Targeted files still missing from the ledger
    pub fn remaining(&self) -> usize {
        self.targeted
            .saturating_sub(self.already_done)
            .saturating_sub(self.succeeded)
    }

    pub fn no_new_work(&self) -> bool {
        self.targeted == self.already_done
    }

    /// Failures that another run will not fix on its own
    pub fn has_permanent_failures(&self) -> bool {
        self.failures.iter().any(|f| f.kind.is_permanent())
    }

    fn has_transient_failures(&self) -> bool {
        self.failures.iter().any(|f| !f.kind.is_permanent())
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Mirror run complete")?;
        writeln!(f, "  Listed:          {}", self.listed)?;
        writeln!(f, "  In date range:   {}", self.targeted)?;
        writeln!(f, "  Already done:    {}", self.already_done)?;
        writeln!(f, "  Succeeded:       {}", self.succeeded)?;
        writeln!(f, "  Failed:          {}", self.failed())?;
        writeln!(f, "  Remaining:       {}", self.remaining())?;
        writeln!(f, "  Rows appended:   {}", self.rows_appended)?;
        writeln!(f, "  Output:          {}", self.output_path.display())?;
        writeln!(f, "  Resume ledger:   {}", self.ledger_path.display())?;

        if self.no_new_work() {
            writeln!(f)?;
            writeln!(f, "All files in range were already downloaded.")?;
        }

        if !self.failures.is_empty() {
            writeln!(f)?;
            writeln!(f, "Failed files:")?;
            for failure in &self.failures {
                writeln!(f, "  {} [{:?}]: {}", failure.filename, failure.kind, failure.reason)?;
            }

            writeln!(f)?;
            if self.has_transient_failures() {
                writeln!(f, "Transient failures are retried by running the same command again.")?;
            }
            if self.has_permanent_failures() {
                writeln!(
                    f,
                    "Some files need intervention: payment-required files are not freely \
                     downloadable, and corrupt files only heal if the server republishes them."
                )?;
            }
        }

        Ok(())
    }
}

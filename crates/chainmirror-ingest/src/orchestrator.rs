//! Mirror run orchestrator
//!
//! Drives one run through `Listing -> Filtering -> Iterating -> Done`:
//! fetch the listing once, narrow it to the date window and to files not yet
//! in the resume ledger, then mirror the queue one file at a time.
//!
//! For every file the rows are appended to the combined output first and
//! the filename is committed to the ledger second. Per-file failures are
//! recorded in the [`RunSummary`] and never stop the loop; only listing
//! failures and local storage errors abort the run.

use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::config::MirrorConfig;
use crate::error::{IngestError, Result};
use crate::fetch::Fetcher;
use crate::filter::{filter_by_date_range, DateRange};
use crate::ledger::ResumeLedger;
use crate::listing::{ListingEntry, ListingParser};
use crate::progress::format_bytes;
use crate::sink::AppendSink;
use crate::summary::{FailureRecord, RunSummary};

/// Stage of a mirror run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Listing,
    Filtering,
    Iterating { index: usize, total: usize },
    Done,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunState::Listing => write!(f, "LISTING"),
            RunState::Filtering => write!(f, "FILTERING"),
            RunState::Iterating { index, total } => write!(f, "ITERATING({}/{})", index, total),
            RunState::Done => write!(f, "DONE"),
        }
    }
}

pub struct Orchestrator {
    config: MirrorConfig,
    range: DateRange,
    fetcher: Fetcher,
    parser: ListingParser,
    ledger: ResumeLedger,
    sink: AppendSink,
}

impl Orchestrator {
    /// Validate `config` and open local state
    pub fn new(config: MirrorConfig) -> Result<Self> {
        config.validate()?;
        let range = config
            .date_range
            .ok_or_else(|| chainmirror_common::CommonError::config("a start and end date are required"))?;

        let fetcher = Fetcher::new(&config)?;
        let parser = ListingParser::new(&config.filename_prefix)?;
        let ledger =
            ResumeLedger::load(&config.ledger_path).map_err(|source| IngestError::LedgerLoad {
                path: config.ledger_path.clone(),
                source,
            })?;
        let sink = AppendSink::open(&config.output_path)?;

        Ok(Self {
            config,
            range,
            fetcher,
            parser,
            ledger,
            sink,
        })
    }

    /// Execute one full run
    pub async fn run(&mut self) -> Result<RunSummary> {
        let mut summary = RunSummary {
            output_path: absolute(self.sink.path()),
            ledger_path: absolute(self.ledger.path()),
            ..RunSummary::default()
        };

        enter(RunState::Listing);
        let listing = self
            .fetcher
            .fetch_listing()
            .await
            .map_err(|source| IngestError::Listing {
                url: self.fetcher.listing_url().to_string(),
                source,
            })?;
        let entries = self.parser.parse(&listing);
        summary.listed = entries.len();
        info!(count = entries.len(), "Found files in listing");

        enter(RunState::Filtering);
        let targeted = dedup_by_filename(filter_by_date_range(entries, &self.range));
        summary.targeted = targeted.len();
        info!(range = %self.range, count = targeted.len(), "Files in date range");

        let queue: Vec<ListingEntry> = targeted
            .into_iter()
            .filter(|entry| !self.ledger.contains(&entry.filename))
            .collect();
        summary.already_done = summary.targeted - queue.len();

        if queue.is_empty() {
            info!("All files already downloaded");
            enter(RunState::Done);
            return Ok(summary);
        }
        info!(
            pending = queue.len(),
            already_done = summary.already_done,
            "Starting download queue"
        );

        let total = queue.len();
        for (index, entry) in queue.iter().enumerate() {
            if index > 0 && !self.config.pacing().is_zero() {
                tokio::time::sleep(self.config.pacing()).await;
            }
            enter(RunState::Iterating {
                index: index + 1,
                total,
            });

            match self.fetcher.fetch_table(&entry.filename).await {
                Ok(table) => {
                    let rows = self.sink.append(&table.header, &table.rows)?;
                    self.ledger.commit(&entry.filename).map_err(|source| {
                        IngestError::LedgerCommit {
                            filename: entry.filename.clone(),
                            path: self.ledger.path().to_path_buf(),
                            source,
                        }
                    })?;

                    summary.succeeded += 1;
                    summary.rows_appended += rows as u64;
                    info!(
                        filename = %entry.filename,
                        rows,
                        output_size = %output_size(&self.sink),
                        "Appended to combined output"
                    );
                },
                Err(e) => {
                    let record = FailureRecord::from_error(&entry.filename, &e);
                    warn!(
                        filename = %entry.filename,
                        kind = ?record.kind,
                        error = %e,
                        "Failed to mirror file (continuing with next file)"
                    );
                    summary.failures.push(record);
                },
            }
        }

        enter(RunState::Done);
        info!(
            succeeded = summary.succeeded,
            failed = summary.failed(),
            remaining = summary.remaining(),
            "Mirror run completed"
        );

        Ok(summary)
    }
}

fn enter(state: RunState) {
    debug!(state = %state, "Entering state");
}

/// Keep the first occurrence of each filename, preserving order
fn dedup_by_filename(entries: Vec<ListingEntry>) -> Vec<ListingEntry> {
    let mut seen = HashSet::new();
    entries
        .into_iter()
        .filter(|entry| {
            let fresh = seen.insert(entry.filename.clone());
            if !fresh {
                warn!(filename = %entry.filename, "Duplicate listing entry ignored");
            }
            fresh
        })
        .collect()
}

/// Human-readable output size for logs; never fails
fn output_size(sink: &AppendSink) -> String {
    match sink.size_bytes() {
        Ok(bytes) => format_bytes(bytes),
        Err(e) => {
            debug!(error = %e, "Could not read combined output size");
            "unknown".to_string()
        },
    }
}

fn absolute(path: &Path) -> PathBuf {
    std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
}

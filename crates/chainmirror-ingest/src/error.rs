//! Run-level errors
//!
//! Only errors that abort a mirror run live here. Failures scoped to a single
//! remote file are [`FetchError`]s and are downgraded to
//! [`crate::summary::FailureRecord`]s by the orchestrator.

use std::path::PathBuf;
use thiserror::Error;

use crate::fetch::FetchError;
use crate::sink::SinkError;

/// Result type for orchestrator operations
pub type Result<T> = std::result::Result<T, IngestError>;

/// Fatal errors for a mirror run
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("Failed to retrieve listing from {url}: {source}")]
    Listing {
        url: String,
        #[source]
        source: FetchError,
    },

    #[error(transparent)]
    Output(#[from] SinkError),

    #[error("Failed to load resume ledger {}: {source}", path.display())]
    LedgerLoad {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to record {filename} in resume ledger {}: {source}", path.display())]
    LedgerCommit {
        filename: String,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Config(#[from] chainmirror_common::CommonError),

    #[error("Failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}

impl IngestError {
    /// True when the remote schema no longer matches the combined output
    pub fn is_schema_mismatch(&self) -> bool {
        matches!(self, IngestError::Output(SinkError::SchemaMismatch { .. }))
    }
}

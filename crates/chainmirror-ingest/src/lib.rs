//! chainmirror ingest library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Incrementally mirrors a remote directory of dated, gzip-compressed TSV
//! dumps into a single combined CSV file. Progress is tracked in a resume
//! ledger, so an interrupted or partially failed run is continued by simply
//! running again.
//!
//! # Pipeline
//!
//! - **Listing**: [`listing::ListingParser`] extracts filenames and
//!   publication timestamps from the directory listing
//! - **Filtering**: [`filter::filter_by_date_range`] keeps entries inside an
//!   inclusive window; the [`ledger::ResumeLedger`] drops finished files
//! - **Fetching**: [`fetch::Fetcher`] downloads and decodes one dump at a time
//! - **Appending**: [`sink::AppendSink`] writes rows under a single header
//!
//! # Example
//!
//! ```no_run
//! use chainmirror_ingest::{DateRange, MirrorConfig, Orchestrator};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = MirrorConfig::builder()
//!         .date_range(DateRange::parse("2022-07-01", "2022-10-01")?)
//!         .build();
//!
//!     let summary = Orchestrator::new(config)?.run().await?;
//!     println!("{}", summary);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod fetch;
pub mod filter;
pub mod ledger;
pub mod listing;
pub mod orchestrator;
pub mod progress;
pub mod sink;
pub mod summary;

pub use config::MirrorConfig;
pub use error::{IngestError, Result};
pub use filter::DateRange;
pub use orchestrator::Orchestrator;
pub use summary::{FailureRecord, RunSummary};

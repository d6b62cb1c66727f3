//! Directory listing parser
//!
//! Turns the text of a remote directory listing into [`ListingEntry`]s.
//! Two shapes are recognized per line, matching what autoindex servers emit:
//!
//! ```text
//! <a href="blockchair_bitcoin_transactions_20220701.tsv.gz">blockchair_..&gt;</a> 02-Jul-2022 05:04   35M
//! blockchair_bitcoin_transactions_20220701.tsv.gz 02-Jul-2022 05:04 35M
//! ```
//!
//! Anything else is skipped silently. No I/O happens here.

use chainmirror_common::{CommonError, Result};
use chrono::NaiveDateTime;
use regex::Regex;
use serde::Serialize;
use tracing::{debug, warn};

/// Filename prefix of the published bitcoin transaction dumps
pub const DEFAULT_FILENAME_PREFIX: &str = "blockchair_bitcoin_transactions";

/// Timestamp format used in the listing's "last modified" column
pub const LISTING_DATE_FORMAT: &str = "%d-%b-%Y %H:%M";

/// One downloadable file advertised by the listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ListingEntry {
    /// `<prefix>_<YYYYMMDD>.<ext>.gz`
    pub filename: String,
    /// `None` when the date column matched the pattern but is not a real date
    pub published_at: Option<NaiveDateTime>,
    /// Date column as it appeared in the listing
    pub published_raw: String,
    /// Size column as published, e.g. `35M`
    pub size_hint: String,
}

/// Line-oriented parser for one filename prefix
#[derive(Debug, Clone)]
pub struct ListingParser {
    pattern: Regex,
}

impl ListingParser {
    pub fn new(prefix: &str) -> Result<Self> {
        if prefix.is_empty() {
            return Err(CommonError::config("filename prefix cannot be empty"));
        }

        let name = format!(r"{}_\d{{8}}\.[A-Za-z0-9]+\.gz", regex::escape(prefix));
        let pattern = format!(
            r#"(?:<a\s+href="(?P<href>{name})"[^>]*>.*?</a>|(?:^|\s)(?P<bare>{name}))\s+(?P<date>\d{{2}}-[A-Za-z]{{3}}-\d{{4}}\s+\d{{2}}:\d{{2}})\s+(?P<size>\d+(?:\.\d+)?[KMG]?)(?:\s|$)"#
        );
        let pattern = Regex::new(&pattern)
            .map_err(|e| CommonError::config(format!("invalid listing pattern: {}", e)))?;

        Ok(Self { pattern })
    }

    /// Extract entries in the order they appear
    pub fn parse(&self, text: &str) -> Vec<ListingEntry> {
        let mut entries = Vec::new();

        for line in text.lines() {
            for caps in self.pattern.captures_iter(line) {
                let Some(filename) = caps.name("href").or_else(|| caps.name("bare")) else {
                    continue;
                };

                // Autoindex pads columns with runs of spaces
                let published_raw = caps["date"].split_whitespace().collect::<Vec<_>>().join(" ");
                let published_at =
                    NaiveDateTime::parse_from_str(&published_raw, LISTING_DATE_FORMAT).ok();
                if published_at.is_none() {
                    warn!(
                        filename = %filename.as_str(),
                        date = %published_raw,
                        "Listing entry has an invalid date"
                    );
                }

                entries.push(ListingEntry {
                    filename: filename.as_str().to_string(),
                    published_at,
                    published_raw,
                    size_hint: caps["size"].to_string(),
                });
            }
        }

        debug!(count = entries.len(), "Parsed directory listing");
        entries
    }
}

//! Mirror configuration
//!
//! Everything the pipeline needs is carried by [`MirrorConfig`]: endpoints,
//! local paths, the date window and pacing. Values are layered as defaults,
//! then `MIRROR_*` environment variables, then command-line flags.

use chainmirror_common::{CommonError, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

use crate::filter::DateRange;
use crate::listing::DEFAULT_FILENAME_PREFIX;

// ============================================================================
// Defaults
// ============================================================================

pub const DEFAULT_LISTING_URL: &str = "https://gz.blockchair.com/bitcoin/transactions/";
pub const DEFAULT_OUTPUT_PATH: &str = "blockchair_data/combined_transactions.csv";
pub const DEFAULT_LEDGER_PATH: &str = "blockchair_data/downloaded_files.txt";
pub const DEFAULT_PACING_MS: u64 = 1000;
pub const DEFAULT_LISTING_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 30;

/// The dump server rejects obvious non-browser clients
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
    AppleWebKit/537.36 (KHTML, like Gecko) Chrome/134.0.0.0 Safari/537.36";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MirrorConfig {
    /// Directory listing document
    pub listing_url: String,

    /// Files are fetched from `<base_url>/<filename>`
    pub base_url: String,

    /// Combined comma-delimited output
    pub output_path: PathBuf,

    /// Newline-delimited list of finished filenames
    pub ledger_path: PathBuf,

    /// Listing entries must be named `<prefix>_<YYYYMMDD>.<ext>.gz`
    pub filename_prefix: String,

    /// Inclusive publication window; required to run
    pub date_range: Option<DateRange>,

    /// Delay between consecutive file fetches
    pub pacing_ms: u64,

    pub listing_timeout_secs: u64,
    pub fetch_timeout_secs: u64,
    pub user_agent: String,
}

impl Default for MirrorConfig {
    fn default() -> Self {
        Self {
            listing_url: DEFAULT_LISTING_URL.to_string(),
            base_url: DEFAULT_LISTING_URL.to_string(),
            output_path: PathBuf::from(DEFAULT_OUTPUT_PATH),
            ledger_path: PathBuf::from(DEFAULT_LEDGER_PATH),
            filename_prefix: DEFAULT_FILENAME_PREFIX.to_string(),
            date_range: None,
            pacing_ms: DEFAULT_PACING_MS,
            listing_timeout_secs: DEFAULT_LISTING_TIMEOUT_SECS,
            fetch_timeout_secs: DEFAULT_FETCH_TIMEOUT_SECS,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

impl MirrorConfig {
    pub fn builder() -> MirrorConfigBuilder {
        MirrorConfigBuilder::default()
    }

    /// Load configuration from environment variables
    ///
    /// Environment variables:
    /// - `MIRROR_LISTING_URL`, `MIRROR_BASE_URL`: remote endpoints
    /// - `MIRROR_OUTPUT`, `MIRROR_LEDGER`: local paths
    /// - `MIRROR_PREFIX`: filename prefix
    /// - `MIRROR_START`, `MIRROR_END`: date window, both or neither
    /// - `MIRROR_PACING_MS`, `MIRROR_LISTING_TIMEOUT_SECS`,
    ///   `MIRROR_FETCH_TIMEOUT_SECS`: timing
    /// - `MIRROR_USER_AGENT`
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Layer variables resolved by `var` over the defaults
    ///
    /// When only the listing URL is given, files are fetched from the same
    /// directory.
    fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(url) = var("MIRROR_LISTING_URL") {
            config.base_url = url.clone();
            config.listing_url = url;
        }
        if let Some(url) = var("MIRROR_BASE_URL") {
            config.base_url = url;
        }
        if let Some(path) = var("MIRROR_OUTPUT") {
            config.output_path = PathBuf::from(path);
        }
        if let Some(path) = var("MIRROR_LEDGER") {
            config.ledger_path = PathBuf::from(path);
        }
        if let Some(prefix) = var("MIRROR_PREFIX") {
            config.filename_prefix = prefix;
        }
        if let Some(agent) = var("MIRROR_USER_AGENT") {
            config.user_agent = agent;
        }
        if let Some(ms) = parse_u64(&var, "MIRROR_PACING_MS")? {
            config.pacing_ms = ms;
        }
        if let Some(secs) = parse_u64(&var, "MIRROR_LISTING_TIMEOUT_SECS")? {
            config.listing_timeout_secs = secs;
        }
        if let Some(secs) = parse_u64(&var, "MIRROR_FETCH_TIMEOUT_SECS")? {
            config.fetch_timeout_secs = secs;
        }

        match (var("MIRROR_START"), var("MIRROR_END")) {
            (Some(start), Some(end)) => config.date_range = Some(DateRange::parse(&start, &end)?),
            (None, None) => {},
            _ => {
                return Err(CommonError::config(
                    "MIRROR_START and MIRROR_END must be set together",
                ))
            },
        }

        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        parse_url("listing URL", &self.listing_url)?;
        parse_url("file base URL", &self.base_url)?;

        if self.filename_prefix.is_empty() {
            return Err(CommonError::config("filename prefix cannot be empty"));
        }
        if self.output_path.as_os_str().is_empty() {
            return Err(CommonError::config("output path cannot be empty"));
        }
        if self.ledger_path.as_os_str().is_empty() {
            return Err(CommonError::config("ledger path cannot be empty"));
        }
        if self.output_path == self.ledger_path {
            return Err(CommonError::config("output and ledger must be different files"));
        }
        if self.listing_timeout_secs == 0 || self.fetch_timeout_secs == 0 {
            return Err(CommonError::config("timeouts must be greater than 0"));
        }
        if self.date_range.is_none() {
            return Err(CommonError::config("a start and end date are required"));
        }

        Ok(())
    }

    pub fn pacing(&self) -> Duration {
        Duration::from_millis(self.pacing_ms)
    }

    pub fn listing_timeout(&self) -> Duration {
        Duration::from_secs(self.listing_timeout_secs)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }
}

/// Parse a URL that files are resolved against
///
/// A missing trailing slash is added so that joining a filename extends the
/// path instead of replacing its last segment.
pub(crate) fn parse_directory_url(what: &str, raw: &str) -> Result<Url> {
    let mut url = parse_url(what, raw)?;
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}

pub(crate) fn parse_url(what: &str, raw: &str) -> Result<Url> {
    if raw.trim().is_empty() {
        return Err(CommonError::config(format!("{} cannot be empty", what)));
    }
    let url = Url::parse(raw)
        .map_err(|e| CommonError::config(format!("invalid {} '{}': {}", what, raw, e)))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(CommonError::config(format!("{} must be http(s): {}", what, raw)));
    }
    Ok(url)
}

fn parse_u64(var: &impl Fn(&str) -> Option<String>, name: &str) -> Result<Option<u64>> {
    var(name)
        .map(|val| {
            val.trim()
                .parse()
                .map_err(|e| CommonError::config(format!("{}='{}': {}", name, val, e)))
        })
        .transpose()
}

/// Builder for MirrorConfig
#[derive(Debug, Default)]
pub struct MirrorConfigBuilder {
    listing_url: Option<String>,
    base_url: Option<String>,
    output_path: Option<PathBuf>,
    ledger_path: Option<PathBuf>,
    filename_prefix: Option<String>,
    date_range: Option<DateRange>,
    pacing_ms: Option<u64>,
    listing_timeout_secs: Option<u64>,
    fetch_timeout_secs: Option<u64>,
    user_agent: Option<String>,
}

impl MirrorConfigBuilder {
    pub fn listing_url(mut self, url: impl Into<String>) -> Self {
        self.listing_url = Some(url.into());
        self
    }

    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    pub fn output_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.output_path = Some(path.into());
        self
    }

    pub fn ledger_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.ledger_path = Some(path.into());
        self
    }

    pub fn filename_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.filename_prefix = Some(prefix.into());
        self
    }

    pub fn date_range(mut self, range: DateRange) -> Self {
        self.date_range = Some(range);
        self
    }

    pub fn pacing_ms(mut self, ms: u64) -> Self {
        self.pacing_ms = Some(ms);
        self
    }

    pub fn listing_timeout_secs(mut self, secs: u64) -> Self {
        self.listing_timeout_secs = Some(secs);
        self
    }

    pub fn fetch_timeout_secs(mut self, secs: u64) -> Self {
        self.fetch_timeout_secs = Some(secs);
        self
    }

    pub fn user_agent(mut self, agent: impl Into<String>) -> Self {
        self.user_agent = Some(agent.into());
        self
    }

    pub fn build(self) -> MirrorConfig {
        let default = MirrorConfig::default();

        MirrorConfig {
            base_url: self
                .base_url
                .or_else(|| self.listing_url.clone())
                .unwrap_or(default.base_url),
            listing_url: self.listing_url.unwrap_or(default.listing_url),
            output_path: self.output_path.unwrap_or(default.output_path),
            ledger_path: self.ledger_path.unwrap_or(default.ledger_path),
            filename_prefix: self.filename_prefix.unwrap_or(default.filename_prefix),
            date_range: self.date_range.or(default.date_range),
            pacing_ms: self.pacing_ms.unwrap_or(default.pacing_ms),
            listing_timeout_secs: self
                .listing_timeout_secs
                .unwrap_or(default.listing_timeout_secs),
            fetch_timeout_secs: self.fetch_timeout_secs.unwrap_or(default.fetch_timeout_secs),
            user_agent: self.user_agent.unwrap_or(default.user_agent),
        }
    }
}

//! Remote retrieval and decoding
//!
//! [`Fetcher`] owns the HTTP client. It downloads the listing document and
//! individual gzip-compressed TSV dumps, and classifies every way a single
//! file can fail so the orchestrator can record it and move on.

use csv::StringRecord;
use flate2::read::GzDecoder;
use futures::StreamExt;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE};
use reqwest::{Client, StatusCode};
use serde::Serialize;
use std::io::Read;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};
use url::Url;

use crate::config::{parse_directory_url, parse_url, MirrorConfig};
use crate::error::Result;
use crate::progress::{download_bar, format_bytes};

/// Why a single remote file could not be mirrored
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("payment required (HTTP 402), the file is not freely downloadable")]
    PaymentRequired,

    #[error("HTTP {0}")]
    HttpStatus(StatusCode),

    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("corrupt payload: {0}")]
    CorruptPayload(String),

    #[error("invalid download address: {0}")]
    InvalidAddress(String),
}

/// Classification carried into the run summary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    PaymentRequired,
    HttpStatus,
    Timeout,
    Transport,
    CorruptPayload,
    InvalidAddress,
}

impl FailureKind {
    /// Permanent failures will not heal by simply running again
    pub fn is_permanent(self) -> bool {
        matches!(
            self,
            FailureKind::PaymentRequired | FailureKind::CorruptPayload | FailureKind::InvalidAddress
        )
    }
}

impl FetchError {
    pub fn kind(&self) -> FailureKind {
        match self {
            FetchError::PaymentRequired => FailureKind::PaymentRequired,
            FetchError::HttpStatus(_) => FailureKind::HttpStatus,
            FetchError::Timeout(_) => FailureKind::Timeout,
            FetchError::Transport(_) => FailureKind::Transport,
            FetchError::CorruptPayload(_) => FailureKind::CorruptPayload,
            FetchError::InvalidAddress(_) => FailureKind::InvalidAddress,
        }
    }

    fn from_reqwest(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            FetchError::Timeout(err.to_string())
        } else {
            FetchError::Transport(err.to_string())
        }
    }

    fn from_status(status: StatusCode) -> Option<Self> {
        match status {
            s if s.is_success() => None,
            s if s == StatusCode::PAYMENT_REQUIRED => Some(FetchError::PaymentRequired),
            s => Some(FetchError::HttpStatus(s)),
        }
    }

    fn corrupt(what: &str, err: impl std::fmt::Display) -> Self {
        FetchError::CorruptPayload(format!("{}: {}", what, err))
    }
}

/// A fully decoded TSV dump
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedTable {
    pub header: Vec<String>,
    pub rows: Vec<StringRecord>,
}

impl DecodedTable {
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }
}

pub struct Fetcher {
    client: Client,
    listing_url: Url,
    base_url: Url,
    listing_timeout: Duration,
    fetch_timeout: Duration,
}

impl Fetcher {
    pub fn new(config: &MirrorConfig) -> Result<Self> {
        let listing_url = parse_url("listing URL", &config.listing_url)?;
        let base_url = parse_directory_url("file base URL", &config.base_url)?;

        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8"),
        );
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.9"));

        let client = Client::builder()
            .user_agent(config.user_agent.as_str())
            .default_headers(headers)
            .build()?;

        Ok(Self {
            client,
            listing_url,
            base_url,
            listing_timeout: config.listing_timeout(),
            fetch_timeout: config.fetch_timeout(),
        })
    }

    pub fn listing_url(&self) -> &Url {
        &self.listing_url
    }

    /// `<base-url>/<filename>`
    pub fn file_url(&self, filename: &str) -> std::result::Result<Url, FetchError> {
        self.base_url
            .join(filename)
            .map_err(|e| FetchError::InvalidAddress(format!("{}: {}", filename, e)))
    }

    /// Retrieve the raw listing document
    pub async fn fetch_listing(&self) -> std::result::Result<String, FetchError> {
        debug!(url = %self.listing_url, "Fetching directory listing");

        let response = self
            .client
            .get(self.listing_url.clone())
            .timeout(self.listing_timeout)
            .send()
            .await
            .map_err(FetchError::from_reqwest)?;

        if let Some(err) = FetchError::from_status(response.status()) {
            return Err(err);
        }

        response.text().await.map_err(FetchError::from_reqwest)
    }

    /// Download, gunzip and parse one dump
    ///
    /// Yields the complete table or an error; never a partial row set.
    pub async fn fetch_table(&self, filename: &str) -> std::result::Result<DecodedTable, FetchError> {
        let url = self.file_url(filename)?;
        info!(filename = %filename, url = %url, "Downloading");

        let response = self
            .client
            .get(url)
            .timeout(self.fetch_timeout)
            .send()
            .await
            .map_err(FetchError::from_reqwest)?;

        if let Some(err) = FetchError::from_status(response.status()) {
            return Err(err);
        }

        let payload = read_body(filename, response).await?;
        debug!(
            filename = %filename,
            size = %format_bytes(payload.len() as u64),
            "Download complete"
        );

        decode_table(&payload)
    }
}

/// Upper bound on buffer space reserved from an advertised content length
const MAX_PREALLOCATION: u64 = 256 * 1024 * 1024;

async fn read_body(
    filename: &str,
    response: reqwest::Response,
) -> std::result::Result<Vec<u8>, FetchError> {
    let expected = response.content_length();
    let pb = download_bar(expected.unwrap_or(0), filename);

    let mut payload = Vec::with_capacity(expected.unwrap_or(0).min(MAX_PREALLOCATION) as usize);
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = match chunk {
            Ok(chunk) => chunk,
            Err(e) => {
                pb.abandon();
                return Err(FetchError::from_reqwest(e));
            },
        };
        payload.extend_from_slice(&chunk);
        pb.set_position(payload.len() as u64);
    }
    pb.finish_and_clear();

    if let Some(expected) = expected {
        if payload.len() as u64 != expected {
            return Err(FetchError::Transport(format!(
                "incomplete body: received {} of {} bytes",
                payload.len(),
                expected
            )));
        }
    }

    Ok(payload)
}

/// Gunzip a single-member payload and parse it as tab-delimited text with a
/// header row
pub fn decode_table(payload: &[u8]) -> std::result::Result<DecodedTable, FetchError> {
    let mut decoder = GzDecoder::new(payload);
    let mut text = Vec::new();
    decoder
        .read_to_end(&mut text)
        .map_err(|e| FetchError::corrupt("gzip", e))?;

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .has_headers(true)
        .flexible(false)
        .from_reader(text.as_slice());

    let header: Vec<String> = reader
        .headers()
        .map_err(|e| FetchError::corrupt("tsv header", e))?
        .iter()
        .map(str::to_string)
        .collect();
    if header.iter().all(|col| col.is_empty()) {
        return Err(FetchError::CorruptPayload("missing header row".to_string()));
    }

    let rows = reader
        .records()
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| FetchError::corrupt("tsv row", e))?;

    Ok(DecodedTable { header, rows })
}

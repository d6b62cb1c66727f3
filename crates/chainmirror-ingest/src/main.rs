//! chainmirror - incremental mirror of dated blockchain dumps

use anyhow::{Context, Result};
use chainmirror_common::logging::{init_logging, LogConfig, LogLevel};
use chainmirror_ingest::{DateRange, MirrorConfig, Orchestrator};
use clap::Parser;
use std::path::PathBuf;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "chainmirror")]
#[command(author, version, about = "Mirror dated TSV dumps into one combined CSV")]
struct Cli {
    /// Start of the publication window (YYYY-MM-DD[ HH:MM[:SS]])
    #[arg(long, env = "MIRROR_START", requires = "end")]
    start: Option<String>,

    /// End of the publication window, inclusive; a bare date covers the whole day
    #[arg(long, env = "MIRROR_END", requires = "start")]
    end: Option<String>,

    /// Directory listing URL
    #[arg(long)]
    listing_url: Option<String>,

    /// Base URL files are downloaded from (defaults to the listing URL)
    #[arg(long)]
    base_url: Option<String>,

    /// Combined CSV output
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Resume ledger file
    #[arg(long)]
    ledger: Option<PathBuf>,

    /// Filename prefix of the dumps to mirror
    #[arg(long)]
    prefix: Option<String>,

    /// Delay between file downloads in milliseconds
    #[arg(long)]
    pacing_ms: Option<u64>,

    #[arg(long)]
    listing_timeout_secs: Option<u64>,

    #[arg(long)]
    fetch_timeout_secs: Option<u64>,

    /// Print the run summary as JSON
    #[arg(long)]
    json: bool,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    /// Layer command-line flags over environment configuration
    fn apply(self, mut config: MirrorConfig) -> Result<MirrorConfig> {
        if let Some(url) = self.listing_url {
            if self.base_url.is_none() && std::env::var("MIRROR_BASE_URL").is_err() {
                config.base_url = url.clone();
            }
            config.listing_url = url;
        }
        if let Some(url) = self.base_url {
            config.base_url = url;
        }
        if let Some(path) = self.output {
            config.output_path = path;
        }
        if let Some(path) = self.ledger {
            config.ledger_path = path;
        }
        if let Some(prefix) = self.prefix {
            config.filename_prefix = prefix;
        }
        if let Some(ms) = self.pacing_ms {
            config.pacing_ms = ms;
        }
        if let Some(secs) = self.listing_timeout_secs {
            config.listing_timeout_secs = secs;
        }
        if let Some(secs) = self.fetch_timeout_secs {
            config.fetch_timeout_secs = secs;
        }
        if let (Some(start), Some(end)) = (self.start, self.end) {
            config.date_range = Some(DateRange::parse(&start, &end)?);
        }

        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let mut log_config = LogConfig::from_env()?;
    if cli.verbose {
        log_config.level = LogLevel::Debug;
    }
    let _guard = init_logging(&log_config)?;

    let json = cli.json;
    let config = cli.apply(MirrorConfig::from_env()?)?;

    info!(
        listing_url = %config.listing_url,
        output = %config.output_path.display(),
        ledger = %config.ledger_path.display(),
        "Starting mirror run"
    );

    let mut orchestrator = Orchestrator::new(config)?;
    let summary = orchestrator.run().await?;

    if json {
        let text = serde_json::to_string_pretty(&summary).context("Failed to encode summary")?;
        println!("{}", text);
    } else {
        print!("{}", summary);
    }

    Ok(())
}

//! End-to-end tests for the mirror pipeline
//!
//! Each test serves a directory listing and gzip-compressed TSV dumps from a
//! wiremock server and runs the orchestrator against temporary local paths:
//! - Date-range selection and listing order
//! - Resume ledger skips and idempotent re-runs
//! - Per-file failure isolation (402, corrupt payload, timeout)
//! - Fatal errors (listing failure, schema change)

use chainmirror_ingest::fetch::FailureKind;
use chainmirror_ingest::{DateRange, IngestError, MirrorConfig, Orchestrator};
use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tempfile::TempDir;
use wiremock::{
    matchers::{method, path},
    Mock, MockServer, ResponseTemplate,
};

const LISTING_PATH: &str = "/bitcoin/transactions/";
const HEADER: &str = "block_id\thash\ttime\tfee_usd";

fn name(day: &str) -> String {
    format!("blockchair_bitcoin_transactions_{}.tsv.gz", day)
}

/// Autoindex-style listing; each entry is `(filename, "DD-Mon-YYYY HH:MM")`
fn listing_html(entries: &[(&str, &str)]) -> String {
    let mut html = String::from(
        "<html>\n<head><title>Index of /bitcoin/transactions/</title></head>\n<body>\n\
         <h1>Index of /bitcoin/transactions/</h1><hr><pre><a href=\"../\">../</a>\n",
    );
    for (filename, published) in entries {
        html.push_str(&format!(
            "<a href=\"{0}\">{0}</a>     {1}    35M\n",
            filename, published
        ));
    }
    html.push_str("</pre><hr></body>\n</html>\n");
    html
}

fn gzip(text: &str) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(text.as_bytes()).unwrap();
    encoder.finish().unwrap()
}

/// Dump with `rows` data rows under the standard header
fn dump(tag: &str, rows: usize) -> Vec<u8> {
    let mut text = format!("{}\n", HEADER);
    for i in 0..rows {
        text.push_str(&format!("{}\t{}{:04}\t2022-07-01 00:00:00\t0.5\n", 740000 + i, tag, i));
    }
    gzip(&text)
}

async fn mount_listing(server: &MockServer, entries: &[(&str, &str)]) {
    Mock::given(method("GET"))
        .and(path(LISTING_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_string(listing_html(entries)))
        .mount(server)
        .await;
}

async fn mount_file(server: &MockServer, filename: &str, body: Vec<u8>) {
    Mock::given(method("GET"))
        .and(path(format!("{}{}", LISTING_PATH, filename)))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(body))
        .mount(server)
        .await;
}

struct Workspace {
    _dir: TempDir,
    output: PathBuf,
    ledger: PathBuf,
}

impl Workspace {
    fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let output = dir.path().join("blockchair_data").join("combined_transactions.csv");
        let ledger = dir.path().join("blockchair_data").join("downloaded_files.txt");
        Self {
            _dir: dir,
            output,
            ledger,
        }
    }

    fn config(&self, server: &MockServer) -> MirrorConfig {
        MirrorConfig::builder()
            .listing_url(format!("{}{}", server.uri(), LISTING_PATH))
            .output_path(&self.output)
            .ledger_path(&self.ledger)
            .date_range(DateRange::parse("2022-07-01", "2022-10-01").unwrap())
            .pacing_ms(0)
            .build()
    }

    fn ledger_lines(&self) -> Vec<String> {
        read_lines(&self.ledger)
    }

    fn output_lines(&self) -> Vec<String> {
        read_lines(&self.output)
    }
}

fn read_lines(path: &Path) -> Vec<String> {
    match fs::read_to_string(path) {
        Ok(text) => text.lines().map(str::to_string).collect(),
        Err(_) => Vec::new(),
    }
}

fn quarter_listing() -> Vec<(String, &'static str)> {
    vec![
        (name("20220630"), "30-Jun-2022 05:04"),
        (name("20220701"), "01-Jul-2022 05:04"),
        (name("20220930"), "30-Sep-2022 05:04"),
        (name("20221001"), "01-Oct-2022 05:04"),
        (name("20221002"), "02-Oct-2022 05:04"),
    ]
}

fn as_refs<'a>(entries: &'a [(String, &'static str)]) -> Vec<(&'a str, &'a str)> {
    entries.iter().map(|(f, d)| (f.as_str(), *d)).collect()
}

// ============================================================================
// Selection
// ============================================================================

#[tokio::test]
async fn test_quarter_range_mirrors_middle_entries_in_order() {
    let server = MockServer::start().await;
    let ws = Workspace::new();
    let entries = quarter_listing();
    mount_listing(&server, &as_refs(&entries)).await;

    mount_file(&server, &name("20220701"), dump("a", 2)).await;
    mount_file(&server, &name("20220930"), dump("b", 3)).await;
    mount_file(&server, &name("20221001"), dump("c", 1)).await;
    for outside in [name("20220630"), name("20221002")] {
        Mock::given(method("GET"))
            .and(path(format!("{}{}", LISTING_PATH, outside)))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(dump("x", 1)))
            .expect(0)
            .mount(&server)
            .await;
    }

    let summary = Orchestrator::new(ws.config(&server)).unwrap().run().await.unwrap();

    assert_eq!(summary.listed, 5);
    assert_eq!(summary.targeted, 3);
    assert_eq!(summary.succeeded, 3);
    assert_eq!(summary.rows_appended, 6);
    assert!(summary.failures.is_empty());

    assert_eq!(
        ws.ledger_lines(),
        vec![name("20220701"), name("20220930"), name("20221001")]
    );

    let output = ws.output_lines();
    assert_eq!(output.len(), 1 + 6);
    assert_eq!(output[0], "block_id,hash,time,fee_usd");
    assert!(output[1].contains("a0000"));
    assert!(output[3].contains("b0000"));
    assert!(output[6].contains("c0000"));
}

// ============================================================================
// Resume ledger
// ============================================================================

#[tokio::test]
async fn test_second_run_is_idempotent() {
    let server = MockServer::start().await;
    let ws = Workspace::new();
    let entries = quarter_listing();
    mount_listing(&server, &as_refs(&entries)).await;
    mount_file(&server, &name("20220701"), dump("a", 2)).await;
    mount_file(&server, &name("20220930"), dump("b", 2)).await;
    mount_file(&server, &name("20221001"), dump("c", 2)).await;

    Orchestrator::new(ws.config(&server)).unwrap().run().await.unwrap();
    let output_before = fs::read(&ws.output).unwrap();
    let ledger_before = fs::read(&ws.ledger).unwrap();

    let summary = Orchestrator::new(ws.config(&server)).unwrap().run().await.unwrap();

    assert_eq!(summary.succeeded, 0);
    assert_eq!(summary.already_done, 3);
    assert!(summary.no_new_work());
    assert_eq!(fs::read(&ws.output).unwrap(), output_before);
    assert_eq!(fs::read(&ws.ledger).unwrap(), ledger_before);
}

#[tokio::test]
async fn test_ledger_entry_is_never_refetched() {
    let server = MockServer::start().await;
    let ws = Workspace::new();
    let entries = quarter_listing();
    mount_listing(&server, &as_refs(&entries)).await;

    fs::create_dir_all(ws.ledger.parent().unwrap()).unwrap();
    fs::write(&ws.ledger, format!("{}\n", name("20220930"))).unwrap();

    Mock::given(method("GET"))
        .and(path(format!("{}{}", LISTING_PATH, name("20220930"))))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(dump("b", 1)))
        .expect(0)
        .mount(&server)
        .await;
    mount_file(&server, &name("20220701"), dump("a", 1)).await;
    mount_file(&server, &name("20221001"), dump("c", 1)).await;

    let summary = Orchestrator::new(ws.config(&server)).unwrap().run().await.unwrap();

    assert_eq!(summary.targeted, 3);
    assert_eq!(summary.already_done, 1);
    assert_eq!(summary.succeeded, 2);
    assert_eq!(summary.remaining(), 0);
    assert_eq!(
        ws.ledger_lines(),
        vec![name("20220930"), name("20220701"), name("20221001")]
    );
}

#[tokio::test]
async fn test_empty_queue_reports_no_new_work() {
    let server = MockServer::start().await;
    let ws = Workspace::new();
    mount_listing(&server, &[(name("20220630").as_str(), "30-Jun-2022 05:04")]).await;

    let summary = Orchestrator::new(ws.config(&server)).unwrap().run().await.unwrap();

    assert_eq!(summary.listed, 1);
    assert_eq!(summary.targeted, 0);
    assert!(summary.no_new_work());
    assert!(!ws.output.exists());
    assert!(!ws.ledger.exists());
}

// ============================================================================
// Per-file failures
// ============================================================================

#[tokio::test]
async fn test_payment_required_is_recorded_and_not_committed() {
    let server = MockServer::start().await;
    let ws = Workspace::new();
    let entries = quarter_listing();
    mount_listing(&server, &as_refs(&entries)).await;

    mount_file(&server, &name("20220701"), dump("a", 1)).await;
    Mock::given(method("GET"))
        .and(path(format!("{}{}", LISTING_PATH, name("20220930"))))
        .respond_with(ResponseTemplate::new(402))
        .mount(&server)
        .await;
    mount_file(&server, &name("20221001"), dump("c", 1)).await;

    let summary = Orchestrator::new(ws.config(&server)).unwrap().run().await.unwrap();

    assert_eq!(summary.succeeded, 2);
    assert_eq!(summary.failed(), 1);
    assert_eq!(summary.remaining(), 1);
    let failure = &summary.failures[0];
    assert_eq!(failure.filename, name("20220930"));
    assert_eq!(failure.kind, FailureKind::PaymentRequired);
    assert!(failure.reason.contains("402"));
    assert!(summary.has_permanent_failures());

    assert!(!ws.ledger_lines().contains(&name("20220930")));
    assert_eq!(ws.ledger_lines().len(), 2);
}

#[tokio::test]
async fn test_corrupt_payload_does_not_stop_later_files() {
    let server = MockServer::start().await;
    let ws = Workspace::new();
    let entries = quarter_listing();
    mount_listing(&server, &as_refs(&entries)).await;

    mount_file(&server, &name("20220701"), b"this is not gzip".to_vec()).await;
    mount_file(&server, &name("20220930"), dump("b", 2)).await;
    mount_file(&server, &name("20221001"), gzip("a\tb\n1\t2\t3\n")).await;

    let summary = Orchestrator::new(ws.config(&server)).unwrap().run().await.unwrap();

    assert_eq!(summary.succeeded, 1);
    assert_eq!(summary.failed(), 2);
    assert!(summary
        .failures
        .iter()
        .all(|f| f.kind == FailureKind::CorruptPayload));
    assert_eq!(ws.ledger_lines(), vec![name("20220930")]);
    assert_eq!(ws.output_lines().len(), 1 + 2);
}

#[tokio::test]
async fn test_server_error_is_transient() {
    let server = MockServer::start().await;
    let ws = Workspace::new();
    mount_listing(&server, &[(name("20220801").as_str(), "01-Aug-2022 05:04")]).await;
    Mock::given(method("GET"))
        .and(path(format!("{}{}", LISTING_PATH, name("20220801"))))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let summary = Orchestrator::new(ws.config(&server)).unwrap().run().await.unwrap();

    assert_eq!(summary.failures[0].kind, FailureKind::HttpStatus);
    assert!(!summary.has_permanent_failures());
}

#[tokio::test]
async fn test_slow_file_times_out_and_run_continues() {
    let server = MockServer::start().await;
    let ws = Workspace::new();
    mount_listing(
        &server,
        &[
            (name("20220801").as_str(), "01-Aug-2022 05:04"),
            (name("20220802").as_str(), "02-Aug-2022 05:04"),
        ],
    )
    .await;
    Mock::given(method("GET"))
        .and(path(format!("{}{}", LISTING_PATH, name("20220801"))))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_bytes(dump("slow", 1))
                .set_delay(Duration::from_secs(3)),
        )
        .mount(&server)
        .await;
    mount_file(&server, &name("20220802"), dump("b", 1)).await;

    let mut config = ws.config(&server);
    config.fetch_timeout_secs = 1;
    let summary = Orchestrator::new(config).unwrap().run().await.unwrap();

    assert_eq!(summary.failures.len(), 1);
    assert_eq!(summary.failures[0].kind, FailureKind::Timeout);
    assert_eq!(ws.ledger_lines(), vec![name("20220802")]);
}

#[tokio::test]
async fn test_pacing_applies_between_failed_fetches() {
    let server = MockServer::start().await;
    let ws = Workspace::new();
    let days = ["20220801", "20220802", "20220803"];
    mount_listing(
        &server,
        &[
            (name(days[0]).as_str(), "01-Aug-2022 05:04"),
            (name(days[1]).as_str(), "02-Aug-2022 05:04"),
            (name(days[2]).as_str(), "03-Aug-2022 05:04"),
        ],
    )
    .await;
    for (day, status) in days.iter().zip([402, 503, 404]) {
        Mock::given(method("GET"))
            .and(path(format!("{}{}", LISTING_PATH, name(day))))
            .respond_with(ResponseTemplate::new(status))
            .expect(1)
            .mount(&server)
            .await;
    }

    let mut config = ws.config(&server);
    config.pacing_ms = 300;
    let started = Instant::now();
    let summary = Orchestrator::new(config).unwrap().run().await.unwrap();
    let elapsed = started.elapsed();

    assert_eq!(summary.failed(), 3);
    // two gaps between three fetches
    assert!(elapsed >= Duration::from_millis(600), "elapsed {:?}", elapsed);
    assert!(ws.ledger_lines().is_empty());
}

// ============================================================================
// Append-only output
// ============================================================================

#[tokio::test]
async fn test_rows_accumulate_under_single_header() {
    let server = MockServer::start().await;
    let ws = Workspace::new();
    mount_listing(&server, &[(name("20220801").as_str(), "01-Aug-2022 05:04")]).await;
    mount_file(&server, &name("20220801"), dump("a", 4)).await;
    Orchestrator::new(ws.config(&server)).unwrap().run().await.unwrap();
    let before = ws.output_lines().len();

    // a new file appears in the listing
    server.reset().await;
    mount_listing(
        &server,
        &[
            (name("20220801").as_str(), "01-Aug-2022 05:04"),
            (name("20220802").as_str(), "02-Aug-2022 05:04"),
        ],
    )
    .await;
    mount_file(&server, &name("20220802"), dump("b", 5)).await;

    let summary = Orchestrator::new(ws.config(&server)).unwrap().run().await.unwrap();

    assert_eq!(summary.rows_appended, 5);
    let output = ws.output_lines();
    assert_eq!(output.len(), before + 5);
    assert_eq!(output.iter().filter(|l| l.starts_with("block_id,")).count(), 1);
}

// ============================================================================
// Fatal errors
// ============================================================================

#[tokio::test]
async fn test_listing_failure_is_fatal() {
    let server = MockServer::start().await;
    let ws = Workspace::new();
    Mock::given(method("GET"))
        .and(path(LISTING_PATH))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let err = Orchestrator::new(ws.config(&server)).unwrap().run().await.unwrap_err();

    assert!(matches!(err, IngestError::Listing { .. }));
    assert!(!ws.output.exists());
    assert!(!ws.ledger.exists());
}

#[tokio::test]
async fn test_schema_change_aborts_run() {
    let server = MockServer::start().await;
    let ws = Workspace::new();
    mount_listing(
        &server,
        &[
            (name("20220801").as_str(), "01-Aug-2022 05:04"),
            (name("20220802").as_str(), "02-Aug-2022 05:04"),
            (name("20220803").as_str(), "03-Aug-2022 05:04"),
        ],
    )
    .await;
    mount_file(&server, &name("20220801"), dump("a", 1)).await;
    mount_file(&server, &name("20220802"), gzip("block_id\thash\n1\taa\n")).await;
    Mock::given(method("GET"))
        .and(path(format!("{}{}", LISTING_PATH, name("20220803"))))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(dump("c", 1)))
        .expect(0)
        .mount(&server)
        .await;

    let err = Orchestrator::new(ws.config(&server)).unwrap().run().await.unwrap_err();

    assert!(err.is_schema_mismatch());
    assert_eq!(ws.ledger_lines(), vec![name("20220801")]);
    assert_eq!(ws.output_lines().len(), 2);
}

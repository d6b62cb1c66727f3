//! Progress bars for file downloads
//!
//! Bars draw to stderr and stay hidden when stderr is not a terminal, so
//! they never interleave with piped log output or the printed summary.

use indicatif::{ProgressBar, ProgressStyle};

/// Byte progress for one download; `total` of 0 means unknown length
pub fn download_bar(total: u64, message: &str) -> ProgressBar {
    let (pb, template) = if total > 0 {
        (
            ProgressBar::new(total),
            "{msg}\n{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {bytes}/{total_bytes} ({eta})",
        )
    } else {
        (ProgressBar::new_spinner(), "{spinner:.green} {msg} {bytes} ({bytes_per_sec})")
    };

    let style = ProgressStyle::default_bar()
        .template(template)
        .map(|style| style.progress_chars("#>-"))
        .unwrap_or_else(|_| ProgressStyle::default_bar());
    pb.set_style(style);
    pb.set_message(message.to_string());
    pb
}

/// Format bytes into a human-readable string
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut size = bytes as f64;
    let mut unit_idx = 0;

    while size >= 1024.0 && unit_idx < UNITS.len() - 1 {
        size /= 1024.0;
        unit_idx += 1;
    }

    if unit_idx == 0 {
        format!("{} {}", bytes, UNITS[0])
    } else {
        format!("{:.2} {}", size, UNITS[unit_idx])
    }
}

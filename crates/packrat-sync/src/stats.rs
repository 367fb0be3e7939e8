//! Scraping of rsync's `--stats` block.

use packrat_core::error::{PackratError, PackratResult};
use packrat_core::provider::SyncSummary;

/// Build a `SyncSummary` from `--stats` output.
///
/// Handles both the modern label (`Number of regular files transferred`)
/// and the pre-3.1 one (`Number of files transferred`). A missing transfer
/// count is an error; size counters default to zero since older builds can
/// omit them.
pub(crate) fn parse_summary(payload: &str) -> PackratResult<SyncSummary> {
    let files_transferred = scan_counter(payload, "Number of regular files transferred")
        .or_else(|| scan_counter(payload, "Number of files transferred"))
        .ok_or_else(|| {
            PackratError::Parse("rsync --stats output lacks a transferred-files count".to_string())
        })?;

    Ok(SyncSummary {
        files_transferred,
        bytes_transferred: scan_counter(payload, "Total transferred file size").unwrap_or(0),
        total_file_size: scan_counter(payload, "Total file size").unwrap_or(0),
        partial: None,
    })
}

/// First number after `label:`, commas stripped. rsync writes counters like
/// `Total file size: 1,234,567 bytes`.
fn scan_counter(payload: &str, label: &str) -> Option<u64> {
    payload.lines().find_map(|line| {
        let rest = line.trim().strip_prefix(label)?.trim_start();
        let rest = rest.strip_prefix(':')?.trim_start();
        let digits: String = rest
            .chars()
            .take_while(|ch| ch.is_ascii_digit() || *ch == ',')
            .filter(|ch| ch.is_ascii_digit())
            .collect();
        digits.parse().ok()
    })
}

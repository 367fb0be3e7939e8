//! Scraping of `zfs`/`zpool` scripted (`-H`, tab-separated) output.
//!
//! A malformed line is an error naming the line, never a silent skip.

use packrat_core::error::{PackratError, PackratResult};
use packrat_core::provider::{FilesystemInfo, SnapshotInfo};

/// `zpool list -H -o name,health` rows.
pub(crate) fn parse_pool_rows(payload: &str) -> PackratResult<Vec<(String, String)>> {
    payload
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| {
            let mut parts = line.split('\t');
            let name = field(&mut parts, line, "name")?;
            let health = field(&mut parts, line, "health")?;
            Ok((name.to_string(), health.to_string()))
        })
        .collect()
}

/// `zfs list -H -p -r -t filesystem -o name,used,avail,mountpoint` rows.
pub(crate) fn parse_filesystem_rows(payload: &str) -> PackratResult<Vec<FilesystemInfo>> {
    payload
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| {
            let mut parts = line.split('\t');
            let name = field(&mut parts, line, "name")?;
            let used = numeric(field(&mut parts, line, "used")?, line)?;
            let avail = numeric(field(&mut parts, line, "avail")?, line)?;
            let mountpoint = field(&mut parts, line, "mountpoint")?;
            Ok(FilesystemInfo {
                name: name.to_string(),
                used,
                avail,
                mountpoint: mountpoint.to_string(),
            })
        })
        .collect()
}

/// `zfs list -H -p -t snapshot -o name,creation,used` rows.
///
/// The name column carries `fs@snap`; only the short name survives.
pub(crate) fn parse_snapshot_rows(payload: &str) -> PackratResult<Vec<SnapshotInfo>> {
    let mut snapshots: Vec<SnapshotInfo> = payload
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| {
            let mut parts = line.split('\t');
            let full = field(&mut parts, line, "name")?;
            let name = full
                .split_once('@')
                .map(|(_, short)| short)
                .ok_or_else(|| {
                    PackratError::Parse(format!("snapshot row without `@`: `{line}`"))
                })?;
            let creation = field(&mut parts, line, "creation")?
                .trim()
                .parse::<i64>()
                .map_err(|_| {
                    PackratError::Parse(format!("non-numeric creation in `{line}`"))
                })?;
            let used = numeric(field(&mut parts, line, "used")?, line)?;
            Ok(SnapshotInfo {
                name: name.to_string(),
                creation,
                used,
            })
        })
        .collect::<PackratResult<_>>()?;

    snapshots.sort_by(|a, b| a.creation.cmp(&b.creation).then_with(|| a.name.cmp(&b.name)));
    Ok(snapshots)
}

/// One `zfs get -H -o value <prop>` line; `-` means unset.
pub(crate) fn parse_property_value(payload: &str) -> Option<String> {
    let value = payload.lines().next().map(str::trim).unwrap_or("");
    if value.is_empty() || value == "-" {
        None
    } else {
        Some(value.to_string())
    }
}

fn field<'a>(
    parts: &mut std::str::Split<'a, char>,
    line: &str,
    label: &str,
) -> PackratResult<&'a str> {
    parts
        .next()
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .ok_or_else(|| PackratError::Parse(format!("missing {label} column in `{line}`")))
}

fn numeric(value: &str, line: &str) -> PackratResult<u64> {
    value
        .parse::<u64>()
        .map_err(|_| PackratError::Parse(format!("non-numeric field `{value}` in `{line}`")))
}

//! Snapshot naming and retention planning.
//!
//! Pure functions; the workflows feed them snapshot lists scraped from the
//! storage subsystem. Only snapshots carrying the configured prefix are ever
//! eligible for destruction.

use crate::error::{PackratError, PackratResult};
use crate::provider::SnapshotInfo;
use chrono::{DateTime, Utc};

/// Render a snapshot name: `<prefix>-<UTC %Y%m%d-%H%M%S>[-<label>]`.
pub fn snapshot_name(prefix: &str, now: DateTime<Utc>, label: Option<&str>) -> String {
    let stamp = now.format("%Y%m%d-%H%M%S");
    match label {
        Some(label) => format!("{prefix}-{stamp}-{label}"),
        None => format!("{prefix}-{stamp}"),
    }
}

/// Whether a short snapshot name belongs to packrat under `prefix`.
pub fn is_managed_name(prefix: &str, name: &str) -> bool {
    name.strip_prefix(prefix)
        .and_then(|rest| rest.strip_prefix('-'))
        .is_some_and(|rest| !rest.is_empty())
}

/// Validate a retention count coming from a flag, property, or config.
pub fn validate_keep(keep: u32) -> PackratResult<u32> {
    if keep == 0 {
        return Err(PackratError::InvalidConfig(
            "retention count must be at least 1; packrat does not delete history wholesale".into(),
        ));
    }
    Ok(keep)
}

/// Select the managed snapshots to destroy so the newest `keep` survive.
///
/// Input order does not matter; the plan is oldest-first, with name as the
/// tie-break on equal creation times. Foreign snapshots are ignored.
pub fn plan_prune<'a>(
    snapshots: &'a [SnapshotInfo],
    prefix: &str,
    keep: u32,
) -> Vec<&'a SnapshotInfo> {
    let mut managed: Vec<&SnapshotInfo> = snapshots
        .iter()
        .filter(|snap| is_managed_name(prefix, &snap.name))
        .collect();
    managed.sort_by(|a, b| a.creation.cmp(&b.creation).then_with(|| a.name.cmp(&b.name)));

    let keep = keep as usize;
    if managed.len() <= keep {
        return Vec::new();
    }
    let cut = managed.len() - keep;
    managed.truncate(cut);
    managed
}

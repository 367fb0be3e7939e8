//! The central backup sequence: sync, snapshot, prune.

use super::{effective_keep, event, provision, WorkflowLevel, WorkflowReport};
use crate::config::PackratConfig;
use crate::error::{PackratError, PackratResult};
use crate::provider::{FileSync, SnapshotStore, SyncDestination};
use crate::retention;
use crate::target::BackupTarget;
use chrono::Utc;
use log::info;
use std::path::{Path, PathBuf};

/// Per-invocation knobs for `run_backup`.
#[derive(Debug, Clone, Default)]
pub struct BackupOptions {
    /// Retention override; falls back to `packrat:keep`, then config.
    pub keep: Option<u32>,
    /// Optional suffix appended to the snapshot name.
    pub label: Option<String>,
    /// rsync exclude patterns.
    pub excludes: Vec<String>,
    /// Create the target filesystem when missing.
    pub create_missing: bool,
}

/// Mirror `source` into the target filesystem, snapshot the result, and
/// prune history down to the effective retention.
///
/// A failed sync never snapshots; a tolerated partial transfer (vanished
/// source files) snapshots with a warning so the history still advances.
pub fn run_backup<S, F>(
    config: &PackratConfig,
    store: &S,
    sync: &F,
    target: &BackupTarget,
    source: &Path,
    options: BackupOptions,
) -> PackratResult<WorkflowReport>
where
    S: SnapshotStore<Error = PackratError>,
    F: FileSync<Error = PackratError>,
{
    target.require_filesystem()?;
    // Reject a bad retention flag up front, before any bytes move.
    if let Some(keep) = options.keep {
        retention::validate_keep(keep)?;
    }
    if let Some(label) = options.label.as_deref() {
        if !crate::target::is_valid_component(label) {
            return Err(PackratError::InvalidConfig(format!(
                "label `{label}` is not a valid snapshot name component"
            )));
        }
    }
    if !source.is_dir() {
        return Err(PackratError::InvalidConfig(format!(
            "source {} is not a directory",
            source.display()
        )));
    }

    let mut events = Vec::new();
    let filesystem = target.filesystem();

    if !store.filesystem_exists(&filesystem)? {
        if options.create_missing || config.policy.auto_create {
            let provision =
                provision::provision_filesystem(config, store, target, options.keep)?;
            events.extend(provision.events);
        } else {
            return Err(PackratError::Provider(format!(
                "filesystem {filesystem} does not exist; pass --create or set policy.auto_create"
            )));
        }
    }

    let mountpoint = store.mountpoint(&filesystem)?;
    provision::usable_mountpoint(&filesystem, &mountpoint)?;

    let dest = SyncDestination {
        host: target.host.clone(),
        path: PathBuf::from(&mountpoint),
    };
    info!(
        "syncing {} into {}{}",
        source.display(),
        target.host.as_deref().map(|h| format!("{h}:")).unwrap_or_default(),
        mountpoint
    );
    let summary = sync.mirror(source, &dest, &options.excludes)?;
    events.push(event(
        WorkflowLevel::Info,
        format!(
            "Synced {} file(s), {} byte(s) transferred (total size {})",
            summary.files_transferred, summary.bytes_transferred, summary.total_file_size
        ),
    ));
    if let Some(reason) = &summary.partial {
        events.push(event(
            WorkflowLevel::Warn,
            format!("Sync finished partially: {reason}"),
        ));
    }

    let prefix = config.policy.snapshot_prefix.as_str();
    let snapshot = retention::snapshot_name(prefix, Utc::now(), options.label.as_deref());
    store.create_snapshot(&filesystem, &snapshot)?;
    events.push(event(
        WorkflowLevel::Success,
        format!("Created snapshot {filesystem}@{snapshot}"),
    ));

    let keep = effective_keep(config, store, &filesystem, options.keep, &mut events)?;
    let snapshots = store.list_snapshots(&filesystem)?;
    let plan = retention::plan_prune(&snapshots, prefix, keep);
    if plan.is_empty() {
        events.push(event(
            WorkflowLevel::Info,
            format!("Retention {keep} satisfied; nothing to prune"),
        ));
    } else {
        for stale in &plan {
            store.destroy_snapshot(&filesystem, &stale.name)?;
            events.push(event(
                WorkflowLevel::Info,
                format!("Pruned {filesystem}@{}", stale.name),
            ));
        }
        events.push(event(
            WorkflowLevel::Success,
            format!("Pruned {} snapshot(s); {keep} retained", plan.len()),
        ));
    }

    Ok(WorkflowReport {
        title: format!("Backed up {} into {target}", source.display()),
        events,
    })
}

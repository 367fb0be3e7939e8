//! Retention enforcement, standalone and dry-runnable.

use super::{effective_keep, event, WorkflowLevel, WorkflowReport};
use crate::config::PackratConfig;
use crate::error::{PackratError, PackratResult};
use crate::provider::SnapshotStore;
use crate::retention;
use crate::target::BackupTarget;

#[derive(Debug, Clone, Default)]
pub struct PruneOptions {
    pub keep: Option<u32>,
    /// Render the plan without destroying anything.
    pub dry_run: bool,
}

/// Prune packrat-owned snapshots of the target filesystem.
///
/// When the target carries an explicit `@snapshot`, exactly that snapshot is
/// destroyed; names outside the configured prefix are refused in every path.
pub fn prune_snapshots<S>(
    config: &PackratConfig,
    store: &S,
    target: &BackupTarget,
    options: PruneOptions,
) -> PackratResult<WorkflowReport>
where
    S: SnapshotStore<Error = PackratError>,
{
    let mut events = Vec::new();
    let filesystem = target.filesystem();
    let prefix = config.policy.snapshot_prefix.as_str();

    if let Some(snapshot) = target.snapshot.as_deref() {
        if !retention::is_managed_name(prefix, snapshot) {
            return Err(PackratError::InvalidConfig(format!(
                "snapshot {filesystem}@{snapshot} is outside the `{prefix}` prefix; packrat only destroys its own snapshots"
            )));
        }
        if options.dry_run {
            events.push(event(
                WorkflowLevel::Info,
                format!("Would destroy {filesystem}@{snapshot}"),
            ));
        } else {
            store.destroy_snapshot(&filesystem, snapshot)?;
            events.push(event(
                WorkflowLevel::Success,
                format!("Destroyed {filesystem}@{snapshot}"),
            ));
        }
        return Ok(WorkflowReport {
            title: format!("Pruned {target}"),
            events,
        });
    }

    if !store.filesystem_exists(&filesystem)? {
        return Err(PackratError::Provider(format!(
            "filesystem {filesystem} does not exist"
        )));
    }

    let keep = effective_keep(config, store, &filesystem, options.keep, &mut events)?;
    let snapshots = store.list_snapshots(&filesystem)?;
    let managed = snapshots
        .iter()
        .filter(|snap| retention::is_managed_name(prefix, &snap.name))
        .count();
    let plan = retention::plan_prune(&snapshots, prefix, keep);

    events.push(event(
        WorkflowLevel::Info,
        format!(
            "{filesystem}: {managed} managed snapshot(s), retention {keep}, {} to prune",
            plan.len()
        ),
    ));

    for stale in &plan {
        if options.dry_run {
            events.push(event(
                WorkflowLevel::Info,
                format!("Would destroy {filesystem}@{}", stale.name),
            ));
        } else {
            store.destroy_snapshot(&filesystem, &stale.name)?;
            events.push(event(
                WorkflowLevel::Info,
                format!("Destroyed {filesystem}@{}", stale.name),
            ));
        }
    }

    if !plan.is_empty() && !options.dry_run {
        events.push(event(
            WorkflowLevel::Success,
            format!("Pruned {} snapshot(s)", plan.len()),
        ));
    }

    Ok(WorkflowReport {
        title: if options.dry_run {
            format!("Prune plan for {target}")
        } else {
            format!("Pruned {target}")
        },
        events,
    })
}

/// Snapshot the target filesystem right now, without syncing.
pub fn take_snapshot<S>(
    config: &PackratConfig,
    store: &S,
    target: &BackupTarget,
    label: Option<&str>,
) -> PackratResult<WorkflowReport>
where
    S: SnapshotStore<Error = PackratError>,
{
    target.require_filesystem()?;
    if let Some(label) = label {
        if !crate::target::is_valid_component(label) {
            return Err(PackratError::InvalidConfig(format!(
                "label `{label}` is not a valid snapshot name component"
            )));
        }
    }

    let filesystem = target.filesystem();
    if !store.filesystem_exists(&filesystem)? {
        return Err(PackratError::Provider(format!(
            "filesystem {filesystem} does not exist"
        )));
    }

    let snapshot =
        retention::snapshot_name(&config.policy.snapshot_prefix, chrono::Utc::now(), label);
    store.create_snapshot(&filesystem, &snapshot)?;

    Ok(WorkflowReport {
        title: format!("Snapshotted {target}"),
        events: vec![event(
            WorkflowLevel::Success,
            format!("Created snapshot {filesystem}@{snapshot}"),
        )],
    })
}

//! Pool and filesystem status reporting.

use super::{event, WorkflowLevel, WorkflowReport, PROP_KEEP, PROP_MANAGED};
use crate::config::PackratConfig;
use crate::error::{PackratError, PackratResult};
use crate::provider::SnapshotStore;
use crate::retention;
use crate::target::BackupTarget;
use chrono::{DateTime, Utc};

/// Report pool health plus per-filesystem retention and snapshot state.
///
/// With a bare pool target every managed filesystem under the pool is
/// covered; with a filesystem target only that one.
pub fn status<S>(
    config: &PackratConfig,
    store: &S,
    target: &BackupTarget,
) -> PackratResult<WorkflowReport>
where
    S: SnapshotStore<Error = PackratError>,
{
    target.require_filesystem()?;
    let mut events = Vec::new();

    if !store.pool_exists(&target.pool)? {
        return Err(PackratError::Provider(format!(
            "pool {} does not exist",
            target.pool
        )));
    }

    let health = store.pool_health(&target.pool)?;
    let level = if health == "ONLINE" {
        WorkflowLevel::Info
    } else {
        WorkflowLevel::Warn
    };
    events.push(event(level, format!("Pool {} health: {health}", target.pool)));

    let filesystems = match &target.path {
        Some(_) => {
            let filesystem = target.filesystem();
            if !store.filesystem_exists(&filesystem)? {
                return Err(PackratError::Provider(format!(
                    "filesystem {filesystem} does not exist"
                )));
            }
            vec![filesystem]
        }
        None => {
            let mut managed = Vec::new();
            for info in store.list_filesystems(&target.pool)? {
                let flagged = store
                    .get_property(&info.name, PROP_MANAGED)?
                    .is_some_and(|value| value == "on");
                if flagged {
                    managed.push(info.name);
                }
            }
            if managed.is_empty() {
                events.push(event(
                    WorkflowLevel::Warn,
                    format!("No managed filesystems under pool {}", target.pool),
                ));
            }
            managed
        }
    };

    let prefix = config.policy.snapshot_prefix.as_str();
    let now = Utc::now();
    for filesystem in filesystems {
        let keep = store
            .get_property(&filesystem, PROP_KEEP)?
            .unwrap_or_else(|| format!("{} (default)", config.policy.default_keep));
        let snapshots = store.list_snapshots(&filesystem)?;
        let managed: Vec<_> = snapshots
            .iter()
            .filter(|snap| retention::is_managed_name(prefix, &snap.name))
            .collect();

        match managed.last() {
            Some(last) => {
                let age = DateTime::<Utc>::from_timestamp(last.creation, 0)
                    .map(|created| render_age(now.signed_duration_since(created)))
                    .unwrap_or_else(|| "unknown age".to_string());
                events.push(event(
                    WorkflowLevel::Info,
                    format!(
                        "{filesystem}: keep={keep}, {} managed snapshot(s), last @{} ({age})",
                        managed.len(),
                        last.name
                    ),
                ));
            }
            None => {
                events.push(event(
                    WorkflowLevel::Warn,
                    format!("{filesystem}: keep={keep}, no managed snapshots yet"),
                ));
            }
        }
    }

    Ok(WorkflowReport {
        title: format!("Status of {target}"),
        events,
    })
}

fn render_age(age: chrono::Duration) -> String {
    let secs = age.num_seconds().max(0);
    if secs < 120 {
        format!("{secs}s ago")
    } else if secs < 7200 {
        format!("{}m ago", secs / 60)
    } else if secs < 172_800 {
        format!("{}h ago", secs / 3600)
    } else {
        format!("{}d ago", secs / 86_400)
    }
}

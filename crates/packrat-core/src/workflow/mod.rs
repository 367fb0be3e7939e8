//! Workflow orchestration for provisioning, backup, pruning, and status.

mod backup;
mod provision;
mod prune;
mod status;

#[cfg(test)]
mod tests;

use crate::config::PackratConfig;
use crate::error::{PackratError, PackratResult};
use crate::provider::SnapshotStore;
use crate::retention;
use log::warn;

pub use backup::{run_backup, BackupOptions};
pub use provision::{provision_filesystem, provision_pool};
pub use prune::{prune_snapshots, take_snapshot, PruneOptions};
pub use status::status;

/// User property marking a filesystem as packrat-managed.
pub const PROP_MANAGED: &str = "packrat:managed";
/// User property carrying the per-filesystem retention count.
pub const PROP_KEEP: &str = "packrat:keep";

/// Severity levels used when reporting workflow events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkflowLevel {
    Info,
    Success,
    Warn,
    Error,
}

/// Single line of output produced by a workflow step.
#[derive(Debug, Clone)]
pub struct WorkflowEvent {
    pub level: WorkflowLevel,
    pub message: String,
}

/// Aggregated report returned by any workflow entry point.
#[derive(Debug, Clone)]
pub struct WorkflowReport {
    pub title: String,
    pub events: Vec<WorkflowEvent>,
}

/// Convenience constructor that wraps the repeated boilerplate.
pub(crate) fn event(level: WorkflowLevel, message: impl Into<String>) -> WorkflowEvent {
    WorkflowEvent {
        level,
        message: message.into(),
    }
}

/// Resolve the retention count for a filesystem: flag, then `packrat:keep`
/// property, then the configured default.
pub(crate) fn effective_keep<S>(
    config: &PackratConfig,
    store: &S,
    filesystem: &str,
    flag: Option<u32>,
    events: &mut Vec<WorkflowEvent>,
) -> PackratResult<u32>
where
    S: SnapshotStore<Error = PackratError>,
{
    if let Some(keep) = flag {
        return retention::validate_keep(keep);
    }

    if let Some(raw) = store.get_property(filesystem, PROP_KEEP)? {
        match raw.trim().parse::<u32>() {
            Ok(keep) => return retention::validate_keep(keep),
            Err(_) => {
                warn!("{filesystem}: ignoring unparseable {PROP_KEEP}={raw}");
                events.push(event(
                    WorkflowLevel::Warn,
                    format!(
                        "Property {PROP_KEEP}={raw} on {filesystem} is not a number; using the configured default"
                    ),
                ));
            }
        }
    }

    retention::validate_keep(config.policy.default_keep)
}

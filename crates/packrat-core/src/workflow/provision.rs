//! Pool and filesystem provisioning with property tagging.

use super::{event, WorkflowLevel, WorkflowReport, PROP_KEEP, PROP_MANAGED};
use crate::config::PackratConfig;
use crate::error::{PackratError, PackratResult};
use crate::provider::SnapshotStore;
use crate::retention;
use crate::target::BackupTarget;

const UNMOUNTABLE_VALUES: &[&str] = &["none", "legacy", "-"];

/// Create a pool and tag its root filesystem as packrat-managed.
///
/// An existing pool is reported, not treated as an error, so `init` can be
/// re-run safely.
pub fn provision_pool<S>(
    config: &PackratConfig,
    store: &S,
    target: &BackupTarget,
    vdevs: &[String],
    mountpoint: Option<&str>,
) -> PackratResult<WorkflowReport>
where
    S: SnapshotStore<Error = PackratError>,
{
    target.require_filesystem()?;
    if target.path.is_some() {
        return Err(PackratError::invalid_target(
            target.to_string(),
            "pool creation takes a bare pool name; use `create` for filesystems",
        ));
    }

    let mut events = Vec::new();
    let pool = target.pool.as_str();

    if store.pool_exists(pool)? {
        let health = store.pool_health(pool)?;
        events.push(event(
            WorkflowLevel::Info,
            format!("Pool {pool} already exists (health {health}); skipping creation"),
        ));
    } else {
        if vdevs.is_empty() {
            return Err(PackratError::InvalidConfig(format!(
                "pool {pool} does not exist and no vdevs were given to create it"
            )));
        }
        store.create_pool(pool, vdevs, mountpoint)?;
        events.push(event(
            WorkflowLevel::Success,
            format!("Created pool {pool} from {} vdev spec(s)", vdevs.len()),
        ));
    }

    store.set_property(pool, PROP_MANAGED, "on")?;
    store.set_property(
        pool,
        PROP_KEEP,
        &config.policy.default_keep.to_string(),
    )?;
    events.push(event(
        WorkflowLevel::Info,
        format!(
            "Tagged {pool} with {PROP_MANAGED}=on and {PROP_KEEP}={}",
            config.policy.default_keep
        ),
    ));

    Ok(WorkflowReport {
        title: format!("Provisioned pool {target}"),
        events,
    })
}

/// Create a backup filesystem (and missing parents) and tag it.
pub fn provision_filesystem<S>(
    config: &PackratConfig,
    store: &S,
    target: &BackupTarget,
    keep: Option<u32>,
) -> PackratResult<WorkflowReport>
where
    S: SnapshotStore<Error = PackratError>,
{
    target.require_filesystem()?;
    let mut events = Vec::new();
    let filesystem = target.filesystem();
    let keep = retention::validate_keep(keep.unwrap_or(config.policy.default_keep))?;

    if !store.pool_exists(&target.pool)? {
        return Err(PackratError::Provider(format!(
            "pool {} does not exist; run `packrat init` first",
            target.pool
        )));
    }

    if store.filesystem_exists(&filesystem)? {
        events.push(event(
            WorkflowLevel::Info,
            format!("Filesystem {filesystem} already exists; refreshing tags"),
        ));
    } else {
        store.create_filesystem(&filesystem, &[])?;
        events.push(event(
            WorkflowLevel::Success,
            format!("Created filesystem {filesystem}"),
        ));
    }

    store.set_property(&filesystem, PROP_MANAGED, "on")?;
    store.set_property(&filesystem, PROP_KEEP, &keep.to_string())?;
    events.push(event(
        WorkflowLevel::Info,
        format!("Tagged {filesystem} with {PROP_MANAGED}=on and {PROP_KEEP}={keep}"),
    ));

    let mountpoint = store.mountpoint(&filesystem)?;
    if UNMOUNTABLE_VALUES.contains(&mountpoint.as_str()) {
        events.push(event(
            WorkflowLevel::Warn,
            format!(
                "Filesystem {filesystem} has mountpoint `{mountpoint}`; backups into it will fail until one is set"
            ),
        ));
    } else {
        events.push(event(
            WorkflowLevel::Info,
            format!("Filesystem {filesystem} is mounted at {mountpoint}"),
        ));
    }

    Ok(WorkflowReport {
        title: format!("Provisioned filesystem {target}"),
        events,
    })
}

/// Shared mountpoint gate used by backup as well.
pub(crate) fn usable_mountpoint(filesystem: &str, mountpoint: &str) -> PackratResult<()> {
    if UNMOUNTABLE_VALUES.contains(&mountpoint) {
        return Err(PackratError::Provider(format!(
            "filesystem {filesystem} reports mountpoint `{mountpoint}`; set a real mountpoint before backing up into it"
        )));
    }
    Ok(())
}

use super::*;
use crate::config::PackratConfig;
use crate::provider::{
    FileSync, FilesystemInfo, SnapshotInfo, SnapshotStore, SyncDestination, SyncSummary,
};
use crate::target::BackupTarget;
use crate::workflow::backup::{run_backup, BackupOptions};
use crate::workflow::provision::provision_pool;
use crate::workflow::prune::{prune_snapshots, take_snapshot, PruneOptions};
use crate::workflow::status::status;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tempfile::tempdir;

#[derive(Default)]
struct StoreState {
    pools: HashSet<String>,
    filesystems: HashMap<String, FsState>,
    clock: i64,
}

#[derive(Default, Clone)]
struct FsState {
    mountpoint: String,
    properties: HashMap<String, String>,
    snapshots: Vec<SnapshotInfo>,
}

#[derive(Default, Clone)]
struct MemoryStore {
    state: Arc<Mutex<StoreState>>,
}

impl MemoryStore {
    fn with_pool(pool: &str) -> Self {
        let store = Self::default();
        {
            let mut state = store.state.lock().unwrap();
            state.pools.insert(pool.to_string());
            state.filesystems.insert(
                pool.to_string(),
                FsState {
                    mountpoint: format!("/{pool}"),
                    ..FsState::default()
                },
            );
        }
        store
    }

    fn add_filesystem(&self, name: &str, mountpoint: &str) {
        let mut state = self.state.lock().unwrap();
        state.filesystems.insert(
            name.to_string(),
            FsState {
                mountpoint: mountpoint.to_string(),
                ..FsState::default()
            },
        );
    }

    fn add_snapshot(&self, filesystem: &str, name: &str) {
        let mut state = self.state.lock().unwrap();
        state.clock += 1;
        let creation = state.clock;
        state
            .filesystems
            .get_mut(filesystem)
            .expect("filesystem must exist")
            .snapshots
            .push(SnapshotInfo {
                name: name.to_string(),
                creation,
                used: 0,
            });
    }

    fn snapshot_names(&self, filesystem: &str) -> Vec<String> {
        let state = self.state.lock().unwrap();
        state.filesystems[filesystem]
            .snapshots
            .iter()
            .map(|snap| snap.name.clone())
            .collect()
    }

    fn property(&self, filesystem: &str, key: &str) -> Option<String> {
        let state = self.state.lock().unwrap();
        state.filesystems[filesystem].properties.get(key).cloned()
    }
}

impl SnapshotStore for MemoryStore {
    type Error = PackratError;

    fn pool_exists(&self, pool: &str) -> PackratResult<bool> {
        Ok(self.state.lock().unwrap().pools.contains(pool))
    }

    fn pool_health(&self, pool: &str) -> PackratResult<String> {
        if self.pool_exists(pool)? {
            Ok("ONLINE".to_string())
        } else {
            Err(PackratError::Provider(format!("no such pool {pool}")))
        }
    }

    fn create_pool(
        &self,
        pool: &str,
        _vdevs: &[String],
        mountpoint: Option<&str>,
    ) -> PackratResult<()> {
        let mut state = self.state.lock().unwrap();
        state.pools.insert(pool.to_string());
        state.filesystems.insert(
            pool.to_string(),
            FsState {
                mountpoint: mountpoint
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("/{pool}")),
                ..FsState::default()
            },
        );
        Ok(())
    }

    fn filesystem_exists(&self, filesystem: &str) -> PackratResult<bool> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .filesystems
            .contains_key(filesystem))
    }

    fn create_filesystem(
        &self,
        filesystem: &str,
        properties: &[(String, String)],
    ) -> PackratResult<()> {
        let mut state = self.state.lock().unwrap();
        state.filesystems.insert(
            filesystem.to_string(),
            FsState {
                mountpoint: format!("/{filesystem}"),
                properties: properties.iter().cloned().collect(),
                snapshots: Vec::new(),
            },
        );
        Ok(())
    }

    fn set_property(&self, filesystem: &str, key: &str, value: &str) -> PackratResult<()> {
        let mut state = self.state.lock().unwrap();
        state
            .filesystems
            .get_mut(filesystem)
            .ok_or_else(|| PackratError::Provider(format!("dataset {filesystem} does not exist")))?
            .properties
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn get_property(&self, filesystem: &str, key: &str) -> PackratResult<Option<String>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .filesystems
            .get(filesystem)
            .and_then(|fs| fs.properties.get(key).cloned()))
    }

    fn mountpoint(&self, filesystem: &str) -> PackratResult<String> {
        let state = self.state.lock().unwrap();
        state
            .filesystems
            .get(filesystem)
            .map(|fs| fs.mountpoint.clone())
            .ok_or_else(|| PackratError::Provider(format!("dataset {filesystem} does not exist")))
    }

    fn list_filesystems(&self, pool: &str) -> PackratResult<Vec<FilesystemInfo>> {
        let state = self.state.lock().unwrap();
        let mut rows: Vec<FilesystemInfo> = state
            .filesystems
            .iter()
            .filter(|(name, _)| *name == pool || name.starts_with(&format!("{pool}/")))
            .map(|(name, fs)| FilesystemInfo {
                name: name.clone(),
                used: 0,
                avail: 0,
                mountpoint: fs.mountpoint.clone(),
            })
            .collect();
        rows.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(rows)
    }

    fn list_snapshots(&self, filesystem: &str) -> PackratResult<Vec<SnapshotInfo>> {
        let state = self.state.lock().unwrap();
        let mut snaps = state
            .filesystems
            .get(filesystem)
            .ok_or_else(|| PackratError::Provider(format!("dataset {filesystem} does not exist")))?
            .snapshots
            .clone();
        snaps.sort_by_key(|snap| snap.creation);
        Ok(snaps)
    }

    fn create_snapshot(&self, filesystem: &str, snapshot: &str) -> PackratResult<()> {
        if !self.filesystem_exists(filesystem)? {
            return Err(PackratError::Provider(format!(
                "dataset {filesystem} does not exist"
            )));
        }
        self.add_snapshot(filesystem, snapshot);
        Ok(())
    }

    fn destroy_snapshot(&self, filesystem: &str, snapshot: &str) -> PackratResult<()> {
        let mut state = self.state.lock().unwrap();
        let fs = state
            .filesystems
            .get_mut(filesystem)
            .ok_or_else(|| PackratError::Provider(format!("dataset {filesystem} does not exist")))?;
        let before = fs.snapshots.len();
        fs.snapshots.retain(|snap| snap.name != snapshot);
        if fs.snapshots.len() == before {
            return Err(PackratError::Provider(format!(
                "snapshot {filesystem}@{snapshot} does not exist"
            )));
        }
        Ok(())
    }
}

#[derive(Default, Clone)]
struct RecordingSync {
    calls: Arc<Mutex<Vec<(PathBuf, SyncDestination, Vec<String>)>>>,
    partial: Option<String>,
}

impl FileSync for RecordingSync {
    type Error = PackratError;

    fn mirror(
        &self,
        source: &Path,
        dest: &SyncDestination,
        excludes: &[String],
    ) -> PackratResult<SyncSummary> {
        self.calls
            .lock()
            .unwrap()
            .push((source.to_path_buf(), dest.clone(), excludes.to_vec()));
        Ok(SyncSummary {
            files_transferred: 3,
            bytes_transferred: 4096,
            total_file_size: 8192,
            partial: self.partial.clone(),
        })
    }
}

struct FailingSync;

impl FileSync for FailingSync {
    type Error = PackratError;

    fn mirror(
        &self,
        _source: &Path,
        _dest: &SyncDestination,
        _excludes: &[String],
    ) -> PackratResult<SyncSummary> {
        Err(PackratError::Sync("rsync exploded".into()))
    }
}

fn sample_config() -> PackratConfig {
    PackratConfig::default()
}

fn target(input: &str) -> BackupTarget {
    input.parse().unwrap()
}

fn managed_count(store: &MemoryStore, filesystem: &str) -> usize {
    store
        .snapshot_names(filesystem)
        .iter()
        .filter(|name| name.starts_with("packrat-"))
        .count()
}

#[test]
fn backup_syncs_snapshots_and_prunes() {
    let store = MemoryStore::with_pool("tank");
    store.add_filesystem("tank/home", "/tank/home");
    store.add_snapshot("tank/home", "packrat-20260101-000000");
    store.add_snapshot("tank/home", "packrat-20260102-000000");
    store.add_snapshot("tank/home", "manual-checkpoint");
    let sync = RecordingSync::default();
    let source = tempdir().unwrap();

    let report = run_backup(
        &sample_config(),
        &store,
        &sync,
        &target("tank/home"),
        source.path(),
        BackupOptions {
            keep: Some(2),
            excludes: vec!["*.tmp".to_string()],
            ..BackupOptions::default()
        },
    )
    .unwrap();

    assert!(report.title.contains("tank/home"));
    assert_eq!(managed_count(&store, "tank/home"), 2);
    let names = store.snapshot_names("tank/home");
    assert!(names.contains(&"manual-checkpoint".to_string()));
    assert!(!names.contains(&"packrat-20260101-000000".to_string()));

    let calls = sync.calls.lock().unwrap();
    assert_eq!(calls.len(), 1);
    let (src, dest, excludes) = &calls[0];
    assert_eq!(src, source.path());
    assert_eq!(dest.host, None);
    assert_eq!(dest.path, PathBuf::from("/tank/home"));
    assert_eq!(excludes, &vec!["*.tmp".to_string()]);
}

#[test]
fn backup_requires_existing_filesystem() {
    let store = MemoryStore::with_pool("tank");
    let source = tempdir().unwrap();

    let err = run_backup(
        &sample_config(),
        &store,
        &RecordingSync::default(),
        &target("tank/missing"),
        source.path(),
        BackupOptions::default(),
    )
    .unwrap_err();

    assert!(err.to_string().contains("--create"), "got: {err}");
}

#[test]
fn backup_auto_creates_when_flagged() {
    let store = MemoryStore::with_pool("tank");
    let source = tempdir().unwrap();

    run_backup(
        &sample_config(),
        &store,
        &RecordingSync::default(),
        &target("tank/new"),
        source.path(),
        BackupOptions {
            create_missing: true,
            ..BackupOptions::default()
        },
    )
    .unwrap();

    assert!(store.filesystem_exists("tank/new").unwrap());
    assert_eq!(store.property("tank/new", PROP_MANAGED).as_deref(), Some("on"));
    assert_eq!(managed_count(&store, "tank/new"), 1);
}

#[test]
fn backup_rejects_unmountable_filesystem() {
    let store = MemoryStore::with_pool("tank");
    store.add_filesystem("tank/raw", "none");
    let source = tempdir().unwrap();

    let err = run_backup(
        &sample_config(),
        &store,
        &RecordingSync::default(),
        &target("tank/raw"),
        source.path(),
        BackupOptions::default(),
    )
    .unwrap_err();

    assert!(err.to_string().contains("mountpoint"), "got: {err}");
    assert_eq!(managed_count(&store, "tank/raw"), 0);
}

#[test]
fn failed_sync_does_not_snapshot() {
    let store = MemoryStore::with_pool("tank");
    store.add_filesystem("tank/home", "/tank/home");
    let source = tempdir().unwrap();

    let err = run_backup(
        &sample_config(),
        &store,
        &FailingSync,
        &target("tank/home"),
        source.path(),
        BackupOptions::default(),
    )
    .unwrap_err();

    assert!(matches!(err, PackratError::Sync(_)));
    assert_eq!(managed_count(&store, "tank/home"), 0);
}

#[test]
fn partial_sync_still_snapshots_with_warning() {
    let store = MemoryStore::with_pool("tank");
    store.add_filesystem("tank/home", "/tank/home");
    let sync = RecordingSync {
        partial: Some("some files vanished".to_string()),
        ..RecordingSync::default()
    };
    let source = tempdir().unwrap();

    let report = run_backup(
        &sample_config(),
        &store,
        &sync,
        &target("tank/home"),
        source.path(),
        BackupOptions::default(),
    )
    .unwrap();

    assert_eq!(managed_count(&store, "tank/home"), 1);
    assert!(report
        .events
        .iter()
        .any(|event| event.level == WorkflowLevel::Warn
            && event.message.contains("vanished")));
}

#[test]
fn keep_property_overrides_config_default() {
    let store = MemoryStore::with_pool("tank");
    store.add_filesystem("tank/home", "/tank/home");
    store
        .set_property("tank/home", PROP_KEEP, "1")
        .unwrap();
    store.add_snapshot("tank/home", "packrat-20260101-000000");
    store.add_snapshot("tank/home", "packrat-20260102-000000");
    let source = tempdir().unwrap();

    run_backup(
        &sample_config(),
        &store,
        &RecordingSync::default(),
        &target("tank/home"),
        source.path(),
        BackupOptions::default(),
    )
    .unwrap();

    // Config default is 7, but the property pins retention to 1.
    assert_eq!(managed_count(&store, "tank/home"), 1);
}

#[test]
fn prune_dry_run_destroys_nothing() {
    let store = MemoryStore::with_pool("tank");
    store.add_filesystem("tank/home", "/tank/home");
    for day in 1..=5 {
        store.add_snapshot("tank/home", &format!("packrat-2026010{day}-000000"));
    }

    let report = prune_snapshots(
        &sample_config(),
        &store,
        &target("tank/home"),
        PruneOptions {
            keep: Some(2),
            dry_run: true,
        },
    )
    .unwrap();

    assert_eq!(managed_count(&store, "tank/home"), 5);
    let planned = report
        .events
        .iter()
        .filter(|event| event.message.starts_with("Would destroy"))
        .count();
    assert_eq!(planned, 3);
}

#[test]
fn prune_explicit_snapshot_requires_prefix() {
    let store = MemoryStore::with_pool("tank");
    store.add_filesystem("tank/home", "/tank/home");
    store.add_snapshot("tank/home", "manual-checkpoint");
    store.add_snapshot("tank/home", "packrat-20260101-000000");

    let err = prune_snapshots(
        &sample_config(),
        &store,
        &target("tank/home@manual-checkpoint"),
        PruneOptions::default(),
    )
    .unwrap_err();
    assert!(err.to_string().contains("prefix"), "got: {err}");

    prune_snapshots(
        &sample_config(),
        &store,
        &target("tank/home@packrat-20260101-000000"),
        PruneOptions::default(),
    )
    .unwrap();
    assert_eq!(
        store.snapshot_names("tank/home"),
        vec!["manual-checkpoint".to_string()]
    );
}

#[test]
fn backup_rejects_zero_keep_before_syncing() {
    let store = MemoryStore::with_pool("tank");
    store.add_filesystem("tank/home", "/tank/home");
    let sync = RecordingSync::default();
    let source = tempdir().unwrap();

    let err = run_backup(
        &sample_config(),
        &store,
        &sync,
        &target("tank/home"),
        source.path(),
        BackupOptions {
            keep: Some(0),
            ..BackupOptions::default()
        },
    )
    .unwrap_err();

    assert!(err.to_string().contains("at least 1"), "got: {err}");
    assert!(sync.calls.lock().unwrap().is_empty());
    assert_eq!(managed_count(&store, "tank/home"), 0);
}

#[test]
fn prune_rejects_zero_keep() {
    let store = MemoryStore::with_pool("tank");
    store.add_filesystem("tank/home", "/tank/home");

    let err = prune_snapshots(
        &sample_config(),
        &store,
        &target("tank/home"),
        PruneOptions {
            keep: Some(0),
            dry_run: false,
        },
    )
    .unwrap_err();
    assert!(err.to_string().contains("at least 1"), "got: {err}");
}

#[test]
fn provision_pool_is_idempotent() {
    let store = MemoryStore::with_pool("tank");

    let report = provision_pool(&sample_config(), &store, &target("tank"), &[], None).unwrap();
    assert!(report
        .events
        .iter()
        .any(|event| event.message.contains("already exists")));
    assert_eq!(store.property("tank", PROP_MANAGED).as_deref(), Some("on"));
    assert_eq!(store.property("tank", PROP_KEEP).as_deref(), Some("7"));
}

#[test]
fn provision_missing_pool_requires_vdevs() {
    let store = MemoryStore::default();
    let err =
        provision_pool(&sample_config(), &store, &target("fresh"), &[], None).unwrap_err();
    assert!(err.to_string().contains("vdev"), "got: {err}");

    provision_pool(
        &sample_config(),
        &store,
        &target("fresh"),
        &["/dev/sdb".to_string()],
        Some("/backup"),
    )
    .unwrap();
    assert!(store.pool_exists("fresh").unwrap());
    assert_eq!(store.mountpoint("fresh").unwrap(), "/backup");
}

#[test]
fn take_snapshot_uses_prefix_and_label() {
    let store = MemoryStore::with_pool("tank");
    store.add_filesystem("tank/home", "/tank/home");

    take_snapshot(
        &sample_config(),
        &store,
        &target("tank/home"),
        Some("pre-upgrade"),
    )
    .unwrap();

    let names = store.snapshot_names("tank/home");
    assert_eq!(names.len(), 1);
    assert!(names[0].starts_with("packrat-"));
    assert!(names[0].ends_with("-pre-upgrade"));
}

#[test]
fn status_covers_only_managed_filesystems() {
    let store = MemoryStore::with_pool("tank");
    store.add_filesystem("tank/home", "/tank/home");
    store.add_filesystem("tank/scratch", "/tank/scratch");
    store
        .set_property("tank/home", PROP_MANAGED, "on")
        .unwrap();
    store.add_snapshot("tank/home", "packrat-20260101-000000");

    let report = status(&sample_config(), &store, &target("tank")).unwrap();
    let body: Vec<&str> = report
        .events
        .iter()
        .map(|event| event.message.as_str())
        .collect();
    assert!(body.iter().any(|line| line.contains("tank/home")));
    assert!(!body.iter().any(|line| line.contains("tank/scratch")));
}

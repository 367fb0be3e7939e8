//! Driver contracts used by packrat workflows.
//!
//! Concrete implementations live in driver crates (`packrat-zfs`,
//! `packrat-sync`) so workflows stay generic and testable against in-memory
//! stores.

use std::error::Error;
use std::path::{Path, PathBuf};

/// One filesystem row from `zfs list`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilesystemInfo {
    pub name: String,
    /// Bytes used, from `-p` output.
    pub used: u64,
    /// Bytes available, from `-p` output.
    pub avail: u64,
    /// Raw `mountpoint` value (`none`/`legacy` included).
    pub mountpoint: String,
}

/// One snapshot row from `zfs list -t snapshot`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotInfo {
    /// Short name, the part after `@`.
    pub name: String,
    /// Creation time as epoch seconds, from `-p` output.
    pub creation: i64,
    /// Bytes held exclusively by this snapshot.
    pub used: u64,
}

/// Abstraction over the copy-on-write storage subsystem.
///
/// Every method maps onto one or two external commands; no state is cached
/// on this side.
pub trait SnapshotStore {
    type Error: Error + Send + Sync + 'static;

    fn pool_exists(&self, pool: &str) -> Result<bool, Self::Error>;

    /// Pool health string as reported by `zpool list` (e.g. `ONLINE`).
    fn pool_health(&self, pool: &str) -> Result<String, Self::Error>;

    fn create_pool(
        &self,
        pool: &str,
        vdevs: &[String],
        mountpoint: Option<&str>,
    ) -> Result<(), Self::Error>;

    fn filesystem_exists(&self, filesystem: &str) -> Result<bool, Self::Error>;

    /// Create a filesystem (and missing parents) with the given properties.
    fn create_filesystem(
        &self,
        filesystem: &str,
        properties: &[(String, String)],
    ) -> Result<(), Self::Error>;

    fn set_property(&self, filesystem: &str, key: &str, value: &str) -> Result<(), Self::Error>;

    /// A single property value; `None` when unset (`-`).
    fn get_property(&self, filesystem: &str, key: &str) -> Result<Option<String>, Self::Error>;

    /// Raw `mountpoint` property value.
    fn mountpoint(&self, filesystem: &str) -> Result<String, Self::Error>;

    fn list_filesystems(&self, pool: &str) -> Result<Vec<FilesystemInfo>, Self::Error>;

    /// Snapshots of `filesystem` only (depth 1), ascending by creation time.
    fn list_snapshots(&self, filesystem: &str) -> Result<Vec<SnapshotInfo>, Self::Error>;

    fn create_snapshot(&self, filesystem: &str, snapshot: &str) -> Result<(), Self::Error>;

    /// Destroy `filesystem@snapshot`. Implementations must refuse anything
    /// that does not name a snapshot.
    fn destroy_snapshot(&self, filesystem: &str, snapshot: &str) -> Result<(), Self::Error>;
}

/// Where a mirror run lands: a directory, locally or on a remote host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncDestination {
    pub host: Option<String>,
    pub path: PathBuf,
}

/// What the sync tool reported after a transfer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncSummary {
    pub files_transferred: u64,
    pub bytes_transferred: u64,
    pub total_file_size: u64,
    /// Set when the transfer finished with a tolerated partial-transfer
    /// condition (vanished files, per-file errors).
    pub partial: Option<String>,
}

/// Abstraction over the file-synchronization tool.
pub trait FileSync {
    type Error: Error + Send + Sync + 'static;

    /// Mirror the contents of `source` into `dest`, deleting extraneous
    /// files on the destination side.
    fn mirror(
        &self,
        source: &Path,
        dest: &SyncDestination,
        excludes: &[String],
    ) -> Result<SyncSummary, Self::Error>;
}

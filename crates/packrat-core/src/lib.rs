#![forbid(unsafe_code)]

//! Core building blocks shared by packrat binaries.
//!
//! Configuration, the backup-target grammar, retention planning, and the
//! workflows live here so driver crates can focus on shelling out to the
//! tools they wrap.

pub mod config;
pub mod error;
pub mod logging;
pub mod provider;
pub mod retention;
pub mod target;
pub mod workflow;

pub use config::{PackratConfig, Policy, RemoteCfg, SyncCfg, ZfsCfg, DEFAULT_CONFIG_PATH};
pub use error::{PackratError, PackratResult};
pub use provider::{
    FileSync, FilesystemInfo, SnapshotInfo, SnapshotStore, SyncDestination, SyncSummary,
};
pub use target::BackupTarget;
pub use workflow::{WorkflowEvent, WorkflowLevel, WorkflowReport};

//! Configuration model and helpers used by packrat binaries.

use crate::error::{PackratError, PackratResult};
use crate::target::is_valid_component;
use directories_next::ProjectDirs;
use log::info;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_CONFIG_PATH: &str = "/etc/packrat.toml";
const BOOTSTRAP_FILE_NAME: &str = "packrat.toml";
const APP_QUALIFIER: &str = "io";
const APP_ORGANIZATION: &str = "Packrat";
const APP_NAME: &str = "packrat";

pub const KNOWN_ZFS_PATHS: &[&str] = &[
    "/usr/sbin/zfs",
    "/sbin/zfs",
    "/bin/zfs",
    "/usr/local/sbin/zfs",
];
pub const KNOWN_ZPOOL_PATHS: &[&str] = &[
    "/usr/sbin/zpool",
    "/sbin/zpool",
    "/bin/zpool",
    "/usr/local/sbin/zpool",
];
pub const KNOWN_RSYNC_PATHS: &[&str] = &["/usr/bin/rsync", "/usr/local/bin/rsync", "/bin/rsync"];
pub const KNOWN_SSH_PATHS: &[&str] = &["/usr/bin/ssh", "/usr/local/bin/ssh", "/bin/ssh"];

/// Top-level packrat configuration, normally loaded from `/etc/packrat.toml`.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct PackratConfig {
    /// Where this configuration was loaded from.
    #[serde(skip)]
    #[schemars(skip)]
    pub path: PathBuf,

    #[serde(default)]
    pub policy: Policy,
    #[serde(default)]
    pub zfs: ZfsCfg,
    #[serde(default)]
    pub sync: SyncCfg,
    #[serde(default)]
    pub remote: RemoteCfg,
}

/// Backup policy defaults; per-filesystem `packrat:keep` and command-line
/// flags override these.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct Policy {
    /// Snapshots retained per filesystem when nothing more specific is set.
    #[serde(default = "default_keep")]
    pub default_keep: u32,
    /// Prefix for packrat-owned snapshot names. Snapshots outside this
    /// prefix are never destroyed.
    #[serde(default = "default_snapshot_prefix")]
    pub snapshot_prefix: String,
    /// Let `backup` create a missing target filesystem without `--create`.
    #[serde(default)]
    pub auto_create: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct ZfsCfg {
    /// Local `zfs` binary; autodetected when unset. Remote hosts resolve
    /// `zfs` through their own PATH.
    #[serde(default)]
    pub zfs_path: Option<String>,
    /// Local `zpool` binary; autodetected when unset.
    #[serde(default)]
    pub zpool_path: Option<String>,
    /// Per-command budget for `zfs`/`zpool` invocations.
    #[serde(default = "default_zfs_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct SyncCfg {
    /// Local `rsync` binary; autodetected when unset.
    #[serde(default)]
    pub rsync_path: Option<String>,
    /// Extra arguments appended to every rsync invocation.
    #[serde(default)]
    pub extra_args: Vec<String>,
    /// Budget for a full transfer.
    #[serde(default = "default_sync_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct RemoteCfg {
    /// Local `ssh` binary; autodetected when unset.
    #[serde(default)]
    pub ssh_path: Option<String>,
    /// Directory for ControlMaster sockets; a per-user runtime directory is
    /// used when unset.
    #[serde(default)]
    pub control_dir: Option<String>,
    /// How long the master connection lingers after the last command.
    #[serde(default = "default_control_persist_secs")]
    pub control_persist_secs: u64,
    /// Connection budget for establishing the master.
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
}

fn default_keep() -> u32 {
    7
}

fn default_snapshot_prefix() -> String {
    "packrat".to_string()
}

fn default_zfs_timeout_secs() -> u64 {
    30
}

fn default_sync_timeout_secs() -> u64 {
    3600
}

fn default_control_persist_secs() -> u64 {
    60
}

fn default_connect_timeout_secs() -> u64 {
    10
}

impl Default for Policy {
    fn default() -> Self {
        Self {
            default_keep: default_keep(),
            snapshot_prefix: default_snapshot_prefix(),
            auto_create: false,
        }
    }
}

impl Default for ZfsCfg {
    fn default() -> Self {
        Self {
            zfs_path: None,
            zpool_path: None,
            timeout_secs: default_zfs_timeout_secs(),
        }
    }
}

impl Default for SyncCfg {
    fn default() -> Self {
        Self {
            rsync_path: None,
            extra_args: Vec::new(),
            timeout_secs: default_sync_timeout_secs(),
        }
    }
}

impl Default for RemoteCfg {
    fn default() -> Self {
        Self {
            ssh_path: None,
            control_dir: None,
            control_persist_secs: default_control_persist_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
        }
    }
}

impl Default for PackratConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from(DEFAULT_CONFIG_PATH),
            policy: Policy::default(),
            zfs: ZfsCfg::default(),
            sync: SyncCfg::default(),
            remote: RemoteCfg::default(),
        }
    }
}

impl PackratConfig {
    /// Load configuration from an explicit path.
    pub fn load(path: &Path) -> PackratResult<Self> {
        let contents = fs::read_to_string(path)?;
        let mut config: PackratConfig = toml::from_str(&contents)
            .map_err(|err| PackratError::InvalidConfig(format!("{}: {err}", path.display())))?;
        config.path = path.to_path_buf();
        Ok(config)
    }

    /// Load the given path, falling back to (and bootstrapping) a per-user
    /// configuration when the system path is absent.
    pub fn load_or_bootstrap(path: &Path) -> PackratResult<Self> {
        if path.exists() {
            return Self::load(path);
        }

        let Some(fallback) = user_config_path() else {
            return Err(PackratError::InvalidConfig(format!(
                "configuration not found at {} and no user config directory is available",
                path.display()
            )));
        };

        if !fallback.exists() {
            if let Some(parent) = fallback.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(&fallback, bootstrap_template())?;
            info!(
                "wrote bootstrap configuration to {}; review it before first use",
                fallback.display()
            );
        }

        Self::load(&fallback)
    }

    /// Collect configuration problems without failing fast.
    pub fn validate(&self) -> Vec<String> {
        let mut issues = Vec::new();

        if self.policy.default_keep == 0 {
            issues.push("policy.default_keep must be at least 1".to_string());
        }
        if !is_valid_component(&self.policy.snapshot_prefix) {
            issues.push(format!(
                "policy.snapshot_prefix `{}` is not a valid snapshot name component",
                self.policy.snapshot_prefix
            ));
        }
        if self.zfs.timeout_secs == 0 {
            issues.push("zfs.timeout_secs must be greater than zero".to_string());
        }
        if self.sync.timeout_secs == 0 {
            issues.push("sync.timeout_secs must be greater than zero".to_string());
        }
        if self.remote.connect_timeout_secs == 0 {
            issues.push("remote.connect_timeout_secs must be greater than zero".to_string());
        }
        for (label, value) in [
            ("zfs.zfs_path", &self.zfs.zfs_path),
            ("zfs.zpool_path", &self.zfs.zpool_path),
            ("sync.rsync_path", &self.sync.rsync_path),
            ("remote.ssh_path", &self.remote.ssh_path),
        ] {
            if let Some(path) = value.as_deref().map(str::trim).filter(|p| !p.is_empty()) {
                if !Path::new(path).exists() {
                    issues.push(format!("{label} points at {path}, which does not exist"));
                }
            }
        }

        issues
    }

    pub fn zfs_timeout(&self) -> Duration {
        Duration::from_secs(self.zfs.timeout_secs)
    }

    pub fn sync_timeout(&self) -> Duration {
        Duration::from_secs(self.sync.timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.remote.connect_timeout_secs)
    }
}

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from(APP_QUALIFIER, APP_ORGANIZATION, APP_NAME)
}

fn user_config_path() -> Option<PathBuf> {
    project_dirs().map(|dirs| dirs.config_dir().join(BOOTSTRAP_FILE_NAME))
}

/// Locate a binary from an explicit override, a known-path table, or PATH.
pub fn resolve_binary(
    configured: Option<&str>,
    known: &[&str],
    name: &str,
) -> PackratResult<PathBuf> {
    if let Some(path) = configured.map(str::trim).filter(|p| !p.is_empty()) {
        let candidate = PathBuf::from(path);
        if candidate.exists() {
            return Ok(candidate);
        }
        return Err(PackratError::InvalidConfig(format!(
            "{name} binary configured at {} but missing",
            candidate.display()
        )));
    }

    for candidate in known {
        let path = Path::new(candidate);
        if path.exists() {
            return Ok(path.to_path_buf());
        }
    }

    find_in_path(name).ok_or_else(|| {
        PackratError::InvalidConfig(format!(
            "unable to locate {name} binary; tried {known:?} and PATH"
        ))
    })
}

pub fn find_in_path(binary: &str) -> Option<PathBuf> {
    let paths = env::var_os("PATH")?;
    env::split_paths(&paths).find_map(|dir| {
        let candidate = dir.join(binary);
        if candidate.exists() {
            Some(candidate)
        } else {
            None
        }
    })
}

/// The commented template written on first use.
pub fn bootstrap_template() -> String {
    "# Auto-generated packrat configuration bootstrap.\n\
     # Review these values before running backups against production pools.\n\
     \n\
     [policy]\n\
     # Snapshots kept per filesystem unless overridden by --keep or the\n\
     # packrat:keep user property on the filesystem itself.\n\
     default_keep = 7\n\
     # Snapshots outside this prefix are never destroyed by packrat.\n\
     snapshot_prefix = \"packrat\"\n\
     # Set true to let `packrat backup` create missing target filesystems.\n\
     auto_create = false\n\
     \n\
     [zfs]\n\
     # zfs_path = \"/usr/sbin/zfs\"\n\
     # zpool_path = \"/usr/sbin/zpool\"\n\
     timeout_secs = 30\n\
     \n\
     [sync]\n\
     # rsync_path = \"/usr/bin/rsync\"\n\
     # extra_args = [\"--numeric-ids\"]\n\
     timeout_secs = 3600\n\
     \n\
     [remote]\n\
     # ssh_path = \"/usr/bin/ssh\"\n\
     # control_dir = \"/run/user/1000/packrat\"\n\
     control_persist_secs = 60\n\
     connect_timeout_secs = 10\n"
        .to_string()
}

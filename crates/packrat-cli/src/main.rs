//! packrat command-line interface for pool provisioning, backup, and
//! snapshot retention.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use packrat_core::config::{
    resolve_binary, PackratConfig, DEFAULT_CONFIG_PATH, KNOWN_ZFS_PATHS, KNOWN_ZPOOL_PATHS,
};
use packrat_core::error::PackratResult;
use packrat_core::provider::SnapshotStore;
use packrat_core::target::BackupTarget;
use packrat_core::workflow::{
    self, BackupOptions, PruneOptions, WorkflowLevel, WorkflowReport, PROP_MANAGED,
};
use packrat_core::{logging, retention};
use packrat_remote::{CommandRunner, LocalRunner, RunOutput, SshSession};
use packrat_sync::RsyncSync;
use packrat_zfs::SystemZfsStore;
use schemars::schema_for;
use serde_json::to_string_pretty;
use std::path::PathBuf;
use std::sync::Arc;

fn load_cli_config(path: &PathBuf) -> Result<PackratConfig> {
    let config = PackratConfig::load_or_bootstrap(path)
        .with_context(|| format!("failed to load configuration from {}", path.display()))?;

    if &config.path != path {
        println!(
            "Using bootstrap configuration at {} (pass --config to override).",
            config.path.display()
        );
    }

    Ok(config)
}

/// Top-level command-line options shared by every subcommand.
#[derive(Parser, Debug)]
#[command(
    name = "packrat",
    version,
    about = "Snapshot-backed directory backups onto local or remote storage pools."
)]
struct Cli {
    /// Path to the packrat configuration file.
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Default log filter (PACKRAT_LOG overrides).
    #[arg(long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

/// Subcommands covering the full lifecycle of a backup destination.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Create a storage pool and tag it as packrat-managed.
    Init {
        /// Target pool, optionally on a remote host: [host:]pool
        target: String,

        /// Vdev specification for pool creation; repeat for multiple vdevs.
        #[arg(long = "vdev", num_args = 1..)]
        vdevs: Vec<String>,

        /// Mountpoint for the pool's root filesystem.
        #[arg(short, long)]
        mountpoint: Option<String>,
    },

    /// Create a backup filesystem and tag it with retention properties.
    Create {
        /// Target filesystem: [host:]pool/name
        target: String,

        /// Snapshots to retain for this filesystem (stored as packrat:keep).
        #[arg(long)]
        keep: Option<u32>,
    },

    /// Mirror a directory into a filesystem, snapshot it, and prune history.
    Backup {
        /// Local directory to back up.
        source: PathBuf,

        /// Target filesystem: [host:]pool/name
        target: String,

        /// Retention override for this run.
        #[arg(long)]
        keep: Option<u32>,

        /// Suffix appended to the snapshot name.
        #[arg(long)]
        label: Option<String>,

        /// rsync exclude pattern; repeat for multiple patterns.
        #[arg(long = "exclude")]
        excludes: Vec<String>,

        /// Create the target filesystem when it does not exist yet.
        #[arg(long)]
        create: bool,
    },

    /// Snapshot a filesystem immediately, without syncing.
    Snapshot {
        /// Target filesystem: [host:]pool/name
        target: String,

        /// Suffix appended to the snapshot name.
        #[arg(long)]
        label: Option<String>,
    },

    /// List managed filesystems of a pool, or the snapshots of one filesystem.
    List {
        /// Target: [host:]pool for filesystems, [host:]pool/name for snapshots.
        target: String,
    },

    /// Prune packrat-owned snapshots down to the retention count.
    Prune {
        /// Target: [host:]pool/name, or [host:]pool/name@snap for one snapshot.
        target: String,

        /// Retention override for this run.
        #[arg(long)]
        keep: Option<u32>,

        /// Show what would be destroyed without destroying anything.
        #[arg(long)]
        dry_run: bool,
    },

    /// Report pool health and per-filesystem snapshot state.
    Status {
        /// Target pool or filesystem: [host:]pool[/name]
        target: String,
    },

    /// Validate a configuration file or emit the config schema.
    Validate {
        /// Path to the configuration file to validate.
        #[arg(short = 'f', long, default_value = DEFAULT_CONFIG_PATH)]
        file: PathBuf,

        /// Output the JSON schema instead of validating a file.
        #[arg(long)]
        schema: bool,
    },
}

/// Where store commands execute: this host, or a multiplexed ssh session.
enum Runner {
    Local(LocalRunner),
    Ssh(Arc<SshSession>),
}

impl CommandRunner for Runner {
    fn run_with_input(
        &self,
        program: &str,
        args: &[&str],
        input: Option<&[u8]>,
    ) -> PackratResult<RunOutput> {
        match self {
            Runner::Local(runner) => runner.run_with_input(program, args, input),
            Runner::Ssh(session) => session.run_with_input(program, args, input),
        }
    }

    fn location(&self) -> String {
        match self {
            Runner::Local(runner) => runner.location(),
            Runner::Ssh(session) => session.location(),
        }
    }
}

/// Build the snapshot store for a target, plus the ssh session when the
/// target is remote so rsync can ride the same control socket.
fn open_store(
    config: &PackratConfig,
    target: &BackupTarget,
) -> Result<(SystemZfsStore<Runner>, Option<Arc<SshSession>>)> {
    match target.host.as_deref() {
        Some(host) => {
            let session = Arc::new(SshSession::open(host, &config.remote, config.zfs_timeout())?);
            // Remote binaries resolve through the remote PATH.
            let store = SystemZfsStore::with_runner(Runner::Ssh(session.clone()), "zfs", "zpool");
            Ok((store, Some(session)))
        }
        None => {
            let zfs = resolve_binary(config.zfs.zfs_path.as_deref(), KNOWN_ZFS_PATHS, "zfs")?;
            let zpool =
                resolve_binary(config.zfs.zpool_path.as_deref(), KNOWN_ZPOOL_PATHS, "zpool")?;
            let runner = Runner::Local(LocalRunner::new(config.zfs_timeout()));
            let store = SystemZfsStore::with_runner(
                runner,
                zfs.to_string_lossy().into_owned(),
                zpool.to_string_lossy().into_owned(),
            );
            Ok((store, None))
        }
    }
}

fn parse_target(raw: &str) -> Result<BackupTarget> {
    raw.parse::<BackupTarget>()
        .with_context(|| format!("invalid target `{raw}`"))
}

/// Entry point: parse arguments and surface errors with an exit code.
fn main() {
    if let Err(err) = run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}

/// Dispatch to the requested subcommand and render the resulting report.
fn run() -> Result<()> {
    let cli = Cli::parse();
    logging::init(&cli.log_level);
    let config_path = cli.config.clone();

    match cli.command {
        Commands::Init {
            target,
            vdevs,
            mountpoint,
        } => {
            let config = load_cli_config(&config_path)?;
            let target = parse_target(&target)?;
            let (store, _session) = open_store(&config, &target)?;
            let report =
                workflow::provision_pool(&config, &store, &target, &vdevs, mountpoint.as_deref())?;
            print_report(report);
        }
        Commands::Create { target, keep } => {
            let config = load_cli_config(&config_path)?;
            let target = parse_target(&target)?;
            let (store, _session) = open_store(&config, &target)?;
            let report = workflow::provision_filesystem(&config, &store, &target, keep)?;
            print_report(report);
        }
        Commands::Backup {
            source,
            target,
            keep,
            label,
            excludes,
            create,
        } => {
            let config = load_cli_config(&config_path)?;
            let target = parse_target(&target)?;
            let (store, session) = open_store(&config, &target)?;
            let mut sync = RsyncSync::new(&config)?;
            if let Some(session) = &session {
                sync = sync.with_transport(session.transport());
            }
            let options = BackupOptions {
                keep,
                label,
                excludes,
                create_missing: create,
            };
            let report = workflow::run_backup(&config, &store, &sync, &target, &source, options)?;
            print_report(report);
        }
        Commands::Snapshot { target, label } => {
            let config = load_cli_config(&config_path)?;
            let target = parse_target(&target)?;
            let (store, _session) = open_store(&config, &target)?;
            let report = workflow::take_snapshot(&config, &store, &target, label.as_deref())?;
            print_report(report);
        }
        Commands::List { target } => {
            let config = load_cli_config(&config_path)?;
            let target = parse_target(&target)?;
            let (store, _session) = open_store(&config, &target)?;
            if target.path.is_some() {
                print_snapshot_table(&config, &store, &target)?;
            } else {
                print_filesystem_table(&store, &target)?;
            }
        }
        Commands::Prune {
            target,
            keep,
            dry_run,
        } => {
            let config = load_cli_config(&config_path)?;
            let target = parse_target(&target)?;
            let (store, _session) = open_store(&config, &target)?;
            let options = PruneOptions { keep, dry_run };
            let report = workflow::prune_snapshots(&config, &store, &target, options)?;
            print_report(report);
        }
        Commands::Status { target } => {
            let config = load_cli_config(&config_path)?;
            let target = parse_target(&target)?;
            let (store, _session) = open_store(&config, &target)?;
            let report = workflow::status(&config, &store, &target)?;
            print_report(report);
        }
        Commands::Validate { file, schema } => {
            if schema {
                let schema = schema_for!(PackratConfig);
                println!("{}", to_string_pretty(&schema)?);
                return Ok(());
            }

            let config = PackratConfig::load(&file)
                .with_context(|| format!("failed to load configuration from {}", file.display()))?;
            let issues = config.validate();
            if issues.is_empty() {
                println!(
                    "Configuration valid (prefix `{}`, default_keep {}).",
                    config.policy.snapshot_prefix, config.policy.default_keep
                );
            } else {
                eprintln!("Configuration validation failed:");
                for issue in issues {
                    eprintln!("  - {issue}");
                }
                std::process::exit(1);
            }
        }
    }

    Ok(())
}

/// Render the snapshots of one filesystem, marking packrat-owned names.
fn print_snapshot_table<S>(
    config: &PackratConfig,
    store: &S,
    target: &BackupTarget,
) -> Result<()>
where
    S: SnapshotStore<Error = packrat_core::error::PackratError>,
{
    let filesystem = target.filesystem();
    let snapshots = store.list_snapshots(&filesystem)?;
    if snapshots.is_empty() {
        println!("No snapshots under {filesystem}.");
        return Ok(());
    }

    let prefix = config.policy.snapshot_prefix.as_str();
    println!("{:<40} {:<20} {:>12}  MANAGED", "SNAPSHOT", "CREATED", "USED");
    let mut managed = 0usize;
    for snapshot in &snapshots {
        let created = DateTime::<Utc>::from_timestamp(snapshot.creation, 0)
            .map(|ts| ts.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_else(|| "-".to_string());
        let owned = retention::is_managed_name(prefix, &snapshot.name);
        if owned {
            managed += 1;
        }
        println!(
            "{:<40} {:<20} {:>12}  {}",
            snapshot.name,
            created,
            snapshot.used,
            if owned { "yes" } else { "no" }
        );
    }
    println!(
        "{} snapshot(s), {} managed by prefix `{prefix}`.",
        snapshots.len(),
        managed
    );
    Ok(())
}

/// Render the managed filesystems under a pool.
fn print_filesystem_table<S>(store: &S, target: &BackupTarget) -> Result<()>
where
    S: SnapshotStore<Error = packrat_core::error::PackratError>,
{
    let mut rows = Vec::new();
    for info in store.list_filesystems(&target.pool)? {
        let flagged = store
            .get_property(&info.name, PROP_MANAGED)?
            .is_some_and(|value| value == "on");
        if flagged {
            rows.push(info);
        }
    }

    if rows.is_empty() {
        println!("No managed filesystems under pool {}.", target.pool);
        return Ok(());
    }

    println!(
        "{:<32} {:>14} {:>14}  MOUNTPOINT",
        "FILESYSTEM", "USED", "AVAIL"
    );
    for info in rows {
        println!(
            "{:<32} {:>14} {:>14}  {}",
            info.name, info.used, info.avail, info.mountpoint
        );
    }
    Ok(())
}

/// Pretty-print a workflow report so humans can follow along.
fn print_report(report: WorkflowReport) {
    println!("{}", report.title);
    for event in report.events {
        println!("  [{}] {}", level_tag(event.level), event.message);
    }
}

/// Short tag used when printing workflow severity levels.
fn level_tag(level: WorkflowLevel) -> &'static str {
    match level {
        WorkflowLevel::Info => "INFO",
        WorkflowLevel::Success => "OK",
        WorkflowLevel::Warn => "WARN",
        WorkflowLevel::Error => "ERR",
    }
}

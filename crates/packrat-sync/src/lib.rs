#![forbid(unsafe_code)]

//! rsync driver for packrat.
//!
//! Mirrors a local directory into a destination (local path or
//! `host:path` over an ssh transport) and turns rsync's `--stats` block
//! into a `SyncSummary`.

mod stats;

use log::{debug, warn};
use packrat_core::config::{resolve_binary, PackratConfig, KNOWN_RSYNC_PATHS};
use packrat_core::error::{PackratError, PackratResult};
use packrat_core::provider::{FileSync, SyncDestination, SyncSummary};
use packrat_remote::{CommandRunner, LocalRunner};
use std::path::Path;

// Tolerated rsync exits: 23 = partial transfer, 24 = files vanished
// mid-transfer. Anything else non-zero fails the mirror.
const EXIT_PARTIAL: i32 = 23;
const EXIT_VANISHED: i32 = 24;

/// Mirrors directories with the system `rsync`.
pub struct RsyncSync {
    rsync_path: String,
    extra_args: Vec<String>,
    transport: Option<String>,
    runner: LocalRunner,
}

impl RsyncSync {
    /// Driver from configuration; transfers stay local unless a transport
    /// is attached.
    pub fn new(config: &PackratConfig) -> PackratResult<Self> {
        let rsync = resolve_binary(config.sync.rsync_path.as_deref(), KNOWN_RSYNC_PATHS, "rsync")?;
        Ok(Self {
            rsync_path: rsync.to_string_lossy().into_owned(),
            extra_args: config.sync.extra_args.clone(),
            transport: None,
            runner: LocalRunner::new(config.sync_timeout()),
        })
    }

    /// Attach the remote shell command (`ssh -o ControlPath=...`) used for
    /// `host:path` destinations.
    pub fn with_transport(mut self, transport: String) -> Self {
        self.transport = Some(transport);
        self
    }
}

impl FileSync for RsyncSync {
    type Error = PackratError;

    fn mirror(
        &self,
        source: &Path,
        dest: &SyncDestination,
        excludes: &[String],
    ) -> PackratResult<SyncSummary> {
        // The trailing slash mirrors the directory's contents rather than
        // nesting the directory itself.
        let source_arg = format!(
            "{}/",
            source.to_string_lossy().trim_end_matches('/')
        );
        let dest_arg = match &dest.host {
            Some(host) => format!("{host}:{}", dest.path.display()),
            None => dest.path.display().to_string(),
        };
        if dest.host.is_some() && self.transport.is_none() {
            return Err(PackratError::Sync(format!(
                "remote destination {dest_arg} requires an ssh transport"
            )));
        }

        let mut args: Vec<&str> = vec!["-a", "--delete", "--stats"];
        for extra in &self.extra_args {
            args.push(extra);
        }
        for exclude in excludes {
            args.push("--exclude");
            args.push(exclude);
        }
        if let Some(transport) = &self.transport {
            if dest.host.is_some() {
                args.push("-e");
                args.push(transport);
            }
        }
        args.push(&source_arg);
        args.push(&dest_arg);

        debug!("mirroring {source_arg} -> {dest_arg}");
        let out = self.runner.run(&self.rsync_path, &args)?;

        match out.status {
            0 => {}
            EXIT_PARTIAL | EXIT_VANISHED => {
                warn!(
                    "rsync finished with partial-transfer exit {}: {}",
                    out.status,
                    out.diagnostic()
                );
            }
            status => {
                return Err(PackratError::Sync(format!(
                    "rsync exited {status} mirroring {source_arg} -> {dest_arg}: {}",
                    out.diagnostic()
                )));
            }
        }

        let mut summary = stats::parse_summary(&out.stdout)?;
        if out.status != 0 {
            summary.partial = Some(match out.status {
                EXIT_VANISHED => "source files vanished during transfer".to_string(),
                _ => format!("partial transfer (rsync exit {})", out.status),
            });
        }
        Ok(summary)
    }
}

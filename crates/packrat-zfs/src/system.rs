//! `SnapshotStore` backed by the real `zfs`/`zpool` binaries.

use crate::command::{classify_failure, StoreCommand};
use crate::parse;
use log::debug;
use packrat_core::error::{PackratError, PackratResult};
use packrat_core::provider::{FilesystemInfo, SnapshotInfo, SnapshotStore};
use packrat_remote::CommandRunner;

/// Drives `zfs` and `zpool` through a `CommandRunner`, local or remote.
pub struct SystemZfsStore<R> {
    cmd: StoreCommand<R>,
}

impl<R: CommandRunner> SystemZfsStore<R> {
    /// Store over an arbitrary runner. Local stores pass resolved binary
    /// paths; remote hosts get bare names and resolve them through their
    /// own PATH.
    pub fn with_runner(runner: R, zfs: impl Into<String>, zpool: impl Into<String>) -> Self {
        Self {
            cmd: StoreCommand::new(runner, zfs, zpool),
        }
    }

    /// Reject anything that is not a bare snapshot name, so `destroy` can
    /// only ever address a snapshot.
    fn require_short_snapshot_name(&self, snapshot: &str) -> PackratResult<()> {
        if snapshot.is_empty() || snapshot.contains('@') || snapshot.contains('/') {
            return Err(PackratError::Provider(format!(
                "`{snapshot}` is not a bare snapshot name"
            )));
        }
        Ok(())
    }
}

impl<R: CommandRunner> SnapshotStore for SystemZfsStore<R> {
    type Error = PackratError;

    fn pool_exists(&self, pool: &str) -> PackratResult<bool> {
        let args = ["list", "-H", "-o", "name", pool];
        let out = self.cmd.zpool(&args)?;
        if out.success() {
            return Ok(true);
        }
        if out.diagnostic().to_ascii_lowercase().contains("no such pool") {
            return Ok(false);
        }
        Err(classify_failure("zpool", &args, &out, &self.cmd.location()))
    }

    fn pool_health(&self, pool: &str) -> PackratResult<String> {
        let out = self
            .cmd
            .zpool_checked(&["list", "-H", "-o", "name,health", pool])?;
        let rows = parse::parse_pool_rows(&out.stdout)?;
        rows.into_iter()
            .find(|(name, _)| name == pool)
            .map(|(_, health)| health)
            .ok_or_else(|| {
                PackratError::Parse(format!("`zpool list` returned no row for `{pool}`"))
            })
    }

    fn create_pool(
        &self,
        pool: &str,
        vdevs: &[String],
        mountpoint: Option<&str>,
    ) -> PackratResult<()> {
        let mut args = vec!["create"];
        if let Some(mountpoint) = mountpoint {
            args.push("-m");
            args.push(mountpoint);
        }
        args.push(pool);
        for vdev in vdevs {
            args.push(vdev);
        }
        debug!("creating pool {pool} on {}", self.cmd.location());
        self.cmd.zpool_checked(&args)?;
        Ok(())
    }

    fn filesystem_exists(&self, filesystem: &str) -> PackratResult<bool> {
        let args = ["list", "-H", "-t", "filesystem", "-o", "name", filesystem];
        let out = self.cmd.zfs(&args)?;
        if out.success() {
            return Ok(true);
        }
        if out.diagnostic().to_ascii_lowercase().contains("does not exist") {
            return Ok(false);
        }
        Err(classify_failure("zfs", &args, &out, &self.cmd.location()))
    }

    fn create_filesystem(
        &self,
        filesystem: &str,
        properties: &[(String, String)],
    ) -> PackratResult<()> {
        let rendered: Vec<String> = properties
            .iter()
            .map(|(key, value)| format!("{key}={value}"))
            .collect();
        // -p creates missing parents, matching nested target paths.
        let mut args = vec!["create", "-p"];
        for pair in &rendered {
            args.push("-o");
            args.push(pair);
        }
        args.push(filesystem);
        debug!("creating filesystem {filesystem} on {}", self.cmd.location());
        self.cmd.zfs_checked(&args)?;
        Ok(())
    }

    fn set_property(&self, filesystem: &str, key: &str, value: &str) -> PackratResult<()> {
        let pair = format!("{key}={value}");
        self.cmd.zfs_checked(&["set", &pair, filesystem])?;
        Ok(())
    }

    fn get_property(&self, filesystem: &str, key: &str) -> PackratResult<Option<String>> {
        let out = self
            .cmd
            .zfs_checked(&["get", "-H", "-o", "value", key, filesystem])?;
        Ok(parse::parse_property_value(&out.stdout))
    }

    fn mountpoint(&self, filesystem: &str) -> PackratResult<String> {
        let out = self
            .cmd
            .zfs_checked(&["get", "-H", "-o", "value", "mountpoint", filesystem])?;
        match out.stdout.lines().next().map(str::trim) {
            Some(value) if !value.is_empty() => Ok(value.to_string()),
            _ => Err(PackratError::Parse(format!(
                "`zfs get mountpoint {filesystem}` returned no value"
            ))),
        }
    }

    fn list_filesystems(&self, pool: &str) -> PackratResult<Vec<FilesystemInfo>> {
        let out = self.cmd.zfs_checked(&[
            "list",
            "-H",
            "-p",
            "-r",
            "-t",
            "filesystem",
            "-o",
            "name,used,avail,mountpoint",
            pool,
        ])?;
        parse::parse_filesystem_rows(&out.stdout)
    }

    fn list_snapshots(&self, filesystem: &str) -> PackratResult<Vec<SnapshotInfo>> {
        let out = self.cmd.zfs_checked(&[
            "list",
            "-H",
            "-p",
            "-t",
            "snapshot",
            "-o",
            "name,creation,used",
            "-d",
            "1",
            filesystem,
        ])?;
        parse::parse_snapshot_rows(&out.stdout)
    }

    fn create_snapshot(&self, filesystem: &str, snapshot: &str) -> PackratResult<()> {
        self.require_short_snapshot_name(snapshot)?;
        let full = format!("{filesystem}@{snapshot}");
        debug!("creating snapshot {full} on {}", self.cmd.location());
        self.cmd.zfs_checked(&["snapshot", &full])?;
        Ok(())
    }

    fn destroy_snapshot(&self, filesystem: &str, snapshot: &str) -> PackratResult<()> {
        self.require_short_snapshot_name(snapshot)?;
        // The argument always carries `@`, so `zfs destroy` cannot be handed
        // a filesystem.
        let full = format!("{filesystem}@{snapshot}");
        debug!("destroying snapshot {full} on {}", self.cmd.location());
        self.cmd.zfs_checked(&["destroy", &full])?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use packrat_remote::RunOutput;
    use std::collections::HashMap;

    /// Replays canned output keyed on the full command line.
    struct StubRunner {
        responses: HashMap<String, RunOutput>,
    }

    impl StubRunner {
        fn new() -> Self {
            Self {
                responses: HashMap::new(),
            }
        }

        fn respond(mut self, command: &str, status: i32, stdout: &str, stderr: &str) -> Self {
            self.responses.insert(
                command.to_string(),
                RunOutput {
                    stdout: stdout.to_string(),
                    stderr: stderr.to_string(),
                    status,
                },
            );
            self
        }
    }

    impl CommandRunner for StubRunner {
        fn run_with_input(
            &self,
            program: &str,
            args: &[&str],
            _input: Option<&[u8]>,
        ) -> PackratResult<RunOutput> {
            let key = format!("{program} {}", args.join(" "));
            self.responses
                .get(&key)
                .cloned()
                .ok_or_else(|| PackratError::Channel(format!("unexpected command: {key}")))
        }

        fn location(&self) -> String {
            "stub".to_string()
        }
    }

    fn store(runner: StubRunner) -> SystemZfsStore<StubRunner> {
        SystemZfsStore::with_runner(runner, "zfs", "zpool")
    }

    #[test]
    fn pool_exists_distinguishes_missing_from_failing() {
        let runner = StubRunner::new()
            .respond("zpool list -H -o name tank", 0, "tank\n", "")
            .respond(
                "zpool list -H -o name gone",
                1,
                "",
                "cannot open 'gone': no such pool",
            )
            .respond("zpool list -H -o name broken", 1, "", "internal error");
        let store = store(runner);

        assert!(store.pool_exists("tank").unwrap());
        assert!(!store.pool_exists("gone").unwrap());
        assert!(store.pool_exists("broken").is_err());
    }

    #[test]
    fn pool_health_reads_the_matching_row() {
        let runner = StubRunner::new().respond(
            "zpool list -H -o name,health tank",
            0,
            "tank\tDEGRADED\n",
            "",
        );
        assert_eq!(store(runner).pool_health("tank").unwrap(), "DEGRADED");
    }

    #[test]
    fn get_property_maps_dash_to_none() {
        let runner = StubRunner::new()
            .respond("zfs get -H -o value packrat:keep tank/home", 0, "-\n", "")
            .respond("zfs get -H -o value packrat:managed tank/home", 0, "on\n", "");
        let store = store(runner);

        assert_eq!(store.get_property("tank/home", "packrat:keep").unwrap(), None);
        assert_eq!(
            store.get_property("tank/home", "packrat:managed").unwrap(),
            Some("on".to_string())
        );
    }

    #[test]
    fn list_snapshots_uses_depth_one_and_short_names() {
        let runner = StubRunner::new().respond(
            "zfs list -H -p -t snapshot -o name,creation,used -d 1 tank/home",
            0,
            "tank/home@packrat-20250101-000000\t1735689600\t4096\n",
            "",
        );
        let snapshots = store(runner).list_snapshots("tank/home").unwrap();
        assert_eq!(snapshots.len(), 1);
        assert_eq!(snapshots[0].name, "packrat-20250101-000000");
        assert_eq!(snapshots[0].creation, 1735689600);
    }

    #[test]
    fn destroy_refuses_non_snapshot_names() {
        let store = store(StubRunner::new());
        assert!(store.destroy_snapshot("tank/home", "").is_err());
        assert!(store.destroy_snapshot("tank/home", "a@b").is_err());
        assert!(store.destroy_snapshot("tank/home", "child/fs").is_err());
    }

    #[test]
    fn create_filesystem_passes_properties() {
        let runner = StubRunner::new().respond(
            "zfs create -p -o packrat:managed=on -o packrat:keep=5 tank/home",
            0,
            "",
            "",
        );
        let properties = vec![
            ("packrat:managed".to_string(), "on".to_string()),
            ("packrat:keep".to_string(), "5".to_string()),
        ];
        store(runner)
            .create_filesystem("tank/home", &properties)
            .unwrap();
    }
}

//! Persistent ssh channel with ControlMaster multiplexing.
//!
//! One `SshSession` per host: the first command lazily starts a master
//! connection, every later command (and the rsync transport) rides its
//! control socket, and `Drop` asks the master to exit.

use crate::quote;
use crate::runner::{run_local, CommandRunner, RunOutput};
use log::debug;
use packrat_core::config::{resolve_binary, RemoteCfg, KNOWN_SSH_PATHS};
use packrat_core::error::{PackratError, PackratResult};
use std::env;
use std::fs;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::sync::Mutex;
use std::time::Duration;

pub struct SshSession {
    ssh_path: PathBuf,
    host: String,
    control_path: PathBuf,
    persist_secs: u64,
    connect_timeout: Duration,
    command_timeout: Duration,
    established: Mutex<bool>,
}

impl SshSession {
    /// Prepare a session for `host`. The master connection is not opened
    /// until the first command needs it.
    pub fn open(host: &str, remote: &RemoteCfg, command_timeout: Duration) -> PackratResult<Self> {
        if host.is_empty() || host.contains('/') {
            return Err(PackratError::Channel(format!(
                "`{host}` is not a valid ssh host"
            )));
        }

        let ssh_path = resolve_binary(remote.ssh_path.as_deref(), KNOWN_SSH_PATHS, "ssh")?;
        let control_dir = control_dir(remote)?;
        let control_path = control_dir.join(socket_name(host));

        Ok(Self {
            ssh_path,
            host: host.to_string(),
            control_path,
            persist_secs: remote.control_persist_secs,
            connect_timeout: Duration::from_secs(remote.connect_timeout_secs),
            command_timeout,
            established: Mutex::new(false),
        })
    }

    /// Transport string for rsync's `-e`, riding the same control socket.
    pub fn transport(&self) -> String {
        format!(
            "{} -o ControlPath={} -o BatchMode=yes",
            self.ssh_path.display(),
            self.control_path.display()
        )
    }

    fn control_path_arg(&self) -> String {
        format!("ControlPath={}", self.control_path.display())
    }

    /// Probe the control socket with `ssh -O check`.
    fn master_alive(&self) -> bool {
        let arg = self.control_path_arg();
        run_local(
            &self.ssh_path,
            &["-O", "check", "-o", &arg, &self.host],
            None,
            self.connect_timeout,
        )
        .map(|out| out.success())
        .unwrap_or(false)
    }

    /// Start (or re-attach to) the master connection.
    fn ensure_master(&self) -> PackratResult<()> {
        let mut established = self.established.lock().unwrap();
        if *established && self.master_alive() {
            return Ok(());
        }
        if self.master_alive() {
            debug!("reusing live ssh master for {}", self.host);
            *established = true;
            return Ok(());
        }

        let control = self.control_path_arg();
        let persist = format!("ControlPersist={}s", self.persist_secs);
        let connect = format!("ConnectTimeout={}", self.connect_timeout.as_secs());
        debug!("starting ssh master for {} at {control}", self.host);
        // -f backgrounds after auth, so the budget only covers connection setup.
        let out = run_local(
            &self.ssh_path,
            &[
                "-o",
                "ControlMaster=auto",
                "-o",
                &control,
                "-o",
                &persist,
                "-o",
                "BatchMode=yes",
                "-o",
                &connect,
                "-N",
                "-f",
                &self.host,
            ],
            None,
            self.connect_timeout + Duration::from_secs(5),
        )?;

        if !out.success() {
            return Err(PackratError::Channel(format!(
                "failed to establish ssh master for {}: {}",
                self.host,
                out.diagnostic()
            )));
        }

        *established = true;
        Ok(())
    }
}

impl CommandRunner for SshSession {
    fn run_with_input(
        &self,
        program: &str,
        args: &[&str],
        input: Option<&[u8]>,
    ) -> PackratResult<RunOutput> {
        self.ensure_master()?;

        let control = self.control_path_arg();
        let command_line = quote::join(program, args);
        let out = run_local(
            &self.ssh_path,
            &[
                "-o",
                &control,
                "-o",
                "BatchMode=yes",
                &self.host,
                "--",
                &command_line,
            ],
            input,
            self.command_timeout,
        )?;

        // 255 is ssh itself failing, not the remote command.
        if out.status == 255 {
            return Err(PackratError::Channel(format!(
                "ssh channel to {} failed: {}",
                self.host,
                out.diagnostic()
            )));
        }

        Ok(out)
    }

    fn location(&self) -> String {
        self.host.clone()
    }
}

impl Drop for SshSession {
    fn drop(&mut self) {
        if !*self.established.lock().unwrap() {
            return;
        }
        let arg = self.control_path_arg();
        let _ = Command::new(&self.ssh_path)
            .args(["-O", "exit", "-o", &arg, &self.host])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status();
    }
}

/// Control sockets live in the configured directory, or a per-user runtime
/// directory, created 0700.
fn control_dir(remote: &RemoteCfg) -> PackratResult<PathBuf> {
    let dir = match remote.control_dir.as_deref().map(str::trim) {
        Some(dir) if !dir.is_empty() => PathBuf::from(dir),
        _ => match env::var_os("XDG_RUNTIME_DIR") {
            Some(runtime) => PathBuf::from(runtime).join("packrat"),
            None => env::temp_dir().join("packrat-ssh"),
        },
    };

    fs::create_dir_all(&dir)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(&dir, fs::Permissions::from_mode(0o700))?;
    }
    Ok(dir)
}

/// Stable socket name derived from the host, so different hosts never share
/// a master.
///
/// Alphanumerics pass through; every other byte is escaped as `_XX` hex.
/// Escapes always start with `_` and passthrough never produces one, so the
/// mapping is injective: `nas-1` and `nas.1` get different sockets.
fn socket_name(host: &str) -> String {
    let mut sanitized = String::with_capacity(host.len());
    for byte in host.bytes() {
        if byte.is_ascii_alphanumeric() {
            sanitized.push(byte as char);
        } else {
            sanitized.push_str(&format!("_{byte:02x}"));
        }
    }
    format!("{sanitized}.sock")
}

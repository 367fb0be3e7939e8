//! Process execution with a hard budget.
//!
//! Keeps shell integration isolated so driver logic stays testable (fake
//! binaries, deterministic stdout parsing).

use packrat_core::error::{PackratError, PackratResult};
use std::io::{Read, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStderr, ChildStdout, Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

/// Captured output of one finished command.
#[derive(Debug, Clone)]
pub struct RunOutput {
    pub stdout: String,
    pub stderr: String,
    pub status: i32,
}

impl RunOutput {
    pub fn success(&self) -> bool {
        self.status == 0
    }

    /// Best diagnostic line: stderr when present, stdout otherwise.
    pub fn diagnostic(&self) -> String {
        let stderr = self.stderr.trim();
        if stderr.is_empty() {
            self.stdout.trim().to_string()
        } else {
            stderr.to_string()
        }
    }
}

/// Where and how commands get executed.
///
/// Implementations return `Ok` with a non-zero status for commands that ran
/// and failed; `Err` is reserved for the execution machinery itself (spawn
/// failure, timeout, dead channel).
pub trait CommandRunner {
    fn run_with_input(
        &self,
        program: &str,
        args: &[&str],
        input: Option<&[u8]>,
    ) -> PackratResult<RunOutput>;

    fn run(&self, program: &str, args: &[&str]) -> PackratResult<RunOutput> {
        self.run_with_input(program, args, None)
    }

    /// Human-readable execution location for diagnostics (`local`, a host).
    fn location(&self) -> String;
}

/// Spawns programs directly on this host.
#[derive(Debug, Clone)]
pub struct LocalRunner {
    timeout: Duration,
}

impl LocalRunner {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl CommandRunner for LocalRunner {
    fn run_with_input(
        &self,
        program: &str,
        args: &[&str],
        input: Option<&[u8]>,
    ) -> PackratResult<RunOutput> {
        run_local(&PathBuf::from(program), args, input, self.timeout)
    }

    fn location(&self) -> String {
        "local".to_string()
    }
}

/// Spawn with piped stdio and enforce the budget, killing on overrun.
pub(crate) fn run_local(
    program: &PathBuf,
    args: &[&str],
    input: Option<&[u8]>,
    timeout: Duration,
) -> PackratResult<RunOutput> {
    let mut command = Command::new(program);
    command.args(args);
    command.stdout(Stdio::piped());
    command.stderr(Stdio::piped());
    if input.is_some() {
        command.stdin(Stdio::piped());
    }

    let mut child = command.spawn().map_err(|err| {
        PackratError::Channel(format!("failed to spawn {}: {err}", program.display()))
    })?;

    if let Some(payload) = input {
        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(payload)?;
            stdin.flush().ok();
        }
    }

    let stdout_pipe = child.stdout.take();
    let stderr_pipe = child.stderr.take();
    wait_with_timeout(program, child, stdout_pipe, stderr_pipe, timeout)
}

fn wait_with_timeout(
    program: &PathBuf,
    mut child: Child,
    stdout_pipe: Option<ChildStdout>,
    stderr_pipe: Option<ChildStderr>,
    timeout: Duration,
) -> PackratResult<RunOutput> {
    let start = Instant::now();
    let stdout_handle = spawn_output_reader(stdout_pipe);
    let stderr_handle = spawn_output_reader(stderr_pipe);
    let mut exit_status = None;

    while start.elapsed() <= timeout {
        if let Some(status) = child.try_wait()? {
            exit_status = Some(status);
            break;
        }
        thread::sleep(Duration::from_millis(25));
    }

    if exit_status.is_none() {
        let _ = child.kill();
        let _ = child.wait();
        return Err(PackratError::Channel(format!(
            "{} timed out after {timeout:?}",
            program.display()
        )));
    }

    let stdout = stdout_handle
        .join()
        .map_err(|_| PackratError::Channel("stdout reader thread panicked".into()))??;
    let stderr = stderr_handle
        .join()
        .map_err(|_| PackratError::Channel("stderr reader thread panicked".into()))??;

    let status = exit_status.map(|s| s.code().unwrap_or(-1)).unwrap_or(-1);

    Ok(RunOutput {
        stdout,
        stderr,
        status,
    })
}

fn spawn_output_reader<R>(pipe: Option<R>) -> thread::JoinHandle<PackratResult<String>>
where
    R: Read + Send + 'static,
{
    thread::spawn(move || -> PackratResult<String> {
        if let Some(mut reader) = pipe {
            let mut buf = Vec::new();
            reader.read_to_end(&mut buf)?;
            Ok(String::from_utf8_lossy(&buf).to_string())
        } else {
            Ok(String::new())
        }
    })
}

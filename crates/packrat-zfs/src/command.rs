//! Execution wrapper for invoking `zfs` and `zpool`.

use packrat_core::error::{PackratError, PackratResult};
use packrat_remote::runner::{CommandRunner, RunOutput};

pub(crate) struct StoreCommand<R> {
    runner: R,
    zfs: String,
    zpool: String,
}

impl<R: CommandRunner> StoreCommand<R> {
    pub(crate) fn new(runner: R, zfs: impl Into<String>, zpool: impl Into<String>) -> Self {
        Self {
            runner,
            zfs: zfs.into(),
            zpool: zpool.into(),
        }
    }

    pub(crate) fn location(&self) -> String {
        self.runner.location()
    }

    /// Run `zfs` and hand back the raw output, exit status included.
    pub(crate) fn zfs(&self, args: &[&str]) -> PackratResult<RunOutput> {
        self.runner.run(&self.zfs, args)
    }

    /// Run `zfs`, converting a non-zero exit into a classified error.
    pub(crate) fn zfs_checked(&self, args: &[&str]) -> PackratResult<RunOutput> {
        let out = self.zfs(args)?;
        if out.success() {
            return Ok(out);
        }
        Err(classify_failure("zfs", args, &out, &self.location()))
    }

    pub(crate) fn zpool(&self, args: &[&str]) -> PackratResult<RunOutput> {
        self.runner.run(&self.zpool, args)
    }

    pub(crate) fn zpool_checked(&self, args: &[&str]) -> PackratResult<RunOutput> {
        let out = self.zpool(args)?;
        if out.success() {
            return Ok(out);
        }
        Err(classify_failure("zpool", args, &out, &self.location()))
    }
}

/// Turn scraped stderr into an operator-ready diagnostic.
pub(crate) fn classify_failure(
    program: &str,
    args: &[&str],
    out: &RunOutput,
    location: &str,
) -> PackratError {
    let diagnostic = out.diagnostic();
    let lower = diagnostic.to_ascii_lowercase();
    let diagnostic = if diagnostic.is_empty() {
        "no additional output".to_string()
    } else {
        diagnostic
    };
    let invocation = format!("{program} {}", args.join(" "));

    if lower.contains("no such pool") {
        return PackratError::Provider(format!(
            "`{invocation}` on {location}: pool does not exist ({diagnostic})"
        ));
    }

    if lower.contains("dataset does not exist") || lower.contains("does not exist") {
        return PackratError::Provider(format!(
            "`{invocation}` on {location}: target does not exist ({diagnostic})"
        ));
    }

    if lower.contains("already exists") {
        return PackratError::Provider(format!(
            "`{invocation}` on {location}: target already exists ({diagnostic})"
        ));
    }

    if lower.contains("permission denied") || lower.contains("operation not permitted") {
        return PackratError::Provider(format!(
            "`{invocation}` on {location}: insufficient privileges ({diagnostic}); run as root or grant zfs allow delegations"
        ));
    }

    PackratError::Provider(format!(
        "`{invocation}` on {location} failed (exit {}): {diagnostic}",
        out.status
    ))
}

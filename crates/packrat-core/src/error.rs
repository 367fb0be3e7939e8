//! Error surface shared across the packrat workspace.

use thiserror::Error;

pub type PackratResult<T> = Result<T, PackratError>;

/// One variant per failure domain so callers can tell a dead ssh channel
/// apart from a refused zfs invocation.
#[derive(Debug, Error)]
pub enum PackratError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("invalid backup target `{input}`: {reason}")]
    InvalidTarget { input: String, reason: String },

    /// The storage subsystem (`zpool`/`zfs`) refused or failed a command.
    #[error("storage error: {0}")]
    Provider(String),

    /// The remote-command channel itself failed (master startup, timeout,
    /// dead control socket), as opposed to the remote command failing.
    #[error("remote channel error: {0}")]
    Channel(String),

    #[error("sync error: {0}")]
    Sync(String),

    /// Scraped command output did not match the expected scripted format.
    #[error("unparseable command output: {0}")]
    Parse(String),
}

impl PackratError {
    /// Convenience constructor for target errors.
    pub fn invalid_target(input: impl Into<String>, reason: impl Into<String>) -> Self {
        PackratError::InvalidTarget {
            input: input.into(),
            reason: reason.into(),
        }
    }
}

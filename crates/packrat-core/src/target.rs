//! The compound backup-target grammar: `[host:]pool[/name[@snapshot]]`.

use crate::error::{PackratError, PackratResult};
use std::fmt;
use std::str::FromStr;

/// A parsed backup target.
///
/// `host` follows the rsync/scp convention: everything before the first `:`
/// that precedes the first `/` names a remote host (optionally `user@host`).
/// The remainder is a ZFS path, with an optional `@snapshot` suffix on the
/// final segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupTarget {
    pub host: Option<String>,
    pub pool: String,
    pub path: Option<String>,
    pub snapshot: Option<String>,
}

impl BackupTarget {
    /// The `pool[/name]` string handed to `zfs`.
    pub fn filesystem(&self) -> String {
        match &self.path {
            Some(path) => format!("{}/{}", self.pool, path),
            None => self.pool.clone(),
        }
    }

    /// Full `pool[/name[@snapshot]]` form, without the host.
    pub fn qualified(&self) -> String {
        match &self.snapshot {
            Some(snap) => format!("{}@{}", self.filesystem(), snap),
            None => self.filesystem(),
        }
    }

    /// Error unless the target names a filesystem only (no `@snapshot`).
    pub fn require_filesystem(&self) -> PackratResult<()> {
        if self.snapshot.is_some() {
            return Err(PackratError::invalid_target(
                self.to_string(),
                "a snapshot suffix is not allowed here; name a filesystem",
            ));
        }
        Ok(())
    }
}

impl fmt::Display for BackupTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(host) = &self.host {
            write!(f, "{host}:")?;
        }
        write!(f, "{}", self.qualified())
    }
}

impl FromStr for BackupTarget {
    type Err = PackratError;

    fn from_str(input: &str) -> PackratResult<Self> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(PackratError::invalid_target(input, "target is empty"));
        }

        let (host, rest) = split_host(trimmed)
            .map_err(|reason| PackratError::invalid_target(trimmed, reason))?;

        let (dataset, snapshot) = match rest.split_once('@') {
            Some((dataset, snap)) => {
                if snap.contains('@') {
                    return Err(PackratError::invalid_target(
                        trimmed,
                        "`@` may appear at most once",
                    ));
                }
                if snap.is_empty() {
                    return Err(PackratError::invalid_target(
                        trimmed,
                        "snapshot name after `@` is empty",
                    ));
                }
                if snap.contains('/') {
                    return Err(PackratError::invalid_target(
                        trimmed,
                        "`@` is only valid in the final segment",
                    ));
                }
                if !is_valid_component(snap) {
                    return Err(PackratError::invalid_target(
                        trimmed,
                        format!("snapshot name `{snap}` contains invalid characters"),
                    ));
                }
                (dataset, Some(snap.to_string()))
            }
            None => (rest, None),
        };

        let mut segments = dataset.split('/');
        let pool = segments.next().unwrap_or("");
        if pool.is_empty() {
            return Err(PackratError::invalid_target(trimmed, "pool name is empty"));
        }
        if !is_valid_component(pool) {
            return Err(PackratError::invalid_target(
                trimmed,
                format!("pool name `{pool}` contains invalid characters"),
            ));
        }

        let mut path_segments = Vec::new();
        for segment in segments {
            if segment.is_empty() {
                return Err(PackratError::invalid_target(
                    trimmed,
                    "filesystem path contains an empty segment",
                ));
            }
            if !is_valid_component(segment) {
                return Err(PackratError::invalid_target(
                    trimmed,
                    format!("path segment `{segment}` contains invalid characters"),
                ));
            }
            path_segments.push(segment);
        }

        Ok(BackupTarget {
            host: host.map(str::to_string),
            pool: pool.to_string(),
            path: if path_segments.is_empty() {
                None
            } else {
                Some(path_segments.join("/"))
            },
            snapshot,
        })
    }
}

fn split_host(input: &str) -> Result<(Option<&str>, &str), String> {
    let slash = input.find('/').unwrap_or(input.len());
    match input.find(':') {
        Some(colon) if colon < slash => {
            let host = &input[..colon];
            let rest = &input[colon + 1..];
            if host.is_empty() {
                return Err("host before `:` is empty".to_string());
            }
            if rest.is_empty() {
                return Err("nothing follows the host".to_string());
            }
            Ok((Some(host), rest))
        }
        _ => Ok((None, input)),
    }
}

/// Lightweight sanity check matching common ZFS naming rules.
pub fn is_valid_component(segment: &str) -> bool {
    if segment.is_empty() || segment.starts_with('-') {
        return false;
    }
    segment
        .chars()
        .all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '_' | '-' | ':' | '.'))
}

#![forbid(unsafe_code)]

//! ZFS driver integration.
//!
//! `system` implements `SnapshotStore` over the `zfs`/`zpool` CLIs, run
//! through any `CommandRunner` (local or ssh). `command` and `parse` isolate
//! shell execution and output scraping so the driver stays testable.

mod command;
mod parse;
mod system;

pub use system::SystemZfsStore;

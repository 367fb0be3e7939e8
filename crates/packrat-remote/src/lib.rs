#![forbid(unsafe_code)]

//! Command execution for packrat.
//!
//! `runner` spawns local processes with a budget; `ssh` maintains one
//! multiplexed master connection per host and rides every remote command
//! over it. `quote` keeps remote argv assembly safe and testable.

pub mod quote;
pub mod runner;
pub mod ssh;

pub use runner::{CommandRunner, LocalRunner, RunOutput};
pub use ssh::SshSession;

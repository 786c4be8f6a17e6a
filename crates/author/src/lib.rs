//! In-World Authoring: versioned block edits with commit, revert, rollback and stash.
//!
//! # Invariants
//! - Only the commit at HEAD can be reverted.
//! - Revert and rollback replay prior blocks newest first.
//! - No operation panics or propagates failure into the host; errors are logged
//!   and reported back as values.

pub mod commands;
pub mod engine;
pub mod plugin;
pub mod tracker;

pub use commands::{Command, HELP, ParseError};
pub use engine::{
    CommitOutcome, Engine, EngineError, Recorded, RevertOutcome, StashOutcome, Status,
    UnstashReport,
};
pub use plugin::Plugin;
pub use tracker::BlockTracker;

pub fn crate_info() -> &'static str {
    concat!("worldgit-author v", env!("CARGO_PKG_VERSION"))
}

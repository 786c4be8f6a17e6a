//! Persistence: pending change buffer, stash files, parent-linked commit history.
//!
//! # Invariants
//! - Commit files form a singly-linked list from HEAD back to the root (parent `0`).
//! - Records inside a commit or stash are sorted ascending by timestamp.
//! - Timestamps handed out by [`Clock`] never repeat within a repository.

pub mod buffer;
pub mod clock;
pub mod codec;
pub mod config;
pub mod record;
pub mod store;

pub use buffer::ChangeBuffer;
pub use clock::Clock;
pub use codec::{Codec, CodecError, FORMAT_VERSION};
pub use config::{ConfigError, RepoConfig};
pub use record::{ChangeRecord, Commit, NO_PARENT, Stash, Timestamp};
pub use store::{HistoryStore, StoreError};

pub fn crate_info() -> &'static str {
    concat!("worldgit-persist v", env!("CARGO_PKG_VERSION"))
}

//! Shared types for the worldgit workspace: block addressing and block ids.

mod types;

pub use types::{BlockPos, EMPTY_BLOCK, is_empty_block};

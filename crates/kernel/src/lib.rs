//! World Kernel: the block mutation target that revert and rollback replay into.
//!
//! # Invariants
//! - All block writes flow through [`BlockTarget::set_block`].
//! - [`BlockWorld`] logs every write it receives, in arrival order.

pub mod world;

pub use world::{BlockEvent, BlockTarget, BlockWorld};

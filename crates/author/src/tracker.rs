use std::sync::Arc;

use worldgit_common::{BlockPos, EMPTY_BLOCK, is_empty_block};

use crate::engine::{Engine, Recorded};

/// Observer adapter: turns host block events into recorded changes.
///
/// Hosts call these before the event's effect is visible in the world, so the
/// prior block reported is the real one.
#[derive(Debug, Clone)]
pub struct BlockTracker {
    engine: Arc<Engine>,
}

impl BlockTracker {
    pub fn new(engine: Arc<Engine>) -> Self {
        Self { engine }
    }

    /// A block was placed into empty space.
    pub fn on_block_placed(&self, pos: BlockPos, block: &str) -> Recorded {
        tracing::debug!(%pos, block, "block placed");
        self.engine.record_change(pos, EMPTY_BLOCK, block)
    }

    /// A block was broken. Breaking empty space is not a change.
    pub fn on_block_broken(&self, pos: BlockPos, block: &str) -> Recorded {
        if is_empty_block(block) {
            return Recorded::Ignored;
        }
        tracing::debug!(%pos, block, "block broken");
        self.engine.record_change(pos, block, EMPTY_BLOCK)
    }

    /// A block was replaced in place.
    pub fn on_block_changed(&self, pos: BlockPos, prior: &str, new: &str) -> Recorded {
        self.engine.record_change(pos, prior, new)
    }
}

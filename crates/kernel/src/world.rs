use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use worldgit_common::{BlockPos, EMPTY_BLOCK, is_empty_block};

/// The single outbound capability of the versioning engine: write a block id
/// at an address in the live world.
///
/// Revert and rollback call this once per replayed record, in replay order.
pub trait BlockTarget {
    fn set_block(&mut self, pos: BlockPos, block: &str);
}

/// A record of one write received by a [`BlockWorld`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BlockEvent {
    /// Block at `pos` changed from `old` to `new`.
    Set {
        pos: BlockPos,
        old: String,
        new: String,
    },
}

/// In-memory block world.
///
/// Absent positions read as [`EMPTY_BLOCK`]. Uses BTreeMap for deterministic
/// iteration order, so saved worlds diff cleanly.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(from = "WorldFile", into = "WorldFile")]
pub struct BlockWorld {
    blocks: BTreeMap<BlockPos, String>,
    /// Append-only log of writes since the last drain.
    event_log: Vec<BlockEvent>,
}

/// On-disk shape of a [`BlockWorld`]: a flat list, since JSON map keys must be strings.
#[derive(Serialize, Deserialize)]
struct WorldFile {
    blocks: Vec<PlacedBlock>,
}

#[derive(Serialize, Deserialize)]
struct PlacedBlock {
    pos: BlockPos,
    block: String,
}

impl From<WorldFile> for BlockWorld {
    fn from(file: WorldFile) -> Self {
        Self {
            blocks: file
                .blocks
                .into_iter()
                .filter(|b| !is_empty_block(&b.block))
                .map(|b| (b.pos, b.block))
                .collect(),
            event_log: Vec::new(),
        }
    }
}

impl From<BlockWorld> for WorldFile {
    fn from(world: BlockWorld) -> Self {
        Self {
            blocks: world
                .blocks
                .into_iter()
                .map(|(pos, block)| PlacedBlock { pos, block })
                .collect(),
        }
    }
}

impl BlockWorld {
    /// Create an empty world.
    pub fn new() -> Self {
        Self::default()
    }

    /// Block id at `pos`, or [`EMPTY_BLOCK`] if nothing is there.
    pub fn block_at(&self, pos: BlockPos) -> &str {
        self.blocks.get(&pos).map(String::as_str).unwrap_or(EMPTY_BLOCK)
    }

    /// Number of non-empty blocks.
    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    /// Read-only access to all non-empty blocks.
    pub fn blocks(&self) -> &BTreeMap<BlockPos, String> {
        &self.blocks
    }

    /// Read-only access to the write log.
    pub fn events(&self) -> &[BlockEvent] {
        &self.event_log
    }

    /// Drain and return the write log.
    pub fn drain_events(&mut self) -> Vec<BlockEvent> {
        std::mem::take(&mut self.event_log)
    }

    /// Write `block` at `pos` and return the id that was there before.
    pub fn put(&mut self, pos: BlockPos, block: &str) -> String {
        let previous = if is_empty_block(block) {
            self.blocks.remove(&pos)
        } else {
            self.blocks.insert(pos, block.to_string())
        };
        let old = previous.unwrap_or_else(|| EMPTY_BLOCK.to_string());

        tracing::trace!(%pos, %old, new = block, "block set");
        self.event_log.push(BlockEvent::Set {
            pos,
            old: old.clone(),
            new: block.to_string(),
        });
        old
    }
}

impl BlockTarget for BlockWorld {
    fn set_block(&mut self, pos: BlockPos, block: &str) {
        self.put(pos, block);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn world_starts_empty() {
        let w = BlockWorld::new();
        assert_eq!(w.block_count(), 0);
        assert_eq!(w.block_at(BlockPos::ORIGIN), EMPTY_BLOCK);
    }

    #[test]
    fn put_returns_previous_block() {
        let mut w = BlockWorld::new();
        assert_eq!(w.put(BlockPos::ORIGIN, "Stone"), EMPTY_BLOCK);
        assert_eq!(w.put(BlockPos::ORIGIN, "Dirt"), "Stone");
        assert_eq!(w.block_at(BlockPos::ORIGIN), "Dirt");
    }

    #[test]
    fn writing_empty_removes_block() {
        let mut w = BlockWorld::new();
        w.put(BlockPos::new(1, 2, 3), "Stone");
        w.set_block(BlockPos::new(1, 2, 3), EMPTY_BLOCK);
        assert_eq!(w.block_count(), 0);
    }

    #[test]
    fn writes_are_logged_in_order() {
        let mut w = BlockWorld::new();
        w.set_block(BlockPos::ORIGIN, "Stone");
        w.set_block(BlockPos::ORIGIN, "Air");
        assert_eq!(
            w.events(),
            &[
                BlockEvent::Set {
                    pos: BlockPos::ORIGIN,
                    old: EMPTY_BLOCK.into(),
                    new: "Stone".into(),
                },
                BlockEvent::Set {
                    pos: BlockPos::ORIGIN,
                    old: "Stone".into(),
                    new: "Air".into(),
                },
            ]
        );
        assert_eq!(w.drain_events().len(), 2);
        assert!(w.events().is_empty());
    }

    #[test]
    fn json_roundtrip_keeps_blocks_drops_log() {
        let mut w = BlockWorld::new();
        w.put(BlockPos::new(0, 1, 0), "Stone");
        w.put(BlockPos::new(-4, 1, 9), "Grass");

        let json = serde_json::to_string(&w).unwrap();
        let loaded: BlockWorld = serde_json::from_str(&json).unwrap();
        assert_eq!(loaded.blocks(), w.blocks());
        assert!(loaded.events().is_empty());
    }
}

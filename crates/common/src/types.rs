use glam::IVec3;
use serde::{Deserialize, Serialize};

/// Block id written when a block is removed. Breaking a block records
/// `<old id> -> EMPTY_BLOCK`, placing one records `EMPTY_BLOCK -> <new id>`.
pub const EMPTY_BLOCK: &str = "Empty";

/// Integer address of a single block in the world.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct BlockPos {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl BlockPos {
    pub const ORIGIN: Self = Self::new(0, 0, 0);

    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    /// Position shifted by the given delta.
    pub fn offset(self, delta: IVec3) -> Self {
        (IVec3::from(self) + delta).into()
    }
}

impl From<IVec3> for BlockPos {
    fn from(v: IVec3) -> Self {
        Self::new(v.x, v.y, v.z)
    }
}

impl From<BlockPos> for IVec3 {
    fn from(p: BlockPos) -> Self {
        IVec3::new(p.x, p.y, p.z)
    }
}

impl std::fmt::Display for BlockPos {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {}, {})", self.x, self.y, self.z)
    }
}

/// Whether a block id names the removal sentinel (or nothing at all).
pub fn is_empty_block(id: &str) -> bool {
    id.is_empty() || id == EMPTY_BLOCK
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_pos_orders_by_x_then_y_then_z() {
        let mut v = vec![
            BlockPos::new(1, 0, 0),
            BlockPos::new(0, 5, 0),
            BlockPos::new(0, 0, 9),
        ];
        v.sort();
        assert_eq!(v[0], BlockPos::new(0, 0, 9));
        assert_eq!(v[2], BlockPos::new(1, 0, 0));
    }

    #[test]
    fn offset_goes_through_ivec3() {
        let p = BlockPos::new(1, 2, 3).offset(IVec3::new(-1, 0, 4));
        assert_eq!(p, BlockPos::new(0, 2, 7));
    }

    #[test]
    fn serializes_as_xyz_object() {
        let json = serde_json::to_string(&BlockPos::new(4, -2, 7)).unwrap();
        assert_eq!(json, r#"{"x":4,"y":-2,"z":7}"#);
    }

    #[test]
    fn empty_sentinel_detection() {
        assert!(is_empty_block(EMPTY_BLOCK));
        assert!(is_empty_block(""));
        assert!(!is_empty_block("Stone"));
    }
}

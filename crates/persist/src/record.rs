use serde::{Deserialize, Serialize};
use worldgit_common::{BlockPos, EMPTY_BLOCK, is_empty_block};

/// Milliseconds since the Unix epoch, made unique by [`crate::Clock`].
pub type Timestamp = u64;

/// Parent timestamp of the root commit.
pub const NO_PARENT: Timestamp = 0;

/// One observed block mutation.
///
/// Records are immutable once created; they move between the buffer, stash
/// files, and commits but are never edited in place.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeRecord {
    pub address: BlockPos,
    pub prior_value: String,
    pub new_value: String,
    pub timestamp: Timestamp,
}

impl ChangeRecord {
    pub fn new(
        address: BlockPos,
        prior_value: impl Into<String>,
        new_value: impl Into<String>,
        timestamp: Timestamp,
    ) -> Self {
        Self {
            address,
            prior_value: prior_value.into(),
            new_value: new_value.into(),
            timestamp,
        }
    }

    /// Whether this record removed the block at its address.
    pub fn is_removal(&self) -> bool {
        self.new_value == EMPTY_BLOCK
    }

    /// A record that changes nothing: same id before and after, or empty on
    /// both sides. Such records are never buffered.
    pub fn is_noop(&self) -> bool {
        self.prior_value == self.new_value
            || (is_empty_block(&self.prior_value) && is_empty_block(&self.new_value))
    }
}

/// Sort records oldest first.
pub fn sort_ascending(records: &mut [ChangeRecord]) {
    records.sort_by_key(|r| r.timestamp);
}

/// Sort records newest first, the order undo replay requires.
pub fn sort_descending(records: &mut [ChangeRecord]) {
    records.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
}

/// A durably stored batch of changes linked to its parent commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Commit {
    pub message: String,
    pub changes: Vec<ChangeRecord>,
    pub timestamp: Timestamp,
    /// Absent in files written before commits were chained.
    #[serde(default)]
    pub parent_timestamp: Timestamp,
}

impl Commit {
    /// Build a commit, sorting `changes` ascending by timestamp.
    pub fn new(
        message: impl Into<String>,
        mut changes: Vec<ChangeRecord>,
        timestamp: Timestamp,
        parent_timestamp: Timestamp,
    ) -> Self {
        sort_ascending(&mut changes);
        Self {
            message: message.into(),
            changes,
            timestamp,
            parent_timestamp,
        }
    }

    pub fn is_root(&self) -> bool {
        self.parent_timestamp == NO_PARENT
    }
}

/// A durably stored snapshot of uncommitted changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Stash {
    pub changes: Vec<ChangeRecord>,
    pub timestamp: Timestamp,
}

impl Stash {
    pub fn new(mut changes: Vec<ChangeRecord>, timestamp: Timestamp) -> Self {
        sort_ascending(&mut changes);
        Self { changes, timestamp }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rec(prior: &str, new: &str, ts: Timestamp) -> ChangeRecord {
        ChangeRecord::new(BlockPos::ORIGIN, prior, new, ts)
    }

    #[test]
    fn commit_new_sorts_changes() {
        let c = Commit::new("m", vec![rec("A", "B", 9), rec("B", "C", 2)], 10, NO_PARENT);
        let ts: Vec<_> = c.changes.iter().map(|r| r.timestamp).collect();
        assert_eq!(ts, vec![2, 9]);
        assert!(c.is_root());
    }

    #[test]
    fn descending_sort_is_newest_first() {
        let mut v = vec![rec("a", "b", 1), rec("b", "c", 3), rec("c", "d", 2)];
        sort_descending(&mut v);
        let ts: Vec<_> = v.iter().map(|r| r.timestamp).collect();
        assert_eq!(ts, vec![3, 2, 1]);
    }

    #[test]
    fn removal_and_noop_detection() {
        assert!(rec("Stone", EMPTY_BLOCK, 1).is_removal());
        assert!(!rec(EMPTY_BLOCK, "Stone", 1).is_removal());
        assert!(rec("Stone", "Stone", 1).is_noop());
        assert!(rec("", EMPTY_BLOCK, 1).is_noop());
        assert!(!rec("Stone", "Air", 1).is_noop());
    }

    #[test]
    fn record_fields_use_wire_names() {
        let json = serde_json::to_value(rec("Stone", "Air", 5)).unwrap();
        assert_eq!(json["priorValue"], "Stone");
        assert_eq!(json["newValue"], "Air");
        assert_eq!(json["address"]["z"], 0);
        assert_eq!(json["timestamp"], 5);
    }

    #[test]
    fn commit_without_parent_field_reads_as_root() {
        let json = r#"{"message":"old","changes":[],"timestamp":7}"#;
        let c: Commit = serde_json::from_str(json).unwrap();
        assert_eq!(c.parent_timestamp, NO_PARENT);
    }
}

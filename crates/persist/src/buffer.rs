use parking_lot::Mutex;
use std::collections::HashSet;

use crate::record::{ChangeRecord, sort_ascending};

/// Default number of pending records above which an observer append triggers
/// an automatic stash.
pub const DEFAULT_STASH_THRESHOLD: usize = 32;

/// Insertion-ordered, thread-safe collection of uncommitted changes.
///
/// Every read and write goes through one lock. The buffer never stashes on its
/// own: [`ChangeBuffer::push`] reports when the threshold is exceeded and the
/// caller flushes after the lock is released.
#[derive(Debug)]
pub struct ChangeBuffer {
    records: Mutex<Vec<ChangeRecord>>,
    threshold: usize,
}

impl Default for ChangeBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_STASH_THRESHOLD)
    }
}

impl ChangeBuffer {
    pub fn new(threshold: usize) -> Self {
        Self {
            records: Mutex::new(Vec::new()),
            threshold,
        }
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }

    /// Append a record on behalf of an observer. Returns `true` when the
    /// buffer now holds more than `threshold` records and should be flushed.
    #[must_use = "an exceeded threshold must be acted on by stashing"]
    pub fn push(&self, record: ChangeRecord) -> bool {
        let mut records = self.records.lock();
        records.push(record);
        records.len() > self.threshold
    }

    /// Append records without any threshold check (used when restoring stashes).
    pub fn extend(&self, batch: impl IntoIterator<Item = ChangeRecord>) {
        self.records.lock().extend(batch);
    }

    /// Owned copy of the current contents, safe to iterate while appends continue.
    pub fn snapshot(&self) -> Vec<ChangeRecord> {
        self.records.lock().clone()
    }

    /// Remove exactly the given records, leaving anything appended since the
    /// snapshot they came from. Returns how many entries were removed.
    pub fn remove_all(&self, done: &[ChangeRecord]) -> usize {
        let done: HashSet<&ChangeRecord> = done.iter().collect();
        let mut records = self.records.lock();
        let before = records.len();
        records.retain(|r| !done.contains(r));
        before - records.len()
    }

    /// Atomically take every record, leaving the buffer empty.
    pub fn take_all(&self) -> Vec<ChangeRecord> {
        std::mem::take(&mut *self.records.lock())
    }

    /// Put records back at the front, ahead of anything appended meanwhile.
    pub fn restore_front(&self, batch: Vec<ChangeRecord>) {
        let mut records = self.records.lock();
        let newer = std::mem::replace(&mut *records, batch);
        records.extend(newer);
    }

    pub fn clear(&self) {
        self.records.lock().clear();
    }

    /// Re-establish timestamp order after out-of-order inserts.
    pub fn sort_by_timestamp(&self) {
        sort_ascending(&mut self.records.lock());
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use worldgit_common::BlockPos;

    fn rec(ts: u64) -> ChangeRecord {
        ChangeRecord::new(BlockPos::new(ts as i32, 0, 0), "Empty", "Stone", ts)
    }

    #[test]
    fn push_signals_only_past_threshold() {
        let buf = ChangeBuffer::new(2);
        assert!(!buf.push(rec(1)));
        assert!(!buf.push(rec(2)));
        assert!(buf.push(rec(3)));
        assert_eq!(buf.len(), 3);
    }

    #[test]
    fn extend_never_signals_and_keeps_order() {
        let buf = ChangeBuffer::new(1);
        buf.extend([rec(3), rec(1), rec(2)]);
        let ts: Vec<_> = buf.snapshot().iter().map(|r| r.timestamp).collect();
        assert_eq!(ts, vec![3, 1, 2]);

        buf.sort_by_timestamp();
        let ts: Vec<_> = buf.snapshot().iter().map(|r| r.timestamp).collect();
        assert_eq!(ts, vec![1, 2, 3]);
    }

    #[test]
    fn remove_all_keeps_later_appends() {
        let buf = ChangeBuffer::default();
        let _ = buf.push(rec(1));
        let _ = buf.push(rec(2));
        let snap = buf.snapshot();
        let _ = buf.push(rec(3));

        assert_eq!(buf.remove_all(&snap), 2);
        assert_eq!(buf.snapshot(), vec![rec(3)]);
    }

    #[test]
    fn snapshot_is_detached_from_live_buffer() {
        let buf = ChangeBuffer::default();
        let _ = buf.push(rec(1));
        let snap = buf.snapshot();
        buf.clear();
        assert_eq!(snap.len(), 1);
        assert!(buf.is_empty());
    }

    #[test]
    fn take_all_then_restore_front() {
        let buf = ChangeBuffer::default();
        let _ = buf.push(rec(1));
        let _ = buf.push(rec(2));
        let taken = buf.take_all();
        assert!(buf.is_empty());

        let _ = buf.push(rec(3));
        buf.restore_front(taken);
        let ts: Vec<_> = buf.snapshot().iter().map(|r| r.timestamp).collect();
        assert_eq!(ts, vec![1, 2, 3]);
    }

    #[test]
    fn concurrent_pushes_are_all_kept() {
        let buf = Arc::new(ChangeBuffer::new(usize::MAX));
        let handles: Vec<_> = (0..8u64)
            .map(|t| {
                let buf = Arc::clone(&buf);
                std::thread::spawn(move || {
                    for i in 0..250 {
                        let _ = buf.push(rec(t * 1000 + i));
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(buf.len(), 2000);
    }
}

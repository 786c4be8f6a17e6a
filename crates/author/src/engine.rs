use parking_lot::Mutex;
use worldgit_common::BlockPos;
use worldgit_kernel::BlockTarget;
use worldgit_persist::record::sort_descending;
use worldgit_persist::{
    ChangeBuffer, ChangeRecord, Clock, Codec, Commit, HistoryStore, NO_PARENT, RepoConfig, Stash,
    StoreError, Timestamp,
};

/// Errors from versioning operations.
///
/// Every error is logged where it happens; callers only decide how to report it.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("commit {requested} is not HEAD (HEAD is {head}); only HEAD can be reverted")]
    NotHead {
        requested: Timestamp,
        head: Timestamp,
    },
}

/// What happened to a change handed to [`Engine::record`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recorded {
    /// Buffered; `pending` records are now waiting for a commit.
    Buffered { pending: usize },
    /// Buffered, and the buffer went over its threshold and was stashed.
    Stashed { stash: Timestamp, changes: usize },
    /// Nothing changed (same block before and after), so nothing was recorded.
    Ignored,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitOutcome {
    Committed {
        timestamp: Timestamp,
        parent: Timestamp,
        changes: usize,
    },
    NothingToCommit,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RevertOutcome {
    Reverted {
        timestamp: Timestamp,
        message: String,
        changes: usize,
        head: Timestamp,
    },
    NothingToRevert,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StashOutcome {
    Stashed { timestamp: Timestamp, changes: usize },
    NothingToStash,
}

/// Result of folding resident stash files back into the buffer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UnstashReport {
    pub files: usize,
    pub changes: usize,
    /// Stash files that could not be read or removed; left on disk.
    pub skipped: usize,
}

/// Repository summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Status {
    pub commits: usize,
    pub pending: usize,
    pub stashes: usize,
    pub head: Timestamp,
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "commits={} pending={} stashes={} head={}",
            self.commits, self.pending, self.stashes, self.head
        )
    }
}

/// The versioning engine: pending buffer, on-disk history, and the clock that
/// names everything.
///
/// One instance per repository. All methods take `&self`; share it between
/// observer and command threads with an `Arc`.
///
/// Operations that drain the buffer (commit, revert, rollback, stash, unstash)
/// run one at a time under `op`. Observers never wait on it: a threshold
/// flush that finds it held is skipped and retried on a later record.
#[derive(Debug)]
pub struct Engine {
    store: HistoryStore,
    buffer: ChangeBuffer,
    clock: Clock,
    op: Mutex<()>,
}

impl Engine {
    /// Build an engine without touching disk.
    pub fn new(config: &RepoConfig) -> Self {
        Self {
            store: HistoryStore::new(&config.root, Codec::new(config.compression_level)),
            buffer: ChangeBuffer::new(config.stash_threshold),
            clock: Clock::new(),
            op: Mutex::new(()),
        }
    }

    /// Build and initialize an engine.
    pub fn open(config: &RepoConfig) -> Result<Self, EngineError> {
        let engine = Self::new(config);
        engine.initialize()?;
        Ok(engine)
    }

    /// Create the repository layout if needed and seed the clock past every
    /// timestamp already on disk. Idempotent.
    pub fn initialize(&self) -> Result<(), EngineError> {
        self.store
            .init()
            .inspect_err(|e| tracing::error!(error = %e, "failed to initialize repository"))?;
        self.clock.observe(self.store.max_known_timestamp()?);
        tracing::info!(
            root = %self.store.root().display(),
            head = self.store.head(),
            "repository initialized"
        );
        Ok(())
    }

    pub fn store(&self) -> &HistoryStore {
        &self.store
    }

    pub fn buffer(&self) -> &ChangeBuffer {
        &self.buffer
    }

    pub fn clock(&self) -> &Clock {
        &self.clock
    }

    /// Record one observed mutation, stamped now. Must be called before the
    /// mutation is visible so `prior` is the true prior block.
    pub fn record_change(&self, address: BlockPos, prior: &str, new: &str) -> Recorded {
        self.record(ChangeRecord::new(address, prior, new, self.clock.next()))
    }

    /// Buffer a record, stashing the whole buffer if it grew past the threshold.
    pub fn record(&self, record: ChangeRecord) -> Recorded {
        if record.is_noop() {
            tracing::trace!(pos = %record.address, "ignoring no-op change");
            return Recorded::Ignored;
        }
        tracing::debug!(
            pos = %record.address,
            prior = %record.prior_value,
            new = %record.new_value,
            "change recorded"
        );

        if !self.buffer.push(record) {
            return Recorded::Buffered {
                pending: self.buffer.len(),
            };
        }

        let Some(_op) = self.op.try_lock() else {
            tracing::debug!("buffer over threshold during another operation, stash deferred");
            return Recorded::Buffered {
                pending: self.buffer.len(),
            };
        };
        tracing::warn!(
            threshold = self.buffer.threshold(),
            "pending change count exceeded threshold, stashing"
        );
        match self.stash_locked() {
            Ok(StashOutcome::Stashed { timestamp, changes }) => Recorded::Stashed {
                stash: timestamp,
                changes,
            },
            // Another flush emptied the buffer first, or the write failed and kept them.
            Ok(StashOutcome::NothingToStash) | Err(_) => Recorded::Buffered {
                pending: self.buffer.len(),
            },
        }
    }

    /// Fold stashes into the buffer and write everything pending as a new
    /// commit on top of HEAD.
    pub fn commit(&self, message: &str) -> Result<CommitOutcome, EngineError> {
        let _op = self.op.lock();
        let _span = tracing::info_span!("commit").entered();
        self.unstash_locked()?;

        let changes = self.buffer.snapshot();
        if changes.is_empty() {
            tracing::info!("no changes to commit");
            return Ok(CommitOutcome::NothingToCommit);
        }

        let parent = self.store.head();
        let commit = Commit::new(message, changes, self.clock.next(), parent);

        self.store.write_commit(&commit).inspect_err(|e| {
            tracing::warn!(error = %e, "failed to save commit, pending changes kept")
        })?;

        if let Err(e) = self.store.set_head(commit.timestamp) {
            tracing::warn!(error = %e, "failed to advance HEAD, discarding new commit file");
            if let Err(cleanup) = self.store.delete_commit(commit.timestamp) {
                tracing::warn!(
                    error = %cleanup,
                    commit = commit.timestamp,
                    "commit file left orphaned"
                );
            }
            return Err(e.into());
        }

        self.buffer.remove_all(&commit.changes);
        tracing::info!(
            commit = commit.timestamp,
            parent,
            changes = commit.changes.len(),
            message = %commit.message,
            "commit saved"
        );
        Ok(CommitOutcome::Committed {
            timestamp: commit.timestamp,
            parent,
            changes: commit.changes.len(),
        })
    }

    /// Discard uncommitted work, then undo the commit at HEAD.
    pub fn revert_latest(
        &self,
        target: &mut dyn BlockTarget,
    ) -> Result<RevertOutcome, EngineError> {
        let _op = self.op.lock();
        let _span = tracing::info_span!("revert").entered();
        self.rollback_locked(target)?;

        let Some(commit) = self
            .store
            .latest_commit()
            .inspect_err(|e| tracing::warn!(error = %e, "failed to load HEAD commit"))?
        else {
            tracing::info!("no commits to revert");
            return Ok(RevertOutcome::NothingToRevert);
        };
        self.revert_commit_locked(&commit, target)
    }

    /// Undo `commit`, which must be HEAD: replay its prior blocks newest first,
    /// rewind HEAD to its parent, and delete its file.
    pub fn revert_commit(
        &self,
        commit: &Commit,
        target: &mut dyn BlockTarget,
    ) -> Result<RevertOutcome, EngineError> {
        let _op = self.op.lock();
        self.revert_commit_locked(commit, target)
    }

    fn revert_commit_locked(
        &self,
        commit: &Commit,
        target: &mut dyn BlockTarget,
    ) -> Result<RevertOutcome, EngineError> {
        let head = self.store.head();
        if head == NO_PARENT || commit.timestamp != head {
            tracing::warn!(
                requested = commit.timestamp,
                head,
                "refusing to revert non-HEAD commit"
            );
            return Err(EngineError::NotHead {
                requested: commit.timestamp,
                head,
            });
        }

        let mut changes = commit.changes.clone();
        sort_descending(&mut changes);
        replay_prior(&changes, target);

        self.store
            .set_head(commit.parent_timestamp)
            .inspect_err(|e| tracing::warn!(error = %e, "failed to rewind HEAD after revert"))?;
        if let Err(e) = self.store.delete_commit(commit.timestamp) {
            tracing::warn!(
                error = %e,
                commit = commit.timestamp,
                "reverted commit file left orphaned"
            );
        }

        tracing::info!(
            commit = commit.timestamp,
            changes = changes.len(),
            message = %commit.message,
            "reverted commit"
        );
        Ok(RevertOutcome::Reverted {
            timestamp: commit.timestamp,
            message: commit.message.clone(),
            changes: changes.len(),
            head: commit.parent_timestamp,
        })
    }

    /// Undo every uncommitted change, stashed ones included, newest first.
    /// History on disk is not touched. Returns the number of records undone.
    pub fn rollback(&self, target: &mut dyn BlockTarget) -> Result<usize, EngineError> {
        let _op = self.op.lock();
        self.rollback_locked(target)
    }

    fn rollback_locked(&self, target: &mut dyn BlockTarget) -> Result<usize, EngineError> {
        let _span = tracing::info_span!("rollback").entered();
        self.unstash_locked()?;

        let mut changes = self.buffer.snapshot();
        if changes.is_empty() {
            tracing::debug!("nothing to roll back");
            return Ok(0);
        }
        sort_descending(&mut changes);
        replay_prior(&changes, target);

        self.buffer.remove_all(&changes);
        tracing::info!(changes = changes.len(), "rollback completed");
        Ok(changes.len())
    }

    /// Flush the whole buffer into a new stash file.
    pub fn stash(&self) -> Result<StashOutcome, EngineError> {
        let _op = self.op.lock();
        self.stash_locked()
    }

    fn stash_locked(&self) -> Result<StashOutcome, EngineError> {
        let changes = self.buffer.take_all();
        if changes.is_empty() {
            tracing::info!("no changes to stash");
            return Ok(StashOutcome::NothingToStash);
        }

        let stash = Stash::new(changes, self.clock.next());
        match self.store.write_stash(&stash) {
            Ok(_) => {
                tracing::info!(
                    stash = stash.timestamp,
                    changes = stash.changes.len(),
                    "uncommitted changes stashed"
                );
                Ok(StashOutcome::Stashed {
                    timestamp: stash.timestamp,
                    changes: stash.changes.len(),
                })
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to stash changes, keeping them in memory");
                self.buffer.restore_front(stash.changes);
                Err(e.into())
            }
        }
    }

    /// Move every resident stash file back into the buffer and delete it.
    ///
    /// Unreadable stash files are skipped and left on disk.
    pub fn unstash(&self) -> Result<UnstashReport, EngineError> {
        let _op = self.op.lock();
        self.unstash_locked()
    }

    fn unstash_locked(&self) -> Result<UnstashReport, EngineError> {
        let ids = self
            .store
            .stash_ids()
            .inspect_err(|e| tracing::warn!(error = %e, "failed to list stashes"))?;
        let mut report = UnstashReport::default();
        if ids.is_empty() {
            return Ok(report);
        }

        for ts in ids {
            let stash = match self.store.read_stash(ts) {
                Ok(Some(stash)) => stash,
                Ok(None) => continue,
                Err(e) => {
                    tracing::warn!(error = %e, stash = ts, "skipping unreadable stash");
                    report.skipped += 1;
                    continue;
                }
            };

            self.buffer.extend(stash.changes.iter().cloned());
            if let Err(e) = self.store.delete_stash(ts) {
                // Keep the file as the single copy rather than duplicating it.
                self.buffer.remove_all(&stash.changes);
                tracing::warn!(error = %e, stash = ts, "failed to remove stash, left on disk");
                report.skipped += 1;
                continue;
            }

            tracing::debug!(stash = ts, changes = stash.changes.len(), "unstashed");
            report.files += 1;
            report.changes += stash.changes.len();
        }

        self.buffer.sort_by_timestamp();
        tracing::info!(
            files = report.files,
            changes = report.changes,
            skipped = report.skipped,
            "stashed changes restored"
        );
        Ok(report)
    }

    pub fn status(&self) -> Result<Status, EngineError> {
        Ok(Status {
            commits: self.store.commit_count()?,
            pending: self.buffer.len(),
            stashes: self.store.stash_ids()?.len(),
            head: self.store.head(),
        })
    }

    /// Commits from HEAD back to the root, newest first.
    pub fn log(&self) -> Result<Vec<Commit>, EngineError> {
        Ok(self
            .store
            .log()
            .inspect_err(|e| tracing::warn!(error = %e, "history is inconsistent"))?)
    }

    /// Host shutdown hook: persist pending changes so a restart does not lose them.
    pub fn shutdown(&self) -> Result<StashOutcome, EngineError> {
        tracing::info!(pending = self.buffer.len(), "shutting down repository");
        self.stash()
    }
}

/// Write each record's prior block, in the order given.
fn replay_prior(changes: &[ChangeRecord], target: &mut dyn BlockTarget) {
    let _span = tracing::debug_span!("replay", changes = changes.len()).entered();
    for change in changes {
        tracing::debug!(pos = %change.address, block = %change.prior_value, "restoring block");
        target.set_block(change.address, &change.prior_value);
    }
}

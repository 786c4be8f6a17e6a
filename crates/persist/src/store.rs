//! File-backed history.
//!
//! Layout inside the repository root:
//! ```text
//! HEAD                           - decimal timestamp of the newest commit, 0 if none
//! commits/
//!   1700000000123.cbor.zst       - one CBOR+zstd commit per file, named by timestamp
//! stash/
//!   1700000000456.cbor.zst       - one CBOR+zstd stash per flush, named by timestamp
//! ```

use parking_lot::RwLock;
use std::collections::HashSet;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::codec::{Codec, CodecError, Record};
use crate::record::{Commit, NO_PARENT, Stash, Timestamp};

const RECORD_EXT: &str = ".cbor.zst";
const COMMITS_DIR: &str = "commits";
const STASH_DIR: &str = "stash";
const HEAD_FILE: &str = "HEAD";

/// Errors from file-backed history operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("failed to {op} {}: {source}", path.display())]
    Io {
        op: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("corrupt record {}: {source}", path.display())]
    Corrupt {
        path: PathBuf,
        #[source]
        source: CodecError,
    },
    #[error("failed to encode {}: {source}", path.display())]
    Encode {
        path: PathBuf,
        #[source]
        source: CodecError,
    },
    #[error("HEAD file {} holds {content:?}, expected a decimal timestamp", path.display())]
    InvalidHead { path: PathBuf, content: String },
    #[error("HEAD points at missing commit {0}")]
    MissingHead(Timestamp),
    #[error("commit {child} points at missing parent {parent}")]
    MissingParent { child: Timestamp, parent: Timestamp },
    #[error("history loops back to commit {0}")]
    Cycle(Timestamp),
}

fn io_err(op: &'static str, path: &Path) -> impl FnOnce(std::io::Error) -> StoreError {
    let path = path.to_path_buf();
    move |source| StoreError::Io { op, path, source }
}

/// Commit files, stash files, and the HEAD pointer under one root directory.
///
/// HEAD is cached in memory and written through on every change, so readers in
/// this process never observe a half-written value.
#[derive(Debug)]
pub struct HistoryStore {
    root: PathBuf,
    codec: Codec,
    head: RwLock<Timestamp>,
}

impl HistoryStore {
    /// Create a handle without touching the filesystem. Call [`HistoryStore::init`]
    /// before use.
    pub fn new(root: impl Into<PathBuf>, codec: Codec) -> Self {
        Self {
            root: root.into(),
            codec,
            head: RwLock::new(NO_PARENT),
        }
    }

    /// Create a handle and initialize the directory layout.
    pub fn open(root: impl Into<PathBuf>, codec: Codec) -> Result<Self, StoreError> {
        let store = Self::new(root, codec);
        store.init()?;
        Ok(store)
    }

    /// Ensure `commits/`, `stash/` and `HEAD` exist, then load HEAD.
    ///
    /// Safe to call on every start; existing history is left untouched.
    pub fn init(&self) -> Result<(), StoreError> {
        for dir in [self.commits_dir(), self.stash_dir()] {
            if !dir.is_dir() {
                std::fs::create_dir_all(&dir).map_err(io_err("create directory", &dir))?;
                tracing::info!(path = %dir.display(), "created repository directory");
            }
        }

        let head_path = self.head_path();
        if !head_path.exists() {
            std::fs::write(&head_path, NO_PARENT.to_string())
                .map_err(io_err("write", &head_path))?;
            tracing::info!(root = %self.root.display(), "initialized new repository");
        }

        let head = self.read_head_file()?;
        *self.head.write() = head;
        tracing::debug!(head, "repository ready");
        Ok(())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn commits_dir(&self) -> PathBuf {
        self.root.join(COMMITS_DIR)
    }

    pub fn stash_dir(&self) -> PathBuf {
        self.root.join(STASH_DIR)
    }

    pub fn head_path(&self) -> PathBuf {
        self.root.join(HEAD_FILE)
    }

    pub fn commit_path(&self, ts: Timestamp) -> PathBuf {
        self.commits_dir().join(format!("{ts}{RECORD_EXT}"))
    }

    pub fn stash_path(&self, ts: Timestamp) -> PathBuf {
        self.stash_dir().join(format!("{ts}{RECORD_EXT}"))
    }

    // ---- HEAD ----

    /// Timestamp of the newest commit, or [`NO_PARENT`] if history is empty.
    pub fn head(&self) -> Timestamp {
        *self.head.read()
    }

    /// Persist a new HEAD value.
    pub fn set_head(&self, ts: Timestamp) -> Result<(), StoreError> {
        let mut head = self.head.write();
        let path = self.head_path();
        std::fs::write(&path, ts.to_string()).map_err(io_err("write", &path))?;
        tracing::debug!(from = *head, to = ts, "HEAD moved");
        *head = ts;
        Ok(())
    }

    fn read_head_file(&self) -> Result<Timestamp, StoreError> {
        let path = self.head_path();
        let content = std::fs::read_to_string(&path).map_err(io_err("read", &path))?;
        let trimmed = content.trim();
        if trimmed.is_empty() {
            return Ok(NO_PARENT);
        }
        trimmed
            .parse::<Timestamp>()
            .map_err(|_| StoreError::InvalidHead { path, content })
    }

    // ---- commits ----

    /// Write a new commit file. Refuses to replace an existing file with the
    /// same timestamp.
    pub fn write_commit(&self, commit: &Commit) -> Result<PathBuf, StoreError> {
        let path = self.commit_path(commit.timestamp);
        self.write_record(&path, commit)?;
        tracing::debug!(
            path = %path.display(),
            changes = commit.changes.len(),
            parent = commit.parent_timestamp,
            "commit written"
        );
        Ok(path)
    }

    /// Commit with exactly this timestamp, if its file exists.
    pub fn read_commit(&self, ts: Timestamp) -> Result<Option<Commit>, StoreError> {
        self.read_record(&self.commit_path(ts))
    }

    /// Remove a commit file. Returns `false` if it was already gone.
    pub fn delete_commit(&self, ts: Timestamp) -> Result<bool, StoreError> {
        remove_record(&self.commit_path(ts))
    }

    /// Timestamps of every commit file, oldest first.
    pub fn commit_ids(&self) -> Result<Vec<Timestamp>, StoreError> {
        list_ids(&self.commits_dir())
    }

    pub fn commit_count(&self) -> Result<usize, StoreError> {
        Ok(self.commit_ids()?.len())
    }

    /// The commit HEAD points at.
    pub fn latest_commit(&self) -> Result<Option<Commit>, StoreError> {
        let head = self.head();
        if head == NO_PARENT {
            return Ok(None);
        }
        match self.read_commit(head)? {
            Some(commit) => Ok(Some(commit)),
            None => Err(StoreError::MissingHead(head)),
        }
    }

    /// Walk the parent chain from HEAD to the root, newest first.
    pub fn log(&self) -> Result<Vec<Commit>, StoreError> {
        let mut chain = Vec::new();
        let mut seen = HashSet::new();
        let mut child: Option<Timestamp> = None;
        let mut cursor = self.head();

        while cursor != NO_PARENT {
            if !seen.insert(cursor) {
                return Err(StoreError::Cycle(cursor));
            }
            let commit = self.read_commit(cursor)?.ok_or(match child {
                None => StoreError::MissingHead(cursor),
                Some(child) => StoreError::MissingParent {
                    child,
                    parent: cursor,
                },
            })?;
            child = Some(cursor);
            cursor = commit.parent_timestamp;
            chain.push(commit);
        }
        Ok(chain)
    }

    /// Commit files that the chain from HEAD never reaches.
    ///
    /// These are left behind when a commit file was written but HEAD was not
    /// updated. They are reported, never deleted automatically.
    pub fn orphans(&self) -> Result<Vec<Timestamp>, StoreError> {
        let reachable: HashSet<Timestamp> = self.log()?.iter().map(|c| c.timestamp).collect();
        Ok(self
            .commit_ids()?
            .into_iter()
            .filter(|ts| !reachable.contains(ts))
            .collect())
    }

    // ---- stashes ----

    pub fn write_stash(&self, stash: &Stash) -> Result<PathBuf, StoreError> {
        let path = self.stash_path(stash.timestamp);
        self.write_record(&path, stash)?;
        tracing::debug!(path = %path.display(), changes = stash.changes.len(), "stash written");
        Ok(path)
    }

    pub fn read_stash(&self, ts: Timestamp) -> Result<Option<Stash>, StoreError> {
        self.read_record(&self.stash_path(ts))
    }

    pub fn delete_stash(&self, ts: Timestamp) -> Result<bool, StoreError> {
        remove_record(&self.stash_path(ts))
    }

    /// Timestamps of every resident stash file, oldest first.
    pub fn stash_ids(&self) -> Result<Vec<Timestamp>, StoreError> {
        list_ids(&self.stash_dir())
    }

    /// Decode every resident stash file, oldest first.
    pub fn list_stashes(&self) -> Result<Vec<Stash>, StoreError> {
        let mut stashes = Vec::new();
        for ts in self.stash_ids()? {
            if let Some(stash) = self.read_stash(ts)? {
                stashes.push(stash);
            }
        }
        Ok(stashes)
    }

    /// Largest timestamp referenced anywhere in the repository, used to seed
    /// the clock so new identities never collide with existing files.
    pub fn max_known_timestamp(&self) -> Result<Timestamp, StoreError> {
        let commits = self.commit_ids()?;
        let stashes = self.stash_ids()?;
        Ok(commits
            .into_iter()
            .chain(stashes)
            .chain(std::iter::once(self.head()))
            .max()
            .unwrap_or(NO_PARENT))
    }

    // ---- helpers ----

    fn write_record<T: Record>(&self, path: &Path, value: &T) -> Result<(), StoreError> {
        use std::io::Write;

        let bytes = self.codec.encode(value).map_err(|source| StoreError::Encode {
            path: path.to_path_buf(),
            source,
        })?;
        let mut file = std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)
            .map_err(io_err("create", path))?;
        file.write_all(&bytes).map_err(io_err("write", path))?;
        Ok(())
    }

    fn read_record<T: Record>(&self, path: &Path) -> Result<Option<T>, StoreError> {
        let bytes = match std::fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(io_err("read", path)(e)),
        };
        self.codec
            .decode(&bytes)
            .map(Some)
            .map_err(|source| StoreError::Corrupt {
                path: path.to_path_buf(),
                source,
            })
    }
}

fn remove_record(path: &Path) -> Result<bool, StoreError> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == ErrorKind::NotFound => {
            tracing::warn!(path = %path.display(), "record already deleted");
            Ok(false)
        }
        Err(e) => Err(io_err("delete", path)(e)),
    }
}

fn list_ids(dir: &Path) -> Result<Vec<Timestamp>, StoreError> {
    let entries = std::fs::read_dir(dir).map_err(io_err("list", dir))?;
    let mut ids = Vec::new();
    for entry in entries {
        let entry = entry.map_err(io_err("list", dir))?;
        let name = entry.file_name();
        match name.to_str().and_then(parse_record_name) {
            Some(ts) => ids.push(ts),
            None => tracing::debug!(file = ?name, dir = %dir.display(), "skipping foreign file"),
        }
    }
    ids.sort_unstable();
    Ok(ids)
}

fn parse_record_name(name: &str) -> Option<Timestamp> {
    name.strip_suffix(RECORD_EXT)?.parse().ok()
}

//! Bounded per-file change history.

use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use tracing::debug;
use uuid::Uuid;

use super::types::FileChangeRecord;

/// Default number of records kept per file.
pub const DEFAULT_MAX_RECORDS_PER_FILE: usize = 50;

#[derive(Debug, Clone)]
struct Entry {
    seq: u64,
    record: FileChangeRecord,
}

#[derive(Debug, Default)]
struct HistoryMap {
    next_seq: u64,
    files: HashMap<PathBuf, VecDeque<Entry>>,
}

/// Change records per file, oldest first, evicting past a fixed bound.
///
/// Only clones leave the lock.
#[derive(Debug)]
pub struct ChangeHistory {
    max_per_file: usize,
    inner: Mutex<HistoryMap>,
}

impl Default for ChangeHistory {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_RECORDS_PER_FILE)
    }
}

impl ChangeHistory {
    /// Creates a history keeping at most `max_per_file` records per file.
    #[must_use]
    pub fn new(max_per_file: usize) -> Self {
        Self {
            max_per_file: max_per_file.max(1),
            inner: Mutex::new(HistoryMap::default()),
        }
    }

    /// Appends a record and returns the one evicted to make room, if any.
    pub fn push(&self, record: FileChangeRecord) -> Option<FileChangeRecord> {
        let mut inner = self.inner.lock();
        let seq = inner.next_seq;
        inner.next_seq += 1;
        let queue = inner.files.entry(record.file_path.clone()).or_default();
        queue.push_back(Entry { seq, record });
        if queue.len() > self.max_per_file {
            let evicted = queue.pop_front().map(|e| e.record);
            if let Some(evicted) = &evicted {
                debug!(record_id = %evicted.id, path = %evicted.file_path.display(), "History record evicted");
            }
            evicted
        } else {
            None
        }
    }

    /// Most recent record for `path`.
    #[must_use]
    pub fn latest(&self, path: &Path) -> Option<FileChangeRecord> {
        self.inner
            .lock()
            .files
            .get(path)
            .and_then(|q| q.back())
            .map(|e| e.record.clone())
    }

    /// Record with the given id.
    #[must_use]
    pub fn find(&self, id: Uuid) -> Option<FileChangeRecord> {
        self.inner
            .lock()
            .files
            .values()
            .flat_map(|q| q.iter())
            .find(|e| e.record.id == id)
            .map(|e| e.record.clone())
    }

    /// Removes and returns the record with the given id.
    pub fn remove(&self, id: Uuid) -> Option<FileChangeRecord> {
        let mut inner = self.inner.lock();
        let (path, index) = inner.files.iter().find_map(|(path, q)| {
            q.iter()
                .position(|e| e.record.id == id)
                .map(|i| (path.clone(), i))
        })?;
        let queue = inner.files.get_mut(&path)?;
        let removed = queue.remove(index).map(|e| e.record);
        if queue.is_empty() {
            inner.files.remove(&path);
        }
        removed
    }

    /// Up to `max` records for `path`, newest first.
    #[must_use]
    pub fn for_path(&self, path: &Path, max: usize) -> Vec<FileChangeRecord> {
        self.inner
            .lock()
            .files
            .get(path)
            .map(|q| q.iter().rev().take(max).map(|e| e.record.clone()).collect())
            .unwrap_or_default()
    }

    /// Every record of a batch, in the order they were applied.
    #[must_use]
    pub fn for_batch(&self, batch_id: Uuid) -> Vec<FileChangeRecord> {
        self.sorted(|record| record.batch_id == Some(batch_id))
    }

    /// Every record, in the order they were applied.
    #[must_use]
    pub fn all(&self) -> Vec<FileChangeRecord> {
        self.sorted(|_| true)
    }

    fn sorted(&self, keep: impl Fn(&FileChangeRecord) -> bool) -> Vec<FileChangeRecord> {
        let inner = self.inner.lock();
        let mut entries: Vec<&Entry> = inner
            .files
            .values()
            .flat_map(|q| q.iter())
            .filter(|e| keep(&e.record))
            .collect();
        entries.sort_by_key(|e| e.seq);
        entries.into_iter().map(|e| e.record.clone()).collect()
    }

    /// Number of records held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().files.values().map(VecDeque::len).sum()
    }

    /// True when no records are held.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

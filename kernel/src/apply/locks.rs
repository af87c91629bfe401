//! Per-path async locks serializing apply and undo on the same file.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Hands out one async mutex per path.
///
/// The map lock is only held to look up or insert entries; unused entries are
/// pruned on the next acquisition.
#[derive(Debug, Default)]
pub(crate) struct PathLocks {
    locks: Mutex<HashMap<PathBuf, Arc<AsyncMutex<()>>>>,
}

impl PathLocks {
    /// Locks every path in sorted order, so two batches sharing files cannot
    /// deadlock. Duplicates are locked once.
    pub(crate) async fn acquire(&self, paths: &[PathBuf]) -> Vec<OwnedMutexGuard<()>> {
        let mut sorted: Vec<&PathBuf> = paths.iter().collect();
        sorted.sort();
        sorted.dedup();

        let mutexes: Vec<Arc<AsyncMutex<()>>> = {
            let mut locks = self.locks.lock();
            locks.retain(|_, m| Arc::strong_count(m) > 1);
            sorted
                .into_iter()
                .map(|p| Arc::clone(locks.entry(p.clone()).or_default()))
                .collect()
        };

        let mut guards = Vec::with_capacity(mutexes.len());
        for mutex in mutexes {
            guards.push(mutex.lock_owned().await);
        }
        guards
    }

    #[cfg(test)]
    fn tracked(&self) -> usize {
        self.locks.lock().len()
    }
}

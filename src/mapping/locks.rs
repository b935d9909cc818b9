//! Per-path lock table
//!
//! Serializes "does a mapping exist? if not, create it" for one logical path
//! so that concurrent sync or import triggers upload at most once per path.
//! Entries hold weak references and disappear once no task holds the lock.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::trace;

/// Prune dead entries once the table grows past this many keys
const PRUNE_THRESHOLD: usize = 256;

/// Guard returned by [`PathLocks::lock`]; the path is released on drop
pub type PathGuard = OwnedMutexGuard<()>;

#[derive(Default)]
pub struct PathLocks {
    table: Mutex<HashMap<String, Weak<AsyncMutex<()>>>>,
}

impl PathLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive ownership of `path`
    pub async fn lock(&self, path: &str) -> PathGuard {
        let mutex = {
            let mut table = self.table.lock().unwrap_or_else(|e| e.into_inner());
            if table.len() > PRUNE_THRESHOLD {
                table.retain(|_, weak| weak.strong_count() > 0);
            }
            match table.get(path).and_then(Weak::upgrade) {
                Some(existing) => existing,
                None => {
                    let fresh = Arc::new(AsyncMutex::new(()));
                    table.insert(path.to_string(), Arc::downgrade(&fresh));
                    fresh
                }
            }
        };
        trace!(path = path, "Waiting for path lock");
        mutex.lock_owned().await
    }

    /// Number of paths currently locked or awaited
    pub fn active(&self) -> usize {
        let table = self.table.lock().unwrap_or_else(|e| e.into_inner());
        table.values().filter(|w| w.strong_count() > 0).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_same_path_is_exclusive() {
        let locks = Arc::new(PathLocks::new());
        let inside = Arc::new(AtomicUsize::new(0));
        let max_inside = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let locks = Arc::clone(&locks);
            let inside = Arc::clone(&inside);
            let max_inside = Arc::clone(&max_inside);
            handles.push(tokio::spawn(async move {
                let _guard = locks.lock("/inbox/a.pdf").await;
                let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                max_inside.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5)).await;
                inside.fetch_sub(1, Ordering::SeqCst);
            }));
        }
        for h in handles {
            h.await.unwrap();
        }
        assert_eq!(max_inside.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_different_paths_do_not_block() {
        let locks = PathLocks::new();
        let _a = locks.lock("/a").await;
        let b = tokio::time::timeout(Duration::from_millis(100), locks.lock("/b")).await;
        assert!(b.is_ok());
    }

    #[tokio::test]
    async fn test_entries_released_after_drop() {
        let locks = PathLocks::new();
        {
            let _g = locks.lock("/a").await;
            assert_eq!(locks.active(), 1);
        }
        assert_eq!(locks.active(), 0);
    }
}

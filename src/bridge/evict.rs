//! Eviction pass
//!
//! Drops primary copies that have not been read for longer than the idle
//! threshold. The secondary anchor is never touched, so an evicted file can
//! always be restored on its next download.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};

use super::guard::PassGuard;
use super::{BridgeError, Context};
use crate::mapping::Mapping;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct EvictionReport {
    pub evicted: u32,
    pub errors: u32,
}

pub struct Evictor {
    ctx: Arc<Context>,
    idle_secs: u64,
    guard: PassGuard,
}

enum Outcome {
    Evicted,
    /// The row changed between selection and lock; left for the next pass
    Skipped,
}

impl Evictor {
    pub fn new(ctx: Arc<Context>, idle_secs: u64) -> Self {
        Self {
            ctx,
            idle_secs,
            guard: PassGuard::new(),
        }
    }

    pub fn is_running(&self) -> bool {
        self.guard.is_running()
    }

    /// Evict every cached copy idle for at least the threshold
    ///
    /// Refused with [`BridgeError::PassInProgress`] while another pass runs.
    pub async fn run_eviction_pass(&self) -> Result<EvictionReport, BridgeError> {
        let _ticket = self
            .guard
            .try_begin()
            .ok_or(BridgeError::PassInProgress("eviction"))?;

        let stale = self.ctx.store.list_stale(self.idle_secs)?;
        let mut report = EvictionReport::default();
        if stale.is_empty() {
            debug!("Nothing to evict");
            return Ok(report);
        }

        for candidate in &stale {
            match self.evict_one(candidate).await {
                Ok(Outcome::Evicted) => report.evicted += 1,
                Ok(Outcome::Skipped) => {}
                Err(e) => {
                    report.errors += 1;
                    warn!(path = %candidate.path, error = %e, "Failed to evict");
                }
            }
        }

        info!(
            candidates = stale.len(),
            evicted = report.evicted,
            errors = report.errors,
            "Eviction pass finished"
        );
        Ok(report)
    }

    async fn evict_one(&self, candidate: &Mapping) -> Result<Outcome, BridgeError> {
        let path = candidate.path.as_str();
        let _guard = self.ctx.locks.lock(path).await;

        // A download may have touched or restored it since selection
        match self.ctx.store.get_by_path(path)? {
            Some(current)
                if current.cached && current.last_accessed == candidate.last_accessed => {}
            _ => {
                debug!(path = path, "Mapping changed since selection, skipping");
                return Ok(Outcome::Skipped);
            }
        }

        match self.ctx.primary.delete_file(path).await {
            Ok(()) => {}
            Err(e) if e.is_not_found() => {
                debug!(path = path, "Primary copy already gone");
            }
            Err(e) => return Err(e.into()),
        }

        self.ctx.store.mark_evicted(path)?;
        debug!(path = path, "Evicted primary copy");
        Ok(Outcome::Evicted)
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::*;
    use super::*;
    use crate::mapping::now_secs;
    use crate::remote::fake::FakeSecondary;
    use std::sync::atomic::Ordering;

    async fn synced_with_age(h: &Harness, path: &str, age_secs: i64) {
        h.primary.put(path, path.as_bytes(), "text/plain");
        let dir = crate::mapping::paths::parent(path).to_string();
        h.bridge.sync_directory(Some(&dir)).await.unwrap();
        let mut mapping = h.store.get_by_path(path).unwrap().unwrap();
        mapping.last_accessed = now_secs() - age_secs;
        h.store.upsert(&mapping).unwrap();
    }

    #[tokio::test]
    async fn test_only_stale_rows_are_evicted() {
        let h = harness_with(FakeSecondary::new(), 3_600);
        synced_with_age(&h, "/d/old.txt", 7_200).await;
        synced_with_age(&h, "/d/fresh.txt", 60).await;

        let report = h.bridge.run_eviction_pass().await.unwrap();
        assert_eq!(report, EvictionReport { evicted: 1, errors: 0 });

        assert!(!h.primary.contains("/d/old.txt"));
        assert!(h.primary.contains("/d/fresh.txt"));
        let old = h.store.get_by_path("/d/old.txt").unwrap().unwrap();
        assert!(!old.cached);
        assert!(!old.secondary_id.is_empty());
        assert!(h.store.get_by_path("/d/fresh.txt").unwrap().unwrap().cached);
    }

    #[tokio::test]
    async fn test_empty_pass_is_quiet() {
        let h = harness();
        let report = h.bridge.run_eviction_pass().await.unwrap();
        assert_eq!(report, EvictionReport::default());
        assert_eq!(h.primary.deletes.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_delete_failure_is_counted() {
        let h = harness_with(FakeSecondary::new(), 3_600);
        synced_with_age(&h, "/d/a.txt", 7_200).await;
        synced_with_age(&h, "/d/b.txt", 7_200).await;
        h.primary.fail_deletes.store(true, Ordering::SeqCst);

        let report = h.bridge.run_eviction_pass().await.unwrap();
        assert_eq!(report, EvictionReport { evicted: 0, errors: 2 });
        assert!(h.store.get_by_path("/d/a.txt").unwrap().unwrap().cached);
    }

    #[tokio::test]
    async fn test_already_deleted_copy_counts_as_evicted() {
        let h = harness_with(FakeSecondary::new(), 3_600);
        synced_with_age(&h, "/d/a.txt", 7_200).await;
        h.primary.remove("/d/a.txt");

        let report = h.bridge.run_eviction_pass().await.unwrap();
        assert_eq!(report.evicted, 1);
        assert!(!h.store.get_by_path("/d/a.txt").unwrap().unwrap().cached);
    }

    #[tokio::test]
    async fn test_never_accessed_rows_are_kept() {
        let h = harness_with(FakeSecondary::new(), 0);
        synced_with_age(&h, "/d/a.txt", 0).await;
        let mut mapping = h.store.get_by_path("/d/a.txt").unwrap().unwrap();
        mapping.last_accessed = 0;
        h.store.upsert(&mapping).unwrap();

        let report = h.bridge.run_eviction_pass().await.unwrap();
        assert_eq!(report.evicted, 0);
    }

    #[tokio::test]
    async fn test_candidate_touched_after_selection_is_skipped() {
        let h = harness_with(FakeSecondary::new(), 3_600);
        synced_with_age(&h, "/d/a.txt", 7_200).await;
        let candidates = h.store.list_stale(3_600).unwrap();
        assert_eq!(candidates.len(), 1);

        // A download lands between selection and the per-path lock
        h.store.touch("/d/a.txt").unwrap();

        let outcome = h.bridge.evictor.evict_one(&candidates[0]).await.unwrap();
        assert!(matches!(outcome, Outcome::Skipped));
        assert!(h.store.get_by_path("/d/a.txt").unwrap().unwrap().cached);
        assert!(h.primary.contains("/d/a.txt"));
        assert_eq!(h.primary.deletes.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_overlapping_pass_is_refused() {
        let h = harness();
        let _ticket = h.bridge.evictor.guard.try_begin().unwrap();
        assert!(h.bridge.evictor.is_running());
        let err = h.bridge.run_eviction_pass().await.unwrap_err();
        assert!(matches!(err, BridgeError::PassInProgress("eviction")));
    }
}

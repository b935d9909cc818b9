//! Mapping-consistency and cache-proxy engine
//!
//! Four components share one [`Context`]: the sync engine and the import
//! engine create mappings, the download proxy and the evictor mutate their
//! cache state. None of them reaches into another's internals.

pub mod error;
pub mod evict;
pub mod guard;
pub mod import;
pub mod naming;
pub mod proxy;
pub mod sync;

pub use error::BridgeError;
pub use evict::{EvictionReport, Evictor};
pub use import::{ImportEngine, ImportOutcome, ImportRequest};
pub use proxy::{DownloadProxy, DownloadedFile};
pub use sync::{SyncEngine, SyncReport};

use std::sync::Arc;

use crate::mapping::{paths, MappingStore, PathLocks, StoreError};
use crate::remote::{PrimaryStore, SecondaryStore};

/// MIME type used when neither the mapping nor the store knows better
pub const DEFAULT_MIME: &str = "application/octet-stream";

/// Shared state handed to every component
pub struct Context {
    pub store: Arc<MappingStore>,
    pub primary: Arc<dyn PrimaryStore>,
    pub secondary: Arc<dyn SecondaryStore>,
    /// Serializes mapping creation and cache-state changes per path
    pub locks: PathLocks,
}

impl Context {
    pub fn new(
        store: Arc<MappingStore>,
        primary: Arc<dyn PrimaryStore>,
        secondary: Arc<dyn SecondaryStore>,
    ) -> Self {
        Self {
            store,
            primary,
            secondary,
            locks: PathLocks::new(),
        }
    }
}

/// Engine tunables
#[derive(Debug, Clone)]
pub struct BridgeSettings {
    /// Primary directory that imports land in
    pub inbox_root: String,
    /// Directory synced when no explicit one is given
    pub sync_root: String,
    /// Seconds without access before a cached copy may be evicted
    pub idle_secs: u64,
}

impl Default for BridgeSettings {
    fn default() -> Self {
        Self {
            inbox_root: "/inbox".to_string(),
            sync_root: "/".to_string(),
            idle_secs: 7 * 24 * 60 * 60,
        }
    }
}

/// Mapping counts reported by the status command
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BridgeStats {
    pub mappings: u64,
    pub cached: u64,
    pub eviction_running: bool,
    pub sync_running: bool,
    pub primary_health: &'static str,
    /// Paths with a restore, sync or import in flight
    pub locked_paths: usize,
    /// (hits, misses, hit_rate) of the secondary client's lookup cache
    pub secondary_lookups: Option<(u64, u64, f64)>,
}

/// Entry point used by the control socket, the CLI and the scheduler
pub struct Bridge {
    ctx: Arc<Context>,
    settings: BridgeSettings,
    pub sync: SyncEngine,
    pub proxy: DownloadProxy,
    pub importer: ImportEngine,
    pub evictor: Evictor,
}

impl Bridge {
    pub fn new(ctx: Context, settings: BridgeSettings) -> Self {
        let ctx = Arc::new(ctx);
        Self {
            sync: SyncEngine::new(Arc::clone(&ctx)),
            proxy: DownloadProxy::new(Arc::clone(&ctx)),
            importer: ImportEngine::new(Arc::clone(&ctx), &settings.inbox_root),
            evictor: Evictor::new(Arc::clone(&ctx), settings.idle_secs),
            ctx,
            settings,
        }
    }

    pub fn settings(&self) -> &BridgeSettings {
        &self.settings
    }

    pub fn store(&self) -> &MappingStore {
        &self.ctx.store
    }

    /// Sync `dir`, or the configured sync root when `None`
    pub async fn sync_directory(&self, dir: Option<&str>) -> Result<SyncReport, BridgeError> {
        let dir = paths::normalize(dir.unwrap_or(&self.settings.sync_root));
        self.sync.sync_directory(&dir).await
    }

    /// Guarded sync of the configured root, used by the scheduler
    pub async fn run_sync_pass(&self) -> Result<SyncReport, BridgeError> {
        self.sync.run_sync_pass(&self.settings.sync_root).await
    }

    pub async fn download(&self, path: &str) -> Result<DownloadedFile, BridgeError> {
        self.proxy.download(path).await
    }

    pub async fn import_file(
        &self,
        request: &ImportRequest,
    ) -> Result<ImportOutcome, BridgeError> {
        self.importer.import_file(request).await
    }

    pub async fn run_eviction_pass(&self) -> Result<EvictionReport, BridgeError> {
        self.evictor.run_eviction_pass().await
    }

    pub fn stats(&self) -> Result<BridgeStats, StoreError> {
        Ok(BridgeStats {
            mappings: self.ctx.store.count()?,
            cached: self.ctx.store.count_cached()?,
            eviction_running: self.evictor.is_running(),
            sync_running: self.sync.is_pass_running(),
            primary_health: self.ctx.primary.health(),
            locked_paths: self.ctx.locks.active(),
            secondary_lookups: self.ctx.secondary.lookup_stats(),
        })
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::remote::fake::{FakePrimary, FakeSecondary};

    pub struct Harness {
        pub bridge: Bridge,
        pub store: Arc<MappingStore>,
        pub primary: Arc<FakePrimary>,
        pub secondary: Arc<FakeSecondary>,
    }

    pub fn harness_with(secondary: FakeSecondary, idle_secs: u64) -> Harness {
        let store = Arc::new(MappingStore::open_in_memory().unwrap());
        let primary = Arc::new(FakePrimary::new());
        let secondary = Arc::new(secondary);
        let ctx = Context::new(
            Arc::clone(&store),
            Arc::clone(&primary) as Arc<dyn PrimaryStore>,
            Arc::clone(&secondary) as Arc<dyn SecondaryStore>,
        );
        let settings = BridgeSettings {
            idle_secs,
            ..BridgeSettings::default()
        };
        Harness {
            bridge: Bridge::new(ctx, settings),
            store,
            primary,
            secondary,
        }
    }

    pub fn harness() -> Harness {
        harness_with(FakeSecondary::new(), 60)
    }
}

#[cfg(test)]
mod tests {
    use super::testing::*;
    use crate::remote::fake::FakeSecondary;

    #[tokio::test]
    async fn test_sync_evict_restore_lifecycle() {
        let h = harness_with(FakeSecondary::starting_at(41), 0);
        h.primary.add_dir("/inbox");
        h.primary.put("/inbox/report.pdf", b"%PDF-1.7", "application/pdf");

        let report = h.bridge.sync_directory(Some("/inbox")).await.unwrap();
        assert_eq!(report.synced, 1);
        let synced = h.store.get_by_path("/inbox/report.pdf").unwrap().unwrap();
        assert_eq!(synced.secondary_id, "sec-42");
        assert!(synced.cached);
        let original_primary_id = synced.primary_id.clone();

        let eviction = h.bridge.run_eviction_pass().await.unwrap();
        assert_eq!(eviction.evicted, 1);
        assert!(!h.primary.contains("/inbox/report.pdf"));
        let evicted = h.store.get_by_path("/inbox/report.pdf").unwrap().unwrap();
        assert!(!evicted.cached);
        assert_eq!(evicted.secondary_id, "sec-42");

        let file = h.bridge.download("/inbox/report.pdf").await.unwrap();
        assert_eq!(file.bytes, b"%PDF-1.7".to_vec());
        assert_eq!(file.mime_type, "application/pdf");
        assert_eq!(file.file_name, "report.pdf");

        let restored = h.store.get_by_path("/inbox/report.pdf").unwrap().unwrap();
        assert!(restored.cached);
        assert_eq!(restored.secondary_id, "sec-42");
        assert_ne!(restored.primary_id, original_primary_id);
        assert_eq!(restored.created_at, synced.created_at);
        assert!(h.primary.contains("/inbox/report.pdf"));
    }

    #[tokio::test]
    async fn test_stats() {
        let h = harness();
        h.primary.put("/a.txt", b"a", "text/plain");
        h.bridge.sync_directory(None).await.unwrap();
        let stats = h.bridge.stats().unwrap();
        assert_eq!(stats.mappings, 1);
        assert_eq!(stats.cached, 1);
        assert!(!stats.eviction_running);
        assert_eq!(stats.locked_paths, 0);
        assert!(stats.secondary_lookups.is_none());
    }
}

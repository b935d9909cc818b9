//! File path cache
//!
//! `getFile` resolutions stay valid on the bot file server for about an hour.
//! Caching them saves one Bot API round trip per restore of a recently
//! resolved file.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use moka::sync::Cache;
use tracing::{debug, trace};

/// Resolutions are reused for slightly less than the server-side lifetime
const DEFAULT_TTL: Duration = Duration::from_secs(50 * 60);

const MAX_ENTRIES: u64 = 10_000;

/// TTL cache of `file_id -> file_path`
pub struct FilePathCache {
    paths: Cache<String, String>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl FilePathCache {
    pub fn new() -> Self {
        Self::with_ttl(DEFAULT_TTL)
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        let paths = Cache::builder()
            .time_to_live(ttl)
            .max_capacity(MAX_ENTRIES)
            .name("telegram_file_paths")
            .build();

        Self {
            paths,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn get(&self, file_id: &str) -> Option<String> {
        match self.paths.get(file_id) {
            Some(path) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                trace!(file_id = file_id, "File path cache HIT");
                Some(path)
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                trace!(file_id = file_id, "File path cache MISS");
                None
            }
        }
    }

    pub fn insert(&self, file_id: &str, file_path: String) {
        self.paths.insert(file_id.to_string(), file_path);
    }

    /// Forget a resolution whose download failed
    pub fn invalidate(&self, file_id: &str) {
        self.paths.invalidate(file_id);
        debug!(file_id = file_id, "Invalidated cached file path");
    }

    /// Returns (hits, misses, hit_rate)
    pub fn stats(&self) -> (u64, u64, f64) {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        let hit_rate = if total > 0 {
            (hits as f64 / total as f64) * 100.0
        } else {
            0.0
        };
        (hits, misses, hit_rate)
    }
}

impl Default for FilePathCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hit_miss_counters() {
        let cache = FilePathCache::new();
        assert!(cache.get("f1").is_none());

        cache.insert("f1", "documents/file_1.pdf".to_string());
        assert_eq!(cache.get("f1").as_deref(), Some("documents/file_1.pdf"));

        let (hits, misses, hit_rate) = cache.stats();
        assert_eq!(hits, 1);
        assert_eq!(misses, 1);
        assert!(hit_rate > 49.0 && hit_rate < 51.0);
    }

    #[test]
    fn test_invalidate() {
        let cache = FilePathCache::new();
        cache.insert("f1", "documents/file_1.pdf".to_string());
        cache.invalidate("f1");
        assert!(cache.get("f1").is_none());
    }

    #[test]
    fn test_expiry() {
        let cache = FilePathCache::with_ttl(Duration::from_millis(20));
        cache.insert("f1", "documents/file_1.pdf".to_string());
        std::thread::sleep(Duration::from_millis(60));
        assert!(cache.get("f1").is_none());
    }
}

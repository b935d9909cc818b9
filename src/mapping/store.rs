//! SQLite-backed mapping store
//!
//! Every mutation is a single statement run under the connection mutex, so
//! writes to one row are atomic with respect to each other.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::{debug, info};

use super::model::{now_secs, Mapping};

/// Mapping store failure
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Failed to prepare database location: {0}")]
    Io(#[from] std::io::Error),
}

const SELECT_COLUMNS: &str = "path, primary_id, secondary_id, secondary_ref, file_name, \
     file_size, mime_type, last_accessed, created_at, cached";

/// Durable path-keyed mapping table
pub struct MappingStore {
    conn: Mutex<Connection>,
}

impl MappingStore {
    /// Open (or create) the database file at `db_path`
    pub fn open(db_path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(db_path)?;
        conn.execute_batch(
            r#"
            PRAGMA journal_mode=WAL;
            PRAGMA synchronous=NORMAL;
            "#,
        )?;
        let store = Self::from_connection(conn)?;
        info!(db = %db_path.display(), "Mapping store opened");
        Ok(store)
    }

    /// Volatile store for tests
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, StoreError> {
        migrate_v1(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        // A panic while holding the lock cannot leave a half-applied statement
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Create or update the row for `mapping.path`; `created_at` of an
    /// existing row is kept
    pub fn upsert(&self, mapping: &Mapping) -> Result<(), StoreError> {
        self.conn().execute(
            r#"
            INSERT INTO mappings (path, primary_id, secondary_id, secondary_ref, file_name,
                                  file_size, mime_type, last_accessed, created_at, cached)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            ON CONFLICT(path) DO UPDATE SET
                primary_id = excluded.primary_id,
                secondary_id = excluded.secondary_id,
                secondary_ref = excluded.secondary_ref,
                file_name = excluded.file_name,
                file_size = excluded.file_size,
                mime_type = excluded.mime_type,
                last_accessed = excluded.last_accessed,
                cached = excluded.cached
            "#,
            params![
                mapping.path,
                mapping.primary_id,
                mapping.secondary_id,
                mapping.secondary_ref,
                mapping.file_name,
                mapping.file_size as i64,
                mapping.mime_type,
                mapping.last_accessed,
                mapping.created_at,
                mapping.cached,
            ],
        )?;
        debug!(path = %mapping.path, cached = mapping.cached, "Upserted mapping");
        Ok(())
    }

    pub fn get_by_path(&self, path: &str) -> Result<Option<Mapping>, StoreError> {
        let sql = format!("SELECT {} FROM mappings WHERE path = ?1", SELECT_COLUMNS);
        let mapping = self
            .conn()
            .query_row(&sql, params![path], map_row)
            .optional()?;
        Ok(mapping)
    }

    pub fn get_by_primary_id(&self, primary_id: &str) -> Result<Option<Mapping>, StoreError> {
        let sql = format!(
            "SELECT {} FROM mappings WHERE primary_id = ?1 LIMIT 1",
            SELECT_COLUMNS
        );
        let mapping = self
            .conn()
            .query_row(&sql, params![primary_id], map_row)
            .optional()?;
        Ok(mapping)
    }

    /// Record an access; no-op for unknown paths
    pub fn touch(&self, path: &str) -> Result<(), StoreError> {
        self.conn().execute(
            "UPDATE mappings SET last_accessed = ?1 WHERE path = ?2",
            params![now_secs(), path],
        )?;
        Ok(())
    }

    pub fn mark_evicted(&self, path: &str) -> Result<(), StoreError> {
        self.conn().execute(
            "UPDATE mappings SET cached = 0 WHERE path = ?1",
            params![path],
        )?;
        debug!(path = path, "Marked mapping evicted");
        Ok(())
    }

    pub fn mark_cached(&self, path: &str) -> Result<(), StoreError> {
        self.conn().execute(
            "UPDATE mappings SET cached = 1, last_accessed = ?1 WHERE path = ?2",
            params![now_secs(), path],
        )?;
        debug!(path = path, "Marked mapping cached");
        Ok(())
    }

    /// Cached rows idle for at least `idle_secs`, so a zero threshold
    /// selects everything cached. Rows that were never accessed
    /// (`last_accessed = 0`) are left alone.
    pub fn list_stale(&self, idle_secs: u64) -> Result<Vec<Mapping>, StoreError> {
        // Thresholds past i64::MAX mean "never"
        let idle = i64::try_from(idle_secs).unwrap_or(i64::MAX);
        let cutoff = now_secs().saturating_sub(idle);
        self.query_all(
            &format!(
                "SELECT {} FROM mappings \
                 WHERE cached = 1 AND last_accessed > 0 AND last_accessed <= ?1 \
                 ORDER BY last_accessed ASC",
                SELECT_COLUMNS
            ),
            params![cutoff],
        )
    }

    pub fn list_evicted(&self) -> Result<Vec<Mapping>, StoreError> {
        self.query_all(
            &format!(
                "SELECT {} FROM mappings WHERE cached = 0 ORDER BY path",
                SELECT_COLUMNS
            ),
            [],
        )
    }

    /// Newest first
    pub fn list(&self, limit: u32, offset: u32) -> Result<Vec<Mapping>, StoreError> {
        self.query_all(
            &format!(
                "SELECT {} FROM mappings ORDER BY created_at DESC, path ASC LIMIT ?1 OFFSET ?2",
                SELECT_COLUMNS
            ),
            params![limit, offset],
        )
    }

    pub fn count(&self) -> Result<u64, StoreError> {
        let n: i64 = self
            .conn()
            .query_row("SELECT COUNT(*) FROM mappings", [], |r| r.get(0))?;
        Ok(n as u64)
    }

    pub fn count_cached(&self) -> Result<u64, StoreError> {
        let n: i64 = self.conn().query_row(
            "SELECT COUNT(*) FROM mappings WHERE cached = 1",
            [],
            |r| r.get(0),
        )?;
        Ok(n as u64)
    }

    fn query_all<P: rusqlite::Params>(
        &self,
        sql: &str,
        params: P,
    ) -> Result<Vec<Mapping>, StoreError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt.query_map(params, map_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }
}

fn map_row(row: &Row<'_>) -> rusqlite::Result<Mapping> {
    Ok(Mapping {
        path: row.get(0)?,
        primary_id: row.get(1)?,
        secondary_id: row.get(2)?,
        secondary_ref: row.get(3)?,
        file_name: row.get(4)?,
        file_size: row.get::<_, i64>(5)?.max(0) as u64,
        mime_type: row.get(6)?,
        last_accessed: row.get(7)?,
        created_at: row.get(8)?,
        cached: row.get(9)?,
    })
}

fn migrate_v1(conn: &Connection) -> Result<(), StoreError> {
    let user_version: i64 = conn.query_row("PRAGMA user_version;", [], |r| r.get(0))?;
    if user_version >= 1 {
        return Ok(());
    }

    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS mappings (
          path TEXT NOT NULL,
          primary_id TEXT NOT NULL,
          secondary_id TEXT NOT NULL CHECK (secondary_id <> ''),
          secondary_ref INTEGER,
          file_name TEXT NOT NULL,
          file_size INTEGER NOT NULL,
          mime_type TEXT NOT NULL,
          last_accessed INTEGER NOT NULL DEFAULT 0,
          created_at INTEGER NOT NULL,
          cached INTEGER NOT NULL DEFAULT 1
        );
        CREATE UNIQUE INDEX IF NOT EXISTS idx_mappings_path ON mappings(path);
        CREATE INDEX IF NOT EXISTS idx_mappings_last_accessed ON mappings(last_accessed);
        CREATE INDEX IF NOT EXISTS idx_mappings_cached ON mappings(cached);
        CREATE INDEX IF NOT EXISTS idx_mappings_primary_id ON mappings(primary_id);

        PRAGMA user_version = 1;
        "#,
    )?;
    Ok(())
}

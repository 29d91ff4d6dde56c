//! State database: working-copy registry and cache event log
//!
//! A small SQLite database at `<home>/state.db`. The registry maps working
//! copies to their canonical root; the event log records cache hits and
//! misses for `mono cache stats`. Event recording must never block cache
//! operations; callers log and swallow append failures.

use crate::cache::paths;
use crate::error::{MonoError, MonoResult};
use chrono::{DateTime, NaiveDateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use std::time::Duration;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS environments (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    path TEXT UNIQUE NOT NULL,
    container_project TEXT,
    root_path TEXT,
    created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
);

CREATE TABLE IF NOT EXISTS cache_events (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    timestamp DATETIME DEFAULT CURRENT_TIMESTAMP,
    event TEXT NOT NULL,
    project_id TEXT NOT NULL,
    artifact TEXT NOT NULL,
    cache_key TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_cache_events_key
    ON cache_events(project_id, artifact, cache_key);
";

/// Cache event kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheEvent {
    Hit,
    Miss,
}

impl CacheEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hit => "hit",
            Self::Miss => "miss",
        }
    }
}

/// One registered working copy
#[derive(Debug, Clone)]
pub struct Environment {
    pub id: i64,
    pub path: PathBuf,
    pub container_project: Option<String>,
    pub root_path: Option<PathBuf>,
}

/// Aggregated hit/miss statistics for one cache entry
#[derive(Debug, Clone)]
pub struct CacheStats {
    pub project: String,
    pub artifact: String,
    pub cache_key: String,
    pub hits: u64,
    pub misses: u64,
    pub last_used: DateTime<Utc>,
}

/// Handle to the state database
pub struct Db {
    conn: Connection,
}

impl Db {
    /// Open (and initialize) the database under the default mono home
    pub fn open() -> MonoResult<Self> {
        let home = paths::mono_home()?;
        std::fs::create_dir_all(&home)
            .map_err(|e| MonoError::io(format!("creating {}", home.display()), e))?;
        Self::open_at(&paths::db_path(&home))
    }

    /// Open (and initialize) the database at an explicit path
    pub fn open_at(path: &Path) -> MonoResult<Self> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(Duration::from_secs(5))?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn })
    }

    // --- environment registry ---

    pub fn insert_environment(
        &self,
        path: &Path,
        container_project: Option<&str>,
        root_path: Option<&Path>,
    ) -> MonoResult<i64> {
        self.conn.execute(
            "INSERT INTO environments (path, container_project, root_path) VALUES (?1, ?2, ?3)",
            params![
                path.to_string_lossy().into_owned(),
                container_project,
                root_path.map(|p| p.to_string_lossy().into_owned()),
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn environment_exists(&self, path: &Path) -> MonoResult<bool> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM environments WHERE path = ?1",
            params![path.to_string_lossy().into_owned()],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    pub fn environment_by_path(&self, path: &Path) -> MonoResult<Option<Environment>> {
        let env = self
            .conn
            .query_row(
                "SELECT id, path, container_project, root_path
                 FROM environments WHERE path = ?1",
                params![path.to_string_lossy().into_owned()],
                row_to_environment,
            )
            .optional()?;
        Ok(env)
    }

    pub fn list_environments(&self) -> MonoResult<Vec<Environment>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, path, container_project, root_path
             FROM environments ORDER BY created_at DESC",
        )?;
        let envs = stmt
            .query_map([], row_to_environment)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(envs)
    }

    pub fn delete_environment(&self, path: &Path) -> MonoResult<()> {
        self.conn.execute(
            "DELETE FROM environments WHERE path = ?1",
            params![path.to_string_lossy().into_owned()],
        )?;
        Ok(())
    }

    /// Distinct root paths across all registered environments
    pub fn all_root_paths(&self) -> MonoResult<Vec<PathBuf>> {
        let mut stmt = self.conn.prepare(
            "SELECT DISTINCT root_path FROM environments
             WHERE root_path IS NOT NULL AND root_path != ''",
        )?;
        let paths = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(paths.into_iter().map(PathBuf::from).collect())
    }

    // --- cache event log ---

    pub fn record_cache_event(
        &self,
        event: CacheEvent,
        project: &str,
        artifact: &str,
        cache_key: &str,
    ) -> MonoResult<()> {
        self.conn.execute(
            "INSERT INTO cache_events (event, project_id, artifact, cache_key)
             VALUES (?1, ?2, ?3, ?4)",
            params![event.as_str(), project, artifact, cache_key],
        )?;
        Ok(())
    }

    pub fn cache_stats(&self) -> MonoResult<Vec<CacheStats>> {
        let mut stmt = self.conn.prepare(
            "SELECT
                project_id,
                artifact,
                cache_key,
                SUM(CASE WHEN event = 'hit' THEN 1 ELSE 0 END) AS hits,
                SUM(CASE WHEN event = 'miss' THEN 1 ELSE 0 END) AS misses,
                MAX(timestamp) AS last_used
             FROM cache_events
             GROUP BY project_id, artifact, cache_key
             ORDER BY last_used DESC",
        )?;

        let stats = stmt
            .query_map([], |row| {
                let last_used: String = row.get(5)?;
                Ok((
                    CacheStats {
                        project: row.get(0)?,
                        artifact: row.get(1)?,
                        cache_key: row.get(2)?,
                        hits: row.get::<_, i64>(3)? as u64,
                        misses: row.get::<_, i64>(4)? as u64,
                        last_used: Utc::now(),
                    },
                    last_used,
                ))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        stats
            .into_iter()
            .map(|(mut entry, raw)| {
                let parsed = NaiveDateTime::parse_from_str(&raw, "%Y-%m-%d %H:%M:%S")
                    .map_err(|e| MonoError::Internal(format!("bad timestamp {raw:?}: {e}")))?;
                entry.last_used = parsed.and_utc();
                Ok(entry)
            })
            .collect()
    }

    pub fn delete_cache_events(
        &self,
        project: &str,
        artifact: &str,
        cache_key: &str,
    ) -> MonoResult<()> {
        self.conn.execute(
            "DELETE FROM cache_events
             WHERE project_id = ?1 AND artifact = ?2 AND cache_key = ?3",
            params![project, artifact, cache_key],
        )?;
        Ok(())
    }

    pub fn delete_all_cache_events(&self) -> MonoResult<()> {
        self.conn.execute("DELETE FROM cache_events", [])?;
        Ok(())
    }
}

fn row_to_environment(row: &rusqlite::Row<'_>) -> rusqlite::Result<Environment> {
    Ok(Environment {
        id: row.get(0)?,
        path: PathBuf::from(row.get::<_, String>(1)?),
        container_project: row.get(2)?,
        root_path: row.get::<_, Option<String>>(3)?.map(PathBuf::from),
    })
}

//! Persistent key/value cache with validity tags, backed by SQLite.

use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;
use tracing::{debug, warn};
use crate::utils::BenchResult;

/// How long a writer waits for another process holding the database lock.
const BUSY_TIMEOUT: Duration = Duration::from_secs(30);

/// Persistent mapping `(namespace, key) -> (value, etag)`.
///
/// Keys, etags and values are stored as canonical JSON. A lookup only hits
/// when the stored etag equals the requested one, so changing anything that
/// feeds the etag invalidates the entry. Entries never expire otherwise.
///
/// The connection sits behind a mutex; it is never held while computing a
/// value, so two callers missing the same key may both compute it and the
/// last write wins.
pub struct CacheStore {
    conn: Mutex<Connection>,
    db_path: Option<PathBuf>,
}

impl CacheStore {
    /// Opens (creating if needed) the cache database at `path`.
    pub fn open(path: impl AsRef<Path>) -> BenchResult<Self> {
        let db_path = path.as_ref().to_path_buf();
        let conn = Connection::open(&db_path)?;
        Self::init(conn, Some(db_path))
    }

    /// Opens a throwaway in-memory cache.
    pub fn open_in_memory() -> BenchResult<Self> {
        Self::init(Connection::open_in_memory()?, None)
    }

    fn init(conn: Connection, db_path: Option<PathBuf>) -> BenchResult<Self> {
        // Reports "memory" for in-memory databases, which is fine.
        let mode: String = conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        conn.busy_timeout(BUSY_TIMEOUT)?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS entries (
                namespace   TEXT NOT NULL,
                key         TEXT NOT NULL,
                etag        TEXT NOT NULL,
                value       TEXT NOT NULL,
                PRIMARY KEY (namespace, key)
            )",
            [],
        )?;

        debug!(
            path = ?db_path,
            journal_mode = %mode,
            "Cache database initialized"
        );

        Ok(Self {
            conn: Mutex::new(conn),
            db_path,
        })
    }

    /// Path of the database file, `None` for in-memory caches.
    pub fn path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    /// Returns the stored value if present under `etag`.
    ///
    /// A stored value that no longer deserializes into `T` counts as a miss.
    pub fn get<K, E, T>(&self, namespace: &str, key: &K, etag: &E) -> BenchResult<Option<T>>
    where
        K: Serialize + ?Sized,
        E: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let key = serde_json::to_string(key)?;
        let etag = serde_json::to_string(etag)?;

        let row: Option<(String, String)> = {
            let conn = self.conn.lock()?;
            conn.query_row(
                "SELECT etag, value FROM entries WHERE namespace = ?1 AND key = ?2",
                params![namespace, key],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?
        };

        match row {
            Some((stored_etag, value)) if stored_etag == etag => {
                match serde_json::from_str(&value) {
                    Ok(value) => Ok(Some(value)),
                    Err(e) => {
                        warn!(namespace, key = %key, "Discarding undecodable cache entry: {}", e);
                        Ok(None)
                    }
                }
            }
            Some(_) => {
                debug!(namespace, key = %key, "Cache entry is stale");
                Ok(None)
            }
            None => Ok(None),
        }
    }

    /// Stores `value` under `etag`, replacing whatever was there.
    pub fn set<K, E, T>(&self, namespace: &str, key: &K, etag: &E, value: &T) -> BenchResult<()>
    where
        K: Serialize + ?Sized,
        E: Serialize + ?Sized,
        T: Serialize + ?Sized,
    {
        let key = serde_json::to_string(key)?;
        let etag = serde_json::to_string(etag)?;
        let value = serde_json::to_string(value)?;

        let conn = self.conn.lock()?;
        conn.execute(
            "INSERT OR REPLACE INTO entries (namespace, key, etag, value) VALUES (?1, ?2, ?3, ?4)",
            params![namespace, key, etag, value],
        )?;
        Ok(())
    }

    /// Returns the value stored under `etag`, or computes, stores and returns it.
    ///
    /// `compute` runs at most once per call. Errors from `compute` are
    /// returned unchanged and nothing is stored.
    pub fn get_or_compute<K, E, T, F>(&self, namespace: &str, key: &K, etag: &E, compute: F) -> BenchResult<T>
    where
        K: Serialize + ?Sized,
        E: Serialize + ?Sized,
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> BenchResult<T>,
    {
        if let Some(value) = self.get(namespace, key, etag)? {
            debug!(namespace, "Cache hit");
            return Ok(value);
        }

        debug!(namespace, "Cache miss");
        let value = compute()?;
        self.set(namespace, key, etag, &value)?;
        Ok(value)
    }

    /// Number of entries in `namespace`, regardless of etag.
    pub fn count(&self, namespace: &str) -> BenchResult<usize> {
        let conn = self.conn.lock()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM entries WHERE namespace = ?1",
            params![namespace],
            |row| row.get(0),
        )?;
        Ok(usize::try_from(count).unwrap_or(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use tempfile::tempdir;

    #[test]
    fn computes_once_per_etag() {
        let cache = CacheStore::open_in_memory().unwrap();
        let calls = Cell::new(0);
        let compute = || {
            calls.set(calls.get() + 1);
            Ok(vec![1u64, 2, 3])
        };

        let first: Vec<u64> = cache.get_or_compute("ns", &("k", 1), "v1", compute).unwrap();
        let second: Vec<u64> = cache.get_or_compute("ns", &("k", 1), "v1", compute).unwrap();
        assert_eq!(first, second);
        assert_eq!(calls.get(), 1);

        let _: Vec<u64> = cache.get_or_compute("ns", &("k", 1), "v2", compute).unwrap();
        assert_eq!(calls.get(), 2);
        assert_eq!(cache.count("ns").unwrap(), 1);
    }

    #[test]
    fn namespaces_are_independent() {
        let cache = CacheStore::open_in_memory().unwrap();
        cache.set("a", "key", &(), &1u32).unwrap();
        cache.set("b", "key", &(), &2u32).unwrap();

        assert_eq!(cache.get::<_, _, u32>("a", "key", &()).unwrap(), Some(1));
        assert_eq!(cache.get::<_, _, u32>("b", "key", &()).unwrap(), Some(2));
        assert_eq!(cache.get::<_, _, u32>("c", "key", &()).unwrap(), None);
    }

    #[test]
    fn compute_errors_are_not_stored() {
        let cache = CacheStore::open_in_memory().unwrap();
        let result: BenchResult<u32> = cache.get_or_compute("ns", "k", &(), || {
            Err(crate::utils::BenchError::command("boom"))
        });
        assert!(result.is_err());
        assert_eq!(cache.count("ns").unwrap(), 0);
    }

    #[test]
    fn undecodable_values_are_misses() {
        let cache = CacheStore::open_in_memory().unwrap();
        cache.set("ns", "k", &(), "not a number").unwrap();
        assert_eq!(cache.get::<_, _, u32>("ns", "k", &()).unwrap(), None);
    }

    #[test]
    fn entries_survive_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cache.sqlite");

        {
            let cache = CacheStore::open(&path).unwrap();
            cache.set("ns", &["x", "y"], &(3, "tag"), &0.125f64).unwrap();
        }

        let cache = CacheStore::open(&path).unwrap();
        assert_eq!(cache.path(), Some(path.as_path()));
        assert_eq!(cache.get::<_, _, f64>("ns", &["x", "y"], &(3, "tag")).unwrap(), Some(0.125));
        assert_eq!(cache.get::<_, _, f64>("ns", &["x", "y"], &(4, "tag")).unwrap(), None);
    }
}

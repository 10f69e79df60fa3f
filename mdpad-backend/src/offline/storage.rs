//! CacheStorage: named regions of cached responses in their own SQLite file
//!
//! Regions are looked up oldest first, so an install region shadows a pages
//! region created after it.

use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use std::path::Path;
use std::time::Duration;

use super::types::{CachedResponse, OfflineError};
use crate::db::StoreError;

const ACTIVE_VERSION_KEY: &str = "active_version";

pub struct CacheStorage {
    conn: Mutex<Connection>,
}

impl CacheStorage {
    pub fn open(path: &Path) -> Result<Self, OfflineError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(StoreError::Io)?;
            }
        }
        let conn = Connection::open(path)?;
        conn.busy_timeout(Duration::from_secs(5))?;
        Self::init(conn)
    }

    pub fn open_in_memory() -> Result<Self, OfflineError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, OfflineError> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS cache_regions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL UNIQUE
            );
            CREATE TABLE IF NOT EXISTS cache_entries (
                region_id INTEGER NOT NULL,
                request_key TEXT NOT NULL,
                status INTEGER NOT NULL,
                headers TEXT NOT NULL,
                body BLOB NOT NULL,
                PRIMARY KEY (region_id, request_key)
            );
            CREATE TABLE IF NOT EXISTS cache_meta (
                key TEXT PRIMARY KEY NOT NULL,
                value TEXT NOT NULL
            );",
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Id of region `name`, creating it if needed
    pub fn open_region(&self, name: &str) -> Result<i64, OfflineError> {
        let conn = self.conn.lock();
        Ok(region_id(&conn, name)?)
    }

    /// Region names in creation order
    pub fn region_names(&self) -> Result<Vec<String>, OfflineError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare("SELECT name FROM cache_regions ORDER BY id ASC")?;
        let names = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(names)
    }

    /// Remove a region and its entries. Returns false when it did not exist.
    pub fn delete_region(&self, name: &str) -> Result<bool, OfflineError> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let id: Option<i64> = tx
            .query_row(
                "SELECT id FROM cache_regions WHERE name = ?1",
                [name],
                |row| row.get(0),
            )
            .optional()?;
        let Some(id) = id else {
            return Ok(false);
        };
        tx.execute("DELETE FROM cache_entries WHERE region_id = ?1", [id])?;
        tx.execute("DELETE FROM cache_regions WHERE id = ?1", [id])?;
        tx.commit()?;
        Ok(true)
    }

    /// First entry for `request_key` across all regions, oldest region first
    pub fn match_request(&self, request_key: &str) -> Result<Option<CachedResponse>, OfflineError> {
        let conn = self.conn.lock();
        let row = conn
            .query_row(
                "SELECT e.status, e.headers, e.body
                 FROM cache_entries e JOIN cache_regions r ON r.id = e.region_id
                 WHERE e.request_key = ?1
                 ORDER BY r.id ASC LIMIT 1",
                [request_key],
                |row| {
                    Ok((
                        row.get::<_, u16>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, Vec<u8>>(2)?,
                    ))
                },
            )
            .optional()?;

        match row {
            Some((status, headers, body)) => Ok(Some(CachedResponse {
                status,
                headers: serde_json::from_str(&headers).map_err(StoreError::Serde)?,
                body,
            })),
            None => Ok(None),
        }
    }

    pub fn put(
        &self,
        region: &str,
        request_key: &str,
        response: &CachedResponse,
    ) -> Result<(), OfflineError> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let id = region_id(&tx, region)?;
        insert_entry(&tx, id, request_key, response)?;
        tx.commit()?;
        Ok(())
    }

    /// Store every entry in one transaction; nothing lands if any insert fails
    pub fn put_all(
        &self,
        region: &str,
        entries: &[(String, CachedResponse)],
    ) -> Result<(), OfflineError> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let id = region_id(&tx, region)?;
        for (request_key, response) in entries {
            insert_entry(&tx, id, request_key, response)?;
        }
        tx.commit()?;
        Ok(())
    }

    pub fn entry_count(&self, region: &str) -> Result<usize, OfflineError> {
        let conn = self.conn.lock();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM cache_entries e JOIN cache_regions r ON r.id = e.region_id
             WHERE r.name = ?1",
            [region],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    /// Version recorded by the last successful activation
    pub fn active_version(&self) -> Result<Option<String>, OfflineError> {
        let conn = self.conn.lock();
        let version = conn
            .query_row(
                "SELECT value FROM cache_meta WHERE key = ?1",
                [ACTIVE_VERSION_KEY],
                |row| row.get(0),
            )
            .optional()?;
        Ok(version)
    }

    pub fn set_active_version(&self, version: &str) -> Result<(), OfflineError> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO cache_meta (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![ACTIVE_VERSION_KEY, version],
        )?;
        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn with_conn<T>(&self, f: impl FnOnce(&Connection) -> T) -> T {
        f(&self.conn.lock())
    }
}

fn region_id(conn: &Connection, name: &str) -> rusqlite::Result<i64> {
    conn.execute(
        "INSERT OR IGNORE INTO cache_regions (name) VALUES (?1)",
        [name],
    )?;
    conn.query_row(
        "SELECT id FROM cache_regions WHERE name = ?1",
        [name],
        |row| row.get(0),
    )
}

fn insert_entry(
    conn: &Connection,
    region_id: i64,
    request_key: &str,
    response: &CachedResponse,
) -> Result<(), OfflineError> {
    let headers = serde_json::to_string(&response.headers).map_err(StoreError::Serde)?;
    conn.execute(
        "INSERT INTO cache_entries (region_id, request_key, status, headers, body)
         VALUES (?1, ?2, ?3, ?4, ?5)
         ON CONFLICT(region_id, request_key) DO UPDATE SET
            status = excluded.status,
            headers = excluded.headers,
            body = excluded.body",
        params![region_id, request_key, response.status, headers, response.body],
    )?;
    Ok(())
}

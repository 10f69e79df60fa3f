//! KvStore: flat key/value table on SQLite
//!
//! One database file, one table of `key -> JSON value`. Every public call runs
//! in its own transaction; `tx` and `for_each` group several steps into one.
//! The connection pool is opened lazily on first use and memoized.

use once_cell::sync::OnceCell;
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::error::{Result, StoreError};
use crate::logging::Logger;

pub type DbPool = Pool<SqliteConnectionManager>;
pub type DbConn = PooledConnection<SqliteConnectionManager>;

const MAX_CONNECTIONS: u32 = 4;
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// What the `for_each` driver does with the entry it just visited
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    Keep,
    Replace(Value),
    Delete,
}

pub struct KvStore {
    path: PathBuf,
    pool: OnceCell<DbPool>,
    log: Logger,
}

impl KvStore {
    /// Create a store for `path`. Nothing is opened until the first operation.
    pub fn new(path: impl Into<PathBuf>, log: Logger) -> Self {
        Self {
            path: path.into(),
            pool: OnceCell::new(),
            log,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Open (creating if absent) the database and its table.
    ///
    /// Concurrent first calls block on the same initializer, so the schema is
    /// created once. A failed open is not memoized.
    fn pool(&self) -> Result<&DbPool> {
        self.pool.get_or_try_init(|| {
            let pool = open_pool(&self.path)?;
            self.log
                .trace(format_args!("Opened key/value store at {:?}", self.path));
            Ok(pool)
        })
    }

    fn conn(&self) -> Result<DbConn> {
        Ok(self.pool()?.get()?)
    }

    /// Run `f` in a read-only (deferred) transaction
    fn read<T>(&self, f: impl FnOnce(&KvTable<'_>) -> Result<T>) -> Result<T> {
        let mut conn = self.conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Deferred)?;
        let out = f(&KvTable::new(&tx))?;
        tx.commit()?;
        Ok(out)
    }

    /// Run `f` in a read-write transaction. The write lock is taken up front,
    /// so concurrent writers are serialized by SQLite. Dropping the transaction
    /// on error rolls it back.
    fn write<T>(&self, f: impl FnOnce(&KvTable<'_>) -> Result<T>) -> Result<T> {
        let mut conn = self.conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let out = f(&KvTable::new(&tx))?;
        tx.commit()?;
        Ok(out)
    }

    /// Stored value for `key`, or `None` when absent
    pub fn get(&self, key: &str) -> Result<Option<Value>> {
        self.read(|t| t.get(key))
    }

    /// Upsert `value` under `key`
    pub fn set(&self, key: &str, value: &Value) -> Result<()> {
        self.write(|t| t.set(key, value))
    }

    /// Remove `key`. Removing an absent key is not an error.
    pub fn delete(&self, key: &str) -> Result<()> {
        self.write(|t| t.delete(key))
    }

    /// Remove every entry
    pub fn clear(&self) -> Result<()> {
        self.write(|t| t.clear())
    }

    /// All keys. Callers must not rely on the order.
    pub fn keys(&self) -> Result<Vec<String>> {
        self.read(|t| t.keys())
    }

    /// Number of entries
    pub fn size(&self) -> Result<usize> {
        self.read(|t| t.size())
    }

    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        self.read(|t| t.get_as(key))
    }

    pub fn set_as<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<()> {
        self.write(|t| t.set_as(key, value))
    }

    /// Visit every entry in key order inside one read-write transaction.
    ///
    /// The visitor sees `(key, value)` and answers with an [`Action`], which is
    /// applied before moving on. Nothing is committed until the last entry has
    /// been visited; any error rolls back every action of the scan.
    /// Returns the number of visited entries.
    pub fn for_each<F>(&self, reverse: bool, mut visitor: F) -> Result<usize>
    where
        F: FnMut(&str, Value) -> Result<Action>,
    {
        self.write(|table| {
            let mut cursor = Cursor::new(reverse);
            let mut visited = 0;
            while let Some((key, value)) = cursor.advance(table.conn)? {
                match visitor(&key, value)? {
                    Action::Keep => {}
                    Action::Replace(new_value) => table.set(&key, &new_value)?,
                    Action::Delete => table.delete(&key)?,
                }
                visited += 1;
            }
            Ok(visited)
        })
    }

    /// `for_each` in descending key order
    pub fn rev_each<F>(&self, visitor: F) -> Result<usize>
    where
        F: FnMut(&str, Value) -> Result<Action>,
    {
        self.for_each(true, visitor)
    }

    /// Run a composite read-modify-write sequence atomically.
    ///
    /// Everything the callback does through the table handle commits when it
    /// returns `Ok` and is rolled back when it returns `Err`.
    pub fn tx<T, F>(&self, callback: F) -> Result<T>
    where
        F: FnOnce(&KvTable<'_>) -> Result<T>,
    {
        self.write(callback)
    }
}

fn open_pool(path: &Path) -> Result<DbPool> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let manager = SqliteConnectionManager::file(path).with_init(|conn| {
        conn.busy_timeout(BUSY_TIMEOUT)?;
        // WAL lets readers overlap a writer
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| {
            row.get::<_, String>(0)
        })?;
        Ok(())
    });

    let pool = Pool::builder().max_size(MAX_CONNECTIONS).build(manager)?;

    let conn = pool.get()?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS kv_store (
            key TEXT PRIMARY KEY NOT NULL,
            value TEXT NOT NULL
        )",
        [],
    )?;

    Ok(pool)
}

/// Handle on the table, scoped to one open transaction
pub struct KvTable<'t> {
    conn: &'t Connection,
}

impl<'t> KvTable<'t> {
    fn new(conn: &'t Connection) -> Self {
        Self { conn }
    }

    pub fn get(&self, key: &str) -> Result<Option<Value>> {
        let raw: Option<String> = self
            .conn
            .query_row(
                "SELECT value FROM kv_store WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;

        match raw {
            Some(text) => Ok(Some(serde_json::from_str(&text)?)),
            None => Ok(None),
        }
    }

    pub fn set(&self, key: &str, value: &Value) -> Result<()> {
        let text = serde_json::to_string(value)?;
        self.conn.execute(
            "INSERT INTO kv_store (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![key, text],
        )?;
        Ok(())
    }

    pub fn delete(&self, key: &str) -> Result<()> {
        self.conn
            .execute("DELETE FROM kv_store WHERE key = ?1", params![key])?;
        Ok(())
    }

    pub fn clear(&self) -> Result<()> {
        self.conn.execute("DELETE FROM kv_store", [])?;
        Ok(())
    }

    pub fn keys(&self) -> Result<Vec<String>> {
        let mut stmt = self.conn.prepare("SELECT key FROM kv_store ORDER BY key")?;
        let keys = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(keys)
    }

    pub fn size(&self) -> Result<usize> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM kv_store", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.get(key)? {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }

    pub fn set_as<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<()> {
        self.set(key, &serde_json::to_value(value)?)
    }
}

/// Keyset cursor: each step fetches the first row strictly after (or before,
/// when reversed) the last visited key, so rows replaced or deleted by the
/// visitor never disturb the walk.
struct Cursor {
    reverse: bool,
    last: Option<String>,
}

impl Cursor {
    fn new(reverse: bool) -> Self {
        Self {
            reverse,
            last: None,
        }
    }

    fn advance(&mut self, conn: &Connection) -> Result<Option<(String, Value)>> {
        let sql = match (self.reverse, self.last.is_some()) {
            (false, false) => "SELECT key, value FROM kv_store ORDER BY key ASC LIMIT 1",
            (false, true) => {
                "SELECT key, value FROM kv_store WHERE key > ?1 ORDER BY key ASC LIMIT 1"
            }
            (true, false) => "SELECT key, value FROM kv_store ORDER BY key DESC LIMIT 1",
            (true, true) => {
                "SELECT key, value FROM kv_store WHERE key < ?1 ORDER BY key DESC LIMIT 1"
            }
        };

        let mut stmt = conn.prepare(sql)?;
        let row_to_pair = |row: &rusqlite::Row<'_>| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        };
        let row = match &self.last {
            Some(last) => stmt.query_row(params![last], row_to_pair).optional()?,
            None => stmt.query_row([], row_to_pair).optional()?,
        };

        match row {
            Some((key, text)) => {
                let value = serde_json::from_str(&text).map_err(StoreError::from)?;
                self.last = Some(key.clone());
                Ok(Some((key, value)))
            }
            None => Ok(None),
        }
    }
}

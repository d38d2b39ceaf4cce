//! The key-value box abstraction and its backends.
//!
//! The cache layer only ever sees `(box, key) -> bytes`; what sits behind
//! that is a storage detail. [`SqliteStore`] is the durable backend,
//! [`MemoryStore`] serves tests and ephemeral runs.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

use rusqlite::{Connection, OptionalExtension};
use time::OffsetDateTime;
use tracing::info;

use crate::error::{Error, Result};

/// Box holding cached station snapshots.
pub const BOX_STATIONS: &str = "stations";

/// Box holding the latest observation per device.
pub const BOX_OBSERVATIONS: &str = "observations";

/// Box holding forecast snapshots per station.
pub const BOX_FORECASTS: &str = "forecasts";

/// Box holding user settings.
pub const BOX_SETTINGS: &str = "settings";

const KNOWN_BOXES: [&str; 4] = [BOX_STATIONS, BOX_OBSERVATIONS, BOX_FORECASTS, BOX_SETTINGS];

/// A named-box key-value store.
///
/// Implementations must be safe to share across tasks; writes from the
/// orchestrator happen off the transport receive loops.
pub trait KvStore: Send + Sync {
    /// Read a value, `None` when absent.
    fn get(&self, box_name: &str, key: &str) -> Result<Option<Vec<u8>>>;

    /// Insert or replace a value.
    fn put(&self, box_name: &str, key: &str, value: &[u8]) -> Result<()>;

    /// Remove a single key. Removing an absent key is not an error.
    fn delete(&self, box_name: &str, key: &str) -> Result<()>;

    /// Remove every key in a box.
    fn clear(&self, box_name: &str) -> Result<()>;
}

fn check_box(box_name: &str) -> Result<()> {
    if KNOWN_BOXES.contains(&box_name) {
        Ok(())
    } else {
        Err(Error::UnknownBox(box_name.to_string()))
    }
}

/// Current schema version.
const SCHEMA_VERSION: i32 = 1;

/// SQLite-backed box store.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open or create a database at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            if !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|e| Error::CreateDirectory {
                    path: parent.to_path_buf(),
                    source: e,
                })?;
            }
        }

        info!("Opening cache database at {}", path.display());
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;",
        )?;

        initialize_schema(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open the default database location.
    pub fn open_default() -> Result<Self> {
        Self::open(crate::default_db_path())
    }

    /// Open an in-memory database (for testing).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

fn initialize_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS schema_version (
            id INTEGER PRIMARY KEY CHECK (id = 1),
            version INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS kv (
            box TEXT NOT NULL,
            key TEXT NOT NULL,
            value BLOB NOT NULL,
            updated_at INTEGER NOT NULL,
            PRIMARY KEY (box, key)
        );
        "#,
    )?;

    conn.execute(
        "INSERT OR REPLACE INTO schema_version (id, version) VALUES (1, ?)",
        [SCHEMA_VERSION],
    )?;

    Ok(())
}

impl KvStore for SqliteStore {
    fn get(&self, box_name: &str, key: &str) -> Result<Option<Vec<u8>>> {
        check_box(box_name)?;
        let conn = self.conn.lock().expect("cache connection poisoned");
        let value = conn
            .query_row(
                "SELECT value FROM kv WHERE box = ?1 AND key = ?2",
                rusqlite::params![box_name, key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    fn put(&self, box_name: &str, key: &str, value: &[u8]) -> Result<()> {
        check_box(box_name)?;
        let now = OffsetDateTime::now_utc().unix_timestamp();
        let conn = self.conn.lock().expect("cache connection poisoned");
        conn.execute(
            "INSERT INTO kv (box, key, value, updated_at) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(box, key) DO UPDATE SET value = ?3, updated_at = ?4",
            rusqlite::params![box_name, key, value, now],
        )?;
        Ok(())
    }

    fn delete(&self, box_name: &str, key: &str) -> Result<()> {
        check_box(box_name)?;
        let conn = self.conn.lock().expect("cache connection poisoned");
        conn.execute(
            "DELETE FROM kv WHERE box = ?1 AND key = ?2",
            rusqlite::params![box_name, key],
        )?;
        Ok(())
    }

    fn clear(&self, box_name: &str) -> Result<()> {
        check_box(box_name)?;
        let conn = self.conn.lock().expect("cache connection poisoned");
        conn.execute("DELETE FROM kv WHERE box = ?1", [box_name])?;
        Ok(())
    }
}

/// In-memory box store for tests and ephemeral runs.
#[derive(Default)]
pub struct MemoryStore {
    boxes: Mutex<HashMap<(String, String), Vec<u8>>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl KvStore for MemoryStore {
    fn get(&self, box_name: &str, key: &str) -> Result<Option<Vec<u8>>> {
        check_box(box_name)?;
        let boxes = self.boxes.lock().expect("memory store poisoned");
        Ok(boxes.get(&(box_name.to_string(), key.to_string())).cloned())
    }

    fn put(&self, box_name: &str, key: &str, value: &[u8]) -> Result<()> {
        check_box(box_name)?;
        let mut boxes = self.boxes.lock().expect("memory store poisoned");
        boxes.insert((box_name.to_string(), key.to_string()), value.to_vec());
        Ok(())
    }

    fn delete(&self, box_name: &str, key: &str) -> Result<()> {
        check_box(box_name)?;
        let mut boxes = self.boxes.lock().expect("memory store poisoned");
        boxes.remove(&(box_name.to_string(), key.to_string()));
        Ok(())
    }

    fn clear(&self, box_name: &str) -> Result<()> {
        check_box(box_name)?;
        let mut boxes = self.boxes.lock().expect("memory store poisoned");
        boxes.retain(|(b, _), _| b != box_name);
        Ok(())
    }
}

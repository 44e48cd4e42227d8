//! SQLite-based store implementation

use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, warn};

use crate::{Store, StoreError, StoreResult};

/// SQLite-based store
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open or create a store at the given path
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let conn = Connection::open(path)?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    /// Create an in-memory store (for testing)
    pub fn in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }

    fn init_schema(&self) -> StoreResult<()> {
        let conn = self.lock()?;

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS kv (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
            );
            "#,
        )?;

        debug!("Store schema initialized");
        Ok(())
    }
}

impl Store for SqliteStore {
    fn get(&self, key: &str) -> StoreResult<Option<String>> {
        let conn = self.lock()?;

        let value = conn
            .query_row("SELECT value FROM kv WHERE key = ?", params![key], |row| {
                row.get(0)
            })
            .optional()?;

        Ok(value)
    }

    fn set(&self, key: &str, value: &str) -> StoreResult<()> {
        let conn = self.lock()?;

        conn.execute(
            "INSERT INTO kv (key, value, updated_at) VALUES (?, ?, CURRENT_TIMESTAMP)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            params![key, value],
        )?;

        debug!(key, "Value stored");
        Ok(())
    }

    fn remove(&self, key: &str) -> StoreResult<()> {
        let conn = self.lock()?;
        conn.execute("DELETE FROM kv WHERE key = ?", params![key])?;
        debug!(key, "Value removed");
        Ok(())
    }

    fn is_healthy(&self) -> bool {
        match self.lock() {
            Ok(conn) => match conn.query_row("SELECT 1", [], |_| Ok(())) {
                Ok(_) => true,
                Err(e) => {
                    warn!(error = %e, "Store health check failed");
                    false
                }
            },
            Err(_) => {
                warn!("Store lock poisoned");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys;
    use serde::{Deserialize, Serialize};

    #[test]
    fn test_in_memory_store() {
        let store = SqliteStore::in_memory().unwrap();
        assert!(store.is_healthy());
    }

    #[test]
    fn test_set_get_remove() {
        let store = SqliteStore::in_memory().unwrap();

        assert_eq!(store.get(keys::ACCESS_TOKEN).unwrap(), None);

        store.set(keys::ACCESS_TOKEN, "tok-1").unwrap();
        assert_eq!(store.get(keys::ACCESS_TOKEN).unwrap().as_deref(), Some("tok-1"));

        store.set(keys::ACCESS_TOKEN, "tok-2").unwrap();
        assert_eq!(store.get(keys::ACCESS_TOKEN).unwrap().as_deref(), Some("tok-2"));

        store.remove(keys::ACCESS_TOKEN).unwrap();
        assert_eq!(store.get(keys::ACCESS_TOKEN).unwrap(), None);

        // Removing again is fine
        store.remove(keys::ACCESS_TOKEN).unwrap();
    }

    #[test]
    fn test_typed_helpers() {
        let store = SqliteStore::in_memory().unwrap();
        let store: &dyn Store = &store;

        store.set_i64(keys::TOKEN_EXPIRES_AT, 1_750_000_000_000).unwrap();
        assert_eq!(
            store.get_i64(keys::TOKEN_EXPIRES_AT).unwrap(),
            Some(1_750_000_000_000)
        );

        store.set_bool(keys::SHOW_DEBUG, true).unwrap();
        assert_eq!(store.get_bool(keys::SHOW_DEBUG).unwrap(), Some(true));

        store.set(keys::SHOW_LOADING, "garbage").unwrap();
        assert_eq!(store.get_bool(keys::SHOW_LOADING).unwrap(), None);
    }

    #[test]
    fn test_json_values() {
        #[derive(Debug, PartialEq, Serialize, Deserialize)]
        struct Layout {
            left: u8,
            middle: u8,
            right: u8,
        }

        let store = SqliteStore::in_memory().unwrap();
        let store: &dyn Store = &store;

        let layout = Layout {
            left: 2,
            middle: 0,
            right: 1,
        };
        store.set_json(keys::MEASUREMENT_LAYOUT, &layout).unwrap();
        let loaded: Option<Layout> = store.get_json(keys::MEASUREMENT_LAYOUT).unwrap();
        assert_eq!(loaded, Some(layout));

        store.set(keys::MEASUREMENT_LAYOUT, "{not json").unwrap();
        let broken: StoreResult<Option<Layout>> = store.get_json(keys::MEASUREMENT_LAYOUT);
        assert!(matches!(broken, Err(StoreError::Serialization(_))));
    }

    #[test]
    fn test_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ringlink.db");

        {
            let store = SqliteStore::open(&path).unwrap();
            store.set(keys::LAST_UPDATE, "1750000000000").unwrap();
        }

        let store = SqliteStore::open(&path).unwrap();
        assert_eq!(
            store.get(keys::LAST_UPDATE).unwrap().as_deref(),
            Some("1750000000000")
        );
    }
}

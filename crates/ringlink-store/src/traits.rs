//! Store trait definitions

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::StoreResult;

/// Key-value store for persisted local state
pub trait Store: Send + Sync {
    /// Get the value stored under `key`
    fn get(&self, key: &str) -> StoreResult<Option<String>>;

    /// Store `value` under `key`, replacing any previous value
    fn set(&self, key: &str, value: &str) -> StoreResult<()>;

    /// Remove `key`; removing an absent key is not an error
    fn remove(&self, key: &str) -> StoreResult<()>;

    /// Check if store is healthy
    fn is_healthy(&self) -> bool;
}

impl<'a> dyn Store + 'a {
    /// Get and deserialize a JSON value
    pub fn get_json<T: DeserializeOwned>(&self, key: &str) -> StoreResult<Option<T>> {
        match self.get(key)? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    /// Serialize and store a JSON value
    pub fn set_json<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> StoreResult<()> {
        let raw = serde_json::to_string(value)?;
        self.set(key, &raw)
    }

    /// Get an integer value; unparseable values read as absent
    pub fn get_i64(&self, key: &str) -> StoreResult<Option<i64>> {
        Ok(self.get(key)?.and_then(|v| v.trim().parse().ok()))
    }

    pub fn set_i64(&self, key: &str, value: i64) -> StoreResult<()> {
        self.set(key, &value.to_string())
    }

    /// Get a boolean value (`true`/`false`, also `1`/`0`)
    pub fn get_bool(&self, key: &str) -> StoreResult<Option<bool>> {
        Ok(self.get(key)?.and_then(|v| match v.trim() {
            "true" | "1" => Some(true),
            "false" | "0" => Some(false),
            _ => None,
        }))
    }

    pub fn set_bool(&self, key: &str, value: bool) -> StoreResult<()> {
        self.set(key, if value { "true" } else { "false" })
    }
}

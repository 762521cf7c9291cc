//! The local key-value storage boundary: string get/set/remove by key.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use crate::database::Database;
use crate::error::{Result, StoreError};

pub trait LocalStorage: Send + Sync {
    fn get_item(&self, key: &str) -> Result<Option<String>>;
    fn set_item(&self, key: &str, value: &str) -> Result<()>;
    fn remove_item(&self, key: &str) -> Result<()>;
}

/// [`LocalStorage`] over the SQLite `kv` table.
pub struct SqliteStorage {
    db: Mutex<Database>,
}

impl SqliteStorage {
    pub fn new(db: Database) -> Self {
        Self { db: Mutex::new(db) }
    }

    fn with_db<T>(&self, f: impl FnOnce(&Database) -> Result<T>) -> Result<T> {
        let db = self.db.lock().map_err(|_| StoreError::Poisoned)?;
        f(&db)
    }
}

impl LocalStorage for SqliteStorage {
    fn get_item(&self, key: &str) -> Result<Option<String>> {
        self.with_db(|db| db.get_item(key))
    }

    fn set_item(&self, key: &str, value: &str) -> Result<()> {
        self.with_db(|db| db.set_item(key, value))
    }

    fn remove_item(&self, key: &str) -> Result<()> {
        self.with_db(|db| db.remove_item(key).map(|_| ()))
    }
}

/// Volatile [`LocalStorage`]; can be switched to fail every call.
#[derive(Default)]
pub struct MemoryStorage {
    items: Mutex<HashMap<String, String>>,
    failing: AtomicBool,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn items(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, String>>> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(StoreError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "storage unavailable",
            )));
        }
        self.items.lock().map_err(|_| StoreError::Poisoned)
    }
}

impl LocalStorage for MemoryStorage {
    fn get_item(&self, key: &str) -> Result<Option<String>> {
        Ok(self.items()?.get(key).cloned())
    }

    fn set_item(&self, key: &str, value: &str) -> Result<()> {
        self.items()?.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove_item(&self, key: &str) -> Result<()> {
        self.items()?.remove(key);
        Ok(())
    }
}

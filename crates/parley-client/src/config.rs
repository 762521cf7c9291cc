//! Client configuration loaded from environment variables.
//!
//! Every setting has a default, so the client runs with zero configuration.

use std::path::PathBuf;
use std::time::Duration;

use parley_shared::constants::{
    DEFAULT_COLLECTION, DEFAULT_DISPLAY_NAME, MAX_UPLOAD_SIZE, POLL_INTERVAL_MS,
};
use parley_store::{Database, StoreError};

#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Document-store collection holding the conversation.
    /// Env: `PARLEY_COLLECTION`
    /// Default: `messages`
    pub collection: String,

    /// Recovery poll interval while offline.
    /// Env: `PARLEY_POLL_INTERVAL_MS`
    /// Default: `1500`
    pub poll_interval: Duration,

    /// Largest attachment the uploader accepts, in bytes.
    /// Env: `PARLEY_MAX_UPLOAD_BYTES`
    /// Default: 50 MiB
    pub max_upload_bytes: usize,

    /// Where the local database lives.
    /// Env: `PARLEY_DATA_DIR`
    /// Default: the platform data directory.
    pub data_dir: Option<PathBuf>,

    /// Base directory of the filesystem blob store.
    /// Env: `PARLEY_BLOB_DIR`
    /// Default: `<data dir>/blobs`
    pub blob_dir: Option<PathBuf>,

    /// Display name used when the start screen is left blank.
    /// Env: `PARLEY_DEFAULT_NAME`
    /// Default: `User`
    pub default_display_name: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            collection: DEFAULT_COLLECTION.to_string(),
            poll_interval: Duration::from_millis(POLL_INTERVAL_MS),
            max_upload_bytes: MAX_UPLOAD_SIZE,
            data_dir: None,
            blob_dir: None,
            default_display_name: DEFAULT_DISPLAY_NAME.to_string(),
        }
    }
}

impl ClientConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(collection) = lookup("PARLEY_COLLECTION") {
            if collection.trim().is_empty() {
                tracing::warn!("Empty PARLEY_COLLECTION, using default");
            } else {
                config.collection = collection;
            }
        }

        if let Some(val) = lookup("PARLEY_POLL_INTERVAL_MS") {
            match val.parse::<u64>() {
                Ok(ms) if ms > 0 => config.poll_interval = Duration::from_millis(ms),
                _ => tracing::warn!(value = %val, "Invalid PARLEY_POLL_INTERVAL_MS, using default"),
            }
        }

        if let Some(val) = lookup("PARLEY_MAX_UPLOAD_BYTES") {
            match val.parse::<usize>() {
                Ok(n) if n > 0 => config.max_upload_bytes = n,
                _ => tracing::warn!(value = %val, "Invalid PARLEY_MAX_UPLOAD_BYTES, using default"),
            }
        }

        if let Some(path) = lookup("PARLEY_DATA_DIR").filter(|p| !p.is_empty()) {
            config.data_dir = Some(PathBuf::from(path));
        }

        if let Some(path) = lookup("PARLEY_BLOB_DIR").filter(|p| !p.is_empty()) {
            config.blob_dir = Some(PathBuf::from(path));
        }

        if let Some(name) = lookup("PARLEY_DEFAULT_NAME") {
            let name = name.trim();
            if !name.is_empty() {
                config.default_display_name = name.to_string();
            }
        }

        // RUST_LOG is read by tracing-subscriber's EnvFilter directly.

        config
    }

    pub fn data_dir(&self) -> Result<PathBuf, StoreError> {
        match &self.data_dir {
            Some(dir) => Ok(dir.clone()),
            None => Database::default_data_dir(),
        }
    }

    pub fn blob_dir(&self) -> Result<PathBuf, StoreError> {
        match &self.blob_dir {
            Some(dir) => Ok(dir.clone()),
            None => Ok(self.data_dir()?.join("blobs")),
        }
    }
}

//! Last-rendered message list, mirrored to local storage.
//!
//! Purely a warm-start aid: every call is best effort. Failures are logged
//! and read as "nothing cached"; they never reach the caller.

use std::sync::Arc;

use tracing::{debug, warn};

use parley_shared::constants::SNAPSHOT_CACHE_KEY;
use parley_shared::Message;

use crate::storage::LocalStorage;

#[derive(Clone)]
pub struct SnapshotCache {
    storage: Arc<dyn LocalStorage>,
    key: String,
}

impl SnapshotCache {
    pub fn new(storage: Arc<dyn LocalStorage>) -> Self {
        Self::with_key(storage, SNAPSHOT_CACHE_KEY)
    }

    pub fn with_key(storage: Arc<dyn LocalStorage>, key: impl Into<String>) -> Self {
        Self {
            storage,
            key: key.into(),
        }
    }

    /// Overwrite the cached list.
    pub fn save(&self, messages: &[Message]) {
        let json = match serde_json::to_string(messages) {
            Ok(json) => json,
            Err(e) => {
                warn!(error = %e, "Failed to encode message cache");
                return;
            }
        };
        match self.storage.set_item(&self.key, &json) {
            Ok(()) => debug!(count = messages.len(), "Message cache saved"),
            Err(e) => warn!(error = %e, "Failed to save message cache"),
        }
    }

    /// Cached list, or empty when nothing (readable) is cached.
    pub fn load(&self) -> Vec<Message> {
        let json = match self.storage.get_item(&self.key) {
            Ok(Some(json)) => json,
            Ok(None) => return Vec::new(),
            Err(e) => {
                warn!(error = %e, "Failed to read message cache");
                return Vec::new();
            }
        };
        serde_json::from_str(&json).unwrap_or_else(|e| {
            warn!(error = %e, "Discarding corrupt message cache");
            Vec::new()
        })
    }

    pub fn clear(&self) {
        if let Err(e) = self.storage.remove_item(&self.key) {
            warn!(error = %e, "Failed to clear message cache");
        }
    }
}

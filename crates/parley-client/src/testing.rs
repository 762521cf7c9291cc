// Test fixture wiring in-memory backends and simulated devices.

use std::sync::Arc;

use tempfile::TempDir;

use parley_media::{MediaRef, SimulatedDevices};
use parley_net::{MemoryBlobStore, MemoryDocumentStore, MemoryIdentity, MemoryReachability};
use parley_shared::{Author, ConnectivityState, PromptLog, Session, UserId};
use parley_store::{MemoryStorage, SnapshotCache};

use crate::actions::ActionHandler;
use crate::config::ClientConfig;
use crate::state::{AppContext, Backends, Devices};

pub(crate) struct Harness {
    pub dir: TempDir,
    pub documents: Arc<MemoryDocumentStore>,
    pub blobs: Arc<MemoryBlobStore>,
    pub reachability: Arc<MemoryReachability>,
    pub devices: Arc<SimulatedDevices>,
    pub prompts: Arc<PromptLog>,
    pub storage: Arc<MemoryStorage>,
    pub ctx: Arc<AppContext>,
}

impl Harness {
    pub fn new() -> Self {
        let documents = Arc::new(MemoryDocumentStore::new());
        let blobs = Arc::new(MemoryBlobStore::new("parley"));
        let reachability = Arc::new(MemoryReachability::new(ConnectivityState::Unknown));
        let devices = Arc::new(SimulatedDevices::new());
        let prompts = Arc::new(PromptLog::new());
        let storage = Arc::new(MemoryStorage::new());

        let backends = Backends {
            documents: documents.clone(),
            blobs: blobs.clone(),
            identity: Arc::new(MemoryIdentity::new()),
            reachability: reachability.clone(),
        };
        let ctx = AppContext::new(
            ClientConfig::default(),
            backends,
            Devices::simulated(devices.clone()),
            prompts.clone(),
            SnapshotCache::new(storage.clone()),
        );

        Self {
            dir: tempfile::tempdir().unwrap(),
            documents,
            blobs,
            reachability,
            devices,
            prompts,
            storage,
            ctx: Arc::new(ctx),
        }
    }

    pub fn session(&self) -> Session {
        Session {
            uid: UserId::new("u1"),
            display_name: "Ann".into(),
            background_color: "#cfdcc6".into(),
        }
    }

    pub fn handler(&self) -> ActionHandler {
        ActionHandler::new(&self.ctx, Author::new("u1", "Ann"))
    }

    pub fn cache(&self) -> SnapshotCache {
        SnapshotCache::new(self.storage.clone())
    }

    /// Write `bytes` to a file in the fixture directory.
    pub fn media_file(&self, name: &str, bytes: &[u8]) -> MediaRef {
        let path = self.dir.path().join(name);
        std::fs::write(&path, bytes).unwrap();
        MediaRef::new(path)
    }
}

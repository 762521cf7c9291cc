//! Application context shared by every screen.
//!
//! Built once at start-up and handed to screens by `Arc`. It owns the
//! backend and device handles, the prompt sink and the snapshot cache;
//! nothing in the client reaches for a global.

use std::sync::Arc;

use parley_media::{
    AttachmentUploader, AudioRecorder, DevicePermissions, MediaDevices, PermissionGate,
    RecordingSession, SimulatedDevices,
};
use parley_net::{
    BlobStore, DocumentStore, IdentityProvider, MemoryBlobStore, MemoryDocumentStore,
    MemoryIdentity, MemoryReachability, MessageChannel, Reachability,
};
use parley_shared::{ConnectivityState, PromptSink};
use parley_store::{MemoryStorage, SnapshotCache};

use crate::config::ClientConfig;

/// Hosted services the client talks to.
#[derive(Clone)]
pub struct Backends {
    pub documents: Arc<dyn DocumentStore>,
    pub blobs: Arc<dyn BlobStore>,
    pub identity: Arc<dyn IdentityProvider>,
    pub reachability: Arc<dyn Reachability>,
}

impl Backends {
    /// Fresh in-process backends, starting with an unknown network state.
    pub fn in_memory() -> Self {
        Self {
            documents: Arc::new(MemoryDocumentStore::new()),
            blobs: Arc::new(MemoryBlobStore::new("parley")),
            identity: Arc::new(MemoryIdentity::new()),
            reachability: Arc::new(MemoryReachability::new(ConnectivityState::Unknown)),
        }
    }
}

/// Device APIs. Usually one object implements all three.
#[derive(Clone)]
pub struct Devices {
    pub permissions: Arc<dyn DevicePermissions>,
    pub media: Arc<dyn MediaDevices>,
    pub recorder: Arc<dyn AudioRecorder>,
}

impl Devices {
    pub fn simulated(devices: Arc<SimulatedDevices>) -> Self {
        Self {
            permissions: devices.clone(),
            media: devices.clone(),
            recorder: devices,
        }
    }
}

pub struct AppContext {
    pub config: ClientConfig,
    pub backends: Backends,
    pub devices: Devices,
    pub prompts: Arc<dyn PromptSink>,
    pub cache: SnapshotCache,
    uploader: Arc<AttachmentUploader>,
    /// The microphone is one device, so every screen shares this guard.
    recording: Arc<RecordingSession>,
}

impl AppContext {
    pub fn new(
        config: ClientConfig,
        backends: Backends,
        devices: Devices,
        prompts: Arc<dyn PromptSink>,
        cache: SnapshotCache,
    ) -> Self {
        let uploader = Arc::new(AttachmentUploader::new(
            backends.blobs.clone(),
            config.max_upload_bytes,
        ));
        let recording = Arc::new(RecordingSession::new(devices.recorder.clone()));
        Self {
            config,
            backends,
            devices,
            prompts,
            cache,
            uploader,
            recording,
        }
    }

    /// Everything in memory: in-process backends, simulated devices and a
    /// throwaway cache.
    pub fn in_memory(config: ClientConfig, prompts: Arc<dyn PromptSink>) -> Self {
        let cache = SnapshotCache::new(Arc::new(MemoryStorage::new()));
        Self::new(
            config,
            Backends::in_memory(),
            Devices::simulated(Arc::new(SimulatedDevices::new())),
            prompts,
            cache,
        )
    }

    pub fn channel(&self) -> MessageChannel {
        MessageChannel::new(self.backends.documents.clone(), &self.config.collection)
    }

    pub fn gate(&self) -> PermissionGate {
        PermissionGate::new(self.devices.permissions.clone(), self.prompts.clone())
    }

    pub fn uploader(&self) -> Arc<AttachmentUploader> {
        self.uploader.clone()
    }

    pub fn recording(&self) -> Arc<RecordingSession> {
        self.recording.clone()
    }
}

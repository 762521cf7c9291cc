//! Boundaries of the device permission and media APIs.

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use parley_shared::{Capability, DeviceError, GeoPoint};

/// Reference to media on the device (a picked photo, a recording).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaRef {
    pub path: PathBuf,
}

impl MediaRef {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Last path segment, if it is a usable name.
    pub fn file_name(&self) -> Option<&str> {
        self.path
            .file_name()
            .and_then(|n| n.to_str())
            .filter(|n| !n.is_empty() && *n != "." && *n != "..")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionStatus {
    Granted,
    Denied,
    /// Never asked.
    Undetermined,
}

#[async_trait]
pub trait DevicePermissions: Send + Sync {
    /// Current status, without prompting.
    async fn status(&self, capability: Capability) -> Result<PermissionStatus, DeviceError>;

    /// Ask the user (the OS may answer from a previous choice).
    async fn request(&self, capability: Capability) -> Result<PermissionStatus, DeviceError>;

    /// OS-wide location switch, independent of the per-app grant.
    async fn location_services_enabled(&self) -> Result<bool, DeviceError>;
}

#[async_trait]
pub trait MediaDevices: Send + Sync {
    /// Photo library picker. `None` when the user cancels.
    async fn pick_image(&self) -> Result<Option<MediaRef>, DeviceError>;

    /// Camera capture. `None` when the user cancels.
    async fn capture_photo(&self) -> Result<Option<MediaRef>, DeviceError>;

    async fn current_location(&self) -> Result<GeoPoint, DeviceError>;
}

/// The microphone. Holds one exclusive recording at a time.
#[async_trait]
pub trait AudioRecorder: Send + Sync {
    async fn start(&self) -> Result<(), DeviceError>;

    async fn stop(&self) -> Result<MediaRef, DeviceError>;
}

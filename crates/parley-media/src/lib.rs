// Device media boundaries, permission gating and attachment upload.

pub mod devices;
pub mod permissions;
pub mod recording;
pub mod simulated;
pub mod uploader;

pub use devices::{AudioRecorder, DevicePermissions, MediaDevices, MediaRef, PermissionStatus};
pub use permissions::{Access, PermissionGate};
pub use recording::RecordingSession;
pub use simulated::SimulatedDevices;
pub use uploader::AttachmentUploader;

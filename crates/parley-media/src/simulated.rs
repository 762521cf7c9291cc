//! Scriptable device layer for tests and the headless demo.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use tracing::debug;

use parley_shared::{Capability, DeviceError, GeoPoint};

use crate::devices::{AudioRecorder, DevicePermissions, MediaDevices, MediaRef, PermissionStatus};

struct Inner {
    status: HashMap<Capability, PermissionStatus>,
    /// What the user answers when asked; granted unless scripted otherwise.
    answers: HashMap<Capability, PermissionStatus>,
    requests: Vec<Capability>,
    location_services: bool,
    camera_available: bool,
    microphone_available: bool,
    library_pick: Option<MediaRef>,
    camera_shot: Option<MediaRef>,
    location: GeoPoint,
    recording: MediaRef,
}

/// Implements every device trait from in-memory answers.
pub struct SimulatedDevices {
    inner: Mutex<Inner>,
    recording: AtomicBool,
    media_opens: AtomicUsize,
}

impl Default for SimulatedDevices {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedDevices {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                status: HashMap::new(),
                answers: HashMap::new(),
                requests: Vec::new(),
                location_services: true,
                camera_available: true,
                microphone_available: true,
                library_pick: None,
                camera_shot: None,
                location: GeoPoint {
                    latitude: 48.8566,
                    longitude: 2.3522,
                },
                recording: MediaRef::new("recording.m4a"),
            }),
            recording: AtomicBool::new(false),
            media_opens: AtomicUsize::new(0),
        }
    }

    fn with<R>(&self, f: impl FnOnce(&mut Inner) -> R) -> R {
        let mut inner = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        f(&mut inner)
    }

    /// Already granted; no prompt on the next request.
    pub fn grant(&self, capability: Capability) {
        self.with(|i| {
            i.status.insert(capability, PermissionStatus::Granted);
            i.answers.insert(capability, PermissionStatus::Granted);
        });
    }

    /// The user says no (now and when asked again).
    pub fn deny(&self, capability: Capability) {
        self.with(|i| {
            i.status.insert(capability, PermissionStatus::Denied);
            i.answers.insert(capability, PermissionStatus::Denied);
        });
    }

    pub fn set_location_services(&self, enabled: bool) {
        self.with(|i| i.location_services = enabled);
    }

    pub fn set_camera_available(&self, available: bool) {
        self.with(|i| i.camera_available = available);
    }

    pub fn set_microphone_available(&self, available: bool) {
        self.with(|i| i.microphone_available = available);
    }

    /// Next library pick; `None` means the user cancels.
    pub fn set_library_pick(&self, media: Option<MediaRef>) {
        self.with(|i| i.library_pick = media);
    }

    /// Next camera shot; `None` means the user cancels.
    pub fn set_camera_shot(&self, media: Option<MediaRef>) {
        self.with(|i| i.camera_shot = media);
    }

    pub fn set_location(&self, location: GeoPoint) {
        self.with(|i| i.location = location);
    }

    /// File handed back when a recording stops.
    pub fn set_recording(&self, media: MediaRef) {
        self.with(|i| i.recording = media);
    }

    /// Capabilities the user was actually prompted for, in order.
    pub fn permission_requests(&self) -> Vec<Capability> {
        self.with(|i| i.requests.clone())
    }

    /// Number of times a picker or the camera was opened.
    pub fn media_opens(&self) -> usize {
        self.media_opens.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DevicePermissions for SimulatedDevices {
    async fn status(&self, capability: Capability) -> Result<PermissionStatus, DeviceError> {
        Ok(self.with(|i| {
            i.status
                .get(&capability)
                .copied()
                .unwrap_or(PermissionStatus::Undetermined)
        }))
    }

    async fn request(&self, capability: Capability) -> Result<PermissionStatus, DeviceError> {
        let answer = self.with(|i| {
            i.requests.push(capability);
            let answer = i
                .answers
                .get(&capability)
                .copied()
                .unwrap_or(PermissionStatus::Granted);
            i.status.insert(capability, answer);
            answer
        });
        debug!(%capability, ?answer, "Simulated permission prompt");
        Ok(answer)
    }

    async fn location_services_enabled(&self) -> Result<bool, DeviceError> {
        Ok(self.with(|i| i.location_services))
    }
}

#[async_trait]
impl MediaDevices for SimulatedDevices {
    async fn pick_image(&self) -> Result<Option<MediaRef>, DeviceError> {
        self.media_opens.fetch_add(1, Ordering::SeqCst);
        Ok(self.with(|i| i.library_pick.clone()))
    }

    async fn capture_photo(&self) -> Result<Option<MediaRef>, DeviceError> {
        if !self.with(|i| i.camera_available) {
            return Err(DeviceError::Unavailable("Camera".into()));
        }
        self.media_opens.fetch_add(1, Ordering::SeqCst);
        Ok(self.with(|i| i.camera_shot.clone()))
    }

    async fn current_location(&self) -> Result<GeoPoint, DeviceError> {
        Ok(self.with(|i| i.location))
    }
}

#[async_trait]
impl AudioRecorder for SimulatedDevices {
    async fn start(&self) -> Result<(), DeviceError> {
        if !self.with(|i| i.microphone_available) {
            return Err(DeviceError::Unavailable("Microphone".into()));
        }
        if self.recording.swap(true, Ordering::SeqCst) {
            return Err(DeviceError::Busy("microphone in use".into()));
        }
        Ok(())
    }

    async fn stop(&self) -> Result<MediaRef, DeviceError> {
        if !self.recording.swap(false, Ordering::SeqCst) {
            return Err(DeviceError::Failed("not recording".into()));
        }
        Ok(self.with(|i| i.recording.clone()))
    }
}

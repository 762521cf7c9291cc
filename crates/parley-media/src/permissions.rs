//! Permission gate.
//!
//! Every attachment action asks here first. A denial is an ordinary answer,
//! not an error: the gate shows a prompt pointing at the system settings and
//! reports `false`.

use std::sync::Arc;

use tracing::{debug, info, warn};

use parley_shared::{Capability, Prompt, PromptSink};

use crate::devices::{DevicePermissions, PermissionStatus};

/// Result of a gate check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Granted,
    Denied,
    /// Location services are off at the OS level; the app permission was
    /// not even asked for.
    ServicesDisabled,
}

impl Access {
    pub fn is_granted(self) -> bool {
        matches!(self, Access::Granted)
    }
}

#[derive(Clone)]
pub struct PermissionGate {
    permissions: Arc<dyn DevicePermissions>,
    prompts: Arc<dyn PromptSink>,
}

impl PermissionGate {
    pub fn new(permissions: Arc<dyn DevicePermissions>, prompts: Arc<dyn PromptSink>) -> Self {
        Self {
            permissions,
            prompts,
        }
    }

    /// `true` when `capability` may be used.
    pub async fn request(&self, capability: Capability) -> bool {
        self.check(capability).await.is_granted()
    }

    pub async fn check(&self, capability: Capability) -> Access {
        if capability == Capability::Location {
            match self.permissions.location_services_enabled().await {
                Ok(true) => {}
                Ok(false) => {
                    info!("Location services disabled");
                    self.prompts.show(services_disabled_prompt());
                    return Access::ServicesDisabled;
                }
                Err(e) => {
                    warn!(error = %e, "Could not read location services state");
                    self.prompts.show(denied_prompt(capability));
                    return Access::Denied;
                }
            }
        }

        match self.permissions.status(capability).await {
            Ok(PermissionStatus::Granted) => return Access::Granted,
            Ok(_) => {}
            Err(e) => debug!(%capability, error = %e, "Permission status unavailable, asking"),
        }

        match self.permissions.request(capability).await {
            Ok(PermissionStatus::Granted) => {
                info!(%capability, "Permission granted");
                Access::Granted
            }
            Ok(status) => {
                info!(%capability, ?status, "Permission denied");
                self.prompts.show(denied_prompt(capability));
                Access::Denied
            }
            Err(e) => {
                warn!(%capability, error = %e, "Permission request failed");
                self.prompts.show(denied_prompt(capability));
                Access::Denied
            }
        }
    }
}

fn denied_prompt(capability: Capability) -> Prompt {
    let message = match capability {
        Capability::PhotoLibrary => "Please allow Photos access to pick an image.",
        Capability::Camera => "Please allow camera access to take a photo.",
        Capability::Microphone => "Please allow microphone access to record audio.",
        Capability::Location => "We need your permission to share your current location.",
    };
    Prompt::with_settings("Permission required", message)
}

fn services_disabled_prompt() -> Prompt {
    Prompt::with_settings(
        "Turn On Location Services",
        "Location Services are disabled. Enable them in Settings to share your location.",
    )
}

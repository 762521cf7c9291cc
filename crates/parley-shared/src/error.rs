use thiserror::Error;

use crate::prompt::Prompt;
use crate::types::Capability;

/// Failure reported by one of the hosted backends (document store, blob
/// store, identity provider, reachability observer).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    #[error("Backend unavailable: {0}")]
    Unavailable(String),

    #[error("Request rejected: {0}")]
    Rejected(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for BackendError {
    fn from(e: serde_json::Error) -> Self {
        BackendError::Serialization(e.to_string())
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeviceError {
    #[error("Device not available: {0}")]
    Unavailable(String),

    #[error("Device busy: {0}")]
    Busy(String),

    #[error("Device error: {0}")]
    Failed(String),
}

#[derive(Error, Debug)]
pub enum UploadError {
    #[error("Failed to read local media: {0}")]
    Read(#[from] std::io::Error),

    #[error("Media too large: {size} bytes (max {max})")]
    TooLarge { size: usize, max: usize },

    #[error("Media is empty")]
    Empty,

    #[error("Blob store error: {0}")]
    Backend(#[from] BackendError),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WriteError {
    #[error("Message write rejected: {0}")]
    Backend(#[from] BackendError),

    #[error("Failed to encode message: {0}")]
    Encode(String),
}

/// Everything the chat surface can report to the user.
#[derive(Error, Debug)]
pub enum ChatError {
    #[error("Permission denied: {0}")]
    PermissionDenied(Capability),

    #[error("Location services are disabled")]
    LocationServicesDisabled,

    #[error("Upload failed: {0}")]
    Upload(#[from] UploadError),

    #[error("Send failed: {0}")]
    Write(#[from] WriteError),

    #[error("Device error: {0}")]
    Device(#[from] DeviceError),

    #[error("Sign-in failed: {0}")]
    SignIn(BackendError),

    #[error("Subscription failed: {0}")]
    Subscribe(BackendError),
}

impl ChatError {
    /// Dismissable alert for this error.
    ///
    /// Permission problems return `None`: the permission gate has already
    /// shown its own settings prompt by the time they reach the caller.
    pub fn prompt(&self) -> Option<Prompt> {
        match self {
            ChatError::PermissionDenied(_) | ChatError::LocationServicesDisabled => None,
            ChatError::Upload(_) => Some(Prompt::alert(
                "Upload failed",
                "Could not upload the attachment. Please try again.",
            )),
            ChatError::Write(_) => Some(Prompt::alert(
                "Send failed",
                "Your message could not be sent. Please try again.",
            )),
            ChatError::Device(DeviceError::Unavailable(what)) => Some(Prompt::alert(
                format!("{what} not available"),
                format!("The {} is not available on this device.", what.to_lowercase()),
            )),
            ChatError::Device(e) => Some(Prompt::alert("Device error", e.to_string())),
            ChatError::SignIn(e) => Some(Prompt::alert("Sign-in failed", e.to_string())),
            ChatError::Subscribe(e) => Some(Prompt::alert("Connection error", e.to_string())),
        }
    }
}

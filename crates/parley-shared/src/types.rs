use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::constants::{DEFAULT_AUDIO_NAME, DEFAULT_IMAGE_NAME};

// User identity = opaque uid handed out by the identity provider
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct UserId(pub String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn short(&self) -> &str {
        match self.0.char_indices().nth(8) {
            Some((idx, _)) => &self.0[..idx],
            None => &self.0,
        }
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Document id assigned by the backend on write. Used as the render key.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct MessageId(pub String);

impl MessageId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Author captured from the session at send time.
///
/// Serialised as `{ "_id": ..., "name": ... }`, the shape the chat
/// documents have always carried.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Author {
    #[serde(rename = "_id")]
    pub id: UserId,
    #[serde(rename = "name")]
    pub display_name: String,
}

impl Author {
    pub fn new(id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            id: UserId::new(id),
            display_name: display_name.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

/// Non-text content of a message. At most one per message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum Attachment {
    /// Download URL of an uploaded image.
    Image(String),
    /// Coordinates sent inline, never uploaded.
    Location(GeoPoint),
    /// Download URL of an uploaded recording.
    Audio(String),
}

impl Attachment {
    /// Top-level document field carrying this attachment.
    pub fn field_name(&self) -> &'static str {
        match self {
            Attachment::Image(_) => "image",
            Attachment::Location(_) => "location",
            Attachment::Audio(_) => "audio",
        }
    }
}

/// A message as rendered: a read-only projection of a backend document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: MessageId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attachment: Option<Attachment>,
    #[serde(rename = "user")]
    pub author: Author,
    /// Server time, or the observation time while the server value is pending.
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub timestamp_pending: bool,
}

/// What the composer or an action hands to the message channel.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Draft {
    pub text: Option<String>,
    pub attachment: Option<Attachment>,
}

impl Draft {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            attachment: None,
        }
    }

    pub fn attachment(attachment: Attachment) -> Self {
        Self {
            text: None,
            attachment: Some(attachment),
        }
    }

    /// Text worth writing: present and not whitespace-only.
    pub fn sendable_text(&self) -> Option<&str> {
        self.text.as_deref().filter(|t| !t.trim().is_empty())
    }

    /// Nothing to send: blank text and no attachment.
    pub fn is_empty(&self) -> bool {
        self.sendable_text().is_none() && self.attachment.is_none()
    }
}

/// Ephemeral client identity, held for the lifetime of the chat screen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub uid: UserId,
    pub display_name: String,
    pub background_color: String,
}

impl Session {
    pub fn author(&self) -> Author {
        Author {
            id: self.uid.clone(),
            display_name: self.display_name.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum ConnectivityState {
    /// Cold start, before the first reachability observation.
    #[default]
    Unknown,
    Connected,
    Disconnected,
}

impl ConnectivityState {
    /// `Unknown` counts as online so the composer is not hidden on cold start.
    pub fn assume_online(self) -> bool {
        !matches!(self, ConnectivityState::Disconnected)
    }
}

impl fmt::Display for ConnectivityState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConnectivityState::Unknown => "unknown",
            ConnectivityState::Connected => "connected",
            ConnectivityState::Disconnected => "disconnected",
        };
        f.write_str(s)
    }
}

/// Device capability guarded by an OS permission prompt.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Capability {
    Camera,
    PhotoLibrary,
    Microphone,
    Location,
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Capability::Camera => "camera",
            Capability::PhotoLibrary => "photo library",
            Capability::Microphone => "microphone",
            Capability::Location => "location",
        };
        f.write_str(s)
    }
}

/// Kind of media that goes through the uploader.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaKind {
    Image,
    Audio,
}

impl MediaKind {
    pub fn storage_prefix(self) -> &'static str {
        match self {
            MediaKind::Image => "images",
            MediaKind::Audio => "audio",
        }
    }

    pub fn default_file_name(self) -> &'static str {
        match self {
            MediaKind::Image => DEFAULT_IMAGE_NAME,
            MediaKind::Audio => DEFAULT_AUDIO_NAME,
        }
    }

    /// Wrap an uploaded URL into the matching attachment.
    pub fn into_attachment(self, url: String) -> Attachment {
        match self {
            MediaKind::Image => Attachment::Image(url),
            MediaKind::Audio => Attachment::Audio(url),
        }
    }
}

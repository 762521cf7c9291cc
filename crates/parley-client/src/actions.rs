//! Attachment action sheet.
//!
//! Each action runs permission gate, then upload (or a direct payload for
//! locations), then send, and stops at the first failure.

use std::fmt;
use std::sync::Arc;

use tracing::{debug, info};

use parley_media::{
    Access, AttachmentUploader, MediaDevices, MediaRef, PermissionGate, RecordingSession,
};
use parley_net::{MessageChannel, SendOutcome};
use parley_shared::{Attachment, Author, Capability, ChatError, Draft, MediaKind, MessageId};

use crate::state::AppContext;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatAction {
    ChooseFromLibrary,
    TakePicture,
    SendLocation,
    RecordAudio,
    StopRecording,
    Cancel,
}

impl ChatAction {
    pub fn label(self) -> &'static str {
        match self {
            ChatAction::ChooseFromLibrary => "Choose From Library",
            ChatAction::TakePicture => "Take Picture",
            ChatAction::SendLocation => "Send Location",
            ChatAction::RecordAudio => "Record Audio",
            ChatAction::StopRecording => "Stop Recording",
            ChatAction::Cancel => "Cancel",
        }
    }
}

impl fmt::Display for ChatAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Menu entries in display order. `Cancel` is always last.
pub fn action_menu(recording: bool) -> Vec<ChatAction> {
    vec![
        ChatAction::ChooseFromLibrary,
        ChatAction::TakePicture,
        ChatAction::SendLocation,
        if recording {
            ChatAction::StopRecording
        } else {
            ChatAction::RecordAudio
        },
        ChatAction::Cancel,
    ]
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionOutcome {
    Sent(MessageId),
    RecordingStarted,
    /// The user backed out (menu cancel, picker or camera dismissed).
    Cancelled,
}

pub struct ActionHandler {
    channel: MessageChannel,
    gate: PermissionGate,
    uploader: Arc<AttachmentUploader>,
    media: Arc<dyn MediaDevices>,
    recording: Arc<RecordingSession>,
    author: Author,
}

impl ActionHandler {
    pub fn new(ctx: &AppContext, author: Author) -> Self {
        Self {
            channel: ctx.channel(),
            gate: ctx.gate(),
            uploader: ctx.uploader(),
            media: ctx.devices.media.clone(),
            recording: ctx.recording(),
            author,
        }
    }

    pub fn is_recording(&self) -> bool {
        self.recording.is_recording()
    }

    pub fn menu(&self) -> Vec<ChatAction> {
        action_menu(self.is_recording())
    }

    pub async fn run(&self, action: ChatAction) -> Result<ActionOutcome, ChatError> {
        debug!(%action, "Running chat action");
        match action {
            ChatAction::ChooseFromLibrary => {
                self.allow(Capability::PhotoLibrary).await?;
                match self.media.pick_image().await? {
                    Some(media) => self.upload_and_send(&media, MediaKind::Image).await,
                    None => Ok(ActionOutcome::Cancelled),
                }
            }
            ChatAction::TakePicture => {
                self.allow(Capability::Camera).await?;
                match self.media.capture_photo().await? {
                    Some(media) => self.upload_and_send(&media, MediaKind::Image).await,
                    None => Ok(ActionOutcome::Cancelled),
                }
            }
            ChatAction::SendLocation => {
                self.allow(Capability::Location).await?;
                let point = self.media.current_location().await?;
                self.send(Attachment::Location(point)).await
            }
            ChatAction::RecordAudio => {
                self.allow(Capability::Microphone).await?;
                self.recording.start().await?;
                Ok(ActionOutcome::RecordingStarted)
            }
            ChatAction::StopRecording => {
                let media = self.recording.stop().await?;
                self.upload_and_send(&media, MediaKind::Audio).await
            }
            ChatAction::Cancel => Ok(ActionOutcome::Cancelled),
        }
    }

    /// Stop a running recording without sending it.
    pub async fn discard_recording(&self) {
        if !self.recording.is_recording() {
            return;
        }
        match self.recording.stop().await {
            Ok(media) => info!(path = %media.path().display(), "Recording discarded"),
            Err(e) => debug!(error = %e, "Recording already gone"),
        }
    }

    async fn allow(&self, capability: Capability) -> Result<(), ChatError> {
        match self.gate.check(capability).await {
            Access::Granted => Ok(()),
            Access::Denied => Err(ChatError::PermissionDenied(capability)),
            Access::ServicesDisabled => Err(ChatError::LocationServicesDisabled),
        }
    }

    async fn upload_and_send(
        &self,
        media: &MediaRef,
        kind: MediaKind,
    ) -> Result<ActionOutcome, ChatError> {
        let url = self.uploader.upload(media, kind, &self.author.id).await?;
        self.send(kind.into_attachment(url)).await
    }

    async fn send(&self, attachment: Attachment) -> Result<ActionOutcome, ChatError> {
        match self
            .channel
            .send(&Draft::attachment(attachment), &self.author)
            .await?
        {
            SendOutcome::Written(id) => Ok(ActionOutcome::Sent(id)),
            SendOutcome::Skipped => Ok(ActionOutcome::Cancelled),
        }
    }
}

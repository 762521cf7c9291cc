//! Types shared by every parley crate: the message model, the session,
//! connectivity and capability enums, the error taxonomy and user prompts.

pub mod constants;
pub mod error;
pub mod prompt;
pub mod types;

pub use error::{BackendError, ChatError, DeviceError, UploadError, WriteError};
pub use prompt::{LogPrompts, Prompt, PromptLog, PromptSink};
pub use types::*;

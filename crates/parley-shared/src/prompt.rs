//! User-facing prompts (alerts and settings nudges).
//!
//! Rendering is the UI's business; the core only decides *what* to show and
//! hands it to a [`PromptSink`].

use std::sync::Mutex;

use tracing::info;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    pub title: String,
    pub message: String,
    /// Whether the prompt offers an "Open Settings" button.
    pub offers_settings: bool,
}

impl Prompt {
    pub fn alert(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            message: message.into(),
            offers_settings: false,
        }
    }

    pub fn with_settings(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            message: message.into(),
            offers_settings: true,
        }
    }
}

pub trait PromptSink: Send + Sync {
    fn show(&self, prompt: Prompt);
}

/// Sink that only logs. Used by headless runs.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogPrompts;

impl PromptSink for LogPrompts {
    fn show(&self, prompt: Prompt) {
        info!(
            title = %prompt.title,
            message = %prompt.message,
            settings = prompt.offers_settings,
            "Prompt"
        );
    }
}

/// Sink that remembers every prompt shown, in order.
#[derive(Debug, Default)]
pub struct PromptLog {
    shown: Mutex<Vec<Prompt>>,
}

impl PromptLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shown(&self) -> Vec<Prompt> {
        self.shown.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn last(&self) -> Option<Prompt> {
        self.shown
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .last()
            .cloned()
    }

    pub fn clear(&self) {
        self.shown.lock().unwrap_or_else(|e| e.into_inner()).clear();
    }
}

impl PromptSink for PromptLog {
    fn show(&self, prompt: Prompt) {
        self.shown
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(prompt);
    }
}

//! Start screen: pick a display name and a chat background, then sign in.

use std::sync::Arc;

use tracing::{error, info};

use parley_shared::constants::{BACKGROUND_PALETTE, DEFAULT_BACKGROUND};
use parley_shared::{ChatError, Session};

use crate::state::AppContext;

pub struct StartScreen {
    ctx: Arc<AppContext>,
}

impl StartScreen {
    pub fn new(ctx: Arc<AppContext>) -> Self {
        Self { ctx }
    }

    /// Background choices, the default first.
    pub fn palette(&self) -> Vec<&'static str> {
        std::iter::once(DEFAULT_BACKGROUND)
            .chain(BACKGROUND_PALETTE)
            .collect()
    }

    /// Sign in anonymously and build the session for the chat screen.
    pub async fn start(&self, name: &str, background: &str) -> Result<Session, ChatError> {
        let uid = match self.ctx.backends.identity.sign_in_anonymously().await {
            Ok(uid) => uid,
            Err(e) => {
                error!(error = %e, "Anonymous sign-in failed");
                let err = ChatError::SignIn(e);
                if let Some(prompt) = err.prompt() {
                    self.ctx.prompts.show(prompt);
                }
                return Err(err);
            }
        };

        let name = name.trim();
        let display_name = if name.is_empty() {
            self.ctx.config.default_display_name.clone()
        } else {
            name.to_string()
        };

        let background_color = if is_hex_color(background) {
            background.to_string()
        } else {
            DEFAULT_BACKGROUND.to_string()
        };

        info!(uid = %uid.short(), name = %display_name, "Signed in");
        Ok(Session {
            uid,
            display_name,
            background_color,
        })
    }
}

/// `#rrggbb`, either case.
pub fn is_hex_color(value: &str) -> bool {
    match value.strip_prefix('#') {
        Some(hex) => hex.len() == 6 && hex.chars().all(|c| c.is_ascii_hexdigit()),
        None => false,
    }
}

pub mod actions;
pub mod chat;
pub mod config;
pub mod start;
pub mod state;

#[cfg(test)]
mod testing;

use tracing_subscriber::{fmt, EnvFilter};

pub use actions::{action_menu, ActionHandler, ActionOutcome, ChatAction};
pub use chat::{ChatScreen, Timeline};
pub use config::ClientConfig;
pub use start::StartScreen;
pub use state::{AppContext, Backends, Devices};

/// Install the global tracing subscriber. `RUST_LOG` overrides the default
/// filter.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new("parley_client=debug,parley_net=debug,parley_media=info,parley_store=info,warn")
    });

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();
}

//! # parley-demo
//!
//! Runs one headless chat session against in-process backends and
//! simulated devices: sign in, send a text, share a photo and a location,
//! print the timeline, unmount. The snapshot cache lives in SQLite under the data
//! directory and attachments land in the filesystem blob store, so a
//! second run warm-starts from the first.
//!
//! Usage: `parley-demo [display name]`

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tracing::{info, warn};

use parley_client::{AppContext, Backends, ChatAction, ChatScreen, ClientConfig, Devices, StartScreen};
use parley_media::{MediaRef, SimulatedDevices};
use parley_net::FsBlobStore;
use parley_shared::constants::{APP_NAME, DEFAULT_BACKGROUND};
use parley_shared::{Attachment, LogPrompts, Message};
use parley_store::{Database, SnapshotCache, SqliteStorage};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    parley_client::init_tracing();

    info!("Starting {} demo v{}", APP_NAME, env!("CARGO_PKG_VERSION"));

    let config = ClientConfig::from_env();
    info!(?config, "Loaded configuration");

    let data_dir = config.data_dir().context("no data directory")?;
    let db = Database::open_in_dir(&data_dir)?;
    let cache = SnapshotCache::new(Arc::new(SqliteStorage::new(db)));

    let blobs = FsBlobStore::new(config.blob_dir()?, config.max_upload_bytes).await?;
    let backends = Backends {
        blobs: Arc::new(blobs),
        ..Backends::in_memory()
    };
    let simulated = Arc::new(SimulatedDevices::new());
    let photo = data_dir.join("demo-photo.jpg");
    tokio::fs::write(&photo, DEMO_PHOTO)
        .await
        .with_context(|| format!("writing {}", photo.display()))?;
    simulated.set_library_pick(Some(MediaRef::new(photo)));
    let devices = Devices::simulated(simulated);

    let ctx = Arc::new(AppContext::new(
        config,
        backends,
        devices,
        Arc::new(LogPrompts),
        cache,
    ));

    let name = std::env::args().nth(1).unwrap_or_default();
    let session = StartScreen::new(ctx.clone())
        .start(&name, DEFAULT_BACKGROUND)
        .await?;

    let mut chat = ChatScreen::mount(ctx, session).await?;
    info!(title = chat.title(), "Chat ready");

    let warm = chat.messages();
    if !warm.is_empty() {
        info!(count = warm.len(), "Showing cached messages until the backend answers");
    }

    chat.send_text("Hello from parley").await?;
    chat.run_action(ChatAction::ChooseFromLibrary).await?;
    chat.run_action(ChatAction::SendLocation).await?;

    let mut updates = chat.updates();
    let delivered = tokio::time::timeout(
        Duration::from_secs(5),
        updates.wait_for(|t| t.live && t.messages.len() >= 3),
    )
    .await;
    if delivered.is_err() {
        warn!("Timed out waiting for the backend to echo all three messages");
    }

    for message in chat.messages() {
        println!("{}", render(&message));
    }

    chat.unmount().await;
    Ok(())
}

/// JPEG start-of-image marker followed by a short payload.
const DEMO_PHOTO: &[u8] = b"\xFF\xD8\xFF\xE0parley demo photo";

fn render(message: &Message) -> String {
    let body = match (&message.text, &message.attachment) {
        (Some(text), _) => text.clone(),
        (None, Some(Attachment::Image(url))) => format!("[image] {url}"),
        (None, Some(Attachment::Audio(url))) => format!("[audio] {url}"),
        (None, Some(Attachment::Location(p))) => {
            format!("[location] {:.4}, {:.4}", p.latitude, p.longitude)
        }
        (None, None) => String::new(),
    };
    let time = if message.timestamp_pending {
        "pending".to_string()
    } else {
        message.created_at.format("%H:%M:%S").to_string()
    };
    format!("{} {}: {}", time, message.author.display_name, body)
}

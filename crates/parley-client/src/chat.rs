//! Chat screen controller.
//!
//! Binds the message channel, the connectivity monitor, the action sheet
//! and the snapshot cache to one rendered conversation. The timeline is a
//! `watch` channel: the cached list seeds it at mount, and the first live
//! snapshot replaces it for good.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, error, info};

use parley_net::{ConnectivityMonitor, MessageChannel, SendOutcome, SubscriptionHandle};
use parley_shared::{ChatError, ConnectivityState, Draft, Message, Session};

use crate::actions::{ActionHandler, ActionOutcome, ChatAction};
use crate::state::AppContext;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Timeline {
    pub messages: Vec<Message>,
    /// Set by the first live snapshot. From then on the cache is ignored.
    pub live: bool,
}

pub struct ChatScreen {
    ctx: Arc<AppContext>,
    session: Session,
    channel: MessageChannel,
    actions: ActionHandler,
    timeline: Arc<watch::Sender<Timeline>>,
    connectivity: watch::Receiver<ConnectivityState>,
    subscription: Option<SubscriptionHandle>,
    monitor: Option<ConnectivityMonitor>,
}

impl ChatScreen {
    /// Warm-start from the cache, subscribe to the conversation and start
    /// following connectivity.
    pub async fn mount(ctx: Arc<AppContext>, session: Session) -> Result<Self, ChatError> {
        let (timeline, _) = watch::channel(Timeline::default());
        let cached = ctx.cache.load();
        if !cached.is_empty() {
            debug!(count = cached.len(), "Warm start from cache");
            timeline.send_replace(Timeline {
                messages: cached,
                live: false,
            });
        }

        let monitor = ConnectivityMonitor::spawn(
            ctx.backends.reachability.clone(),
            ctx.backends.documents.clone(),
            ctx.config.poll_interval,
        );

        let mut screen = Self {
            channel: ctx.channel(),
            actions: ActionHandler::new(&ctx, session.author()),
            timeline: Arc::new(timeline),
            connectivity: monitor.watch(),
            subscription: None,
            monitor: Some(monitor),
            session,
            ctx,
        };
        screen.resubscribe().await?;

        info!(
            uid = %screen.session.uid.short(),
            collection = %screen.channel.collection(),
            "Chat mounted"
        );
        Ok(screen)
    }

    /// Replace the live subscription. The previous one is released first.
    pub async fn resubscribe(&mut self) -> Result<(), ChatError> {
        if let Some(mut previous) = self.subscription.take() {
            previous.unsubscribe();
        }

        let timeline = self.timeline.clone();
        let cache = self.ctx.cache.clone();
        let subscribed = self
            .channel
            .subscribe(move |messages: Vec<Message>| {
                cache.save(&messages);
                timeline.send_modify(|t| {
                    t.messages = messages;
                    t.live = true;
                });
            })
            .await;

        match subscribed {
            Ok(handle) => {
                self.subscription = Some(handle);
                Ok(())
            }
            Err(e) => {
                error!(error = %e, "Subscribe failed");
                let err = ChatError::Subscribe(e);
                self.report(&err);
                Err(err)
            }
        }
    }

    pub fn title(&self) -> &str {
        &self.session.display_name
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// The rendered list, newest first.
    pub fn messages(&self) -> Vec<Message> {
        self.timeline.borrow().messages.clone()
    }

    pub fn is_live(&self) -> bool {
        self.timeline.borrow().live
    }

    pub fn updates(&self) -> watch::Receiver<Timeline> {
        self.timeline.subscribe()
    }

    pub fn connectivity(&self) -> ConnectivityState {
        *self.connectivity.borrow()
    }

    pub fn watch_connectivity(&self) -> watch::Receiver<ConnectivityState> {
        self.connectivity.clone()
    }

    /// Hidden only while known to be offline.
    pub fn composer_visible(&self) -> bool {
        self.connectivity() != ConnectivityState::Disconnected
    }

    pub fn can_send(&self, text: &str) -> bool {
        !text.trim().is_empty()
    }

    pub async fn send_text(&self, text: &str) -> Result<SendOutcome, ChatError> {
        let author = self.session.author();
        match self.channel.send(&Draft::text(text), &author).await {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                let err = ChatError::from(e);
                self.report(&err);
                Err(err)
            }
        }
    }

    pub fn open_actions(&self) -> Vec<ChatAction> {
        self.actions.menu()
    }

    pub async fn run_action(&self, action: ChatAction) -> Result<ActionOutcome, ChatError> {
        let result = self.actions.run(action).await;
        if let Err(err) = &result {
            self.report(err);
        }
        result
    }

    /// Release the subscription, stop the monitor and any recording.
    /// Safe to call more than once.
    pub async fn unmount(&mut self) {
        let mut released = false;
        if let Some(mut subscription) = self.subscription.take() {
            subscription.unsubscribe();
            released = true;
        }
        if let Some(mut monitor) = self.monitor.take() {
            monitor.shutdown();
            released = true;
        }
        self.actions.discard_recording().await;
        if released {
            info!("Chat unmounted");
        }
    }

    fn report(&self, err: &ChatError) {
        if let Some(prompt) = err.prompt() {
            self.ctx.prompts.show(prompt);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::Harness;
    use chrono::{TimeZone, Utc};
    use parley_net::MemoryReachability;
    use parley_shared::{Attachment, Author, BackendError, Capability, DeviceError, MessageId};
    use std::time::Duration;
    use tokio::time;

    async fn wait_until(screen: &ChatScreen, f: impl Fn(&Timeline) -> bool) -> Timeline {
        let mut rx = screen.updates();
        let timeline = time::timeout(Duration::from_secs(5), rx.wait_for(|t| f(t)))
            .await
            .expect("timeline not reached")
            .expect("timeline closed");
        timeline.clone()
    }

    fn cached_message() -> Message {
        Message {
            id: MessageId("old".into()),
            text: Some("from last time".into()),
            attachment: None,
            author: Author::new("u2", "Bob"),
            created_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            timestamp_pending: false,
        }
    }

    #[tokio::test]
    async fn sent_text_arrives_through_snapshot() {
        let h = Harness::new();
        let screen = ChatScreen::mount(h.ctx.clone(), h.session()).await.unwrap();
        assert_eq!(screen.title(), "Ann");

        screen.send_text("hi").await.unwrap();
        let timeline = wait_until(&screen, |t| t.messages.len() == 1).await;

        let message = &timeline.messages[0];
        assert_eq!(message.text.as_deref(), Some("hi"));
        assert_eq!(message.author, Author::new("u1", "Ann"));
        assert!(timeline.live);
    }

    #[tokio::test]
    async fn live_snapshot_replaces_warm_start() {
        let h = Harness::new();
        h.cache().save(&[cached_message()]);

        let screen = ChatScreen::mount(h.ctx.clone(), h.session()).await.unwrap();
        assert!(!screen.is_live());
        assert_eq!(screen.messages(), vec![cached_message()]);

        // the backend is empty, and the backend wins
        let timeline = wait_until(&screen, |t| t.live).await;
        assert!(timeline.messages.is_empty());
        assert!(h.cache().load().is_empty());
    }

    #[tokio::test]
    async fn every_snapshot_is_cached() {
        let h = Harness::new();
        let screen = ChatScreen::mount(h.ctx.clone(), h.session()).await.unwrap();

        screen.send_text("one").await.unwrap();
        screen.send_text("two").await.unwrap();
        let timeline = wait_until(&screen, |t| t.messages.len() == 2).await;

        assert_eq!(h.cache().load(), timeline.messages);
        assert_eq!(timeline.messages[0].text.as_deref(), Some("two"));
    }

    #[tokio::test]
    async fn blank_text_is_not_sendable() {
        let h = Harness::new();
        let screen = ChatScreen::mount(h.ctx.clone(), h.session()).await.unwrap();

        assert!(!screen.can_send("   "));
        assert!(screen.can_send(" x "));
        assert_eq!(screen.send_text(" \n ").await.unwrap(), SendOutcome::Skipped);
        assert_eq!(h.documents.write_count(), 0);
    }

    #[tokio::test]
    async fn write_failure_is_prompted() {
        let h = Harness::new();
        h.documents
            .fail_writes_with(Some(BackendError::Unavailable("offline".into())));
        let screen = ChatScreen::mount(h.ctx.clone(), h.session()).await.unwrap();

        let err = screen.send_text("hi").await.unwrap_err();
        assert!(matches!(err, ChatError::Write(_)));
        assert_eq!(h.prompts.last().unwrap().title, "Send failed");
    }

    #[tokio::test]
    async fn permission_denial_prompts_once() {
        let h = Harness::new();
        h.devices.deny(Capability::PhotoLibrary);
        let screen = ChatScreen::mount(h.ctx.clone(), h.session()).await.unwrap();

        let err = screen.run_action(ChatAction::ChooseFromLibrary).await.unwrap_err();
        assert!(matches!(err, ChatError::PermissionDenied(Capability::PhotoLibrary)));
        let shown = h.prompts.shown();
        assert_eq!(shown.len(), 1);
        assert_eq!(shown[0].title, "Permission required");
    }

    #[tokio::test]
    async fn upload_failure_is_prompted() {
        let h = Harness::new();
        let screen = ChatScreen::mount(h.ctx.clone(), h.session()).await.unwrap();
        h.devices.set_library_pick(Some(h.media_file("empty.jpg", b"")));

        let err = screen.run_action(ChatAction::ChooseFromLibrary).await.unwrap_err();
        assert!(matches!(err, ChatError::Upload(_)));
        assert_eq!(h.prompts.last().unwrap().title, "Upload failed");
    }

    #[tokio::test]
    async fn offline_hides_composer_and_holds_timestamps() {
        let h = Harness::new();
        let screen = ChatScreen::mount(h.ctx.clone(), h.session()).await.unwrap();
        assert!(screen.composer_visible());

        let mut connectivity = screen.watch_connectivity();
        h.reachability.push(ConnectivityState::Disconnected);
        connectivity
            .wait_for(|s| *s == ConnectivityState::Disconnected)
            .await
            .unwrap();
        assert!(!screen.composer_visible());
        assert!(!h.documents.is_network_enabled());

        screen.send_text("queued").await.unwrap();
        let timeline = wait_until(&screen, |t| t.messages.len() == 1).await;
        assert!(timeline.messages[0].timestamp_pending);

        h.reachability.push(ConnectivityState::Connected);
        let timeline = wait_until(&screen, |t| {
            t.messages.len() == 1 && !t.messages[0].timestamp_pending
        })
        .await;
        assert_eq!(timeline.messages[0].text.as_deref(), Some("queued"));
        assert!(screen.composer_visible());
    }

    #[tokio::test]
    async fn resubscribe_releases_previous_listener() {
        let h = Harness::new();
        let mut screen = ChatScreen::mount(h.ctx.clone(), h.session()).await.unwrap();
        screen.resubscribe().await.unwrap();
        screen.resubscribe().await.unwrap();

        time::sleep(Duration::from_millis(20)).await;
        assert_eq!(h.documents.listener_count(), 1);
    }

    #[tokio::test]
    async fn unmount_is_idempotent_and_stops_everything() {
        let h = Harness::new();
        let mut screen = ChatScreen::mount(h.ctx.clone(), h.session()).await.unwrap();
        screen.run_action(ChatAction::RecordAudio).await.unwrap();
        assert_eq!(screen.open_actions()[3], ChatAction::StopRecording);

        screen.unmount().await;
        screen.unmount().await;
        assert_eq!(screen.open_actions()[3], ChatAction::RecordAudio);

        time::sleep(Duration::from_millis(20)).await;
        assert_eq!(h.documents.listener_count(), 0);

        // no delivery after unmount
        let before = screen.messages();
        screen.send_text("late").await.unwrap();
        time::sleep(Duration::from_millis(20)).await;
        assert_eq!(screen.messages(), before);
    }

    #[tokio::test]
    async fn remounted_screen_can_stop_abandoned_recording() {
        let h = Harness::new();
        h.devices.set_recording(h.media_file("voice.m4a", b"aac"));

        let first = ChatScreen::mount(h.ctx.clone(), h.session()).await.unwrap();
        first.run_action(ChatAction::RecordAudio).await.unwrap();
        drop(first);

        let second = ChatScreen::mount(h.ctx.clone(), h.session()).await.unwrap();
        assert_eq!(second.open_actions()[3], ChatAction::StopRecording);
        let err = second.run_action(ChatAction::RecordAudio).await.unwrap_err();
        assert!(matches!(err, ChatError::Device(DeviceError::Busy(_))));

        let outcome = second.run_action(ChatAction::StopRecording).await.unwrap();
        assert!(matches!(outcome, ActionOutcome::Sent(_)));
        assert_eq!(second.open_actions()[3], ChatAction::RecordAudio);
        let timeline = wait_until(&second, |t| t.messages.len() == 1).await;
        assert!(matches!(timeline.messages[0].attachment, Some(Attachment::Audio(_))));
    }

    #[tokio::test]
    async fn subscribe_failure_is_reported() {
        use async_trait::async_trait;
        use parley_net::{DocumentStore, NewDocument, Query, SnapshotReceiver};

        struct Unreachable;

        #[async_trait]
        impl DocumentStore for Unreachable {
            async fn add_document(&self, _: &str, _: NewDocument) -> Result<String, BackendError> {
                Err(BackendError::Unavailable("down".into()))
            }
            async fn listen(&self, _: Query) -> Result<SnapshotReceiver, BackendError> {
                Err(BackendError::Unavailable("down".into()))
            }
            async fn enable_network(&self) -> Result<(), BackendError> {
                Ok(())
            }
            async fn disable_network(&self) -> Result<(), BackendError> {
                Ok(())
            }
        }

        let h = Harness::new();
        let prompts = h.prompts.clone();
        let mut ctx = AppContext::in_memory(Default::default(), prompts.clone());
        ctx.backends.documents = Arc::new(Unreachable);
        ctx.backends.reachability = Arc::new(MemoryReachability::new(ConnectivityState::Unknown));

        let result = ChatScreen::mount(Arc::new(ctx), h.session()).await;
        assert!(matches!(result, Err(ChatError::Subscribe(_))));
        assert_eq!(prompts.last().unwrap().title, "Connection error");
    }
}

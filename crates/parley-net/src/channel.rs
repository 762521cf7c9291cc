//! The message channel: live subscription to the ordered message collection
//! and the write path for new messages.
//!
//! Every snapshot carries the complete ordered list (newest first). There is
//! no diffing and no optimistic echo: a sent message shows up when the
//! backend includes it in the next snapshot.

use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard};
use std::task::{Context, Poll};

use chrono::{DateTime, Utc};
use futures::stream::{self, BoxStream};
use futures::{Stream, StreamExt};
use serde_json::Value;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use parley_shared::constants::CREATED_AT_FIELD;
use parley_shared::{Attachment, Author, BackendError, Draft, GeoPoint, Message, MessageId, WriteError};

use crate::backend::{
    parse_timestamp, Direction, DocumentSnapshot, DocumentStore, NewDocument, Query, QuerySnapshot,
    SnapshotReceiver,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    /// One document was written under this id.
    Written(MessageId),
    /// Blank text and no attachment: nothing was written.
    Skipped,
}

#[derive(Clone)]
pub struct MessageChannel {
    store: Arc<dyn DocumentStore>,
    collection: String,
}

impl MessageChannel {
    pub fn new(store: Arc<dyn DocumentStore>, collection: impl Into<String>) -> Self {
        Self {
            store,
            collection: collection.into(),
        }
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Newest first, by server creation time.
    pub fn query(&self) -> Query {
        Query::new(&self.collection, CREATED_AT_FIELD, Direction::Descending)
    }

    /// Open a live subscription as a stream of full snapshots.
    pub async fn listen(&self) -> Result<Subscription, BackendError> {
        let rx = self.store.listen(self.query()).await?;
        info!(collection = %self.collection, "Subscribed to messages");
        Ok(Subscription {
            snapshots: Some(latest_snapshots(rx)),
        })
    }

    /// Open a live subscription that calls `on_update` with every snapshot
    /// until the returned handle is unsubscribed or dropped.
    pub async fn subscribe<F>(&self, on_update: F) -> Result<SubscriptionHandle, BackendError>
    where
        F: FnMut(Vec<Message>) + Send + 'static,
    {
        let mut subscription = self.listen().await?;
        let slot = Arc::new(Mutex::new(Delivery {
            on_update: Some(on_update),
            released: false,
        }));

        let task_slot = slot.clone();
        let task = tokio::spawn(async move {
            while let Some(messages) = subscription.next_snapshot().await {
                // The callback runs outside the lock so it may release its
                // own handle.
                let taken = {
                    let mut delivery = lock_delivery(&task_slot);
                    if delivery.released {
                        None
                    } else {
                        delivery.on_update.take()
                    }
                };
                let Some(mut on_update) = taken else { break };
                on_update(messages);

                let mut delivery = lock_delivery(&task_slot);
                if delivery.released {
                    break;
                }
                delivery.on_update = Some(on_update);
            }
            subscription.unsubscribe();
        });

        let release: Box<dyn FnOnce() + Send> = Box::new(move || {
            // Once released is set under the lock no new delivery starts.
            let dropped = {
                let mut delivery = lock_delivery(&slot);
                delivery.released = true;
                delivery.on_update.take()
            };
            drop(dropped);
        });

        Ok(SubscriptionHandle {
            task: Some(task),
            release: Some(release),
        })
    }

    /// Write `draft` as a new message by `author`.
    pub async fn send(&self, draft: &Draft, author: &Author) -> Result<SendOutcome, WriteError> {
        if draft.is_empty() {
            debug!("Ignoring empty message");
            return Ok(SendOutcome::Skipped);
        }

        let document = encode_message(draft, author)?;
        let id = self
            .store
            .add_document(&self.collection, document)
            .await
            .map_err(|e| {
                error!(error = %e, collection = %self.collection, "Message write failed");
                WriteError::Backend(e)
            })?;

        info!(
            msg_id = %id,
            author = %author.id.short(),
            attachment = draft.attachment.as_ref().map(Attachment::field_name),
            "Message sent"
        );
        Ok(SendOutcome::Written(MessageId(id)))
    }
}

struct Delivery<F> {
    on_update: Option<F>,
    released: bool,
}

fn lock_delivery<F>(slot: &Mutex<Delivery<F>>) -> MutexGuard<'_, Delivery<F>> {
    slot.lock().unwrap_or_else(|e| e.into_inner())
}

/// Latest snapshots of one live query. A slow reader skips straight to the
/// newest snapshot instead of queueing every intermediate one.
fn latest_snapshots(rx: SnapshotReceiver) -> BoxStream<'static, Vec<Message>> {
    stream::unfold((rx, true), |(mut rx, first)| async move {
        if !first && rx.changed().await.is_err() {
            return None;
        }
        let messages = {
            let snapshot = rx.borrow_and_update();
            decode_snapshot(&snapshot)
        };
        Some((messages, (rx, false)))
    })
    .boxed()
}

/// Stream of full snapshots from one live query.
pub struct Subscription {
    snapshots: Option<BoxStream<'static, Vec<Message>>>,
}

impl Subscription {
    /// Newest full snapshot not yet seen, or `None` once unsubscribed or the
    /// backend dropped the listener.
    pub async fn next_snapshot(&mut self) -> Option<Vec<Message>> {
        self.snapshots.as_mut()?.next().await
    }

    pub fn is_active(&self) -> bool {
        self.snapshots.is_some()
    }

    /// Stop delivery. Safe to call any number of times.
    pub fn unsubscribe(&mut self) {
        if self.snapshots.take().is_some() {
            debug!("Unsubscribed from messages");
        }
    }
}

impl Stream for Subscription {
    type Item = Vec<Message>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        match self.snapshots.as_mut() {
            Some(snapshots) => snapshots.poll_next_unpin(cx),
            None => Poll::Ready(None),
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

/// Handle returned by [`MessageChannel::subscribe`].
pub struct SubscriptionHandle {
    task: Option<JoinHandle<()>>,
    release: Option<Box<dyn FnOnce() + Send>>,
}

impl SubscriptionHandle {
    pub fn is_active(&self) -> bool {
        self.task.is_some()
    }

    /// Stop delivery and release the listener. Idempotent.
    pub fn unsubscribe(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
        if let Some(task) = self.task.take() {
            task.abort();
            debug!("Subscription released");
        }
    }
}

impl Drop for SubscriptionHandle {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

// ---------------------------------------------------------------------------
// Document encoding
// ---------------------------------------------------------------------------

/// Build the document for `draft`: text (if any), the attachment field at the
/// top level, the author under `user`, and a server timestamp sentinel.
pub fn encode_message(draft: &Draft, author: &Author) -> Result<NewDocument, WriteError> {
    let mut document = NewDocument::new();

    if let Some(text) = draft.sendable_text() {
        document.set("text", Value::String(text.to_string()));
    }

    if let Some(attachment) = &draft.attachment {
        let value = match attachment {
            Attachment::Image(url) | Attachment::Audio(url) => Value::String(url.clone()),
            Attachment::Location(point) => {
                serde_json::to_value(point).map_err(|e| WriteError::Encode(e.to_string()))?
            }
        };
        document.set(attachment.field_name(), value);
    }

    let user = serde_json::to_value(author).map_err(|e| WriteError::Encode(e.to_string()))?;
    document.set("user", user);

    Ok(document.with_server_timestamp(CREATED_AT_FIELD))
}

/// Project a query snapshot into render-ready messages, keeping the
/// backend's order.
///
/// Messages whose server timestamp has not resolved yet get the snapshot's
/// read time, so every message in one snapshot shares the same stand-in.
pub fn decode_snapshot(snapshot: &QuerySnapshot) -> Vec<Message> {
    let messages: Vec<Message> = snapshot
        .documents
        .iter()
        .filter_map(|doc| decode_document(doc, snapshot.read_time))
        .collect();
    debug!(count = messages.len(), "Snapshot decoded");
    messages
}

fn decode_document(doc: &DocumentSnapshot, observed_at: DateTime<Utc>) -> Option<Message> {
    let author = match doc.get("user").map(|v| serde_json::from_value::<Author>(v.clone())) {
        Some(Ok(author)) => author,
        Some(Err(e)) => {
            warn!(id = %doc.id, error = %e, "Skipping message with malformed author");
            return None;
        }
        None => {
            warn!(id = %doc.id, "Skipping message without author");
            return None;
        }
    };

    let text = doc
        .get("text")
        .and_then(Value::as_str)
        .filter(|t| !t.is_empty())
        .map(str::to_string);

    let (created_at, timestamp_pending) = match doc.get(CREATED_AT_FIELD).and_then(parse_timestamp) {
        Some(ts) => (ts, false),
        None => (observed_at, true),
    };

    Some(Message {
        id: MessageId(doc.id.clone()),
        text,
        attachment: decode_attachment(doc),
        author,
        created_at,
        timestamp_pending,
    })
}

fn decode_attachment(doc: &DocumentSnapshot) -> Option<Attachment> {
    if let Some(url) = doc.get("image").and_then(Value::as_str) {
        return Some(Attachment::Image(url.to_string()));
    }
    if let Some(location) = doc.get("location") {
        match serde_json::from_value::<GeoPoint>(location.clone()) {
            Ok(point) => return Some(Attachment::Location(point)),
            Err(e) => warn!(id = %doc.id, error = %e, "Ignoring malformed location"),
        }
    }
    doc.get("audio")
        .and_then(Value::as_str)
        .map(|url| Attachment::Audio(url.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryDocumentStore;
    use futures::StreamExt;
    use serde_json::json;
    use std::time::Duration;

    fn channel() -> (MessageChannel, Arc<MemoryDocumentStore>) {
        let store = Arc::new(MemoryDocumentStore::new());
        (MessageChannel::new(store.clone(), "messages"), store)
    }

    fn ann() -> Author {
        Author::new("u1", "Ann")
    }

    #[tokio::test]
    async fn send_text_appears_in_next_snapshot() {
        let (channel, _store) = channel();
        let mut sub = channel.listen().await.unwrap();
        assert!(sub.next_snapshot().await.unwrap().is_empty());

        let outcome = channel.send(&Draft::text("hi"), &ann()).await.unwrap();
        let snapshot = sub.next_snapshot().await.unwrap();

        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].text.as_deref(), Some("hi"));
        assert_eq!(snapshot[0].author, ann());
        assert!(!snapshot[0].timestamp_pending);
        assert_eq!(outcome, SendOutcome::Written(snapshot[0].id.clone()));
    }

    #[tokio::test]
    async fn blank_text_without_attachment_is_not_written() {
        let (channel, store) = channel();
        for text in ["", "   ", "\n\t"] {
            let outcome = channel.send(&Draft::text(text), &ann()).await.unwrap();
            assert_eq!(outcome, SendOutcome::Skipped);
        }
        assert_eq!(channel.send(&Draft::default(), &ann()).await.unwrap(), SendOutcome::Skipped);
        assert_eq!(store.write_count(), 0);
    }

    #[tokio::test]
    async fn location_is_written_at_top_level_without_text() {
        let (channel, store) = channel();
        let point = GeoPoint {
            latitude: 1.0,
            longitude: 2.0,
        };
        channel
            .send(&Draft::attachment(Attachment::Location(point)), &ann())
            .await
            .unwrap();

        let docs = store.documents("messages");
        assert_eq!(docs.len(), 1);
        let fields = &docs[0].fields;
        assert_eq!(fields["location"], json!({ "latitude": 1.0, "longitude": 2.0 }));
        assert!(!fields.contains_key("text"));
        assert!(!fields.contains_key("attachment"));
        assert_eq!(fields["user"], json!({ "_id": "u1", "name": "Ann" }));
        assert!(fields.contains_key("createdAt"));
    }

    #[tokio::test]
    async fn write_failure_is_reported() {
        let (channel, store) = channel();
        store.fail_writes_with(Some(BackendError::Unavailable("down".into())));
        let result = channel.send(&Draft::text("hi"), &ann()).await;
        assert!(matches!(result, Err(WriteError::Backend(BackendError::Unavailable(_)))));
    }

    #[tokio::test]
    async fn pending_timestamp_gets_local_time() {
        let (channel, store) = channel();
        store.disable_network().await.unwrap();
        let mut sub = channel.listen().await.unwrap();
        sub.next_snapshot().await.unwrap();

        let before = Utc::now();
        channel.send(&Draft::text("offline"), &ann()).await.unwrap();
        let pending = sub.next_snapshot().await.unwrap();
        assert!(pending[0].timestamp_pending);
        assert!(pending[0].created_at >= before);

        store.enable_network().await.unwrap();
        let resolved = sub.next_snapshot().await.unwrap();
        assert!(!resolved[0].timestamp_pending);
    }

    #[tokio::test]
    async fn snapshots_are_newest_first() {
        let (channel, _store) = channel();
        channel.send(&Draft::text("first"), &ann()).await.unwrap();
        channel.send(&Draft::text("second"), &ann()).await.unwrap();

        let mut sub = channel.listen().await.unwrap();
        let texts: Vec<_> = sub
            .next()
            .await
            .unwrap()
            .into_iter()
            .map(|m| m.text.unwrap())
            .collect();
        assert_eq!(texts, vec!["second", "first"]);
    }

    #[tokio::test]
    async fn unsubscribe_twice_stops_delivery() {
        let (channel, store) = channel();
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let mut handle = channel
            .subscribe(move |messages| {
                let _ = tx.send(messages.len());
            })
            .await
            .unwrap();

        assert_eq!(rx.recv().await, Some(0));
        channel.send(&Draft::text("one"), &ann()).await.unwrap();
        assert_eq!(rx.recv().await, Some(1));

        handle.unsubscribe();
        handle.unsubscribe();
        assert!(!handle.is_active());

        channel.send(&Draft::text("two"), &ann()).await.unwrap();
        let late = tokio::time::timeout(Duration::from_millis(100), rx.recv()).await;
        assert!(matches!(late, Ok(None) | Err(_)));

        // let the aborted forwarding task be dropped
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(store.listener_count(), 0);
    }

    #[tokio::test]
    async fn callback_can_release_its_own_handle() {
        let (channel, store) = channel();
        let slot: Arc<Mutex<Option<SubscriptionHandle>>> = Arc::new(Mutex::new(None));
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();

        let inner = slot.clone();
        let handle = channel
            .subscribe(move |messages| {
                let _ = tx.send(messages.len());
                if let Some(mut own) = inner.lock().unwrap().take() {
                    own.unsubscribe();
                }
            })
            .await
            .unwrap();
        *slot.lock().unwrap() = Some(handle);

        assert_eq!(rx.recv().await, Some(0));
        channel.send(&Draft::text("one"), &ann()).await.unwrap();
        // The released callback is dropped along with its sender.
        let closed = tokio::time::timeout(Duration::from_secs(1), rx.recv()).await;
        assert_eq!(closed, Ok(None));

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(store.listener_count(), 0);
    }

    #[tokio::test]
    async fn slow_reader_skips_to_latest_snapshot() {
        let (channel, _store) = channel();
        let mut sub = channel.listen().await.unwrap();
        for text in ["one", "two", "three"] {
            channel.send(&Draft::text(text), &ann()).await.unwrap();
        }

        let latest = sub.next_snapshot().await.unwrap();
        assert_eq!(latest.len(), 3);
        assert_eq!(latest[0].text.as_deref(), Some("three"));

        let queued = tokio::time::timeout(Duration::from_millis(50), sub.next_snapshot()).await;
        assert!(queued.is_err());
    }

    #[tokio::test]
    async fn stream_unsubscribe_is_idempotent() {
        let (channel, store) = channel();
        let mut sub = channel.listen().await.unwrap();
        sub.unsubscribe();
        sub.unsubscribe();
        assert!(!sub.is_active());
        assert!(sub.next_snapshot().await.is_none());
        assert_eq!(store.listener_count(), 0);
    }

    #[test]
    fn documents_without_author_are_skipped() {
        let mut fields = crate::backend::Fields::new();
        fields.insert("text".into(), json!("orphan"));
        let snapshot = QuerySnapshot {
            documents: vec![DocumentSnapshot {
                id: "x".into(),
                fields,
                has_pending_writes: false,
            }],
            read_time: Utc::now(),
        };
        assert!(decode_snapshot(&snapshot).is_empty());
    }

    #[test]
    fn decodes_millisecond_timestamps_and_audio() {
        let mut fields = crate::backend::Fields::new();
        fields.insert("audio".into(), json!("memory://b/audio/u1_1_rec.m4a"));
        fields.insert("user".into(), json!({ "_id": "u1", "name": "Ann" }));
        fields.insert("createdAt".into(), json!(1_700_000_000_000i64));
        let snapshot = QuerySnapshot {
            documents: vec![DocumentSnapshot {
                id: "x".into(),
                fields,
                has_pending_writes: false,
            }],
            read_time: Utc::now(),
        };
        let messages = decode_snapshot(&snapshot);
        assert_eq!(messages[0].created_at.timestamp_millis(), 1_700_000_000_000);
        assert_eq!(
            messages[0].attachment,
            Some(Attachment::Audio("memory://b/audio/u1_1_rec.m4a".into()))
        );
        assert_eq!(messages[0].text, None);
    }
}

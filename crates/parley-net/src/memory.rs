//! In-process implementations of every backend boundary.
//!
//! They behave like the hosted services closely enough to run the whole
//! client headless: live queries re-deliver the full ordered result after
//! each write, server timestamps stay `null` while the network is disabled,
//! and each backend can be told to fail.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering as AtomicOrdering};
use std::sync::Mutex;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{SecondsFormat, Utc};
use serde_json::Value;
use tokio::sync::watch;
use tracing::{debug, info};
use uuid::Uuid;

use parley_shared::{BackendError, ConnectivityState, UserId};

use crate::backend::{
    parse_timestamp, BlobStore, Direction, DocumentSnapshot, DocumentStore, Fields,
    IdentityProvider, NewDocument, Query, QuerySnapshot, SnapshotReceiver,
};
use crate::reachability::Reachability;

// ---------------------------------------------------------------------------
// Document store
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct StoredDocument {
    id: String,
    seq: u64,
    fields: Fields,
    /// Server-timestamp fields still waiting for the network.
    pending: Vec<String>,
}

impl StoredDocument {
    fn to_snapshot(&self) -> DocumentSnapshot {
        DocumentSnapshot {
            id: self.id.clone(),
            fields: self.fields.clone(),
            has_pending_writes: !self.pending.is_empty(),
        }
    }
}

struct Listener {
    query: Query,
    tx: watch::Sender<QuerySnapshot>,
}

struct DocumentState {
    collections: HashMap<String, Vec<StoredDocument>>,
    listeners: Vec<Listener>,
    network_enabled: bool,
    network_history: Vec<bool>,
    fail_writes: Option<BackendError>,
    writes: usize,
    next_seq: u64,
}

pub struct MemoryDocumentStore {
    state: Mutex<DocumentState>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(DocumentState {
                collections: HashMap::new(),
                listeners: Vec::new(),
                network_enabled: true,
                network_history: Vec::new(),
                fail_writes: None,
                writes: 0,
                next_seq: 0,
            }),
        }
    }

    /// Make every following write fail with `error` (`None` to recover).
    pub fn fail_writes_with(&self, error: Option<BackendError>) {
        self.lock().fail_writes = error;
    }

    /// Number of successful writes so far.
    pub fn write_count(&self) -> usize {
        self.lock().writes
    }

    pub fn document_count(&self, collection: &str) -> usize {
        self.lock()
            .collections
            .get(collection)
            .map_or(0, Vec::len)
    }

    /// Raw fields of every document in `collection`, in insertion order.
    pub fn documents(&self, collection: &str) -> Vec<DocumentSnapshot> {
        self.lock()
            .collections
            .get(collection)
            .map(|docs| docs.iter().map(StoredDocument::to_snapshot).collect())
            .unwrap_or_default()
    }

    pub fn is_network_enabled(&self) -> bool {
        self.lock().network_enabled
    }

    /// Every enable (`true`) / disable (`false`) call, in order.
    pub fn network_history(&self) -> Vec<bool> {
        self.lock().network_history.clone()
    }

    /// Live listeners whose receiver is still open.
    pub fn listener_count(&self) -> usize {
        let mut state = self.lock();
        state.listeners.retain(|l| !l.tx.is_closed());
        state.listeners.len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, DocumentState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for MemoryDocumentStore {
    fn default() -> Self {
        Self::new()
    }
}

impl DocumentState {
    fn snapshot_for(&self, query: &Query) -> QuerySnapshot {
        let mut docs: Vec<&StoredDocument> = self
            .collections
            .get(&query.collection)
            .map(|docs| docs.iter().collect())
            .unwrap_or_default();

        // Unresolved values compare lowest, so they end up last when the
        // query is descending.
        docs.sort_by(|a, b| {
            let ka = a.fields.get(&query.order_by).and_then(parse_timestamp);
            let kb = b.fields.get(&query.order_by).and_then(parse_timestamp);
            let ord: Ordering = ka.cmp(&kb).then(a.seq.cmp(&b.seq));
            match query.direction {
                Direction::Ascending => ord,
                Direction::Descending => ord.reverse(),
            }
        });

        QuerySnapshot {
            documents: docs.into_iter().map(StoredDocument::to_snapshot).collect(),
            read_time: Utc::now(),
        }
    }

    /// Replace the latest snapshot of every listener on `collection` (all
    /// when `None`), dropping listeners whose receiver is gone.
    fn notify(&mut self, collection: Option<&str>) {
        let mut listeners = std::mem::take(&mut self.listeners);
        listeners.retain(|listener| {
            if collection.is_some_and(|c| c != listener.query.collection) {
                return !listener.tx.is_closed();
            }
            let snapshot = self.snapshot_for(&listener.query);
            listener.tx.send(snapshot).is_ok()
        });
        self.listeners = listeners;
    }
}

fn server_now() -> Value {
    Value::String(Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true))
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn add_document(&self, collection: &str, document: NewDocument) -> Result<String, BackendError> {
        let mut state = self.lock();
        if let Some(err) = state.fail_writes.clone() {
            return Err(err);
        }

        let NewDocument {
            mut fields,
            server_timestamps,
        } = document;
        let mut pending = Vec::new();
        for field in server_timestamps {
            if state.network_enabled {
                fields.insert(field, server_now());
            } else {
                fields.insert(field.clone(), Value::Null);
                pending.push(field);
            }
        }

        let id = Uuid::new_v4().simple().to_string();
        let seq = state.next_seq;
        state.next_seq += 1;
        state.writes += 1;
        state
            .collections
            .entry(collection.to_string())
            .or_default()
            .push(StoredDocument {
                id: id.clone(),
                seq,
                fields,
                pending,
            });

        debug!(id = %id, collection, "Document added");
        state.notify(Some(collection));
        Ok(id)
    }

    async fn listen(&self, query: Query) -> Result<SnapshotReceiver, BackendError> {
        let mut state = self.lock();
        let initial = state.snapshot_for(&query);
        let (tx, rx) = watch::channel(initial);
        debug!(collection = %query.collection, "Listener registered");
        state.listeners.push(Listener { query, tx });
        Ok(rx)
    }

    async fn enable_network(&self) -> Result<(), BackendError> {
        let mut state = self.lock();
        state.network_history.push(true);
        if state.network_enabled {
            return Ok(());
        }
        state.network_enabled = true;

        let mut resolved = 0usize;
        for docs in state.collections.values_mut() {
            for doc in docs.iter_mut() {
                for field in doc.pending.drain(..) {
                    doc.fields.insert(field, server_now());
                    resolved += 1;
                }
            }
        }
        info!(resolved, "Network enabled");
        state.notify(None);
        Ok(())
    }

    async fn disable_network(&self) -> Result<(), BackendError> {
        let mut state = self.lock();
        state.network_history.push(false);
        state.network_enabled = false;
        info!("Network disabled");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Blob store
// ---------------------------------------------------------------------------

/// Objects kept in memory, addressed as `memory://<bucket>/<key>`.
pub struct MemoryBlobStore {
    bucket: String,
    objects: Mutex<HashMap<String, Bytes>>,
    fail_puts: Mutex<Option<BackendError>>,
    fail_urls: Mutex<Option<BackendError>>,
}

impl MemoryBlobStore {
    pub fn new(bucket: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            objects: Mutex::new(HashMap::new()),
            fail_puts: Mutex::new(None),
            fail_urls: Mutex::new(None),
        }
    }

    pub fn fail_puts_with(&self, error: Option<BackendError>) {
        *self.fail_puts.lock().unwrap_or_else(|e| e.into_inner()) = error;
    }

    /// Stored objects stay put; only resolving their URL fails.
    pub fn fail_urls_with(&self, error: Option<BackendError>) {
        *self.fail_urls.lock().unwrap_or_else(|e| e.into_inner()) = error;
    }

    pub fn object(&self, key: &str) -> Option<Bytes> {
        self.objects
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(key)
            .cloned()
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .objects
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .keys()
            .cloned()
            .collect();
        keys.sort();
        keys
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn put_object(&self, key: &str, data: Bytes) -> Result<(), BackendError> {
        if let Some(err) = self.fail_puts.lock().unwrap_or_else(|e| e.into_inner()).clone() {
            return Err(err);
        }
        let mut objects = self.objects.lock().unwrap_or_else(|e| e.into_inner());
        if objects.contains_key(key) {
            return Err(BackendError::Rejected(format!("object already exists: {key}")));
        }
        debug!(key, size = data.len(), "Stored object");
        objects.insert(key.to_string(), data);
        Ok(())
    }

    async fn download_url(&self, key: &str) -> Result<String, BackendError> {
        if let Some(err) = self.fail_urls.lock().unwrap_or_else(|e| e.into_inner()).clone() {
            return Err(err);
        }
        let objects = self.objects.lock().unwrap_or_else(|e| e.into_inner());
        if !objects.contains_key(key) {
            return Err(BackendError::NotFound(key.to_string()));
        }
        Ok(format!("memory://{}/{}", self.bucket, key))
    }
}

// ---------------------------------------------------------------------------
// Identity
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MemoryIdentity {
    uid: Mutex<Option<UserId>>,
    fail: AtomicBool,
}

impl MemoryIdentity {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, AtomicOrdering::SeqCst);
    }

    pub fn current_user(&self) -> Option<UserId> {
        self.uid.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

#[async_trait]
impl IdentityProvider for MemoryIdentity {
    async fn sign_in_anonymously(&self) -> Result<UserId, BackendError> {
        if self.fail.load(AtomicOrdering::SeqCst) {
            return Err(BackendError::Unavailable("identity provider offline".into()));
        }
        let mut uid = self.uid.lock().unwrap_or_else(|e| e.into_inner());
        let id = uid
            .get_or_insert_with(|| UserId::new(Uuid::new_v4().simple().to_string()))
            .clone();
        Ok(id)
    }
}

// ---------------------------------------------------------------------------
// Reachability
// ---------------------------------------------------------------------------

/// Scriptable reachability: the pushed state and the state `fetch` reports
/// can diverge, which is how a stale platform signal looks.
pub struct MemoryReachability {
    pushed: watch::Sender<ConnectivityState>,
    actual: Mutex<ConnectivityState>,
    fetches: AtomicUsize,
    fail_fetch: AtomicBool,
}

impl MemoryReachability {
    pub fn new(initial: ConnectivityState) -> Self {
        let (pushed, _) = watch::channel(initial);
        Self {
            pushed,
            actual: Mutex::new(initial),
            fetches: AtomicUsize::new(0),
            fail_fetch: AtomicBool::new(false),
        }
    }

    /// The platform reports `state`, and it is true.
    pub fn push(&self, state: ConnectivityState) {
        *self.actual.lock().unwrap_or_else(|e| e.into_inner()) = state;
        self.pushed.send_replace(state);
    }

    /// The network changes without a push notification.
    pub fn set_actual(&self, state: ConnectivityState) {
        *self.actual.lock().unwrap_or_else(|e| e.into_inner()) = state;
    }

    pub fn set_fetch_failing(&self, fail: bool) {
        self.fail_fetch.store(fail, AtomicOrdering::SeqCst);
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(AtomicOrdering::SeqCst)
    }
}

#[async_trait]
impl Reachability for MemoryReachability {
    fn observe(&self) -> watch::Receiver<ConnectivityState> {
        self.pushed.subscribe()
    }

    async fn fetch(&self) -> Result<ConnectivityState, BackendError> {
        self.fetches.fetch_add(1, AtomicOrdering::SeqCst);
        if self.fail_fetch.load(AtomicOrdering::SeqCst) {
            return Err(BackendError::Unavailable("reachability check failed".into()));
        }
        Ok(*self.actual.lock().unwrap_or_else(|e| e.into_inner()))
    }
}

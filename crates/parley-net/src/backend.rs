//! Boundaries of the hosted backends.
//!
//! The document store, blob store and identity provider are external
//! services. The client only ever talks to them through these traits, so a
//! hosted SDK binding, the in-memory backends in [`crate::memory`] and the
//! filesystem blob store are interchangeable.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, TimeZone, Utc};
use serde_json::Value;
use tokio::sync::watch;

use parley_shared::{BackendError, UserId};

/// Top-level fields of a document.
pub type Fields = serde_json::Map<String, Value>;

/// Receiving half of a live query. It always holds the latest full snapshot,
/// starting with the initial result. Dropping it ends the listener.
pub type SnapshotReceiver = watch::Receiver<QuerySnapshot>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Ascending,
    Descending,
}

/// An ordered query over one collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    pub collection: String,
    pub order_by: String,
    pub direction: Direction,
}

impl Query {
    pub fn new(collection: impl Into<String>, order_by: impl Into<String>, direction: Direction) -> Self {
        Self {
            collection: collection.into(),
            order_by: order_by.into(),
            direction,
        }
    }
}

/// A document to be added, plus the fields the backend must fill with its
/// own clock (the server timestamp sentinel).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NewDocument {
    pub fields: Fields,
    pub server_timestamps: Vec<String>,
}

impl NewDocument {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, field: impl Into<String>, value: Value) {
        self.fields.insert(field.into(), value);
    }

    pub fn with_server_timestamp(mut self, field: impl Into<String>) -> Self {
        self.server_timestamps.push(field.into());
        self
    }
}

/// One document as observed by a listener.
///
/// A server timestamp that has not resolved yet reads as `null` and
/// `has_pending_writes` is set.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentSnapshot {
    pub id: String,
    pub fields: Fields,
    pub has_pending_writes: bool,
}

impl DocumentSnapshot {
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field).filter(|v| !v.is_null())
    }
}

/// Full, ordered materialisation of a query at one point in time.
#[derive(Debug, Clone, PartialEq)]
pub struct QuerySnapshot {
    pub documents: Vec<DocumentSnapshot>,
    pub read_time: DateTime<Utc>,
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Add a document and return the id the backend assigned to it.
    async fn add_document(&self, collection: &str, document: NewDocument) -> Result<String, BackendError>;

    /// Start a live query. The receiver holds the current result right away
    /// and is handed a new full result after every change.
    async fn listen(&self, query: Query) -> Result<SnapshotReceiver, BackendError>;

    async fn enable_network(&self) -> Result<(), BackendError>;

    async fn disable_network(&self) -> Result<(), BackendError>;
}

#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn put_object(&self, key: &str, data: Bytes) -> Result<(), BackendError>;

    async fn download_url(&self, key: &str) -> Result<String, BackendError>;
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Anonymous sign-in. Returns the same uid for as long as the provider
    /// keeps its own session.
    async fn sign_in_anonymously(&self) -> Result<UserId, BackendError>;
}

/// Read a resolved timestamp field.
///
/// Accepts RFC 3339 strings, integer epoch milliseconds and
/// `{ "seconds", "nanos" }` objects. `null` or anything else is unresolved.
pub fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => DateTime::parse_from_rfc3339(s)
            .ok()
            .map(|dt| dt.with_timezone(&Utc)),
        Value::Number(n) => n
            .as_i64()
            .and_then(|ms| Utc.timestamp_millis_opt(ms).single()),
        Value::Object(map) => {
            let seconds = map.get("seconds")?.as_i64()?;
            let nanos = map.get("nanos").and_then(Value::as_u64).unwrap_or(0);
            Utc.timestamp_opt(seconds, u32::try_from(nanos).ok()?).single()
        }
        _ => None,
    }
}

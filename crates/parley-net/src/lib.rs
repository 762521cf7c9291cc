// Backend boundaries and the real-time message synchronisation core.

pub mod backend;
pub mod blob_store;
pub mod channel;
pub mod connectivity;
pub mod memory;
pub mod reachability;

pub use backend::{
    BlobStore, Direction, DocumentSnapshot, DocumentStore, Fields, IdentityProvider, NewDocument,
    Query, QuerySnapshot, SnapshotReceiver,
};
pub use blob_store::FsBlobStore;
pub use channel::{MessageChannel, SendOutcome, Subscription, SubscriptionHandle};
pub use connectivity::ConnectivityMonitor;
pub use memory::{MemoryBlobStore, MemoryDocumentStore, MemoryIdentity, MemoryReachability};
pub use reachability::Reachability;

use async_trait::async_trait;
use tokio::sync::watch;

use parley_shared::{BackendError, ConnectivityState};

/// Device network-reachability observer.
#[async_trait]
pub trait Reachability: Send + Sync {
    /// Push-style notifications. Starts at `Unknown` until the platform
    /// reports its first observation.
    fn observe(&self) -> watch::Receiver<ConnectivityState>;

    /// On-demand re-check, used by the recovery poll when the push signal
    /// is stale.
    async fn fetch(&self) -> Result<ConnectivityState, BackendError>;
}

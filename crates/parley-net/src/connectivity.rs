//! Connectivity monitor.
//!
//! Follows the platform's reachability notifications and switches the
//! document store's network on and off to match. Some platforms report a
//! `disconnected` that is never followed by a `connected` push, so while
//! offline a recovery poll re-checks reachability on a fixed interval until
//! it sees the network again.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, Interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use parley_shared::ConnectivityState;

use crate::backend::DocumentStore;
use crate::reachability::Reachability;

pub struct ConnectivityMonitor {
    state: watch::Receiver<ConnectivityState>,
    task: Option<JoinHandle<()>>,
}

impl ConnectivityMonitor {
    /// Spawn the monitor task. It runs until [`shutdown`](Self::shutdown),
    /// drop, or the reachability observer going away.
    pub fn spawn(
        reachability: Arc<dyn Reachability>,
        network: Arc<dyn DocumentStore>,
        poll_interval: Duration,
    ) -> Self {
        let (state_tx, state_rx) = watch::channel(ConnectivityState::Unknown);
        let driver = Driver {
            reachability,
            network,
            poll_interval,
            state_tx,
            backend_enabled: None,
            poll: None,
        };
        let task = tokio::spawn(driver.run());

        Self {
            state: state_rx,
            task: Some(task),
        }
    }

    pub fn state(&self) -> ConnectivityState {
        *self.state.borrow()
    }

    /// `Unknown` counts as online.
    pub fn is_online(&self) -> bool {
        self.state().assume_online()
    }

    pub fn watch(&self) -> watch::Receiver<ConnectivityState> {
        self.state.clone()
    }

    /// Stop following reachability and cancel any recovery poll. Idempotent.
    pub fn shutdown(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            debug!("Connectivity monitor stopped");
        }
    }
}

impl Drop for ConnectivityMonitor {
    fn drop(&mut self) {
        self.shutdown();
    }
}

struct Driver {
    reachability: Arc<dyn Reachability>,
    network: Arc<dyn DocumentStore>,
    poll_interval: Duration,
    state_tx: watch::Sender<ConnectivityState>,
    /// Last network switch that succeeded; `None` before the first one.
    backend_enabled: Option<bool>,
    poll: Option<Interval>,
}

impl Driver {
    async fn run(mut self) {
        let mut observed = self.reachability.observe();
        let initial = *observed.borrow_and_update();
        self.on_observed(initial).await;

        loop {
            tokio::select! {
                changed = observed.changed() => {
                    if changed.is_err() {
                        debug!("Reachability observer closed");
                        break;
                    }
                    let state = *observed.borrow_and_update();
                    self.on_observed(state).await;
                }
                _ = next_tick(&mut self.poll) => self.poll_once().await,
            }
        }
    }

    async fn on_observed(&mut self, state: ConnectivityState) {
        debug!(%state, "Reachability changed");
        match state {
            ConnectivityState::Unknown => {}
            ConnectivityState::Connected => {
                self.stop_poll();
                self.switch_network(true).await;
                self.publish(ConnectivityState::Connected);
            }
            ConnectivityState::Disconnected => {
                self.switch_network(false).await;
                self.publish(ConnectivityState::Disconnected);
                self.start_poll();
            }
        }
    }

    async fn poll_once(&mut self) {
        match self.reachability.fetch().await {
            Ok(ConnectivityState::Connected) => {
                info!("Recovery poll sees the network again");
                self.stop_poll();
                self.switch_network(true).await;
                self.publish(ConnectivityState::Connected);
            }
            Ok(state) => debug!(%state, "Still offline"),
            Err(e) => debug!(error = %e, "Reachability check failed"),
        }
    }

    fn start_poll(&mut self) {
        if self.poll.is_some() {
            return;
        }
        let mut interval = time::interval_at(Instant::now() + self.poll_interval, self.poll_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        self.poll = Some(interval);
        debug!(interval_ms = self.poll_interval.as_millis() as u64, "Recovery poll started");
    }

    fn stop_poll(&mut self) {
        if self.poll.take().is_some() {
            debug!("Recovery poll stopped");
        }
    }

    async fn switch_network(&mut self, enabled: bool) {
        if self.backend_enabled == Some(enabled) {
            return;
        }
        let result = if enabled {
            self.network.enable_network().await
        } else {
            self.network.disable_network().await
        };
        match result {
            Ok(()) => {
                info!(enabled, "Backend network switched");
                self.backend_enabled = Some(enabled);
            }
            Err(e) => warn!(enabled, error = %e, "Failed to switch backend network"),
        }
    }

    fn publish(&self, state: ConnectivityState) {
        self.state_tx.send_if_modified(|current| {
            if *current == state {
                false
            } else {
                *current = state;
                true
            }
        });
    }
}

async fn next_tick(poll: &mut Option<Interval>) {
    match poll {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{MemoryDocumentStore, MemoryReachability};
    use ConnectivityState::{Connected, Disconnected, Unknown};

    const POLL: Duration = Duration::from_millis(1500);

    fn setup(initial: ConnectivityState) -> (ConnectivityMonitor, Arc<MemoryReachability>, Arc<MemoryDocumentStore>) {
        let reach = Arc::new(MemoryReachability::new(initial));
        let store = Arc::new(MemoryDocumentStore::new());
        let monitor = ConnectivityMonitor::spawn(reach.clone(), store.clone(), POLL);
        (monitor, reach, store)
    }

    async fn wait_for(monitor: &ConnectivityMonitor, target: ConnectivityState) {
        let mut rx = monitor.watch();
        time::timeout(Duration::from_secs(60), rx.wait_for(|s| *s == target))
            .await
            .expect("state not reached")
            .expect("monitor gone");
    }

    #[tokio::test(start_paused = true)]
    async fn unknown_assumes_online_and_touches_nothing() {
        let (monitor, reach, store) = setup(Unknown);
        time::sleep(Duration::from_secs(5)).await;
        assert_eq!(monitor.state(), Unknown);
        assert!(monitor.is_online());
        assert!(store.network_history().is_empty());
        assert_eq!(reach.fetch_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn connected_enables_without_polling() {
        let (monitor, reach, store) = setup(Unknown);
        reach.push(Connected);
        wait_for(&monitor, Connected).await;
        time::sleep(Duration::from_secs(10)).await;
        assert_eq!(store.network_history(), vec![true]);
        assert_eq!(reach.fetch_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn recovers_through_poll_when_push_is_stale() {
        let (monitor, reach, store) = setup(Unknown);
        reach.push(Disconnected);
        wait_for(&monitor, Disconnected).await;
        assert!(!monitor.is_online());
        assert_eq!(store.network_history(), vec![false]);

        // two ticks, still offline
        time::sleep(Duration::from_millis(3100)).await;
        assert!(reach.fetch_count() >= 2);
        assert_eq!(monitor.state(), Disconnected);

        // back online, but the platform never says so
        reach.set_actual(Connected);
        wait_for(&monitor, Connected).await;
        assert_eq!(store.network_history(), vec![false, true]);

        let fetches = reach.fetch_count();
        time::sleep(Duration::from_secs(10)).await;
        assert_eq!(reach.fetch_count(), fetches);

        // a late push must not enable a second time
        reach.push(Connected);
        time::sleep(Duration::from_millis(10)).await;
        assert_eq!(store.network_history(), vec![false, true]);
    }

    #[tokio::test(start_paused = true)]
    async fn push_reconnect_stops_poll() {
        let (monitor, reach, store) = setup(Connected);
        wait_for(&monitor, Connected).await;
        reach.push(Disconnected);
        wait_for(&monitor, Disconnected).await;
        reach.push(Connected);
        wait_for(&monitor, Connected).await;

        time::sleep(Duration::from_secs(10)).await;
        assert_eq!(reach.fetch_count(), 0);
        assert_eq!(store.network_history(), vec![true, false, true]);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_checks_keep_polling() {
        let (monitor, reach, _store) = setup(Disconnected);
        wait_for(&monitor, Disconnected).await;
        reach.set_fetch_failing(true);
        time::sleep(Duration::from_millis(3100)).await;
        assert!(reach.fetch_count() >= 2);

        reach.set_fetch_failing(false);
        reach.set_actual(Connected);
        wait_for(&monitor, Connected).await;
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_cancels_poll() {
        let (mut monitor, reach, _store) = setup(Disconnected);
        wait_for(&monitor, Disconnected).await;
        monitor.shutdown();
        monitor.shutdown();
        time::sleep(Duration::from_secs(10)).await;
        assert_eq!(reach.fetch_count(), 0);
    }
}

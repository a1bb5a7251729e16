//! Connectivity state shared between the platform layer and the sync worker.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::watch;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectivityState {
    Online,
    Offline,
}

/// Latest connectivity reported by the platform (network reachability
/// callbacks) or inferred from transport failures.
///
/// This struct is cheap to clone; all clones publish to the same channel.
#[derive(Debug, Clone)]
pub struct ConnectivityMonitor {
    tx: Arc<watch::Sender<ConnectivityState>>,
}

impl ConnectivityMonitor {
    pub fn new(initial: ConnectivityState) -> Self {
        let (tx, _rx) = watch::channel(initial);
        Self { tx: Arc::new(tx) }
    }

    pub fn state(&self) -> ConnectivityState {
        *self.tx.borrow()
    }

    pub fn is_offline(&self) -> bool {
        self.state() == ConnectivityState::Offline
    }

    /// Mark the client as offline.
    pub fn set_offline(&self) -> bool {
        self.report(ConnectivityState::Offline)
    }

    /// Mark the client as online.
    pub fn set_online(&self) -> bool {
        self.report(ConnectivityState::Online)
    }

    /// Publish `state`; returns `true` if it differs from the previous one.
    ///
    /// Subscribers are only woken on actual transitions.
    pub fn report(&self, state: ConnectivityState) -> bool {
        let changed = self.tx.send_if_modified(|current| {
            if *current == state {
                return false;
            }
            *current = state;
            true
        });
        if changed {
            tracing::info!(?state, "connectivity changed");
        }
        changed
    }

    pub fn subscribe(&self) -> watch::Receiver<ConnectivityState> {
        self.tx.subscribe()
    }
}

impl Default for ConnectivityMonitor {
    fn default() -> Self {
        Self::new(ConnectivityState::Online)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeated_reports_are_not_transitions() {
        let monitor = ConnectivityMonitor::new(ConnectivityState::Online);

        assert!(!monitor.set_online());
        assert!(monitor.set_offline());
        assert!(!monitor.set_offline());
        assert!(monitor.is_offline());
    }

    #[tokio::test]
    async fn subscribers_see_transitions() {
        let monitor = ConnectivityMonitor::new(ConnectivityState::Offline);
        let mut rx = monitor.subscribe();

        monitor.clone().set_online();

        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow_and_update(), ConnectivityState::Online);
        assert!(!rx.has_changed().unwrap());
    }
}

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

/// Controller level values surfaced to the automation layer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ControllerStatus {
    /// Whether the webhook listener is accepting connections.
    pub online: bool,
    /// Port the listener is bound to, `0` while offline.
    pub port: u16,
    /// Number of distinct clients seen since start.
    pub client_count: usize,
    /// Rapid trigger window, `None` when the feature is disabled.
    pub rapid_trigger: Option<Duration>,
}

/// Shared publisher of the latest [`ControllerStatus`].
///
/// Cloned into every component that changes a status value; observers hold a
/// [`watch::Receiver`] obtained from [`subscribe`](Self::subscribe).
#[derive(Debug, Clone)]
pub struct StatusBoard {
    tx: Arc<watch::Sender<ControllerStatus>>,
}

impl StatusBoard {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(ControllerStatus::default());
        Self { tx: Arc::new(tx) }
    }

    pub fn subscribe(&self) -> watch::Receiver<ControllerStatus> {
        self.tx.subscribe()
    }

    pub fn current(&self) -> ControllerStatus {
        self.tx.borrow().clone()
    }

    pub fn set_listener(&self, online: bool, port: u16) {
        self.tx.send_if_modified(|status| {
            let changed = status.online != online || status.port != port;
            status.online = online;
            status.port = port;
            changed
        });
    }

    pub fn set_client_count(&self, client_count: usize) {
        self.tx.send_if_modified(|status| {
            let changed = status.client_count != client_count;
            status.client_count = client_count;
            changed
        });
    }

    pub fn set_rapid_trigger(&self, rapid_trigger: Option<Duration>) {
        self.tx.send_if_modified(|status| {
            let changed = status.rapid_trigger != rapid_trigger;
            status.rapid_trigger = rapid_trigger;
            changed
        });
    }
}

impl Default for StatusBoard {
    fn default() -> Self {
        Self::new()
    }
}

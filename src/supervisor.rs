//! Tick driven supervision of the listener and the per-client rapid trigger state.
//!
//! The host scheduler delivers two cadences:
//!
//! - **short poll**: every client is reset to idle, closing the rapid trigger window.
//! - **long poll**: the client count is republished and a listener that should be serving but is
//!   not gets started again, whether its task died or its last bind failed.
//!
//! Ticks are handled one at a time, concurrently with the listener's own task.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::dispatcher::Dispatcher;
use crate::listener::{Listener, ListenerConfig, ListenerError};
use crate::status::StatusBoard;

/// A periodic signal from the host scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tick {
    ShortPoll,
    LongPoll,
}

#[derive(Debug)]
pub struct HealthSupervisor {
    listener: Listener,
    dispatcher: Arc<Dispatcher>,
    status: StatusBoard,
    /// Set by [`start`](Self::start), cleared only by [`shutdown`](Self::shutdown).
    keep_running: bool,
}

impl HealthSupervisor {
    pub fn new(listener: Listener, dispatcher: Arc<Dispatcher>, status: StatusBoard) -> Self {
        Self {
            listener,
            dispatcher,
            status,
            keep_running: false,
        }
    }

    pub fn listener(&self) -> &Listener {
        &self.listener
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    /// Start the listener with its current configuration.
    ///
    /// On failure every following long poll tries again.
    pub async fn start(&mut self) -> Result<SocketAddr, ListenerError> {
        self.keep_running = true;
        self.listener.start().await.inspect_err(|e| {
            error!(error = %e, "Failed to start webhook listener");
        })
    }

    /// Apply a new configuration and restart the listener with it.
    ///
    /// The rapid trigger window only applies to clients registered afterwards.
    pub async fn reconfigure(
        &mut self,
        config: ListenerConfig,
    ) -> Result<SocketAddr, ListenerError> {
        info!(
            port = config.port,
            rapid_trigger_secs = config.rapid_trigger_secs,
            short_poll_secs = config.short_poll_secs,
            "Applying listener configuration"
        );

        self.dispatcher
            .set_rapid_trigger_secs(config.rapid_trigger_secs);

        self.listener.stop().await;
        self.listener.set_config(config);
        self.start().await
    }

    pub async fn tick(&mut self, tick: Tick) {
        match tick {
            Tick::ShortPoll => {
                self.on_short_poll();
            }
            Tick::LongPoll => self.on_long_poll().await,
        }
    }

    /// Reset every client, returning how many were armed or triggered.
    pub fn on_short_poll(&self) -> usize {
        let cleared = self.dispatcher.reset_all();
        if cleared > 0 {
            debug!(cleared, "Rapid trigger state reset");
        }
        cleared
    }

    /// Republish the client count and bring the listener back if it should be serving.
    pub async fn on_long_poll(&mut self) {
        self.status.set_client_count(self.dispatcher.client_count());

        if !self.keep_running || self.listener.is_running() {
            return;
        }

        if self.listener.is_started() {
            error!("Webhook listener task is not running, restarting");
        } else {
            warn!("Webhook listener is not bound, retrying");
        }
        // Failure is already logged and retried on the next long poll.
        let _ = self.start().await;
    }

    /// Process ticks until the sending side closes.
    pub async fn run(&mut self, mut ticks: mpsc::Receiver<Tick>) {
        while let Some(tick) = ticks.recv().await {
            self.tick(tick).await;
        }
        debug!("Tick channel closed");
    }

    /// Stop the listener and release its port.
    pub async fn shutdown(&mut self) {
        self.keep_running = false;
        self.listener.stop().await;
        info!("Plex webhook service stopped");
    }
}

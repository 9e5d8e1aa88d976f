use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use tracing::{debug, error, info, warn};

use crate::body::EventRecord;
use crate::client::ClientId;
use crate::client_context::{ClientContext, ClientSnapshot};
use crate::client_map::ClientMap;
use crate::state_machine::rapid_trigger::TriggerState;
use crate::status::StatusBoard;

/// Outcome of [`Dispatcher::handle`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatch {
    /// The record did not identify a client. Nothing changed.
    Ignored,
    Updated {
        client_id: ClientId,
        created: bool,
        transition: Option<TriggerState>,
    },
}

/// Routes event records to per-client state, registering clients on first sight.
#[derive(Debug)]
pub struct Dispatcher {
    clients: ClientMap<ClientContext>,
    rapid_trigger_secs: AtomicU64,
    status: StatusBoard,
}

impl Dispatcher {
    /// `rapid_trigger_secs` of `0` disables rapid trigger detection for new clients.
    pub fn new(rapid_trigger_secs: u64, status: StatusBoard) -> Self {
        let dispatcher = Self {
            clients: ClientMap::new(),
            rapid_trigger_secs: AtomicU64::new(rapid_trigger_secs),
            status,
        };
        dispatcher
            .status
            .set_rapid_trigger(dispatcher.rapid_trigger_window());
        dispatcher
    }

    /// Change the window handed to clients registered from now on.
    ///
    /// Clients already registered keep the window they were created with.
    pub fn set_rapid_trigger_secs(&self, secs: u64) {
        self.rapid_trigger_secs.store(secs, Ordering::Relaxed);
        self.status.set_rapid_trigger(self.rapid_trigger_window());
    }

    pub fn rapid_trigger_window(&self) -> Option<Duration> {
        match self.rapid_trigger_secs.load(Ordering::Relaxed) {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }

    /// Route an event received at `at` to the client named in its `Player` section.
    pub fn handle(&self, at: Instant, record: &EventRecord) -> Dispatch {
        let player = match record.player() {
            Ok(player) => player,
            Err(e) => {
                debug!(error = %e, "Ignoring event without player");
                return Dispatch::Ignored;
            }
        };

        let Some(client_id) = ClientId::normalize(&player.uuid) else {
            debug!(uuid = %player.uuid, "Ignoring event with empty player uuid");
            return Dispatch::Ignored;
        };

        if client_id.is_controller() {
            warn!(uuid = %player.uuid, "Ignoring event whose player id collides with the controller");
            return Dispatch::Ignored;
        }

        let (client_ref, created) = self.clients.get_or_insert_with(&client_id, || {
            ClientContext::new(
                client_id.clone(),
                player.title.as_str(),
                self.rapid_trigger_window(),
            )
        });

        if created {
            let client_count = self.clients.len();
            info!(
                client_id = %client_id,
                name = %player.title,
                client_count,
                "New Plex client"
            );
            self.status.set_client_count(client_count);
        }

        let transition =
            match client_ref.view(|ctx| ctx.update(at, &player.title, record.event())) {
                Ok(transition) => transition,
                Err(e) => {
                    error!(error = %e, "Client context vanished during update");
                    return Dispatch::Ignored;
                }
            };

        debug!(
            client_id = %client_id,
            event = record.event().unwrap_or("<none>"),
            transition = ?transition,
            "Event dispatched"
        );

        if transition == Some(TriggerState::Triggered) {
            info!(client_id = %client_id, name = %player.title, "Rapid trigger detected");
        }

        Dispatch::Updated {
            client_id,
            created,
            transition,
        }
    }

    /// Return every client to idle, returning how many were armed or triggered.
    pub fn reset_all(&self) -> usize {
        self.clients
            .clients()
            .iter()
            .filter(|client_ref| client_ref.view(|ctx| ctx.reset()).unwrap_or(false))
            .count()
    }

    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    pub fn snapshot(&self, client_id: &ClientId) -> Option<ClientSnapshot> {
        self.clients
            .get_client(client_id)
            .ok()
            .and_then(|client_ref| client_ref.view(ClientContext::snapshot).ok())
    }

    pub fn snapshots(&self) -> Vec<ClientSnapshot> {
        let mut snapshots: Vec<_> = self
            .clients
            .clients()
            .iter()
            .filter_map(|client_ref| client_ref.view(ClientContext::snapshot).ok())
            .collect();
        snapshots.sort_by(|a, b| a.client_id.cmp(&b.client_id));
        snapshots
    }
}

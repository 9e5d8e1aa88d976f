use std::{
    fmt,
    sync::{Arc, Weak},
};

use dashmap::{DashMap, Entry};

use crate::client::ClientId;

/// Indicates that an operation to retrieve a client failed because it doesn't exist.
#[derive(Debug, thiserror::Error)]
#[error("the provided client id ({client_id}) could not be found")]
pub struct ClientNotFound {
    pub client_id: ClientId,
}

/// Indicates that a weakly held client context could not be viewed because the registry owning
/// it has been dropped.
#[derive(Debug, thiserror::Error)]
#[error("the client context ({client_id}) is no longer valid")]
pub struct ClientViewInvalid {
    pub client_id: ClientId,
}

/// A registry of clients identified by a [`ClientId`] and their associated context `T`.
///
/// Once inserted a client context is only reachable through a [`ClientRef`], so no caller holds
/// a strong reference past the registry's lifetime. Clients are never removed.
#[derive(Debug)]
pub struct ClientMap<T> {
    entity_map: DashMap<ClientId, Arc<T>, ahash::RandomState>,
}

impl<T> ClientMap<T> {
    pub fn new() -> ClientMap<T> {
        Self::default()
    }

    /// Lend the context for `client_id`, creating it with `make_context` on first sight.
    ///
    /// The returned flag is `true` when this call created the entry. Creation happens under the
    /// shard lock, so two racing callers never both create the same client.
    pub fn get_or_insert_with<F: FnOnce() -> T>(
        &self,
        client_id: &ClientId,
        make_context: F,
    ) -> (ClientRef<T>, bool) {
        match self.entity_map.entry(client_id.clone()) {
            Entry::Occupied(entry) => (
                ClientRef::new(client_id.clone(), Arc::downgrade(entry.get())),
                false,
            ),
            Entry::Vacant(slot) => {
                let entity = slot.insert(Arc::new(make_context()));
                (
                    ClientRef::new(client_id.clone(), Arc::downgrade(entity.value())),
                    true,
                )
            }
        }
    }

    /// Lend the client context for the provided `client_id`.
    pub fn get_client(&self, client_id: &ClientId) -> Result<ClientRef<T>, ClientNotFound> {
        self.entity_map
            .view(client_id, |_, entity| {
                ClientRef::new(client_id.clone(), Arc::downgrade(entity))
            })
            .ok_or_else(|| ClientNotFound {
                client_id: client_id.clone(),
            })
    }

    /// References to every tracked client.
    ///
    /// Collected up front so callers never hold a shard lock while working on a client.
    pub fn clients(&self) -> Vec<ClientRef<T>> {
        self.entity_map
            .iter()
            .map(|entry| ClientRef::new(entry.key().clone(), Arc::downgrade(entry.value())))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entity_map.len()
    }
}

impl<T> Default for ClientMap<T> {
    fn default() -> Self {
        Self {
            entity_map: DashMap::default(),
        }
    }
}

/// A weak reference to a registered client context that provides a scoped [`view`](Self::view).
pub struct ClientRef<T> {
    client_id: ClientId,
    weak_client_context: Weak<T>,
}

impl<T> ClientRef<T> {
    fn new(client_id: ClientId, weak_client_context: Weak<T>) -> ClientRef<T> {
        Self {
            client_id,
            weak_client_context,
        }
    }

    pub fn client_id(&self) -> &ClientId {
        &self.client_id
    }

    /// Scoped access via a `view_fn` to the client context.
    ///
    /// Fails with [`ClientViewInvalid`] once the owning [`ClientMap`] has been dropped.
    pub fn view<F: FnOnce(&T) -> R, R>(&self, view_fn: F) -> Result<R, ClientViewInvalid> {
        Weak::upgrade(&self.weak_client_context)
            .map(|client_context| view_fn(&client_context))
            .ok_or(ClientViewInvalid {
                client_id: self.client_id.clone(),
            })
    }
}

impl<T> fmt::Debug for ClientRef<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientRef")
            .field("client_id", &self.client_id)
            .field("valid", &(self.weak_client_context.strong_count() > 0))
            .finish()
    }
}

impl<T> Clone for ClientRef<T> {
    fn clone(&self) -> Self {
        Self {
            client_id: self.client_id.clone(),
            weak_client_context: self.weak_client_context.clone(),
        }
    }
}

/// A [`ClientRef`] is defined only by the underlying [`ClientId`] matching.
impl<T> PartialEq<ClientId> for ClientRef<T> {
    fn eq(&self, other: &ClientId) -> bool {
        self.client_id == *other
    }
}

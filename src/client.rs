use std::fmt::Display;
use std::sync::Arc;

/// Maximum number of characters retained from a player uuid.
pub const MAX_CLIENT_ID_LEN: usize = 14;

/// Identifier reserved for the controller itself. No client may claim it.
pub const CONTROLLER_ID: &str = "controller";

/// An ID for a Plex "client", the player application that originated a webhook event.
///
/// Derived from the player `uuid` by [`ClientId::normalize`]. Distinct uuids that share the same
/// 14 character prefix map onto the same id.
#[derive(Debug, Clone, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct ClientId(Arc<str>);

impl ClientId {
    /// Normalize a player uuid into a [`ClientId`].
    ///
    /// Strips `-` separators, keeps the first [`MAX_CLIENT_ID_LEN`] characters and lowercases
    /// them. Returns `None` when nothing is left.
    pub fn normalize(uuid: &str) -> Option<Self> {
        let id: String = uuid
            .chars()
            .filter(|c| *c != '-')
            .take(MAX_CLIENT_ID_LEN)
            .flat_map(char::to_lowercase)
            .collect();

        (!id.is_empty()).then(|| Self(id.into()))
    }

    /// The id of the controller.
    pub fn controller() -> Self {
        Self(CONTROLLER_ID.into())
    }

    pub fn is_controller(&self) -> bool {
        &*self.0 == CONTROLLER_ID
    }

    /// Returns the underlying string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for ClientId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

pub mod body;
pub mod client;
pub mod client_context;
pub mod client_map;
pub mod dispatcher;
pub mod listener;
pub mod state_machine;
pub mod status;
pub mod supervisor;

pub use body::{EventRecord, NonPlexPayload, parse_body};
pub use client::ClientId;
pub use dispatcher::{Dispatch, Dispatcher};
pub use listener::{Listener, ListenerConfig, ListenerError, Params};
pub use status::{ControllerStatus, StatusBoard};
pub use supervisor::{HealthSupervisor, Tick};

/// Environment variables read by the service binary, mapped to parameter store keys.
pub const PARAM_ENV_VARS: [(&str, &str); 5] = [
    ("PLEX_WEBHOOK_PORT", "port"),
    ("PLEX_WEBHOOK_RAPID_TRIGGER", "rapid_trigger"),
    ("PLEX_WEBHOOK_SHORT_POLL", "shortPoll"),
    ("PLEX_WEBHOOK_LONG_POLL", "longPoll"),
    ("PLEX_WEBHOOK_BIND", "bind"),
];

/// Collect parameters from the process environment.
pub fn params_from_env() -> Params {
    PARAM_ENV_VARS
        .iter()
        .filter_map(|(var, key)| {
            std::env::var(var)
                .ok()
                .map(|value| (key.to_string(), value))
        })
        .collect()
}

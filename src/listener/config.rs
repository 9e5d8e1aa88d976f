use std::collections::HashMap;
use std::net::IpAddr;
use std::time::Duration;

use bon::Builder;
use tracing::{error, info};

pub const DEFAULT_PORT: u16 = 9090;
pub const PORT_RANGE: std::ops::RangeInclusive<u16> = 1024..=49151;
pub const MIN_RAPID_TRIGGER_SECS: u64 = 2;

/// Raw key/value parameters as delivered by the host's parameter store.
pub type Params = HashMap<String, String>;

/// Configuration for the webhook listener and the rapid trigger feature.
#[derive(Debug, Clone, PartialEq, Eq, Builder)]
pub struct ListenerConfig {
    /// Address to bind. When unset the outbound interface address is discovered at start.
    pub bind_address: Option<IpAddr>,

    #[builder(default = DEFAULT_PORT)]
    pub port: u16,

    /// Rapid trigger window in seconds, `0` disables the feature.
    #[builder(default = 0)]
    pub rapid_trigger_secs: u64,

    #[builder(default = 60)]
    pub short_poll_secs: u64,

    #[builder(default = 120)]
    pub long_poll_secs: u64,

    /// How long a connection may take to deliver its request.
    #[builder(default = Duration::from_secs(10))]
    pub read_timeout: Duration,

    /// Largest accepted request body. Plex attaches poster thumbnails to some events.
    #[builder(default = 8 * 1024 * 1024)]
    pub max_body_bytes: usize,
}

/// A parameter value that was rejected. The previous or default value stays in effect.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("parameter `{key}` must be an integer, got {value:?}")]
    NotAnInteger { key: String, value: String },

    #[error("parameter `bind` must be an IP address, got {value:?}")]
    InvalidBindAddress { value: String },

    #[error("parameter `port` must be between 1024-49151, got {port}")]
    PortOutOfRange { port: i64 },

    #[error("parameter `rapid_trigger` must be between 2-shortPoll({short_poll}) seconds, got {value}")]
    RapidTriggerOutOfRange { value: i64, short_poll: u64 },

    #[error("parameter `shortPoll` must be at least 1 second, got {value}")]
    PollOutOfRange { value: i64 },
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl ListenerConfig {
    /// The rapid trigger window, `None` when disabled.
    pub fn rapid_trigger_window(&self) -> Option<Duration> {
        (self.rapid_trigger_secs > 0).then(|| Duration::from_secs(self.rapid_trigger_secs))
    }

    pub fn short_poll(&self) -> Duration {
        Duration::from_secs(self.short_poll_secs)
    }

    pub fn long_poll(&self) -> Duration {
        Duration::from_secs(self.long_poll_secs)
    }

    /// Build a configuration from parameter store values on top of the defaults.
    ///
    /// Invalid values never fail the load: each is logged and the default kept.
    pub fn from_params(params: &Params) -> Self {
        let mut config = Self::default();
        for err in config.apply_params(params) {
            error!(error = %err, "Rejected configuration parameter");
        }
        config
    }

    /// Apply parameter store values, returning the rejected ones.
    ///
    /// `shortPoll` is applied first since it bounds `rapid_trigger`.
    pub fn apply_params(&mut self, params: &Params) -> Vec<ConfigError> {
        let mut rejected = Vec::new();

        if let Some(value) = int_param(params, "shortPoll", &mut rejected) {
            match u64::try_from(value) {
                Ok(secs) if secs >= 1 => self.short_poll_secs = secs,
                _ => rejected.push(ConfigError::PollOutOfRange { value }),
            }
        }

        if let Some(value) = int_param(params, "longPoll", &mut rejected) {
            match u64::try_from(value) {
                Ok(secs) if secs >= 1 => self.long_poll_secs = secs,
                _ => rejected.push(ConfigError::PollOutOfRange { value }),
            }
        }

        if let Some(value) = params.get("bind") {
            match value.trim().parse::<IpAddr>() {
                Ok(addr) => self.bind_address = Some(addr),
                Err(_) => rejected.push(ConfigError::InvalidBindAddress {
                    value: value.clone(),
                }),
            }
        }

        if let Some(value) = int_param(params, "port", &mut rejected) {
            match u16::try_from(value) {
                Ok(port) if PORT_RANGE.contains(&port) => self.port = port,
                _ => {
                    rejected.push(ConfigError::PortOutOfRange { port: value });
                    self.port = DEFAULT_PORT;
                }
            }
        }

        if let Some(value) = int_param(params, "rapid_trigger", &mut rejected) {
            match u64::try_from(value) {
                Ok(secs) if (MIN_RAPID_TRIGGER_SECS..=self.short_poll_secs).contains(&secs) => {
                    self.rapid_trigger_secs = secs;
                    info!(seconds = secs, "Rapid trigger feature enabled");
                }
                _ => rejected.push(ConfigError::RapidTriggerOutOfRange {
                    value,
                    short_poll: self.short_poll_secs,
                }),
            }
        }

        rejected
    }
}

fn int_param(params: &Params, key: &str, rejected: &mut Vec<ConfigError>) -> Option<i64> {
    let value = params.get(key)?;
    match value.trim().parse::<i64>() {
        Ok(value) => Some(value),
        Err(_) => {
            rejected.push(ConfigError::NotAnInteger {
                key: key.to_string(),
                value: value.clone(),
            });
            None
        }
    }
}

//! Extraction of the Plex event record from a webhook body.
//!
//! Plex posts `multipart/form-data` with a JSON `payload` part and, for some events, a JPEG
//! `thumb` part. Other senders interleave unrelated form fields, so rather than parsing the
//! multipart framing the body is scanned line by line: after the first
//! `Content-Type: application/json` line, the first line mentioning `event` is taken as the JSON
//! document.

use serde::Deserialize;
use serde_json::{Map, Value};

const JSON_CONTENT_TYPE: &str = "Content-Type: application/json";
const EVENT_MARKER: &str = "event";

/// A decoded Plex webhook event.
///
/// Only the fields the dispatcher needs are typed; everything else stays available through
/// [`EventRecord::as_json`].
#[derive(Debug, Clone, PartialEq)]
pub struct EventRecord(Map<String, Value>);

/// The `Player` section of an event record.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Player {
    pub uuid: String,
    pub title: String,
}

/// The body did not carry a Plex event.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NonPlexPayload {
    #[error("no `Content-Type: application/json` part in body")]
    NoJsonPart,
    #[error("no line mentioning `event` after the JSON content type")]
    NoEventLine,
    #[error("event line is not valid JSON: {0}")]
    InvalidJson(String),
    #[error("event line is JSON but not an object")]
    NotAnObject,
}

/// The event record is missing a usable `Player` section.
#[derive(Debug, thiserror::Error)]
#[error("event record has no usable `Player` section: {reason}")]
pub struct MalformedEventRecord {
    pub reason: String,
}

impl EventRecord {
    /// The event name, e.g. `media.play`.
    pub fn event(&self) -> Option<&str> {
        self.0.get("event").and_then(Value::as_str)
    }

    /// Validate and extract the `Player` section.
    pub fn player(&self) -> Result<Player, MalformedEventRecord> {
        let player = self.0.get("Player").ok_or_else(|| MalformedEventRecord {
            reason: "missing `Player`".to_string(),
        })?;

        Player::deserialize(player).map_err(|e| MalformedEventRecord {
            reason: e.to_string(),
        })
    }

    pub fn as_json(&self) -> &Map<String, Value> {
        &self.0
    }
}

impl TryFrom<Value> for EventRecord {
    type Error = NonPlexPayload;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            _ => Err(NonPlexPayload::NotAnObject),
        }
    }
}

/// Locate and decode the event record inside a raw webhook body.
///
/// Invalid UTF-8 is replaced rather than rejected, since the JSON part is usually followed by
/// binary thumbnail data.
pub fn parse_body(body: &[u8]) -> Result<EventRecord, NonPlexPayload> {
    let text = String::from_utf8_lossy(body);

    let mut lines = text.split("\r\n");
    if !lines.any(|line| line.contains(JSON_CONTENT_TYPE)) {
        return Err(NonPlexPayload::NoJsonPart);
    }

    // A marker line may itself mention `event`, but the document always follows the marker.
    let candidate = lines
        .find(|line| line.contains(EVENT_MARKER))
        .ok_or(NonPlexPayload::NoEventLine)?;

    let value: Value = serde_json::from_str(candidate)
        .map_err(|e| NonPlexPayload::InvalidJson(e.to_string()))?;

    EventRecord::try_from(value)
}

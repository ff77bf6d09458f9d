//! Wire model for the shared broadcast topic.
//!
//! Every message between panels is an [`Envelope`] carrying one
//! [`PanelEvent`] payload. The JSON shapes here are an interop contract
//! with other panel implementations and must not drift:
//!
//! ```json
//! {"event":"talkStatusChange",   "channelName":"Stage", "channelID":0, "talking":true}
//! {"event":"listenStatusChange", "channelName":"Stage", "channelID":0, "listening":true}
//! {"event":"volumeChange",       "channelName":"Stage", "channelID":0, "volume":80}
//! {"event":"companionSyncRequest",  "roleID":2}
//! {"event":"companionSyncResponse", "state":{"0":{"channelName":"Stage","talking":false,"listening":true,"volume":80}}}
//! ```
//!
//! wrapped as `{"type":"broadcast","event":<identity>,"payload":<payload>}`.
//!
//! Unknown event kinds must never break a panel: envelopes keep their
//! payload as raw JSON, and [`PanelEvent::from_value`] classifies decode
//! failures into unknown-kind vs malformed so the engine can log and move
//! on.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::ProtocolError;
use crate::state::ChannelState;

// ---------------------------------------------------------------------------
// PanelEvent
// ---------------------------------------------------------------------------

/// One broadcast payload, discriminated by its `event` field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event")]
pub enum PanelEvent {
    /// A panel toggled talk on a channel.
    #[serde(rename = "talkStatusChange")]
    TalkStatusChange {
        #[serde(rename = "channelName")]
        channel_name: String,
        #[serde(rename = "channelID")]
        channel_id: usize,
        talking: bool,
    },

    /// A panel toggled listen on a channel.
    #[serde(rename = "listenStatusChange")]
    ListenStatusChange {
        #[serde(rename = "channelName")]
        channel_name: String,
        #[serde(rename = "channelID")]
        channel_id: usize,
        listening: bool,
    },

    /// A panel set a channel volume. Compliant senders clamp before
    /// publishing; receivers clamp again on apply.
    #[serde(rename = "volumeChange")]
    VolumeChange {
        #[serde(rename = "channelName")]
        channel_name: String,
        #[serde(rename = "channelID")]
        channel_id: usize,
        volume: i64,
    },

    /// A newly joined panel asking the group for its current state.
    #[serde(rename = "companionSyncRequest")]
    SyncRequest {
        #[serde(rename = "roleID")]
        role_id: usize,
    },

    /// The group's current state; receivers replace their store wholesale.
    #[serde(rename = "companionSyncResponse")]
    SyncResponse {
        #[serde(with = "channel_id_map")]
        state: BTreeMap<usize, ChannelState>,
    },
}

/// Event kinds this implementation understands.
const KNOWN_KINDS: [&str; 5] = [
    "talkStatusChange",
    "listenStatusChange",
    "volumeChange",
    "companionSyncRequest",
    "companionSyncResponse",
];

impl PanelEvent {
    /// The wire discriminator for this event.
    pub fn kind(&self) -> &'static str {
        match self {
            PanelEvent::TalkStatusChange { .. } => "talkStatusChange",
            PanelEvent::ListenStatusChange { .. } => "listenStatusChange",
            PanelEvent::VolumeChange { .. } => "volumeChange",
            PanelEvent::SyncRequest { .. } => "companionSyncRequest",
            PanelEvent::SyncResponse { .. } => "companionSyncResponse",
        }
    }

    /// Decode a raw payload, distinguishing unknown event kinds (which a
    /// panel ignores) from malformed payloads of a known kind.
    pub fn from_value(value: &Value) -> Result<Self, ProtocolError> {
        let kind = value
            .get("event")
            .and_then(Value::as_str)
            .unwrap_or_default();
        if !KNOWN_KINDS.contains(&kind) {
            return Err(ProtocolError::UnknownEvent {
                kind: if kind.is_empty() {
                    "<missing>".to_string()
                } else {
                    kind.to_string()
                },
            });
        }
        serde_json::from_value(value.clone()).map_err(|err| ProtocolError::Malformed {
            message: err.to_string(),
        })
    }
}

// ---------------------------------------------------------------------------
// Envelope
// ---------------------------------------------------------------------------

/// Outer wrapper on the shared topic. `event` carries the identity-scoped
/// filter, not the payload kind; the payload stays raw JSON so unknown
/// kinds survive decoding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub kind: String,
    pub event: String,
    pub payload: Value,
}

impl Envelope {
    /// Wrap a payload for broadcast under the given identity filter.
    pub fn broadcast(event: impl Into<String>, payload: &PanelEvent) -> Self {
        Self {
            kind: "broadcast".to_string(),
            event: event.into(),
            // PanelEvent contains nothing a JSON value cannot represent.
            payload: serde_json::to_value(payload).unwrap_or(Value::Null),
        }
    }
}

// ---------------------------------------------------------------------------
// Channel-id keyed map (de)serialization
// ---------------------------------------------------------------------------

/// Sync-response state is a JSON object keyed by the decimal channel id
/// (matching object-keyed peers); this bridges that to `BTreeMap<usize, _>`.
mod channel_id_map {
    use std::collections::BTreeMap;

    use serde::de::Error as _;
    use serde::ser::SerializeMap;
    use serde::{Deserialize, Deserializer, Serializer};

    use crate::state::ChannelState;

    pub fn serialize<S>(
        state: &BTreeMap<usize, ChannelState>,
        serializer: S,
    ) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = serializer.serialize_map(Some(state.len()))?;
        for (channel_id, entry) in state {
            map.serialize_entry(&channel_id.to_string(), entry)?;
        }
        map.end()
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<BTreeMap<usize, ChannelState>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = BTreeMap::<String, ChannelState>::deserialize(deserializer)?;
        raw.into_iter()
            .map(|(key, entry)| {
                key.parse::<usize>()
                    .map(|channel_id| (channel_id, entry))
                    .map_err(|_| D::Error::custom(format!("invalid channel id key: {key}")))
            })
            .collect()
    }
}

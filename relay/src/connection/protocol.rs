//! Wire Protocol
//!
//! Defines the message types exchanged between the relay and its provider
//! and consumer clients. Text frames carry named events shaped as
//! `{"event": <name>, "data": <payload>}`; raw stream payloads travel as
//! binary frames.

use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::error::ProtocolError;
use crate::validator::ValidationError;

/// Connection role, bound at handshake time by the request path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Provider,
    Consumer,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Provider => write!(f, "provider"),
            Role::Consumer => write!(f, "consumer"),
        }
    }
}

/// A structured protocol message. The kind is carried by the inbound event
/// name; `subtype` refines it. Unknown fields are kept in `extra` so an
/// echoed packet round-trips byte-for-byte.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Packet {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subtype: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,

    /// ISO 8601 timestamp.
    #[serde(rename = "t", skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,

    /// Target provider, required for `control` packets.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Payload of an `authorize` handshake message.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct AuthorizePacket {
    pub token: Option<String>,
}

/// Consumer request updating the event/sensor subtype filter. The filter
/// fields stay untyped so "present but not an array" can be told apart
/// from "absent".
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct FilterRequest {
    pub provider: Option<String>,
    pub event: Option<Value>,
    pub sensor: Option<Value>,
}

/// Consumer request for a provider's current state.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct StateRequest {
    pub provider: Option<String>,
    pub subtypes: Option<Value>,
}

/// Consumer request joining or leaving a provider's feed.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct SubscriptionRequest {
    pub provider: Option<String>,
}

/// Consumer requests that address a provider.
pub trait ProviderScoped {
    fn provider(&self) -> Option<&str>;
}

impl ProviderScoped for FilterRequest {
    fn provider(&self) -> Option<&str> {
        self.provider.as_deref()
    }
}

impl ProviderScoped for StateRequest {
    fn provider(&self) -> Option<&str> {
        self.provider.as_deref()
    }
}

impl ProviderScoped for SubscriptionRequest {
    fn provider(&self) -> Option<&str> {
        self.provider.as_deref()
    }
}

/// Inbound named events from a client socket.
///
/// A text-framed `stream` event is accepted only so it can be dropped:
/// stream payloads are byte sequences and must arrive as binary frames.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientMessage {
    Authorize(Option<AuthorizePacket>),
    Event(Option<Packet>),
    Sensor(Option<Packet>),
    Control(Option<Packet>),
    SetFilter(Option<FilterRequest>),
    GetState(Option<StateRequest>),
    Subscribe(Option<SubscriptionRequest>),
    Unsubscribe(Option<SubscriptionRequest>),
    JoinStream(Option<SubscriptionRequest>),
    LeaveStream(Option<SubscriptionRequest>),
    Stream(Option<Value>),
}

#[derive(Debug, Deserialize)]
struct Envelope {
    event: String,
    #[serde(default)]
    data: Value,
}

/// Why a text frame could not be turned into a [`ClientMessage`].
///
/// The distinction matters to the caller: a frame that is not an envelope
/// or names an unknown event is dropped like an unregistered handler
/// would drop it, while a known event with an undecodable payload must be
/// reported back as an `error` signal.
#[derive(Debug, Error)]
pub enum ParseError {
    /// The frame was not a `{"event": ..., "data": ...}` envelope.
    #[error("invalid envelope: {0}")]
    Envelope(#[from] serde_json::Error),

    /// The event name has no handler on any channel.
    #[error("unknown event: {0}")]
    UnknownEvent(String),

    /// The event is known but its payload does not decode.
    #[error("malformed `{event}` payload: {source}")]
    Payload {
        event: String,
        source: serde_json::Error,
    },
}

impl ClientMessage {
    /// Parse a text frame.
    pub fn from_json(text: &str) -> Result<Self, ParseError> {
        let Envelope { event, data } = serde_json::from_str(text)?;

        fn payload<T: DeserializeOwned>(event: &str, data: Value) -> Result<T, ParseError> {
            serde_json::from_value(data).map_err(|source| ParseError::Payload {
                event: event.to_string(),
                source,
            })
        }

        let message = match event.as_str() {
            "authorize" => ClientMessage::Authorize(payload(&event, data)?),
            "event" => ClientMessage::Event(payload(&event, data)?),
            "sensor" => ClientMessage::Sensor(payload(&event, data)?),
            "control" => ClientMessage::Control(payload(&event, data)?),
            "setFilter" => ClientMessage::SetFilter(payload(&event, data)?),
            "getState" => ClientMessage::GetState(payload(&event, data)?),
            "subscribe" => ClientMessage::Subscribe(payload(&event, data)?),
            "unsubscribe" => ClientMessage::Unsubscribe(payload(&event, data)?),
            "joinStream" => ClientMessage::JoinStream(payload(&event, data)?),
            "leaveStream" => ClientMessage::LeaveStream(payload(&event, data)?),
            "stream" => ClientMessage::Stream(payload(&event, data)?),
            other => return Err(ParseError::UnknownEvent(other.to_string())),
        };

        Ok(message)
    }
}

/// Outbound signals emitted by the relay on a client socket.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ServerSignal {
    /// Validation or structural failure; the payload is the error message,
    /// or a structured object when pushed by the stimulus driver.
    Error(Value),

    /// Acknowledges a well-formed `authorize` packet.
    AuthSuccess,

    /// Echoes a validated `event` packet.
    HeardEvent(Packet),

    /// Follow-up to a `ping` subtype.
    Pong,

    /// Follow-up to a `completed` event subtype.
    CompletedControl,

    /// Echoes a validated `sensor` packet.
    HeardSensor(Packet),

    /// Acknowledges a binary stream payload without echoing it.
    HeardStream,

    /// Acknowledges a consumer-side structural check, tagged with the
    /// action that passed.
    CheckedPacket(String),

    /// Echoes a validated `control` packet.
    HeardControl(Packet),

    /// Server-initiated keep-alive push.
    Ping(Value),
}

impl ServerSignal {
    /// Serialize the signal to JSON.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

impl From<ProtocolError> for ServerSignal {
    fn from(err: ProtocolError) -> Self {
        ServerSignal::Error(Value::String(err.to_string()))
    }
}

impl From<ValidationError> for ServerSignal {
    fn from(err: ValidationError) -> Self {
        ServerSignal::Error(Value::String(err.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_signal_event_names() {
        let cases = [
            (ServerSignal::Error(json!("boom")), "error"),
            (ServerSignal::AuthSuccess, "auth-success"),
            (ServerSignal::HeardEvent(Packet::default()), "heard-event"),
            (ServerSignal::Pong, "pong"),
            (ServerSignal::CompletedControl, "completed-control"),
            (ServerSignal::HeardSensor(Packet::default()), "heard-sensor"),
            (ServerSignal::HeardStream, "heard-stream"),
            (
                ServerSignal::CheckedPacket("consumer".to_string()),
                "checked-packet",
            ),
            (ServerSignal::HeardControl(Packet::default()), "heard-control"),
            (ServerSignal::Ping(json!({"ping": "data"})), "ping"),
        ];

        for (signal, name) in cases {
            let value: Value = serde_json::from_str(&signal.to_json().unwrap()).unwrap();
            assert_eq!(value["event"], name);
        }
    }

    #[test]
    fn test_unit_signals_have_no_data() {
        let value: Value =
            serde_json::from_str(&ServerSignal::Pong.to_json().unwrap()).unwrap();
        assert!(value.get("data").is_none());
    }

    #[test]
    fn test_parse_event_message() {
        let msg = ClientMessage::from_json(
            r#"{"event": "event", "data": {"subtype": "ping", "data": null, "t": "2024-01-01T00:00:00Z"}}"#,
        )
        .unwrap();

        match msg {
            ClientMessage::Event(Some(packet)) => {
                assert_eq!(packet.subtype.as_deref(), Some("ping"));
                assert_eq!(packet.timestamp.as_deref(), Some("2024-01-01T00:00:00Z"));
            }
            other => panic!("expected event message, got {other:?}"),
        }
    }

    #[test]
    fn test_missing_data_parses_as_absent_packet() {
        let msg = ClientMessage::from_json(r#"{"event": "subscribe"}"#).unwrap();
        assert_eq!(msg, ClientMessage::Subscribe(None));

        let msg = ClientMessage::from_json(r#"{"event": "authorize", "data": null}"#).unwrap();
        assert_eq!(msg, ClientMessage::Authorize(None));
    }

    #[test]
    fn test_unknown_event_is_an_error() {
        assert!(matches!(
            ClientMessage::from_json(r#"{"event": "teleport", "data": {}}"#),
            Err(ParseError::UnknownEvent(_))
        ));
    }

    #[test]
    fn test_malformed_payload_is_distinguished_from_unknown_event() {
        let err = ClientMessage::from_json(r#"{"event": "sensor", "data": "junk"}"#).unwrap_err();
        assert!(matches!(err, ParseError::Payload { .. }));
        assert!(err.to_string().contains("`sensor`"));

        let err =
            ClientMessage::from_json(r#"{"event": "event", "data": {"subtype": 123}}"#).unwrap_err();
        assert!(matches!(err, ParseError::Payload { .. }));

        let err = ClientMessage::from_json("not json at all").unwrap_err();
        assert!(matches!(err, ParseError::Envelope(_)));
    }

    #[test]
    fn test_packet_echo_preserves_extra_fields() {
        let raw = json!({
            "subtype": "position",
            "data": [1, 2, 3],
            "t": "2024-01-01T00:00:00Z",
            "unit": "meters"
        });

        let packet: Packet = serde_json::from_value(raw.clone()).unwrap();
        assert_eq!(packet.extra["unit"], "meters");
        assert_eq!(serde_json::to_value(&packet).unwrap(), raw);
    }
}

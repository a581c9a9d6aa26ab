//! Channel frames exchanged with subscribers.
//!
//! Subscribers speak the subset of the Pusher Channels client protocol
//! (version 7) that the board needs, so the same client can talk to the
//! hosted broker or to the gateway's local relay.
//!
//! Every frame is a JSON text message:
//! ```text
//! { "event": "<name>", "channel": "<channel>"?, "data": "<JSON string>" }
//! ```
//!
//! | Direction | Event | Data |
//! |-----------|-------|------|
//! | server → client | `pusher:connection_established` | `{socket_id, activity_timeout}` |
//! | client → server | `pusher:subscribe` | `{channel}` |
//! | server → client | `pusher_internal:subscription_succeeded` | `{}` |
//! | both | `pusher:ping` / `pusher:pong` | `{}` |
//! | server → client | `pusher:error` | `{message, code}` |
//! | server → client | `noteMoved` / `noteCreated` / `logUpdated` | board payload |

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use kanban_core::{BoardEvent, EventError};

/// The single channel all board events travel on.
pub const CHANNEL: &str = "notes";

/// Pusher client protocol version spoken by subscribers.
pub const PROTOCOL_VERSION: u8 = 7;

pub const CONNECTION_ESTABLISHED: &str = "pusher:connection_established";
pub const SUBSCRIBE: &str = "pusher:subscribe";
pub const SUBSCRIPTION_SUCCEEDED: &str = "pusher_internal:subscription_succeeded";
pub const PING: &str = "pusher:ping";
pub const PONG: &str = "pusher:pong";
pub const ERROR: &str = "pusher:error";

/// A single protocol frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelFrame {
    pub event: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,
    /// Usually a JSON document encoded as a string. Some clients send
    /// objects for `pusher:subscribe`; both forms are accepted.
    #[serde(default)]
    pub data: Value,
}

impl ChannelFrame {
    fn new(event: &str, channel: Option<&str>, data: Value) -> Self {
        Self {
            event: event.to_string(),
            channel: channel.map(str::to_string),
            data: Value::String(data.to_string()),
        }
    }

    /// Greeting sent right after the WebSocket handshake.
    pub fn connection_established(socket_id: &str, activity_timeout_secs: u64) -> Self {
        Self::new(
            CONNECTION_ESTABLISHED,
            None,
            json!({ "socket_id": socket_id, "activity_timeout": activity_timeout_secs }),
        )
    }

    /// Request to join a channel.
    pub fn subscribe(channel: &str) -> Self {
        Self::new(SUBSCRIBE, None, json!({ "channel": channel }))
    }

    pub fn subscription_succeeded(channel: &str) -> Self {
        Self::new(SUBSCRIPTION_SUCCEEDED, Some(channel), json!({}))
    }

    pub fn ping() -> Self {
        Self::new(PING, None, json!({}))
    }

    pub fn pong() -> Self {
        Self::new(PONG, None, json!({}))
    }

    pub fn error(code: u16, message: &str) -> Self {
        Self::new(ERROR, None, json!({ "message": message, "code": code }))
    }

    /// A board event delivered on `channel`.
    pub fn board_event(channel: &str, event: &BoardEvent) -> Self {
        Self {
            event: event.name().to_string(),
            channel: Some(channel.to_string()),
            data: Value::String(event.encode_data()),
        }
    }

    /// Serialize to a text frame.
    pub fn encode(&self) -> Result<String, ProtocolError> {
        serde_json::to_string(self).map_err(|e| ProtocolError::Serialization(e.to_string()))
    }

    /// Parse a text frame.
    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        serde_json::from_str(text).map_err(|e| ProtocolError::Deserialization(e.to_string()))
    }

    /// Whether this is a protocol control frame rather than a board event.
    pub fn is_control(&self) -> bool {
        self.event.starts_with("pusher:") || self.event.starts_with("pusher_internal:")
    }

    /// The `data` field as a JSON value, unwrapping the string encoding.
    pub fn data_value(&self) -> Result<Value, ProtocolError> {
        match &self.data {
            Value::String(s) if s.is_empty() => Ok(Value::Null),
            Value::String(s) => serde_json::from_str(s)
                .map_err(|e| ProtocolError::Deserialization(e.to_string())),
            other => Ok(other.clone()),
        }
    }

    /// Channel named in a `pusher:subscribe` frame.
    pub fn subscribe_channel(&self) -> Option<String> {
        if self.event != SUBSCRIBE {
            return None;
        }
        self.data_value()
            .ok()?
            .get("channel")?
            .as_str()
            .map(str::to_string)
    }

    /// Socket id from a `pusher:connection_established` frame.
    pub fn socket_id(&self) -> Option<String> {
        if self.event != CONNECTION_ESTABLISHED {
            return None;
        }
        self.data_value()
            .ok()?
            .get("socket_id")?
            .as_str()
            .map(str::to_string)
    }

    /// Decode the board event carried by this frame.
    ///
    /// Control frames yield `Ok(None)`. Board frames with a malformed payload
    /// yield an error.
    pub fn board_event_payload(&self) -> Result<Option<BoardEvent>, ProtocolError> {
        if self.is_control() {
            return Ok(None);
        }
        let value = self.data_value()?;
        Ok(Some(BoardEvent::from_payload(&self.event, value)?))
    }
}

/// Protocol errors.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ProtocolError {
    #[error("Serialization error: {0}")]
    Serialization(String),
    #[error("Deserialization error: {0}")]
    Deserialization(String),
    #[error("Invalid event: {0}")]
    InvalidEvent(#[from] EventError),
    #[error("Connection failed: {0}")]
    Connect(String),
    #[error("Connection closed")]
    ConnectionClosed,
}

#[cfg(test)]
mod tests {
    use super::*;
    use kanban_core::{NoteId, Status};

    #[test]
    fn test_board_event_frame_shape() {
        let event = BoardEvent::note_moved(NoteId::new("1"), Status::Done);
        let frame = ChannelFrame::board_event(CHANNEL, &event);
        let text = frame.encode().unwrap();
        let raw: Value = serde_json::from_str(&text).unwrap();

        assert_eq!(raw["event"], "noteMoved");
        assert_eq!(raw["channel"], "notes");
        // data is a string containing JSON, as the hosted broker delivers it
        assert_eq!(raw["data"], r#"{"id":"1","newStatus":"done"}"#);
    }

    #[test]
    fn test_board_event_frame_decodes() {
        let text = r#"{"event":"logUpdated","channel":"notes","data":"{\"logMessage\":\"hi\"}"}"#;
        let frame = ChannelFrame::decode(text).unwrap();
        let event = frame.board_event_payload().unwrap().unwrap();
        assert_eq!(event, BoardEvent::log_updated("hi"));
    }

    #[test]
    fn test_control_frames_carry_no_board_event() {
        for frame in [
            ChannelFrame::ping(),
            ChannelFrame::pong(),
            ChannelFrame::subscription_succeeded(CHANNEL),
            ChannelFrame::connection_established("1.2", 120),
        ] {
            assert!(frame.is_control());
            assert_eq!(frame.board_event_payload().unwrap(), None);
        }
    }

    #[test]
    fn test_subscribe_channel_string_and_object_data() {
        let frame = ChannelFrame::subscribe("notes");
        assert_eq!(frame.subscribe_channel().as_deref(), Some("notes"));

        let text = r#"{"event":"pusher:subscribe","data":{"channel":"notes"}}"#;
        let frame = ChannelFrame::decode(text).unwrap();
        assert_eq!(frame.subscribe_channel().as_deref(), Some("notes"));

        assert_eq!(ChannelFrame::ping().subscribe_channel(), None);
    }

    #[test]
    fn test_socket_id() {
        let frame = ChannelFrame::connection_established("123.456", 120);
        let decoded = ChannelFrame::decode(&frame.encode().unwrap()).unwrap();
        assert_eq!(decoded.socket_id().as_deref(), Some("123.456"));
    }

    #[test]
    fn test_malformed_board_payload_is_error() {
        let text = r#"{"event":"noteMoved","channel":"notes","data":"{\"id\":\"1\",\"newStatus\":\"lost\"}"}"#;
        let frame = ChannelFrame::decode(text).unwrap();
        assert_eq!(
            frame.board_event_payload().unwrap_err(),
            ProtocolError::InvalidEvent(EventError::UnknownStatus("lost".to_string()))
        );
    }

    #[test]
    fn test_unknown_board_event_is_error() {
        let text = r#"{"event":"noteDeleted","channel":"notes","data":"{}"}"#;
        let frame = ChannelFrame::decode(text).unwrap();
        assert!(matches!(
            frame.board_event_payload(),
            Err(ProtocolError::InvalidEvent(EventError::UnknownEvent(_)))
        ));
    }

    #[test]
    fn test_decode_invalid_text() {
        assert!(matches!(
            ChannelFrame::decode("not json"),
            Err(ProtocolError::Deserialization(_))
        ));
    }

    #[test]
    fn test_error_frame() {
        let frame = ChannelFrame::error(4009, "unknown channel");
        let data = frame.data_value().unwrap();
        assert_eq!(data["code"], 4009);
        assert_eq!(data["message"], "unknown channel");
    }
}

//! Board events carried over the relay channel.
//!
//! Three event names share one channel. Payloads are JSON objects whose
//! field names are fixed by the peers already deployed:
//!
//! ```text
//! noteMoved    { "id", "newStatus" }
//! noteCreated  { "id", "title", "description", "status" }
//! logUpdated   { "logMessage" }
//! ```
//!
//! Every payload is validated when it is decoded. A payload that does not
//! fit its event shape becomes an [`EventError`] instead of reaching the
//! board store.

use serde::{Deserialize, Serialize};

use crate::note::{Note, NoteId, Status};

/// Event name for a status change.
pub const NOTE_MOVED: &str = "noteMoved";
/// Event name for a new note.
pub const NOTE_CREATED: &str = "noteCreated";
/// Event name for an activity log line.
pub const LOG_UPDATED: &str = "logUpdated";

/// Payload validation errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EventError {
    #[error("unknown event `{0}`")]
    UnknownEvent(String),
    #[error("unknown status `{0}`")]
    UnknownStatus(String),
    #[error("field `{0}` must not be blank")]
    BlankField(&'static str),
    #[error("malformed `{event}` payload: {reason}")]
    Malformed { event: String, reason: String },
}

fn require(field: &'static str, value: String) -> Result<String, EventError> {
    if value.trim().is_empty() {
        return Err(EventError::BlankField(field));
    }
    Ok(value)
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawNoteMoved {
    id: String,
    new_status: String,
}

#[derive(Deserialize)]
struct RawNoteCreated {
    id: String,
    title: String,
    description: String,
    status: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawLogUpdated {
    log_message: String,
}

/// `noteMoved` payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "RawNoteMoved")]
pub struct NoteMoved {
    pub id: NoteId,
    pub new_status: Status,
}

impl TryFrom<RawNoteMoved> for NoteMoved {
    type Error = EventError;

    fn try_from(raw: RawNoteMoved) -> Result<Self, Self::Error> {
        Ok(Self {
            id: NoteId::parse(raw.id)?,
            new_status: raw.new_status.parse()?,
        })
    }
}

/// `noteCreated` payload.
///
/// The description may be empty; the id and title may not.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawNoteCreated")]
pub struct NoteCreated {
    pub id: NoteId,
    pub title: String,
    pub description: String,
    pub status: Status,
}

impl TryFrom<RawNoteCreated> for NoteCreated {
    type Error = EventError;

    fn try_from(raw: RawNoteCreated) -> Result<Self, Self::Error> {
        Ok(Self {
            id: NoteId::parse(raw.id)?,
            title: require("title", raw.title)?,
            description: raw.description,
            status: raw.status.parse()?,
        })
    }
}

impl From<&Note> for NoteCreated {
    fn from(note: &Note) -> Self {
        Self {
            id: note.id.clone(),
            title: note.title.clone(),
            description: note.description.clone(),
            status: note.status,
        }
    }
}

impl From<NoteCreated> for Note {
    fn from(created: NoteCreated) -> Self {
        Note {
            id: created.id,
            title: created.title,
            description: created.description,
            status: created.status,
        }
    }
}

/// `logUpdated` payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "RawLogUpdated")]
pub struct LogUpdated {
    pub log_message: String,
}

impl TryFrom<RawLogUpdated> for LogUpdated {
    type Error = EventError;

    fn try_from(raw: RawLogUpdated) -> Result<Self, Self::Error> {
        Ok(Self {
            log_message: require("logMessage", raw.log_message)?,
        })
    }
}

/// A decoded, validated relay event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BoardEvent {
    NoteMoved(NoteMoved),
    NoteCreated(NoteCreated),
    LogUpdated(LogUpdated),
}

impl BoardEvent {
    pub fn note_moved(id: NoteId, new_status: Status) -> Self {
        BoardEvent::NoteMoved(NoteMoved { id, new_status })
    }

    pub fn note_created(note: &Note) -> Self {
        BoardEvent::NoteCreated(note.into())
    }

    pub fn log_updated(log_message: impl Into<String>) -> Self {
        BoardEvent::LogUpdated(LogUpdated {
            log_message: log_message.into(),
        })
    }

    /// Relay event name.
    pub fn name(&self) -> &'static str {
        match self {
            BoardEvent::NoteMoved(_) => NOTE_MOVED,
            BoardEvent::NoteCreated(_) => NOTE_CREATED,
            BoardEvent::LogUpdated(_) => LOG_UPDATED,
        }
    }

    /// Payload as a JSON value.
    pub fn payload(&self) -> serde_json::Value {
        // The payload structs only hold strings and unit enums, which always
        // serialize.
        let value = match self {
            BoardEvent::NoteMoved(p) => serde_json::to_value(p),
            BoardEvent::NoteCreated(p) => serde_json::to_value(p),
            BoardEvent::LogUpdated(p) => serde_json::to_value(p),
        };
        value.unwrap_or(serde_json::Value::Null)
    }

    /// Payload encoded as a JSON string, the form relays carry it in.
    pub fn encode_data(&self) -> String {
        self.payload().to_string()
    }

    /// Decode a payload delivered as a JSON string.
    pub fn decode(name: &str, data: &str) -> Result<Self, EventError> {
        let value: serde_json::Value =
            serde_json::from_str(data).map_err(|e| EventError::Malformed {
                event: name.to_string(),
                reason: e.to_string(),
            })?;
        Self::from_payload(name, value)
    }

    /// Decode a payload delivered as a JSON value.
    pub fn from_payload(name: &str, value: serde_json::Value) -> Result<Self, EventError> {
        fn parse<T: serde::de::DeserializeOwned>(
            name: &str,
            value: serde_json::Value,
        ) -> Result<T, EventError> {
            // Shape only; field checks run in the TryFrom conversions so the
            // caller gets the precise variant.
            serde_json::from_value(value).map_err(|e| EventError::Malformed {
                event: name.to_string(),
                reason: e.to_string(),
            })
        }

        match name {
            NOTE_MOVED => {
                let raw: RawNoteMoved = parse(name, value)?;
                Ok(BoardEvent::NoteMoved(raw.try_into()?))
            }
            NOTE_CREATED => {
                let raw: RawNoteCreated = parse(name, value)?;
                Ok(BoardEvent::NoteCreated(raw.try_into()?))
            }
            LOG_UPDATED => {
                let raw: RawLogUpdated = parse(name, value)?;
                Ok(BoardEvent::LogUpdated(raw.try_into()?))
            }
            other => Err(EventError::UnknownEvent(other.to_string())),
        }
    }
}

impl From<NoteMoved> for BoardEvent {
    fn from(p: NoteMoved) -> Self {
        BoardEvent::NoteMoved(p)
    }
}

impl From<NoteCreated> for BoardEvent {
    fn from(p: NoteCreated) -> Self {
        BoardEvent::NoteCreated(p)
    }
}

impl From<LogUpdated> for BoardEvent {
    fn from(p: LogUpdated) -> Self {
        BoardEvent::LogUpdated(p)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_note_moved_wire_shape() {
        let event = BoardEvent::note_moved(NoteId::new("2"), Status::InProgress);
        assert_eq!(event.name(), "noteMoved");
        assert_eq!(event.payload(), json!({ "id": "2", "newStatus": "in-progress" }));
    }

    #[test]
    fn test_note_created_wire_shape() {
        let note = Note::new("5", "X", "Y", Status::Backlog);
        let event = BoardEvent::note_created(&note);
        assert_eq!(event.name(), "noteCreated");
        assert_eq!(
            event.payload(),
            json!({ "id": "5", "title": "X", "description": "Y", "status": "backlog" })
        );
    }

    #[test]
    fn test_log_updated_wire_shape() {
        let event = BoardEvent::log_updated("Task 1 moved to done at 10:00:00");
        assert_eq!(event.name(), "logUpdated");
        assert_eq!(
            event.payload(),
            json!({ "logMessage": "Task 1 moved to done at 10:00:00" })
        );
    }

    #[test]
    fn test_decode_from_peer_string() {
        let data = r#"{"id":"3","newStatus":"to-review"}"#;
        let event = BoardEvent::decode("noteMoved", data).unwrap();
        assert_eq!(event, BoardEvent::note_moved(NoteId::new("3"), Status::ToReview));
    }

    #[test]
    fn test_decode_unknown_status() {
        let err = BoardEvent::decode("noteMoved", r#"{"id":"3","newStatus":"archived"}"#)
            .unwrap_err();
        assert_eq!(err, EventError::UnknownStatus("archived".to_string()));
    }

    #[test]
    fn test_decode_missing_field() {
        let err = BoardEvent::decode("noteCreated", r#"{"id":"3","title":"T"}"#).unwrap_err();
        assert!(matches!(err, EventError::Malformed { ref event, .. } if event == "noteCreated"));
    }

    #[test]
    fn test_decode_blank_fields() {
        let err = BoardEvent::decode(
            "noteCreated",
            r#"{"id":" ","title":"T","description":"","status":"backlog"}"#,
        )
        .unwrap_err();
        assert_eq!(err, EventError::BlankField("id"));

        let err = BoardEvent::decode(
            "noteCreated",
            r#"{"id":"9","title":"","description":"","status":"backlog"}"#,
        )
        .unwrap_err();
        assert_eq!(err, EventError::BlankField("title"));

        let err = BoardEvent::decode("logUpdated", r#"{"logMessage":""}"#).unwrap_err();
        assert_eq!(err, EventError::BlankField("logMessage"));
    }

    #[test]
    fn test_decode_empty_description_allowed() {
        let event = BoardEvent::decode(
            "noteCreated",
            r#"{"id":"9","title":"T","description":"","status":"done"}"#,
        )
        .unwrap();
        match event {
            BoardEvent::NoteCreated(created) => assert!(created.description.is_empty()),
            other => panic!("expected NoteCreated, got {other:?}"),
        }
    }

    #[test]
    fn test_decode_numeric_id_rejected() {
        let err = BoardEvent::decode("noteMoved", r#"{"id":3,"newStatus":"done"}"#).unwrap_err();
        assert!(matches!(err, EventError::Malformed { .. }));
    }

    #[test]
    fn test_decode_invalid_json() {
        let err = BoardEvent::decode("logUpdated", "{not json").unwrap_err();
        assert!(matches!(err, EventError::Malformed { .. }));
    }

    #[test]
    fn test_decode_unknown_event() {
        let err = BoardEvent::decode("noteDeleted", r#"{"id":"1"}"#).unwrap_err();
        assert_eq!(err, EventError::UnknownEvent("noteDeleted".to_string()));
    }

    #[test]
    fn test_typed_deserialize_validates() {
        // Direct deserialization (e.g. an HTTP body) goes through the same checks.
        let result: Result<NoteMoved, _> =
            serde_json::from_str(r#"{"id":"1","newStatus":"nowhere"}"#);
        assert!(result.is_err());
        let moved: NoteMoved = serde_json::from_str(r#"{"id":"1","newStatus":"done"}"#).unwrap();
        assert_eq!(moved.new_status, Status::Done);
    }

    #[test]
    fn test_encode_data_is_json_string() {
        let event = BoardEvent::log_updated("hello");
        assert_eq!(event.encode_data(), r#"{"logMessage":"hello"}"#);
    }
}

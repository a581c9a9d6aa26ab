//! Note model: identity, status columns, and the demo seed board.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::event::EventError;

/// Caller-assigned note identity.
///
/// Ids are opaque strings on the wire. Locally generated ids are decimal
/// counters so they stay readable next to ids minted by other peers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NoteId(String);

impl NoteId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Parse an id received from outside the process. Blank ids are rejected.
    pub fn parse(id: impl Into<String>) -> Result<Self, EventError> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(EventError::BlankField("id"));
        }
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Numeric value of the id, if it is a decimal counter.
    pub fn sequence(&self) -> Option<u64> {
        self.0.parse().ok()
    }
}

impl fmt::Display for NoteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NoteId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// Board column a note lives in.
///
/// Wire spelling is kebab-case (`in-progress`, `to-review`).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Status {
    #[default]
    Backlog,
    InProgress,
    Done,
    ToReview,
}

impl Status {
    /// Columns in display order.
    pub const ALL: [Status; 4] = [
        Status::Backlog,
        Status::InProgress,
        Status::Done,
        Status::ToReview,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Backlog => "backlog",
            Status::InProgress => "in-progress",
            Status::Done => "done",
            Status::ToReview => "to-review",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Status {
    type Err = EventError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Status::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| EventError::UnknownStatus(s.to_string()))
    }
}

/// A card on the board.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Note {
    pub id: NoteId,
    pub title: String,
    pub description: String,
    pub status: Status,
}

impl Note {
    pub fn new(
        id: impl Into<NoteId>,
        title: impl Into<String>,
        description: impl Into<String>,
        status: Status,
    ) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            description: description.into(),
            status,
        }
    }
}

impl From<String> for NoteId {
    fn from(id: String) -> Self {
        Self::new(id)
    }
}

/// The four cards every client starts with when seeded.
pub fn demo_notes() -> Vec<Note> {
    vec![
        Note::new("1", "Task 1", "Description for Task 1", Status::Backlog),
        Note::new("2", "Task 2", "Description for Task 2", Status::InProgress),
        Note::new("3", "Task 3", "Description for Task 3", Status::Done),
        Note::new("4", "Task 4", "Description for Task 4", Status::Done),
    ]
}

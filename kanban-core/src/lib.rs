//! # kanban-core — board model and replica reconciliation
//!
//! Pure, transport-free pieces of the collaborative kanban board:
//!
//! - [`note`] — notes, ids and status columns
//! - [`event`] — the three relay events and their validated payloads
//! - [`board`] — the client-side replica and its merge rules
//! - [`activity`] — activity log lines for local actions
//!
//! Networking lives in `kanban-collab`.

pub mod activity;
pub mod board;
pub mod event;
pub mod note;

pub use board::{Applied, BoardState, IdStrategy, LogEntry};
pub use event::{BoardEvent, EventError, LogUpdated, NoteCreated, NoteMoved};
pub use event::{LOG_UPDATED, NOTE_CREATED, NOTE_MOVED};
pub use note::{demo_notes, Note, NoteId, Status};

//! Client-side board replica.
//!
//! Every client owns one [`BoardState`] and feeds it two kinds of input:
//! local actions (applied optimistically, before the relay has seen them)
//! and remote events (which include the echo of the client's own actions).
//!
//! ```text
//! local create/move ──► BoardState ──► gateway POST ──► relay
//!                           ▲                             │
//!                           └──── apply(remote event) ◄───┘
//! ```
//!
//! Reconciliation rules:
//! - creates are at-most-once per id; the first arrival wins
//! - moves only touch notes the replica already knows
//! - log lines are appended unconditionally, in arrival order
//!
//! Applying the echo of a local action is therefore a no-op, and duplicate
//! deliveries from the relay leave the replica unchanged.

use std::collections::HashMap;
use std::fmt;

use uuid::Uuid;

use crate::event::BoardEvent;
use crate::note::{demo_notes, Note, NoteId, Status};

/// What applying an input did to the replica.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    /// A new note was inserted.
    Inserted,
    /// An existing note changed status.
    Updated,
    /// A log line was appended.
    Appended,
    /// The input matched the current state (e.g. a duplicate move).
    Unchanged,
    /// A create for an id that already exists; the first write is kept.
    DuplicateNote,
    /// A move for an id this replica has never seen; dropped.
    UnknownNote,
}

impl Applied {
    /// Whether the replica changed.
    pub fn changed(&self) -> bool {
        matches!(self, Applied::Inserted | Applied::Updated | Applied::Appended)
    }
}

/// One line of the activity log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry(String);

impl LogEntry {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// How locally created notes get their ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IdStrategy {
    /// Decimal counter, continuing after the highest numeric id seen so far.
    /// Matches the ids other peers mint.
    #[default]
    Sequential,
    /// Random UUIDs. Avoids collisions between replicas creating at the
    /// same time, at the cost of unreadable ids.
    Random,
}

/// Numeric ids at or above this are treated as opaque and never advance
/// the counter.
const MAX_SEQUENCE: u64 = u64::MAX / 2;

#[derive(Debug, Clone)]
struct IdGenerator {
    strategy: IdStrategy,
    next: u64,
}

impl IdGenerator {
    fn new(strategy: IdStrategy) -> Self {
        Self { strategy, next: 1 }
    }

    /// Advance the counter past an id learned from anywhere.
    fn observe(&mut self, id: &NoteId) {
        if let Some(n) = id.sequence().filter(|&n| n < MAX_SEQUENCE) {
            self.next = self.next.max(n + 1);
        }
    }

    fn fresh(&mut self, taken: impl Fn(&NoteId) -> bool) -> NoteId {
        loop {
            let candidate = match self.strategy {
                IdStrategy::Sequential => match self.next.checked_add(1) {
                    Some(after) => {
                        let id = NoteId::new(self.next.to_string());
                        self.next = after;
                        id
                    }
                    // Counter exhausted
                    None => NoteId::new(Uuid::new_v4().to_string()),
                },
                IdStrategy::Random => NoteId::new(Uuid::new_v4().to_string()),
            };
            if !taken(&candidate) {
                return candidate;
            }
        }
    }
}

/// In-memory board replica: notes in insertion order plus the activity log.
#[derive(Debug, Clone)]
pub struct BoardState {
    notes: Vec<Note>,
    /// id → position in `notes`. Notes are never removed, so positions are stable.
    index: HashMap<NoteId, usize>,
    log: Vec<LogEntry>,
    ids: IdGenerator,
}

impl Default for BoardState {
    fn default() -> Self {
        Self::new()
    }
}

impl BoardState {
    /// Empty board with sequential ids.
    pub fn new() -> Self {
        Self::with_id_strategy(IdStrategy::Sequential)
    }

    pub fn with_id_strategy(strategy: IdStrategy) -> Self {
        Self {
            notes: Vec::new(),
            index: HashMap::new(),
            log: Vec::new(),
            ids: IdGenerator::new(strategy),
        }
    }

    /// Board seeded with the given notes. Later duplicates of an id are dropped.
    pub fn with_notes(notes: impl IntoIterator<Item = Note>) -> Self {
        Self::new().seeded(notes)
    }

    /// Add seed notes to this board, keeping its id strategy.
    pub fn seeded(mut self, notes: impl IntoIterator<Item = Note>) -> Self {
        for note in notes {
            self.insert_if_absent(note);
        }
        self
    }

    /// Board seeded with the four demo cards.
    pub fn demo() -> Self {
        Self::with_notes(demo_notes())
    }

    fn insert_if_absent(&mut self, note: Note) -> bool {
        if self.index.contains_key(&note.id) {
            return false;
        }
        self.ids.observe(&note.id);
        self.index.insert(note.id.clone(), self.notes.len());
        self.notes.push(note);
        true
    }

    fn get_mut(&mut self, id: &NoteId) -> Option<&mut Note> {
        let pos = *self.index.get(id)?;
        self.notes.get_mut(pos)
    }

    // ─── Local actions ───────────────────────────────────────────

    /// Create a note in the backlog under a fresh id and return it.
    ///
    /// The caller uses the returned note to build the outgoing relay
    /// request and log line.
    pub fn create_local(&mut self, title: impl Into<String>, description: impl Into<String>) -> Note {
        let index = &self.index;
        let id = self.ids.fresh(|candidate| index.contains_key(candidate));
        let note = Note::new(id, title, description, Status::Backlog);
        if !self.insert_if_absent(note.clone()) {
            log::debug!("Local create skipped: note {} already exists", note.id);
        }
        note
    }

    /// Move a note to another column.
    ///
    /// Returns the note as it was before the move, or `None` when the id is
    /// unknown (nothing changes in that case).
    pub fn move_local(&mut self, id: &NoteId, new_status: Status) -> Option<Note> {
        let note = self.get_mut(id)?;
        let previous = note.clone();
        note.status = new_status;
        Some(previous)
    }

    // ─── Remote events ───────────────────────────────────────────

    /// Insert a note announced by the relay unless its id is already known.
    pub fn apply_remote_create(&mut self, note: Note) -> Applied {
        let id = note.id.clone();
        if self.insert_if_absent(note) {
            Applied::Inserted
        } else {
            log::debug!("Ignoring noteCreated for existing note {id}");
            Applied::DuplicateNote
        }
    }

    /// Change the status of a known note. Moves for unknown ids are dropped.
    pub fn apply_remote_move(&mut self, id: &NoteId, new_status: Status) -> Applied {
        match self.get_mut(id) {
            Some(note) if note.status == new_status => Applied::Unchanged,
            Some(note) => {
                note.status = new_status;
                Applied::Updated
            }
            None => {
                log::warn!(
                    "Dropping noteMoved for unknown note {id} (to {new_status}); replica may diverge"
                );
                Applied::UnknownNote
            }
        }
    }

    /// Append a line to the activity log.
    pub fn append_log(&mut self, message: impl Into<String>) {
        self.log.push(LogEntry(message.into()));
    }

    /// Apply one relay event.
    pub fn apply(&mut self, event: &BoardEvent) -> Applied {
        match event {
            BoardEvent::NoteCreated(created) => self.apply_remote_create(created.clone().into()),
            BoardEvent::NoteMoved(moved) => self.apply_remote_move(&moved.id, moved.new_status),
            BoardEvent::LogUpdated(entry) => {
                self.append_log(entry.log_message.clone());
                Applied::Appended
            }
        }
    }

    // ─── Queries ─────────────────────────────────────────────────

    pub fn get(&self, id: &NoteId) -> Option<&Note> {
        self.index.get(id).and_then(|&pos| self.notes.get(pos))
    }

    pub fn contains(&self, id: &NoteId) -> bool {
        self.index.contains_key(id)
    }

    /// All notes in insertion order.
    pub fn notes(&self) -> &[Note] {
        &self.notes
    }

    pub fn len(&self) -> usize {
        self.notes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.notes.is_empty()
    }

    /// Notes in one column, in insertion order.
    pub fn column(&self, status: Status) -> impl Iterator<Item = &Note> {
        self.notes.iter().filter(move |note| note.status == status)
    }

    /// All columns in display order.
    pub fn columns(&self) -> Vec<(Status, Vec<&Note>)> {
        Status::ALL
            .into_iter()
            .map(|status| (status, self.column(status).collect()))
            .collect()
    }

    pub fn log(&self) -> &[LogEntry] {
        &self.log
    }
}

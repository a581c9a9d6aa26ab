//! Property tests for the board replica's merge rules.

use std::collections::HashSet;

use kanban_core::{Applied, BoardEvent, BoardState, Note, NoteId, Status};
use proptest::prelude::*;

#[derive(Debug, Clone)]
enum Op {
    CreateLocal(String),
    RemoteCreate(String, String, Status),
    RemoteMove(String, Status),
    MoveLocal(String, Status),
    AppendLog(String),
}

fn status() -> impl Strategy<Value = Status> {
    prop::sample::select(Status::ALL.to_vec())
}

// Small id space so creates and moves collide often.
fn note_id() -> impl Strategy<Value = String> {
    (1u8..12).prop_map(|n| n.to_string())
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        "[a-z]{1,8}".prop_map(Op::CreateLocal),
        (note_id(), "[a-z]{1,8}", status()).prop_map(|(id, t, s)| Op::RemoteCreate(id, t, s)),
        (note_id(), status()).prop_map(|(id, s)| Op::RemoteMove(id, s)),
        (note_id(), status()).prop_map(|(id, s)| Op::MoveLocal(id, s)),
        "[a-z ]{1,16}".prop_map(Op::AppendLog),
    ]
}

fn run(board: &mut BoardState, op: &Op) {
    match op {
        Op::CreateLocal(title) => {
            board.create_local(title.clone(), "");
        }
        Op::RemoteCreate(id, title, status) => {
            board.apply_remote_create(Note::new(id.as_str(), title.clone(), "", *status));
        }
        Op::RemoteMove(id, status) => {
            board.apply_remote_move(&NoteId::new(id.as_str()), *status);
        }
        Op::MoveLocal(id, status) => {
            board.move_local(&NoteId::new(id.as_str()), *status);
        }
        Op::AppendLog(line) => board.append_log(line.clone()),
    }
}

proptest! {
    #[test]
    fn no_duplicate_ids(ops in prop::collection::vec(op(), 0..64)) {
        let mut board = BoardState::demo();
        for op in &ops {
            run(&mut board, op);
            let ids: HashSet<&NoteId> = board.notes().iter().map(|n| &n.id).collect();
            prop_assert_eq!(ids.len(), board.len());
        }
    }

    #[test]
    fn log_never_shrinks(ops in prop::collection::vec(op(), 0..64)) {
        let mut board = BoardState::new();
        let mut last = 0;
        for op in &ops {
            run(&mut board, op);
            prop_assert!(board.log().len() >= last);
            last = board.log().len();
        }
    }

    #[test]
    fn remote_move_is_idempotent(
        ops in prop::collection::vec(op(), 0..32),
        id in note_id(),
        target in status(),
    ) {
        let mut board = BoardState::demo();
        for op in &ops {
            run(&mut board, op);
        }
        let id = NoteId::new(id);
        board.apply_remote_move(&id, target);
        let once = board.notes().to_vec();

        let again = board.apply_remote_move(&id, target);
        prop_assert!(!again.changed());
        prop_assert_eq!(board.notes(), once.as_slice());
    }

    #[test]
    fn remote_move_on_unseen_id_changes_nothing(
        ops in prop::collection::vec(op(), 0..32),
        target in status(),
    ) {
        let mut board = BoardState::demo();
        for op in &ops {
            run(&mut board, op);
        }
        let before = board.notes().to_vec();
        let unseen = NoteId::new("never-seen");

        prop_assert_eq!(board.apply_remote_move(&unseen, target), Applied::UnknownNote);
        prop_assert_eq!(board.notes(), before.as_slice());
    }

    #[test]
    fn replaying_events_converges(ops in prop::collection::vec(op(), 0..32)) {
        // Re-delivering every create/move event a second time is harmless.
        let mut board = BoardState::demo();
        for op in &ops {
            run(&mut board, op);
        }
        let events: Vec<BoardEvent> = board
            .notes()
            .iter()
            .flat_map(|n| {
                [
                    BoardEvent::note_created(n),
                    BoardEvent::note_moved(n.id.clone(), n.status),
                ]
            })
            .collect();
        let before = board.notes().to_vec();
        for event in &events {
            board.apply(event);
        }
        prop_assert_eq!(board.notes(), before.as_slice());
    }
}

#[test]
fn append_log_n_times_keeps_order() {
    let mut board = BoardState::new();
    for i in 0..100 {
        board.append_log(format!("entry {i}"));
    }
    assert_eq!(board.log().len(), 100);
    for (i, entry) in board.log().iter().enumerate() {
        assert_eq!(entry.as_str(), format!("entry {i}"));
    }
}

//! Activity log lines produced by local actions.
//!
//! The originating client does not append these to its own log; it sends
//! them through the relay and appends them when the echo arrives, so every
//! replica sees the same lines in relay order.

use chrono::{Local, NaiveTime};

use crate::note::Status;

/// Wall-clock time of day used in log lines.
pub fn now() -> NaiveTime {
    Local::now().time()
}

fn clock(at: NaiveTime) -> String {
    at.format("%H:%M:%S").to_string()
}

pub fn note_created(title: &str, at: NaiveTime) -> String {
    format!("New note {title} created at {}", clock(at))
}

pub fn note_moved(title: &str, status: Status, at: NaiveTime) -> String {
    format!("{title} moved to {status} at {}", clock(at))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_created_line() {
        let at = NaiveTime::from_hms_opt(9, 5, 3).unwrap();
        assert_eq!(note_created("Groceries", at), "New note Groceries created at 09:05:03");
    }

    #[test]
    fn test_moved_line_uses_wire_status() {
        let at = NaiveTime::from_hms_opt(17, 30, 0).unwrap();
        assert_eq!(
            note_moved("Task 2", Status::ToReview, at),
            "Task 2 moved to to-review at 17:30:00"
        );
    }
}

//! Terminal board session: reads commands from stdin, applies relay events,
//! prints the board.

use std::fmt::Write as _;
use std::str::FromStr;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};

use kanban_collab::{BoardClient, ConnectionState, Subscription, SubscriptionEvent};
use kanban_core::{BoardState, EventError, NoteId, Status};

pub const HELP: &str = "\
commands:
  new <title> | <description>   create a note in the backlog
  move <id> <status>            move a note (backlog, in-progress, done, to-review)
  show                          print the board
  log                           print the activity log
  help                          print this help
  quit                          leave";

/// One line of user input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    New { title: String, description: String },
    Move { id: NoteId, status: Status },
    Show,
    Log,
    Help,
    Quit,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CommandError {
    #[error("empty command")]
    Empty,
    #[error("unknown command `{0}` (try `help`)")]
    Unknown(String),
    #[error("usage: {0}")]
    Usage(&'static str),
    #[error(transparent)]
    Invalid(#[from] EventError),
}

impl FromStr for Command {
    type Err = CommandError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let line = line.trim();
        let (word, rest) = line
            .split_once(char::is_whitespace)
            .map(|(w, r)| (w, r.trim()))
            .unwrap_or((line, ""));

        match word {
            "" => Err(CommandError::Empty),
            "new" => {
                let (title, description) = rest
                    .split_once('|')
                    .ok_or(CommandError::Usage("new <title> | <description>"))?;
                Ok(Command::New {
                    title: title.trim().to_string(),
                    description: description.trim().to_string(),
                })
            }
            "move" => {
                let mut parts = rest.split_whitespace();
                let (Some(id), Some(status), None) = (parts.next(), parts.next(), parts.next())
                else {
                    return Err(CommandError::Usage("move <id> <status>"));
                };
                Ok(Command::Move {
                    id: NoteId::parse(id)?,
                    status: status.parse()?,
                })
            }
            "show" => Ok(Command::Show),
            "log" => Ok(Command::Log),
            "help" | "?" => Ok(Command::Help),
            "quit" | "exit" => Ok(Command::Quit),
            other => Err(CommandError::Unknown(other.to_string())),
        }
    }
}

/// Board as columns, one block per status.
pub fn render_board(board: &BoardState) -> String {
    let mut out = String::new();
    for (status, notes) in board.columns() {
        let _ = writeln!(out, "== {status} ({}) ==", notes.len());
        for note in notes {
            if note.description.is_empty() {
                let _ = writeln!(out, "  [{}] {}", note.id, note.title);
            } else {
                let _ = writeln!(out, "  [{}] {}: {}", note.id, note.title, note.description);
            }
        }
    }
    out
}

pub fn render_log(board: &BoardState) -> String {
    if board.log().is_empty() {
        return "(no activity yet)\n".to_string();
    }
    board
        .log()
        .iter()
        .map(|entry| format!("  {entry}\n"))
        .collect()
}

/// Below the relay's advertised activity timeout.
const KEEPALIVE: Duration = Duration::from_secs(60);

enum Flow {
    Continue,
    Quit,
}

async fn handle_line(client: &mut BoardClient, line: &str) -> Flow {
    let command = match line.parse::<Command>() {
        Ok(command) => command,
        Err(CommandError::Empty) => return Flow::Continue,
        Err(e) => {
            println!("{e}");
            return Flow::Continue;
        }
    };

    match command {
        Command::New { title, description } => match client.create_note(&title, &description).await {
            Ok(note) => println!("created [{}] {}", note.id, note.title),
            Err(e) => println!("create failed: {e}"),
        },
        Command::Move { id, status } => match client.move_note(&id, status).await {
            Ok(Some(previous)) => println!("moved [{id}] {} from {}", previous.title, previous.status),
            Ok(None) if client.board().contains(&id) => println!("[{id}] is already in {status}"),
            Ok(None) => println!("no note [{id}]"),
            Err(e) => println!("move failed: {e}"),
        },
        Command::Show => print!("{}", render_board(client.board())),
        Command::Log => print!("{}", render_log(client.board())),
        Command::Help => println!("{HELP}"),
        Command::Quit => return Flow::Quit,
    }
    Flow::Continue
}

/// Interleave stdin commands and subscription events until the user quits
/// or stdin closes. Each input is applied to completion before the next.
pub async fn run(mut client: BoardClient, mut subscription: Subscription) -> std::io::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut live = true;
    let mut keepalive = tokio::time::interval(KEEPALIVE);
    keepalive.tick().await;

    print!("{}", render_board(client.board()));
    println!("{HELP}");

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                if let Flow::Quit = handle_line(&mut client, &line).await {
                    break;
                }
            }
            event = subscription.next_event(), if live => match event {
                Some(SubscriptionEvent::Board(event)) => {
                    let applied = client.apply_remote(&event);
                    log::debug!("Applied {}: {applied:?}", event.name());
                    if let kanban_core::BoardEvent::LogUpdated(entry) = &event {
                        println!("* {}", entry.log_message);
                    } else if applied.changed() {
                        print!("{}", render_board(client.board()));
                    }
                }
                Some(SubscriptionEvent::Subscribed(channel)) => println!("live on channel {channel}"),
                Some(SubscriptionEvent::Connected { .. }) | Some(SubscriptionEvent::Malformed(_)) => {}
                Some(SubscriptionEvent::Disconnected) | None => {
                    println!("relay connection lost; remote changes will no longer appear");
                    live = false;
                }
            },
            _ = keepalive.tick(), if live => {
                if subscription.connection_state().await == ConnectionState::Connected {
                    if let Err(e) = subscription.ping().await {
                        log::warn!("Keepalive ping failed: {e}");
                    }
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_new() {
        assert_eq!(
            "new Groceries | milk, eggs".parse::<Command>().unwrap(),
            Command::New {
                title: "Groceries".into(),
                description: "milk, eggs".into()
            }
        );
        assert_eq!(
            "new Groceries".parse::<Command>().unwrap_err(),
            CommandError::Usage("new <title> | <description>")
        );
    }

    #[test]
    fn test_parse_move() {
        assert_eq!(
            "move 2 to-review".parse::<Command>().unwrap(),
            Command::Move {
                id: NoteId::new("2"),
                status: Status::ToReview
            }
        );
        assert_eq!(
            "move 2 archived".parse::<Command>().unwrap_err(),
            CommandError::Invalid(EventError::UnknownStatus("archived".into()))
        );
        assert!(matches!("move 2".parse::<Command>(), Err(CommandError::Usage(_))));
        assert!(matches!("move 2 done extra".parse::<Command>(), Err(CommandError::Usage(_))));
    }

    #[test]
    fn test_parse_simple_commands() {
        assert_eq!("show".parse::<Command>().unwrap(), Command::Show);
        assert_eq!("  log ".parse::<Command>().unwrap(), Command::Log);
        assert_eq!("quit".parse::<Command>().unwrap(), Command::Quit);
        assert_eq!("".parse::<Command>().unwrap_err(), CommandError::Empty);
        assert_eq!(
            "delete 1".parse::<Command>().unwrap_err(),
            CommandError::Unknown("delete".into())
        );
    }

    #[test]
    fn test_render_board_columns() {
        let text = render_board(&BoardState::demo());
        let backlog = text.find("== backlog (1) ==").unwrap();
        let done = text.find("== done (2) ==").unwrap();
        assert!(backlog < done);
        assert!(text.contains("== to-review (0) =="));
        assert!(text.contains("[1] Task 1"));
    }

    #[test]
    fn test_render_log() {
        let mut board = BoardState::new();
        assert_eq!(render_log(&board), "(no activity yet)\n");
        board.append_log("a");
        board.append_log("b");
        assert_eq!(render_log(&board), "  a\n  b\n");
    }
}

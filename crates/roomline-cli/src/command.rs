//! Input line parsing.
//!
//! Lines starting with `/` are commands; anything else is a message for the
//! active room. A leading `//` sends the rest of the line, slash included.

use roomline_app::UserIntent;
use roomline_core::RoomId;
use thiserror::Error;

/// Command reference shown by `/help`.
pub const HELP: &str = "\
commands:
  /join <room>     switch to a room
  /create <room>   create a public room
  /dm <user>       open a direct conversation
  /rooms, /users   refresh the room and user lists
  /reconnect       connect again after a failure
  /quit            leave
  //text           send text starting with a slash";

/// What a line of input asks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    /// Something for the session
    Intent(UserIntent),
    /// Show [`HELP`]
    Help,
    /// Nothing to do
    Blank,
}

/// Line could not be parsed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    /// Command is missing its argument
    #[error("usage: {0}")]
    Usage(&'static str),

    /// Not a known command
    #[error("unknown command /{0} (try /help)")]
    Unknown(String),
}

/// Parse one line of user input.
///
/// # Errors
///
/// - `CommandError::Usage` if a command lacks its argument
/// - `CommandError::Unknown` for an unrecognized command
pub fn parse(line: &str) -> Result<Input, CommandError> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Ok(Input::Blank);
    }
    if let Some(escaped) = trimmed.strip_prefix("//") {
        return Ok(Input::Intent(UserIntent::Send(format!("/{escaped}"))));
    }
    let Some(command) = trimmed.strip_prefix('/') else {
        return Ok(Input::Intent(UserIntent::Send(trimmed.to_string())));
    };

    let mut parts = command.split_whitespace();
    let name = parts.next().unwrap_or_default();
    let arg = parts.next();

    let intent = match (name, arg) {
        ("join" | "j", Some(room)) => UserIntent::Activate(RoomId::from_remote(room)),
        ("join" | "j", None) => return Err(CommandError::Usage("/join <room>")),
        ("create", Some(room)) => UserIntent::CreateRoom(room.to_string()),
        ("create", None) => return Err(CommandError::Usage("/create <room>")),
        ("dm", Some(user)) => UserIntent::StartDirect(user.to_string()),
        ("dm", None) => return Err(CommandError::Usage("/dm <user>")),
        ("rooms" | "users" | "refresh", _) => UserIntent::Refresh,
        ("reconnect", _) => UserIntent::Reconnect,
        ("quit" | "q", _) => UserIntent::Quit,
        ("help" | "h", _) => return Ok(Input::Help),
        (other, _) => return Err(CommandError::Unknown(other.to_string())),
    };
    Ok(Input::Intent(intent))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn intent(line: &str) -> UserIntent {
        match parse(line) {
            Ok(Input::Intent(intent)) => intent,
            other => panic!("{line:?} parsed to {other:?}"),
        }
    }

    #[test]
    fn plain_text_is_sent() {
        assert_eq!(intent("  hello there "), UserIntent::Send("hello there".into()));
        assert_eq!(intent("//join is a command"), UserIntent::Send("/join is a command".into()));
    }

    #[test]
    fn blank_lines_do_nothing() {
        assert_eq!(parse(""), Ok(Input::Blank));
        assert_eq!(parse("   \t"), Ok(Input::Blank));
    }

    #[test]
    fn commands_map_to_intents() {
        assert_eq!(intent("/join general"), UserIntent::Activate(RoomId::from_remote("general")));
        assert_eq!(intent("/j random"), UserIntent::Activate(RoomId::from_remote("random")));
        assert_eq!(intent("/create lobby"), UserIntent::CreateRoom("lobby".into()));
        assert_eq!(intent("/dm bob"), UserIntent::StartDirect("bob".into()));
        assert_eq!(intent("/rooms"), UserIntent::Refresh);
        assert_eq!(intent("/users"), UserIntent::Refresh);
        assert_eq!(intent("/reconnect"), UserIntent::Reconnect);
        assert_eq!(intent("/quit"), UserIntent::Quit);
        assert_eq!(parse("/help"), Ok(Input::Help));
    }

    #[test]
    fn missing_arguments_and_unknown_commands() {
        assert_eq!(parse("/join"), Err(CommandError::Usage("/join <room>")));
        assert_eq!(parse("/dm  "), Err(CommandError::Usage("/dm <user>")));
        assert_eq!(parse("/frobnicate x"), Err(CommandError::Unknown("frobnicate".into())));
        assert_eq!(
            CommandError::Unknown("x".into()).to_string(),
            "unknown command /x (try /help)"
        );
    }
}

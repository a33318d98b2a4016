//! Slash-command parser for the interactive chat
//!
//! Lines starting with `/` control the session instead of being sent to the
//! astrologer:
//! - List charts and pick which ones scope the conversation
//! - Show connection and usage status
//! - Reconnect after the client gave up
//! - Display help and exit
//!
//! Commands are case-insensitive; chart ids keep their original case.

use thiserror::Error;

/// Errors that can occur when parsing slash commands
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CommandError {
    /// Unknown command was entered
    #[error("Unknown command: {0}\n\nType '/help' to see available commands")]
    UnknownCommand(String),

    /// Command requires an argument but none was provided
    #[error("Command {command} requires an argument\n\nUsage: {usage}")]
    MissingArgument { command: String, usage: String },
}

/// Commands handled locally by the chat front end
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpecialCommand {
    /// List saved charts and mark the selected ones
    ListCharts,

    /// Toggle one chart in the selection
    SelectChart(String),

    /// Deselect every chart
    ClearCharts,

    /// Show connection state, conversation and usage
    ShowStatus,

    /// Start a fresh connection
    Reconnect,

    /// Display help information
    Help,

    /// Exit the interactive session
    Exit,

    /// Not a special command; send it as a message
    None,
}

/// Parse one input line.
///
/// # Errors
///
/// Returns [`CommandError::UnknownCommand`] for an unrecognised `/word` and
/// [`CommandError::MissingArgument`] for `/select` without an id.
///
/// # Examples
///
/// ```
/// use astrochat::commands::special_commands::{parse_special_command, SpecialCommand};
///
/// assert_eq!(
///     parse_special_command("/select Natal-1").unwrap(),
///     SpecialCommand::SelectChart("Natal-1".to_string())
/// );
/// assert_eq!(
///     parse_special_command("what is my sun sign?").unwrap(),
///     SpecialCommand::None
/// );
/// assert!(parse_special_command("/horoscope").is_err());
/// ```
pub fn parse_special_command(input: &str) -> Result<SpecialCommand, CommandError> {
    let trimmed = input.trim();
    let lower = trimmed.to_lowercase();

    if !trimmed.starts_with('/') && lower != "exit" && lower != "quit" {
        return Ok(SpecialCommand::None);
    }

    let (head, rest) = match trimmed.split_once(char::is_whitespace) {
        Some((head, rest)) => (head.to_lowercase(), rest.trim()),
        None => (lower.clone(), ""),
    };

    match head.as_str() {
        "/charts" => Ok(SpecialCommand::ListCharts),
        "/select" | "/chart" => {
            if rest.is_empty() {
                Err(CommandError::MissingArgument {
                    command: "/select".to_string(),
                    usage: "/select <chart_id>".to_string(),
                })
            } else {
                Ok(SpecialCommand::SelectChart(rest.to_string()))
            }
        }
        "/clear-charts" | "/clear" => Ok(SpecialCommand::ClearCharts),
        "/status" => Ok(SpecialCommand::ShowStatus),
        "/reconnect" => Ok(SpecialCommand::Reconnect),
        "/help" | "/?" => Ok(SpecialCommand::Help),
        "/quit" | "/exit" | "exit" | "quit" => Ok(SpecialCommand::Exit),
        _ => Err(CommandError::UnknownCommand(head)),
    }
}

/// Display help for the slash commands
pub fn print_help() {
    println!(
        r#"
Chat Commands
=============

CHARTS:
  /charts           - List your saved charts (selected ones are marked)
  /select <id>      - Add or remove a chart from the conversation
  /clear-charts     - Deselect every chart

SESSION:
  /status           - Show connection, conversation and usage
  /reconnect        - Reconnect after the connection gave up
  /help             - Show this help message
  /quit             - Exit (also: exit, quit, Ctrl-D)

NOTES:
  - Anything not starting with / is sent to the astrologer
  - Selected charts are attached to every message until you change them
  - Manage charts with `astrochat charts`, upgrades with `astrochat billing`
"#
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_text_is_not_a_command() {
        assert_eq!(
            parse_special_command("Tell me about Mercury retrograde").unwrap(),
            SpecialCommand::None
        );
    }

    #[test]
    fn test_parse_charts() {
        assert_eq!(
            parse_special_command("/charts").unwrap(),
            SpecialCommand::ListCharts
        );
        assert_eq!(
            parse_special_command("/CHARTS").unwrap(),
            SpecialCommand::ListCharts
        );
    }

    #[test]
    fn test_parse_select_keeps_id_case() {
        assert_eq!(
            parse_special_command("/Select  AbC-123 ").unwrap(),
            SpecialCommand::SelectChart("AbC-123".to_string())
        );
    }

    #[test]
    fn test_parse_select_without_id() {
        assert!(matches!(
            parse_special_command("/select"),
            Err(CommandError::MissingArgument { .. })
        ));
    }

    #[test]
    fn test_parse_clear_charts() {
        assert_eq!(
            parse_special_command("/clear-charts").unwrap(),
            SpecialCommand::ClearCharts
        );
    }

    #[test]
    fn test_parse_status_and_reconnect() {
        assert_eq!(
            parse_special_command("/status").unwrap(),
            SpecialCommand::ShowStatus
        );
        assert_eq!(
            parse_special_command("/reconnect").unwrap(),
            SpecialCommand::Reconnect
        );
    }

    #[test]
    fn test_parse_help_aliases() {
        assert_eq!(parse_special_command("/help").unwrap(), SpecialCommand::Help);
        assert_eq!(parse_special_command("/?").unwrap(), SpecialCommand::Help);
    }

    #[test]
    fn test_parse_exit_aliases() {
        for input in ["/quit", "/exit", "exit", "QUIT"] {
            assert_eq!(parse_special_command(input).unwrap(), SpecialCommand::Exit);
        }
    }

    #[test]
    fn test_unknown_command() {
        assert_eq!(
            parse_special_command("/horoscope today"),
            Err(CommandError::UnknownCommand("/horoscope".to_string()))
        );
    }
}

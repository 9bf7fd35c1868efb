use thiserror::Error;

use natter_protocol::{Message, NAME_DELIMITER};

pub const USAGE: &str = "Usage:\n  quit\n  list\n  set-name\n  <name>: <message>";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum InputError {
    #[error("Invalid input")]
    Malformed,
}

#[derive(Debug, PartialEq, Eq)]
pub enum Action {
    Send(Message),
    /// Send, then leave.
    Quit(Message),
    /// Ask the operator for a name; the next line is taken as that name.
    PromptName,
}

/// Turns operator lines into requests. Stateful only across `set-name`,
/// whose name arrives on the following line.
#[derive(Debug, Default)]
pub struct InputParser {
    awaiting_name: bool,
}

impl InputParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn feed(&mut self, line: &str) -> Result<Action, InputError> {
        let line = line.trim();

        if self.awaiting_name {
            self.awaiting_name = false;
            return Ok(Action::Send(Message::connect(line)));
        }

        match line {
            "quit" => Ok(Action::Quit(Message::disconnect())),
            "list" => Ok(Action::Send(Message::list())),
            "set-name" => {
                self.awaiting_name = true;
                Ok(Action::PromptName)
            }
            _ => parse_direct(line).map(Action::Send),
        }
    }
}

/// `name: message`, split on exactly one delimiter.
fn parse_direct(line: &str) -> Result<Message, InputError> {
    let mut parts = line.split(NAME_DELIMITER);
    match (parts.next(), parts.next(), parts.next()) {
        (Some(name), Some(body), None) => Ok(Message::send(name.trim(), body.trim())),
        _ => Err(InputError::Malformed),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keywords() {
        let mut parser = InputParser::new();
        assert_eq!(parser.feed("quit"), Ok(Action::Quit(Message::disconnect())));
        assert_eq!(parser.feed("  list \n"), Ok(Action::Send(Message::list())));
    }

    #[test]
    fn test_set_name_takes_next_line() {
        let mut parser = InputParser::new();

        assert_eq!(parser.feed("set-name"), Ok(Action::PromptName));
        assert_eq!(parser.feed(" alice \n"), Ok(Action::Send(Message::connect("alice"))));

        // back to normal parsing afterwards
        assert_eq!(parser.feed("list"), Ok(Action::Send(Message::list())));
    }

    #[test]
    fn test_name_line_is_not_interpreted() {
        let mut parser = InputParser::new();
        parser.feed("set-name").unwrap();
        assert_eq!(parser.feed("quit"), Ok(Action::Send(Message::connect("quit"))));
    }

    #[test]
    fn test_direct_message() {
        let mut parser = InputParser::new();
        assert_eq!(
            parser.feed("bob:   hello there  "),
            Ok(Action::Send(Message::send("bob", "hello there")))
        );
        assert_eq!(
            parser.feed(" bob :hi"),
            Ok(Action::Send(Message::send("bob", "hi")))
        );
    }

    #[test]
    fn test_malformed_lines() {
        let mut parser = InputParser::new();
        assert_eq!(parser.feed("hello"), Err(InputError::Malformed));
        assert_eq!(parser.feed("bob: it is 10:30"), Err(InputError::Malformed));
        assert_eq!(parser.feed(""), Err(InputError::Malformed));
    }
}

//! Line commands read from stdin while the host runs.

use std::path::PathBuf;
use std::str::FromStr;

use thiserror::Error;

pub const HELP: &str = "\
commands:
  restart         reinitialize the formatter backend
  status          show backend state and run counters
  add <dir>       add a workspace folder
  remove <dir>    remove a workspace folder
  format <file>   format a file through the Legacy backend and print it
  quit            shut down";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostCommand {
    Restart,
    Status,
    Add(PathBuf),
    Remove(PathBuf),
    Format(PathBuf),
    Help,
    Quit,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseCommandError {
    #[error("empty command")]
    Empty,
    #[error("unknown command `{0}` (try `help`)")]
    Unknown(String),
    #[error("`{0}` needs a path argument")]
    MissingPath(&'static str),
}

impl FromStr for HostCommand {
    type Err = ParseCommandError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let line = line.trim();
        let (verb, rest) = line
            .split_once(char::is_whitespace)
            .map_or((line, ""), |(verb, rest)| (verb, rest.trim()));

        let path = |name: &'static str| {
            if rest.is_empty() {
                Err(ParseCommandError::MissingPath(name))
            } else {
                Ok(PathBuf::from(rest))
            }
        };

        match verb {
            "" => Err(ParseCommandError::Empty),
            "restart" | "r" => Ok(Self::Restart),
            "status" | "s" => Ok(Self::Status),
            "add" => path("add").map(Self::Add),
            "remove" | "rm" => path("remove").map(Self::Remove),
            "format" | "fmt" => path("format").map(Self::Format),
            "help" | "?" => Ok(Self::Help),
            "quit" | "exit" | "q" => Ok(Self::Quit),
            other => Err(ParseCommandError::Unknown(other.to_string())),
        }
    }
}

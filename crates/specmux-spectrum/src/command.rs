//! Client commands of the form `<cmd>:<integer>`.

use std::str::FromStr;

use thiserror::Error;

/// A parsed client command.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClientCommand {
    /// Retune the reported center frequency (Hz).
    Center(i64),
    /// Change the reported span (Hz, positive).
    Span(i64),
    /// `1` subscribes the sender to log lines, `0` unsubscribes.
    Logs(bool),
}

/// Why a client message is not a command.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum CommandError {
    /// No `:` separator, or nothing before it.
    #[error("malformed command: {0:?}")]
    Malformed(String),
    /// Unrecognized command name.
    #[error("unknown command: {0}")]
    Unknown(String),
    /// The argument is not valid for the command.
    #[error("invalid argument for {cmd}: {arg:?}")]
    InvalidArgument {
        /// Command name.
        cmd: String,
        /// Raw argument.
        arg: String,
    },
}

impl FromStr for ClientCommand {
    type Err = CommandError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let text = text.trim();
        let Some((cmd, arg)) = text.split_once(':') else {
            return Err(CommandError::Malformed(text.to_string()));
        };
        if cmd.is_empty() {
            return Err(CommandError::Malformed(text.to_string()));
        }
        let invalid = || CommandError::InvalidArgument {
            cmd: cmd.to_string(),
            arg: arg.to_string(),
        };
        let value: i64 = arg.trim().parse().map_err(|_| invalid())?;
        match cmd {
            "center" => Ok(Self::Center(value)),
            "span" if value > 0 => Ok(Self::Span(value)),
            "span" => Err(invalid()),
            "logs" => match value {
                0 => Ok(Self::Logs(false)),
                1 => Ok(Self::Logs(true)),
                _ => Err(invalid()),
            },
            other => Err(CommandError::Unknown(other.to_string())),
        }
    }
}

//! Command errors
//!
//! Everything a single request can get wrong. These never close the
//! connection; they are turned into a RESP error reply for that request.

use crate::config::UnknownParam;
use crate::protocol::RespValue;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    #[error("ERR unknown command '{0}'")]
    UnknownCommand(String),

    #[error("ERR unknown subcommand '{subcommand}' for '{command}' command")]
    UnknownSubcommand { command: String, subcommand: String },

    /// Carries the lower-case command name, as Redis reports it.
    #[error("ERR wrong number of arguments for '{0}' command")]
    WrongArity(String),

    #[error("ERR syntax error")]
    Syntax,

    #[error("ERR value is not an integer or out of range")]
    NotAnInteger,

    #[error("ERR invalid expire time in '{0}' command")]
    InvalidExpireTime(String),

    #[error("ERR {0}")]
    UnknownConfigParam(#[from] UnknownParam),
}

impl CommandError {
    pub fn wrong_arity(command: &str) -> Self {
        CommandError::WrongArity(command.to_ascii_lowercase())
    }

    /// Renders the error as a reply.
    pub fn to_resp(&self) -> RespValue {
        RespValue::error(self.to_string())
    }
}

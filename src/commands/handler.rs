//! Command Handler
//!
//! Validates a [`Request`], runs it against the storage engine and builds the
//! reply. Failures for a single request come back as RESP errors; nothing in
//! here can end a connection.
//!
//! ## Supported Commands
//!
//! - `SET key value [PX milliseconds]` - Set a key, optionally with a TTL
//! - `GET key` - Get a key's value
//! - `PING [message]` - Test connection
//! - `ECHO message` - Echo message
//! - `CONFIG GET parameter` - Read `dir` or `dbfilename`
//!
//! ```text
//! Request ──> execute() ──> dispatch() ──> cmd_*() ──> StorageEngine
//!                 │
//!                 └── CommandError ──> -ERR ...\r\n
//! ```

use crate::commands::error::CommandError;
use crate::config::{Config, ConfigParam};
use crate::protocol::{Request, RespValue};
use crate::storage::StorageEngine;
use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;
use tracing::trace;

type CommandResult = Result<RespValue, CommandError>;

/// Handles Redis commands by dispatching them to the appropriate handlers.
///
/// Cloning is cheap; every connection gets its own clone pointing at the
/// same storage engine and configuration.
#[derive(Debug, Clone)]
pub struct CommandHandler {
    storage: Arc<StorageEngine>,
    config: Arc<Config>,
}

impl CommandHandler {
    /// Creates a new command handler over the shared storage engine.
    pub fn new(storage: Arc<StorageEngine>, config: Arc<Config>) -> Self {
        Self { storage, config }
    }

    /// Executes a request and returns the reply to send back.
    pub fn execute(&self, request: &Request) -> RespValue {
        match self.dispatch(request) {
            Ok(reply) => reply,
            Err(e) => {
                trace!(command = request.name(), error = %e, "Command failed");
                e.to_resp()
            }
        }
    }

    fn dispatch(&self, request: &Request) -> CommandResult {
        let args = request.args();
        match request.name() {
            "SET" => self.cmd_set(args),
            "GET" => self.cmd_get(args),
            "PING" => cmd_ping(args),
            "ECHO" => cmd_echo(args),
            "CONFIG" => self.cmd_config(args),
            _ => Err(CommandError::UnknownCommand(display_token(request.raw_name()))),
        }
    }

    /// SET key value [PX milliseconds]
    fn cmd_set(&self, args: &[Bytes]) -> CommandResult {
        let ttl = match args {
            [_, _] => None,
            [_, _, option, ms] if option.eq_ignore_ascii_case(b"PX") => {
                let ms = parse_integer(ms)?;
                if ms < 0 {
                    return Err(CommandError::InvalidExpireTime("set".to_string()));
                }
                Some(Duration::from_millis(ms as u64))
            }
            [_, _, _, _] | [_, _, _] => return Err(CommandError::Syntax),
            _ => return Err(CommandError::wrong_arity("SET")),
        };

        self.storage.set(args[0].clone(), args[1].clone(), ttl);
        Ok(RespValue::ok())
    }

    /// GET key
    fn cmd_get(&self, args: &[Bytes]) -> CommandResult {
        let [key] = args else {
            return Err(CommandError::wrong_arity("GET"));
        };

        Ok(match self.storage.get(key) {
            Some(value) => RespValue::bulk_string(value),
            None => RespValue::null(),
        })
    }

    /// CONFIG GET parameter
    fn cmd_config(&self, args: &[Bytes]) -> CommandResult {
        let Some(subcommand) = args.first() else {
            return Err(CommandError::wrong_arity("CONFIG"));
        };
        if !subcommand.eq_ignore_ascii_case(b"GET") {
            return Err(CommandError::UnknownSubcommand {
                command: "CONFIG".to_string(),
                subcommand: display_token(subcommand),
            });
        }

        let [_, param] = args else {
            return Err(CommandError::wrong_arity("CONFIG|GET"));
        };
        let param: ConfigParam = String::from_utf8_lossy(param).parse()?;

        Ok(RespValue::array(vec![
            RespValue::bulk_string(param.name()),
            RespValue::bulk_string(self.config.get(param)),
        ]))
    }
}

/// PING [message]
fn cmd_ping(args: &[Bytes]) -> CommandResult {
    match args {
        [] => Ok(RespValue::pong()),
        // A simple string cannot carry CR or LF, or binary data
        [message] => Ok(match std::str::from_utf8(message) {
            Ok(text) if !text.contains(['\r', '\n']) => RespValue::simple_string(text),
            _ => RespValue::bulk_string(message.clone()),
        }),
        _ => Err(CommandError::wrong_arity("PING")),
    }
}

/// ECHO message
fn cmd_echo(args: &[Bytes]) -> CommandResult {
    match args {
        [message] => Ok(RespValue::bulk_string(message.clone())),
        _ => Err(CommandError::wrong_arity("ECHO")),
    }
}

/// Renders a client token for an error message. Non-UTF-8 tokens are
/// escaped rather than lossily decoded.
fn display_token(token: &[u8]) -> String {
    match std::str::from_utf8(token) {
        Ok(text) => text.to_owned(),
        Err(_) => token.escape_ascii().to_string(),
    }
}

fn parse_integer(arg: &[u8]) -> Result<i64, CommandError> {
    std::str::from_utf8(arg)
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or(CommandError::NotAnInteger)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn create_handler() -> CommandHandler {
        let storage = Arc::new(StorageEngine::new());
        CommandHandler::new(storage, Arc::new(Config::default()))
    }

    fn make_command(args: &[&str]) -> Request {
        Request::from_tokens(args.iter().map(|s| Bytes::from(s.to_string())).collect())
    }

    fn run(handler: &CommandHandler, args: &[&str]) -> Vec<u8> {
        handler.execute(&make_command(args)).serialize()
    }

    #[test]
    fn test_ping() {
        let handler = create_handler();

        assert_eq!(run(&handler, &["PING"]), b"+PONG\r\n");
        assert_eq!(run(&handler, &["PING", "Hello"]), b"+Hello\r\n");
        assert_eq!(run(&handler, &["ping"]), b"+PONG\r\n");
    }

    #[test]
    fn test_ping_too_many_args() {
        let handler = create_handler();
        let response = handler.execute(&make_command(&["PING", "a", "b"]));
        assert_eq!(
            response,
            RespValue::error("ERR wrong number of arguments for 'ping' command")
        );
    }

    #[test]
    fn test_echo() {
        let handler = create_handler();

        assert_eq!(run(&handler, &["ECHO", "Hello"]), b"$5\r\nHello\r\n");
        assert_eq!(
            run(&handler, &["ECHO", "Hello, world!"]),
            b"$13\r\nHello, world!\r\n"
        );
    }

    #[test]
    fn test_echo_missing_arg() {
        let handler = create_handler();
        let response = handler.execute(&make_command(&["ECHO"]));
        assert!(response.is_error());
    }

    #[test]
    fn test_set_get() {
        let handler = create_handler();

        assert_eq!(run(&handler, &["SET", "foo", "bar"]), b"+OK\r\n");
        assert_eq!(run(&handler, &["GET", "foo"]), b"$3\r\nbar\r\n");
    }

    #[test]
    fn test_args_keep_case() {
        let handler = create_handler();

        run(&handler, &["set", "Foo", "BaR"]);
        assert_eq!(run(&handler, &["get", "Foo"]), b"$3\r\nBaR\r\n");
        assert_eq!(run(&handler, &["GET", "foo"]), b"$-1\r\n");
    }

    #[test]
    fn test_get_nonexistent() {
        let handler = create_handler();
        assert_eq!(run(&handler, &["GET", "nonexistent"]), b"$-1\r\n");
    }

    #[test]
    fn test_get_wrong_arity() {
        let handler = create_handler();
        assert_eq!(
            run(&handler, &["GET"]),
            b"-ERR wrong number of arguments for 'get' command\r\n"
        );
        assert!(handler.execute(&make_command(&["GET", "a", "b"])).is_error());
    }

    #[test]
    fn test_set_with_px() {
        let handler = create_handler();

        assert_eq!(run(&handler, &["SET", "key", "value", "px", "100"]), b"+OK\r\n");
        assert_eq!(run(&handler, &["GET", "key"]), b"$5\r\nvalue\r\n");

        std::thread::sleep(Duration::from_millis(150));

        assert_eq!(run(&handler, &["GET", "key"]), b"$-1\r\n");
    }

    #[test]
    fn test_set_px_zero_means_no_expiry() {
        let handler = create_handler();

        assert_eq!(run(&handler, &["SET", "key", "value", "PX", "0"]), b"+OK\r\n");
        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(run(&handler, &["GET", "key"]), b"$5\r\nvalue\r\n");
    }

    #[test]
    fn test_set_invalid_px_does_not_write() {
        let handler = create_handler();

        assert_eq!(
            run(&handler, &["SET", "key", "value", "PX", "soon"]),
            b"-ERR value is not an integer or out of range\r\n"
        );
        assert_eq!(
            run(&handler, &["SET", "key", "value", "PX", "-5"]),
            b"-ERR invalid expire time in 'set' command\r\n"
        );
        assert_eq!(run(&handler, &["GET", "key"]), b"$-1\r\n");
    }

    #[test]
    fn test_set_bad_shape() {
        let handler = create_handler();

        assert_eq!(run(&handler, &["SET", "key"]), b"-ERR wrong number of arguments for 'set' command\r\n");
        assert_eq!(run(&handler, &["SET", "key", "value", "PX"]), b"-ERR syntax error\r\n");
        assert_eq!(run(&handler, &["SET", "key", "value", "EX", "10"]), b"-ERR syntax error\r\n");
        assert_eq!(run(&handler, &["SET", "key", "value", "x"]), b"-ERR syntax error\r\n");
        assert!(handler
            .execute(&make_command(&["SET", "k", "v", "PX", "1", "extra"]))
            .is_error());
        assert_eq!(run(&handler, &["GET", "key"]), b"$-1\r\n");
    }

    #[test]
    fn test_set_overwrites_ttl() {
        let handler = create_handler();

        run(&handler, &["SET", "k", "v1", "PX", "30"]);
        run(&handler, &["SET", "k", "v2"]);
        std::thread::sleep(Duration::from_millis(60));
        assert_eq!(run(&handler, &["GET", "k"]), b"$2\r\nv2\r\n");
    }

    #[test]
    fn test_config_get() {
        let config = Config {
            dir: PathBuf::from("/var/lib/ember"),
            dbfilename: "ember.rdb".to_string(),
            ..Config::default()
        };
        let handler = CommandHandler::new(Arc::new(StorageEngine::new()), Arc::new(config));

        assert_eq!(
            run(&handler, &["CONFIG", "GET", "dir"]),
            b"*2\r\n$3\r\ndir\r\n$14\r\n/var/lib/ember\r\n"
        );
        assert_eq!(
            run(&handler, &["config", "get", "DBFILENAME"]),
            b"*2\r\n$10\r\ndbfilename\r\n$9\r\nember.rdb\r\n"
        );
    }

    #[test]
    fn test_config_errors() {
        let handler = create_handler();

        assert_eq!(
            run(&handler, &["CONFIG", "GET", "maxmemory"]),
            b"-ERR unknown config parameter 'maxmemory'\r\n"
        );
        assert!(handler.execute(&make_command(&["CONFIG", "SET", "dir", "/"])).is_error());
        assert!(handler.execute(&make_command(&["CONFIG", "GET"])).is_error());
        assert!(handler.execute(&make_command(&["CONFIG"])).is_error());
    }

    #[test]
    fn test_unknown_command() {
        let handler = create_handler();

        assert_eq!(run(&handler, &["FOOZ"]), b"-ERR unknown command 'FOOZ'\r\n");
        assert_eq!(run(&handler, &["fooz"]), b"-ERR unknown command 'fooz'\r\n");
        // Still works afterwards
        assert_eq!(run(&handler, &["PING"]), b"+PONG\r\n");
    }

    #[test]
    fn test_unknown_command_empty_name() {
        let handler = create_handler();
        assert_eq!(run(&handler, &[""]), b"-ERR unknown command ''\r\n");
    }

    #[test]
    fn test_unknown_command_non_utf8_name_is_escaped() {
        let handler = create_handler();
        let request = Request::from_tokens(vec![Bytes::from_static(b"fo\xffo")]);
        assert_eq!(
            handler.execute(&request),
            RespValue::error("ERR unknown command 'fo\\xffo'")
        );
    }

    #[test]
    fn test_ping_message_with_line_break_is_bulk() {
        let handler = create_handler();

        let reply = run(&handler, &["PING", "a\r\n+OK"]);
        assert_eq!(reply, b"$6\r\na\r\n+OK\r\n");

        // Exactly one frame comes back
        let (_, consumed) = crate::protocol::parse_message(&reply).unwrap().unwrap();
        assert_eq!(consumed, reply.len());
    }

    #[test]
    fn test_unknown_command_with_line_break_stays_one_frame() {
        let handler = create_handler();

        let reply = run(&handler, &["a\r\n+OK"]);
        let (_, consumed) = crate::protocol::parse_message(&reply).unwrap().unwrap();
        assert_eq!(consumed, reply.len());
    }
}

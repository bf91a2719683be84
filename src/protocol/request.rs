//! Client requests
//!
//! A [`Request`] is the canonical shape of what a client asks for: a command
//! name followed by arguments. The parser yields generic [`RespValue`]s, and
//! this module narrows them down to that shape, rejecting anything a client
//! has no business sending as a command.

use crate::protocol::parser::{ParseError, ParseResult};
use crate::protocol::types::RespValue;
use bytes::Bytes;

/// A decoded client command.
///
/// The name is upper-cased when the request is built; arguments keep the
/// case the client sent. The name token is also kept as sent, for error
/// replies.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Request {
    /// `None` only for an empty request. `Some("")` is a real, if unknown,
    /// command.
    name: Option<String>,
    raw_name: Bytes,
    args: Vec<Bytes>,
}

impl Request {
    /// Builds a request from raw tokens. The first token is the command name.
    ///
    /// An empty token list yields an empty request.
    pub fn from_tokens(tokens: Vec<Bytes>) -> Self {
        let mut tokens = tokens.into_iter();
        match tokens.next() {
            Some(raw_name) => Self {
                name: Some(String::from_utf8_lossy(&raw_name).to_uppercase()),
                raw_name,
                args: tokens.collect(),
            },
            None => Self::default(),
        }
    }

    /// Converts a parsed RESP value into a request.
    ///
    /// Arrays are the normal case. A lone bulk string, simple string or
    /// integer becomes a single-token request. Error frames are reported as
    /// [`ParseError::ErrorFrame`].
    pub fn from_value(value: RespValue) -> ParseResult<Self> {
        match value {
            RespValue::Array(None) => Ok(Self::default()),
            RespValue::Array(Some(items)) => {
                let tokens = items
                    .into_iter()
                    .map(into_token)
                    .collect::<ParseResult<Vec<_>>>()?;
                Ok(Self::from_tokens(tokens))
            }
            other => Ok(Self::from_tokens(vec![into_token(other)?])),
        }
    }

    /// The upper-cased command name, empty for an empty request.
    ///
    /// Bytes that are not valid UTF-8 become U+FFFD here; use
    /// [`Request::raw_name`] to see what the client actually sent.
    pub fn name(&self) -> &str {
        self.name.as_deref().unwrap_or_default()
    }

    /// The command name token exactly as the client sent it.
    pub fn raw_name(&self) -> &[u8] {
        &self.raw_name
    }

    /// Arguments after the command name.
    pub fn args(&self) -> &[Bytes] {
        &self.args
    }

    /// Total token count, including the command name.
    pub fn arity(&self) -> usize {
        match self.name {
            Some(_) => self.args.len() + 1,
            None => 0,
        }
    }

    /// True for `*0\r\n` and `*-1\r\n`, which clients may send and which get no reply.
    ///
    /// A request whose name token is itself empty (`*1\r\n$0\r\n\r\n`) is
    /// not empty: it is an unknown command and gets an error reply.
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
    }

    /// Encodes the request as an array of bulk strings.
    pub fn encode(&self) -> Vec<u8> {
        if self.is_empty() {
            return RespValue::array(Vec::new()).serialize();
        }
        let mut items = Vec::with_capacity(self.arity());
        items.push(RespValue::bulk_string(Bytes::from(self.name().to_owned())));
        items.extend(self.args.iter().cloned().map(RespValue::bulk_string));
        RespValue::array(items).serialize()
    }
}

fn into_token(value: RespValue) -> ParseResult<Bytes> {
    match value {
        RespValue::BulkString(Some(data)) => Ok(data),
        RespValue::SimpleString(s) => Ok(Bytes::from(s)),
        RespValue::Integer(n) => Ok(Bytes::from(n.to_string())),
        RespValue::Error(msg) => Err(ParseError::ErrorFrame(msg)),
        RespValue::BulkString(None) => Err(ParseError::ProtocolError(
            "null bulk string is not a valid command token".to_string(),
        )),
        RespValue::Array(_) => Err(ParseError::ProtocolError(
            "nested array is not a valid command token".to_string(),
        )),
    }
}

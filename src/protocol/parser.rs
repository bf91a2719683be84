//! Incremental RESP Protocol Parser
//!
//! The parser reads from a byte buffer and returns either:
//! - `Ok(Some((value, consumed)))` - one complete value, `consumed` bytes were used
//! - `Ok(None)` - the message is incomplete, read more and retry
//! - `Err(ParseError)` - invalid protocol data
//!
//! The caller appends network data to a buffer, calls `parse()`, and on
//! success advances the buffer by `consumed` bytes. Errors are final: the
//! parser never tries to find the start of the next message, so the
//! connection has to be closed.
//!
//! One byte of lookahead (the type prefix) picks the production. Every
//! length-prefixed field consumes exactly its length plus the trailing CRLF.

use crate::protocol::types::{prefix, RespValue, CRLF};
use bytes::Bytes;
use std::num::ParseIntError;
use thiserror::Error;

/// Errors that can occur during RESP parsing.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ParseError {
    /// Unknown type prefix byte
    #[error("unknown type prefix: {0:#04x}")]
    UnknownPrefix(u8),

    /// Invalid integer or length format
    #[error("invalid integer: {0}")]
    InvalidInteger(String),

    /// Invalid UTF-8 in a simple string, error message or length line
    #[error("invalid UTF-8: {0}")]
    InvalidUtf8(String),

    /// Bulk string length is negative (but not -1 for null)
    #[error("invalid bulk string length: {0}")]
    InvalidBulkLength(i64),

    /// Array length is negative (but not -1 for null)
    #[error("invalid array length: {0}")]
    InvalidArrayLength(i64),

    /// The peer sent an error frame where a request was expected
    #[error("RESP error: {0}")]
    ErrorFrame(String),

    /// Protocol violation (missing CRLF, bad request shape, etc.)
    #[error("protocol error: {0}")]
    ProtocolError(String),

    /// The message exceeds maximum allowed size
    #[error("message too large: {size} bytes (max: {max})")]
    MessageTooLarge { size: usize, max: usize },
}

/// Result type for parsing operations.
pub type ParseResult<T> = Result<T, ParseError>;

/// Maximum size for a single bulk string (512 MB, same as Redis)
pub const MAX_BULK_SIZE: usize = 512 * 1024 * 1024;

/// Maximum array nesting depth (prevent stack overflow)
pub const MAX_NESTING_DEPTH: usize = 32;

/// An incremental RESP protocol parser.
///
/// # Example
///
/// ```
/// use emberkv::protocol::{RespParser, RespValue};
/// use bytes::{Buf, BytesMut};
///
/// let mut parser = RespParser::new();
/// let mut buffer = BytesMut::from(&b"*2\r\n$3\r\nGET\r\n$4\r\nname\r\n"[..]);
///
/// let (value, consumed) = parser.parse(&buffer).unwrap().unwrap();
/// buffer.advance(consumed);
/// assert!(matches!(value, RespValue::Array(Some(ref items)) if items.len() == 2));
/// assert!(buffer.is_empty());
/// ```
#[derive(Debug, Default)]
pub struct RespParser {
    /// Current nesting depth (for array parsing)
    depth: usize,
}

impl RespParser {
    /// Creates a new parser instance.
    pub fn new() -> Self {
        Self { depth: 0 }
    }

    /// Attempts to parse one RESP value from the front of `buf`.
    pub fn parse(&mut self, buf: &[u8]) -> ParseResult<Option<(RespValue, usize)>> {
        self.depth = 0;
        self.parse_value(buf)
    }

    fn parse_value(&mut self, buf: &[u8]) -> ParseResult<Option<(RespValue, usize)>> {
        let Some(&tag) = buf.first() else {
            return Ok(None);
        };

        if self.depth > MAX_NESTING_DEPTH {
            return Err(ParseError::ProtocolError(format!(
                "maximum nesting depth exceeded: {}",
                MAX_NESTING_DEPTH
            )));
        }

        match tag {
            prefix::SIMPLE_STRING => Ok(parse_text(buf)?
                .map(|(s, consumed)| (RespValue::SimpleString(s.to_string()), consumed))),
            prefix::ERROR => {
                Ok(parse_text(buf)?.map(|(s, consumed)| (RespValue::Error(s.to_string()), consumed)))
            }
            prefix::INTEGER => match parse_text(buf)? {
                Some((s, consumed)) => Ok(Some((RespValue::Integer(parse_i64(s)?), consumed))),
                None => Ok(None),
            },
            prefix::BULK_STRING => self.parse_bulk_string(buf),
            prefix::ARRAY => self.parse_array(buf),
            other => Err(ParseError::UnknownPrefix(other)),
        }
    }

    /// Parses a bulk string: `$<length>\r\n<data>\r\n`
    fn parse_bulk_string(&mut self, buf: &[u8]) -> ParseResult<Option<(RespValue, usize)>> {
        let Some((length_str, header_len)) = parse_text(buf)? else {
            return Ok(None);
        };
        let length = parse_i64(length_str)?;

        if length == -1 {
            return Ok(Some((RespValue::BulkString(None), header_len)));
        }
        if length < 0 {
            return Err(ParseError::InvalidBulkLength(length));
        }

        let length = length as usize;
        if length > MAX_BULK_SIZE {
            return Err(ParseError::MessageTooLarge {
                size: length,
                max: MAX_BULK_SIZE,
            });
        }

        let total_needed = header_len + length + CRLF.len();
        if buf.len() < total_needed {
            return Ok(None);
        }

        let data_end = header_len + length;
        if &buf[data_end..total_needed] != CRLF {
            return Err(ParseError::ProtocolError(
                "bulk string missing trailing CRLF".to_string(),
            ));
        }

        let data = Bytes::copy_from_slice(&buf[header_len..data_end]);
        Ok(Some((RespValue::BulkString(Some(data)), total_needed)))
    }

    /// Parses an array: `*<count>\r\n<elements...>`
    fn parse_array(&mut self, buf: &[u8]) -> ParseResult<Option<(RespValue, usize)>> {
        let Some((count_str, header_len)) = parse_text(buf)? else {
            return Ok(None);
        };
        let count = parse_i64(count_str)?;

        if count == -1 {
            return Ok(Some((RespValue::Array(None), header_len)));
        }
        if count < 0 {
            return Err(ParseError::InvalidArrayLength(count));
        }

        let count = count as usize;
        // Every element needs at least 3 bytes, so never trust `count` for capacity.
        let mut elements = Vec::with_capacity(count.min(buf.len() / 3 + 1));
        let mut consumed = header_len;

        self.depth += 1;
        for _ in 0..count {
            match self.parse_value(&buf[consumed..])? {
                Some((value, element_consumed)) => {
                    elements.push(value);
                    consumed += element_consumed;
                }
                None => return Ok(None),
            }
        }
        self.depth -= 1;

        Ok(Some((RespValue::Array(Some(elements)), consumed)))
    }
}

/// Reads the CRLF-terminated text after the tag byte.
///
/// Returns the text and the total bytes consumed (tag + text + CRLF).
fn parse_text(buf: &[u8]) -> ParseResult<Option<(&str, usize)>> {
    let Some(pos) = find_crlf(&buf[1..]) else {
        return Ok(None);
    };
    let text =
        std::str::from_utf8(&buf[1..1 + pos]).map_err(|e| ParseError::InvalidUtf8(e.to_string()))?;
    Ok(Some((text, 1 + pos + CRLF.len())))
}

#[inline]
fn parse_i64(s: &str) -> ParseResult<i64> {
    s.parse()
        .map_err(|e: ParseIntError| ParseError::InvalidInteger(format!("{:?}: {}", s, e)))
}

/// Finds the position of CRLF in the buffer.
///
/// Returns the position of `\r` if found, or None if CRLF is not present.
#[inline]
fn find_crlf(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|w| w == CRLF)
}

/// Helper function to parse a single RESP message from bytes.
pub fn parse_message(buf: &[u8]) -> ParseResult<Option<(RespValue, usize)>> {
    RespParser::new().parse(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bulk(s: &'static str) -> RespValue {
        RespValue::BulkString(Some(Bytes::from(s)))
    }

    #[test]
    fn test_parse_simple_string() {
        let (value, consumed) = parse_message(b"+OK\r\n").unwrap().unwrap();
        assert_eq!(value, RespValue::SimpleString("OK".to_string()));
        assert_eq!(consumed, 5);
    }

    #[test]
    fn test_parse_simple_string_incomplete() {
        assert!(parse_message(b"+OK").unwrap().is_none());
        assert!(parse_message(b"+OK\r").unwrap().is_none());
    }

    #[test]
    fn test_parse_error() {
        let (value, consumed) = parse_message(b"-ERR unknown command\r\n").unwrap().unwrap();
        assert_eq!(value, RespValue::Error("ERR unknown command".to_string()));
        assert_eq!(consumed, 22);
    }

    #[test]
    fn test_parse_integer() {
        let (value, consumed) = parse_message(b":1000\r\n").unwrap().unwrap();
        assert_eq!(value, RespValue::Integer(1000));
        assert_eq!(consumed, 7);

        let (value, _) = parse_message(b":-42\r\n").unwrap().unwrap();
        assert_eq!(value, RespValue::Integer(-42));
    }

    #[test]
    fn test_parse_integer_overflow() {
        let result = parse_message(b":9223372036854775808\r\n");
        assert!(matches!(result, Err(ParseError::InvalidInteger(_))));
    }

    #[test]
    fn test_parse_invalid_integer() {
        let result = parse_message(b":not_a_number\r\n");
        assert!(matches!(result, Err(ParseError::InvalidInteger(_))));
    }

    #[test]
    fn test_parse_bulk_string() {
        let (value, consumed) = parse_message(b"$5\r\nhello\r\n").unwrap().unwrap();
        assert_eq!(value, bulk("hello"));
        assert_eq!(consumed, 11);
    }

    #[test]
    fn test_parse_null_bulk_string() {
        let (value, consumed) = parse_message(b"$-1\r\n").unwrap().unwrap();
        assert_eq!(value, RespValue::BulkString(None));
        assert_eq!(consumed, 5);
    }

    #[test]
    fn test_parse_empty_bulk_string() {
        let (value, consumed) = parse_message(b"$0\r\n\r\n").unwrap().unwrap();
        assert_eq!(value, bulk(""));
        assert_ne!(value, RespValue::BulkString(None));
        assert_eq!(consumed, 6);
    }

    #[test]
    fn test_parse_bulk_string_incomplete() {
        assert!(parse_message(b"$5\r\nhel").unwrap().is_none());
        assert!(parse_message(b"$5\r\nhello").unwrap().is_none());
        assert!(parse_message(b"$5").unwrap().is_none());
    }

    #[test]
    fn test_parse_bulk_string_bad_terminator() {
        let result = parse_message(b"$3\r\nfoobar\r\n");
        assert!(matches!(result, Err(ParseError::ProtocolError(_))));
    }

    #[test]
    fn test_parse_bulk_string_negative_length() {
        let result = parse_message(b"$-2\r\n");
        assert_eq!(result, Err(ParseError::InvalidBulkLength(-2)));
    }

    #[test]
    fn test_parse_bulk_string_non_numeric_length() {
        let result = parse_message(b"$abc\r\nfoo\r\n");
        assert!(matches!(result, Err(ParseError::InvalidInteger(_))));
    }

    #[test]
    fn test_parse_bulk_string_too_large() {
        let result = parse_message(b"$536870913\r\n");
        assert!(matches!(result, Err(ParseError::MessageTooLarge { .. })));
    }

    #[test]
    fn test_parse_array() {
        let input = b"*2\r\n$3\r\nGET\r\n$4\r\nname\r\n";
        let (value, consumed) = parse_message(input).unwrap().unwrap();
        assert_eq!(value, RespValue::array(vec![bulk("GET"), bulk("name")]));
        assert_eq!(consumed, 23);
    }

    #[test]
    fn test_parse_array_incomplete() {
        assert!(parse_message(b"*2\r\n$3\r\nGET\r\n").unwrap().is_none());
        assert!(parse_message(b"*2\r\n$3\r\nGET\r\n$4\r\nna").unwrap().is_none());
    }

    #[test]
    fn test_parse_null_array() {
        let (value, _) = parse_message(b"*-1\r\n").unwrap().unwrap();
        assert_eq!(value, RespValue::Array(None));
    }

    #[test]
    fn test_parse_empty_array() {
        let (value, consumed) = parse_message(b"*0\r\n").unwrap().unwrap();
        assert_eq!(value, RespValue::array(vec![]));
        assert_eq!(consumed, 4);
    }

    #[test]
    fn test_parse_nested_array() {
        let input = b"*2\r\n:1\r\n*2\r\n:2\r\n:3\r\n";
        let (value, _) = parse_message(input).unwrap().unwrap();
        assert_eq!(
            value,
            RespValue::array(vec![
                RespValue::Integer(1),
                RespValue::array(vec![RespValue::Integer(2), RespValue::Integer(3)]),
            ])
        );
    }

    #[test]
    fn test_parse_mixed_array() {
        let input = b"*4\r\n+OK\r\n:100\r\n$5\r\nhello\r\n$-1\r\n";
        let (value, _) = parse_message(input).unwrap().unwrap();
        assert_eq!(
            value,
            RespValue::array(vec![
                RespValue::SimpleString("OK".to_string()),
                RespValue::Integer(100),
                bulk("hello"),
                RespValue::BulkString(None),
            ])
        );
    }

    #[test]
    fn test_parse_excessive_nesting() {
        let input = "*1\r\n".repeat(MAX_NESTING_DEPTH + 2);
        let result = parse_message(input.as_bytes());
        assert!(matches!(result, Err(ParseError::ProtocolError(_))));
    }

    #[test]
    fn test_unknown_prefix_is_rejected() {
        let result = parse_message(b"@invalid\r\n");
        assert_eq!(result, Err(ParseError::UnknownPrefix(b'@')));

        // No inline commands either
        let result = parse_message(b"PING\r\n");
        assert_eq!(result, Err(ParseError::UnknownPrefix(b'P')));
    }

    #[test]
    fn test_parse_only_consumes_first_message() {
        let input = b"+OK\r\n:1\r\n";
        let (value, consumed) = parse_message(input).unwrap().unwrap();
        assert_eq!(value, RespValue::SimpleString("OK".to_string()));
        assert_eq!(consumed, 5);
    }

    #[test]
    fn test_roundtrip() {
        let original = RespValue::array(vec![
            RespValue::bulk_string(Bytes::from("SET")),
            RespValue::bulk_string(Bytes::from("key")),
            RespValue::bulk_string(Bytes::from("value")),
        ]);

        let serialized = original.serialize();
        let (parsed, consumed) = parse_message(&serialized).unwrap().unwrap();
        assert_eq!(original, parsed);
        assert_eq!(consumed, serialized.len());
    }

    #[test]
    fn test_binary_safe_bulk_string() {
        let input = b"$7\r\nhel\r\n\x00o\r\n";
        let (value, _) = parse_message(input).unwrap().unwrap();
        assert_eq!(
            value,
            RespValue::BulkString(Some(Bytes::from(&b"hel\r\n\x00o"[..])))
        );
    }
}

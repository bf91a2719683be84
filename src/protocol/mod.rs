//! RESP Protocol Implementation
//!
//! This module implements the Redis Serialization Protocol (RESP) as far as
//! EmberKV needs it: a parser for client frames, the [`Request`] shape those
//! frames are narrowed to, and the [`RespValue`] type replies are built from.
//!
//! ## Modules
//!
//! - `types`: the `RespValue` enum and its wire serialization
//! - `parser`: incremental parser for incoming RESP data
//! - `request`: turns parsed values into command requests
//!
//! ## Example
//!
//! ```
//! use emberkv::protocol::{parse_message, Request, RespValue};
//! use bytes::Bytes;
//!
//! let data = b"*2\r\n$3\r\nGET\r\n$4\r\nname\r\n";
//! let (value, consumed) = parse_message(data).unwrap().unwrap();
//! assert_eq!(consumed, data.len());
//!
//! let request = Request::from_value(value).unwrap();
//! assert_eq!(request.name(), "GET");
//!
//! let response = RespValue::bulk_string(Bytes::from("Ariz"));
//! assert_eq!(response.serialize(), b"$4\r\nAriz\r\n");
//! ```

pub mod parser;
pub mod request;
pub mod types;

pub use parser::{parse_message, ParseError, ParseResult, RespParser};
pub use request::Request;
pub use types::RespValue;

//! Command Handler Module
//!
//! This module implements the command processing layer. It receives parsed
//! requests, executes them against the storage engine, and returns replies.
//!
//! ```text
//! ┌─────────────────┐
//! │  RESP Parser    │  (protocol module)
//! └────────┬────────┘
//!          │ Request
//!          ▼
//! ┌─────────────────┐
//! │ CommandHandler  │  (this module)
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐
//! │ StorageEngine   │  (storage module)
//! └─────────────────┘
//! ```

pub mod error;
pub mod handler;

pub use error::CommandError;
pub use handler::CommandHandler;

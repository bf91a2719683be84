//! # EmberKV - A Small In-Memory Key-Value Store
//!
//! EmberKV speaks the Redis wire protocol (RESP) and serves a handful of
//! commands from an in-memory map with per-key expiry.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                             EmberKV                              │
//! │                                                                  │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────┐           │
//! │  │ TCP Server  │───>│ Connection  │───>│  Command    │           │
//! │  │ (Listener)  │    │  Handler    │    │  Handler    │           │
//! │  └─────────────┘    └──────┬──────┘    └──────┬──────┘           │
//! │                            │                  │                  │
//! │                            ▼                  ▼                  │
//! │                     ┌─────────────┐    ┌─────────────────────┐   │
//! │                     │ RESP Parser │    │   StorageEngine     │   │
//! │                     └─────────────┘    │ RwLock<HashMap<..>> │   │
//! │                                        └──────────▲──────────┘   │
//! │                                                   │              │
//! │                                        ┌──────────┴──────────┐   │
//! │                                        │    ExpirySweeper    │   │
//! │                                        └─────────────────────┘   │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Supported Commands
//!
//! - `SET key value [PX milliseconds]`
//! - `GET key`
//! - `PING [message]`
//! - `ECHO message`
//! - `CONFIG GET dir|dbfilename`
//!
//! ## Module Overview
//!
//! - [`protocol`]: RESP parser, request decoding and reply types
//! - [`storage`]: thread-safe storage engine with TTL support
//! - [`commands`]: command dispatch
//! - [`connection`]: per-client connection loop
//! - [`config`]: server configuration
//!
//! ## Expiry
//!
//! Keys with a TTL are expired in two ways:
//! 1. **Lazy**: a read that finds an expired key removes it and reports it missing
//! 2. **Active**: a background task reclaims expired keys in small batches,
//!    one short lock hold per batch

pub mod commands;
pub mod config;
pub mod connection;
pub mod protocol;
pub mod storage;

pub use commands::{CommandError, CommandHandler};
pub use config::Config;
pub use connection::{handle_connection, ConnectionStats};
pub use protocol::{ParseError, Request, RespParser, RespValue};
pub use storage::{start_expiry_sweeper, ExpiryConfig, ExpirySweeper, StorageEngine};

/// The default port EmberKV listens on (same as Redis)
pub const DEFAULT_PORT: u16 = 6379;

/// The default host EmberKV binds to
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Version of EmberKV
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

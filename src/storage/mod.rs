//! Storage Engine Module
//!
//! This module provides the key-value store with TTL support and the
//! background sweeper that reclaims expired keys.
//!
//! ## Features
//!
//! - **RwLock**: concurrent readers, exclusive writers, one lock for all keys
//! - **TTL Support**: keys can carry a time-to-live
//! - **Lazy Expiry**: expired keys are removed when read
//! - **Active Expiry**: a background sweeper removes keys nobody reads, a
//!   bounded batch per lock hold
//!
//! ## Example
//!
//! ```
//! use emberkv::storage::StorageEngine;
//! use bytes::Bytes;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! let engine = Arc::new(StorageEngine::new());
//!
//! engine.set(Bytes::from("name"), Bytes::from("Ariz"), None);
//! assert_eq!(engine.get(&Bytes::from("name")), Some(Bytes::from("Ariz")));
//!
//! engine.set(
//!     Bytes::from("session"),
//!     Bytes::from("token123"),
//!     Some(Duration::from_secs(3600)),
//! );
//! ```

pub mod engine;
pub mod expiry;

pub use engine::{CacheEntry, ExpireBatch, StorageEngine};
pub use expiry::{start_expiry_sweeper, ExpiryConfig, ExpirySweeper};

#![deny(missing_docs)]
//! Client-side session core for an MTProto-style messaging protocol.
//!
//! Keeps a durable map from loose references (phones, usernames, ids, display
//! names) to addressable peers, and guards outbound calls against flood waits.

/// Session-aware call surface tying the other modules together
pub mod client;
/// Configuration and settings management
pub mod config;
/// Entity cache and reference resolution
pub mod entities;
/// Error types shared across the crate
pub mod errors;
/// Outbound call guard
pub mod invoke;
/// Phone and username parsing
pub mod parse;
/// Session backends (in-memory and `SQLite`)
pub mod session;
/// Typed protocol objects consumed by the cache
pub mod tl;

pub use client::SessionClient;
pub use entities::{EntityRecord, EntityStore, Reference};
pub use errors::{ClientError, EntityNotFound, InvocationError, PersistenceError};
pub use invoke::{ErrorSink, InvocationGuard, Invoker, TlRequest, TracingSink};
pub use session::{MemorySession, Session, SqliteSession};
